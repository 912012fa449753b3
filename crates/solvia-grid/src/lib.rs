//! # Solvia Grid
//!
//! Real-space lattices and field representations for the Solvia
//! continuum-solvent engine.
//!
//! ## Modules
//!
//! - [`grid`] — Immutable real-space lattice with its reciprocal counterpart
//!   and minimum-image distance machinery.
//! - [`field`] — Scalar, vector, and rank-2 tensor fields over a grid, with
//!   integrals, multipole moments, and pointwise products.
//! - [`functions`] — Analytic smooth-function shapes (Gaussians and the
//!   complementary-error-function family) used for smeared nuclei, soft
//!   spheres, and cavity steps.

pub mod field;
pub mod functions;
pub mod grid;

pub use field::{Multipoles, ScalarField, TensorField, VectorField};
pub use functions::{FunctionKind, FunctionSet, SmoothFunction};
pub use grid::{Grid, GridError};
