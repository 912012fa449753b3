//! # Solvia Core
//!
//! The numerical backbone of the Solvia continuum-solvent framework. Given a
//! charge distribution on a real-space grid, this crate derives a smooth
//! cavity boundary, maps it to a spatially varying permittivity, and solves
//! the generalized Poisson or Poisson–Boltzmann equation for the embedding
//! potential.
//!
//! ## Architecture
//!
//! - [`core`] — Numerical cores: the spectral (FFT) differential-operator
//!   provider and the analytic multipole correction for partially periodic
//!   cells.
//! - [`physical`] — Physical state: electrons, ions, system descriptor,
//!   external charges, the dielectric and electrolyte response models, and
//!   the aggregate charge container.
//! - [`boundary`] — The three interchangeable cavity models (electronic,
//!   ionic, system) with their derivative engines and the solvent-aware
//!   filling correction.
//! - [`solver`] — The four solution strategies (direct, preconditioned
//!   gradient, fixed-point, Newton) behind the problem dispatcher.
//!
//! All quantities are in Hartree atomic units: lengths in bohr, energies in
//! hartree, e² = 1, so the governing equation ∇·(ε∇φ) = −4πρ holds with its
//! literal 4π.
//!
//! The engine is single-threaded and synchronous by contract: every instance
//! is exclusively owned by the simulation driver that constructed it, and
//! `update()` calls follow the strict ionic-before-electronic ordering of an
//! SCF step.

pub mod boundary;
pub mod constants;
pub mod core;
pub mod physical;
pub mod solver;

pub use boundary::{Boundary, BoundaryError, DerivMethod, DerivLevel, UpdateStatus};
pub use solver::{Problem, SolverError};
