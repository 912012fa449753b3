//! Numerical cores: differential operators and Poisson solutions.
//!
//! Two cores cover the engine's needs:
//!
//! - [`FftCore`] — the spectral provider: gradients, Laplacians, Hessians,
//!   divergences, convolutions, and periodic Poisson solutions by wavevector
//!   multiplication in reciprocal space.
//! - [`Analytic1dCore`] — the analytic multipole correction for cells that
//!   are periodic in fewer than three directions.
//!
//! A [`CoreContainer`] groups the cores a component consumes.

pub mod analytic1d;
pub mod container;
pub mod fft;

use thiserror::Error;

pub use analytic1d::Analytic1dCore;
pub use container::CoreContainer;
pub use fft::FftCore;

/// Errors raised while constructing or applying a numerical core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("periodic correction with {0} periodic dimensions is not analytically supported")]
    UnsupportedDim(usize),

    #[error("axis must be 0, 1, or 2, got {0}")]
    InvalidAxis(usize),
}
