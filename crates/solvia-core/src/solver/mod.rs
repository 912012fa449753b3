//! The electrostatic solver engine.
//!
//! Four strategies solve the family of elliptic problems behind the
//! embedding potential:
//!
//! - [`DirectSolver`] — the plain Poisson equation, straight through the
//!   spectral core plus the optional periodic-boundary correction;
//! - [`GradientSolver`] — preconditioned conjugate gradient on the
//!   symmetrized generalized Poisson operator, also covering the
//!   linearized Poisson–Boltzmann problem;
//! - [`FixedPointSolver`] — polarization-charge fixed-point iteration with
//!   mixing;
//! - [`NewtonSolver`] — outer Newton linearisation of the full nonlinear
//!   Poisson–Boltzmann problem around an inner conjugate-gradient solve.
//!
//! A [`SolverSetup`] routes a physical problem kind to the configured
//! strategy, validating that the response objects the problem needs are
//! present before any numerics run. Exceeding an iteration bound is a
//! terminal failure, never a partial result.

pub mod direct;
pub mod fixedpoint;
pub mod gradient;
pub mod newton;
pub mod setup;

use thiserror::Error;

use crate::physical::PhysicalError;

pub use direct::DirectSolver;
pub use fixedpoint::FixedPointSolver;
pub use gradient::{GradientSolver, Preconditioner};
pub use newton::NewtonSolver;
pub use setup::{ElectrostaticSolver, SolverSetup};

/// The physical problem the engine is asked to solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    /// ∇²φ = −4πρ.
    Poisson,
    /// ∇·(ε∇φ) = −4πρ.
    Generalized,
    /// Linearized Poisson–Boltzmann.
    LinPb,
    /// Linearized modified (finite-ion-size) Poisson–Boltzmann.
    LinModPb,
    /// Full nonlinear Poisson–Boltzmann.
    Pb,
    /// Full modified Poisson–Boltzmann.
    ModPb,
}

impl Problem {
    pub fn requires_dielectric(self) -> bool {
        !matches!(self, Problem::Poisson)
    }

    pub fn requires_electrolyte(self) -> bool {
        matches!(
            self,
            Problem::LinPb | Problem::LinModPb | Problem::Pb | Problem::ModPb
        )
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Problem::Poisson => "poisson",
            Problem::Generalized => "generalized",
            Problem::LinPb => "linpb",
            Problem::LinModPb => "linmodpb",
            Problem::Pb => "pb",
            Problem::ModPb => "modpb",
        };
        f.write_str(name)
    }
}

/// How far the boundary-coupling self-consistency extends within a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuxiliaryScheme {
    #[default]
    None,
    /// Full polarization-charge coupling.
    Full,
    /// Ionic-concentration coupling.
    Ioncc,
}

/// Bounds and tolerances shared by every iterative strategy.
#[derive(Debug, Clone, Copy)]
pub struct IterativeSettings {
    pub maxiter: usize,
    /// Absolute tolerance on the Euclidean residual norm.
    pub tol: f64,
    pub auxiliary: AuxiliaryScheme,
}

impl Default for IterativeSettings {
    fn default() -> Self {
        Self {
            maxiter: 100,
            tol: 1e-7,
            auxiliary: AuxiliaryScheme::None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("{solver} failed to converge after {max_iter} iterations (residual: {residual:.2e})")]
    ConvergenceFailure {
        solver: &'static str,
        max_iter: usize,
        residual: f64,
    },

    #[error("problem '{0}' requires a dielectric")]
    MissingDielectric(Problem),

    #[error("problem '{0}' requires an electrolyte")]
    MissingElectrolyte(Problem),

    #[error("problem '{0}' cannot be solved by the {1} strategy")]
    UnsupportedCombination(Problem, &'static str),

    #[error(transparent)]
    Physical(#[from] PhysicalError),
}
