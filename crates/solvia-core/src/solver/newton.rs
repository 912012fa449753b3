//! Newton solution of the full nonlinear Poisson–Boltzmann problem.
//!
//! Each outer step linearizes the electrolyte response around the current
//! potential: the local screening S(r) = Σ zᵢ²cᵢ(φ)/(k_B T) and the mobile
//! charge ρ_el(φ) define the linear problem
//!
//! ∇·(ε∇φ′) − 4πSφ′ = −4π(ρ + ρ_el(φ) + Sφ),
//!
//! which an inner gradient solver in conjugate (not steepest-descent) mode
//! solves for the next iterate. Convergence is measured on the Euclidean
//! norm of the potential increment.

use ndarray::Zip;
use tracing::{debug, info};

use solvia_grid::ScalarField;

use crate::physical::{Dielectric, Electrolyte};
use crate::solver::{GradientSolver, IterativeSettings, SolverError};

/// The outer Newton solver with its nested gradient solver.
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    inner: GradientSolver,
    settings: IterativeSettings,
}

impl NewtonSolver {
    pub fn new(inner: GradientSolver, settings: IterativeSettings) -> Self {
        Self { inner, settings }
    }

    pub fn inner(&self) -> &GradientSolver {
        &self.inner
    }

    /// Solve the nonlinear PB problem for the potential.
    pub fn pb_nested(
        &self,
        density: &ScalarField,
        dielectric: &Dielectric,
        electrolyte: &mut Electrolyte,
    ) -> Result<ScalarField, SolverError> {
        let grid = density.grid().clone();

        let mut phi = ScalarField::new(grid.clone(), "potential");
        electrolyte.of_potential(&phi);

        let mut rhs = ScalarField::new(grid.clone(), "newton_rhs");
        let mut residual = f64::INFINITY;

        for iteration in 0..self.settings.maxiter {
            let screening = electrolyte.screening();

            Zip::from(rhs.data_mut())
                .and(density.data())
                .and(electrolyte.density().data())
                .and(screening.data())
                .and(phi.data())
                .for_each(|r, &rho, &rel, &s, &v| {
                    *r = rho + rel + s * v;
                });

            let phi_new =
                self.inner
                    .solve(&rhs, Some(dielectric), Some(&screening), "newton inner")?;

            let mut increment_norm = 0.0;
            Zip::from(phi_new.data()).and(phi.data()).for_each(|&a, &b| {
                let d = a - b;
                increment_norm += d * d;
            });

            phi = phi_new;
            electrolyte.of_potential(&phi);

            residual = increment_norm;
            debug!(iteration, residual, "newton iteration");

            if residual <= self.settings.tol {
                info!(
                    iterations = iteration + 1,
                    residual, "newton solver converged"
                );
                return Ok(phi);
            }
        }

        Err(SolverError::ConvergenceFailure {
            solver: "newton solver",
            max_iter: self.settings.maxiter,
            residual,
        })
    }
}
