//! Fixed-point solution of the generalized Poisson equation.
//!
//! The polarization charge splits into a density-dependent fixed part,
//! ρ_fixed = (1 − ε)/ε · ρ, and an iteratively refined part mixed as
//!
//! ρ_it ← ρ_it + mixing·(∇log ε·∇φ(ρ_tot)/4π − ρ_it),
//!
//! where ρ_tot = ρ + ρ_it + ρ_fixed is re-solved with the direct solver
//! each pass. Convergence is measured on the Euclidean norm of the mixing
//! increment. On success the converged iterative charge is folded back into
//! the dielectric's polarization density and the potential of the last
//! total density is returned.

use ndarray::Zip;
use tracing::{debug, info};

use solvia_grid::ScalarField;

use crate::constants::FPI;
use crate::physical::Dielectric;
use crate::solver::{DirectSolver, IterativeSettings, SolverError};

/// The mixed fixed-point solver.
#[derive(Debug, Clone)]
pub struct FixedPointSolver {
    direct: DirectSolver,
    settings: IterativeSettings,
    mixing: f64,
}

impl FixedPointSolver {
    pub fn new(direct: DirectSolver, settings: IterativeSettings, mixing: f64) -> Self {
        Self {
            direct,
            settings,
            mixing,
        }
    }

    pub fn direct(&self) -> &DirectSolver {
        &self.direct
    }

    pub fn mixing(&self) -> f64 {
        self.mixing
    }

    /// Solve ∇·(ε∇φ) = −4πρ by polarization-charge iteration.
    pub fn generalized(
        &self,
        density: &ScalarField,
        dielectric: &mut Dielectric,
    ) -> Result<ScalarField, SolverError> {
        let grid = density.grid().clone();

        let mut pol_fixed = ScalarField::new(grid.clone(), "polarization_fixed");
        Zip::from(pol_fixed.data_mut())
            .and(dielectric.epsilon().data())
            .and(density.data())
            .for_each(|pf, &eps, &rho| {
                *pf = (1.0 - eps) / eps * rho;
            });

        let mut pol_iter = ScalarField::new(grid.clone(), "polarization_iter");
        let mut total = ScalarField::new(grid.clone(), "density_total");
        let mut residual_norm = f64::INFINITY;

        for iteration in 0..self.settings.maxiter {
            Zip::from(total.data_mut())
                .and(density.data())
                .and(pol_iter.data())
                .and(pol_fixed.data())
                .for_each(|t, &rho, &pi, &pf| *t = rho + pi + pf);

            let field = self.direct.grad_poisson(&total);
            let pol_new = dielectric.gradlog().dot(&field);

            // mix and accumulate the increment
            let mixing = self.mixing;
            let mut increment_norm = 0.0;
            Zip::from(pol_iter.data_mut())
                .and(pol_new.data())
                .for_each(|pi, &pn| {
                    let increment = mixing * (pn / FPI - *pi);
                    *pi += increment;
                    increment_norm += increment * increment;
                });

            residual_norm = increment_norm;
            debug!(iteration, residual = residual_norm, "fixed-point iteration");

            if residual_norm <= self.settings.tol {
                info!(
                    iterations = iteration + 1,
                    residual = residual_norm,
                    "fixed-point solver converged"
                );

                Zip::from(total.data_mut())
                    .and(density.data())
                    .and(pol_iter.data())
                    .and(pol_fixed.data())
                    .for_each(|t, &rho, &pi, &pf| *t = rho + pi + pf);

                // fold the converged charge into the dielectric state
                Zip::from(dielectric.density_mut().data_mut())
                    .and(pol_iter.data())
                    .and(pol_fixed.data())
                    .for_each(|d, &pi, &pf| *d = pi + pf);
                let charge = dielectric.density().integral();
                dielectric.set_charge(charge);
                if let Some(aux) = dielectric.iterative_mut() {
                    aux.assign(&pol_iter);
                }

                return Ok(self.direct.poisson(&total));
            }
        }

        Err(SolverError::ConvergenceFailure {
            solver: "fixed-point solver",
            max_iter: self.settings.maxiter,
            residual: residual_norm,
        })
    }
}
