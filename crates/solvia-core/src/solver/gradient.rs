//! Preconditioned conjugate-gradient solution of the generalized Poisson
//! and linearized Poisson–Boltzmann problems.
//!
//! The generalized operator L φ = −∇·(ε∇φ)/4π is symmetrized through the
//! substitution φ = ψ/√ε. With the preconditioned residual
//! z = Poisson(r/√ε)/√ε the operator application collapses to
//!
//! L z = r + z·(√ε ∇²√ε / 4π) = r + z·factsqrt,
//!
//! so each iteration costs a single Poisson solve. Screening (the
//! linearized PB term γk²/4π, or a caller-supplied screening density) adds
//! a pointwise z·S term to the same recurrence. The `left` preconditioner
//! skips the square-root factorisation (z = r/ε) and applies the true
//! operator spectrally instead.
//!
//! The direction-reuse coefficient β = (r·z)_new/(r·z)_old falls back to
//! steepest descent when the previous inner product is numerically
//! negligible or conjugation is disabled.

use ndarray::Zip;
use tracing::{debug, info};

use solvia_grid::ScalarField;

use crate::constants::FPI;
use crate::physical::{Dielectric, Electrolyte, PhysicalError};
use crate::solver::{DirectSolver, IterativeSettings, SolverError};

/// Preconditioning strategy for the symmetrized operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preconditioner {
    #[default]
    Sqrt,
    Left,
}

/// The preconditioned (conjugate) gradient solver.
#[derive(Debug, Clone)]
pub struct GradientSolver {
    direct: DirectSolver,
    preconditioner: Preconditioner,
    conjugate: bool,
    settings: IterativeSettings,
}

impl GradientSolver {
    pub fn new(
        direct: DirectSolver,
        preconditioner: Preconditioner,
        conjugate: bool,
        settings: IterativeSettings,
    ) -> Self {
        Self {
            direct,
            preconditioner,
            conjugate,
            settings,
        }
    }

    pub fn direct(&self) -> &DirectSolver {
        &self.direct
    }

    pub fn settings(&self) -> &IterativeSettings {
        &self.settings
    }

    /// Solve ∇·(ε∇φ) = −4πρ.
    pub fn generalized(
        &self,
        density: &ScalarField,
        dielectric: &Dielectric,
    ) -> Result<ScalarField, SolverError> {
        self.solve(density, Some(dielectric), None, "generalized gradient")
    }

    /// Solve the linearized Poisson–Boltzmann problem
    /// ∇·(ε∇φ) − 4πSφ = −4πρ with S from the electrolyte (or an explicit
    /// screening density).
    pub fn linearized_pb(
        &self,
        density: &ScalarField,
        electrolyte: &Electrolyte,
        dielectric: Option<&Dielectric>,
        screening: Option<&ScalarField>,
    ) -> Result<ScalarField, SolverError> {
        let screening = match screening {
            Some(s) => s.clone(),
            None => electrolyte.screening(),
        };
        self.solve(density, dielectric, Some(&screening), "linearized PB gradient")
    }

    /// Shared CG loop. `dielectric = None` solves in vacuum (ε ≡ 1), which
    /// the screened problems permit.
    pub(crate) fn solve(
        &self,
        density: &ScalarField,
        dielectric: Option<&Dielectric>,
        screening: Option<&ScalarField>,
        label: &'static str,
    ) -> Result<ScalarField, SolverError> {
        let grid = density.grid().clone();

        let mut phi = ScalarField::new(grid.clone(), "potential");
        let mut r = density.clone();
        let mut z = ScalarField::new(grid.clone(), "z");
        let mut p = ScalarField::new(grid.clone(), "p");
        let mut ap = ScalarField::new(grid.clone(), "Ap");

        // 1/√ε and the operator factor; vacuum when no dielectric is given
        let inv_sqrt = dielectric.map(|d| {
            let mut f = d.epsilon().clone();
            f.data_mut().mapv_inplace(|e| 1.0 / e.sqrt());
            f
        });
        // the √ε operator factor is only consumed by the sqrt recurrence
        let factsqrt = match (self.preconditioner, dielectric) {
            (Preconditioner::Sqrt, Some(d)) => Some(
                d.factsqrt()
                    .ok_or(PhysicalError::MissingDerivatives("gradient solver factsqrt"))?,
            ),
            _ => None,
        };

        let mut rzold: f64 = 0.0;
        let mut residual = f64::INFINITY;

        for iteration in 0..self.settings.maxiter {
            // z = M⁻¹ r
            match (self.preconditioner, &inv_sqrt) {
                (Preconditioner::Sqrt, Some(inv_sqrt)) => {
                    let mut scaled = r.clone();
                    Zip::from(scaled.data_mut())
                        .and(inv_sqrt.data())
                        .for_each(|x, &s| *x *= s);
                    z = self.direct.poisson(&scaled);
                    Zip::from(z.data_mut())
                        .and(inv_sqrt.data())
                        .for_each(|x, &s| *x *= s);
                }
                (Preconditioner::Sqrt, None) => {
                    z = self.direct.poisson(&r);
                }
                (Preconditioner::Left, _) => {
                    z.assign(&r);
                    if let Some(d) = dielectric {
                        Zip::from(z.data_mut())
                            .and(d.epsilon().data())
                            .for_each(|x, &e| *x /= e);
                    }
                }
            }

            let rznew = z.scalar_product(&r);
            let beta = if self.conjugate && rzold.abs() > 1e-30 {
                rznew / rzold
            } else {
                0.0
            };
            rzold = rznew;

            // p ← z + βp
            Zip::from(p.data_mut()).and(z.data()).for_each(|pv, &zv| {
                *pv = zv + beta * *pv;
            });

            // Ap ← L p, using the recurrence for the sqrt path or the full
            // spectral operator for the left path
            match self.preconditioner {
                Preconditioner::Sqrt => {
                    match factsqrt {
                        Some(factsqrt) => {
                            Zip::from(ap.data_mut())
                                .and(z.data())
                                .and(factsqrt.data())
                                .and(r.data())
                                .for_each(|a, &zv, &f, &rv| {
                                    *a = zv * f + rv + beta * *a;
                                });
                        }
                        None => {
                            // vacuum: L z = r exactly
                            Zip::from(ap.data_mut()).and(r.data()).for_each(|a, &rv| {
                                *a = rv + beta * *a;
                            });
                        }
                    }
                    if let Some(screening) = screening {
                        Zip::from(ap.data_mut())
                            .and(z.data())
                            .and(screening.data())
                            .for_each(|a, &zv, &s| *a += zv * s);
                    }
                }
                Preconditioner::Left => {
                    ap = self.apply_operator(&p, dielectric, screening);
                }
            }

            let pap = p.scalar_product(&ap);
            let alpha = rznew / pap;

            Zip::from(phi.data_mut()).and(p.data()).for_each(|f, &pv| {
                *f += alpha * pv;
            });
            Zip::from(r.data_mut()).and(ap.data()).for_each(|rv, &a| {
                *rv -= alpha * a;
            });

            residual = r.euclidean_norm();
            debug!(iteration, residual, alpha, beta, "{label} iteration");

            if residual <= self.settings.tol {
                info!(iterations = iteration + 1, residual, "{label} converged");
                return Ok(phi);
            }
        }

        Err(SolverError::ConvergenceFailure {
            solver: "gradient solver",
            max_iter: self.settings.maxiter,
            residual,
        })
    }

    /// L p = [−ε∇²p − ∇ε·∇p]/4π + S·p, evaluated spectrally.
    fn apply_operator(
        &self,
        p: &ScalarField,
        dielectric: Option<&Dielectric>,
        screening: Option<&ScalarField>,
    ) -> ScalarField {
        let core = self.direct.cores().electrostatics();
        let lapl = core.laplacian(p);
        let grid = p.grid().clone();
        let mut out = ScalarField::new(grid, "Lp");

        match dielectric {
            Some(d) => {
                let grad_p = core.gradient(p);
                // ∇ε·∇p through ε ∇log ε·∇p, sparing the explicit ∇ε field
                let glog_dot = d.gradlog().dot(&grad_p);
                Zip::from(out.data_mut())
                    .and(lapl.data())
                    .and(glog_dot.data())
                    .and(d.epsilon().data())
                    .for_each(|o, &l, &gg, &e| {
                        *o = -(e * l + e * gg) / FPI;
                    });
            }
            None => {
                Zip::from(out.data_mut()).and(lapl.data()).for_each(|o, &l| {
                    *o = -l / FPI;
                });
            }
        }

        if let Some(screening) = screening {
            Zip::from(out.data_mut())
                .and(p.data())
                .and(screening.data())
                .for_each(|o, &pv, &s| *o += pv * s);
        }

        out
    }
}
