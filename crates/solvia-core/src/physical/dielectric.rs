//! The dielectric response model: boundary in, permittivity out.
//!
//! The permittivity field is a pure function of the boundary switch and the
//! bulk constant. Two interpolations are supported: the exponential form,
//! ε = exp(ln ε₀ · (1 − s)), keeps ε a smooth monotone function of the
//! switch over its whole range and is used for density-derived boundaries;
//! the linear form, ε = 1 + (ε₀ − 1)(1 − s), is used otherwise.
//!
//! The model mirrors the boundary status machine: it is `updating` while
//! the boundary is partially rebuilt and only recomputes once the boundary
//! reaches `Ready`.

use std::sync::Arc;

use ndarray::Zip;

use solvia_grid::{Grid, ScalarField, VectorField};

use crate::boundary::{Boundary, UpdateStatus};
use crate::constants::FPI;
use crate::core::FftCore;
use crate::physical::PhysicalError;

/// Functional form of the boundary-to-permittivity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermittivityForm {
    Linear,
    Exponential,
}

/// A spatially varying permittivity derived from a boundary.
#[derive(Debug)]
pub struct Dielectric {
    constant: f64,
    form: PermittivityForm,
    epsilon: ScalarField,
    /// dε/ds, the sensitivity to a boundary perturbation.
    depsilon: ScalarField,
    gradlog: VectorField,
    /// ∇ε, kept only when a consumer asked for it.
    gradient: Option<VectorField>,
    /// √ε ∇²√ε / 4π, the preconditioned-gradient operator factor.
    factsqrt: Option<ScalarField>,
    /// Scratch charge iterated by the fixed-point solver.
    iterative: Option<ScalarField>,
    /// Polarization charge density induced by the last solved potential.
    density: ScalarField,
    charge: f64,
    pub updating: bool,
}

impl Dielectric {
    pub fn new(
        grid: Arc<Grid>,
        constant: f64,
        form: PermittivityForm,
        need_gradient: bool,
        need_factsqrt: bool,
        need_auxiliary: bool,
    ) -> Self {
        Self {
            constant,
            form,
            epsilon: ScalarField::new(grid.clone(), "epsilon"),
            depsilon: ScalarField::new(grid.clone(), "depsilon"),
            gradlog: VectorField::new(grid.clone(), "gradlogepsilon"),
            gradient: need_gradient.then(|| VectorField::new(grid.clone(), "gradepsilon")),
            factsqrt: need_factsqrt.then(|| ScalarField::new(grid.clone(), "factsqrt")),
            iterative: need_auxiliary.then(|| ScalarField::new(grid.clone(), "iterative")),
            density: ScalarField::new(grid, "polarization"),
            charge: 0.0,
            updating: false,
        }
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn form(&self) -> PermittivityForm {
        self.form
    }

    pub fn epsilon(&self) -> &ScalarField {
        &self.epsilon
    }

    pub fn depsilon(&self) -> &ScalarField {
        &self.depsilon
    }

    pub fn gradlog(&self) -> &VectorField {
        &self.gradlog
    }

    pub fn gradient(&self) -> Option<&VectorField> {
        self.gradient.as_ref()
    }

    pub fn factsqrt(&self) -> Option<&ScalarField> {
        self.factsqrt.as_ref()
    }

    pub fn iterative(&self) -> Option<&ScalarField> {
        self.iterative.as_ref()
    }

    pub fn iterative_mut(&mut self) -> Option<&mut ScalarField> {
        self.iterative.as_mut()
    }

    /// Polarization density from the last `of_potential`.
    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn density_mut(&mut self) -> &mut ScalarField {
        &mut self.density
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn set_charge(&mut self, charge: f64) {
        self.charge = charge;
    }

    /// Follow the boundary status machine: stay stale while the boundary is
    /// partially updated, recompute once it is fully current.
    pub fn update(&mut self, boundary: &dyn Boundary) -> Result<(), PhysicalError> {
        match boundary.data().status() {
            UpdateStatus::Partial => {
                self.updating = true;
            }
            UpdateStatus::Ready => {
                self.of_boundary(boundary)?;
                self.updating = false;
            }
            UpdateStatus::Stale => {}
        }
        Ok(())
    }

    /// Map the boundary switch to ε, dε/ds, ∇log ε, and the optional ∇ε and
    /// √ε-factor fields.
    pub fn of_boundary(&mut self, boundary: &dyn Boundary) -> Result<(), PhysicalError> {
        let data = boundary.data();
        let switch = data.switch();

        let c = self.constant;
        match self.form {
            PermittivityForm::Exponential => {
                let logc = c.ln();
                Zip::from(self.epsilon.data_mut())
                    .and(self.depsilon.data_mut())
                    .and(switch.data())
                    .for_each(|eps, deps, &s| {
                        *eps = (logc * (1.0 - s)).exp();
                        *deps = -logc * *eps;
                    });
            }
            PermittivityForm::Linear => {
                Zip::from(self.epsilon.data_mut())
                    .and(self.depsilon.data_mut())
                    .and(switch.data())
                    .for_each(|eps, deps, &s| {
                        *eps = 1.0 + (c - 1.0) * (1.0 - s);
                        *deps = -(c - 1.0);
                    });
            }
        }

        // ∇log ε is always kept, so the boundary must carry its gradient
        let boundary_gradient = data
            .gradient()
            .ok_or(PhysicalError::MissingDerivatives("dielectric gradient"))?;

        // ∇ε = dε/ds ∇s and ∇log ε = ∇ε / ε
        for l in 0..3 {
            Zip::from(self.gradlog.component_mut(l))
                .and(boundary_gradient.component(l))
                .and(self.depsilon.data())
                .and(self.epsilon.data())
                .for_each(|glog, &gs, &deps, &eps| {
                    *glog = deps * gs / eps;
                });
        }
        if let Some(gradient) = self.gradient.as_mut() {
            for l in 0..3 {
                Zip::from(gradient.component_mut(l))
                    .and(boundary_gradient.component(l))
                    .and(self.depsilon.data())
                    .for_each(|ge, &gs, &deps| {
                        *ge = deps * gs;
                    });
            }
        }

        if let Some(factsqrt) = self.factsqrt.as_mut() {
            let boundary_laplacian = data
                .laplacian()
                .ok_or(PhysicalError::MissingDerivatives("dielectric factsqrt"))?;
            let grad2 = boundary_gradient.squared_modulus();

            // ∇²ε via the chain rule, then factsqrt = (½∇²ε − ¼|∇ε|²/ε)/4π
            match self.form {
                PermittivityForm::Exponential => {
                    let logc = c.ln();
                    Zip::from(factsqrt.data_mut())
                        .and(self.epsilon.data())
                        .and(grad2.data())
                        .and(boundary_laplacian.data())
                        .for_each(|f, &eps, &g2, &lapl| {
                            let lapl_eps = eps * (logc * logc * g2 - logc * lapl);
                            let grad_eps2 = logc * logc * eps * eps * g2;
                            *f = (0.5 * lapl_eps - 0.25 * grad_eps2 / eps) / FPI;
                        });
                }
                PermittivityForm::Linear => {
                    let dc = c - 1.0;
                    Zip::from(factsqrt.data_mut())
                        .and(self.epsilon.data())
                        .and(grad2.data())
                        .and(boundary_laplacian.data())
                        .for_each(|f, &eps, &g2, &lapl| {
                            let lapl_eps = -dc * lapl;
                            let grad_eps2 = dc * dc * g2;
                            *f = (0.5 * lapl_eps - 0.25 * grad_eps2 / eps) / FPI;
                        });
                }
            }
        }

        Ok(())
    }

    /// Polarization charge induced by a solved potential:
    /// ρ_pol = ∇log ε · ∇φ / 4π + (1 − ε)/ε · ρ.
    pub fn of_potential(
        &mut self,
        charges: &ScalarField,
        potential: &ScalarField,
        core: &FftCore,
    ) {
        let grad_v = core.gradient(potential);
        let glog_dot_gv = self.gradlog.dot(&grad_v);

        Zip::from(self.density.data_mut())
            .and(glog_dot_gv.data())
            .and(self.epsilon.data())
            .and(charges.data())
            .for_each(|pol, &gg, &eps, &rho| {
                *pol = gg / FPI + (1.0 - eps) / eps * rho;
            });

        self.charge = self.density.integral();
    }

    /// Energy sensitivity to a boundary perturbation:
    /// out −= |∇φ|² (dε/ds) / 8π.
    pub fn de_dboundary(&self, grad_potential: &VectorField, out: &mut ScalarField) {
        let grad2 = grad_potential.squared_modulus();
        Zip::from(out.data_mut())
            .and(grad2.data())
            .and(self.depsilon.data())
            .for_each(|o, &g2, &deps| {
                *o -= g2 * deps / (2.0 * FPI);
            });
    }

    /// Potential sensitivity to a boundary perturbation:
    /// out −= (∇φ · ∇δφ)(dε/ds) / 4π.
    pub fn dv_dboundary(
        &self,
        grad_potential: &VectorField,
        grad_dpotential: &VectorField,
        out: &mut ScalarField,
    ) {
        let dot = grad_potential.dot(grad_dpotential);
        Zip::from(out.data_mut())
            .and(dot.data())
            .and(self.depsilon.data())
            .for_each(|o, &gg, &deps| {
                *o -= gg * deps / FPI;
            });
    }
}
