//! Electronic-density boundary: a smooth function of the local density.
//!
//! Between the thresholds ρ_min < ρ_max the switching function follows the
//! smooth cosine interpolant
//!
//! s(ρ) = 1 − (t − sin t)/2π,  t = 2π ln(ρ_max/|ρ|)/ln(ρ_max/ρ_min),
//!
//! so s = 1 above ρ_max (cavity interior) and s = 0 below ρ_min (bulk
//! solvent). The first and second derivatives with respect to the density
//! are kept alongside, machine-consistent with s, so that chain-rule
//! derivatives match the spectral ones to discretisation accuracy.

use ndarray::Zip;
use tracing::warn;

use solvia_grid::{ScalarField, VectorField};

use crate::boundary::{
    dsurface_of, Boundary, BoundaryData, BoundaryError, DerivLevel, DerivMethod, UpdateStatus,
};
use crate::constants::TPI;
use crate::physical::{Electrons, Ions};

/// Which densities feed the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectronicMode {
    /// Valence density only.
    Electronic,
    /// Valence plus smeared core-electron density; requires ions.
    Full,
}

/// The electronic-density boundary model.
#[derive(Debug)]
pub struct ElectronicBoundary {
    data: BoundaryData,
    mode: ElectronicMode,
    rhomin: f64,
    rhomax: f64,
    /// ln(ρ_max/ρ_min).
    factor: f64,
    /// The density the switching function was last generated from.
    density: ScalarField,
    /// ds/dρ.
    dswitch: ScalarField,
    /// d²s/dρ².
    d2switch: ScalarField,
}

impl ElectronicBoundary {
    pub fn new(
        rhomin: f64,
        rhomax: f64,
        mode: ElectronicMode,
        data: BoundaryData,
    ) -> Result<Self, BoundaryError> {
        match data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem | DerivMethod::Chain => {}
            method => {
                return Err(BoundaryError::IncompatibleDerivMethod {
                    mode: "electronic",
                    method,
                })
            }
        }

        let grid = data.grid().clone();
        let label = data.label().to_string();
        Ok(Self {
            mode,
            rhomin,
            rhomax,
            factor: (rhomax / rhomin).ln(),
            density: ScalarField::new(grid.clone(), format!("{label}_boundary_density")),
            dswitch: ScalarField::new(grid.clone(), format!("{label}_dboundary")),
            d2switch: ScalarField::new(grid, format!("{label}_d2boundary")),
            data,
        })
    }

    pub fn mode(&self) -> ElectronicMode {
        self.mode
    }

    pub fn dswitch(&self) -> &ScalarField {
        &self.dswitch
    }

    pub fn d2switch(&self) -> &ScalarField {
        &self.d2switch
    }

    /// Drive the state machine for one update cycle. The ionic (rigid)
    /// step must precede the electronic (soft) step within a cycle.
    pub fn update(
        &mut self,
        electrons: &Electrons,
        mut ions: Option<&mut Ions>,
    ) -> Result<(), BoundaryError> {
        let mut updating = electrons.updating;
        if self.mode == ElectronicMode::Full {
            let ions = ions
                .as_deref()
                .ok_or(BoundaryError::MissingDependency("ions"))?;
            updating = updating || ions.updating;
        }

        if !updating {
            self.data.reset_if_ready();
            return Ok(());
        }

        match self.mode {
            ElectronicMode::Full => {
                let ions = ions
                    .as_deref_mut()
                    .ok_or(BoundaryError::MissingDependency("ions"))?;

                if ions.updating {
                    let grid = self.data.grid().clone();
                    let core_density = ions.core_electrons().density(&grid);
                    ions.core_density_mut().assign(&core_density);
                    self.data.set_status(UpdateStatus::Partial);
                }

                if electrons.updating {
                    if self.data.status() == UpdateStatus::Stale {
                        return Err(BoundaryError::MissedIonicUpdate);
                    }

                    Zip::from(self.density.data_mut())
                        .and(electrons.density().data())
                        .and(ions.core_density().data())
                        .for_each(|d, &e, &c| *d = e + c);

                    self.build();
                    self.data.set_status(UpdateStatus::Ready);
                }
            }
            ElectronicMode::Electronic => {
                if electrons.updating {
                    self.density.assign(electrons.density());
                    self.build();
                    self.data.set_status(UpdateStatus::Ready);
                } else {
                    self.data.reset_if_ready();
                    return Ok(());
                }
            }
        }

        self.data.update_solvent_aware();
        Ok(())
    }

    fn build(&mut self) {
        self.generate_switching_function();

        match self.data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem => {
                let switch = self.data.switch().clone();
                self.data.compute_derivatives_fft(&switch);
            }
            DerivMethod::Chain => self.chain_derivatives(),
            DerivMethod::Lowmem => unreachable!("rejected at construction"),
        }

        self.data.finalize_measures();
    }

    /// Derivatives of the switch from spectral derivatives of the density
    /// via the chain rule:
    /// ∇s = s′∇ρ, ∇²s = s′∇²ρ + s″|∇ρ|², H_s = s′H_ρ + s″ ∇ρ⊗∇ρ.
    fn chain_derivatives(&mut self) {
        let level = self.data.deriv_level();
        if level < DerivLevel::Gradient {
            return;
        }

        // spectral density derivatives up front; field mutations follow
        let (grad_rho, lapl_rho, hess_rho) = {
            let core = self.data.cores().derivatives();
            (
                core.gradient(&self.density),
                (level == DerivLevel::Laplacian).then(|| core.laplacian(&self.density)),
                (level == DerivLevel::Full).then(|| core.hessian(&self.density)),
            )
        };

        if let Some(lapl_rho) = lapl_rho {
            let grad_rho2 = grad_rho.squared_modulus();
            let laplacian = self.data.laplacian_mut().expect("allocated by construction");
            Zip::from(laplacian.data_mut())
                .and(lapl_rho.data())
                .and(grad_rho2.data())
                .and(self.dswitch.data())
                .and(self.d2switch.data())
                .for_each(|out, &lr, &g2, &ds, &d2s| {
                    *out = ds * lr + d2s * g2;
                });
        }

        if let Some(hess_rho) = hess_rho {
            let mut hessian = hess_rho.clone();
            for a in 0..3 {
                for b in 0..3 {
                    Zip::from(hessian.component_mut(a, b))
                        .and(hess_rho.component(a, b))
                        .and(self.dswitch.data())
                        .for_each(|h, &hr, &ds| {
                            *h = ds * hr;
                        });
                    Zip::from(hessian.component_mut(a, b))
                        .and(grad_rho.component(a))
                        .and(grad_rho.component(b))
                        .and(self.d2switch.data())
                        .for_each(|h, &ga, &gb, &d2s| {
                            *h += d2s * ga * gb;
                        });
                }
            }

            // the switch gradient for the surface derivative
            let mut grad_switch = grad_rho.clone();
            for l in 0..3 {
                Zip::from(grad_switch.component_mut(l))
                    .and(self.dswitch.data())
                    .for_each(|g, &ds| *g *= ds);
            }

            let dsurface = dsurface_of(&grad_switch, &hessian);
            {
                let laplacian = self.data.laplacian_mut().expect("allocated by construction");
                laplacian.assign(&hessian.trace());
            }
            self.data
                .dsurface
                .as_mut()
                .expect("allocated by construction")
                .assign(&dsurface);
            if let Some(store) = self.data.hessian.as_mut() {
                for a in 0..3 {
                    for b in 0..3 {
                        store.component_mut(a, b).assign(hessian.component(a, b));
                    }
                }
            }
        }

        // scale the gradient last: the Laplacian and Hessian terms above
        // consume the raw density gradient
        let gradient = self.data.gradient_mut().expect("allocated by construction");
        for l in 0..3 {
            Zip::from(gradient.component_mut(l))
                .and(grad_rho.component(l))
                .and(self.dswitch.data())
                .for_each(|g, &gr, &ds| *g = ds * gr);
        }
    }

    /// Evaluate s(ρ), s′(ρ), s″(ρ) pointwise.
    fn generate_switching_function(&mut self) {
        let (rhomin, rhomax, factor) = (self.rhomin, self.rhomax, self.factor);
        let switch = self.data.switch_mut();

        Zip::from(switch.data_mut())
            .and(self.density.data())
            .and(self.dswitch.data_mut())
            .and(self.d2switch.data_mut())
            .for_each(|s, &rho, ds, d2s| {
                let arho = rho.abs();
                if arho <= rhomin {
                    *s = 0.0;
                    *ds = 0.0;
                    *d2s = 0.0;
                } else if arho >= rhomax {
                    *s = 1.0;
                    *ds = 0.0;
                    *d2s = 0.0;
                } else {
                    let t = (rhomax / arho).ln() * TPI / factor;
                    *s = 1.0 - (t - t.sin()) / TPI;
                    *ds = (1.0 - t.cos()) / (arho * factor);
                    *d2s = -(TPI * t.sin() + factor * (1.0 - t.cos())) / (rho * factor).powi(2);
                }
            });
    }
}

impl Boundary for ElectronicBoundary {
    fn data(&self) -> &BoundaryData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut BoundaryData {
        &mut self.data
    }

    fn density_derived(&self) -> bool {
        true
    }

    fn dboundary_dions(&self, _index: usize) -> Result<VectorField, BoundaryError> {
        Err(BoundaryError::MissingDependency(
            "core electrons (use dboundary_dions_with)",
        ))
    }
}

impl ElectronicBoundary {
    /// Partial derivative of the boundary with respect to ion `index`,
    /// mediated by the smeared core electrons: ∂s/∂R_i = −∇ρ_core,i · s′.
    pub fn dboundary_dions_with(
        &self,
        index: usize,
        ions: &Ions,
    ) -> Result<VectorField, BoundaryError> {
        let grid = self.data.grid();
        let mut partial = VectorField::new(grid.clone(), "dboundary_dions");

        if self.mode == ElectronicMode::Electronic {
            return Ok(partial);
        }

        if ions.core_electrons().is_empty() {
            return Err(BoundaryError::MissingDependency("core electrons"));
        }

        let core = ions
            .core_electrons()
            .get(index)
            .ok_or(BoundaryError::MissingDependency("core electron index"))?;
        let core_gradient = core.gradient(grid);

        for l in 0..3 {
            Zip::from(partial.component_mut(l))
                .and(core_gradient.component(l))
                .and(self.dswitch.data())
                .for_each(|p, &g, &ds| *p = -g * ds);
        }

        // smeared cores should not push on the cavity; report when they do
        let spurious_force = partial.modulus().integral();
        if spurious_force > 1e-5 {
            warn!(
                index,
                spurious_force, "non-negligible boundary force from smeared core electrons"
            );
        }

        Ok(partial)
    }
}
