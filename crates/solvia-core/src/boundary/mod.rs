//! The boundary engine: smooth cavity models and their derivatives.
//!
//! A boundary is a switching function s(r) ∈ [0, 1] marking the interface
//! between the quantum region (s = 1 inside the cavity) and the continuum
//! (s = 0 in the bulk solvent), together with its gradient, Laplacian, and
//! surface-derivative fields up to the derivative level fixed at
//! construction. Three interchangeable models produce it:
//!
//! - [`ElectronicBoundary`] — a smooth function of the local electronic
//!   density between two thresholds;
//! - [`IonicBoundary`] — the complement of a product of per-ion soft
//!   spheres;
//! - [`SystemBoundary`] — a single smooth step centred on the system shape.
//!
//! # State machine
//!
//! Every boundary moves through `Stale → (Partial) → Ready`, driven by
//! `update()` once per dependency change. `Partial` is reached when the
//! rigid (ionic) part is current but the soft (electronic) part is pending;
//! requesting the electronic step before the mandatory ionic step is an
//! ordering error. When an update cycle finds its dependency unchanged, a
//! `Ready` boundary is reset to `Stale` — the reset is an assignment, pinned
//! by a regression test below.

pub mod electronic;
pub mod ionic;
pub mod system;

use std::sync::Arc;

use ndarray::Zip;
use thiserror::Error;
use tracing::debug;

use solvia_grid::functions::{FunctionError, FunctionKind, SmoothFunction};
use solvia_grid::{Grid, ScalarField, TensorField, VectorField};

use crate::constants::SQRTPI;
use crate::core::CoreContainer;

pub use electronic::{ElectronicBoundary, ElectronicMode};
pub use ionic::IonicBoundary;
pub use system::SystemBoundary;

/// Points with |∇s|² below this carry no surface contribution.
const GRAD_TOL: f64 = 1e-50;

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("missed ionic update step: electronic update requested on a stale boundary")]
    MissedIonicUpdate,

    #[error("derivative method {method:?} is not supported by the {mode} boundary")]
    IncompatibleDerivMethod {
        mode: &'static str,
        method: DerivMethod,
    },

    #[error("boundary requires {0}, which was not provided")]
    MissingDependency(&'static str),

    #[error("derivative level {needed:?} exceeds the level {allocated:?} fixed at construction")]
    DerivativesUnavailable {
        needed: DerivLevel,
        allocated: DerivLevel,
    },

    #[error("{0} is not yet supported")]
    Unsupported(&'static str),

    #[error(transparent)]
    Function(#[from] FunctionError),
}

/// Update status of a boundary across an SCF/ionic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Not updated yet, or dependency unchanged since the last cycle.
    Stale,
    /// Rigid (ionic) part current, soft (electronic) part pending.
    Partial,
    /// Fully current and ready for consumption.
    Ready,
}

/// How many derivative fields a boundary allocates and maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DerivLevel {
    None,
    Gradient,
    Laplacian,
    /// Gradient, Laplacian, and the Hessian-derived surface derivative.
    Full,
}

impl DerivLevel {
    /// Level implied by the consumer flags of the embedding setup.
    pub fn from_needs(need_gradient: bool, need_laplacian: bool, need_hessian: bool) -> Self {
        if need_hessian {
            DerivLevel::Full
        } else if need_laplacian {
            DerivLevel::Laplacian
        } else if need_gradient {
            DerivLevel::Gradient
        } else {
            DerivLevel::None
        }
    }
}

/// Strategy used to differentiate the switching function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivMethod {
    /// Differentiate the switching function spectrally.
    Fft,
    /// Differentiate the underlying density spectrally, then apply the
    /// switching-function derivatives via the chain rule.
    Chain,
    /// Per-sphere analytic accumulation (ionic boundary).
    Lowmem,
    /// Alias of the spectral path kept for input compatibility.
    Highmem,
}

/// Parameters of the solvent-aware filling correction.
#[derive(Debug, Clone, Copy)]
pub struct SolventAwareParams {
    pub solvent_radius: f64,
    pub radial_scale: f64,
    pub radial_spread: f64,
    pub filling_threshold: f64,
    pub filling_spread: f64,
}

/// State of the solvent-aware correction.
#[derive(Debug)]
pub struct SolventAware {
    probe: SmoothFunction,
    filling_threshold: f64,
    filling_spread: f64,
    /// The unfilled switching function.
    local: ScalarField,
    /// The normalised probe density.
    probe_density: ScalarField,
    /// Pocket-filling fraction at each point.
    filling: ScalarField,
    /// Derivative of the filling with respect to the filled fraction.
    dfilling: ScalarField,
}

/// Fields and bookkeeping shared by every boundary model.
#[derive(Debug)]
pub struct BoundaryData {
    label: String,
    grid: Arc<Grid>,
    cores: CoreContainer,
    deriv_level: DerivLevel,
    deriv_method: DerivMethod,
    status: UpdateStatus,
    switch: ScalarField,
    gradient: Option<VectorField>,
    laplacian: Option<ScalarField>,
    dsurface: Option<ScalarField>,
    /// Retained Hessian, allocated only with solvent awareness at full
    /// derivative level.
    hessian: Option<TensorField>,
    volume: f64,
    surface: f64,
    solvent_aware: Option<SolventAware>,
}

impl BoundaryData {
    pub fn new(
        grid: Arc<Grid>,
        cores: CoreContainer,
        deriv_level: DerivLevel,
        deriv_method: DerivMethod,
        label: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let switch = ScalarField::new(grid.clone(), format!("{label}_boundary"));
        let gradient = (deriv_level >= DerivLevel::Gradient)
            .then(|| VectorField::new(grid.clone(), format!("{label}_boundary_gradient")));
        let laplacian = (deriv_level >= DerivLevel::Laplacian)
            .then(|| ScalarField::new(grid.clone(), format!("{label}_boundary_laplacian")));
        let dsurface = (deriv_level >= DerivLevel::Full)
            .then(|| ScalarField::new(grid.clone(), format!("{label}_boundary_dsurface")));

        Self {
            grid,
            cores,
            deriv_level,
            deriv_method,
            status: UpdateStatus::Stale,
            switch,
            gradient,
            laplacian,
            dsurface,
            hessian: None,
            volume: 0.0,
            surface: 0.0,
            solvent_aware: None,
            label,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn cores(&self) -> &CoreContainer {
        &self.cores
    }

    pub fn deriv_level(&self) -> DerivLevel {
        self.deriv_level
    }

    pub fn deriv_method(&self) -> DerivMethod {
        self.deriv_method
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: UpdateStatus) {
        self.status = status;
    }

    /// Reset a `Ready` boundary to `Stale` when its dependency did not
    /// change in this update cycle.
    pub(crate) fn reset_if_ready(&mut self) {
        if self.status == UpdateStatus::Ready {
            self.status = UpdateStatus::Stale;
        }
    }

    pub fn switch(&self) -> &ScalarField {
        &self.switch
    }

    pub(crate) fn switch_mut(&mut self) -> &mut ScalarField {
        &mut self.switch
    }

    pub fn gradient(&self) -> Option<&VectorField> {
        self.gradient.as_ref()
    }

    pub(crate) fn gradient_mut(&mut self) -> Option<&mut VectorField> {
        self.gradient.as_mut()
    }

    pub fn laplacian(&self) -> Option<&ScalarField> {
        self.laplacian.as_ref()
    }

    pub(crate) fn laplacian_mut(&mut self) -> Option<&mut ScalarField> {
        self.laplacian.as_mut()
    }

    pub fn dsurface(&self) -> Option<&ScalarField> {
        self.dsurface.as_ref()
    }

    pub fn hessian(&self) -> Option<&TensorField> {
        self.hessian.as_ref()
    }

    /// Cavity volume ∫ s dV from the last build.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Cavity surface ∫ |∇s| dV from the last build.
    pub fn surface(&self) -> f64 {
        self.surface
    }

    pub fn solvent_aware(&self) -> bool {
        self.solvent_aware.is_some()
    }

    /// Enable the solvent-aware filling correction with a radial probe of
    /// the given size.
    pub fn activate_solvent_awareness(
        &mut self,
        params: SolventAwareParams,
    ) -> Result<(), BoundaryError> {
        let probe = SmoothFunction::new(
            FunctionKind::Erfc,
            0,
            0,
            params.solvent_radius * params.radial_scale,
            params.radial_spread,
            1.0,
            [0.0; 3],
            format!("{}_probe", self.label),
        )?;

        self.solvent_aware = Some(SolventAware {
            probe,
            filling_threshold: params.filling_threshold,
            filling_spread: params.filling_spread,
            local: ScalarField::new(self.grid.clone(), format!("{}_local", self.label)),
            probe_density: ScalarField::new(self.grid.clone(), format!("{}_probe", self.label)),
            filling: ScalarField::new(self.grid.clone(), format!("{}_filling", self.label)),
            dfilling: ScalarField::new(self.grid.clone(), format!("{}_dfilling", self.label)),
        });

        if self.deriv_level >= DerivLevel::Full {
            self.hessian = Some(TensorField::new(
                self.grid.clone(),
                format!("{}_boundary_hessian", self.label),
            ));
        }

        Ok(())
    }

    /// Spectral derivatives of `source` up to the allocated level. At full
    /// level the Laplacian is taken from the Hessian trace so the surface
    /// derivative and Laplacian stay mutually consistent.
    pub(crate) fn compute_derivatives_fft(&mut self, source: &ScalarField) {
        let derivatives = self.cores.derivatives();

        if self.deriv_level >= DerivLevel::Gradient {
            let gradient = derivatives.gradient(source);
            self.gradient
                .as_mut()
                .expect("allocated by construction")
                .assign(&gradient);
        }

        if self.deriv_level == DerivLevel::Laplacian {
            let laplacian = derivatives.laplacian(source);
            self.laplacian
                .as_mut()
                .expect("allocated by construction")
                .assign(&laplacian);
        }

        if self.deriv_level == DerivLevel::Full {
            let hessian = derivatives.hessian(source);
            self.laplacian
                .as_mut()
                .expect("allocated by construction")
                .assign(&hessian.trace());
            let dsurface = dsurface_of(
                self.gradient.as_ref().expect("allocated by construction"),
                &hessian,
            );
            self.dsurface
                .as_mut()
                .expect("allocated by construction")
                .assign(&dsurface);
            if let Some(store) = self.hessian.as_mut() {
                for a in 0..3 {
                    for b in 0..3 {
                        store.component_mut(a, b).assign(hessian.component(a, b));
                    }
                }
            }
        }
    }

    /// Refresh the volume and surface scalars after a build.
    pub(crate) fn finalize_measures(&mut self) {
        self.volume = self.switch.integral();
        if let Some(gradient) = &self.gradient {
            self.surface = gradient.modulus().integral();
        }
        debug!(
            boundary = %self.label,
            volume = self.volume,
            surface = self.surface,
            "boundary rebuilt"
        );
    }

    /// Apply the solvent-aware filling once the boundary is fully current.
    pub(crate) fn update_solvent_aware(&mut self) {
        if self.solvent_aware.is_some() && self.status == UpdateStatus::Ready {
            self.build_solvent_aware();
        }
    }

    /// Fill narrow solvent pockets: convolve the cavity with the probe,
    /// push the filled fraction through a smooth threshold step, and raise
    /// the switch where the step fires. Derivatives are recomputed
    /// spectrally on the corrected switch.
    fn build_solvent_aware(&mut self) {
        let (probe_density, filled) = {
            let sa = self.solvent_aware.as_ref().expect("checked by caller");
            let probe_density = sa.probe.density(&self.grid);
            let filled = self
                .cores
                .derivatives()
                .convolution(&self.switch, &probe_density);
            (probe_density, filled)
        };

        {
            let sa = self.solvent_aware.as_mut().expect("checked by caller");
            sa.local.assign(&self.switch);
            sa.probe_density = probe_density;

            let threshold = sa.filling_threshold;
            let spread = sa.filling_spread;
            Zip::from(sa.filling.data_mut())
                .and(sa.dfilling.data_mut())
                .and(filled.data())
                .for_each(|fill, dfill, &f| {
                    *fill = smooth_step(f, threshold, spread);
                    *dfill = smooth_step_derivative(f, threshold, spread);
                });

            Zip::from(self.switch.data_mut())
                .and(sa.local.data())
                .and(sa.filling.data())
                .for_each(|s, &local, &fill| {
                    *s = local + (1.0 - local) * fill;
                });
        }

        if self.deriv_level >= DerivLevel::Gradient {
            let switch = self.switch.clone();
            self.compute_derivatives_fft(&switch);
        }
        self.finalize_measures();
    }

    /// Chain the filling correction into an energy-boundary sensitivity:
    /// dE/ds_local = dE/ds̃ (1 − filling) + probe ∗ [dE/ds̃ (1 − local) dfilling].
    pub fn solvent_aware_de_dboundary(&self, de_dboundary: &mut ScalarField) {
        let Some(sa) = &self.solvent_aware else {
            return;
        };

        let mut aux = ScalarField::new(self.grid.clone(), "de_dboundary_filling");
        Zip::from(aux.data_mut())
            .and(de_dboundary.data())
            .and(sa.local.data())
            .and(sa.dfilling.data())
            .for_each(|a, &de, &local, &dfill| {
                *a = de * (1.0 - local) * dfill;
            });

        let spread_back = self.cores.derivatives().convolution(&aux, &sa.probe_density);

        Zip::from(de_dboundary.data_mut())
            .and(sa.filling.data())
            .and(spread_back.data())
            .for_each(|de, &fill, &back| {
                *de = *de * (1.0 - fill) + back;
            });
    }

    // ---- embedding energy contributions ----------------------------------

    /// Confinement potential: confine · (1 − s).
    pub fn calc_vconfine(&self, confine: f64) -> ScalarField {
        let mut v = ScalarField::new(self.grid.clone(), format!("{}_vconfine", self.label));
        Zip::from(v.data_mut())
            .and(self.switch.data())
            .for_each(|o, &s| *o = confine * (1.0 - s));
        v
    }

    /// Confinement energy ∫ ρ v_confine dV.
    pub fn calc_econfine(&self, rho: &ScalarField, vconfine: &ScalarField) -> f64 {
        rho.scalar_product(vconfine)
    }

    pub fn calc_deconfine_dboundary(
        &self,
        confine: f64,
        rho: &ScalarField,
        de_dboundary: &mut ScalarField,
    ) {
        Zip::from(de_dboundary.data_mut())
            .and(rho.data())
            .for_each(|o, &r| *o -= confine * r);
    }

    /// PV-like cavitation energy.
    pub fn calc_evolume(&self, pressure: f64) -> f64 {
        pressure * self.volume
    }

    pub fn calc_devolume_dboundary(&self, pressure: f64, de_dboundary: &mut ScalarField) {
        de_dboundary.data_mut().mapv_inplace(|x| x + pressure);
    }

    /// Surface-tension cavitation energy.
    pub fn calc_esurface(&self, surface_tension: f64) -> f64 {
        surface_tension * self.surface
    }

    pub fn calc_desurface_dboundary(
        &self,
        surface_tension: f64,
        de_dboundary: &mut ScalarField,
    ) -> Result<(), BoundaryError> {
        let dsurface = self
            .dsurface
            .as_ref()
            .ok_or(BoundaryError::DerivativesUnavailable {
                needed: DerivLevel::Full,
                allocated: self.deriv_level,
            })?;
        Zip::from(de_dboundary.data_mut())
            .and(dsurface.data())
            .for_each(|o, &d| *o += surface_tension * d);
        Ok(())
    }
}

/// Surface derivative (gᵀHg − |g|² tr H)/|g|³ — the local mean curvature
/// scaled by the interface density.
pub(crate) fn dsurface_of(gradient: &VectorField, hessian: &TensorField) -> ScalarField {
    let grid = gradient.grid().clone();
    let mut out = ScalarField::new(grid.clone(), "dsurface");

    let [n0, n1, n2] = grid.nr();
    for i in 0..n0 {
        for j in 0..n1 {
            for k in 0..n2 {
                let idx = [i, j, k];
                let g = [
                    gradient.component(0)[idx],
                    gradient.component(1)[idx],
                    gradient.component(2)[idx],
                ];
                let g2 = g[0] * g[0] + g[1] * g[1] + g[2] * g[2];
                if g2 < GRAD_TOL {
                    continue;
                }

                let mut ghg = 0.0;
                let mut trace = 0.0;
                for a in 0..3 {
                    trace += hessian.component(a, a)[idx];
                    for b in 0..3 {
                        ghg += g[a] * g[b] * hessian.component(a, b)[idx];
                    }
                }

                out[idx] = (ghg - g2 * trace) / (g2 * g2.sqrt());
            }
        }
    }

    out
}

/// Smooth threshold step through erfc: 0 below `x0`, 1 above.
fn smooth_step(x: f64, x0: f64, spread: f64) -> f64 {
    0.5 * libm::erfc((x0 - x) / spread)
}

fn smooth_step_derivative(x: f64, x0: f64, spread: f64) -> f64 {
    let arg = (x0 - x) / spread;
    (-arg * arg).exp() / (SQRTPI * spread)
}

/// The read surface every boundary model exposes to its consumers.
pub trait Boundary {
    fn data(&self) -> &BoundaryData;

    fn data_mut(&mut self) -> &mut BoundaryData;

    /// Partial derivative of the switching function with respect to the
    /// position of ion `index`.
    fn dboundary_dions(&self, index: usize) -> Result<VectorField, BoundaryError>;

    /// True for boundaries derived from the electronic density; selects the
    /// exponential permittivity interpolation.
    fn density_derived(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FftCore;

    fn data(level: DerivLevel) -> BoundaryData {
        let grid = Grid::cubic(10.0, 8, "boundary").unwrap();
        let core = Arc::new(FftCore::new(grid.clone()));
        let cores = CoreContainer::new("test", core.clone(), core);
        BoundaryData::new(grid, cores, level, DerivMethod::Fft, "test")
    }

    #[test]
    fn derivative_fields_exist_iff_level_demands_them() {
        let none = data(DerivLevel::None);
        assert!(none.gradient().is_none());
        assert!(none.laplacian().is_none());
        assert!(none.dsurface().is_none());

        let grad = data(DerivLevel::Gradient);
        assert!(grad.gradient().is_some());
        assert!(grad.laplacian().is_none());

        let full = data(DerivLevel::Full);
        assert!(full.gradient().is_some());
        assert!(full.laplacian().is_some());
        assert!(full.dsurface().is_some());
    }

    #[test]
    fn stale_reset_is_an_assignment() {
        // Regression: the reset branch must assign, not compare. A Ready
        // boundary whose dependency did not change drops to Stale.
        let mut d = data(DerivLevel::None);
        d.set_status(UpdateStatus::Ready);
        d.reset_if_ready();
        assert_eq!(d.status(), UpdateStatus::Stale);

        // A Partial boundary is mid-cycle and must not be reset.
        d.set_status(UpdateStatus::Partial);
        d.reset_if_ready();
        assert_eq!(d.status(), UpdateStatus::Partial);
    }

    #[test]
    fn desurface_requires_full_level() {
        let d = data(DerivLevel::Gradient);
        let mut de = ScalarField::new(d.grid().clone(), "de");
        assert!(matches!(
            d.calc_desurface_dboundary(1.0, &mut de),
            Err(BoundaryError::DerivativesUnavailable { .. })
        ));
    }

    #[test]
    fn smooth_step_limits() {
        assert!(smooth_step(0.0, 0.5, 0.02) < 1e-10);
        assert!((smooth_step(1.0, 0.5, 0.02) - 1.0).abs() < 1e-10);
        assert!((smooth_step(0.5, 0.5, 0.02) - 0.5).abs() < 1e-12);
    }
}
