//! Analytic smooth-function shapes over a grid.
//!
//! Four kinds cover every use in the engine:
//!
//! - `Gaussian` — smeared nuclear/core charges;
//! - `Erfc` — a complementary-error-function bump normalised to carry a
//!   given charge (solvent probes);
//! - `ScaledErfc` — an erfc step scaled to a given height (cavity steps,
//!   semiconductor interfaces);
//! - `ScaledErf` — the soft-sphere exclusion function: 0 at the centre,
//!   1 far away.
//!
//! All shapes support the dimensional reductions of
//! [`Grid::min_distance`](crate::grid::Grid::min_distance): point (`dim = 0`),
//! line (`dim = 1`), or planar (`dim = 2`) symmetry about `axis`.

use std::sync::Arc;

use libm::{erf, erfc};
use ndarray::{Array3, Zip};
use thiserror::Error;
use tracing::warn;

use crate::field::{ScalarField, TensorField, VectorField};
use crate::grid::Grid;

/// Exponent cutoff beyond which a Gaussian is numerically zero.
const EXP_TOL: f64 = 4e1;

/// Tolerance below which widths, spreads, and distances are treated as zero.
const FUNC_TOL: f64 = 1e-10;

const SQRTPI: f64 = 1.772_453_850_905_516;

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("spread {0:.3e} is too small for a smooth function")]
    DegenerateSpread(f64),

    #[error("width {0:.3e} is too small for an erfc-family function")]
    DegenerateWidth(f64),

    #[error("system dimensionality must be 0, 1, or 2, got {0}")]
    InvalidDim(usize),

    #[error("axis must be 0, 1, or 2, got {0}")]
    InvalidAxis(usize),

    #[error("{op} is not defined for {kind:?} functions")]
    Unsupported { kind: FunctionKind, op: &'static str },
}

/// The closed set of smooth-function shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Gaussian,
    Erfc,
    ScaledErfc,
    ScaledErf,
}

/// An analytic smooth function: shape parameters only, evaluated on demand
/// against a grid.
#[derive(Debug, Clone)]
pub struct SmoothFunction {
    kind: FunctionKind,
    dim: usize,
    axis: usize,
    width: f64,
    spread: f64,
    /// Total charge (Gaussian/Erfc) or step height (scaled kinds).
    volume: f64,
    pos: [f64; 3],
    label: String,
}

impl SmoothFunction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: FunctionKind,
        dim: usize,
        axis: usize,
        width: f64,
        spread: f64,
        volume: f64,
        pos: [f64; 3],
        label: impl Into<String>,
    ) -> Result<Self, FunctionError> {
        if dim > 2 {
            return Err(FunctionError::InvalidDim(dim));
        }
        if axis > 2 {
            return Err(FunctionError::InvalidAxis(axis));
        }
        if spread.abs() < FUNC_TOL {
            return Err(FunctionError::DegenerateSpread(spread));
        }
        if kind != FunctionKind::Gaussian && width < FUNC_TOL {
            return Err(FunctionError::DegenerateWidth(width));
        }

        Ok(Self {
            kind,
            dim,
            axis,
            width,
            spread,
            volume,
            pos,
            label: label.into(),
        })
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    pub fn pos(&self) -> [f64; 3] {
        self.pos
    }

    /// Move the function centre (ionic steps).
    pub fn set_pos(&mut self, pos: [f64; 3]) {
        self.pos = pos;
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width;
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate the function on the grid.
    pub fn density(&self, grid: &Arc<Grid>) -> ScalarField {
        match self.kind {
            FunctionKind::Gaussian => self.gaussian_density(grid),
            _ => self.erfc_density(grid),
        }
    }

    /// Evaluate the analytic gradient on the grid.
    pub fn gradient(&self, grid: &Arc<Grid>) -> VectorField {
        match self.kind {
            FunctionKind::Gaussian => self.gaussian_gradient(grid),
            _ => self.erfc_gradient(grid),
        }
    }

    /// Evaluate the analytic Laplacian. Defined for the erfc family only.
    pub fn laplacian(&self, grid: &Arc<Grid>) -> Result<ScalarField, FunctionError> {
        if self.kind == FunctionKind::Gaussian {
            return Err(FunctionError::Unsupported {
                kind: self.kind,
                op: "laplacian",
            });
        }
        Ok(self.erfc_laplacian(grid))
    }

    /// Evaluate the analytic Hessian. Defined for the erfc family only.
    pub fn hessian(&self, grid: &Arc<Grid>) -> Result<TensorField, FunctionError> {
        if self.kind == FunctionKind::Gaussian {
            return Err(FunctionError::Unsupported {
                kind: self.kind,
                op: "hessian",
            });
        }
        Ok(self.erfc_hessian(grid))
    }

    /// Radial derivative df/dd. Defined for the erfc family only.
    pub fn derivative(&self, grid: &Arc<Grid>) -> Result<ScalarField, FunctionError> {
        if self.kind == FunctionKind::Gaussian {
            return Err(FunctionError::Unsupported {
                kind: self.kind,
                op: "radial derivative",
            });
        }

        let (_, r2) = self.distances(grid);
        let a = self.erfc_scale(grid);
        let data = r2.data().mapv(|d2| {
            let d = d2.sqrt();
            let arg = (d - self.width) / self.spread;
            a * gprime(arg, self.spread)
        });
        Ok(ScalarField::from_data(
            grid.clone(),
            data,
            format!("{}_derivative", self.label),
        ))
    }

    // ---- Gaussian shapes -------------------------------------------------

    fn gaussian_scale(&self, grid: &Grid) -> f64 {
        let sigma = self.spread;
        match self.dim {
            0 => self.volume / (SQRTPI * sigma).powi(3),
            1 => self.volume / (grid.length(self.axis) * (SQRTPI * sigma).powi(2)),
            // a sheet: charge spread over the cell cross-section
            2 => self.volume * grid.length(self.axis) / (grid.volume() * SQRTPI * sigma),
            _ => unreachable!("dim validated at construction"),
        }
    }

    fn gaussian_density(&self, grid: &Arc<Grid>) -> ScalarField {
        let (_, r2) = self.distances(grid);
        let spread2 = self.spread * self.spread;
        let scale = self.gaussian_scale(grid);

        let data = r2.data().mapv(|d2| {
            let x = d2 / spread2;
            if x <= EXP_TOL {
                scale * (-x).exp()
            } else {
                0.0
            }
        });

        ScalarField::from_data(grid.clone(), data, self.label.clone())
    }

    fn gaussian_gradient(&self, grid: &Arc<Grid>) -> VectorField {
        let (r, r2) = self.distances(grid);
        let spread2 = self.spread * self.spread;
        let scale = self.gaussian_scale(grid);

        let mut out = VectorField::new(grid.clone(), self.label.clone());
        for l in 0..3 {
            Zip::from(out.component_mut(l))
                .and(r.component(l))
                .and(r2.data())
                .for_each(|o, &rl, &d2| {
                    let x = d2 / spread2;
                    if x <= EXP_TOL {
                        *o = -2.0 * scale * (-x).exp() * rl / spread2;
                    }
                });
        }
        out
    }

    // ---- erfc-family shapes ----------------------------------------------

    /// Prefactor A such that the shape is `A·erfc(arg)` plus, for the
    /// soft-sphere kind, the constant offset that turns the bump into an
    /// exclusion function.
    fn erfc_scale(&self, grid: &Grid) -> f64 {
        let analytic = self.erfc_volume(grid);
        let charge = match self.kind {
            FunctionKind::Erfc => self.volume,
            FunctionKind::ScaledErfc => self.volume * analytic,
            FunctionKind::ScaledErf => -self.volume * analytic,
            FunctionKind::Gaussian => unreachable!("gaussians use gaussian_scale"),
        };
        charge / (2.0 * analytic)
    }

    fn erfc_offset(&self) -> f64 {
        match self.kind {
            FunctionKind::ScaledErf => self.volume,
            _ => 0.0,
        }
    }

    /// Analytic integral of erfc((d − w)/σ)/2 over the reduced geometry.
    fn erfc_volume(&self, grid: &Grid) -> f64 {
        let spread = self.spread;
        let width = self.width;
        let t = spread / width;
        let invt = width / spread;
        let f1 = (1.0 + erf(invt)) * 0.5;
        let f2 = (-invt * invt).exp() * 0.5 / SQRTPI;

        match self.dim {
            0 => {
                4.0 * std::f64::consts::PI / 3.0
                    * width.powi(3)
                    * ((1.0 + 1.5 * t * t) * f1 + (1.0 + t * t) * t * f2)
            }
            1 => {
                std::f64::consts::PI
                    * width.powi(2)
                    * grid.length(self.axis)
                    * ((1.0 + 0.5 * t * t) * f1 + t * f2)
            }
            2 => 2.0 * width * grid.volume() / grid.length(self.axis),
            _ => unreachable!("dim validated at construction"),
        }
    }

    fn erfc_density(&self, grid: &Arc<Grid>) -> ScalarField {
        let (_, r2) = self.distances(grid);
        let analytic = self.erfc_volume(grid);
        let a = self.erfc_scale(grid);
        let offset = self.erfc_offset();

        let mut integral = 0.0;
        let data = r2.data().mapv(|d2| {
            let arg = (d2.sqrt() - self.width) / self.spread;
            let raw = erfc(arg);
            integral += raw;
            offset + a * raw
        });
        integral *= grid.dv() * 0.5;

        // Discretisation check: the numeric integral of erfc/2 should match
        // the analytic volume.
        if ((integral - analytic) / analytic).abs() > 1e-4 {
            warn!(
                label = %self.label,
                numeric = integral,
                analytic,
                "erfc integral deviates from its analytic volume"
            );
        }

        ScalarField::from_data(grid.clone(), data, self.label.clone())
    }

    fn erfc_gradient(&self, grid: &Arc<Grid>) -> VectorField {
        let (r, r2) = self.distances(grid);
        let a = self.erfc_scale(grid);

        let mut out = VectorField::new(grid.clone(), self.label.clone());
        for l in 0..3 {
            Zip::from(out.component_mut(l))
                .and(r.component(l))
                .and(r2.data())
                .for_each(|o, &rl, &d2| {
                    let d = d2.sqrt();
                    if d > FUNC_TOL {
                        let arg = (d - self.width) / self.spread;
                        *o = a * gprime(arg, self.spread) * rl / d;
                    }
                });
        }
        out
    }

    fn erfc_laplacian(&self, grid: &Arc<Grid>) -> ScalarField {
        let (_, r2) = self.distances(grid);
        let a = self.erfc_scale(grid);
        // radial measure: 2/d for spherical, 1/d for cylindrical, 0 for planar
        let m = (2 - self.dim) as f64;

        let data = r2.data().mapv(|d2| {
            let d = d2.sqrt();
            if d > FUNC_TOL {
                let arg = (d - self.width) / self.spread;
                let gp = gprime(arg, self.spread);
                let gpp = -2.0 * arg / self.spread * gp;
                a * (gpp + m / d * gp)
            } else {
                0.0
            }
        });

        ScalarField::from_data(grid.clone(), data, format!("{}_laplacian", self.label))
    }

    fn erfc_hessian(&self, grid: &Arc<Grid>) -> TensorField {
        let (r, r2) = self.distances(grid);
        let a = self.erfc_scale(grid);
        let proj = self.projector();

        let mut out = TensorField::new(grid.clone(), format!("{}_hessian", self.label));
        for i in 0..3 {
            for j in 0..3 {
                let p_ij = proj[i][j];
                Zip::from(out.component_mut(i, j))
                    .and(r.component(i))
                    .and(r.component(j))
                    .and(r2.data())
                    .for_each(|o, &ri, &rj, &d2| {
                        let d = d2.sqrt();
                        if d > FUNC_TOL {
                            let arg = (d - self.width) / self.spread;
                            let gp = gprime(arg, self.spread);
                            let gpp = -2.0 * arg / self.spread * gp;
                            *o = a * (gpp * ri * rj / d2 + gp * (p_ij / d - ri * rj / (d2 * d)));
                        }
                    });
            }
        }
        out
    }

    /// Projector onto the active subspace of the reduced geometry.
    fn projector(&self) -> [[f64; 3]; 3] {
        let mut p = [[0.0; 3]; 3];
        for i in 0..3 {
            let active = match self.dim {
                0 => true,
                1 => i != self.axis,
                2 => i == self.axis,
                _ => unreachable!("dim validated at construction"),
            };
            if active {
                p[i][i] = 1.0;
            }
        }
        p
    }

    fn distances(&self, grid: &Arc<Grid>) -> (VectorField, ScalarField) {
        grid.min_distance(self.pos, self.dim, self.axis)
            .expect("dim/axis validated at construction")
    }
}

/// d/dd of erfc((d − w)/σ): −2 e^{−arg²} / (√π σ).
fn gprime(arg: f64, spread: f64) -> f64 {
    let e2 = arg * arg;
    if e2 <= EXP_TOL {
        -2.0 * (-e2).exp() / (SQRTPI * spread)
    } else {
        0.0
    }
}

/// An ordered collection of smooth functions sharing a grid, with summed
/// field evaluations.
#[derive(Debug, Clone, Default)]
pub struct FunctionSet {
    functions: Vec<SmoothFunction>,
}

impl FunctionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, function: SmoothFunction) {
        self.functions.push(function);
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SmoothFunction> {
        self.functions.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SmoothFunction> {
        self.functions.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SmoothFunction> {
        self.functions.iter()
    }

    /// Sum of all member densities.
    pub fn density(&self, grid: &Arc<Grid>) -> ScalarField {
        let mut total = ScalarField::new(grid.clone(), "functions");
        for f in &self.functions {
            *total.data_mut() += f.density(grid).data();
        }
        total
    }

    /// Sum of all member gradients.
    pub fn gradient(&self, grid: &Arc<Grid>) -> VectorField {
        let mut total = VectorField::new(grid.clone(), "functions_gradient");
        for f in &self.functions {
            let g = f.gradient(grid);
            for l in 0..3 {
                *total.component_mut(l) += g.component(l);
            }
        }
        total
    }

    /// Sum of all member Laplacians.
    pub fn laplacian(&self, grid: &Arc<Grid>) -> Result<ScalarField, FunctionError> {
        let mut total = ScalarField::new(grid.clone(), "functions_laplacian");
        for f in &self.functions {
            *total.data_mut() += f.laplacian(grid)?.data();
        }
        Ok(total)
    }
}

impl<'a> IntoIterator for &'a FunctionSet {
    type Item = &'a SmoothFunction;
    type IntoIter = std::slice::Iter<'a, SmoothFunction>;

    fn into_iter(self) -> Self::IntoIter {
        self.functions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn grid() -> Arc<Grid> {
        Grid::cubic(20.0, 40, "functions").unwrap()
    }

    #[test]
    fn gaussian_integrates_to_its_charge() {
        let grid = grid();
        let g = SmoothFunction::new(
            FunctionKind::Gaussian,
            0,
            0,
            0.0,
            1.0,
            3.0,
            [10.0, 10.0, 10.0],
            "smeared_ion",
        )
        .unwrap();

        assert_relative_eq!(g.density(&grid).integral(), 3.0, max_relative = 1e-6);
    }

    #[test]
    fn erfc_integrates_to_its_charge() {
        let grid = grid();
        let f = SmoothFunction::new(
            FunctionKind::Erfc,
            0,
            0,
            3.0,
            1.0,
            2.0,
            [10.0, 10.0, 10.0],
            "probe",
        )
        .unwrap();

        assert_relative_eq!(f.density(&grid).integral(), 2.0, max_relative = 1e-4);
    }

    #[test]
    fn soft_sphere_is_zero_inside_one_outside() {
        let grid = grid();
        let s = SmoothFunction::new(
            FunctionKind::ScaledErf,
            0,
            0,
            3.0,
            0.5,
            1.0,
            [10.0, 10.0, 10.0],
            "soft_sphere",
        )
        .unwrap();

        let d = s.density(&grid);
        // centre point
        assert_abs_diff_eq!(d[[20, 20, 20]], 0.0, epsilon = 1e-6);
        // far corner, several spreads beyond the width
        assert_abs_diff_eq!(d[[0, 0, 0]], 1.0, epsilon = 1e-6);
        // everywhere in [0, 1]
        assert!(d.iter().all(|&x| (-1e-10..=1.0 + 1e-10).contains(&x)));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        // fine grid: central differences carry an O(h²) truncation error
        let grid = Grid::cubic(16.0, 64, "fd").unwrap();
        let f = SmoothFunction::new(
            FunctionKind::ScaledErfc,
            0,
            0,
            4.0,
            1.0,
            1.0,
            [8.0, 8.0, 8.0],
            "step",
        )
        .unwrap();

        let d = f.density(&grid);
        let g = f.gradient(&grid);

        // central difference along x at a point on the shoulder of the step
        let h = 0.25; // grid spacing
        let fd = (d[[49, 32, 32]] - d[[47, 32, 32]]) / (2.0 * h);
        assert_relative_eq!(g.component(0)[[48, 32, 32]], fd, max_relative = 5e-2);
    }

    #[test]
    fn laplacian_matches_finite_differences() {
        let grid = Grid::cubic(16.0, 64, "fd").unwrap();
        let f = SmoothFunction::new(
            FunctionKind::ScaledErfc,
            0,
            0,
            4.0,
            1.0,
            1.0,
            [8.0, 8.0, 8.0],
            "step",
        )
        .unwrap();

        let d = f.density(&grid);
        let lapl = f.laplacian(&grid).unwrap();

        let h: f64 = 0.25;
        let at = |i: usize| d[[i, 32, 32]];
        let fd_xx = (at(49) - 2.0 * at(48) + at(47)) / (h * h);
        let at_y = |j: usize| d[[48, j, 32]];
        let fd_yy = (at_y(33) - 2.0 * at_y(32) + at_y(31)) / (h * h);
        let at_z = |k: usize| d[[48, 32, k]];
        let fd_zz = (at_z(33) - 2.0 * at_z(32) + at_z(31)) / (h * h);

        assert_relative_eq!(
            lapl[[48, 32, 32]],
            fd_xx + fd_yy + fd_zz,
            max_relative = 1e-1
        );
    }

    #[test]
    fn hessian_trace_equals_laplacian() {
        let grid = grid();
        let f = SmoothFunction::new(
            FunctionKind::ScaledErf,
            0,
            0,
            3.0,
            0.8,
            1.0,
            [10.0, 10.0, 10.0],
            "sphere",
        )
        .unwrap();

        let lapl = f.laplacian(&grid).unwrap();
        let trace = f.hessian(&grid).unwrap().trace();

        for idx in [[25, 20, 20], [28, 22, 18], [14, 14, 26]] {
            assert_relative_eq!(trace[idx], lapl[idx], max_relative = 1e-10);
        }
    }

    #[test]
    fn gaussian_has_no_analytic_laplacian() {
        let grid = grid();
        let g = SmoothFunction::new(
            FunctionKind::Gaussian,
            0,
            0,
            0.0,
            1.0,
            1.0,
            [10.0; 3],
            "gaussian",
        )
        .unwrap();
        assert!(matches!(
            g.laplacian(&grid),
            Err(FunctionError::Unsupported { .. })
        ));
    }

    #[test]
    fn degenerate_spread_is_rejected() {
        assert!(SmoothFunction::new(
            FunctionKind::Erfc,
            0,
            0,
            1.0,
            0.0,
            1.0,
            [0.0; 3],
            "bad"
        )
        .is_err());
    }
}
