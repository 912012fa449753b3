//! Scalar, vector, and rank-2 tensor fields over a grid.
//!
//! A field is data over the grid tagged with a human-readable label for
//! diagnostics. Fields are value-like: each is owned by whichever component
//! allocates it and is passed by reference into arithmetic — backing storage
//! is never shared mutably across components.
//!
//! Derived quantities (multipole moments, gradient modulus, tensor trace)
//! are computed on demand and returned fresh; nothing is cached behind the
//! caller's back.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ndarray::{Array3, Zip};

use crate::grid::Grid;

/// Charge, dipole, and (component-wise second) quadrupole moments of a
/// scalar field about an origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Multipoles {
    pub charge: f64,
    pub dipole: [f64; 3],
    pub quadrupole: [f64; 3],
}

/// A scalar field over a grid.
#[derive(Debug, Clone)]
pub struct ScalarField {
    grid: Arc<Grid>,
    label: String,
    data: Array3<f64>,
}

impl ScalarField {
    /// A zero-initialised field.
    pub fn new(grid: Arc<Grid>, label: impl Into<String>) -> Self {
        let [n0, n1, n2] = grid.nr();
        Self {
            grid,
            label: label.into(),
            data: Array3::zeros((n0, n1, n2)),
        }
    }

    pub fn from_data(grid: Arc<Grid>, data: Array3<f64>, label: impl Into<String>) -> Self {
        debug_assert_eq!(data.dim(), {
            let [n0, n1, n2] = grid.nr();
            (n0, n1, n2)
        });
        Self {
            grid,
            label: label.into(),
            data,
        }
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    /// Replace the backing data wholesale.
    pub fn assign(&mut self, other: &ScalarField) {
        self.data.assign(&other.data);
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// ∫ f dV over the cell.
    pub fn integral(&self) -> f64 {
        self.data.sum() * self.grid.dv()
    }

    /// Σ f² over grid points (no volume element) — the convergence metric of
    /// the iterative solvers.
    pub fn euclidean_norm(&self) -> f64 {
        self.data.iter().map(|f| f * f).sum()
    }

    /// √(Σ f² / N).
    pub fn quadratic_mean(&self) -> f64 {
        (self.euclidean_norm() / self.grid.nnr() as f64).sqrt()
    }

    /// ∫ f g dV.
    pub fn scalar_product(&self, other: &ScalarField) -> f64 {
        debug_assert!(Arc::ptr_eq(&self.grid, &other.grid));
        Zip::from(&self.data)
            .and(&other.data)
            .fold(0.0, |acc, f, g| acc + f * g)
            * self.grid.dv()
    }

    /// Charge, dipole, and quadrupole moments about `origin`, using
    /// minimum-image distances.
    pub fn multipoles(&self, origin: [f64; 3]) -> Multipoles {
        let (r, _) = self
            .grid
            .min_distance(origin, 0, 0)
            .expect("full-dimensional distance is always valid");

        let mut moments = Multipoles {
            charge: self.integral(),
            ..Default::default()
        };

        for l in 0..3 {
            let rl = r.component(l);
            let (mut dip, mut quad) = (0.0, 0.0);
            Zip::from(&self.data).and(rl).for_each(|f, x| {
                dip += f * x;
                quad += f * x * x;
            });
            moments.dipole[l] = dip * self.grid.dv();
            moments.quadrupole[l] = quad * self.grid.dv();
        }

        moments
    }
}

impl Deref for ScalarField {
    type Target = Array3<f64>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for ScalarField {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

/// A three-component vector field over a grid.
#[derive(Debug, Clone)]
pub struct VectorField {
    grid: Arc<Grid>,
    label: String,
    components: [Array3<f64>; 3],
}

impl VectorField {
    pub fn new(grid: Arc<Grid>, label: impl Into<String>) -> Self {
        let [n0, n1, n2] = grid.nr();
        let zeros = || Array3::zeros((n0, n1, n2));
        Self {
            grid,
            label: label.into(),
            components: [zeros(), zeros(), zeros()],
        }
    }

    pub fn from_components(
        grid: Arc<Grid>,
        components: [Array3<f64>; 3],
        label: impl Into<String>,
    ) -> Self {
        Self {
            grid,
            label: label.into(),
            components,
        }
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn component(&self, l: usize) -> &Array3<f64> {
        &self.components[l]
    }

    pub fn component_mut(&mut self, l: usize) -> &mut Array3<f64> {
        &mut self.components[l]
    }

    pub fn components(&self) -> &[Array3<f64>; 3] {
        &self.components
    }

    pub fn assign(&mut self, other: &VectorField) {
        for (c, o) in self.components.iter_mut().zip(&other.components) {
            c.assign(o);
        }
    }

    pub fn fill(&mut self, value: f64) {
        for c in &mut self.components {
            c.fill(value);
        }
    }

    /// Scale every component in place.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.components {
            c.mapv_inplace(|x| x * factor);
        }
    }

    /// Per-point squared modulus |v|².
    pub fn squared_modulus(&self) -> ScalarField {
        let mut out = Array3::zeros(self.components[0].dim());
        for c in &self.components {
            Zip::from(&mut out).and(c).for_each(|o, x| *o += x * x);
        }
        ScalarField::from_data(self.grid.clone(), out, format!("{}_modulus_sq", self.label))
    }

    /// Per-point modulus |v|.
    pub fn modulus(&self) -> ScalarField {
        let mut data = self.squared_modulus().data;
        data.mapv_inplace(f64::sqrt);
        ScalarField::from_data(self.grid.clone(), data, format!("{}_modulus", self.label))
    }

    /// Pointwise dot product with another vector field.
    pub fn dot(&self, other: &VectorField) -> ScalarField {
        debug_assert!(Arc::ptr_eq(&self.grid, &other.grid));
        let mut out = Array3::zeros(self.components[0].dim());
        for (a, b) in self.components.iter().zip(&other.components) {
            Zip::from(&mut out).and(a).and(b).for_each(|o, x, y| *o += x * y);
        }
        ScalarField::from_data(self.grid.clone(), out, "dot")
    }

    /// ∫ v_l ρ dV for each Cartesian component.
    pub fn moment(&self, density: &ScalarField) -> [f64; 3] {
        debug_assert!(Arc::ptr_eq(&self.grid, density.grid()));
        let mut m = [0.0; 3];
        for (l, c) in self.components.iter().enumerate() {
            m[l] = Zip::from(c)
                .and(density.data())
                .fold(0.0, |acc, v, f| acc + v * f)
                * self.grid.dv();
        }
        m
    }
}

/// A rank-2 tensor field over a grid, components in row-major order.
#[derive(Debug, Clone)]
pub struct TensorField {
    grid: Arc<Grid>,
    label: String,
    components: [Array3<f64>; 9],
}

impl TensorField {
    pub fn new(grid: Arc<Grid>, label: impl Into<String>) -> Self {
        let [n0, n1, n2] = grid.nr();
        let components = std::array::from_fn(|_| Array3::zeros((n0, n1, n2)));
        Self {
            grid,
            label: label.into(),
            components,
        }
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn component(&self, a: usize, b: usize) -> &Array3<f64> {
        &self.components[3 * a + b]
    }

    pub fn component_mut(&mut self, a: usize, b: usize) -> &mut Array3<f64> {
        &mut self.components[3 * a + b]
    }

    pub fn fill(&mut self, value: f64) {
        for c in &mut self.components {
            c.fill(value);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.components {
            c.mapv_inplace(|x| x * factor);
        }
    }

    /// The scalar trace H_xx + H_yy + H_zz.
    pub fn trace(&self) -> ScalarField {
        let mut out = self.components[0].clone();
        out += &self.components[4];
        out += &self.components[8];
        ScalarField::from_data(self.grid.clone(), out, format!("{}_trace", self.label))
    }

    /// Pointwise contraction (H · g)_a = Σ_b H_ab g_b.
    pub fn contract_gradient(&self, gradient: &VectorField) -> VectorField {
        debug_assert!(Arc::ptr_eq(&self.grid, gradient.grid()));
        let mut out = VectorField::new(self.grid.clone(), format!("{}_contracted", self.label));
        for a in 0..3 {
            for b in 0..3 {
                Zip::from(out.component_mut(a))
                    .and(self.component(a, b))
                    .and(gradient.component(b))
                    .for_each(|o, h, g| *o += h * g);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn integral_of_uniform_field_is_volume() {
        let grid = Grid::cubic(5.0, 8, "uniform").unwrap();
        let mut f = ScalarField::new(grid, "ones");
        f.fill(1.0);
        assert_abs_diff_eq!(f.integral(), 125.0, epsilon = 1e-10);
    }

    #[test]
    fn scalar_product_matches_integral() {
        let grid = Grid::cubic(4.0, 6, "prod").unwrap();
        let mut f = ScalarField::new(grid.clone(), "f");
        let mut g = ScalarField::new(grid, "g");
        f.fill(2.0);
        g.fill(3.0);
        assert_abs_diff_eq!(f.scalar_product(&g), 6.0 * 64.0, epsilon = 1e-10);
    }

    #[test]
    fn centred_gaussian_multipoles() {
        // A normalised Gaussian centred in the cell: unit charge, zero dipole.
        let grid = Grid::cubic(16.0, 32, "gauss").unwrap();
        let centre = [8.0, 8.0, 8.0];
        let spread: f64 = 1.2;
        let (_, r2) = grid.min_distance(centre, 0, 0).unwrap();

        let norm = (std::f64::consts::PI.sqrt() * spread).powi(3);
        let data = r2.data().mapv(|d2| (-d2 / (spread * spread)).exp() / norm);
        let f = ScalarField::from_data(grid, data, "gaussian");

        let moments = f.multipoles(centre);
        assert_relative_eq!(moments.charge, 1.0, max_relative = 1e-6);
        for l in 0..3 {
            assert_abs_diff_eq!(moments.dipole[l], 0.0, epsilon = 1e-8);
            // ⟨x²⟩ = σ²/2 per component for this Gaussian
            assert_relative_eq!(
                moments.quadrupole[l],
                spread * spread / 2.0,
                max_relative = 1e-4
            );
        }
    }

    #[test]
    fn modulus_and_trace() {
        let grid = Grid::cubic(3.0, 4, "derived").unwrap();

        let mut v = VectorField::new(grid.clone(), "v");
        v.component_mut(0).fill(3.0);
        v.component_mut(1).fill(4.0);
        let m = v.modulus();
        assert_abs_diff_eq!(m[[1, 2, 3]], 5.0, epsilon = 1e-12);

        let mut h = TensorField::new(grid, "h");
        h.component_mut(0, 0).fill(1.0);
        h.component_mut(1, 1).fill(2.0);
        h.component_mut(2, 2).fill(3.0);
        h.component_mut(0, 1).fill(7.0); // off-diagonal must not contribute
        let t = h.trace();
        assert_abs_diff_eq!(t[[0, 0, 0]], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn tensor_contraction_applies_rows() {
        let grid = Grid::cubic(3.0, 2, "contract").unwrap();
        let mut h = TensorField::new(grid.clone(), "h");
        h.component_mut(0, 1).fill(2.0);
        let mut g = VectorField::new(grid, "g");
        g.component_mut(1).fill(5.0);

        let out = h.contract_gradient(&g);
        assert_abs_diff_eq!(out.component(0)[[0, 0, 0]], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.component(1)[[0, 0, 0]], 0.0, epsilon = 1e-12);
    }
}
