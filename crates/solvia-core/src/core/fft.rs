//! Spectral differential operators and the periodic Poisson solve.
//!
//! Every operation follows the same pattern: transform to reciprocal space,
//! multiply by the appropriate power of the wavevector (iG for gradients,
//! −G² for Laplacians, −G_aG_b for Hessians), and transform back. The
//! Poisson solve divides by G² and zeroes the unphysical G = 0 term — the
//! charge-neutral periodic convention.
//!
//! Plans and the wavevector table are built once per grid and reused for
//! every transform.

use std::sync::Arc;

use ndarray::{Array3, Axis, Zip};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use solvia_grid::functions::FunctionSet;
use solvia_grid::{Grid, ScalarField, TensorField, VectorField};

use crate::constants::FPI;

/// The spectral (FFT) numerical core.
pub struct FftCore {
    grid: Arc<Grid>,
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    /// Cartesian wavevector components in FFT frequency ordering.
    g: [Array3<f64>; 3],
    /// Squared wavevector modulus.
    g2: Array3<f64>,
}

impl std::fmt::Debug for FftCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftCore")
            .field("grid", &self.grid.label())
            .field("nr", &self.grid.nr())
            .finish()
    }
}

impl FftCore {
    pub fn new(grid: Arc<Grid>) -> Self {
        let [n0, n1, n2] = grid.nr();
        let mut planner = FftPlanner::new();
        let forward = [
            planner.plan_fft_forward(n0),
            planner.plan_fft_forward(n1),
            planner.plan_fft_forward(n2),
        ];
        let inverse = [
            planner.plan_fft_inverse(n0),
            planner.plan_fft_inverse(n1),
            planner.plan_fft_inverse(n2),
        ];

        let b = grid.reciprocal();
        let mut g = [
            Array3::zeros((n0, n1, n2)),
            Array3::zeros((n0, n1, n2)),
            Array3::zeros((n0, n1, n2)),
        ];
        let mut g2 = Array3::zeros((n0, n1, n2));

        for i in 0..n0 {
            let fi = frequency(i, n0);
            for j in 0..n1 {
                let fj = frequency(j, n1);
                for k in 0..n2 {
                    let fk = frequency(k, n2);
                    let mut norm = 0.0;
                    for l in 0..3 {
                        let gl = fi * b[0][l] + fj * b[1][l] + fk * b[2][l];
                        g[l][[i, j, k]] = gl;
                        norm += gl * gl;
                    }
                    g2[[i, j, k]] = norm;
                }
            }
        }

        Self {
            grid,
            forward,
            inverse,
            g,
            g2,
        }
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// ∇f by iG multiplication.
    pub fn gradient(&self, field: &ScalarField) -> VectorField {
        let spectrum = self.forward(field.data());
        let mut out = VectorField::new(self.grid.clone(), format!("{}_gradient", field.label()));
        for l in 0..3 {
            let mut component = spectrum.clone();
            Zip::from(&mut component)
                .and(&self.g[l])
                .for_each(|z, &gl| *z *= Complex64::new(0.0, gl));
            out.component_mut(l).assign(&self.inverse_real(component));
        }
        out
    }

    /// ∇·v by iG contraction.
    pub fn divergence(&self, field: &VectorField) -> ScalarField {
        let [n0, n1, n2] = self.grid.nr();
        let mut total = Array3::<Complex64>::zeros((n0, n1, n2));
        for l in 0..3 {
            let mut spectrum = self.forward(field.component(l));
            Zip::from(&mut spectrum)
                .and(&self.g[l])
                .for_each(|z, &gl| *z *= Complex64::new(0.0, gl));
            total += &spectrum;
        }
        ScalarField::from_data(
            self.grid.clone(),
            self.inverse_real(total),
            format!("{}_divergence", field.label()),
        )
    }

    /// ∇²f by −G² multiplication.
    pub fn laplacian(&self, field: &ScalarField) -> ScalarField {
        let mut spectrum = self.forward(field.data());
        Zip::from(&mut spectrum)
            .and(&self.g2)
            .for_each(|z, &g2| *z *= -g2);
        ScalarField::from_data(
            self.grid.clone(),
            self.inverse_real(spectrum),
            format!("{}_laplacian", field.label()),
        )
    }

    /// The full Hessian by −G_aG_b outer products.
    pub fn hessian(&self, field: &ScalarField) -> TensorField {
        let spectrum = self.forward(field.data());
        let mut out = TensorField::new(self.grid.clone(), format!("{}_hessian", field.label()));
        for a in 0..3 {
            for b in a..3 {
                let mut component = spectrum.clone();
                Zip::from(&mut component)
                    .and(&self.g[a])
                    .and(&self.g[b])
                    .for_each(|z, &ga, &gb| *z *= -ga * gb);
                let real = self.inverse_real(component);
                out.component_mut(a, b).assign(&real);
                if a != b {
                    out.component_mut(b, a).assign(&real);
                }
            }
        }
        out
    }

    /// Solve ∇²φ = −4πρ on the periodic cell; the G = 0 term is zeroed.
    pub fn poisson(&self, rho: &ScalarField) -> ScalarField {
        let mut spectrum = self.forward(rho.data());
        Zip::from(&mut spectrum).and(&self.g2).for_each(|z, &g2| {
            if g2 > 0.0 {
                *z *= FPI / g2;
            } else {
                *z = Complex64::new(0.0, 0.0);
            }
        });
        ScalarField::from_data(
            self.grid.clone(),
            self.inverse_real(spectrum),
            format!("{}_potential", rho.label()),
        )
    }

    /// Gradient of the Poisson solution, formed in a single pass:
    /// (∇φ)_G = iG · 4πρ_G / G².
    pub fn grad_poisson(&self, rho: &ScalarField) -> VectorField {
        let spectrum = self.forward(rho.data());
        let mut out = VectorField::new(self.grid.clone(), format!("{}_field", rho.label()));
        for l in 0..3 {
            let mut component = spectrum.clone();
            Zip::from(&mut component)
                .and(&self.g[l])
                .and(&self.g2)
                .for_each(|z, &gl, &g2| {
                    if g2 > 0.0 {
                        *z *= Complex64::new(0.0, gl * FPI / g2);
                    } else {
                        *z = Complex64::new(0.0, 0.0);
                    }
                });
            out.component_mut(l).assign(&self.inverse_real(component));
        }
        out
    }

    /// Periodic convolution ∫ f(r′) g(r − r′) dV′ of two scalar fields.
    pub fn convolution(&self, f: &ScalarField, g: &ScalarField) -> ScalarField {
        let fs = self.forward(f.data());
        let mut gs = self.forward(g.data());
        gs *= &fs;
        let mut data = self.inverse_real(gs);
        data.mapv_inplace(|x| x * self.grid.dv());
        ScalarField::from_data(self.grid.clone(), data, format!("{}_convolution", f.label()))
    }

    /// Componentwise convolution of a scalar field with a vector field.
    pub fn convolution_gradient(&self, f: &ScalarField, g: &VectorField) -> VectorField {
        let fs = self.forward(f.data());
        let mut out = VectorField::new(self.grid.clone(), format!("{}_convolution", g.label()));
        for l in 0..3 {
            let mut gs = self.forward(g.component(l));
            gs *= &fs;
            let mut data = self.inverse_real(gs);
            data.mapv_inplace(|x| x * self.grid.dv());
            out.component_mut(l).assign(&data);
        }
        out
    }

    /// Componentwise convolution of a scalar field with a tensor field.
    pub fn convolution_hessian(&self, f: &ScalarField, h: &TensorField) -> TensorField {
        let fs = self.forward(f.data());
        let mut out = TensorField::new(self.grid.clone(), format!("{}_convolution", h.label()));
        for a in 0..3 {
            for b in 0..3 {
                let mut hs = self.forward(h.component(a, b));
                hs *= &fs;
                let mut data = self.inverse_real(hs);
                data.mapv_inplace(|x| x * self.grid.dv());
                out.component_mut(a, b).assign(&data);
            }
        }
        out
    }

    /// Electrostatic force on each smeared-ion function from the potential
    /// generated by `rho`: F_i = ∫ ∇ρ_i(r) φ(r) dV.
    pub fn force(&self, rho: &ScalarField, ions: &FunctionSet) -> Vec<[f64; 3]> {
        let potential = self.poisson(rho);
        ions.iter()
            .map(|ion| ion.gradient(&self.grid).moment(&potential))
            .collect()
    }

    // ---- transforms ------------------------------------------------------

    fn forward(&self, data: &Array3<f64>) -> Array3<Complex64> {
        let mut spectrum = data.mapv(|x| Complex64::new(x, 0.0));
        self.transform(&mut spectrum, true);
        spectrum
    }

    fn inverse_real(&self, mut spectrum: Array3<Complex64>) -> Array3<f64> {
        self.transform(&mut spectrum, false);
        spectrum.mapv(|z| z.re)
    }

    /// Axis-by-axis 1-D transforms; the inverse pass carries the 1/N
    /// normalisation.
    fn transform(&self, data: &mut Array3<Complex64>, forward: bool) {
        for ax in 0..3 {
            let plan = if forward {
                &self.forward[ax]
            } else {
                &self.inverse[ax]
            };
            let mut lane_buf = vec![Complex64::new(0.0, 0.0); self.grid.nr()[ax]];
            for mut lane in data.lanes_mut(Axis(ax)) {
                for (b, v) in lane_buf.iter_mut().zip(lane.iter()) {
                    *b = *v;
                }
                plan.process(&mut lane_buf);
                for (v, b) in lane.iter_mut().zip(lane_buf.iter()) {
                    *v = *b;
                }
            }
        }
        if !forward {
            let scale = 1.0 / self.grid.nnr() as f64;
            data.mapv_inplace(|z| z * scale);
        }
    }
}

/// Integer FFT frequency for index `i` of an `n`-point axis.
fn frequency(i: usize, n: usize) -> f64 {
    if i < n.div_ceil(2) {
        i as f64
    } else {
        i as f64 - n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TPI;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn harmonic(grid: &Arc<Grid>, periods: f64) -> ScalarField {
        let side = grid.length(0);
        let [n0, n1, n2] = grid.nr();
        let mut f = ScalarField::new(grid.clone(), "harmonic");
        for i in 0..n0 {
            for j in 0..n1 {
                for k in 0..n2 {
                    let x = i as f64 * side / n0 as f64;
                    f[[i, j, k]] = (TPI * periods * x / side).sin();
                }
            }
        }
        f
    }

    #[test]
    fn gradient_of_plane_wave_is_analytic() {
        let grid = Grid::cubic(10.0, 24, "fft").unwrap();
        let core = FftCore::new(grid.clone());
        let f = harmonic(&grid, 2.0);
        let g = TPI * 2.0 / 10.0;

        let grad = core.gradient(&f);
        let [n0, ..] = grid.nr();
        for i in 0..n0 {
            let x = i as f64 * 10.0 / n0 as f64;
            assert_abs_diff_eq!(
                grad.component(0)[[i, 3, 5]],
                g * (g * x).cos(),
                epsilon = 1e-9
            );
            assert_abs_diff_eq!(grad.component(1)[[i, 3, 5]], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn laplacian_matches_divergence_of_gradient() {
        let grid = Grid::cubic(8.0, 16, "fft").unwrap();
        let core = FftCore::new(grid.clone());

        // localized bump, fully periodic
        let (_, r2) = grid.min_distance([4.0, 4.0, 4.0], 0, 0).unwrap();
        let data = r2.data().mapv(|d2| (-d2 / 2.0).exp());
        let f = ScalarField::from_data(grid, data, "bump");

        let lapl = core.laplacian(&f);
        let div_grad = core.divergence(&core.gradient(&f));

        Zip::from(lapl.data())
            .and(div_grad.data())
            .for_each(|&a, &b| assert_abs_diff_eq!(a, b, epsilon = 1e-9));
    }

    #[test]
    fn hessian_trace_is_laplacian() {
        let grid = Grid::cubic(8.0, 16, "fft").unwrap();
        let core = FftCore::new(grid.clone());
        let (_, r2) = grid.min_distance([4.0, 4.0, 4.0], 0, 0).unwrap();
        let data = r2.data().mapv(|d2| (-d2 / 1.5).exp());
        let f = ScalarField::from_data(grid, data, "bump");

        let lapl = core.laplacian(&f);
        let trace = core.hessian(&f).trace();

        Zip::from(lapl.data())
            .and(trace.data())
            .for_each(|&a, &b| assert_abs_diff_eq!(a, b, epsilon = 1e-9));
    }

    #[test]
    fn poisson_inverts_the_laplacian() {
        let grid = Grid::cubic(12.0, 18, "fft").unwrap();
        let core = FftCore::new(grid.clone());

        // neutral density: ∇²φ = −4πρ should be recovered exactly
        let f = harmonic(&grid, 1.0);
        let phi = core.poisson(&f);
        let lapl = core.laplacian(&phi);

        Zip::from(lapl.data()).and(f.data()).for_each(|&l, &rho| {
            assert_abs_diff_eq!(l, -FPI * rho, epsilon = 1e-8);
        });
    }

    #[test]
    fn grad_poisson_matches_gradient_of_poisson() {
        let grid = Grid::cubic(9.0, 12, "fft").unwrap();
        let core = FftCore::new(grid.clone());
        let f = harmonic(&grid, 1.0);

        let direct = core.grad_poisson(&f);
        let composed = core.gradient(&core.poisson(&f));

        for l in 0..3 {
            Zip::from(direct.component(l))
                .and(composed.component(l))
                .for_each(|&a, &b| assert_abs_diff_eq!(a, b, epsilon = 1e-9));
        }
    }

    #[test]
    fn convolution_with_a_normalised_kernel_preserves_charge() {
        let grid = Grid::cubic(10.0, 20, "fft").unwrap();
        let core = FftCore::new(grid.clone());

        let (_, r2) = grid.min_distance([5.0, 5.0, 5.0], 0, 0).unwrap();
        let norm = (std::f64::consts::PI.sqrt() * 0.8f64).powi(3);
        let kernel = ScalarField::from_data(
            grid.clone(),
            r2.data().mapv(|d2| (-d2 / 0.64).exp() / norm),
            "kernel",
        );

        let (_, s2) = grid.min_distance([3.0, 6.0, 5.0], 0, 0).unwrap();
        let f = ScalarField::from_data(grid, s2.data().mapv(|d2| (-d2).exp()), "source");

        let conv = core.convolution(&f, &kernel);
        assert_relative_eq!(conv.integral(), f.integral(), max_relative = 1e-6);
    }
}
