//! Ionic soft-sphere boundary.
//!
//! The cavity is the union of per-ion exclusion spheres: the switching
//! function is s = 1 − Π_i h_i, where each h_i is a scaled-erf soft sphere
//! (0 at the ion, 1 far away) of width `solvation radius × alpha` and
//! spread `softness`.
//!
//! Derivatives come either from the spectral core (`fft`) or from an
//! explicit per-sphere accumulation (`lowmem`) that never materialises more
//! than one sphere's fields at a time, masking near-zero sphere values to
//! avoid division blow-ups.
//!
//! The field-aware variant (sphere radii locally rescaled by the normal
//! electric field at each ion) is not yet supported and is reported as a
//! typed error rather than an approximation.

use ndarray::Zip;

use solvia_grid::functions::{FunctionKind, FunctionSet, SmoothFunction};
use solvia_grid::{ScalarField, TensorField, VectorField};

use crate::boundary::{
    dsurface_of, Boundary, BoundaryData, BoundaryError, DerivLevel, DerivMethod, UpdateStatus,
};
use crate::physical::Ions;

/// Sphere values below this are masked out of the lowmem quotients.
const SPHERE_TOL: f64 = 1e-60;

/// The ionic soft-sphere boundary model.
#[derive(Debug)]
pub struct IonicBoundary {
    data: BoundaryData,
    alpha: f64,
    softness: f64,
    soft_spheres: FunctionSet,
}

impl IonicBoundary {
    pub fn new(
        alpha: f64,
        softness: f64,
        ions: &Ions,
        data: BoundaryData,
    ) -> Result<Self, BoundaryError> {
        match data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem | DerivMethod::Lowmem => {}
            method => {
                return Err(BoundaryError::IncompatibleDerivMethod {
                    mode: "ionic",
                    method,
                })
            }
        }

        let mut boundary = Self {
            data,
            alpha,
            softness,
            soft_spheres: FunctionSet::new(),
        };
        boundary.set_soft_spheres(ions)?;
        Ok(boundary)
    }

    /// Field-aware cavity rescaling is not yet supported.
    pub fn field_aware(
        _field_factor: f64,
        _field_asymmetry: f64,
        _field_max: f64,
        _field_min: f64,
    ) -> Result<Self, BoundaryError> {
        Err(BoundaryError::Unsupported("field-aware ionic boundary"))
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn softness(&self) -> f64 {
        self.softness
    }

    pub fn soft_spheres(&self) -> &FunctionSet {
        &self.soft_spheres
    }

    fn set_soft_spheres(&mut self, ions: &Ions) -> Result<(), BoundaryError> {
        self.soft_spheres = FunctionSet::new();
        for i in 0..ions.count() {
            let iontype = ions.iontype_of(i);
            let sphere = SmoothFunction::new(
                FunctionKind::ScaledErf,
                0,
                0,
                iontype.solvationrad * self.alpha,
                self.softness,
                1.0,
                ions.coords()[i],
                format!("{}_soft_sphere", iontype.label),
            )?;
            self.soft_spheres.push(sphere);
        }
        Ok(())
    }

    /// Drive the state machine for one ionic update cycle.
    pub fn update(&mut self, ions: &Ions) -> Result<(), BoundaryError> {
        if !ions.updating {
            self.data.reset_if_ready();
            return Ok(());
        }

        // rigid cavity: sphere centres follow the ions
        for i in 0..ions.count() {
            if let Some(sphere) = self.soft_spheres.get_mut(i) {
                sphere.set_pos(ions.coords()[i]);
            }
        }

        self.build();
        self.data.set_status(UpdateStatus::Ready);
        self.data.update_solvent_aware();
        Ok(())
    }

    fn build(&mut self) {
        let grid = self.data.grid().clone();

        // exclusion product: 1 in the bulk, 0 at the ions
        {
            let switch = self.data.switch_mut();
            switch.fill(1.0);
        }
        for sphere in &self.soft_spheres {
            let h = sphere.density(&grid);
            Zip::from(self.data.switch_mut().data_mut())
                .and(h.data())
                .for_each(|s, &hi| *s *= hi);
        }

        match self.data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem => {
                let switch = self.data.switch().clone();
                self.data.compute_derivatives_fft(&switch);
            }
            DerivMethod::Lowmem => self.lowmem_derivatives(),
            DerivMethod::Chain => unreachable!("rejected at construction"),
        }

        // complement: s = 1 − Π h, so every derivative flips sign
        self.data
            .switch_mut()
            .data_mut()
            .mapv_inplace(|s| 1.0 - s);
        if let Some(gradient) = self.data.gradient_mut() {
            gradient.scale(-1.0);
        }
        if let Some(laplacian) = self.data.laplacian_mut() {
            laplacian.data_mut().mapv_inplace(|x| -x);
        }
        if let Some(dsurface) = self.data.dsurface.as_mut() {
            dsurface.data_mut().mapv_inplace(|x| -x);
        }
        if let Some(hessian) = self.data.hessian.as_mut() {
            hessian.scale(-1.0);
        }

        self.data.finalize_measures();
    }

    /// Per-sphere accumulation of the product derivatives:
    /// ∇S = S Σ ∇h_i/h_i,
    /// ∇²S = Σ [S(∇²h_i/h_i − |∇h_i|²/h_i²) + ∇S·∇h_i/h_i],
    /// H_S = Σ [S(H_i/h_i − ∇h_i⊗∇h_i/h_i²) + ∇S⊗∇h_i/h_i].
    fn lowmem_derivatives(&mut self) {
        let level = self.data.deriv_level();
        if level < DerivLevel::Gradient {
            return;
        }

        let grid = self.data.grid().clone();

        // gradient first: the Laplacian and Hessian accumulations consume it
        {
            let switch = self.data.switch().clone();
            let gradient = self.data.gradient_mut().expect("allocated by construction");
            gradient.fill(0.0);
            for sphere in &self.soft_spheres {
                let h = sphere.density(&grid);
                let gh = sphere.gradient(&grid);
                for l in 0..3 {
                    Zip::from(gradient.component_mut(l))
                        .and(gh.component(l))
                        .and(h.data())
                        .and(switch.data())
                        .for_each(|out, &g, &hi, &s| {
                            if hi.abs() > SPHERE_TOL {
                                *out += g * s / hi;
                            }
                        });
                }
            }
        }

        if level == DerivLevel::Laplacian {
            let switch = self.data.switch().clone();
            let full_gradient = self.data.gradient().expect("allocated by construction").clone();
            let laplacian = self.data.laplacian_mut().expect("allocated by construction");
            laplacian.fill(0.0);

            for sphere in &self.soft_spheres {
                let h = sphere.density(&grid);
                let gh = sphere.gradient(&grid);
                let lh = sphere
                    .laplacian(&grid)
                    .expect("erf-family spheres have analytic laplacians");
                let gh2 = gh.squared_modulus();
                let gs_dot_gh = full_gradient.dot(&gh);

                Zip::from(laplacian.data_mut())
                    .and(h.data())
                    .and(lh.data())
                    .and(gh2.data())
                    .and(gs_dot_gh.data())
                    .and(switch.data())
                    .for_each(|out, &hi, &li, &g2, &gg, &s| {
                        if hi.abs() > SPHERE_TOL {
                            *out += li / hi * s - g2 / (hi * hi) * s + gg / hi;
                        }
                    });
            }
        }

        if level == DerivLevel::Full {
            let switch = self.data.switch().clone();
            let full_gradient = self.data.gradient().expect("allocated by construction").clone();
            let mut hessian = TensorField::new(grid.clone(), "ionic_hessian");

            for sphere in &self.soft_spheres {
                let h = sphere.density(&grid);
                let gh = sphere.gradient(&grid);
                let hh = sphere
                    .hessian(&grid)
                    .expect("erf-family spheres have analytic hessians");

                for a in 0..3 {
                    for b in 0..3 {
                        Zip::from(hessian.component_mut(a, b))
                            .and(hh.component(a, b))
                            .and(gh.component(a))
                            .and(gh.component(b))
                            .and(h.data())
                            .and(switch.data())
                            .for_each(|out, &hab, &ga, &gb, &hi, &s| {
                                if hi.abs() > SPHERE_TOL {
                                    *out += hab / hi * s - ga * gb / (hi * hi) * s;
                                }
                            });
                        Zip::from(hessian.component_mut(a, b))
                            .and(full_gradient.component(a))
                            .and(gh.component(b))
                            .and(h.data())
                            .for_each(|out, &gsa, &gb, &hi| {
                                if hi.abs() > SPHERE_TOL {
                                    *out += gsa * gb / hi;
                                }
                            });
                    }
                }
            }

            let trace = hessian.trace();
            self.data
                .laplacian_mut()
                .expect("allocated by construction")
                .assign(&trace);
            let dsurface = dsurface_of(&full_gradient, &hessian);
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
    }
}

impl Boundary for IonicBoundary {
    fn data(&self) -> &BoundaryData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut BoundaryData {
        &mut self.data
    }

    /// ∂s/∂R_i by the product rule: the sphere's own gradient times the
    /// product of all other spheres.
    fn dboundary_dions(&self, index: usize) -> Result<VectorField, BoundaryError> {
        if self.soft_spheres.is_empty() {
            return Err(BoundaryError::MissingDependency("soft spheres"));
        }
        let sphere = self
            .soft_spheres
            .get(index)
            .ok_or(BoundaryError::MissingDependency("soft sphere index"))?;

        let grid = self.data.grid();
        let mut partial = sphere.gradient(grid);

        let mut others = ScalarField::new(grid.clone(), "other_spheres");
        others.fill(1.0);
        for (j, other) in self.soft_spheres.iter().enumerate() {
            if j == index {
                continue;
            }
            let h = other.density(grid);
            Zip::from(others.data_mut())
                .and(h.data())
                .for_each(|o, &hi| *o *= hi);
        }

        for l in 0..3 {
            Zip::from(partial.component_mut(l))
                .and(others.data())
                .for_each(|p, &o| *p *= o);
        }

        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreContainer, FftCore};
    use crate::physical::{IonsSpec, RadiusMode};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use solvia_grid::Grid;
    use std::sync::Arc;

    fn two_ions(grid: &Arc<Grid>) -> Ions {
        let mut ions = Ions::new(
            IonsSpec {
                labels: vec!["O".into()],
                itypes: vec![0, 0],
                zv: vec![6.0],
                atomicspread: vec![0.5],
                corespread: vec![0.5],
                solvationrad: vec![3.0],
                radius_mode: RadiusMode::Uff,
                soft_cavity: false,
                smear: false,
                fill_cores: false,
            },
            2,
            grid.clone(),
        )
        .unwrap();
        ions.update(&[[8.0, 10.0, 10.0], [12.0, 10.0, 10.0]], None)
            .unwrap();
        ions
    }

    fn boundary(level: DerivLevel, method: DerivMethod, grid: &Arc<Grid>, ions: &Ions) -> IonicBoundary {
        let core = Arc::new(FftCore::new(grid.clone()));
        let cores = CoreContainer::new("env", core.clone(), core);
        let data = BoundaryData::new(grid.clone(), cores, level, method, "solvent");
        IonicBoundary::new(1.0, 1.0, ions, data).unwrap()
    }

    #[test]
    fn switch_is_one_at_ions_zero_in_bulk() {
        let grid = Grid::cubic(20.0, 40, "ionic").unwrap();
        let mut ions = two_ions(&grid);
        let mut b = boundary(DerivLevel::Gradient, DerivMethod::Lowmem, &grid, &ions);

        ions.updating = true;
        b.update(&ions).unwrap();

        let s = b.data().switch();
        assert!(s.iter().all(|&x| (-1e-10..=1.0 + 1e-10).contains(&x)));
        // at the first ion centre: deep cavity
        assert_abs_diff_eq!(s[[16, 20, 20]], 1.0, epsilon = 1e-4);
        // far corner: bulk solvent
        assert_abs_diff_eq!(s[[0, 0, 0]], 0.0, epsilon = 1e-4);
        assert!(b.data().volume() > 0.0);
        assert!(b.data().surface() > 0.0);
    }

    #[test]
    fn fft_and_lowmem_derivatives_agree() {
        // the soft spheres are resolved (softness two grid spacings), so
        // the spectral and analytic accumulations agree tightly
        let grid = Grid::cubic(20.0, 40, "ionic").unwrap();
        let mut ions = two_ions(&grid);
        ions.updating = true;

        let mut b_fft = boundary(DerivLevel::Laplacian, DerivMethod::Fft, &grid, &ions);
        let mut b_low = boundary(DerivLevel::Laplacian, DerivMethod::Lowmem, &grid, &ions);
        b_fft.update(&ions).unwrap();
        b_low.update(&ions).unwrap();

        assert_relative_eq!(
            b_fft.data().surface(),
            b_low.data().surface(),
            max_relative = 1e-3
        );

        let m_fft = b_fft.data().gradient().unwrap().modulus();
        let m_low = b_low.data().gradient().unwrap().modulus();
        let peak = m_fft.iter().cloned().fold(0.0, f64::max);
        Zip::from(m_fft.data()).and(m_low.data()).for_each(|&a, &b| {
            assert_abs_diff_eq!(a, b, epsilon = 1e-3 * peak.max(1.0));
        });

        let l_fft = b_fft.data().laplacian().unwrap();
        let l_low = b_low.data().laplacian().unwrap();
        let lpeak = l_fft.iter().cloned().fold(0.0f64, |m, x| m.max(x.abs()));
        Zip::from(l_fft.data()).and(l_low.data()).for_each(|&a, &b| {
            assert_abs_diff_eq!(a, b, epsilon = 5e-3 * lpeak.max(1.0));
        });
    }

    #[test]
    fn ion_partials_sum_to_minus_total_gradient() {
        // moving every ion together is minus the spatial gradient of Π h
        let grid = Grid::cubic(20.0, 24, "ionic").unwrap();
        let mut ions = two_ions(&grid);
        ions.updating = true;
        let mut b = boundary(DerivLevel::Gradient, DerivMethod::Lowmem, &grid, &ions);
        b.update(&ions).unwrap();

        let p0 = b.dboundary_dions(0).unwrap();
        let p1 = b.dboundary_dions(1).unwrap();
        let total = b.data().gradient().unwrap();

        // ∂(1−Πh)/∂R summed over ions = +∇(Πh) = −∇s
        for l in 0..3 {
            Zip::from(p0.component(l))
                .and(p1.component(l))
                .and(total.component(l))
                .for_each(|&a, &b_, &g| {
                    assert_abs_diff_eq!(a + b_, -g, epsilon = 1e-8);
                });
        }
    }

    #[test]
    fn field_aware_is_explicitly_unsupported() {
        assert!(matches!(
            IonicBoundary::field_aware(0.1, 0.0, 10.0, 1.0),
            Err(BoundaryError::Unsupported(_))
        ));
    }
}
