//! System-shape boundary: a single smooth step around the system centre.
//!
//! The cheapest cavity model: a scaled-erfc step of given width and spread
//! centred on the system descriptor, optionally with reduced dimensionality
//! (slab or wire cavities). Independent of the ions and electrons except
//! through the centre of mass.

use solvia_grid::functions::{FunctionKind, SmoothFunction};
use solvia_grid::VectorField;

use crate::boundary::{
    dsurface_of, Boundary, BoundaryData, BoundaryError, DerivLevel, DerivMethod, UpdateStatus,
};
use crate::physical::System;

/// The system-shape boundary model.
#[derive(Debug)]
pub struct SystemBoundary {
    data: BoundaryData,
    simple: SmoothFunction,
}

impl SystemBoundary {
    pub fn new(
        distance: f64,
        spread: f64,
        system: &System,
        data: BoundaryData,
    ) -> Result<Self, BoundaryError> {
        match data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem | DerivMethod::Chain => {}
            method => {
                return Err(BoundaryError::IncompatibleDerivMethod {
                    mode: "system",
                    method,
                })
            }
        }

        let simple = SmoothFunction::new(
            FunctionKind::ScaledErfc,
            system.dim(),
            system.axis(),
            distance,
            spread,
            1.0,
            system.com(),
            format!("{}_simple", data.label()),
        )?;

        Ok(Self { data, simple })
    }

    pub fn simple(&self) -> &SmoothFunction {
        &self.simple
    }

    /// Drive the state machine for one system update cycle.
    pub fn update(&mut self, system: &System) -> Result<(), BoundaryError> {
        if !system.updating {
            self.data.reset_if_ready();
            return Ok(());
        }

        self.simple.set_pos(system.com());
        self.build()?;
        self.data.set_status(UpdateStatus::Ready);
        self.data.update_solvent_aware();
        Ok(())
    }

    fn build(&mut self) -> Result<(), BoundaryError> {
        let grid = self.data.grid().clone();
        let density = self.simple.density(&grid);
        self.data.switch_mut().assign(&density);

        match self.data.deriv_method() {
            DerivMethod::Fft | DerivMethod::Highmem => {
                let switch = self.data.switch().clone();
                self.data.compute_derivatives_fft(&switch);
            }
            DerivMethod::Chain => {
                // the step is analytic: use its exact derivatives
                let level = self.data.deriv_level();

                if level >= DerivLevel::Gradient {
                    let gradient = self.simple.gradient(&grid);
                    self.data
                        .gradient_mut()
                        .expect("allocated by construction")
                        .assign(&gradient);
                }

                if level == DerivLevel::Laplacian {
                    let laplacian = self.simple.laplacian(&grid)?;
                    self.data
                        .laplacian_mut()
                        .expect("allocated by construction")
                        .assign(&laplacian);
                }

                if level == DerivLevel::Full {
                    let hessian = self.simple.hessian(&grid)?;
                    self.data
                        .laplacian_mut()
                        .expect("allocated by construction")
                        .assign(&hessian.trace());
                    let dsurface = dsurface_of(
                        self.data.gradient().expect("allocated by construction"),
                        &hessian,
                    );
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
            DerivMethod::Lowmem => unreachable!("rejected at construction"),
        }

        self.data.finalize_measures();
        Ok(())
    }
}

impl Boundary for SystemBoundary {
    fn data(&self) -> &BoundaryData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut BoundaryData {
        &mut self.data
    }

    /// The cavity follows only the centre of mass; per-ion partials vanish.
    fn dboundary_dions(&self, _index: usize) -> Result<VectorField, BoundaryError> {
        Ok(VectorField::new(
            self.data.grid().clone(),
            "dboundary_dions",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreContainer, FftCore};
    use crate::physical::{Ions, IonsSpec, RadiusMode};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::Zip;
    use solvia_grid::Grid;
    use std::sync::Arc;

    fn centred_system(grid: &Arc<Grid>) -> System {
        let mut ions = Ions::new(
            IonsSpec {
                labels: vec!["C".into()],
                itypes: vec![0],
                zv: vec![4.0],
                atomicspread: vec![0.5],
                corespread: vec![0.5],
                solvationrad: vec![0.0],
                radius_mode: RadiusMode::Uff,
                soft_cavity: true,
                smear: false,
                fill_cores: false,
            },
            1,
            grid.clone(),
        )
        .unwrap();
        ions.update(&[[10.0, 10.0, 10.0]], None).unwrap();

        let mut system = System::new(0, 0, 0);
        system.update(&ions, None).unwrap();
        system.updating = true;
        system
    }

    fn boundary(method: DerivMethod, grid: &Arc<Grid>, system: &System) -> SystemBoundary {
        let core = Arc::new(FftCore::new(grid.clone()));
        let cores = CoreContainer::new("env", core.clone(), core);
        let data = BoundaryData::new(grid.clone(), cores, DerivLevel::Gradient, method, "solvent");
        SystemBoundary::new(4.0, 0.8, system, data).unwrap()
    }

    #[test]
    fn cavity_is_centred_on_the_system() {
        let grid = Grid::cubic(20.0, 32, "system").unwrap();
        let system = centred_system(&grid);
        let mut b = boundary(DerivMethod::Chain, &grid, &system);

        b.update(&system).unwrap();

        let s = b.data().switch();
        assert_abs_diff_eq!(s[[16, 16, 16]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(s[[0, 0, 0]], 0.0, epsilon = 1e-6);
        assert_eq!(b.data().status(), UpdateStatus::Ready);

        // analytic sphere of radius 4: volume ≈ 4πr³/3, surface ≈ 4πr²
        assert_relative_eq!(
            b.data().volume(),
            4.0 * std::f64::consts::PI / 3.0 * 64.0,
            max_relative = 2e-2
        );
        assert_relative_eq!(
            b.data().surface(),
            4.0 * std::f64::consts::PI * 16.0,
            max_relative = 2e-2
        );
    }

    #[test]
    fn chain_and_fft_derivatives_agree() {
        let grid = Grid::cubic(20.0, 32, "system").unwrap();
        let system = centred_system(&grid);
        let mut b_chain = boundary(DerivMethod::Chain, &grid, &system);
        let mut b_fft = boundary(DerivMethod::Fft, &grid, &system);

        b_chain.update(&system).unwrap();
        b_fft.update(&system).unwrap();

        let m_chain = b_chain.data().gradient().unwrap().modulus();
        let m_fft = b_fft.data().gradient().unwrap().modulus();
        let peak = m_chain.iter().cloned().fold(0.0, f64::max);
        Zip::from(m_chain.data())
            .and(m_fft.data())
            .for_each(|&a, &b| {
                assert_abs_diff_eq!(a, b, epsilon = 1e-3 * peak.max(1.0));
            });
    }

    #[test]
    fn per_ion_partials_vanish() {
        let grid = Grid::cubic(20.0, 16, "system").unwrap();
        let system = centred_system(&grid);
        let b = boundary(DerivMethod::Chain, &grid, &system);
        let partial = b.dboundary_dions(0).unwrap();
        for l in 0..3 {
            assert!(partial.component(l).iter().all(|&x| x == 0.0));
        }
    }
}
