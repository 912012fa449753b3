//! Analytic multipole correction for partially periodic cells.
//!
//! The spectral Poisson solve assumes full 3-D periodicity. For systems
//! that are periodic in zero directions (isolated molecules) or two
//! directions (slabs), the spurious interaction with the periodic images is
//! removed by a parabolic point-countercharge correction built from the
//! multipole moments of the charge distribution about the system origin:
//! the quadratic term cancels the neutralising background, the dipole term
//! the image dipoles, and (for isolated systems) a Madelung constant fixes
//! the monopole self-interaction.
//!
//! One periodic direction has no analytic closed form; requesting it is a
//! configuration error, never a silent fallback.

use std::cell::Cell;
use std::sync::Arc;

use ndarray::Zip;

use solvia_grid::{Grid, ScalarField, VectorField};

use crate::constants::{MADELUNG_SC, TPI};
use crate::core::CoreError;

/// The analytic 1-D (reduced-periodicity) numerical core.
#[derive(Debug)]
pub struct Analytic1dCore {
    grid: Arc<Grid>,
    /// Number of periodic directions: 0 (isolated) or 2 (slab).
    dim: usize,
    axis: usize,
    /// Extent of the non-periodic geometry: cell volume (dim 0) or slab
    /// thickness (dim 2).
    size: f64,
    /// System origin; follows the centre of mass across ionic steps.
    origin: Cell<[f64; 3]>,
}

impl Analytic1dCore {
    pub fn new(grid: Arc<Grid>, dim: usize, axis: usize) -> Result<Self, CoreError> {
        match dim {
            0 | 2 => {}
            // dim 1 (wire geometry) has no analytic multipole form; dim 3
            // has nothing to correct
            other => return Err(CoreError::UnsupportedDim(other)),
        }
        if axis > 2 {
            return Err(CoreError::InvalidAxis(axis));
        }

        let size = match dim {
            0 => grid.volume(),
            2 => grid.length(axis),
            _ => unreachable!(),
        };

        Ok(Self {
            grid,
            dim,
            axis,
            size,
            origin: Cell::new([0.0; 3]),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.get()
    }

    /// Follow the system origin (centre of charge/mass) across ionic steps.
    pub fn update_origin(&self, origin: [f64; 3]) {
        self.origin.set(origin);
    }

    /// Correction to the periodic potential of `rho`.
    pub fn potential(&self, rho: &ScalarField) -> ScalarField {
        let origin = self.origin.get();
        let moments = rho.multipoles(origin);
        let charge = moments.charge;
        let quadrupole_tot: f64 = moments.quadrupole.iter().sum();
        let fact = TPI / self.grid.volume();

        let (r, r2) = self
            .grid
            .min_distance(origin, 0, 0)
            .expect("full-dimensional distance is always valid");

        let mut out = ScalarField::new(self.grid.clone(), format!("{}_correction", rho.label()));

        match self.dim {
            0 => {
                let alat = self.grid.length(0);
                let constant = MADELUNG_SC * charge / alat - fact * quadrupole_tot / 3.0;
                Zip::from(out.data_mut())
                    .and(r2.data())
                    .and(r.component(0))
                    .and(r.component(1))
                    .and(r.component(2))
                    .for_each(|v, &d2, &x, &y, &z| {
                        let dip =
                            moments.dipole[0] * x + moments.dipole[1] * y + moments.dipole[2] * z;
                        *v = fact * (-charge * d2 / 3.0 + dip) + constant;
                    });
            }
            2 => {
                let axis = self.axis;
                let constant = -fact * moments.quadrupole[axis];
                Zip::from(out.data_mut())
                    .and(r.component(axis))
                    .for_each(|v, &z| {
                        *v = fact * (-charge * z * z + 2.0 * moments.dipole[axis] * z) + constant;
                    });
            }
            _ => unreachable!("dim validated at construction"),
        }

        out
    }

    /// Correction to the gradient of the periodic potential of `rho`.
    pub fn gradient(&self, rho: &ScalarField) -> VectorField {
        let origin = self.origin.get();
        let moments = rho.multipoles(origin);
        let charge = moments.charge;
        let fact = TPI / self.grid.volume();

        let (r, _) = self
            .grid
            .min_distance(origin, 0, 0)
            .expect("full-dimensional distance is always valid");

        let mut out = VectorField::new(
            self.grid.clone(),
            format!("{}_field_correction", rho.label()),
        );

        match self.dim {
            0 => {
                for l in 0..3 {
                    let dip = moments.dipole[l];
                    Zip::from(out.component_mut(l))
                        .and(r.component(l))
                        .for_each(|v, &x| {
                            *v = fact * (dip - 2.0 * charge * x / 3.0);
                        });
                }
            }
            2 => {
                let axis = self.axis;
                let dip = moments.dipole[axis];
                Zip::from(out.component_mut(axis))
                    .and(r.component(axis))
                    .for_each(|v, &z| {
                        *v = 2.0 * fact * (dip - charge * z);
                    });
            }
            _ => unreachable!("dim validated at construction"),
        }

        out
    }

    /// Correction to the force on point charges at `coords` with charges
    /// `zv`: F_i = −z_i ∇v_corr(R_i).
    pub fn force(&self, rho: &ScalarField, coords: &[[f64; 3]], zv: &[f64]) -> Vec<[f64; 3]> {
        debug_assert_eq!(coords.len(), zv.len());
        let origin = self.origin.get();
        let moments = rho.multipoles(origin);
        let charge = moments.charge;
        let fact = TPI / self.grid.volume();

        coords
            .iter()
            .zip(zv)
            .map(|(pos, &z)| {
                let dr = [
                    pos[0] - origin[0],
                    pos[1] - origin[1],
                    pos[2] - origin[2],
                ];
                let mut grad = [0.0; 3];
                match self.dim {
                    0 => {
                        for l in 0..3 {
                            grad[l] = fact * (moments.dipole[l] - 2.0 * charge * dr[l] / 3.0);
                        }
                    }
                    2 => {
                        grad[self.axis] =
                            2.0 * fact * (moments.dipole[self.axis] - charge * dr[self.axis]);
                    }
                    _ => unreachable!("dim validated at construction"),
                }
                [-z * grad[0], -z * grad[1], -z * grad[2]]
            })
            .collect()
    }
}
