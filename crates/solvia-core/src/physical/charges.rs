//! The aggregate charge container and the solver request object.
//!
//! The solvers take a single [`SolveRequest`]: the total source density plus
//! optional references to the continuum response objects the problem needs.
//! [`Charges`] owns the summed density and acts as the explicit adapter
//! from the individual physical containers to that request.

use std::sync::Arc;

use solvia_grid::{Grid, ScalarField};

use crate::core::FftCore;
use crate::physical::{Dielectric, Electrolyte, Semiconductor};

/// The total source charge of the embedding problem.
#[derive(Debug)]
pub struct Charges {
    density: ScalarField,
    charge: f64,
}

impl Charges {
    pub fn new(grid: Arc<Grid>) -> Self {
        Self {
            density: ScalarField::new(grid, "charges"),
            charge: 0.0,
        }
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Rebuild the total density as the sum of the given contributions
    /// (electrons, smeared ions, externals, ...).
    pub fn update(&mut self, contributions: &[&ScalarField]) {
        self.density.fill(0.0);
        for rho in contributions {
            *self.density.data_mut() += rho.data();
        }
        self.charge = self.density.integral();
    }

    /// Unpack into the request object the solvers consume.
    pub fn request<'a>(
        &'a self,
        dielectric: Option<&'a mut Dielectric>,
        electrolyte: Option<&'a mut Electrolyte>,
        semiconductor: Option<&'a Semiconductor>,
    ) -> SolveRequest<'a> {
        SolveRequest {
            density: &self.density,
            dielectric,
            electrolyte,
            semiconductor,
        }
    }
}

/// Everything one electrostatic solve may touch: the source density and the
/// response objects required by the problem kind.
pub struct SolveRequest<'a> {
    pub density: &'a ScalarField,
    pub dielectric: Option<&'a mut Dielectric>,
    pub electrolyte: Option<&'a mut Electrolyte>,
    pub semiconductor: Option<&'a Semiconductor>,
}

impl<'a> SolveRequest<'a> {
    /// A bare Poisson request with no continuum response.
    pub fn bare(density: &'a ScalarField) -> Self {
        Self {
            density,
            dielectric: None,
            electrolyte: None,
            semiconductor: None,
        }
    }

    /// Refresh the potential-dependent response charges (dielectric
    /// polarization and electrolyte ion densities) after a solve.
    pub fn of_potential(&mut self, potential: &ScalarField, core: &FftCore) {
        if let Some(dielectric) = self.dielectric.as_deref_mut() {
            dielectric.of_potential(self.density, potential, core);
        }
        if let Some(electrolyte) = self.electrolyte.as_deref_mut() {
            electrolyte.of_potential(potential);
        }
    }
}
