//! Electronic-density container.

use std::sync::Arc;

use solvia_grid::{Grid, ScalarField};

use crate::physical::PhysicalError;

/// The electronic density handed over by the host code at each SCF step.
#[derive(Debug)]
pub struct Electrons {
    density: ScalarField,
    charge: f64,
    count: usize,
    pub updating: bool,
}

impl Electrons {
    pub fn new(grid: Arc<Grid>) -> Self {
        Self {
            density: ScalarField::new(grid, "electrons"),
            charge: 0.0,
            count: 0,
            updating: false,
        }
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Take over a new density; `nelec`, when given, cross-checks the
    /// integrated charge against the host's electron count.
    pub fn update(&mut self, rho: &ScalarField, nelec: Option<f64>) -> Result<(), PhysicalError> {
        self.density.assign(rho);
        self.charge = self.density.integral();
        self.count = self.charge.round().max(0.0) as usize;

        if let Some(n) = nelec {
            let error = (self.charge - n).abs();
            if error > 5e-3 {
                return Err(PhysicalError::ChargeMismatch(error));
            }
        }

        Ok(())
    }
}
