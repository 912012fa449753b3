//! Semiconductor carrier container.
//!
//! Holds the flat-band carrier parameters and the simple erfc interface
//! profile consumed through [`SolveRequest`](crate::physical::SolveRequest).
//! Energy and force contributions are not yet supported.

use std::sync::Arc;

use solvia_grid::functions::{FunctionKind, SmoothFunction};
use solvia_grid::{Grid, ScalarField};

use crate::physical::{PhysicalError, System};

/// Mott–Schottky semiconductor region parameters.
#[derive(Debug)]
pub struct Semiconductor {
    pub temperature: f64,
    pub permittivity: f64,
    /// Carrier density (bohr⁻³).
    pub carrier_density: f64,
    pub electrode_charge: f64,
    pub charge_threshold: f64,
    /// Carrier charge density.
    density: ScalarField,
    /// The simple interface profile centred on the system.
    simple: SmoothFunction,
}

impl Semiconductor {
    pub fn new(
        temperature: f64,
        permittivity: f64,
        carrier_density: f64,
        electrode_charge: f64,
        distance: f64,
        spread: f64,
        charge_threshold: f64,
        system: &System,
        grid: Arc<Grid>,
    ) -> Result<Self, PhysicalError> {
        let simple = SmoothFunction::new(
            FunctionKind::ScaledErfc,
            system.dim(),
            system.axis(),
            distance,
            spread,
            1.0,
            system.com(),
            "semiconductor_interface",
        )
        .map_err(|_| PhysicalError::Unsupported("degenerate semiconductor interface"))?;

        Ok(Self {
            temperature,
            permittivity,
            carrier_density,
            electrode_charge,
            charge_threshold,
            density: ScalarField::new(grid, "semiconductor"),
            simple,
        })
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn interface(&self) -> &SmoothFunction {
        &self.simple
    }

    /// Semiconductor free energy — not yet supported.
    pub fn energy(&self) -> Result<f64, PhysicalError> {
        Err(PhysicalError::Unsupported("semiconductor energy"))
    }
}
