//! Fixed external smooth charges added to the embedding problem.

use std::sync::Arc;

use solvia_grid::functions::{FunctionKind, FunctionSet, SmoothFunction};
use solvia_grid::{Grid, ScalarField};

use crate::physical::PhysicalError;

/// A set of user-supplied external charges, fixed for the whole run.
#[derive(Debug)]
pub struct Externals {
    grid: Arc<Grid>,
    functions: FunctionSet,
    density: ScalarField,
    charge: f64,
    pub updating: bool,
}

impl Externals {
    pub fn new(grid: Arc<Grid>) -> Self {
        Self {
            functions: FunctionSet::new(),
            density: ScalarField::new(grid.clone(), "externals"),
            charge: 0.0,
            grid,
            updating: false,
        }
    }

    /// Add one external Gaussian charge.
    pub fn add(
        &mut self,
        charge: f64,
        pos: [f64; 3],
        spread: f64,
        dim: usize,
        axis: usize,
    ) -> Result<(), PhysicalError> {
        let function = SmoothFunction::new(
            FunctionKind::Gaussian,
            dim,
            axis,
            0.0,
            spread,
            charge,
            pos,
            "external",
        )
        .map_err(|_| PhysicalError::Unsupported("degenerate external charge"))?;
        self.functions.push(function);
        Ok(())
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Rebuild the summed density after the set changed.
    pub fn update(&mut self) {
        self.density = self.functions.density(&self.grid);
        self.charge = self.density.integral();
    }
}
