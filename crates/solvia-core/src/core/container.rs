//! Grouping of the numerical cores a component consumes.

use std::sync::Arc;

use crate::core::{Analytic1dCore, FftCore};

/// The cores behind a boundary, dielectric, or solver: a derivative
/// provider, an electrostatic provider, and an optional periodic-boundary
/// correction.
#[derive(Debug, Clone)]
pub struct CoreContainer {
    label: String,
    /// True when the electrostatic core applies its own open-boundary
    /// handling, which suppresses the Gaussian-spread energy correction.
    has_internal_correction: bool,
    derivatives: Arc<FftCore>,
    electrostatics: Arc<FftCore>,
    corrections: Option<Arc<Analytic1dCore>>,
}

impl CoreContainer {
    pub fn new(
        label: impl Into<String>,
        derivatives: Arc<FftCore>,
        electrostatics: Arc<FftCore>,
    ) -> Self {
        Self {
            label: label.into(),
            has_internal_correction: false,
            derivatives,
            electrostatics,
            corrections: None,
        }
    }

    pub fn with_corrections(mut self, corrections: Arc<Analytic1dCore>) -> Self {
        self.corrections = Some(corrections);
        self
    }

    pub fn with_internal_correction(mut self) -> Self {
        self.has_internal_correction = true;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn derivatives(&self) -> &FftCore {
        &self.derivatives
    }

    pub fn electrostatics(&self) -> &FftCore {
        &self.electrostatics
    }

    pub fn corrections(&self) -> Option<&Analytic1dCore> {
        self.corrections.as_deref()
    }

    pub fn has_corrections(&self) -> bool {
        self.corrections.is_some()
    }

    pub fn has_internal_correction(&self) -> bool {
        self.has_internal_correction
    }
}
