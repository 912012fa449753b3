//! Physical state consumed by the boundary and solver engines.
//!
//! These are the bookkeeping containers of the simulation: the electronic
//! density, the ions with their smeared representations, the system-shape
//! descriptor, fixed external charges, and the two continuum response
//! models (dielectric and electrolyte). Each carries an `updating` flag the
//! driver raises around the corresponding step of the SCF cycle; the
//! boundary state machines key off those flags.

pub mod charges;
pub mod dielectric;
pub mod electrolyte;
pub mod electrons;
pub mod externals;
pub mod ions;
pub mod semiconductor;
pub mod system;

use thiserror::Error;

pub use charges::{Charges, SolveRequest};
pub use dielectric::{Dielectric, PermittivityForm};
pub use electrolyte::{Electrolyte, ElectrolyteSpec};
pub use electrons::Electrons;
pub use externals::Externals;
pub use ions::{Ions, IonsSpec, RadiusMode};
pub use semiconductor::Semiconductor;
pub use system::System;

#[derive(Debug, Error)]
pub enum PhysicalError {
    #[error("{0} does not match any tabulated element")]
    UnknownElement(String),

    #[error("missing solvation radius for ion type {0}")]
    MissingSolvationRadius(usize),

    #[error("missing atomic spread for ion type {0}")]
    MissingAtomicSpread(usize),

    #[error("number of coordinates ({got}) does not match the number of ions ({expected})")]
    MismatchedAtoms { expected: usize, got: usize },

    #[error("{0:.2e} error in integrated electronic charge")]
    ChargeMismatch(f64),

    #[error(
        "maximum ion concentration {cionmax:.3e} is below the largest bulk concentration {cbulk:.3e}"
    )]
    CionmaxTooSmall { cionmax: f64, cbulk: f64 },

    #[error("electrolyte stoichiometry must be given as (multiplicity, charge) pairs")]
    MalformedFormula,

    #[error("boundary derivative fields required by {0} were not allocated")]
    MissingDerivatives(&'static str),

    #[error("{0} is not yet supported")]
    Unsupported(&'static str),
}
