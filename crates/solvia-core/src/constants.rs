//! Physical and mathematical constants, Hartree atomic units.

use std::f64::consts::PI;

/// 2π.
pub const TPI: f64 = 2.0 * PI;

/// 4π.
pub const FPI: f64 = 4.0 * PI;

/// √π.
pub const SQRTPI: f64 = 1.772_453_850_905_516;

/// Boltzmann constant (hartree / K).
pub const KB: f64 = 3.166_811_563e-6;

/// Bohr radius (m).
pub const BOHR_RADIUS: f64 = 5.291_772_109e-11;

/// Atomic mass unit (kg).
pub const AMU: f64 = 1.660_539_066e-27;

/// Madelung constant of the simple cubic point-countercharge lattice.
pub const MADELUNG_SC: f64 = 2.837_297_479;
