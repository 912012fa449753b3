//! The electrolyte response model: mobile ions in the continuum.
//!
//! A stoichiometric formula defines the ionic species; each contributes a
//! bulk concentration and a charge. The boundary-derived exclusion function
//! γ keeps the mobile ions out of the cavity. The full Poisson–Boltzmann
//! response exponentiates the potential; the linearized variant reduces to
//! Debye screening with k² = 4π Σ cᵢzᵢ²/(k_B T).
//!
//! The electrolyte free-energy and boundary-sensitivity contributions are
//! not yet supported and surface as typed errors rather than guesses.

use std::sync::Arc;

use ndarray::Zip;

use solvia_grid::{Grid, ScalarField};

use crate::boundary::Boundary;
use crate::constants::{FPI, KB};
use crate::physical::PhysicalError;

/// Exponent clamp for the Boltzmann factors.
const EXP_MAX: f64 = 4e1;

/// One mobile ionic species.
#[derive(Debug)]
struct IonccType {
    /// Bulk concentration (bohr⁻³).
    cbulk: f64,
    /// Ionic charge.
    z: f64,
    /// Local concentration from the last potential.
    concentration: ScalarField,
}

/// Construction parameters for [`Electrolyte`].
#[derive(Debug, Clone)]
pub struct ElectrolyteSpec {
    /// Temperature (K).
    pub temperature: f64,
    /// Bulk permittivity of the electrolyte region.
    pub permittivity: f64,
    /// Base bulk concentration multiplied by each stoichiometric count
    /// (bohr⁻³).
    pub cbulk: f64,
    /// (multiplicity, charge) per species, e.g. `[(1, 1), (1, -1)]` for a
    /// 1:1 salt.
    pub formula: Vec<(u32, i32)>,
    /// True for the linearized (Debye) response.
    pub linearized: bool,
    /// Maximum packing concentration for the modified PB model (bohr⁻³);
    /// zero disables packing.
    pub cionmax: f64,
    /// Alternative to `cionmax`: an ionic radius (bohr) from which the
    /// close-packing concentration is derived.
    pub rion: f64,
}

/// The mobile-ion continuum response.
#[derive(Debug)]
pub struct Electrolyte {
    grid: Arc<Grid>,
    temperature: f64,
    permittivity: f64,
    linearized: bool,
    /// Debye factor k² = 4π Σ cᵢzᵢ²/(k_B T).
    k2: f64,
    cionmax: f64,
    types: Vec<IonccType>,
    /// Ion-accessibility function γ = 1 − s.
    gamma: ScalarField,
    /// dγ/ds.
    dgamma: ScalarField,
    /// Net mobile-charge density from the last potential.
    density: ScalarField,
    charge: f64,
    /// True once `of_potential` has populated the concentrations.
    concentrations_current: bool,
    pub updating: bool,
}

impl Electrolyte {
    pub fn new(spec: ElectrolyteSpec, grid: Arc<Grid>) -> Result<Self, PhysicalError> {
        if spec.formula.is_empty() {
            return Err(PhysicalError::MalformedFormula);
        }

        let mut types = Vec::with_capacity(spec.formula.len());
        let mut sumcz2 = 0.0;
        let mut maxcbulk: f64 = spec.cbulk;

        for (i, &(multiplicity, z)) in spec.formula.iter().enumerate() {
            let ci = multiplicity as f64 * spec.cbulk;
            let zi = z as f64;
            sumcz2 += ci * zi * zi;
            maxcbulk = maxcbulk.max(ci);
            types.push(IonccType {
                cbulk: ci,
                z: zi,
                concentration: ScalarField::new(grid.clone(), format!("c_electrolyte_{i}")),
            });
        }

        let mut cionmax = spec.cionmax;
        if cionmax == 0.0 && spec.rion > 0.0 {
            cionmax = 0.64 * 3.0 / (FPI * spec.rion.powi(3));
        }
        if cionmax > 0.0 && cionmax < maxcbulk {
            return Err(PhysicalError::CionmaxTooSmall {
                cionmax,
                cbulk: maxcbulk,
            });
        }

        let k2 = sumcz2 * FPI / (KB * spec.temperature);

        Ok(Self {
            temperature: spec.temperature,
            permittivity: spec.permittivity,
            linearized: spec.linearized,
            k2,
            cionmax,
            types,
            gamma: ScalarField::new(grid.clone(), "gamma"),
            dgamma: ScalarField::new(grid.clone(), "dgamma"),
            density: ScalarField::new(grid.clone(), "electrolyte"),
            charge: 0.0,
            concentrations_current: false,
            grid,
            updating: false,
        })
    }

    pub fn linearized(&self) -> bool {
        self.linearized
    }

    pub fn k2(&self) -> f64 {
        self.k2
    }

    pub fn permittivity(&self) -> f64 {
        self.permittivity
    }

    pub fn gamma(&self) -> &ScalarField {
        &self.gamma
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    /// Rebuild the ion-accessibility function from the boundary switch.
    pub fn of_boundary(&mut self, boundary: &dyn Boundary) {
        let switch = boundary.data().switch();
        Zip::from(self.gamma.data_mut())
            .and(switch.data())
            .for_each(|g, &s| *g = 1.0 - s);
        self.dgamma.fill(-1.0);
        self.concentrations_current = false;
    }

    /// Refresh the mobile-ion densities for a solved potential.
    pub fn of_potential(&mut self, potential: &ScalarField) {
        if self.linearized {
            // ρ = −γ k² φ / 4π
            let k2 = self.k2;
            Zip::from(self.density.data_mut())
                .and(self.gamma.data())
                .and(potential.data())
                .for_each(|rho, &g, &v| {
                    *rho = -g * k2 * v / FPI;
                });
            self.charge = self.density.integral();
            return;
        }

        let kt = KB * self.temperature;

        for t in &mut self.types {
            let (z, cbulk) = (t.z, t.cbulk);
            Zip::from(t.concentration.data_mut())
                .and(self.gamma.data())
                .and(potential.data())
                .for_each(|c, &g, &v| {
                    let arg = (-z * v / kt).clamp(-EXP_MAX, EXP_MAX);
                    *c = cbulk * g * arg.exp();
                });
        }

        // modified PB: suppress concentrations approaching close packing
        if self.cionmax > 0.0 {
            let mut denom = ScalarField::new(self.grid.clone(), "packing");
            denom.fill(1.0);
            for t in &self.types {
                let fraction = t.cbulk / self.cionmax;
                Zip::from(denom.data_mut())
                    .and(t.concentration.data())
                    .for_each(|d, &c| {
                        *d += fraction * (c / t.cbulk.max(f64::MIN_POSITIVE) - 1.0);
                    });
            }
            for t in &mut self.types {
                Zip::from(t.concentration.data_mut())
                    .and(denom.data())
                    .for_each(|c, &d| *c /= d.max(f64::MIN_POSITIVE));
            }
        }

        self.density.fill(0.0);
        for t in &self.types {
            Zip::from(self.density.data_mut())
                .and(t.concentration.data())
                .for_each(|rho, &c| *rho += t.z * c);
        }
        self.charge = self.density.integral();
        self.concentrations_current = true;
    }

    /// Local screening field S(r) for the operator ∇·(ε∇φ) − 4πSφ: the
    /// Debye limit γk²/4π before any potential is known, the concentration
    /// weighted derivative Σ zᵢ²cᵢ/(k_B T) afterwards.
    pub fn screening(&self) -> ScalarField {
        let mut out = ScalarField::new(self.grid.clone(), "screening");

        if self.linearized || !self.concentrations_current {
            let k2 = self.k2;
            Zip::from(out.data_mut())
                .and(self.gamma.data())
                .for_each(|o, &g| *o = g * k2 / FPI);
        } else {
            let kt = KB * self.temperature;
            for t in &self.types {
                Zip::from(out.data_mut())
                    .and(t.concentration.data())
                    .for_each(|o, &c| *o += t.z * t.z * c / kt);
            }
        }

        out
    }

    /// Electrolyte free energy — not yet supported.
    pub fn energy(&self) -> Result<f64, PhysicalError> {
        Err(PhysicalError::Unsupported("electrolyte energy"))
    }

    /// Electrolyte boundary sensitivity — not yet supported.
    pub fn de_dboundary(&self, _out: &mut ScalarField) -> Result<(), PhysicalError> {
        Err(PhysicalError::Unsupported("electrolyte de_dboundary"))
    }
}
