//! Ions: per-type parameters, coordinates, and smeared representations.
//!
//! Each ion type carries a valence, a Gaussian atomic spread (for the
//! smeared point-charge representation), a core-electron spread, and a
//! solvation radius used by the soft-sphere boundary. Solvation radii come
//! from one of the tabulated sets (`pauling`, `bondi`, `uff`, `muff`) or an
//! explicit per-type override.
//!
//! Sign convention: stored valences are the negative of the nuclear charge,
//! so electrons integrate positive and a neutral system sums to zero.

use std::sync::Arc;

use solvia_grid::functions::{FunctionKind, FunctionSet, SmoothFunction};
use solvia_grid::{Grid, ScalarField};

use crate::constants::TPI;
use crate::physical::PhysicalError;

/// Elements covered by the built-in radius tables (H–Ar); heavier species
/// need an explicit solvation radius.
const ELEMENTS: [&str; 18] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar",
];

const WEIGHTS: [f64; 18] = [
    1.00794, 4.002602, 6.941, 9.012182, 10.811, 12.0107, 14.0067, 15.9994, 18.9984032, 20.1797,
    22.98977, 24.305, 26.981538, 28.0855, 30.973761, 32.065, 35.453, 39.948,
];

const PAULING: [f64; 18] = [
    1.2, 0.0, 0.0, 0.0, 0.0, 1.5, 1.5, 1.4, 1.35, 0.0, 0.0, 0.0, 0.0, 0.0, 1.9, 1.85, 1.8, 0.0,
];

const BONDI: [f64; 18] = [
    1.2, 1.4, 1.82, 1.85, 1.8, 1.7, 1.55, 1.52, 1.47, 1.54, 2.27, 1.73, 2.3, 2.1, 1.8, 1.8, 1.75,
    1.88,
];

const UFF: [f64; 18] = [
    2.886, 2.362, 2.451, 2.745, 4.083, 3.851, 3.66, 3.5, 3.364, 3.243, 2.983, 3.021, 4.499, 4.295,
    4.147, 4.035, 3.947, 3.868,
];

const MUFF: [f64; 18] = [
    2.886, 2.362, 2.451, 2.745, 4.083, 3.851, 3.1, 3.5, 3.364, 3.243, 2.983, 3.021, 4.499, 4.295,
    4.147, 4.035, 3.947, 3.868,
];

/// Which tabulated solvation-radius set to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadiusMode {
    Pauling,
    Bondi,
    Uff,
    Muff,
}

/// Static parameters of one ionic species.
#[derive(Debug, Clone)]
pub struct IonType {
    pub index: usize,
    pub label: String,
    pub number: usize,
    /// Negative of the nuclear valence charge.
    pub zv: f64,
    pub weight: f64,
    pub atomicspread: f64,
    pub corespread: f64,
    pub solvationrad: f64,
}

impl IonType {
    fn new(
        index: usize,
        label: &str,
        zv: f64,
        radius_mode: RadiusMode,
        atomicspread: f64,
        corespread: f64,
        solvationrad: f64,
    ) -> Result<Self, PhysicalError> {
        let number = ELEMENTS
            .iter()
            .position(|&e| e.eq_ignore_ascii_case(label))
            .ok_or_else(|| PhysicalError::UnknownElement(label.into()))?;

        let table = match radius_mode {
            RadiusMode::Pauling => &PAULING,
            RadiusMode::Bondi => &BONDI,
            RadiusMode::Uff => &UFF,
            RadiusMode::Muff => &MUFF,
        };

        Ok(Self {
            index,
            label: ELEMENTS[number].to_string(),
            number: number + 1,
            zv: -zv,
            weight: WEIGHTS[number],
            atomicspread: if atomicspread > 0.0 { atomicspread } else { 0.5 },
            // hydrogen carries no core electrons
            corespread: if number == 0 {
                1e-10
            } else if corespread > 0.0 {
                corespread
            } else {
                0.5
            },
            solvationrad: if solvationrad > 0.0 {
                solvationrad
            } else {
                table[number]
            },
        })
    }
}

/// Construction parameters for [`Ions`].
#[derive(Debug, Clone)]
pub struct IonsSpec {
    /// Element label per type.
    pub labels: Vec<String>,
    /// Type index of each ion.
    pub itypes: Vec<usize>,
    /// Valence charge per type.
    pub zv: Vec<f64>,
    /// Per-type overrides; zero selects the default.
    pub atomicspread: Vec<f64>,
    pub corespread: Vec<f64>,
    pub solvationrad: Vec<f64>,
    pub radius_mode: RadiusMode,
    /// True when the boundary is density-derived and needs no radii.
    pub soft_cavity: bool,
    /// Represent ions as Gaussians of width `atomicspread`.
    pub smear: bool,
    /// Build core-electron Gaussians of width `corespread`.
    pub fill_cores: bool,
}

/// The ions of the embedded system.
#[derive(Debug)]
pub struct Ions {
    grid: Arc<Grid>,
    count: usize,
    itypes: Vec<usize>,
    iontypes: Vec<IonType>,
    coords: Vec<[f64; 3]>,
    charge: f64,
    smeared: bool,
    filled_cores: bool,
    /// Smeared point-charge density (when `smear`).
    density: ScalarField,
    smeared_ions: FunctionSet,
    /// Core-electron density accumulated by the full electronic boundary.
    core_density: ScalarField,
    core_electrons: FunctionSet,
    com: [f64; 3],
    quadrupole_pc: [f64; 3],
    quadrupole_gauss: [f64; 3],
    quadrupole_correction: f64,
    selfenergy_correction: f64,
    potential_shift: f64,
    pub updating: bool,
}

impl Ions {
    pub fn new(spec: IonsSpec, nions: usize, grid: Arc<Grid>) -> Result<Self, PhysicalError> {
        let ntypes = spec.labels.len();
        debug_assert!(spec.itypes.len() == nions);

        let mut iontypes = Vec::with_capacity(ntypes);
        for i in 0..ntypes {
            let ion = IonType::new(
                i,
                &spec.labels[i],
                spec.zv[i],
                spec.radius_mode,
                spec.atomicspread[i],
                spec.corespread[i],
                spec.solvationrad[i],
            )?;

            if !spec.soft_cavity && ion.solvationrad == 0.0 {
                return Err(PhysicalError::MissingSolvationRadius(i));
            }
            if spec.smear && ion.atomicspread == 0.0 {
                return Err(PhysicalError::MissingAtomicSpread(i));
            }

            iontypes.push(ion);
        }

        let charge = spec.itypes.iter().map(|&t| iontypes[t].zv).sum();

        Ok(Self {
            count: nions,
            itypes: spec.itypes,
            iontypes,
            coords: vec![[0.0; 3]; nions],
            charge,
            smeared: spec.smear,
            filled_cores: spec.fill_cores,
            density: ScalarField::new(grid.clone(), "smeared_ions"),
            smeared_ions: FunctionSet::new(),
            core_density: ScalarField::new(grid.clone(), "core_electrons"),
            core_electrons: FunctionSet::new(),
            com: [0.0; 3],
            quadrupole_pc: [0.0; 3],
            quadrupole_gauss: [0.0; 3],
            quadrupole_correction: 0.0,
            selfenergy_correction: 0.0,
            potential_shift: 0.0,
            grid,
            updating: false,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn iontype_of(&self, ion: usize) -> &IonType {
        &self.iontypes[self.itypes[ion]]
    }

    pub fn iontypes(&self) -> &[IonType] {
        &self.iontypes
    }

    pub fn coords(&self) -> &[[f64; 3]] {
        &self.coords
    }

    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn com(&self) -> [f64; 3] {
        self.com
    }

    pub fn density(&self) -> &ScalarField {
        &self.density
    }

    pub fn core_density(&self) -> &ScalarField {
        &self.core_density
    }

    pub fn core_density_mut(&mut self) -> &mut ScalarField {
        &mut self.core_density
    }

    pub fn core_electrons(&self) -> &FunctionSet {
        &self.core_electrons
    }

    pub fn smeared(&self) -> bool {
        self.smeared
    }

    pub fn filled_cores(&self) -> bool {
        self.filled_cores
    }

    pub fn smeared_ions(&self) -> &FunctionSet {
        &self.smeared_ions
    }

    pub fn quadrupole_correction(&self) -> f64 {
        self.quadrupole_correction
    }

    pub fn selfenergy_correction(&self) -> f64 {
        self.selfenergy_correction
    }

    pub fn potential_shift(&self) -> f64 {
        self.potential_shift
    }

    pub fn quadrupole_pc(&self) -> [f64; 3] {
        self.quadrupole_pc
    }

    pub fn quadrupole_gauss(&self) -> [f64; 3] {
        self.quadrupole_gauss
    }

    /// Take over new coordinates at an ionic step. `center` overrides the
    /// mass-weighted centre.
    pub fn update(
        &mut self,
        coords: &[[f64; 3]],
        center: Option<[f64; 3]>,
    ) -> Result<(), PhysicalError> {
        if coords.len() != self.count {
            return Err(PhysicalError::MismatchedAtoms {
                expected: self.count,
                got: coords.len(),
            });
        }
        self.coords.copy_from_slice(coords);

        self.com = match center {
            Some(c) => c,
            None => {
                let mut com = [0.0; 3];
                let mut total_weight = 0.0;
                for i in 0..self.count {
                    let weight = self.iontype_of(i).weight;
                    for (c, x) in com.iter_mut().zip(self.coords[i]) {
                        *c += x * weight;
                    }
                    total_weight += weight;
                }
                com.map(|c| c / total_weight)
            }
        };

        self.quadrupole_pc = [0.0; 3];
        self.quadrupole_correction = 0.0;
        self.selfenergy_correction = 0.0;

        for i in 0..self.count {
            let iontype = self.iontype_of(i).clone();

            for l in 0..3 {
                let d = self.coords[i][l] - self.com[l];
                self.quadrupole_pc[l] += iontype.zv * d * d;
            }

            if self.smeared {
                self.quadrupole_correction +=
                    iontype.zv * iontype.atomicspread * iontype.atomicspread * 0.5;
                self.selfenergy_correction += iontype.zv * iontype.zv / iontype.atomicspread
                    * (2.0 / std::f64::consts::PI).sqrt();
            }
        }

        if self.smeared {
            self.rebuild_smeared_ions();
            self.potential_shift =
                self.quadrupole_correction * TPI / self.grid.volume();
            for l in 0..3 {
                self.quadrupole_gauss[l] = self.quadrupole_pc[l] + self.quadrupole_correction;
            }
        }

        if self.filled_cores {
            self.rebuild_core_electrons();
        }

        Ok(())
    }

    fn rebuild_smeared_ions(&mut self) {
        self.smeared_ions = FunctionSet::new();
        for i in 0..self.count {
            let iontype = self.iontype_of(i);
            let ion = SmoothFunction::new(
                FunctionKind::Gaussian,
                0,
                0,
                0.0,
                iontype.atomicspread,
                iontype.zv,
                self.coords[i],
                iontype.label.clone(),
            )
            .expect("ion spreads validated at construction");
            self.smeared_ions.push(ion);
        }

        self.density = self.smeared_ions.density(&self.grid);
    }

    fn rebuild_core_electrons(&mut self) {
        self.core_electrons = FunctionSet::new();
        for i in 0..self.count {
            let iontype = self.iontype_of(i);
            let core = SmoothFunction::new(
                FunctionKind::Gaussian,
                0,
                0,
                0.0,
                iontype.corespread,
                -iontype.zv,
                self.coords[i],
                format!("{}_core", iontype.label),
            )
            .expect("core spreads validated at construction");
            self.core_electrons.push(core);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn water_spec() -> IonsSpec {
        IonsSpec {
            labels: vec!["O".into(), "H".into()],
            itypes: vec![0, 1, 1],
            zv: vec![6.0, 1.0],
            atomicspread: vec![0.5, 0.5],
            corespread: vec![0.5, 0.5],
            solvationrad: vec![0.0, 0.0],
            radius_mode: RadiusMode::Uff,
            soft_cavity: false,
            smear: true,
            fill_cores: false,
        }
    }

    #[test]
    fn charge_is_negated_valence_sum() {
        let grid = Grid::cubic(12.0, 16, "ions").unwrap();
        let ions = Ions::new(water_spec(), 3, grid).unwrap();
        assert_abs_diff_eq!(ions.charge(), -8.0, epsilon = 1e-12);
    }

    #[test]
    fn smeared_density_integrates_to_the_ionic_charge() {
        let grid = Grid::cubic(12.0, 32, "ions").unwrap();
        let mut ions = Ions::new(water_spec(), 3, grid).unwrap();
        ions.update(
            &[[6.0, 6.0, 6.0], [7.5, 6.0, 6.0], [5.4, 7.4, 6.0]],
            None,
        )
        .unwrap();
        assert_relative_eq!(ions.density().integral(), -8.0, max_relative = 1e-5);
    }

    #[test]
    fn radius_table_fills_missing_solvation_radii() {
        let grid = Grid::cubic(12.0, 8, "ions").unwrap();
        let ions = Ions::new(water_spec(), 3, grid).unwrap();
        assert_relative_eq!(ions.iontypes()[0].solvationrad, 3.5, max_relative = 1e-12);
        assert_relative_eq!(ions.iontypes()[1].solvationrad, 2.886, max_relative = 1e-12);
    }

    #[test]
    fn coordinate_count_mismatch_is_an_error() {
        let grid = Grid::cubic(12.0, 8, "ions").unwrap();
        let mut ions = Ions::new(water_spec(), 3, grid).unwrap();
        assert!(matches!(
            ions.update(&[[0.0; 3]; 2], None),
            Err(PhysicalError::MismatchedAtoms { .. })
        ));
    }

    #[test]
    fn unknown_element_is_rejected() {
        let grid = Grid::cubic(12.0, 8, "ions").unwrap();
        let mut spec = water_spec();
        spec.labels[0] = "Xx".into();
        assert!(matches!(
            Ions::new(spec, 3, grid),
            Err(PhysicalError::UnknownElement(_))
        ));
    }
}
