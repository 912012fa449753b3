//! TOML configuration deserialisation for embedding jobs.

use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub grid: GridConfig,
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub solvent: SolventConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub electrolyte: Option<ElectrolyteConfig>,
    pub ions: IonsConfig,
    #[serde(default)]
    pub electrons: ElectronsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulation cell: cubic, `points` grid points per axis.
#[derive(Debug, Deserialize)]
pub struct GridConfig {
    /// Cell side (bohr).
    pub side: f64,
    pub points: usize,
}

/// Continuum environment parameters.
#[derive(Debug, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_permittivity")]
    pub static_permittivity: f64,
    /// Problem kind: poisson | generalized | linpb | linmodpb | pb | modpb.
    #[serde(default = "default_problem")]
    pub problem: String,
    /// Periodic-boundary correction: "none" or "parabolic".
    #[serde(default = "default_pbc_correction")]
    pub pbc_correction: String,
    /// Number of periodic directions for the correction (0 or 2).
    #[serde(default)]
    pub pbc_dim: usize,
    #[serde(default)]
    pub pbc_axis: usize,
}

fn default_permittivity() -> f64 {
    78.3
}
fn default_problem() -> String {
    "generalized".into()
}
fn default_pbc_correction() -> String {
    "none".into()
}

/// Cavity boundary parameters.
#[derive(Debug, Deserialize)]
pub struct SolventConfig {
    /// Boundary mode: electronic | full | ionic | system.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Derivative method: fft | chain | lowmem | highmem.
    #[serde(default = "default_deriv_method")]
    pub deriv_method: String,
    #[serde(default = "default_rhomin")]
    pub rhomin: f64,
    #[serde(default = "default_rhomax")]
    pub rhomax: f64,
    /// Soft-sphere radius scale (ionic mode).
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Soft-sphere spread (ionic mode).
    #[serde(default = "default_softness")]
    pub softness: f64,
    /// Cavity radius (system mode, bohr).
    #[serde(default = "default_distance")]
    pub distance: f64,
    /// Cavity spread (system mode, bohr).
    #[serde(default = "default_spread")]
    pub spread: f64,
    /// Solvation-radius table: pauling | bondi | uff | muff.
    #[serde(default = "default_radius_mode")]
    pub radius_mode: String,
    /// Solvent probe radius (bohr); positive enables solvent awareness.
    #[serde(default)]
    pub radius: f64,
    #[serde(default = "default_radial_scale")]
    pub radial_scale: f64,
    #[serde(default = "default_radial_spread")]
    pub radial_spread: f64,
    #[serde(default = "default_filling_threshold")]
    pub filling_threshold: f64,
    #[serde(default = "default_filling_spread")]
    pub filling_spread: f64,
}

impl Default for SolventConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields carry defaults")
    }
}

fn default_mode() -> String {
    "electronic".into()
}
fn default_deriv_method() -> String {
    "chain".into()
}
fn default_rhomin() -> f64 {
    1e-4
}
fn default_rhomax() -> f64 {
    5e-3
}
fn default_alpha() -> f64 {
    1.12
}
fn default_softness() -> f64 {
    0.5
}
fn default_distance() -> f64 {
    4.0
}
fn default_spread() -> f64 {
    0.5
}
fn default_radius_mode() -> String {
    "uff".into()
}
fn default_radial_scale() -> f64 {
    2.0
}
fn default_radial_spread() -> f64 {
    0.5
}
fn default_filling_threshold() -> f64 {
    0.825
}
fn default_filling_spread() -> f64 {
    0.02
}

/// Electrostatic solver parameters.
#[derive(Debug, Deserialize)]
pub struct SolverConfig {
    /// Strategy: direct | gradient | fixedpoint | newton.
    #[serde(default = "default_solver_kind")]
    pub kind: String,
    #[serde(default = "default_maxiter")]
    pub maxiter: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Preconditioner for the gradient solver: sqrt | left.
    #[serde(default = "default_preconditioner")]
    pub preconditioner: String,
    #[serde(default = "default_true")]
    pub conjugate: bool,
    /// Mixing for the fixed-point solver.
    #[serde(default = "default_mixing")]
    pub mixing: f64,
    /// Auxiliary coupling scheme: none | full | ioncc.
    #[serde(default = "default_auxiliary")]
    pub auxiliary: String,
    /// Iteration cap for the outer Newton loop.
    #[serde(default = "default_newton_maxiter")]
    pub newton_maxiter: usize,
    #[serde(default = "default_newton_tolerance")]
    pub newton_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields carry defaults")
    }
}

fn default_solver_kind() -> String {
    "gradient".into()
}
fn default_maxiter() -> usize {
    100
}
fn default_tolerance() -> f64 {
    1e-7
}
fn default_preconditioner() -> String {
    "sqrt".into()
}
fn default_true() -> bool {
    true
}
fn default_mixing() -> f64 {
    0.6
}
fn default_auxiliary() -> String {
    "none".into()
}
fn default_newton_maxiter() -> usize {
    30
}
fn default_newton_tolerance() -> f64 {
    1e-9
}

/// Mobile-ion continuum parameters.
#[derive(Debug, Deserialize)]
pub struct ElectrolyteConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_permittivity")]
    pub permittivity: f64,
    /// Base bulk concentration (bohr⁻³).
    pub cbulk: f64,
    /// (multiplicity, charge) pairs, e.g. [[1, 1], [1, -1]].
    pub formula: Vec<(u32, i32)>,
    #[serde(default)]
    pub linearized: bool,
    #[serde(default)]
    pub cionmax: f64,
    #[serde(default)]
    pub rion: f64,
}

fn default_temperature() -> f64 {
    300.0
}

/// Atomic structure of the embedded system.
#[derive(Debug, Deserialize)]
pub struct IonsConfig {
    pub atom: Vec<AtomConfig>,
    #[serde(default)]
    pub atomicspread: Option<f64>,
    #[serde(default)]
    pub corespread: Option<f64>,
}

/// One atom: element label, position (bohr), valence charge.
#[derive(Debug, Deserialize)]
pub struct AtomConfig {
    pub label: String,
    pub pos: [f64; 3],
    pub zv: f64,
    #[serde(default)]
    pub solvationrad: Option<f64>,
}

/// Synthetic valence density for the stand-alone driver: a neutralising
/// Gaussian at the system centre.
#[derive(Debug, Deserialize)]
pub struct ElectronsConfig {
    #[serde(default = "default_electron_spread")]
    pub spread: f64,
}

impl Default for ElectronsConfig {
    fn default() -> Self {
        Self {
            spread: default_electron_spread(),
        }
    }
}

fn default_electron_spread() -> f64 {
    1.5
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Planar average of the potential along z, as CSV.
    #[serde(default = "default_true")]
    pub save_potential_profile: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_potential_profile: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: JobConfig = toml::from_str(&content)?;
    Ok(config)
}
