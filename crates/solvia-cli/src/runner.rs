//! Embedding-run driver: ties together grid, physical state, boundary,
//! dielectric, and solver for a single stand-alone calculation.
//!
//! The driver builds a synthetic but self-consistent system from the
//! configuration: smeared ions at the given coordinates plus a
//! neutralising Gaussian valence density at the system centre, then runs
//! one full update cycle (ionic step, electronic step) and one
//! electrostatic solve.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use solvia_core::boundary::{
    Boundary, BoundaryData, DerivLevel, DerivMethod, ElectronicBoundary, ElectronicMode,
    IonicBoundary, SolventAwareParams, SystemBoundary,
};
use solvia_core::core::{Analytic1dCore, CoreContainer, FftCore};
use solvia_core::physical::{
    Charges, Dielectric, Electrolyte, ElectrolyteSpec, Electrons, Ions, IonsSpec,
    PermittivityForm, RadiusMode, System,
};
use solvia_core::solver::{
    AuxiliaryScheme, DirectSolver, ElectrostaticSolver, FixedPointSolver, GradientSolver,
    IterativeSettings, NewtonSolver, Preconditioner, Problem, SolverSetup,
};
use solvia_grid::functions::{FunctionKind, SmoothFunction};
use solvia_grid::{Grid, ScalarField};

use crate::config::JobConfig;

/// Results of one embedding run.
pub struct RunOutput {
    pub potential: ScalarField,
    pub energy: f64,
    pub volume: f64,
    pub surface: f64,
    pub polarization_charge: f64,
}

enum AnyBoundary {
    Electronic(ElectronicBoundary),
    Ionic(IonicBoundary),
    System(SystemBoundary),
}

impl AnyBoundary {
    fn as_boundary(&self) -> &dyn Boundary {
        match self {
            AnyBoundary::Electronic(b) => b,
            AnyBoundary::Ionic(b) => b,
            AnyBoundary::System(b) => b,
        }
    }
}

/// Run one embedding calculation from a parsed job configuration.
pub fn run_job(job: &JobConfig) -> Result<RunOutput> {
    let grid = Grid::cubic(job.grid.side, job.grid.points, "environment")?;
    info!(
        side = job.grid.side,
        points = job.grid.points,
        volume = grid.volume(),
        "grid built"
    );

    // numerical cores
    let fft = Arc::new(FftCore::new(grid.clone()));
    let mut cores = CoreContainer::new("environment", fft.clone(), fft.clone());
    match job.environment.pbc_correction.as_str() {
        "none" => {}
        "parabolic" => {
            let correction = Analytic1dCore::new(
                grid.clone(),
                job.environment.pbc_dim,
                job.environment.pbc_axis,
            )?;
            cores = cores.with_corrections(Arc::new(correction));
        }
        other => bail!("unknown pbc correction '{other}' (expected none|parabolic)"),
    }

    // physical containers
    let (mut ions, mut system, mut electrons) = build_physical(job, &grid)?;

    // problem/solver selection fixes how many derivatives the boundary needs
    let problem = parse_problem(&job.environment.problem)?;
    let solver_kind = job.solver.kind.as_str();
    let need_factsqrt = matches!(solver_kind, "gradient" | "newton")
        && job.solver.preconditioner == "sqrt"
        && problem != Problem::Poisson;
    let deriv_level = if need_factsqrt {
        DerivLevel::Laplacian
    } else {
        DerivLevel::Gradient
    };
    let deriv_method = parse_deriv_method(&job.solvent.deriv_method)?;

    // boundary
    let data = BoundaryData::new(
        grid.clone(),
        cores.clone(),
        deriv_level,
        deriv_method,
        "solvent",
    );
    let mut boundary = build_boundary(job, data, &ions, &system)?;
    if job.solvent.radius > 0.0 {
        boundary_data_mut(&mut boundary).activate_solvent_awareness(SolventAwareParams {
            solvent_radius: job.solvent.radius,
            radial_scale: job.solvent.radial_scale,
            radial_spread: job.solvent.radial_spread,
            filling_threshold: job.solvent.filling_threshold,
            filling_spread: job.solvent.filling_spread,
        })?;
    }

    // dielectric and electrolyte
    let density_derived = matches!(boundary, AnyBoundary::Electronic(_));
    let form = if density_derived {
        PermittivityForm::Exponential
    } else {
        PermittivityForm::Linear
    };
    let mut dielectric = (problem != Problem::Poisson).then(|| {
        Dielectric::new(
            grid.clone(),
            job.environment.static_permittivity,
            form,
            true,
            need_factsqrt,
            solver_kind == "fixedpoint",
        )
    });

    let mut electrolyte = match &job.electrolyte {
        Some(cfg) => Some(Electrolyte::new(
            ElectrolyteSpec {
                temperature: cfg.temperature,
                permittivity: cfg.permittivity,
                cbulk: cfg.cbulk,
                formula: cfg.formula.clone(),
                linearized: cfg.linearized,
                cionmax: cfg.cionmax,
                rion: cfg.rion,
            },
            grid.clone(),
        )?),
        None => None,
    };

    // one full update cycle: rigid (ionic) step first, then soft
    // (electronic); only the electronic boundary moves on the soft step
    ions.updating = true;
    system.updating = true;
    if let Some(corrections) = cores.corrections() {
        corrections.update_origin(system.com());
    }
    match &mut boundary {
        AnyBoundary::Electronic(b) => b.update(&electrons, Some(&mut ions))?,
        AnyBoundary::Ionic(b) => b.update(&ions)?,
        AnyBoundary::System(b) => b.update(&system)?,
    }
    ions.updating = false;
    system.updating = false;

    electrons.updating = true;
    if let AnyBoundary::Electronic(b) = &mut boundary {
        b.update(&electrons, Some(&mut ions))?;
    }
    electrons.updating = false;

    if let Some(dielectric) = dielectric.as_mut() {
        dielectric.update(boundary.as_boundary())?;
    }
    if let Some(electrolyte) = electrolyte.as_mut() {
        electrolyte.of_boundary(boundary.as_boundary());
    }

    let bdata = boundary.as_boundary().data();
    info!(
        volume = bdata.volume(),
        surface = bdata.surface(),
        "boundary ready"
    );

    // total source charge
    let mut charges = Charges::new(grid.clone());
    charges.update(&[electrons.density(), ions.density()]);
    info!(total_charge = charges.charge(), "charges assembled");

    // solver setup and solve
    let setup = build_setup(job, problem, &cores)?;
    let mut request = charges.request(dielectric.as_mut(), electrolyte.as_mut(), None);
    let potential = setup.solve(&mut request)?;
    request.of_potential(&potential, cores.electrostatics());
    drop(request);

    let energy = setup.energy(
        &charges,
        &ions,
        dielectric.as_ref(),
        electrolyte.as_ref(),
        &potential,
        false,
    );

    let bdata = boundary.as_boundary().data();
    Ok(RunOutput {
        energy,
        volume: bdata.volume(),
        surface: bdata.surface(),
        polarization_charge: dielectric.as_ref().map(|d| d.charge()).unwrap_or(0.0),
        potential,
    })
}

fn build_physical(job: &JobConfig, grid: &Arc<Grid>) -> Result<(Ions, System, Electrons)> {
    // group atoms into types by label
    let mut labels: Vec<String> = Vec::new();
    let mut itypes = Vec::new();
    let mut zv = Vec::new();
    let mut solvationrad = Vec::new();
    for atom in &job.ions.atom {
        let t = match labels.iter().position(|l| l == &atom.label) {
            Some(t) => t,
            None => {
                labels.push(atom.label.clone());
                zv.push(atom.zv);
                solvationrad.push(atom.solvationrad.unwrap_or(0.0));
                labels.len() - 1
            }
        };
        itypes.push(t);
    }

    let ntypes = labels.len();
    let spec = IonsSpec {
        labels,
        itypes,
        zv,
        atomicspread: vec![job.ions.atomicspread.unwrap_or(0.5); ntypes],
        corespread: vec![job.ions.corespread.unwrap_or(0.5); ntypes],
        solvationrad,
        radius_mode: parse_radius_mode(&job.solvent.radius_mode)?,
        soft_cavity: job.solvent.mode != "ionic",
        smear: true,
        fill_cores: job.solvent.mode == "full",
    };

    let mut ions = Ions::new(spec, job.ions.atom.len(), grid.clone())?;
    let coords: Vec<[f64; 3]> = job.ions.atom.iter().map(|a| a.pos).collect();
    ions.update(&coords, None)?;

    let mut system = System::new(0, 0, 0);
    system.update(&ions, None)?;

    // neutralising Gaussian valence density at the system centre
    let nelec = -ions.charge();
    let valence = SmoothFunction::new(
        FunctionKind::Gaussian,
        0,
        0,
        0.0,
        job.electrons.spread,
        nelec,
        system.com(),
        "valence",
    )
    .context("building the synthetic valence density")?;
    let mut electrons = Electrons::new(grid.clone());
    electrons.update(&valence.density(grid), Some(nelec))?;

    Ok((ions, system, electrons))
}

fn build_boundary(
    job: &JobConfig,
    data: BoundaryData,
    ions: &Ions,
    system: &System,
) -> Result<AnyBoundary> {
    Ok(match job.solvent.mode.as_str() {
        "electronic" => AnyBoundary::Electronic(ElectronicBoundary::new(
            job.solvent.rhomin,
            job.solvent.rhomax,
            ElectronicMode::Electronic,
            data,
        )?),
        "full" => AnyBoundary::Electronic(ElectronicBoundary::new(
            job.solvent.rhomin,
            job.solvent.rhomax,
            ElectronicMode::Full,
            data,
        )?),
        "ionic" => AnyBoundary::Ionic(IonicBoundary::new(
            job.solvent.alpha,
            job.solvent.softness,
            ions,
            data,
        )?),
        "system" => AnyBoundary::System(SystemBoundary::new(
            job.solvent.distance,
            job.solvent.spread,
            system,
            data,
        )?),
        other => bail!("unknown solvent mode '{other}' (expected electronic|full|ionic|system)"),
    })
}

fn boundary_data_mut(boundary: &mut AnyBoundary) -> &mut BoundaryData {
    match boundary {
        AnyBoundary::Electronic(b) => b.data_mut(),
        AnyBoundary::Ionic(b) => b.data_mut(),
        AnyBoundary::System(b) => b.data_mut(),
    }
}

fn build_setup(job: &JobConfig, problem: Problem, cores: &CoreContainer) -> Result<SolverSetup> {
    let direct = DirectSolver::new(cores.clone());
    let settings = IterativeSettings {
        maxiter: job.solver.maxiter,
        tol: job.solver.tolerance,
        auxiliary: parse_auxiliary(&job.solver.auxiliary)?,
    };
    let preconditioner = match job.solver.preconditioner.as_str() {
        "sqrt" => Preconditioner::Sqrt,
        "left" => Preconditioner::Left,
        other => bail!("unknown preconditioner '{other}' (expected sqrt|left)"),
    };

    let solver = match job.solver.kind.as_str() {
        "direct" => ElectrostaticSolver::Direct(direct),
        "gradient" => ElectrostaticSolver::Gradient(GradientSolver::new(
            direct,
            preconditioner,
            job.solver.conjugate,
            settings,
        )),
        "fixedpoint" => ElectrostaticSolver::FixedPoint(FixedPointSolver::new(
            direct,
            settings,
            job.solver.mixing,
        )),
        "newton" => {
            let inner = GradientSolver::new(direct, preconditioner, true, settings);
            ElectrostaticSolver::Newton(NewtonSolver::new(
                inner,
                IterativeSettings {
                    maxiter: job.solver.newton_maxiter,
                    tol: job.solver.newton_tolerance,
                    auxiliary: AuxiliaryScheme::Ioncc,
                },
            ))
        }
        other => bail!("unknown solver '{other}' (expected direct|gradient|fixedpoint|newton)"),
    };

    Ok(SolverSetup::new(problem, solver, None)?)
}

fn parse_problem(s: &str) -> Result<Problem> {
    Ok(match s {
        "poisson" => Problem::Poisson,
        "generalized" => Problem::Generalized,
        "linpb" => Problem::LinPb,
        "linmodpb" => Problem::LinModPb,
        "pb" => Problem::Pb,
        "modpb" => Problem::ModPb,
        other => bail!("unknown problem '{other}'"),
    })
}

fn parse_deriv_method(s: &str) -> Result<DerivMethod> {
    Ok(match s {
        "fft" => DerivMethod::Fft,
        "chain" => DerivMethod::Chain,
        "lowmem" => DerivMethod::Lowmem,
        "highmem" => DerivMethod::Highmem,
        other => bail!("unknown derivative method '{other}'"),
    })
}

fn parse_radius_mode(s: &str) -> Result<RadiusMode> {
    Ok(match s {
        "pauling" => RadiusMode::Pauling,
        "bondi" => RadiusMode::Bondi,
        "uff" => RadiusMode::Uff,
        "muff" => RadiusMode::Muff,
        other => bail!("unknown radius mode '{other}'"),
    })
}

fn parse_auxiliary(s: &str) -> Result<AuxiliaryScheme> {
    Ok(match s {
        "none" => AuxiliaryScheme::None,
        "full" => AuxiliaryScheme::Full,
        "ioncc" => AuxiliaryScheme::Ioncc,
        other => bail!("unknown auxiliary scheme '{other}'"),
    })
}

/// Write the planar average of the potential along z as CSV.
pub fn write_potential_profile(potential: &ScalarField, path: &Path) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let grid = potential.grid();
    let [n0, n1, n2] = grid.nr();
    let dz = grid.length(2) / n2 as f64;

    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# Solvia — planar-averaged embedding potential")?;
    writeln!(file, "z_bohr,potential_hartree")?;

    for k in 0..n2 {
        let mut avg = 0.0;
        for i in 0..n0 {
            for j in 0..n1 {
                avg += potential[[i, j, k]];
            }
        }
        avg /= (n0 * n1) as f64;
        writeln!(file, "{:.4},{:.8e}", k as f64 * dz, avg)?;
    }

    info!(path = %path.display(), "potential profile written");
    Ok(())
}
