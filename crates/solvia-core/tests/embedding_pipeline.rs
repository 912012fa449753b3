//! End-to-end embedding pipeline: update ordering, dielectric gating, and
//! charge conservation.

use std::sync::Arc;

use approx::assert_relative_eq;

use solvia_core::boundary::{
    Boundary, BoundaryData, DerivLevel, DerivMethod, ElectronicBoundary, ElectronicMode,
    SolventAwareParams, SystemBoundary,
};
use solvia_core::core::{CoreContainer, FftCore};
use solvia_core::physical::{
    Charges, Dielectric, Electrons, Ions, IonsSpec, PermittivityForm, RadiusMode, System,
};
use solvia_core::solver::{
    DirectSolver, FixedPointSolver, GradientSolver, IterativeSettings, Preconditioner,
};
use solvia_grid::functions::{FunctionKind, SmoothFunction};
use solvia_grid::Grid;

fn environment(side: f64, points: usize) -> (Arc<Grid>, CoreContainer) {
    let grid = Grid::cubic(side, points, "pipeline").unwrap();
    let core = Arc::new(FftCore::new(grid.clone()));
    let cores = CoreContainer::new("pipeline", core.clone(), core);
    (grid, cores)
}

fn water_like(grid: &Arc<Grid>) -> (Ions, System, Electrons) {
    let half = grid.length(0) / 2.0;
    let mut ions = Ions::new(
        IonsSpec {
            labels: vec!["O".into(), "H".into()],
            itypes: vec![0, 1, 1],
            zv: vec![6.0, 1.0],
            atomicspread: vec![1.0, 1.0],
            corespread: vec![1.0, 1.0],
            solvationrad: vec![0.0, 0.0],
            radius_mode: RadiusMode::Uff,
            soft_cavity: true,
            smear: true,
            fill_cores: true,
        },
        3,
        grid.clone(),
    )
    .unwrap();
    ions.update(
        &[
            [half, half, half],
            [half + 1.8, half, half],
            [half - 0.5, half + 1.7, half],
        ],
        None,
    )
    .unwrap();

    let mut system = System::new(0, 0, 0);
    system.update(&ions, None).unwrap();

    // neutralising Gaussian valence density at the centre of mass
    let nelec = -ions.charge();
    let valence = SmoothFunction::new(
        FunctionKind::Gaussian,
        0,
        0,
        0.0,
        1.5,
        nelec,
        system.com(),
        "valence",
    )
    .unwrap();
    let mut electrons = Electrons::new(grid.clone());
    electrons.update(&valence.density(grid), Some(nelec)).unwrap();

    (ions, system, electrons)
}

/// Electrons + ions + polarization integrate to zero for a neutral system,
/// within the solver's charge-conservation tolerance.
#[test]
fn neutral_system_conserves_total_charge() {
    let (grid, cores) = environment(16.0, 32);
    let (ions, mut system, electrons) = water_like(&grid);

    // smooth fixed cavity, spectral derivatives: the permittivity gradient
    // fields are then exact spectral derivatives of the switch
    let data = BoundaryData::new(
        grid.clone(),
        cores.clone(),
        DerivLevel::Gradient,
        DerivMethod::Fft,
        "cavity",
    );
    system.updating = true;
    let mut boundary = SystemBoundary::new(4.5, 1.0, &system, data).unwrap();
    boundary.update(&system).unwrap();
    system.updating = false;

    let mut dielectric = Dielectric::new(
        grid.clone(),
        4.0,
        PermittivityForm::Exponential,
        true,
        false,
        true,
    );
    dielectric.update(&boundary).unwrap();

    let mut charges = Charges::new(grid.clone());
    charges.update(&[electrons.density(), ions.density()]);
    assert!(charges.charge().abs() < 1e-8, "source should be neutral");

    let direct = DirectSolver::new(cores);
    let fixedpoint = FixedPointSolver::new(
        direct,
        IterativeSettings {
            maxiter: 1000,
            tol: 1e-16,
            ..Default::default()
        },
        0.6,
    );
    let _potential = fixedpoint
        .generalized(charges.density(), &mut dielectric)
        .unwrap();

    // the fixed-point solver folds the converged polarization back into
    // the dielectric density
    let total = charges.charge() + dielectric.charge();
    assert!(
        total.abs() < 1e-5,
        "total charge not conserved: {total:.3e}"
    );
}

/// Full-mode electronic boundary through a complete SCF-step cycle, with
/// the dielectric gated by the boundary status machine.
#[test]
fn full_cycle_with_electronic_boundary_and_gradient_solver() {
    let (grid, cores) = environment(16.0, 32);
    let (mut ions, _system, mut electrons) = water_like(&grid);

    let data = BoundaryData::new(
        grid.clone(),
        cores.clone(),
        DerivLevel::Laplacian,
        DerivMethod::Chain,
        "solvent",
    );
    let mut boundary =
        ElectronicBoundary::new(5e-4, 1e-2, ElectronicMode::Full, data).unwrap();

    let mut dielectric = Dielectric::new(
        grid.clone(),
        78.3,
        PermittivityForm::Exponential,
        true,
        true,
        false,
    );

    // ionic step: boundary becomes partial, dielectric marks itself stale
    ions.updating = true;
    electrons.updating = false;
    boundary.update(&electrons, Some(&mut ions)).unwrap();
    dielectric.update(&boundary).unwrap();
    assert!(dielectric.updating);
    ions.updating = false;

    // electronic step: boundary completes, dielectric rebuilds
    electrons.updating = true;
    boundary.update(&electrons, Some(&mut ions)).unwrap();
    dielectric.update(&boundary).unwrap();
    assert!(!dielectric.updating);
    electrons.updating = false;

    // permittivity spans vacuum to bulk
    let eps = dielectric.epsilon();
    let eps_min = eps.iter().cloned().fold(f64::INFINITY, f64::min);
    let eps_max = eps.iter().cloned().fold(0.0, f64::max);
    assert_relative_eq!(eps_min, 1.0, max_relative = 1e-6);
    assert_relative_eq!(eps_max, 78.3, max_relative = 1e-6);

    // and the embedding solve runs to convergence
    let mut charges = Charges::new(grid.clone());
    charges.update(&[electrons.density(), ions.density()]);

    let direct = DirectSolver::new(cores);
    let gradient = GradientSolver::new(
        direct,
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 1000,
            tol: 1e-12,
            ..Default::default()
        },
    );
    let potential = gradient
        .generalized(charges.density(), &dielectric)
        .unwrap();

    let energy = 0.5 * charges.density().scalar_product(&potential);
    assert!(energy.is_finite());
    assert!(potential.quadratic_mean() > 0.0);
}

/// Solvent awareness fills pockets: the corrected cavity is never smaller
/// than the bare one and the switch stays within bounds.
#[test]
fn solvent_aware_filling_grows_the_cavity() {
    let (grid, cores) = environment(16.0, 32);
    let (_ions, mut system, _electrons) = water_like(&grid);

    let bare_data = BoundaryData::new(
        grid.clone(),
        cores.clone(),
        DerivLevel::Gradient,
        DerivMethod::Fft,
        "bare",
    );
    system.updating = true;
    let mut bare = SystemBoundary::new(4.0, 0.8, &system, bare_data).unwrap();
    bare.update(&system).unwrap();

    let mut aware_data = BoundaryData::new(
        grid.clone(),
        cores,
        DerivLevel::Gradient,
        DerivMethod::Fft,
        "aware",
    );
    aware_data
        .activate_solvent_awareness(SolventAwareParams {
            solvent_radius: 2.6,
            radial_scale: 2.0,
            radial_spread: 0.5,
            filling_threshold: 0.6,
            filling_spread: 0.05,
        })
        .unwrap();
    let mut aware = SystemBoundary::new(4.0, 0.8, &system, aware_data).unwrap();
    aware.update(&system).unwrap();

    let s = aware.data().switch();
    assert!(s.iter().all(|&x| (-1e-8..=1.0 + 1e-8).contains(&x)));
    assert!(aware.data().volume() >= bare.data().volume() - 1e-8);
}
