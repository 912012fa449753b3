//! Cross-strategy consistency of the electrostatic solver engine.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Zip;

use solvia_core::boundary::{
    Boundary, BoundaryData, DerivLevel, DerivMethod, SystemBoundary,
};
use solvia_core::core::{CoreContainer, FftCore};
use solvia_core::physical::{
    Dielectric, Electrolyte, ElectrolyteSpec, Ions, IonsSpec, PermittivityForm, RadiusMode, System,
};
use solvia_core::solver::{
    DirectSolver, FixedPointSolver, GradientSolver, IterativeSettings, Preconditioner, SolverError,
};
use solvia_grid::{Grid, ScalarField};

const TPI: f64 = 2.0 * std::f64::consts::PI;

fn environment(side: f64, points: usize) -> (Arc<Grid>, CoreContainer) {
    let grid = Grid::cubic(side, points, "test").unwrap();
    let core = Arc::new(FftCore::new(grid.clone()));
    let cores = CoreContainer::new("test", core.clone(), core);
    (grid, cores)
}

/// A neutral pair of Gaussian charges.
fn neutral_density(grid: &Arc<Grid>) -> ScalarField {
    let spread: f64 = 1.0;
    let norm = (std::f64::consts::PI.sqrt() * spread).powi(3);
    let half = grid.length(0) / 2.0;

    let (_, r2_a) = grid.min_distance([half - 1.5, half, half], 0, 0).unwrap();
    let (_, r2_b) = grid.min_distance([half + 1.5, half, half], 0, 0).unwrap();
    let mut data = r2_a.data().mapv(|d2| (-d2 / (spread * spread)).exp() / norm);
    data -= &r2_b.data().mapv(|d2| (-d2 / (spread * spread)).exp() / norm);
    ScalarField::from_data(grid.clone(), data, "neutral_pair")
}

/// A smooth spherical cavity boundary centred in the cell.
fn cavity_boundary(
    grid: &Arc<Grid>,
    cores: &CoreContainer,
    level: DerivLevel,
) -> SystemBoundary {
    let mut ions = Ions::new(
        IonsSpec {
            labels: vec!["C".into()],
            itypes: vec![0],
            zv: vec![4.0],
            atomicspread: vec![0.5],
            corespread: vec![0.5],
            solvationrad: vec![0.0],
            radius_mode: RadiusMode::Uff,
            soft_cavity: true,
            smear: false,
            fill_cores: false,
        },
        1,
        grid.clone(),
    )
    .unwrap();
    let half = grid.length(0) / 2.0;
    ions.update(&[[half, half, half]], None).unwrap();

    let mut system = System::new(0, 0, 0);
    system.update(&ions, None).unwrap();
    system.updating = true;

    let data = BoundaryData::new(grid.clone(), cores.clone(), level, DerivMethod::Fft, "cavity");
    let mut boundary = SystemBoundary::new(4.0, 1.0, &system, data).unwrap();
    boundary.update(&system).unwrap();
    boundary
}

fn dielectric_for(
    grid: &Arc<Grid>,
    boundary: &SystemBoundary,
    constant: f64,
    need_factsqrt: bool,
) -> Dielectric {
    let mut dielectric = Dielectric::new(
        grid.clone(),
        constant,
        PermittivityForm::Exponential,
        true,
        need_factsqrt,
        false,
    );
    dielectric.of_boundary(boundary).unwrap();
    dielectric
}

/// With ε forced to 1 everywhere, the gradient and fixed-point solvers must
/// reproduce the direct solver's potential exactly.
#[test]
fn generalized_solvers_reduce_to_direct_at_unit_permittivity() {
    let (grid, cores) = environment(12.0, 24);
    let rho = neutral_density(&grid);
    let boundary = cavity_boundary(&grid, &cores, DerivLevel::Laplacian);

    let direct = DirectSolver::new(cores.clone());
    let phi_direct = direct.poisson(&rho);

    let dielectric = dielectric_for(&grid, &boundary, 1.0, true);
    let gradient = GradientSolver::new(
        direct.clone(),
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 100,
            tol: 1e-12,
            ..Default::default()
        },
    );
    let phi_gradient = gradient.generalized(&rho, &dielectric).unwrap();

    let mut dielectric_fp = dielectric_for(&grid, &boundary, 1.0, false);
    let fixedpoint = FixedPointSolver::new(
        direct,
        IterativeSettings {
            maxiter: 100,
            tol: 1e-12,
            ..Default::default()
        },
        0.6,
    );
    let phi_fixed = fixedpoint.generalized(&rho, &mut dielectric_fp).unwrap();

    let scale = phi_direct.quadratic_mean();
    Zip::from(phi_direct.data())
        .and(phi_gradient.data())
        .and(phi_fixed.data())
        .for_each(|&d, &g, &f| {
            assert_abs_diff_eq!(g, d, epsilon = 1e-8 * scale.max(1.0));
            assert_abs_diff_eq!(f, d, epsilon = 1e-8 * scale.max(1.0));
        });
}

/// The conjugate-gradient and fixed-point strategies solve the same
/// generalized problem; their potentials agree to discretisation accuracy.
#[test]
fn gradient_and_fixed_point_agree_on_a_real_dielectric() {
    let (grid, cores) = environment(12.0, 24);
    let rho = neutral_density(&grid);
    let boundary = cavity_boundary(&grid, &cores, DerivLevel::Laplacian);

    let direct = DirectSolver::new(cores);

    let dielectric = dielectric_for(&grid, &boundary, 4.0, true);
    let gradient = GradientSolver::new(
        direct.clone(),
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 500,
            tol: 1e-14,
            ..Default::default()
        },
    );
    let phi_cg = gradient.generalized(&rho, &dielectric).unwrap();

    let mut dielectric_fp = dielectric_for(&grid, &boundary, 4.0, false);
    let fixedpoint = FixedPointSolver::new(
        direct,
        IterativeSettings {
            maxiter: 500,
            tol: 1e-16,
            ..Default::default()
        },
        0.6,
    );
    let phi_fp = fixedpoint.generalized(&rho, &mut dielectric_fp).unwrap();

    // quadratic-mean agreement at the few-percent level: the two paths
    // discretise the operator through different derivative fields
    let mut diff2 = 0.0;
    Zip::from(phi_cg.data()).and(phi_fp.data()).for_each(|&a, &b| {
        diff2 += (a - b) * (a - b);
    });
    let diff = (diff2 / grid.nnr() as f64).sqrt();
    assert!(
        diff < 5e-2 * phi_cg.quadratic_mean(),
        "solvers disagree: rms diff {diff:.3e} vs rms potential {:.3e}",
        phi_cg.quadratic_mean()
    );
}

/// Plain conjugate gradient with the left preconditioner in vacuum matches
/// the spectral Poisson solution.
#[test]
fn left_preconditioner_matches_direct_in_vacuum() {
    let (grid, cores) = environment(8.0, 8);
    let rho = neutral_density(&grid);

    let direct = DirectSolver::new(cores);
    let phi_direct = direct.poisson(&rho);

    let gradient = GradientSolver::new(
        direct,
        Preconditioner::Left,
        true,
        IterativeSettings {
            maxiter: 200,
            tol: 1e-18,
            ..Default::default()
        },
    );
    // vacuum solve through the screened-path entry: no dielectric, zero
    // screening
    let zero_screening = ScalarField::new(grid.clone(), "no_screening");
    let electrolyte = Electrolyte::new(
        ElectrolyteSpec {
            temperature: 300.0,
            permittivity: 1.0,
            cbulk: 1e-6,
            formula: vec![(1, 1), (1, -1)],
            linearized: true,
            cionmax: 0.0,
            rion: 0.0,
        },
        grid.clone(),
    )
    .unwrap();
    let phi_cg = gradient
        .linearized_pb(&rho, &electrolyte, None, Some(&zero_screening))
        .unwrap();

    let scale = phi_direct.quadratic_mean();
    Zip::from(phi_direct.data())
        .and(phi_cg.data())
        .for_each(|&d, &g| {
            assert_abs_diff_eq!(g, d, epsilon = 1e-6 * scale.max(1.0));
        });
}

/// Uniformly screened Poisson: for a single harmonic source the linearized
/// PB solution is ρ_G · 4π/(G² + k²).
#[test]
fn linearized_pb_screens_a_harmonic_source() {
    let (grid, cores) = environment(10.0, 16);

    // single plane-wave density along x
    let g1 = TPI / 10.0;
    let [n0, n1, n2] = grid.nr();
    let mut rho = ScalarField::new(grid.clone(), "harmonic");
    for i in 0..n0 {
        let x = i as f64 * 10.0 / n0 as f64;
        for j in 0..n1 {
            for k in 0..n2 {
                rho[[i, j, k]] = (g1 * x).sin();
            }
        }
    }

    let k2 = 0.8;
    let mut screening = ScalarField::new(grid.clone(), "uniform_screening");
    screening.fill(k2 / (2.0 * TPI));

    let electrolyte = Electrolyte::new(
        ElectrolyteSpec {
            temperature: 300.0,
            permittivity: 1.0,
            cbulk: 1e-6,
            formula: vec![(1, 1), (1, -1)],
            linearized: true,
            cionmax: 0.0,
            rion: 0.0,
        },
        grid.clone(),
    )
    .unwrap();

    let direct = DirectSolver::new(cores);
    let gradient = GradientSolver::new(
        direct,
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 100,
            tol: 1e-16,
            ..Default::default()
        },
    );
    let phi = gradient
        .linearized_pb(&rho, &electrolyte, None, Some(&screening))
        .unwrap();

    let expected = 2.0 * TPI / (g1 * g1 + k2);
    for i in 0..n0 {
        assert_abs_diff_eq!(
            phi[[i, 3, 5]],
            expected * rho[[i, 3, 5]],
            epsilon = 1e-6
        );
    }
}

/// Exceeding the iteration bound is a terminal failure, not a partial
/// result.
#[test]
fn iterative_solvers_raise_on_exhausted_iterations() {
    let (grid, cores) = environment(12.0, 24);
    let rho = neutral_density(&grid);
    let boundary = cavity_boundary(&grid, &cores, DerivLevel::Laplacian);

    let direct = DirectSolver::new(cores);
    let dielectric = dielectric_for(&grid, &boundary, 78.3, true);

    let gradient = GradientSolver::new(
        direct.clone(),
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 1,
            tol: 1e-30,
            ..Default::default()
        },
    );
    assert!(matches!(
        gradient.generalized(&rho, &dielectric),
        Err(SolverError::ConvergenceFailure { .. })
    ));

    let mut dielectric_fp = dielectric_for(&grid, &boundary, 78.3, false);
    let fixedpoint = FixedPointSolver::new(
        direct,
        IterativeSettings {
            maxiter: 1,
            tol: 1e-30,
            ..Default::default()
        },
        0.6,
    );
    assert!(matches!(
        fixedpoint.generalized(&rho, &mut dielectric_fp),
        Err(SolverError::ConvergenceFailure { .. })
    ));
}

/// For a weak source the nonlinear PB solution approaches the linearized
/// one: the Newton solver must agree with the gradient solver there.
#[test]
fn newton_matches_linearized_pb_for_weak_sources() {
    let (grid, cores) = environment(12.0, 24);
    let boundary = cavity_boundary(&grid, &cores, DerivLevel::Laplacian);
    let dielectric = dielectric_for(&grid, &boundary, 4.0, true);

    // weak source: z φ / k_B T stays well below one
    let mut rho = neutral_density(&grid);
    rho.data_mut().mapv_inplace(|x| x * 1e-3);

    let spec = ElectrolyteSpec {
        temperature: 300.0,
        permittivity: 4.0,
        cbulk: 1e-4,
        formula: vec![(1, 1), (1, -1)],
        linearized: false,
        cionmax: 0.0,
        rion: 0.0,
    };
    let mut nonlinear = Electrolyte::new(spec.clone(), grid.clone()).unwrap();
    let mut linear = Electrolyte::new(
        ElectrolyteSpec {
            linearized: true,
            ..spec
        },
        grid.clone(),
    )
    .unwrap();
    nonlinear.of_boundary(&boundary);
    linear.of_boundary(&boundary);

    let direct = DirectSolver::new(cores);
    let inner = GradientSolver::new(
        direct,
        Preconditioner::Sqrt,
        true,
        IterativeSettings {
            maxiter: 300,
            tol: 1e-14,
            ..Default::default()
        },
    );

    let phi_lin = inner
        .linearized_pb(&rho, &linear, Some(&dielectric), None)
        .unwrap();

    let newton = solvia_core::solver::NewtonSolver::new(
        inner,
        IterativeSettings {
            maxiter: 30,
            tol: 1e-16,
            ..Default::default()
        },
    );
    let phi_newton = newton.pb_nested(&rho, &dielectric, &mut nonlinear).unwrap();

    let mut diff2 = 0.0;
    Zip::from(phi_newton.data())
        .and(phi_lin.data())
        .for_each(|&a, &b| {
            diff2 += (a - b) * (a - b);
        });
    let diff = (diff2 / grid.nnr() as f64).sqrt();
    assert!(
        diff < 5e-2 * phi_lin.quadratic_mean(),
        "newton and linearized PB disagree for a weak source: {diff:.3e}"
    );
}

/// The boundary consumed by these tests keeps its advertised invariants.
#[test]
fn cavity_boundary_switch_stays_in_bounds() {
    let (grid, cores) = environment(12.0, 24);
    let boundary = cavity_boundary(&grid, &cores, DerivLevel::Gradient);
    let switch = boundary.data().switch();
    assert!(switch.iter().all(|&s| (-1e-10..=1.0 + 1e-10).contains(&s)));
}
