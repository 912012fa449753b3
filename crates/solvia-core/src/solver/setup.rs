//! The solver-setup dispatcher and the embedding energy.
//!
//! A setup is an immutable (problem, strategy, optional inner setup)
//! triple, selected once from configuration and reused for every SCF step.
//! Dispatch validates that the response objects a problem needs are present
//! before any numerics run; unsupported (problem, strategy) pairs are
//! rejected at construction.

use solvia_grid::ScalarField;

use crate::constants::TPI;
use crate::core::CoreContainer;
use crate::physical::{Charges, Dielectric, Electrolyte, Ions, SolveRequest};
use crate::solver::{
    DirectSolver, FixedPointSolver, GradientSolver, NewtonSolver, Problem, SolverError,
};

/// The closed set of solution strategies.
#[derive(Debug, Clone)]
pub enum ElectrostaticSolver {
    Direct(DirectSolver),
    Gradient(GradientSolver),
    FixedPoint(FixedPointSolver),
    Newton(NewtonSolver),
}

impl ElectrostaticSolver {
    fn name(&self) -> &'static str {
        match self {
            ElectrostaticSolver::Direct(_) => "direct",
            ElectrostaticSolver::Gradient(_) => "gradient",
            ElectrostaticSolver::FixedPoint(_) => "fixed-point",
            ElectrostaticSolver::Newton(_) => "newton",
        }
    }

    fn cores(&self) -> &CoreContainer {
        match self {
            ElectrostaticSolver::Direct(s) => s.cores(),
            ElectrostaticSolver::Gradient(s) => s.direct().cores(),
            ElectrostaticSolver::FixedPoint(s) => s.direct().cores(),
            ElectrostaticSolver::Newton(s) => s.inner().direct().cores(),
        }
    }
}

/// An immutable (problem, strategy, optional inner setup) triple.
#[derive(Debug)]
pub struct SolverSetup {
    problem: Problem,
    solver: ElectrostaticSolver,
    #[allow(dead_code)]
    inner: Option<Box<SolverSetup>>,
}

impl SolverSetup {
    pub fn new(
        problem: Problem,
        solver: ElectrostaticSolver,
        inner: Option<Box<SolverSetup>>,
    ) -> Result<Self, SolverError> {
        let compatible = matches!(
            (problem, &solver),
            (Problem::Poisson, ElectrostaticSolver::Direct(_))
                | (Problem::Generalized, ElectrostaticSolver::Gradient(_))
                | (Problem::Generalized, ElectrostaticSolver::FixedPoint(_))
                | (Problem::LinPb, ElectrostaticSolver::Gradient(_))
                | (Problem::LinModPb, ElectrostaticSolver::Gradient(_))
                | (Problem::Pb, ElectrostaticSolver::Newton(_))
                | (Problem::ModPb, ElectrostaticSolver::Newton(_))
        );
        if !compatible {
            return Err(SolverError::UnsupportedCombination(problem, solver.name()));
        }

        Ok(Self {
            problem,
            solver,
            inner,
        })
    }

    pub fn problem(&self) -> Problem {
        self.problem
    }

    pub fn solver(&self) -> &ElectrostaticSolver {
        &self.solver
    }

    /// Solve the configured problem for the given request, returning the
    /// potential field.
    pub fn solve(&self, request: &mut SolveRequest<'_>) -> Result<ScalarField, SolverError> {
        match self.problem {
            Problem::Poisson => {
                let ElectrostaticSolver::Direct(direct) = &self.solver else {
                    unreachable!("validated at construction");
                };
                Ok(direct.poisson(request.density))
            }

            Problem::Generalized => {
                let density = request.density;
                let dielectric = request
                    .dielectric
                    .as_deref_mut()
                    .ok_or(SolverError::MissingDielectric(self.problem))?;
                match &self.solver {
                    ElectrostaticSolver::Gradient(solver) => {
                        solver.generalized(density, dielectric)
                    }
                    ElectrostaticSolver::FixedPoint(solver) => {
                        solver.generalized(density, dielectric)
                    }
                    _ => unreachable!("validated at construction"),
                }
            }

            Problem::LinPb | Problem::LinModPb => {
                let density = request.density;
                let electrolyte = request
                    .electrolyte
                    .as_deref()
                    .ok_or(SolverError::MissingElectrolyte(self.problem))?;
                let ElectrostaticSolver::Gradient(solver) = &self.solver else {
                    unreachable!("validated at construction");
                };
                solver.linearized_pb(density, electrolyte, request.dielectric.as_deref(), None)
            }

            Problem::Pb | Problem::ModPb => {
                let density = request.density;
                let SolveRequest {
                    dielectric,
                    electrolyte,
                    ..
                } = request;
                let dielectric = dielectric
                    .as_deref()
                    .ok_or(SolverError::MissingDielectric(self.problem))?;
                let electrolyte = electrolyte
                    .as_deref_mut()
                    .ok_or(SolverError::MissingElectrolyte(self.problem))?;
                let ElectrostaticSolver::Newton(solver) = &self.solver else {
                    unreachable!("validated at construction");
                };
                solver.pb_nested(density, dielectric, electrolyte)
            }
        }
    }

    /// Electrostatic embedding energy: ½∫ρφ, the electrolyte interaction
    /// (negative by convention), the smeared-ion self-energy, and — unless
    /// a periodic correction handles open boundaries — the Gaussian-spread
    /// quadrupole shift of charged cells.
    pub fn energy(
        &self,
        charges: &Charges,
        ions: &Ions,
        dielectric: Option<&Dielectric>,
        electrolyte: Option<&Electrolyte>,
        potential: &ScalarField,
        reference: bool,
    ) -> f64 {
        let mut energy = 0.5 * charges.density().scalar_product(potential);
        let mut degauss = charges.charge();

        if !reference {
            if let Some(dielectric) = dielectric {
                degauss += dielectric.charge() * 0.5;
            }

            if let Some(electrolyte) = electrolyte {
                energy -= 0.5 * electrolyte.density().scalar_product(potential);
                degauss += electrolyte.charge();
            }
        }

        let eself = ions.selfenergy_correction();

        let cores = self.solver.cores();
        let degauss = if cores.has_internal_correction() || cores.has_corrections() {
            0.0
        } else {
            -degauss * ions.quadrupole_correction() * TPI
                / charges.density().grid().volume()
        };

        energy + eself + degauss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FftCore;
    use crate::solver::{IterativeSettings, Preconditioner};
    use solvia_grid::Grid;
    use std::sync::Arc;

    fn cores() -> CoreContainer {
        let grid = Grid::cubic(8.0, 8, "setup").unwrap();
        let core = Arc::new(FftCore::new(grid));
        CoreContainer::new("env", core.clone(), core)
    }

    #[test]
    fn incompatible_pairs_are_rejected() {
        let direct = DirectSolver::new(cores());
        assert!(matches!(
            SolverSetup::new(
                Problem::Generalized,
                ElectrostaticSolver::Direct(direct.clone()),
                None
            ),
            Err(SolverError::UnsupportedCombination(..))
        ));

        let gradient = GradientSolver::new(
            direct.clone(),
            Preconditioner::Sqrt,
            true,
            IterativeSettings::default(),
        );
        assert!(matches!(
            SolverSetup::new(Problem::Pb, ElectrostaticSolver::Gradient(gradient), None),
            Err(SolverError::UnsupportedCombination(..))
        ));

        assert!(SolverSetup::new(
            Problem::Poisson,
            ElectrostaticSolver::Direct(direct),
            None
        )
        .is_ok());
    }

    #[test]
    fn missing_auxiliaries_are_detected_at_dispatch() {
        let grid = Grid::cubic(8.0, 8, "setup").unwrap();
        let core = Arc::new(FftCore::new(grid.clone()));
        let container = CoreContainer::new("env", core.clone(), core);
        let direct = DirectSolver::new(container);
        let gradient = GradientSolver::new(
            direct,
            Preconditioner::Sqrt,
            true,
            IterativeSettings::default(),
        );
        let setup = SolverSetup::new(
            Problem::Generalized,
            ElectrostaticSolver::Gradient(gradient),
            None,
        )
        .unwrap();

        let density = ScalarField::new(grid, "rho");
        let mut request = SolveRequest::bare(&density);
        assert!(matches!(
            setup.solve(&mut request),
            Err(SolverError::MissingDielectric(Problem::Generalized))
        ));
    }
}
