//! Relaxation solvers.
//!
//! Both relaxations share one pipeline:
//!
//! 1. Vectorize the QCQP.
//! 2. Build a [`ConicProgram`] from it and add the relaxation's cone(s).
//! 3. Hand it to the [`ConicBackend`]; infeasibility certificates map to
//!    `INFEASIBLE`, backend errors and panics to `FAILED`, and native status
//!    strings through [`SolverStatus::from_backend_status`].
//! 4. On `SOLVED`/`INACCURATE`, recover the primal point and reshape duals.

mod sdr;
mod socr;

pub use sdr::SdrSolver;
pub use socr::SocrSolver;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use relax_core::{verify_hybrid_architecture, Diagnostics, Scenario};
use tracing::{error, info, warn};
use web_time::Instant;

use crate::backend::{BackendError, ClarabelBackend, ConicBackend, ConicProgram, ConicSolution};
use crate::qcqp::{Qcqp, Vectorization};
use crate::recovery::{rank1_approximation, reconstruction_mse, reshape_duals};
use crate::result::{QcqpPoint, QcqpResult, RelaxationKind, SolverStatus};
use crate::settings::SolverSettings;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A convex relaxation of the OPF QCQP.
pub trait RelaxationSolver: Send + Sync {
    fn kind(&self) -> RelaxationKind;

    fn backend(&self) -> &dyn ConicBackend;

    fn settings(&self) -> &SolverSettings;

    /// Add the relaxation-specific constraints on the voltage block.
    fn relax(&self, qcqp: &Qcqp, program: &mut ConicProgram);

    /// Solve the relaxation of `qcqp`. Never fails: problems are reported
    /// through the result status.
    fn solve(&self, qcqp: &Qcqp) -> QcqpResult {
        solve_relaxation(self, qcqp)
    }
}

/// Backend shared by solvers unless one is supplied.
pub(crate) fn default_backend() -> Arc<dyn ConicBackend> {
    Arc::new(ClarabelBackend)
}

/// Solver for a relaxation kind with the default backend.
pub fn solver_for(kind: RelaxationKind, settings: SolverSettings) -> Box<dyn RelaxationSolver> {
    match kind {
        RelaxationKind::Socr => Box::new(SocrSolver::new().with_settings(settings)),
        RelaxationKind::Sdr => Box::new(SdrSolver::new().with_settings(settings)),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}

fn solve_relaxation<S: RelaxationSolver + ?Sized>(solver: &S, qcqp: &Qcqp) -> QcqpResult {
    let kind = solver.kind();
    let start = Instant::now();
    info!(
        relaxation = %kind,
        backend = solver.backend().id(),
        scenario = %qcqp.scenario().name,
        "solving relaxation"
    );

    let vectorization = qcqp.get_vectorization();
    let mut program = ConicProgram::from_vectorization(&vectorization);
    solver.relax(qcqp, &mut program);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        solver.backend().solve(&program, solver.settings())
    }));
    let elapsed = start.elapsed();

    let solution = match outcome {
        Ok(Ok(solution)) => solution,
        Ok(Err(BackendError::Infeasible { status })) => {
            warn!(relaxation = %kind, %status, "relaxation is infeasible");
            return QcqpResult::without_point(kind, SolverStatus::Infeasible, elapsed, status);
        }
        Ok(Err(BackendError::Failure(message))) => {
            error!(relaxation = %kind, %message, "backend failure");
            return QcqpResult::without_point(kind, SolverStatus::Failed, elapsed, message);
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(relaxation = %kind, %message, "backend panicked");
            return QcqpResult::without_point(kind, SolverStatus::Failed, elapsed, message);
        }
    };

    let status = SolverStatus::from_backend_status(&solution.status);
    let result = if status.has_point() {
        recover(kind, status, qcqp, &vectorization, &solution, elapsed)
    } else {
        QcqpResult {
            iterations: solution.iterations,
            ..QcqpResult::without_point(kind, status, elapsed, solution.status.clone())
        }
    };

    info!(
        relaxation = %kind,
        status = %result.status,
        iterations = result.iterations,
        elapsed_ms = elapsed.as_millis() as u64,
        "relaxation finished"
    );
    result
}

/// Recover the primal point and duals; only the original variables and
/// balance rows are kept when the relaxation appended its own.
fn recover(
    kind: RelaxationKind,
    status: SolverStatus,
    qcqp: &Qcqp,
    vectorization: &Vectorization,
    solution: &ConicSolution,
    elapsed: std::time::Duration,
) -> QcqpResult {
    let num_vars = qcqp.num_vars();
    let fail = |message: String| {
        error!(relaxation = %kind, %message, "cannot recover solution");
        QcqpResult::without_point(kind, SolverStatus::Failed, elapsed, message)
    };

    let Some(x) = solution.x.get(..num_vars) else {
        return fail(format!(
            "backend returned {} primal values for {} variables",
            solution.x.len(),
            num_vars
        ));
    };
    let parts = match qcqp.split_vectorization_optimizer(x) {
        Ok(parts) => parts,
        Err(e) => return fail(e.to_string()),
    };
    let duals = match reshape_duals(qcqp, vectorization, solution) {
        Ok(duals) => duals,
        Err(e) => return fail(e.to_string()),
    };

    let phasors = rank1_approximation(&parts.v, qcqp.roots());
    let mse = reconstruction_mse(&parts.v, &phasors);
    let optimal_value = qcqp.objective(vectorization, x);

    if status == SolverStatus::Inaccurate {
        warn!(relaxation = %kind, status = %solution.status, "solution is inaccurate");
    }

    QcqpResult {
        relaxation: kind,
        status,
        solve_time: elapsed,
        iterations: solution.iterations,
        message: Some(solution.status.clone()),
        optimal_value: Some(optimal_value),
        optimizer: Some(QcqpPoint {
            v: phasors,
            f: parts.f,
            s: parts.s,
            z: parts.z,
        }),
        relaxed: Some(parts.v),
        reconstruction_mse: Some(mse),
        duals: Some(duals),
    }
}

/// Pick a relaxation for a scenario.
///
/// SOCR is exact for hybrid architectures. Otherwise SDR is preferred when
/// semidefinite cones are compiled in; without them SOCR is used anyway.
pub fn select_relaxation(scenario: &Scenario, log: &mut Diagnostics) -> RelaxationKind {
    if verify_hybrid_architecture(scenario, log) {
        return RelaxationKind::Socr;
    }
    if cfg!(feature = "sdp") {
        info!(scenario = %scenario.name, "not a hybrid architecture, using SDR");
        RelaxationKind::Sdr
    } else {
        log.add_warning(
            "relaxation",
            "not a hybrid architecture and SDR is not compiled in; SOCR may be inexact",
        );
        RelaxationKind::Socr
    }
}

/// Solve independent QCQPs, in parallel with the `parallel` feature.
pub fn solve_many(solver: &dyn RelaxationSolver, qcqps: &[Qcqp]) -> Vec<QcqpResult> {
    #[cfg(feature = "parallel")]
    {
        qcqps.par_iter().map(|qcqp| solver.solve(qcqp)).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        qcqps.iter().map(|qcqp| solver.solve(qcqp)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_core::test_utils;

    /// Backend returning a fixed outcome.
    struct MockBackend {
        outcome: fn(&ConicProgram) -> Result<ConicSolution, BackendError>,
    }

    impl ConicBackend for MockBackend {
        fn id(&self) -> &str {
            "mock"
        }

        fn supports_semidefinite(&self) -> bool {
            true
        }

        fn solve(
            &self,
            program: &ConicProgram,
            _settings: &SolverSettings,
        ) -> Result<ConicSolution, BackendError> {
            (self.outcome)(program)
        }
    }

    fn socr_with(outcome: fn(&ConicProgram) -> Result<ConicSolution, BackendError>) -> SocrSolver {
        SocrSolver::new().with_backend(Arc::new(MockBackend { outcome }))
    }

    fn two_bus() -> Qcqp {
        Qcqp::from_scenario(&test_utils::two_bus_scenario()).unwrap()
    }

    fn flat_solution(program: &ConicProgram, status: &str) -> ConicSolution {
        let n = program.num_vars();
        let mut x = vec![0.0; n];
        // V_00 = V_11 = Re V_10 = 1
        x[0] = 1.0;
        x[1] = 1.0;
        x[2] = 1.0;
        ConicSolution {
            status: status.to_string(),
            x,
            iterations: 7,
            dual_eq: vec![0.0; program.eq_rows.len()],
            dual_ineq: vec![0.0; program.ineq_rows.len()],
            dual_lower: vec![0.0; n],
            dual_upper: vec![0.0; n],
        }
    }

    #[test]
    fn test_backend_panic_is_failed() {
        let solver = socr_with(|_| panic!("factorization exploded"));
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Failed);
        assert_eq!(result.message.as_deref(), Some("factorization exploded"));
        assert!(result.optimizer.is_none());
    }

    #[test]
    fn test_backend_failure_is_failed() {
        let solver = socr_with(|_| Err(BackendError::Failure("license expired".into())));
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Failed);
        assert_eq!(result.message.as_deref(), Some("license expired"));
    }

    #[test]
    fn test_infeasibility_certificate_is_infeasible() {
        let solver = socr_with(|_| {
            Err(BackendError::Infeasible {
                status: "PrimalInfeasible".into(),
            })
        });
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Infeasible);
        assert!(result.duals.is_none());
    }

    #[test]
    fn test_unrecognized_status_carries_no_point() {
        let solver = socr_with(|p| Ok(flat_solution(p, "NumericalError")));
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Failed);
        assert_eq!(result.iterations, 7);
        assert!(result.optimizer.is_none());
    }

    #[test]
    fn test_inaccurate_status_recovers_point() {
        let solver = socr_with(|p| Ok(flat_solution(p, "MaxIterations")));
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Inaccurate);
        let point = result.optimizer.as_ref().unwrap();
        assert_eq!(point.v.len(), 2);
        assert!((point.v[1] - num_complex::Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!(result.reconstruction_mse.unwrap() < 1e-24);
        assert_eq!(result.duals.as_ref().unwrap().balance_p.len(), 2);
    }

    #[test]
    fn test_short_primal_vector_is_failed() {
        let solver = socr_with(|p| {
            let mut solution = flat_solution(p, "Solved");
            solution.x.truncate(2);
            Ok(solution)
        });
        let result = solver.solve(&two_bus());
        assert_eq!(result.status, SolverStatus::Failed);
    }

    #[test]
    fn test_select_relaxation() {
        let mut log = Diagnostics::new();
        let kind = select_relaxation(&test_utils::hybrid_scenario(), &mut log);
        assert_eq!(kind, RelaxationKind::Socr);

        let mut log = Diagnostics::new();
        let kind = select_relaxation(&test_utils::three_bus_meshed(), &mut log);
        if cfg!(feature = "sdp") {
            assert_eq!(kind, RelaxationKind::Sdr);
        } else {
            assert_eq!(kind, RelaxationKind::Socr);
            assert!(log.issues_by_category("relaxation").next().is_some());
        }
    }

    #[test]
    fn test_solve_many_keeps_order() {
        let solver = socr_with(|p| Ok(flat_solution(p, "Solved")));
        let qcqps = vec![
            two_bus(),
            Qcqp::from_scenario(&test_utils::three_bus_meshed()).unwrap(),
        ];
        let results = solve_many(&solver, &qcqps);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].optimizer.as_ref().unwrap().v.len(), 2);
        assert_eq!(results[1].optimizer.as_ref().unwrap().v.len(), 3);
    }
}
