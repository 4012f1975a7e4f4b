//! SDR solver tests (need the `sdp` feature)
#![cfg(feature = "sdp")]

use relax_core::test_utils;
use relax_opf::{Qcqp, RelaxationKind, RelaxationSolver, SdrSolver, SocrSolver, SolverStatus};

#[test]
fn sdr_matches_socr_on_a_tree() {
    // on a single edge the PSD and SOC conditions coincide
    let qcqp = Qcqp::from_scenario(&test_utils::two_bus_scenario()).unwrap();
    let sdr = SdrSolver::new().solve(&qcqp);
    let socr = SocrSolver::new().solve(&qcqp);

    assert_eq!(sdr.relaxation, RelaxationKind::Sdr);
    assert_eq!(sdr.status, SolverStatus::Solved, "{sdr}");
    let (a, b) = (sdr.optimal_value.unwrap(), socr.optimal_value.unwrap());
    assert!((a - b).abs() < 1e-4, "SDR {a} vs SOCR {b}");
}

#[test]
fn sdr_bounds_socr_from_above_on_a_mesh() {
    let qcqp = Qcqp::from_scenario(&test_utils::three_bus_meshed()).unwrap();
    let sdr = SdrSolver::new().solve(&qcqp);
    let socr = SocrSolver::new().solve(&qcqp);

    assert_eq!(sdr.status, SolverStatus::Solved, "{sdr}");
    let (a, b) = (sdr.optimal_value.unwrap(), socr.optimal_value.unwrap());
    // SDR is the tighter relaxation
    assert!(a >= b - 1e-4, "SDR {a} below SOCR {b}");
    assert_eq!(sdr.optimizer.as_ref().unwrap().v.len(), 3);
}
