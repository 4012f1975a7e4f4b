//! Binding network and capability limits under SOCR
//!
//! Tests cover:
//! - Thermal limit binding
//! - Voltage-drop limit binding
//! - Injector capability facets splitting dispatch
//! - Converter capability facets capping imports
//! - Phase-shifting transformers

use num_complex::Complex64;
use relax_core::{test_utils, CapRegion, HalfPlane, Injector, MegavoltAmperes, PwlFunction};
use relax_opf::{ConstraintTag, Qcqp, RelaxationSolver, SocrSolver, SolverStatus};

#[test]
fn thermal_limit_caps_branch_current() {
    let mut scenario = test_utils::three_bus_meshed();
    scenario.branches[0].rating = Some(MegavoltAmperes(20.0));
    let qcqp = Qcqp::from_scenario(&scenario).unwrap();
    let result = SocrSolver::new().solve(&qcqp);

    assert_eq!(result.status, SolverStatus::Solved, "{result}");
    let v = &result.optimizer.as_ref().unwrap().v;
    let adm = scenario.branches[0].admittance();
    let i_src = adm.y_ss * v[0] + adm.y_sd * v[1];
    // 20 MVA on a 100 MVA base
    assert!(i_src.norm() <= 0.2 + 1e-4, "|i_src| = {}", i_src.norm());
}

#[test]
fn voltage_drop_limit_binds() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.branches[0].z_bar = Complex64::new(0.01, 0.1);
    scenario.branches[0].drop_max = Some(-3.0);
    let qcqp = Qcqp::from_scenario(&scenario).unwrap();
    let result = SocrSolver::new().solve(&qcqp);

    assert_eq!(result.status, SolverStatus::Solved, "{result}");
    let v = &result.optimizer.as_ref().unwrap().v;
    assert!(
        v[1].norm() <= 0.97 * v[0].norm() + 1e-5,
        "|v0| = {}, |v1| = {}",
        v[0].norm(),
        v[1].norm()
    );
    assert!(v[1].norm() >= 0.9 - 1e-6);
}

#[test]
fn injector_facet_splits_dispatch() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.injectors[0].cap = scenario.injectors[0]
        .cap
        .clone()
        .with_facet(HalfPlane::new(1.0, 0.0, 0.5));
    scenario.injectors.push(
        Injector::new(1, 1, CapRegion::new(0.0, 10.0, -10.0, 10.0))
            .with_cost_p(PwlFunction::linear(50.0, 0.0, 10.0)),
    );
    let qcqp = Qcqp::from_scenario(&scenario).unwrap();
    let result = SocrSolver::new().solve(&qcqp);

    assert_eq!(result.status, SolverStatus::Solved, "{result}");
    let s = &result.optimizer.as_ref().unwrap().s;
    let base = qcqp.base_mva();
    assert!((s[0].re * base - 0.5).abs() < 1e-4, "p0 = {}", s[0].re * base);
    assert!((s[1].re * base - 0.5).abs() < 1e-4, "p1 = {}", s[1].re * base);
    // 0.5 MW at 10 $/MWh plus 0.5 MW at 50 $/MWh
    let objective = result.optimal_value.unwrap();
    assert!((objective - 30.0).abs() < 1e-3, "objective {objective}");

    let facet = result
        .duals
        .as_ref()
        .unwrap()
        .inequality
        .iter()
        .find(|d| d.tag == ConstraintTag::InjectorFacet { injector: 0, facet: 0 })
        .unwrap();
    // 40 $/MWh price difference per p.u. of facet slack
    assert!((facet.value - 40.0 * base).abs() < 1e-3 * 40.0 * base, "{}", facet.value);
}

#[test]
fn converter_facet_caps_import() {
    let mut scenario = test_utils::hybrid_scenario();
    scenario.converters[0].cap_src = scenario.converters[0]
        .cap_src
        .clone()
        .with_facet(HalfPlane::new(1.0, 0.0, 30.0));
    let qcqp = Qcqp::from_scenario(&scenario).unwrap();
    let result = SocrSolver::new().solve(&qcqp);

    assert_eq!(result.status, SolverStatus::Solved, "{result}");
    let point = result.optimizer.as_ref().unwrap();
    let base = qcqp.base_mva();
    let cvt = &scenario.converters[0];
    let draw_src = (point.f[0].p_fwd - cvt.eta_bwd() * point.f[0].p_bwd) * base;
    // imports are cheaper than the local unit, so the facet binds
    assert!((draw_src - 30.0).abs() < 1e-3, "draw {draw_src}");
    assert!(point.s[1].re * base > 5.0);
}

#[test]
fn phase_shifter_sets_angle_difference() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.buses[1].load = Complex64::new(0.0, 0.0);
    scenario.branches[0].z_bar = Complex64::new(0.01, 0.1);
    scenario.branches[0].rho_src = Complex64::from_polar(1.0, 0.1);
    let qcqp = Qcqp::from_scenario(&scenario).unwrap();
    let result = SocrSolver::new().solve(&qcqp);

    assert_eq!(result.status, SolverStatus::Solved, "{result}");
    let v = &result.optimizer.as_ref().unwrap().v;
    let difference = v[0].arg() - v[1].arg();
    let expected = -scenario.branches[0].total_ratio().arg();
    assert!((expected - 0.1).abs() < 1e-12);
    assert!(
        (difference - expected).abs() < 1e-4,
        "angle difference {difference}, expected {expected}"
    );
}
