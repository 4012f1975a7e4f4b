//! Scenario verifier tests
//!
//! Tests cover:
//! - Integrity violations raising `ScenarioError::Invalid`
//! - Warnings that do not block solving
//! - Sufficient conditions for relaxation exactness

use num_complex::Complex64;
use relax_core::{
    test_utils, verify_hybrid_architecture, verify_scenario, Branch, BusId, CapRegion, Degrees,
    Diagnostics, Injector, PwlFunction, ScenarioError, Severity,
};

fn assert_invalid(result: Result<(), ScenarioError>, entity: &str) {
    match result {
        Err(ScenarioError::Invalid { issues }) => {
            assert!(
                issues.iter().any(|i| i.entity.as_deref() == Some(entity)),
                "expected {entity} among {issues:?}"
            );
        }
        other => panic!("expected ScenarioInvalid, got {other:?}"),
    }
}

#[test]
fn valid_scenarios_pass_silently() {
    for scenario in [
        test_utils::three_bus_meshed(),
        test_utils::hybrid_scenario(),
        test_utils::dc_radial_scenario(),
    ] {
        let mut log = Diagnostics::new();
        verify_scenario(&scenario, &mut log).expect("fixture should be valid");
        assert!(!log.has_errors());
        assert!(!log.has_warnings(), "{}", log);
    }
}

#[test]
fn branch_to_unknown_bus_is_invalid() {
    let mut scenario = test_utils::three_bus_meshed();
    scenario.branches[2].dst = BusId::new(42);

    let mut log = Diagnostics::new();
    let result = verify_scenario(&scenario, &mut log);
    assert_invalid(result, "Branch 2");
    assert!(log
        .errors()
        .any(|i| i.category == "reference" && i.message.contains("Bus 42")));
}

#[test]
fn self_loop_branch_is_invalid() {
    let mut scenario = test_utils::three_bus_meshed();
    scenario.branches.push(Branch::new(7, 1, 1));

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Branch 7");
}

#[test]
fn empty_injector_capability_is_invalid() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.injectors[0].cap = CapRegion::new(50.0, 10.0, -10.0, 10.0);

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Injector 0");
}

#[test]
fn non_convex_cost_is_invalid() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.injectors[0].cost_p = Some(PwlFunction::new(vec![
        (0.0, 0.0),
        (50.0, 1000.0),
        (100.0, 1200.0),
    ]));

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Injector 0");
}

#[test]
fn island_without_injector_is_invalid() {
    let mut scenario = test_utils::three_bus_meshed();
    scenario.buses.push(relax_core::Bus {
        is_ref: true,
        ..relax_core::Bus::new(3)
    });

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Bus 3");
}

#[test]
fn cyclic_dc_subgrid_is_invalid() {
    let mut scenario = test_utils::dc_radial_scenario();
    scenario.branches.push(Branch {
        z_bar: Complex64::new(0.02, 0.0),
        ..Branch::new(2, 2, 0)
    });

    let mut log = Diagnostics::new();
    let err = verify_scenario(&scenario, &mut log).unwrap_err();
    assert!(err.to_string().contains("not radial"));
}

#[test]
fn dc_branch_with_reactance_is_invalid() {
    let mut scenario = test_utils::dc_radial_scenario();
    scenario.branches[1].z_bar = Complex64::new(0.01, 0.05);

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Branch 1");
}

#[test]
fn dc_injector_offering_reactive_power_is_invalid() {
    let mut scenario = test_utils::dc_radial_scenario();
    scenario.injectors.push(Injector::new(1, 2, CapRegion::new(0.0, 5.0, -1.0, 1.0)));

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Injector 1");
}

#[test]
fn voltage_drop_below_minus_hundred_percent_is_invalid() {
    let mut scenario = test_utils::three_bus_meshed();
    scenario.branches[0].drop_min = Some(-120.0);
    scenario.branches[0].drop_max = Some(5.0);

    let mut log = Diagnostics::new();
    assert_invalid(verify_scenario(&scenario, &mut log), "Branch 0");
}

#[test]
fn load_exceeding_capacity_only_warns() {
    let mut scenario = test_utils::two_bus_scenario();
    scenario.buses[1].load = Complex64::new(150.0, 0.0);

    let mut log = Diagnostics::new();
    verify_scenario(&scenario, &mut log).expect("plausibility is not an integrity rule");
    assert!(log
        .warnings()
        .any(|i| i.message.contains("exceeds injector capacity")));
}

#[test]
fn dc_radial_scenario_is_hybrid() {
    let scenario = test_utils::dc_radial_scenario();
    let mut log = Diagnostics::new();
    assert!(verify_hybrid_architecture(&scenario, &mut log));
    assert!(!log.has_issues());
}

#[test]
fn mismatched_parallel_ratios_are_reported() {
    let mut scenario = test_utils::hybrid_scenario();
    scenario.branches.push(Branch {
        z_bar: Complex64::new(0.02, 0.2),
        rho_dst: Complex64::new(1.05, 0.0),
        ..Branch::new(9, 0, 1)
    });

    let mut log = Diagnostics::new();
    assert!(!verify_hybrid_architecture(&scenario, &mut log));
    let flagged = log.entities(Severity::Warning);
    assert_eq!(flagged, vec!["Branch 9"]);
    assert!(log.warnings().any(|i| i.message.contains("Branch 0")));
}

#[test]
fn reversed_parallel_branch_with_conjugate_ratio_is_consistent() {
    let mut scenario = test_utils::hybrid_scenario();
    let shift = Complex64::from_polar(1.0, 0.05);
    scenario.branches[0].rho_dst = shift;
    scenario.branches[0].angle_min = Some(Degrees(-30.0));
    scenario.branches[0].angle_max = Some(Degrees(30.0));
    // same transformer seen from the other side
    scenario.branches.push(Branch {
        z_bar: Complex64::new(0.01, 0.1),
        rho_src: shift,
        angle_min: Some(Degrees(-30.0)),
        angle_max: Some(Degrees(30.0)),
        ..Branch::new(9, 1, 0)
    });

    let mut log = Diagnostics::new();
    assert!(verify_hybrid_architecture(&scenario, &mut log), "{}", log);
}

#[test]
fn angle_bounds_must_enclose_phase_shift() {
    let mut scenario = test_utils::hybrid_scenario();
    // ρ_src* ρ_dst = e^{-0.2j}: natural angle difference is +11.46°
    scenario.branches[0].rho_src = Complex64::from_polar(1.0, 0.2);
    scenario.branches[0].angle_min = Some(Degrees(-10.0));
    scenario.branches[0].angle_max = Some(Degrees(10.0));

    let mut log = Diagnostics::new();
    assert!(!verify_hybrid_architecture(&scenario, &mut log));
    assert_eq!(log.entities(Severity::Warning), vec!["Branch 0"]);
}

#[test]
fn non_positive_resistance_breaks_exactness() {
    let scenario = test_utils::two_bus_scenario();
    let mut log = Diagnostics::new();
    assert!(!verify_hybrid_architecture(&scenario, &mut log));
    assert!(log
        .warnings()
        .any(|i| i.message.contains("resistance is not strictly positive")));
}

#[test]
fn poorly_insulated_shunt_breaks_exactness() {
    let mut scenario = test_utils::hybrid_scenario();
    scenario.branches[0].y_src = Complex64::new(0.0, 12.0);

    let mut log = Diagnostics::new();
    assert!(!verify_hybrid_architecture(&scenario, &mut log));
    assert!(log.warnings().any(|i| i.message.contains("insulated")));
}
