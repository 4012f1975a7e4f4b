//! Small scenarios shared by unit and integration tests.

use num_complex::Complex64;

use crate::units::{Degrees, PerUnit};
use crate::{Branch, Bus, BusType, CapRegion, Converter, Injector, PwlFunction, Scenario};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

/// Two AC buses joined by a lossless line without shunts; one generator at
/// the reference bus with a marginal cost of 10 $/MWh serves 1 MW at bus 1.
pub fn two_bus_scenario() -> Scenario {
    let mut scenario = Scenario::new("two-bus");
    scenario.buses = vec![
        Bus {
            is_ref: true,
            ..Bus::new(0)
        },
        Bus {
            load: c(1.0, 0.0),
            ..Bus::new(1)
        },
    ];
    scenario.branches = vec![Branch {
        z_bar: c(0.0, 0.1),
        ..Branch::new(0, 0, 1)
    }];
    scenario.injectors = vec![
        Injector::new(0, 0, CapRegion::new(0.0, 100.0, -100.0, 100.0))
            .with_cost_p(PwlFunction::linear(10.0, 0.0, 100.0)),
    ];
    scenario
}

/// Meshed three-bus AC grid with two generators of different cost.
pub fn three_bus_meshed() -> Scenario {
    let mut scenario = Scenario::new("three-bus-meshed");
    scenario.buses = vec![
        Bus {
            is_ref: true,
            ..Bus::new(0)
        },
        Bus {
            load: c(50.0, 10.0),
            ..Bus::new(1)
        },
        Bus {
            load: c(30.0, 0.0),
            ..Bus::new(2)
        },
    ];
    let line = |id, src, dst| Branch {
        z_bar: c(0.01, 0.1),
        y_src: c(0.0, 0.01),
        y_dst: c(0.0, 0.01),
        ..Branch::new(id, src, dst)
    };
    scenario.branches = vec![
        line(0, 0, 1),
        Branch {
            angle_min: Some(Degrees(-30.0)),
            angle_max: Some(Degrees(30.0)),
            ..line(1, 1, 2)
        },
        line(2, 0, 2),
    ];
    scenario.injectors = vec![
        Injector::new(0, 0, CapRegion::new(0.0, 200.0, -100.0, 100.0))
            .with_cost_p(PwlFunction::linear(10.0, 0.0, 200.0)),
        Injector::new(1, 2, CapRegion::new(0.0, 100.0, -50.0, 50.0)).with_cost_p(
            PwlFunction::new(vec![(0.0, 0.0), (50.0, 1000.0), (100.0, 2500.0)]),
        ),
    ];
    scenario
}

/// Two radial AC subgrids coupled through a DC link with two converters.
/// Satisfies every hybrid-architecture condition.
pub fn hybrid_scenario() -> Scenario {
    let mut scenario = Scenario::new("hybrid");
    let dc = |id| Bus {
        bus_type: BusType::Dc,
        v_min: PerUnit(0.95),
        v_max: PerUnit(1.05),
        ..Bus::new(id)
    };
    scenario.buses = vec![
        Bus {
            is_ref: true,
            ..Bus::new(0)
        },
        Bus {
            load: c(20.0, 5.0),
            ..Bus::new(1)
        },
        dc(2),
        dc(3),
        Bus {
            is_ref: true,
            load: c(40.0, 5.0),
            ..Bus::new(4)
        },
    ];
    scenario.branches = vec![
        Branch {
            z_bar: c(0.01, 0.1),
            ..Branch::new(0, 0, 1)
        },
        Branch {
            z_bar: c(0.01, 0.0),
            ..Branch::new(1, 2, 3)
        },
    ];
    let converter = |id, src, dst, ac_at_src: bool| {
        let ac = CapRegion::new(-100.0, 100.0, -50.0, 50.0);
        let dc = CapRegion::active_only(-100.0, 100.0);
        let (cap_src, cap_dst) = if ac_at_src { (ac, dc) } else { (dc, ac) };
        Converter {
            loss_fwd: 2.0,
            loss_bwd: 2.0,
            cap_src,
            cap_dst,
            ..Converter::new(id, src, dst, 100.0)
        }
    };
    scenario.converters = vec![converter(0, 1, 2, true), converter(1, 3, 4, false)];
    scenario.injectors = vec![
        Injector::new(0, 0, CapRegion::new(0.0, 200.0, -100.0, 100.0))
            .with_cost_p(PwlFunction::linear(15.0, 0.0, 200.0)),
        Injector::new(1, 4, CapRegion::new(0.0, 20.0, -20.0, 20.0))
            .with_cost_p(PwlFunction::linear(40.0, 0.0, 20.0)),
    ];
    scenario
}

/// Radial DC-only grid fed from bus 0.
pub fn dc_radial_scenario() -> Scenario {
    let mut scenario = Scenario::new("dc-radial");
    scenario.buses = (0..3)
        .map(|id| Bus {
            bus_type: BusType::Dc,
            v_min: PerUnit(0.95),
            v_max: PerUnit(1.05),
            ..Bus::new(id)
        })
        .collect();
    scenario.buses[1].load = c(20.0, 0.0);
    scenario.buses[2].load = c(10.0, 0.0);
    scenario.branches = vec![
        Branch {
            z_bar: c(0.01, 0.0),
            ..Branch::new(0, 0, 1)
        },
        Branch {
            z_bar: c(0.01, 0.0),
            ..Branch::new(1, 1, 2)
        },
    ];
    scenario.injectors = vec![Injector::new(0, 0, CapRegion::active_only(0.0, 100.0))
        .with_cost_p(PwlFunction::linear(10.0, 0.0, 100.0))];
    scenario
}
