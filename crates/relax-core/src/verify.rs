//! Scenario verification.
//!
//! [`verify_scenario`] enforces the integrity rules every solvable scenario
//! must satisfy and fails with [`ScenarioError::Invalid`] listing all
//! violations. Physical anomalies that do not prevent solving (near-zero
//! series resistance, load exceeding the injection capacity of an island)
//! are only logged as warnings.
//!
//! [`verify_hybrid_architecture`] checks the additional sufficient conditions
//! under which the SOCR and SDR relaxations are exact. A failed condition
//! degrades solution quality but does not make the problem unsolvable, so
//! the result is a boolean and every failure is logged with its entities.

use std::collections::HashSet;
use std::hash::Hash;

use num_complex::Complex64;
use tracing::{debug, info};

use crate::diagnostics::{DiagnosticIssue, Diagnostics, Severity};
use crate::error::ScenarioError;
use crate::graph_utils::{self, EdgeSet};
use crate::{BusType, Scenario};

/// Series resistance below this (p.u.) is flagged as an ill-conditioning risk.
const RESISTANCE_WARN_THRESHOLD: f64 = 1e-6;

/// Angle-difference bounds must lie strictly inside (−89°, 89°).
const ANGLE_LIMIT_DEG: f64 = 89.0;

/// Tolerance when comparing total voltage ratios of parallel branches.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Checks the integrity of a scenario.
///
/// All issues are recorded in `log`. Returns [`ScenarioError::Invalid`]
/// carrying the errors found in this call if any integrity rule is violated.
pub fn verify_scenario(scenario: &Scenario, log: &mut Diagnostics) -> Result<(), ScenarioError> {
    let mut checks = Checks::default();

    check_tables(scenario, &mut checks);
    check_buses(scenario, &mut checks);
    check_branches(scenario, &mut checks);
    check_converters(scenario, &mut checks);
    check_injectors(scenario, &mut checks);
    check_subgrids(scenario, &mut checks);
    check_islands(scenario, &mut checks);

    let errors: Vec<DiagnosticIssue> = checks
        .diag
        .errors()
        .cloned()
        .collect();
    debug!(
        scenario = %scenario.name,
        summary = %checks.diag.summary(),
        "scenario verification finished"
    );
    log.merge(checks.diag);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScenarioError::Invalid { issues: errors })
    }
}

/// Checks the sufficient conditions for exactness of the relaxations.
///
/// Assumes the scenario passed [`verify_scenario`].
pub fn verify_hybrid_architecture(scenario: &Scenario, log: &mut Diagnostics) -> bool {
    let mut checks = Checks::default();
    let edge_set = graph_utils::edge_set(scenario);

    check_acyclic_subgrids(scenario, &mut checks);
    check_series_impedance(scenario, &mut checks);
    check_shunt_insulation(scenario, &mut checks);
    check_parallel_ratios(scenario, &edge_set, &mut checks);
    check_angle_bounds_enclose_shift(scenario, &mut checks);

    let exact = !checks.diag.has_warnings();
    if exact {
        info!(scenario = %scenario.name, "hybrid architecture conditions hold");
    } else {
        info!(
            scenario = %scenario.name,
            violations = checks.diag.warning_count(),
            "hybrid architecture conditions violated; relaxation may be inexact"
        );
    }
    log.merge(checks.diag);
    exact
}

/// Local collector; issues are logged as they are found.
#[derive(Default)]
struct Checks {
    diag: Diagnostics,
}

impl Checks {
    fn error(&mut self, category: &str, entity: impl ToString, message: impl Into<String>) {
        self.diag.add(
            DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity.to_string()),
        );
    }

    fn warn(&mut self, category: &str, entity: impl ToString, message: impl Into<String>) {
        self.diag.add(
            DiagnosticIssue::new(Severity::Warning, category, message)
                .with_entity(entity.to_string()),
        );
    }
}

fn duplicates<T: Eq + Hash + Copy>(ids: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut dup = Vec::new();
    for id in ids {
        if !seen.insert(id) {
            dup.push(id);
        }
    }
    dup
}

fn is_finite(z: Complex64) -> bool {
    z.re.is_finite() && z.im.is_finite()
}

// ============================================================================
// Integrity checks
// ============================================================================

fn check_tables(scenario: &Scenario, checks: &mut Checks) {
    if !(scenario.base_mva.is_finite() && scenario.base_mva > 0.0) {
        checks.diag.add_error(
            "bounds",
            &format!("base MVA must be positive, got {}", scenario.base_mva),
        );
    }
    if !scenario.loss_price.is_finite() || scenario.loss_price < 0.0 {
        checks.diag.add_error(
            "cost",
            &format!("loss price must be non-negative, got {}", scenario.loss_price),
        );
    }
    if scenario.buses.is_empty() {
        checks.diag.add_error("topology", "scenario has no buses");
    }
    for id in duplicates(scenario.buses.iter().map(|b| b.id)) {
        checks.error("reference", id, "duplicate bus ID");
    }
    for id in duplicates(scenario.branches.iter().map(|b| b.id)) {
        checks.error("reference", id, "duplicate branch ID");
    }
    for id in duplicates(scenario.converters.iter().map(|c| c.id)) {
        checks.error("reference", id, "duplicate converter ID");
    }
    for id in duplicates(scenario.injectors.iter().map(|i| i.id)) {
        checks.error("reference", id, "duplicate injector ID");
    }
}

fn check_buses(scenario: &Scenario, checks: &mut Checks) {
    for bus in &scenario.buses {
        let (v_min, v_max) = (bus.v_min.value(), bus.v_max.value());
        if !(v_min > 0.0 && v_min <= v_max && v_max.is_finite()) {
            checks.error(
                "bounds",
                bus.id,
                format!("voltage bounds [{v_min}, {v_max}] must satisfy 0 < v_min <= v_max < inf"),
            );
        }
        if !(bus.base_kv.value() > 0.0 && bus.base_kv.is_finite()) {
            checks.error("electrical", bus.id, "base voltage must be positive");
        }
        if !is_finite(bus.y_tld) || !is_finite(bus.load) {
            checks.error("electrical", bus.id, "shunt admittance and load must be finite");
        }
        if bus.y_tld.re < 0.0 {
            checks.warn("physical", bus.id, "negative shunt conductance");
        }
    }
}

fn check_branches(scenario: &Scenario, checks: &mut Checks) {
    let buses = scenario.bus_index_map();
    for branch in &scenario.branches {
        let src = buses.get(&branch.src).copied();
        let dst = buses.get(&branch.dst).copied();
        if src.is_none() {
            checks.error("reference", branch.id, format!("unknown source {}", branch.src));
        }
        if dst.is_none() {
            checks.error("reference", branch.id, format!("unknown destination {}", branch.dst));
        }
        if branch.src == branch.dst {
            checks.error("topology", branch.id, "branch is a self-loop");
        }

        let z = branch.z_bar;
        if !is_finite(z) || z.norm() == 0.0 {
            checks.error("electrical", branch.id, "series impedance must be finite and nonzero");
        } else if z.re.abs() < RESISTANCE_WARN_THRESHOLD {
            checks.warn(
                "physical",
                branch.id,
                "series resistance is close to zero (ill-conditioning risk)",
            );
        }
        if !is_finite(branch.y_src) || !is_finite(branch.y_dst) {
            checks.error("electrical", branch.id, "shunt admittances must be finite");
        }
        if !is_finite(branch.rho_src)
            || !is_finite(branch.rho_dst)
            || branch.rho_src.norm() == 0.0
            || branch.rho_dst.norm() == 0.0
        {
            checks.error("electrical", branch.id, "voltage ratios must be finite and nonzero");
        }
        if let Some(rating) = branch.rating {
            if !(rating.value() > 0.0) {
                checks.error("bounds", branch.id, "rating must be positive");
            }
        }

        for angle in [branch.angle_min, branch.angle_max].into_iter().flatten() {
            if !(angle.value().abs() < ANGLE_LIMIT_DEG) {
                checks.error(
                    "bounds",
                    branch.id,
                    format!("angle bound {angle} outside (-89°, 89°)"),
                );
            }
        }
        if let (Some(lo), Some(hi)) = (branch.angle_min, branch.angle_max) {
            if !(lo.value() < hi.value()) {
                checks.error("bounds", branch.id, "angle_min must be below angle_max");
            }
        }

        for drop in [branch.drop_min, branch.drop_max].into_iter().flatten() {
            if !(drop >= -100.0 && drop.is_finite()) {
                checks.error(
                    "bounds",
                    branch.id,
                    format!("voltage drop bound {drop}% must be finite and at least -100%"),
                );
            }
        }
        if let (Some(lo), Some(hi)) = (branch.drop_min, branch.drop_max) {
            if !(lo < hi) {
                checks.error("bounds", branch.id, "drop_min must be below drop_max");
            }
        }

        if let (Some(s), Some(d)) = (src, dst) {
            let (src_bus, dst_bus) = (&scenario.buses[s], &scenario.buses[d]);
            if src_bus.bus_type == BusType::Dc && dst_bus.bus_type == BusType::Dc {
                check_dc_branch(branch, checks);
            }
        }
    }
}

/// DC branches carry no reactive or phase-related properties.
fn check_dc_branch(branch: &crate::Branch, checks: &mut Checks) {
    if branch.z_bar.im != 0.0 {
        checks.error("electrical", branch.id, "DC branch must have zero series reactance");
    }
    if branch.y_src.im != 0.0 || branch.y_dst.im != 0.0 {
        checks.error("electrical", branch.id, "DC branch must have zero shunt susceptance");
    }
    if branch.y_src != branch.y_dst {
        checks.error("electrical", branch.id, "DC branch shunt admittances must be symmetric");
    }
    let one = Complex64::new(1.0, 0.0);
    if branch.rho_src != one || branch.rho_dst != one {
        checks.error("electrical", branch.id, "DC branch must have unit voltage ratios");
    }
    if branch.branch_type == crate::BranchType::Transformer {
        checks.error("electrical", branch.id, "transformers cannot connect DC buses");
    }
}

fn check_converters(scenario: &Scenario, checks: &mut Checks) {
    let buses = scenario.bus_index_map();
    for cvt in &scenario.converters {
        let src = buses.get(&cvt.src).copied();
        let dst = buses.get(&cvt.dst).copied();
        if src.is_none() {
            checks.error("reference", cvt.id, format!("unknown source {}", cvt.src));
        }
        if dst.is_none() {
            checks.error("reference", cvt.id, format!("unknown destination {}", cvt.dst));
        }
        if cvt.src == cvt.dst {
            checks.error("topology", cvt.id, "converter is a self-loop");
        }
        for (name, loss) in [("forward", cvt.loss_fwd), ("backward", cvt.loss_bwd)] {
            if !(0.0..100.0).contains(&loss) {
                checks.error(
                    "electrical",
                    cvt.id,
                    format!("{name} loss factor {loss}% must lie in [0, 100)"),
                );
            }
        }
        for (side, cap, bus) in [("source", &cvt.cap_src, src), ("destination", &cvt.cap_dst, dst)] {
            if !cap.has_valid_box() {
                checks.error(
                    "capability",
                    cvt.id,
                    format!("{side} capability region is empty"),
                );
            }
            let on_dc = bus.is_some_and(|b| scenario.buses[b].is_dc());
            if on_dc && cap.offers_reactive_power() {
                checks.error(
                    "capability",
                    cvt.id,
                    format!("{side} terminal is on a DC bus but offers reactive power"),
                );
            }
        }
    }
}

fn check_injectors(scenario: &Scenario, checks: &mut Checks) {
    let buses = scenario.bus_index_map();
    for inj in &scenario.injectors {
        let bus = buses.get(&inj.bus).copied();
        if bus.is_none() {
            checks.error("reference", inj.id, format!("unknown {}", inj.bus));
        }
        if !inj.cap.has_valid_box() {
            checks.error(
                "capability",
                inj.id,
                format!(
                    "capability region [{}, {}] MW x [{}, {}] Mvar is empty",
                    inj.cap.p_min, inj.cap.p_max, inj.cap.q_min, inj.cap.q_max
                ),
            );
        }
        if bus.is_some_and(|b| scenario.buses[b].is_dc()) && inj.cap.offers_reactive_power() {
            checks.error("capability", inj.id, "injector on a DC bus offers reactive power");
        }
        for (name, cost) in [("active", &inj.cost_p), ("reactive", &inj.cost_q)] {
            if let Some(f) = cost {
                if !f.is_convex() {
                    checks.error(
                        "cost",
                        inj.id,
                        format!("{name} power cost function is not a convex piecewise-linear function"),
                    );
                }
            }
        }
    }
}

fn check_subgrids(scenario: &Scenario, checks: &mut Checks) {
    let subgrids = graph_utils::subgrids(scenario);
    let cyclic: HashSet<usize> = graph_utils::cyclic_subgrids(scenario).into_iter().collect();

    for (idx, members) in subgrids.iter().enumerate() {
        let Some(&first) = members.first() else {
            continue;
        };
        let anchor = scenario.buses[first].id;
        let kind = scenario.buses[first].bus_type;
        if members.iter().any(|&b| scenario.buses[b].bus_type != kind) {
            checks.error("topology", anchor, "subgrid mixes AC and DC buses");
            continue;
        }

        let refs: Vec<_> = members
            .iter()
            .filter(|&&b| scenario.buses[b].is_ref)
            .map(|&b| scenario.buses[b].id.to_string())
            .collect();

        match kind {
            BusType::Ac => match refs.len() {
                0 => checks.error("topology", anchor, "AC subgrid has no reference bus"),
                1 => {}
                _ => checks.error(
                    "topology",
                    anchor,
                    format!("AC subgrid has multiple reference buses: {}", refs.join(", ")),
                ),
            },
            BusType::Dc => {
                if !refs.is_empty() {
                    checks.error(
                        "topology",
                        anchor,
                        format!("DC subgrid declares reference buses: {}", refs.join(", ")),
                    );
                }
                if cyclic.contains(&idx) {
                    checks.error("topology", anchor, "DC subgrid is not radial");
                }
                for &b in members {
                    let bus = &scenario.buses[b];
                    if bus.y_tld.im != 0.0 || bus.load.im != 0.0 {
                        checks.error(
                            "electrical",
                            bus.id,
                            "DC bus has a reactive shunt or reactive load",
                        );
                    }
                }
            }
        }
    }
}

fn check_islands(scenario: &Scenario, checks: &mut Checks) {
    let buses = scenario.bus_index_map();
    let islands = graph_utils::islands(scenario);
    let owner = graph_utils::membership(&islands, scenario.buses.len());

    let mut capacity = vec![0.0; islands.len()];
    let mut has_injector = vec![false; islands.len()];
    for inj in &scenario.injectors {
        if let Some(&b) = buses.get(&inj.bus) {
            has_injector[owner[b]] = true;
            capacity[owner[b]] += inj.cap.p_max;
        }
    }

    for (idx, members) in islands.iter().enumerate() {
        let Some(&first) = members.first() else {
            continue;
        };
        let anchor = scenario.buses[first].id;
        if !has_injector[idx] {
            checks.error("topology", anchor, "island contains no injector");
            continue;
        }
        let load: f64 = members.iter().map(|&b| scenario.buses[b].load.re).sum();
        if load > capacity[idx] {
            checks.warn(
                "physical",
                anchor,
                format!(
                    "island load {load:.2} MW exceeds injector capacity {:.2} MW",
                    capacity[idx]
                ),
            );
        }
    }
}

// ============================================================================
// Exactness conditions
// ============================================================================

fn check_acyclic_subgrids(scenario: &Scenario, checks: &mut Checks) {
    let subgrids = graph_utils::subgrids(scenario);
    for idx in graph_utils::cyclic_subgrids(scenario) {
        let ids: Vec<String> = subgrids[idx]
            .iter()
            .map(|&b| scenario.buses[b].id.value().to_string())
            .collect();
        let anchor = scenario.buses[subgrids[idx][0]].id;
        checks.warn(
            "exactness",
            anchor,
            format!("subgrid with buses [{}] contains a cycle", ids.join(", ")),
        );
    }
}

fn check_series_impedance(scenario: &Scenario, checks: &mut Checks) {
    for branch in &scenario.branches {
        if !(branch.z_bar.re > 0.0) {
            checks.warn("exactness", branch.id, "series resistance is not strictly positive");
        }
        if branch.z_bar.im < 0.0 {
            checks.warn("exactness", branch.id, "series reactance is capacitive");
        }
    }
}

fn check_shunt_insulation(scenario: &Scenario, checks: &mut Checks) {
    for branch in &scenario.branches {
        let z_abs = branch.z_bar.norm();
        for (side, y) in [("source", branch.y_src), ("destination", branch.y_dst)] {
            if y.re < 0.0 {
                checks.warn(
                    "exactness",
                    branch.id,
                    format!("negative shunt conductance at {side} side"),
                );
            }
            if y.norm() * z_abs > 1.0 {
                checks.warn(
                    "exactness",
                    branch.id,
                    format!("shunt at {side} side is not properly insulated (|y|·|z| > 1)"),
                );
            }
        }
    }
}

fn check_parallel_ratios(scenario: &Scenario, edge_set: &EdgeSet, checks: &mut Checks) {
    for group in edge_set.parallel_groups() {
        let Some((&first, rest)) = group.split_first() else {
            continue;
        };
        let reference = oriented_ratio(scenario, edge_set, first);
        for &other in rest {
            let ratio = oriented_ratio(scenario, edge_set, other);
            if (ratio - reference).norm() > RATIO_TOLERANCE * reference.norm().max(1.0) {
                let (a, b) = (scenario.branches[first].id, scenario.branches[other].id);
                checks.warn(
                    "exactness",
                    b,
                    format!("total voltage ratio differs from parallel {a}"),
                );
            }
        }
    }
}

/// Total ratio expressed in the canonical edge orientation.
fn oriented_ratio(scenario: &Scenario, edge_set: &EdgeSet, branch: usize) -> Complex64 {
    let ratio = scenario.branches[branch].total_ratio();
    match edge_set.branch_edge[branch] {
        Some(be) if !be.forward => ratio.conj(),
        _ => ratio,
    }
}

fn check_angle_bounds_enclose_shift(scenario: &Scenario, checks: &mut Checks) {
    for branch in &scenario.branches {
        let shift = -branch.total_ratio().arg().to_degrees();
        let above_min = branch.angle_min.map_or(true, |lo| lo.value() < shift);
        let below_max = branch.angle_max.map_or(true, |hi| shift < hi.value());
        if !(above_min && below_max) {
            checks.warn(
                "exactness",
                branch.id,
                format!("angle bounds do not enclose the ratio phase shift {shift:.3}°"),
            );
        }
    }
}
