//! Verify → select → vectorize → solve, with results in physical units.

use num_complex::Complex64;
use serde::Serialize;

use relax_core::{
    verify_scenario, BranchId, BusId, ConverterId, Diagnostics, InjectorId, Megavars, Megawatts,
    Scenario,
};
use tracing::info;

use crate::error::OpfResult;
use crate::qcqp::Qcqp;
use crate::result::{QcqpResult, RelaxationKind, SolverStatus};
use crate::settings::SolverSettings;
use crate::solver::{select_relaxation, solver_for};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusResult {
    pub id: BusId,
    /// p.u.
    pub v_mag: f64,
    pub v_ang_deg: f64,
    /// Marginal cost of active load in $/MWh
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectorDispatch {
    pub id: InjectorId,
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// Complex power entering the branch at each end, in MVA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFlow {
    pub id: BranchId,
    pub s_src: Complex64,
    pub s_dst: Complex64,
}

/// Power drawn from each terminal bus into the converter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverterDispatch {
    pub id: ConverterId,
    pub p_src_mw: f64,
    pub p_dst_mw: f64,
    pub q_src_mvar: f64,
    pub q_dst_mvar: f64,
}

/// OPF result in physical units.
///
/// Physical tables are empty unless the status is SOLVED or INACCURATE.
#[derive(Debug, Clone, Serialize)]
pub struct OpfSolution {
    pub scenario: String,
    pub qcqp: QcqpResult,
    pub buses: Vec<BusResult>,
    pub injectors: Vec<InjectorDispatch>,
    pub branches: Vec<BranchFlow>,
    pub converters: Vec<ConverterDispatch>,
    /// Injected minus consumed active power
    pub losses: Megawatts,
    /// Injector cost plus loss penalty at the recovered point, in $/h.
    /// Differs from the relaxed objective when the relaxation is inexact.
    pub dispatch_cost: f64,
    /// Findings of both verifiers and of relaxation selection
    pub diagnostics: Diagnostics,
}

impl OpfSolution {
    pub fn status(&self) -> SolverStatus {
        self.qcqp.status
    }

    pub fn relaxation(&self) -> RelaxationKind {
        self.qcqp.relaxation
    }

    /// Relative gap between the relaxed objective and the dispatch cost.
    pub fn relaxation_gap(&self) -> Option<f64> {
        let relaxed = self.qcqp.optimal_value?;
        Some((self.dispatch_cost - relaxed).abs() / relaxed.abs().max(1.0))
    }
}

/// Solve the OPF of a scenario.
///
/// `kind` forces a relaxation; `None` lets [`select_relaxation`] decide.
/// Fails only on scenario errors; solver trouble is reported through the
/// status of the returned solution.
pub fn calc_opf(
    scenario: &Scenario,
    settings: &SolverSettings,
    kind: Option<RelaxationKind>,
) -> OpfResult<OpfSolution> {
    let mut diagnostics = Diagnostics::new();
    verify_scenario(scenario, &mut diagnostics)?;

    let kind = match kind {
        Some(kind) => kind,
        None => select_relaxation(scenario, &mut diagnostics),
    };

    let qcqp = Qcqp::from_scenario(scenario)?;
    let result = solver_for(kind, settings.clone()).solve(&qcqp);
    let solution = physical_solution(&qcqp, result, diagnostics);

    info!(
        scenario = %scenario.name,
        status = %solution.status(),
        dispatch_cost = solution.dispatch_cost,
        losses_mw = solution.losses.value(),
        "OPF finished"
    );
    Ok(solution)
}

fn physical_solution(qcqp: &Qcqp, result: QcqpResult, diagnostics: Diagnostics) -> OpfSolution {
    let scenario = qcqp.scenario();
    let base = scenario.base_mva;
    let mut solution = OpfSolution {
        scenario: scenario.name.clone(),
        qcqp: result,
        buses: Vec::new(),
        injectors: Vec::new(),
        branches: Vec::new(),
        converters: Vec::new(),
        losses: Megawatts(0.0),
        dispatch_cost: 0.0,
        diagnostics,
    };
    let (Some(point), Some(duals)) = (&solution.qcqp.optimizer, &solution.qcqp.duals) else {
        return solution;
    };

    solution.buses = scenario
        .buses
        .iter()
        .zip(&point.v)
        .zip(&duals.balance_p)
        .map(|((bus, v), dual)| BusResult {
            id: bus.id,
            v_mag: v.norm(),
            v_ang_deg: v.arg().to_degrees(),
            price: dual / base,
        })
        .collect();

    solution.injectors = scenario
        .injectors
        .iter()
        .zip(&point.s)
        .map(|(inj, s)| InjectorDispatch {
            id: inj.id,
            p_mw: Megawatts::from_per_unit(s.re, base).value(),
            q_mvar: Megavars::from_per_unit(s.im, base).value(),
        })
        .collect();

    solution.branches = scenario
        .branches
        .iter()
        .enumerate()
        .map(|(b, branch)| {
            let (src, dst) = qcqp.branch_buses(b);
            let (s_src, s_dst) = branch.admittance().flows(point.v[src], point.v[dst]);
            BranchFlow {
                id: branch.id,
                s_src: s_src * base,
                s_dst: s_dst * base,
            }
        })
        .collect();

    solution.converters = scenario
        .converters
        .iter()
        .zip(&point.f)
        .map(|(cvt, f)| ConverterDispatch {
            id: cvt.id,
            p_src_mw: Megawatts::from_per_unit(f.p_fwd - cvt.eta_bwd() * f.p_bwd, base).value(),
            p_dst_mw: Megawatts::from_per_unit(f.p_bwd - cvt.eta_fwd() * f.p_fwd, base).value(),
            q_src_mvar: Megavars::from_per_unit(f.q_src, base).value(),
            q_dst_mvar: Megavars::from_per_unit(f.q_dst, base).value(),
        })
        .collect();

    let injected: f64 = solution.injectors.iter().map(|i| i.p_mw).sum();
    let losses = injected - scenario.total_load().0.value();
    solution.losses = Megawatts(losses);

    let injector_cost: f64 = scenario
        .injectors
        .iter()
        .zip(&solution.injectors)
        .map(|(inj, d)| {
            inj.cost_p.as_ref().map_or(0.0, |f| f.evaluate(d.p_mw))
                + inj.cost_q.as_ref().map_or(0.0, |f| f.evaluate(d.q_mvar))
        })
        .sum();
    solution.dispatch_cost = injector_cost + scenario.loss_price * losses;
    solution
}
