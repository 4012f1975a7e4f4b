//! The vectorized OPF problem.
//!
//! A [`Qcqp`] fixes the layout of the real decision vector `x`:
//!
//! ```text
//! [ V_ii (dim_v) | Re V_k (E) | Im V_k (E) | f (4 per converter) | s (2 per injector) | z ]
//! ```
//!
//! Only the voltage-matrix entries referenced by some constraint are
//! tracked: the diagonal and one off-diagonal entry `V_k = V[e_src, e_dst]`
//! per edge with `e_src > e_dst`. Converter flows are
//! `[p_fwd, p_bwd, q_src, q_dst]`, injections `[p, q]`, all in p.u.; `z`
//! holds one epigraph variable per cost function.

mod vectorize;

pub use vectorize::{get_vectorization, BalanceTag, ConstraintTag, Side, Vectorization};

use std::collections::HashMap;
use std::ops::Range;

use num_complex::Complex64;
use serde::Serialize;

use relax_core::graph_utils::{self, BranchEdge};
use relax_core::{BusId, Scenario, ScenarioError};

use crate::error::{OpfError, OpfResult};

/// Active or reactive power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerKind {
    Active,
    Reactive,
}

/// Epigraph variable for one injector cost function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostVariable {
    pub injector: usize,
    pub kind: PowerKind,
}

/// Offsets of each block of the decision vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub dim_v: usize,
    pub num_edges: usize,
    pub num_converters: usize,
    pub num_injectors: usize,
    pub num_costs: usize,
}

impl Layout {
    pub fn v(&self, bus: usize) -> usize {
        bus
    }

    pub fn re(&self, edge: usize) -> usize {
        self.dim_v + edge
    }

    pub fn im(&self, edge: usize) -> usize {
        self.dim_v + self.num_edges + edge
    }

    fn f_start(&self) -> usize {
        self.dim_v + 2 * self.num_edges
    }

    pub fn p_fwd(&self, cvt: usize) -> usize {
        self.f_start() + 4 * cvt
    }

    pub fn p_bwd(&self, cvt: usize) -> usize {
        self.f_start() + 4 * cvt + 1
    }

    pub fn q_src(&self, cvt: usize) -> usize {
        self.f_start() + 4 * cvt + 2
    }

    pub fn q_dst(&self, cvt: usize) -> usize {
        self.f_start() + 4 * cvt + 3
    }

    fn s_start(&self) -> usize {
        self.f_start() + 4 * self.num_converters
    }

    pub fn s_p(&self, inj: usize) -> usize {
        self.s_start() + 2 * inj
    }

    pub fn s_q(&self, inj: usize) -> usize {
        self.s_start() + 2 * inj + 1
    }

    fn z_start(&self) -> usize {
        self.s_start() + 2 * self.num_injectors
    }

    pub fn z(&self, cost: usize) -> usize {
        self.z_start() + cost
    }

    /// Voltage-matrix block `[V_ii | Re V_k | Im V_k]`.
    pub fn voltage_block(&self) -> Range<usize> {
        0..self.f_start()
    }

    pub fn num_vars(&self) -> usize {
        self.z_start() + self.num_costs
    }
}

/// Sparse Hermitian voltage matrix holding only the tracked entries.
///
/// Bus indices are the arena; `edges` are index pairs into it with
/// `e_src > e_dst`, and `off_diag[k]` is `V[e_src, e_dst]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseHermitian {
    pub diag: Vec<f64>,
    pub edges: Vec<(usize, usize)>,
    pub off_diag: Vec<Complex64>,
    #[serde(skip)]
    edge_index: HashMap<(usize, usize), usize>,
}

impl SparseHermitian {
    pub fn new(diag: Vec<f64>, edges: Vec<(usize, usize)>, off_diag: Vec<Complex64>) -> Self {
        let edge_index = edges.iter().enumerate().map(|(k, &e)| (e, k)).collect();
        Self {
            diag,
            edges,
            off_diag,
            edge_index,
        }
    }

    /// Entry `V[i, j]` if tracked.
    pub fn get(&self, i: usize, j: usize) -> Option<Complex64> {
        if i == j {
            return self.diag.get(i).map(|&d| Complex64::new(d, 0.0));
        }
        let k = *self.edge_index.get(&(i.max(j), i.min(j)))?;
        let value = *self.off_diag.get(k)?;
        Some(if i > j { value } else { value.conj() })
    }

    /// Entry `V[from, to]` for edge `k`, where `from` is one of its ends.
    pub fn oriented(&self, k: usize, from: usize) -> Complex64 {
        if self.edges[k].0 == from {
            self.off_diag[k]
        } else {
            self.off_diag[k].conj()
        }
    }
}

/// Converter flows in p.u.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConverterFlow {
    pub p_fwd: f64,
    pub p_bwd: f64,
    pub q_src: f64,
    pub q_dst: f64,
}

/// The decision vector split into its physically named parts `(V, f, s, z)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorParts {
    pub v: SparseHermitian,
    pub f: Vec<ConverterFlow>,
    /// Injections `p + jq` in p.u.
    pub s: Vec<Complex64>,
    pub z: Vec<f64>,
}

/// Duals of the lower and upper variable bounds, split like the primal.
///
/// Entries of variables without a finite bound on that side are zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundDuals {
    pub lower: VectorParts,
    pub upper: VectorParts,
}

/// Vectorized OPF problem built from a verified scenario. Immutable.
#[derive(Debug, Clone)]
pub struct Qcqp {
    scenario: Scenario,
    layout: Layout,
    edges: Vec<(usize, usize)>,
    roots: Vec<usize>,
    branch_edges: Vec<BranchEdge>,
    branch_buses: Vec<(usize, usize)>,
    converter_buses: Vec<(usize, usize)>,
    injector_buses: Vec<usize>,
    cost_vars: Vec<CostVariable>,
}

impl Qcqp {
    /// Build the QCQP of a scenario.
    ///
    /// The scenario should have passed `verify_scenario`; unresolved bus
    /// references and self-loops are still rejected here instead of panicking.
    pub fn from_scenario(scenario: &Scenario) -> OpfResult<Self> {
        if scenario.buses.is_empty() {
            return Err(OpfError::Build("scenario has no buses".into()));
        }
        let bus_index = scenario.bus_index_map();
        if bus_index.len() != scenario.buses.len() {
            return Err(OpfError::Build("duplicate bus IDs".into()));
        }
        let lookup = |entity: String, id: BusId| -> OpfResult<usize> {
            bus_index.get(&id).copied().ok_or_else(|| {
                OpfError::ScenarioInvalid(ScenarioError::UnknownBus {
                    entity,
                    bus: id.value(),
                })
            })
        };

        let edge_set = graph_utils::edge_set(scenario);
        let mut branch_buses = Vec::with_capacity(scenario.branches.len());
        let mut branch_edges = Vec::with_capacity(scenario.branches.len());
        for (branch, mapping) in scenario.branches.iter().zip(&edge_set.branch_edge) {
            let src = lookup(branch.id.to_string(), branch.src)?;
            let dst = lookup(branch.id.to_string(), branch.dst)?;
            let edge = mapping
                .ok_or_else(|| OpfError::Build(format!("{} is a self-loop", branch.id)))?;
            branch_buses.push((src, dst));
            branch_edges.push(edge);
        }

        let converter_buses = scenario
            .converters
            .iter()
            .map(|c| {
                Ok((
                    lookup(c.id.to_string(), c.src)?,
                    lookup(c.id.to_string(), c.dst)?,
                ))
            })
            .collect::<OpfResult<Vec<_>>>()?;
        let injector_buses = scenario
            .injectors
            .iter()
            .map(|i| lookup(i.id.to_string(), i.bus))
            .collect::<OpfResult<Vec<_>>>()?;

        let mut cost_vars = Vec::new();
        for (idx, inj) in scenario.injectors.iter().enumerate() {
            if inj.cost_p.as_ref().is_some_and(|f| !f.is_empty()) {
                cost_vars.push(CostVariable {
                    injector: idx,
                    kind: PowerKind::Active,
                });
            }
            if inj.cost_q.as_ref().is_some_and(|f| !f.is_empty()) {
                cost_vars.push(CostVariable {
                    injector: idx,
                    kind: PowerKind::Reactive,
                });
            }
        }

        let subgrids = graph_utils::subgrids(scenario);
        let roots = graph_utils::subgrid_roots(scenario, &subgrids);

        let layout = Layout {
            dim_v: scenario.buses.len(),
            num_edges: edge_set.edges.len(),
            num_converters: scenario.converters.len(),
            num_injectors: scenario.injectors.len(),
            num_costs: cost_vars.len(),
        };

        tracing::debug!(
            scenario = %scenario.name,
            dim_v = layout.dim_v,
            num_edges = layout.num_edges,
            num_vars = layout.num_vars(),
            "built QCQP"
        );

        Ok(Self {
            scenario: scenario.clone(),
            layout,
            edges: edge_set.edges,
            roots,
            branch_edges,
            branch_buses,
            converter_buses,
            injector_buses,
            cost_vars,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of buses.
    pub fn dim_v(&self) -> usize {
        self.layout.dim_v
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// `(e_src, e_dst)` pairs with `e_src > e_dst`; the order is fixed.
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// One phase-anchor bus per subgrid.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    pub fn base_mva(&self) -> f64 {
        self.scenario.base_mva
    }

    pub fn branch_edge(&self, branch: usize) -> BranchEdge {
        self.branch_edges[branch]
    }

    pub fn branch_buses(&self, branch: usize) -> (usize, usize) {
        self.branch_buses[branch]
    }

    pub fn converter_buses(&self, cvt: usize) -> (usize, usize) {
        self.converter_buses[cvt]
    }

    pub fn injector_bus(&self, inj: usize) -> usize {
        self.injector_buses[inj]
    }

    pub fn cost_vars(&self) -> &[CostVariable] {
        &self.cost_vars
    }

    fn check_len(&self, what: &'static str, actual: usize) -> OpfResult<()> {
        let expected = self.num_vars();
        if actual == expected {
            Ok(())
        } else {
            Err(OpfError::Dimension {
                what,
                expected,
                actual,
            })
        }
    }

    fn split(&self, x: &[f64]) -> VectorParts {
        let l = &self.layout;
        let v = SparseHermitian::new(
            x[..l.dim_v].to_vec(),
            self.edges.clone(),
            (0..l.num_edges)
                .map(|k| Complex64::new(x[l.re(k)], x[l.im(k)]))
                .collect(),
        );
        let f = (0..l.num_converters)
            .map(|c| ConverterFlow {
                p_fwd: x[l.p_fwd(c)],
                p_bwd: x[l.p_bwd(c)],
                q_src: x[l.q_src(c)],
                q_dst: x[l.q_dst(c)],
            })
            .collect();
        let s = (0..l.num_injectors)
            .map(|i| Complex64::new(x[l.s_p(i)], x[l.s_q(i)]))
            .collect();
        let z = (0..l.num_costs).map(|c| x[l.z(c)]).collect();
        VectorParts { v, f, s, z }
    }

    /// Split a primal vector into `(V, f, s, z)`.
    pub fn split_vectorization_optimizer(&self, x: &[f64]) -> OpfResult<VectorParts> {
        self.check_len("optimizer", x.len())?;
        Ok(self.split(x))
    }

    /// Split flat bound duals into per-variable structured duals.
    pub fn split_vectorization_bound_dual(
        &self,
        dual_lower: &[f64],
        dual_upper: &[f64],
    ) -> OpfResult<BoundDuals> {
        self.check_len("lower bound dual", dual_lower.len())?;
        self.check_len("upper bound dual", dual_upper.len())?;
        Ok(BoundDuals {
            lower: self.split(dual_lower),
            upper: self.split(dual_upper),
        })
    }

    /// Flatten `(V, f, s, z)` back into a decision vector; inverse of
    /// [`split_vectorization_optimizer`](Self::split_vectorization_optimizer).
    pub fn join_vectorization(&self, parts: &VectorParts) -> OpfResult<Vec<f64>> {
        let l = &self.layout;
        let shape_ok = parts.v.diag.len() == l.dim_v
            && parts.v.off_diag.len() == l.num_edges
            && parts.f.len() == l.num_converters
            && parts.s.len() == l.num_injectors
            && parts.z.len() == l.num_costs;
        if !shape_ok {
            return Err(OpfError::Build(
                "vector parts do not match the QCQP layout".into(),
            ));
        }

        let mut x = vec![0.0; l.num_vars()];
        x[..l.dim_v].copy_from_slice(&parts.v.diag);
        for (k, w) in parts.v.off_diag.iter().enumerate() {
            x[l.re(k)] = w.re;
            x[l.im(k)] = w.im;
        }
        for (c, flow) in parts.f.iter().enumerate() {
            x[l.p_fwd(c)] = flow.p_fwd;
            x[l.p_bwd(c)] = flow.p_bwd;
            x[l.q_src(c)] = flow.q_src;
            x[l.q_dst(c)] = flow.q_dst;
        }
        for (i, s) in parts.s.iter().enumerate() {
            x[l.s_p(i)] = s.re;
            x[l.s_q(i)] = s.im;
        }
        for (c, z) in parts.z.iter().enumerate() {
            x[l.z(c)] = *z;
        }
        Ok(x)
    }

    /// Objective value `cᵗx + c0` at a decision vector.
    pub fn objective(&self, vectorization: &Vectorization, x: &[f64]) -> f64 {
        vectorization.constant
            + vectorization
                .c
                .iter()
                .zip(x)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    /// Bus row index of each bus ID.
    pub fn bus_index_map(&self) -> HashMap<BusId, usize> {
        self.scenario.bus_index_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_core::test_utils;

    #[test]
    fn test_layout_blocks_are_contiguous() {
        let layout = Layout {
            dim_v: 3,
            num_edges: 2,
            num_converters: 1,
            num_injectors: 2,
            num_costs: 1,
        };
        assert_eq!(layout.re(0), 3);
        assert_eq!(layout.im(1), 6);
        assert_eq!(layout.p_fwd(0), 7);
        assert_eq!(layout.q_dst(0), 10);
        assert_eq!(layout.s_p(0), 11);
        assert_eq!(layout.s_q(1), 14);
        assert_eq!(layout.z(0), 15);
        assert_eq!(layout.num_vars(), 16);
        assert_eq!(layout.voltage_block(), 0..7);
    }

    #[test]
    fn test_hybrid_dimensions_and_roots() {
        let qcqp = Qcqp::from_scenario(&test_utils::hybrid_scenario()).unwrap();
        assert_eq!(qcqp.dim_v(), 5);
        assert_eq!(qcqp.edges(), &[(1, 0), (3, 2)]);
        // subgrids {0,1}, {2,3}, {4}: reference buses where present
        assert_eq!(qcqp.roots(), &[0, 2, 4]);
        assert_eq!(qcqp.num_vars(), 5 + 4 + 8 + 4 + 2);
    }

    #[test]
    fn test_sparse_hermitian_lookup() {
        let v = SparseHermitian::new(
            vec![1.0, 0.9],
            vec![(1, 0)],
            vec![Complex64::new(0.9, 0.1)],
        );
        assert_eq!(v.get(1, 0), Some(Complex64::new(0.9, 0.1)));
        assert_eq!(v.get(0, 1), Some(Complex64::new(0.9, -0.1)));
        assert_eq!(v.get(1, 1), Some(Complex64::new(0.9, 0.0)));
        assert_eq!(v.oriented(0, 0), Complex64::new(0.9, -0.1));
        assert_eq!(v.get(0, 2), None);
    }

    #[test]
    fn test_sparse_hermitian_lookup_on_meshed_grid() {
        let qcqp = Qcqp::from_scenario(&test_utils::three_bus_meshed()).unwrap();
        let x: Vec<f64> = (0..qcqp.num_vars()).map(|i| i as f64).collect();
        let v = qcqp.split_vectorization_optimizer(&x).unwrap().v;
        let l = qcqp.layout();

        for (k, &(i, j)) in qcqp.edges().iter().enumerate() {
            let expected = Complex64::new(x[l.re(k)], x[l.im(k)]);
            assert_eq!(v.get(i, j), Some(expected));
            assert_eq!(v.get(j, i), Some(expected.conj()));
        }
        // every bus pair of the triangle is an edge
        assert!(v.get(0, 2).is_some());
        assert_eq!(v.get(3, 0), None);
    }

    #[test]
    fn test_unknown_bus_is_rejected() {
        let mut scenario = test_utils::two_bus_scenario();
        scenario.injectors[0].bus = BusId::new(5);
        let err = Qcqp::from_scenario(&scenario).unwrap_err();
        assert!(matches!(err, OpfError::ScenarioInvalid(_)));
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let qcqp = Qcqp::from_scenario(&test_utils::two_bus_scenario()).unwrap();
        let err = qcqp.split_vectorization_optimizer(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, OpfError::Dimension { expected: 7, actual: 3, .. }));
    }
}
