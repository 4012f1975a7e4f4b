//! Rank-1 recovery of bus voltages and reshaping of duals.
//!
//! Phasors are propagated breadth-first from each root over the tracked
//! edges, in `edges` order: `v_j = √V_jj ∠(∠v_i − ∠V_ij)`. The first edge
//! that reaches a bus fixes its phasor; later (cycle-forming) edges do not
//! alter it and only show up in the reconstruction error.

use std::collections::VecDeque;

use num_complex::Complex64;

use crate::backend::ConicSolution;
use crate::error::OpfResult;
use crate::qcqp::{PowerKind, Qcqp, SparseHermitian, Vectorization};
use crate::result::{QcqpDuals, TaggedDual};

/// Bus voltage phasors of the rank-1 approximation of `v`.
///
/// Buses not reached from any root (which a verified scenario does not
/// have) start their own traversal at angle zero.
pub fn rank1_approximation(v: &SparseHermitian, roots: &[usize]) -> Vec<Complex64> {
    let n = v.diag.len();
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for (k, &(i, j)) in v.edges.iter().enumerate() {
        adjacency[i].push((j, k));
        adjacency[j].push((i, k));
    }

    let magnitude = |bus: usize| v.diag[bus].max(0.0).sqrt();
    let mut phasors = vec![Complex64::new(0.0, 0.0); n];
    let mut visited = vec![false; n];
    let seeds = roots.iter().copied().filter(|&r| r < n).chain(0..n);

    for seed in seeds {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        phasors[seed] = Complex64::new(magnitude(seed), 0.0);
        let mut queue = VecDeque::from([seed]);

        while let Some(bus) = queue.pop_front() {
            for &(next, k) in &adjacency[bus] {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                let angle = phasors[bus].arg() - v.oriented(k, bus).arg();
                phasors[next] = Complex64::from_polar(magnitude(next), angle);
                queue.push_back(next);
            }
        }
    }
    phasors
}

/// Mean squared error between the tracked entries of `v` and those of the
/// rank-1 matrix `u uᴴ`, over the `dim_v + num_edges` tracked entries.
pub fn reconstruction_mse(v: &SparseHermitian, phasors: &[Complex64]) -> f64 {
    let count = v.diag.len() + v.edges.len();
    if count == 0 {
        return 0.0;
    }
    let diag: f64 = v
        .diag
        .iter()
        .zip(phasors)
        .map(|(&d, u)| (d - u.norm_sqr()).powi(2))
        .sum();
    let off: f64 = v
        .edges
        .iter()
        .zip(&v.off_diag)
        .map(|(&(i, j), &w)| (w - phasors[i] * phasors[j].conj()).norm_sqr())
        .sum();
    (diag + off) / count as f64
}

/// Reshape the backend duals into constraint groups.
///
/// Balance duals are negated into objective sensitivities, so that a
/// positive value is the marginal cost of serving more load at the bus.
pub fn reshape_duals(
    qcqp: &Qcqp,
    vectorization: &Vectorization,
    solution: &ConicSolution,
) -> OpfResult<QcqpDuals> {
    let n = qcqp.dim_v();
    let mut balance_p = vec![0.0; n];
    let mut balance_q = vec![0.0; n];
    for (tag, &dual) in vectorization.eq_tags.iter().zip(&solution.dual_eq) {
        match tag.kind {
            PowerKind::Active => balance_p[tag.bus] = -dual,
            PowerKind::Reactive => balance_q[tag.bus] = -dual,
        }
    }

    let inequality = vectorization
        .ineq_tags
        .iter()
        .zip(&solution.dual_ineq)
        .map(|(&tag, &value)| TaggedDual { tag, value })
        .collect();

    let num_vars = qcqp.num_vars();
    let lower = solution.dual_lower.get(..num_vars).unwrap_or(&solution.dual_lower[..]);
    let upper = solution.dual_upper.get(..num_vars).unwrap_or(&solution.dual_upper[..]);
    let bounds = qcqp.split_vectorization_bound_dual(lower, upper)?;

    Ok(QcqpDuals {
        balance_p,
        balance_q,
        inequality,
        bounds,
    })
}
