//! Standard-form arrays of a [`Qcqp`].
//!
//! ```text
//! minimize    cᵗx + c0
//! subject to  A x  = b        (power balance per bus)
//!             B x <= d        (branch, converter, injector and epigraph rows)
//!             lower <= x <= upper
//! ```
//!
//! Voltage products enter linearly through the tracked entries of `V`: with
//! `V_sd = V[src, dst] = R + jσI`, where `σ = +1` if the branch source is the
//! edge's `e_src`, every branch quantity is an affine function of
//! `(V_ss, V_dd, R, I)`.

use num_complex::Complex64;
use serde::Serialize;
use sprs::{CsMat, TriMat};

use super::{Layout, PowerKind, Qcqp};

/// Terminal of a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Src,
    Dst,
}

/// Power-balance equality row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceTag {
    pub bus: usize,
    pub kind: PowerKind,
}

/// Origin of an inequality row. Indices are table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintTag {
    /// `|i_src|² <= i_max²`
    CurrentSrc { branch: usize },
    /// `|i_dst|² <= i_max²`
    CurrentDst { branch: usize },
    AngleMin { branch: usize },
    AngleMax { branch: usize },
    DropMin { branch: usize },
    DropMax { branch: usize },
    ConverterPMin { converter: usize, side: Side },
    ConverterPMax { converter: usize, side: Side },
    ConverterFacet { converter: usize, side: Side, facet: usize },
    InjectorFacet { injector: usize, facet: usize },
    /// Epigraph row of one cost segment
    CostSegment { cost: usize, segment: usize },
}

/// Standard-form arrays of a QCQP.
#[derive(Debug, Clone)]
pub struct Vectorization {
    pub c: Vec<f64>,
    /// Constant objective offset
    pub constant: f64,
    pub a_eq: CsMat<f64>,
    pub b_eq: Vec<f64>,
    pub a_ineq: CsMat<f64>,
    pub b_ineq: Vec<f64>,
    /// `NaN` where a variable has no lower bound
    pub lower: Vec<f64>,
    /// `NaN` where a variable has no upper bound
    pub upper: Vec<f64>,
    pub eq_tags: Vec<BalanceTag>,
    pub ineq_tags: Vec<ConstraintTag>,
}

impl Vectorization {
    pub fn num_vars(&self) -> usize {
        self.c.len()
    }

    pub fn num_eq(&self) -> usize {
        self.b_eq.len()
    }

    pub fn num_ineq(&self) -> usize {
        self.b_ineq.len()
    }
}

/// Row-wise triplet collector.
struct RowSet<T> {
    rows: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<f64>,
    tags: Vec<T>,
}

impl<T> RowSet<T> {
    fn new() -> Self {
        Self {
            rows: 0,
            triplets: Vec::new(),
            rhs: Vec::new(),
            tags: Vec::new(),
        }
    }

    fn push(&mut self, terms: &[(usize, f64)], rhs: f64, tag: T) {
        for &(col, value) in terms {
            if value != 0.0 {
                self.triplets.push((self.rows, col, value));
            }
        }
        self.rhs.push(rhs);
        self.tags.push(tag);
        self.rows += 1;
    }

    /// Duplicate entries are summed.
    fn into_parts(self, num_vars: usize) -> (CsMat<f64>, Vec<f64>, Vec<T>) {
        let mut tri = TriMat::new((self.rows, num_vars));
        for (row, col, value) in self.triplets {
            tri.add_triplet(row, col, value);
        }
        (tri.to_csr(), self.rhs, self.tags)
    }
}

/// Linear form accumulator over `x`.
#[derive(Default)]
struct Terms(Vec<(usize, f64)>);

impl Terms {
    fn add(&mut self, col: usize, value: f64) -> &mut Self {
        self.0.push((col, value));
        self
    }

    /// `scale · Re(γ V_sd)` with `V_sd = R + jσI`.
    fn re_product(&mut self, l: &Layout, edge: usize, sigma: f64, gamma: Complex64, scale: f64) {
        self.add(l.re(edge), scale * gamma.re);
        self.add(l.im(edge), -scale * gamma.im * sigma);
    }

    /// `scale · Im(γ V_sd)` with `V_sd = R + jσI`.
    fn im_product(&mut self, l: &Layout, edge: usize, sigma: f64, gamma: Complex64, scale: f64) {
        self.add(l.re(edge), scale * gamma.im);
        self.add(l.im(edge), scale * gamma.re * sigma);
    }
}

/// Build the standard-form arrays of a QCQP.
pub fn get_vectorization(qcqp: &Qcqp) -> Vectorization {
    let scenario = qcqp.scenario();
    let l = *qcqp.layout();
    let n = l.num_vars();
    let base = scenario.base_mva;

    // Power balance rows, one Terms per (bus, P/Q)
    let mut balance_p: Vec<Terms> = (0..l.dim_v).map(|_| Terms::default()).collect();
    let mut balance_q: Vec<Terms> = (0..l.dim_v).map(|_| Terms::default()).collect();

    for (idx, bus) in scenario.buses.iter().enumerate() {
        // shunt draw conj(y) V_nn
        balance_p[idx].add(l.v(idx), -bus.y_tld.re);
        balance_q[idx].add(l.v(idx), bus.y_tld.im);
    }

    let mut ineq = RowSet::new();

    for (b, branch) in scenario.branches.iter().enumerate() {
        let (s, d) = qcqp.branch_buses(b);
        let be = qcqp.branch_edge(b);
        let k = be.edge;
        let sigma = if be.forward { 1.0 } else { -1.0 };
        let adm = branch.admittance();

        // S_src = conj(y_ss) V_ss + conj(y_sd) V_sd
        balance_p[s].add(l.v(s), -adm.y_ss.re);
        balance_p[s].re_product(&l, k, sigma, adm.y_sd.conj(), -1.0);
        balance_q[s].add(l.v(s), adm.y_ss.im);
        balance_q[s].im_product(&l, k, sigma, adm.y_sd.conj(), -1.0);

        // S_dst = conj(y_dd) V_dd + conj(y_ds V_sd)
        balance_p[d].add(l.v(d), -adm.y_dd.re);
        balance_p[d].re_product(&l, k, sigma, adm.y_ds, -1.0);
        balance_q[d].add(l.v(d), adm.y_dd.im);
        balance_q[d].im_product(&l, k, sigma, adm.y_ds, 1.0);

        if let Some(rating) = branch.rating {
            let i_max_sq = rating.to_per_unit(base).powi(2);

            let mut row = Terms::default();
            row.add(l.v(s), adm.y_ss.norm_sqr())
                .add(l.v(d), adm.y_sd.norm_sqr());
            row.re_product(&l, k, sigma, adm.y_ss * adm.y_sd.conj(), 2.0);
            ineq.push(&row.0, i_max_sq, ConstraintTag::CurrentSrc { branch: b });

            let mut row = Terms::default();
            row.add(l.v(s), adm.y_ds.norm_sqr())
                .add(l.v(d), adm.y_dd.norm_sqr());
            row.re_product(&l, k, sigma, adm.y_ds * adm.y_dd.conj(), 2.0);
            ineq.push(&row.0, i_max_sq, ConstraintTag::CurrentDst { branch: b });
        }

        // θ_min <= arg(V_sd) <= θ_max as half-planes in (Re, Im)
        let one = Complex64::new(1.0, 0.0);
        if let Some(angle) = branch.angle_max.filter(|a| a.0.abs() < 90.0) {
            let tan = angle.to_radians().tan();
            let mut row = Terms::default();
            row.im_product(&l, k, sigma, one, 1.0);
            row.re_product(&l, k, sigma, one, -tan);
            ineq.push(&row.0, 0.0, ConstraintTag::AngleMax { branch: b });
        }
        if let Some(angle) = branch.angle_min.filter(|a| a.0.abs() < 90.0) {
            let tan = angle.to_radians().tan();
            let mut row = Terms::default();
            row.re_product(&l, k, sigma, one, tan);
            row.im_product(&l, k, sigma, one, -1.0);
            ineq.push(&row.0, 0.0, ConstraintTag::AngleMin { branch: b });
        }

        if let Some(drop) = branch.drop_min {
            let factor = (1.0 + drop / 100.0).max(0.0).powi(2);
            let mut row = Terms::default();
            row.add(l.v(s), factor).add(l.v(d), -1.0);
            ineq.push(&row.0, 0.0, ConstraintTag::DropMin { branch: b });
        }
        if let Some(drop) = branch.drop_max {
            let factor = (1.0 + drop / 100.0).max(0.0).powi(2);
            let mut row = Terms::default();
            row.add(l.v(d), 1.0).add(l.v(s), -factor);
            ineq.push(&row.0, 0.0, ConstraintTag::DropMax { branch: b });
        }
    }

    for (c, cvt) in scenario.converters.iter().enumerate() {
        let (s, d) = qcqp.converter_buses(c);
        // power drawn into the converter at each terminal
        let draw_src = [(l.p_fwd(c), 1.0), (l.p_bwd(c), -cvt.eta_bwd())];
        let draw_dst = [(l.p_bwd(c), 1.0), (l.p_fwd(c), -cvt.eta_fwd())];

        for &(col, coeff) in &draw_src {
            balance_p[s].add(col, -coeff);
        }
        for &(col, coeff) in &draw_dst {
            balance_p[d].add(col, -coeff);
        }
        balance_q[s].add(l.q_src(c), -1.0);
        balance_q[d].add(l.q_dst(c), -1.0);

        for (side, cap, draw, q_col) in [
            (Side::Src, &cvt.cap_src, draw_src, l.q_src(c)),
            (Side::Dst, &cvt.cap_dst, draw_dst, l.q_dst(c)),
        ] {
            ineq.push(
                &draw,
                cap.p_max / base,
                ConstraintTag::ConverterPMax { converter: c, side },
            );
            let negated: Vec<(usize, f64)> = draw.iter().map(|&(col, v)| (col, -v)).collect();
            ineq.push(
                &negated,
                -cap.p_min / base,
                ConstraintTag::ConverterPMin { converter: c, side },
            );
            for (f, facet) in cap.facets.iter().enumerate() {
                let mut row = Terms::default();
                for &(col, v) in &draw {
                    row.add(col, facet.a_p * v);
                }
                row.add(q_col, facet.a_q);
                ineq.push(
                    &row.0,
                    facet.b / base,
                    ConstraintTag::ConverterFacet {
                        converter: c,
                        side,
                        facet: f,
                    },
                );
            }
        }
    }

    for (i, inj) in scenario.injectors.iter().enumerate() {
        let bus = qcqp.injector_bus(i);
        balance_p[bus].add(l.s_p(i), 1.0);
        balance_q[bus].add(l.s_q(i), 1.0);

        for (f, facet) in inj.cap.facets.iter().enumerate() {
            ineq.push(
                &[(l.s_p(i), facet.a_p), (l.s_q(i), facet.a_q)],
                facet.b / base,
                ConstraintTag::InjectorFacet {
                    injector: i,
                    facet: f,
                },
            );
        }
    }

    let mut c = vec![0.0; n];
    for (cost_idx, var) in qcqp.cost_vars().iter().enumerate() {
        let inj = &scenario.injectors[var.injector];
        let (function, power_col) = match var.kind {
            PowerKind::Active => (inj.cost_p.as_ref(), l.s_p(var.injector)),
            PowerKind::Reactive => (inj.cost_q.as_ref(), l.s_q(var.injector)),
        };
        let Some(function) = function else { continue };
        c[l.z(cost_idx)] = 1.0;
        // z >= slope * (base * s) + intercept
        for (seg_idx, seg) in function.segments().enumerate() {
            ineq.push(
                &[(power_col, seg.slope * base), (l.z(cost_idx), -1.0)],
                -seg.intercept,
                ConstraintTag::CostSegment {
                    cost: cost_idx,
                    segment: seg_idx,
                },
            );
        }
    }

    // loss price × (injected − load) active power
    let mut constant = 0.0;
    if scenario.loss_price != 0.0 {
        for i in 0..l.num_injectors {
            c[l.s_p(i)] += scenario.loss_price * base;
        }
        constant -= scenario.loss_price * scenario.total_load().0.value();
    }

    let mut eq = RowSet::new();
    for (idx, (p_row, q_row)) in balance_p.into_iter().zip(balance_q).enumerate() {
        let load = scenario.buses[idx].load / base;
        eq.push(
            &p_row.0,
            load.re,
            BalanceTag {
                bus: idx,
                kind: PowerKind::Active,
            },
        );
        eq.push(
            &q_row.0,
            load.im,
            BalanceTag {
                bus: idx,
                kind: PowerKind::Reactive,
            },
        );
    }

    let (lower, upper) = bounds(qcqp);
    let (a_eq, b_eq, eq_tags) = eq.into_parts(n);
    let (a_ineq, b_ineq, ineq_tags) = ineq.into_parts(n);

    tracing::debug!(
        num_vars = n,
        num_eq = b_eq.len(),
        num_ineq = b_ineq.len(),
        "vectorized QCQP"
    );

    Vectorization {
        c,
        constant,
        a_eq,
        b_eq,
        a_ineq,
        b_ineq,
        lower,
        upper,
        eq_tags,
        ineq_tags,
    }
}

fn bounds(qcqp: &Qcqp) -> (Vec<f64>, Vec<f64>) {
    let scenario = qcqp.scenario();
    let l = qcqp.layout();
    let base = scenario.base_mva;
    let mut lower = vec![f64::NAN; l.num_vars()];
    let mut upper = vec![f64::NAN; l.num_vars()];

    for (idx, bus) in scenario.buses.iter().enumerate() {
        lower[l.v(idx)] = bus.v_min.squared();
        upper[l.v(idx)] = bus.v_max.squared();
    }
    for (c, cvt) in scenario.converters.iter().enumerate() {
        lower[l.p_fwd(c)] = 0.0;
        lower[l.p_bwd(c)] = 0.0;
        lower[l.q_src(c)] = cvt.cap_src.q_min / base;
        upper[l.q_src(c)] = cvt.cap_src.q_max / base;
        lower[l.q_dst(c)] = cvt.cap_dst.q_min / base;
        upper[l.q_dst(c)] = cvt.cap_dst.q_max / base;
    }
    for (i, inj) in scenario.injectors.iter().enumerate() {
        lower[l.s_p(i)] = inj.cap.p_min / base;
        upper[l.s_p(i)] = inj.cap.p_max / base;
        lower[l.s_q(i)] = inj.cap.q_min / base;
        upper[l.s_q(i)] = inj.cap.q_max / base;
    }
    (lower, upper)
}

impl Qcqp {
    /// See [`get_vectorization`].
    pub fn get_vectorization(&self) -> Vectorization {
        get_vectorization(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_core::{test_utils, MegavoltAmperes};

    fn dense_row(m: &CsMat<f64>, row: usize) -> Vec<f64> {
        let mut out = vec![0.0; m.cols()];
        if let Some(vec) = m.outer_view(row) {
            for (col, &value) in vec.iter() {
                out[col] = value;
            }
        }
        out
    }

    #[test]
    fn test_two_bus_balance_rows() {
        let qcqp = Qcqp::from_scenario(&test_utils::two_bus_scenario()).unwrap();
        let vec = qcqp.get_vectorization();
        let l = qcqp.layout();

        assert_eq!(vec.num_eq(), 4);
        assert_eq!(vec.b_eq, vec![0.0, 0.0, 0.01, 0.0]);

        // branch 0 → 1 is reversed relative to edge (1, 0): σ = -1
        // P_0: s_p - Re(conj(y_sd) V_01) = s_p + 10·I
        let p0 = dense_row(&vec.a_eq, 0);
        assert_eq!(p0[l.s_p(0)], 1.0);
        assert!((p0[l.im(0)] - 10.0).abs() < 1e-12);
        assert!(p0[l.re(0)].abs() < 1e-12);

        // Q_0: s_q - 10 V_00 + 10 R
        let q0 = dense_row(&vec.a_eq, 1);
        assert!((q0[l.v(0)] + 10.0).abs() < 1e-12);
        assert!((q0[l.re(0)] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_bus_draw_matches_phase_angle() {
        let qcqp = Qcqp::from_scenario(&test_utils::two_bus_scenario()).unwrap();
        let vec = qcqp.get_vectorization();
        let l = qcqp.layout();

        // v_0 = 1, v_1 = 1 ∠ -0.001 rad; V_10 = v_1 conj(v_0)
        let v1 = Complex64::from_polar(1.0, -0.001);
        let mut x = vec![0.0; l.num_vars()];
        x[l.v(0)] = 1.0;
        x[l.v(1)] = 1.0;
        x[l.re(0)] = v1.re;
        x[l.im(0)] = v1.im;

        let p1 = dense_row(&vec.a_eq, 2);
        let lhs: f64 = p1.iter().zip(&x).map(|(a, x)| a * x).sum();
        assert!((lhs - 10.0 * v1.im.abs()).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_use_nan_for_free_variables() {
        let qcqp = Qcqp::from_scenario(&test_utils::hybrid_scenario()).unwrap();
        let vec = qcqp.get_vectorization();
        let l = qcqp.layout();

        assert!((vec.lower[l.v(0)] - 0.81).abs() < 1e-12);
        assert!((vec.upper[l.v(2)] - 1.1025).abs() < 1e-12);
        assert!(vec.lower[l.re(0)].is_nan() && vec.upper[l.im(1)].is_nan());
        assert_eq!(vec.lower[l.p_fwd(0)], 0.0);
        assert!(vec.upper[l.p_fwd(0)].is_nan());
        assert_eq!((vec.lower[l.q_dst(0)], vec.upper[l.q_dst(0)]), (0.0, 0.0));
        assert_eq!(vec.upper[l.s_p(1)], 0.2);
        assert!(vec.lower[l.z(0)].is_nan());
    }

    #[test]
    fn test_rating_adds_current_rows() {
        let mut scenario = test_utils::two_bus_scenario();
        scenario.branches[0].rating = Some(MegavoltAmperes(50.0));
        let qcqp = Qcqp::from_scenario(&scenario).unwrap();
        let vec = qcqp.get_vectorization();

        let tags: Vec<_> = vec.ineq_tags.iter().take(2).copied().collect();
        assert_eq!(
            tags,
            vec![
                ConstraintTag::CurrentSrc { branch: 0 },
                ConstraintTag::CurrentDst { branch: 0 }
            ]
        );
        assert!((vec.b_ineq[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_epigraph_rows_and_objective() {
        let qcqp = Qcqp::from_scenario(&test_utils::three_bus_meshed()).unwrap();
        let vec = qcqp.get_vectorization();
        let l = qcqp.layout();

        let segments = vec
            .ineq_tags
            .iter()
            .filter(|t| matches!(t, ConstraintTag::CostSegment { .. }))
            .count();
        // one linear segment plus two convex pieces
        assert_eq!(segments, 3);
        assert_eq!(vec.c[l.z(0)], 1.0);
        assert_eq!(vec.c[l.z(1)], 1.0);
        assert_eq!(vec.constant, 0.0);
    }

    #[test]
    fn test_loss_price_shifts_objective() {
        let mut scenario = test_utils::two_bus_scenario();
        scenario.loss_price = 5.0;
        let qcqp = Qcqp::from_scenario(&scenario).unwrap();
        let vec = qcqp.get_vectorization();

        assert_eq!(vec.c[qcqp.layout().s_p(0)], 500.0);
        assert_eq!(vec.constant, -5.0);
    }

    #[test]
    fn test_converter_draw_rows() {
        let qcqp = Qcqp::from_scenario(&test_utils::hybrid_scenario()).unwrap();
        let vec = qcqp.get_vectorization();
        let l = qcqp.layout();

        // converter 0 draws p_fwd - 0.98 p_bwd from bus 1
        let p1 = dense_row(&vec.a_eq, 2);
        assert_eq!(p1[l.p_fwd(0)], -1.0);
        assert!((p1[l.p_bwd(0)] - 0.98).abs() < 1e-12);

        // and delivers 0.98 p_fwd - p_bwd into bus 2
        let p2 = dense_row(&vec.a_eq, 4);
        assert!((p2[l.p_fwd(0)] - 0.98).abs() < 1e-12);
        assert_eq!(p2[l.p_bwd(0)], -1.0);
    }
}
