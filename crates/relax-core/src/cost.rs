//! Piecewise-linear cost functions for injectors.

use serde::{Deserialize, Serialize};

/// Slopes may decrease by at most this much before a function counts as non-convex.
const CONVEXITY_TOLERANCE: f64 = 1e-9;

/// Piecewise-linear cost function given by `(power, cost)` breakpoints.
///
/// Power is in MW (or Mvar for reactive-power costs), cost in $/h. The
/// function is extended linearly beyond the outermost breakpoints, so for a
/// convex function the value is the maximum over all segment lines. That is
/// exactly what the epigraph formulation in the QCQP enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwlFunction {
    points: Vec<(f64, f64)>,
}

/// One linear piece `cost = slope * power + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub slope: f64,
    pub intercept: f64,
}

impl PwlFunction {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Linear cost with constant marginal cost ($/MWh) over `[p_min, p_max]`.
    pub fn linear(marginal_cost: f64, p_min: f64, p_max: f64) -> Self {
        Self::new(vec![
            (p_min, marginal_cost * p_min),
            (p_max, marginal_cost * p_max),
        ])
    }

    /// Constant cost, independent of the dispatch.
    pub fn constant(cost: f64) -> Self {
        Self::new(vec![(0.0, cost)])
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Breakpoints are finite and strictly increasing in power.
    pub fn is_well_formed(&self) -> bool {
        !self.points.is_empty()
            && self
                .points
                .iter()
                .all(|(p, c)| p.is_finite() && c.is_finite())
            && self.points.windows(2).all(|w| w[0].0 < w[1].0)
    }

    /// Slopes are non-decreasing (within tolerance).
    pub fn is_convex(&self) -> bool {
        if !self.is_well_formed() {
            return false;
        }
        let slopes: Vec<f64> = self.segments().map(|s| s.slope).collect();
        slopes
            .windows(2)
            .all(|w| w[1] >= w[0] - CONVEXITY_TOLERANCE * w[0].abs().max(1.0))
    }

    /// Linear pieces between consecutive breakpoints. A single breakpoint
    /// yields one flat piece at its cost.
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        let single = if self.points.len() == 1 {
            Some(Segment {
                slope: 0.0,
                intercept: self.points[0].1,
            })
        } else {
            None
        };
        let pieces = self.points.windows(2).map(|w| {
            let (p0, c0) = w[0];
            let (p1, c1) = w[1];
            let slope = (c1 - c0) / (p1 - p0);
            Segment {
                slope,
                intercept: c0 - slope * p0,
            }
        });
        single.into_iter().chain(pieces)
    }

    /// Cost ($/h) at the given power, as the maximum over segment lines.
    pub fn evaluate(&self, power: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.segments()
            .map(|s| s.slope * power + s.intercept)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Marginal cost ($/MWh) at the given power: slope of the active segment.
    pub fn marginal_cost(&self, power: f64) -> f64 {
        let mut best: Option<Segment> = None;
        for seg in self.segments() {
            let value = seg.slope * power + seg.intercept;
            match best {
                Some(b) if b.slope * power + b.intercept >= value => {}
                _ => best = Some(seg),
            }
        }
        best.map(|s| s.slope).unwrap_or(0.0)
    }
}
