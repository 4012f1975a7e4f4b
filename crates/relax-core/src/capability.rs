//! Capability regions of injectors and converter terminals.

use serde::{Deserialize, Serialize};

/// Half-plane `a_p * p + a_q * q <= b` in MW/Mvar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfPlane {
    pub a_p: f64,
    pub a_q: f64,
    pub b: f64,
}

impl HalfPlane {
    pub fn new(a_p: f64, a_q: f64, b: f64) -> Self {
        Self { a_p, a_q, b }
    }

    pub fn contains(&self, p: f64, q: f64) -> bool {
        self.a_p * p + self.a_q * q <= self.b
    }
}

/// Feasible `(p, q)` region: a box, optionally cut by half-planes.
///
/// For injectors `p`/`q` is the power injected into the bus; for converter
/// terminals it is the power drawn from the bus into the converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapRegion {
    /// MW
    pub p_min: f64,
    /// MW
    pub p_max: f64,
    /// Mvar
    pub q_min: f64,
    /// Mvar
    pub q_max: f64,
    #[serde(default)]
    pub facets: Vec<HalfPlane>,
}

impl Default for CapRegion {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

impl CapRegion {
    pub fn new(p_min: f64, p_max: f64, q_min: f64, q_max: f64) -> Self {
        Self {
            p_min,
            p_max,
            q_min,
            q_max,
            facets: Vec::new(),
        }
    }

    /// Region with active-power limits only; reactive power fixed at zero.
    pub fn active_only(p_min: f64, p_max: f64) -> Self {
        Self::new(p_min, p_max, 0.0, 0.0)
    }

    pub fn with_facet(mut self, facet: HalfPlane) -> Self {
        self.facets.push(facet);
        self
    }

    /// Box bounds are NaN-free and ordered (a degenerate box is still non-empty).
    pub fn has_valid_box(&self) -> bool {
        let bounds = [self.p_min, self.p_max, self.q_min, self.q_max];
        bounds.iter().all(|b| !b.is_nan()) && self.p_min <= self.p_max && self.q_min <= self.q_max
    }

    /// Whether reactive power can be nonzero.
    pub fn offers_reactive_power(&self) -> bool {
        self.q_min != 0.0 || self.q_max != 0.0
    }

    pub fn contains(&self, p: f64, q: f64) -> bool {
        (self.p_min..=self.p_max).contains(&p)
            && (self.q_min..=self.q_max).contains(&q)
            && self.facets.iter().all(|f| f.contains(p, q))
    }
}
