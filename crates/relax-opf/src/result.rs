//! Outcome of one relaxation solve.

use std::fmt;
use std::time::Duration;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::qcqp::{BoundDuals, ConstraintTag, ConverterFlow, SparseHermitian};

/// Convex relaxation of the voltage-matrix rank constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelaxationKind {
    /// Second-order cone per edge (2×2 principal minors)
    Socr,
    /// One semidefinite cone over the whole voltage matrix
    Sdr,
}

impl fmt::Display for RelaxationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaxationKind::Socr => write!(f, "SOCR"),
            RelaxationKind::Sdr => write!(f, "SDR"),
        }
    }
}

/// Status of a solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    Solved,
    /// Terminated early; the point is populated but the optimal value is
    /// unreliable
    Inaccurate,
    /// The relaxation, and hence the original problem, is infeasible
    Infeasible,
    Failed,
}

impl SolverStatus {
    /// Map a backend-native status string.
    ///
    /// Matching ignores case and underscores, so `"AlmostSolved"`,
    /// `"almost_solved"` and `"ALMOST_SOLVED"` are the same status.
    pub fn from_backend_status(status: &str) -> Self {
        let normalized: String = status
            .chars()
            .filter(|c| *c != '_' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "solved" | "optimal" => SolverStatus::Solved,
            "almostsolved" | "optimalinaccurate" | "maxiterations" | "maxtime"
            | "iterationlimit" | "timelimit" => SolverStatus::Inaccurate,
            "primalinfeasible" | "almostprimalinfeasible" | "infeasible" => {
                SolverStatus::Infeasible
            }
            _ => SolverStatus::Failed,
        }
    }

    /// Whether the result carries a primal/dual point.
    pub fn has_point(&self) -> bool {
        matches!(self, SolverStatus::Solved | SolverStatus::Inaccurate)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverStatus::Solved => "SOLVED",
            SolverStatus::Inaccurate => "INACCURATE",
            SolverStatus::Infeasible => "INFEASIBLE",
            SolverStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Recovered primal point in p.u.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcqpPoint {
    /// Bus voltage phasors from the rank-1 approximation
    pub v: Vec<Complex64>,
    pub f: Vec<ConverterFlow>,
    /// Injections `p + jq`
    pub s: Vec<Complex64>,
    pub z: Vec<f64>,
}

/// Dual of one inequality row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaggedDual {
    pub tag: ConstraintTag,
    /// Non-negative; zero for inactive rows
    pub value: f64,
}

/// Duals reshaped to constraint groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcqpDuals {
    /// Objective sensitivity to active load per bus, in $/h per p.u.
    pub balance_p: Vec<f64>,
    /// Objective sensitivity to reactive load per bus, in $/h per p.u.
    pub balance_q: Vec<f64>,
    pub inequality: Vec<TaggedDual>,
    pub bounds: BoundDuals,
}

/// Result of a relaxation solve. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcqpResult {
    pub relaxation: RelaxationKind,
    pub status: SolverStatus,
    pub solve_time: Duration,
    pub iterations: u32,
    /// Backend status text or failure message
    pub message: Option<String>,
    /// `cᵗx + c0` at the relaxed optimum
    pub optimal_value: Option<f64>,
    pub optimizer: Option<QcqpPoint>,
    /// Tracked voltage-matrix entries at the relaxed optimum
    pub relaxed: Option<SparseHermitian>,
    /// Mean squared deviation of the rank-1 matrix from the relaxed entries
    pub reconstruction_mse: Option<f64>,
    pub duals: Option<QcqpDuals>,
}

impl QcqpResult {
    /// Result without a point, for statuses other than SOLVED/INACCURATE.
    pub fn without_point(
        relaxation: RelaxationKind,
        status: SolverStatus,
        solve_time: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            relaxation,
            status,
            solve_time,
            iterations: 0,
            message: Some(message.into()),
            optimal_value: None,
            optimizer: None,
            relaxed: None,
            reconstruction_mse: None,
            duals: None,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.status == SolverStatus::Solved
    }

    /// Whether the rank-1 point reproduces the relaxed entries within `tol`.
    pub fn is_physical(&self, tol: f64) -> bool {
        self.reconstruction_mse.is_some_and(|mse| mse <= tol)
    }
}

impl fmt::Display for QcqpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {:.3}s",
            self.relaxation,
            self.status,
            self.solve_time.as_secs_f64()
        )?;
        if let Some(value) = self.optimal_value {
            write!(f, ", objective {:.6}", value)?;
        }
        if let Some(mse) = self.reconstruction_mse {
            write!(f, ", reconstruction MSE {:.3e}", mse)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        use SolverStatus::*;
        let cases = [
            ("Solved", Solved),
            ("OPTIMAL", Solved),
            ("AlmostSolved", Inaccurate),
            ("optimal_inaccurate", Inaccurate),
            ("MaxIterations", Inaccurate),
            ("MaxTime", Inaccurate),
            ("PrimalInfeasible", Infeasible),
            ("AlmostPrimalInfeasible", Infeasible),
            ("DualInfeasible", Failed),
            ("NumericalError", Failed),
            ("InsufficientProgress", Failed),
            ("", Failed),
        ];
        for (text, expected) in cases {
            assert_eq!(SolverStatus::from_backend_status(text), expected, "{text}");
        }
    }

    #[test]
    fn test_only_solved_and_inaccurate_have_points() {
        assert!(SolverStatus::Solved.has_point());
        assert!(SolverStatus::Inaccurate.has_point());
        assert!(!SolverStatus::Infeasible.has_point());
        assert!(!SolverStatus::Failed.has_point());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&SolverStatus::Inaccurate).unwrap();
        assert_eq!(json, "\"INACCURATE\"");
    }

    #[test]
    fn test_failed_result_display() {
        let result = QcqpResult::without_point(
            RelaxationKind::Sdr,
            SolverStatus::Failed,
            Duration::from_millis(1500),
            "backend panicked",
        );
        assert_eq!(result.to_string(), "SDR FAILED in 1.500s");
        assert!(!result.is_physical(1.0));
    }
}
