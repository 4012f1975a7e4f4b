//! Boundary to the external conic solver.
//!
//! A [`ConicProgram`] is backend-neutral: one real decision vector, linear
//! equality and inequality rows, NaN-aware bounds, and cone constraints over
//! linear forms of `x`. Any [`ConicBackend`] accepting it is interchangeable.

mod clarabel;

pub use self::clarabel::ClarabelBackend;

use std::ops::Range;

use sprs::CsMat;
use thiserror::Error;

use crate::qcqp::Vectorization;
use crate::settings::SolverSettings;

/// Sparse linear form `Σ coeff · x[col]`.
pub type LinearForm = Vec<(usize, f64)>;

/// Cone membership of a vector of linear forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ConeConstraint {
    /// `(t, u_1, …, u_k)` with `t >= ‖u‖₂`
    SecondOrder(Vec<LinearForm>),
    /// Symmetric `dim × dim` matrix, positive semidefinite. `entries` hold
    /// the upper triangle column by column, unscaled:
    /// `(0,0), (0,1), (1,1), (0,2), …`
    PsdTriangle { dim: usize, entries: Vec<LinearForm> },
}

impl ConeConstraint {
    pub fn is_semidefinite(&self) -> bool {
        matches!(self, ConeConstraint::PsdTriangle { .. })
    }

    /// Number of scalar rows the cone occupies.
    pub fn len(&self) -> usize {
        match self {
            ConeConstraint::SecondOrder(forms) => forms.len(),
            ConeConstraint::PsdTriangle { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Position of `(i, j)`, `i <= j`, in a column-wise upper triangle.
pub fn triangle_index(i: usize, j: usize) -> usize {
    let (i, j) = if i <= j { (i, j) } else { (j, i) };
    j * (j + 1) / 2 + i
}

/// `minimize cᵗx` subject to linear rows, bounds and cones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConicProgram {
    pub c: Vec<f64>,
    pub eq_rows: Vec<LinearForm>,
    pub b_eq: Vec<f64>,
    /// Rows `a x <= b`
    pub ineq_rows: Vec<LinearForm>,
    pub b_ineq: Vec<f64>,
    /// `NaN` for no bound
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub cones: Vec<ConeConstraint>,
}

fn csr_rows(matrix: &CsMat<f64>) -> Vec<LinearForm> {
    matrix
        .outer_iterator()
        .map(|row| row.iter().map(|(col, &value)| (col, value)).collect())
        .collect()
}

impl ConicProgram {
    pub fn from_vectorization(vectorization: &Vectorization) -> Self {
        Self {
            c: vectorization.c.clone(),
            eq_rows: csr_rows(&vectorization.a_eq),
            b_eq: vectorization.b_eq.clone(),
            ineq_rows: csr_rows(&vectorization.a_ineq),
            b_ineq: vectorization.b_ineq.clone(),
            lower: vectorization.lower.clone(),
            upper: vectorization.upper.clone(),
            cones: Vec::new(),
        }
    }

    pub fn num_vars(&self) -> usize {
        self.c.len()
    }

    /// Append free auxiliary variables with zero cost.
    pub fn add_variables(&mut self, count: usize) -> Range<usize> {
        let start = self.c.len();
        self.c.resize(start + count, 0.0);
        self.lower.resize(start + count, f64::NAN);
        self.upper.resize(start + count, f64::NAN);
        start..start + count
    }

    pub fn push_eq(&mut self, row: LinearForm, rhs: f64) {
        self.eq_rows.push(row);
        self.b_eq.push(rhs);
    }

    pub fn push_cone(&mut self, cone: ConeConstraint) {
        self.cones.push(cone);
    }

    pub fn has_semidefinite_cones(&self) -> bool {
        self.cones.iter().any(ConeConstraint::is_semidefinite)
    }
}

/// Primal point and duals returned by a backend.
///
/// Dual signs follow the Lagrangian `cᵗx + λᵗ(Ax − b)`: inequality and bound
/// duals are non-negative, and a bound without a finite limit has dual zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConicSolution {
    /// Backend-native status text
    pub status: String,
    pub x: Vec<f64>,
    pub iterations: u32,
    pub dual_eq: Vec<f64>,
    pub dual_ineq: Vec<f64>,
    pub dual_lower: Vec<f64>,
    pub dual_upper: Vec<f64>,
}

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend certified primal infeasibility
    #[error("problem is infeasible ({status})")]
    Infeasible { status: String },

    #[error("backend failure: {0}")]
    Failure(String),
}

/// A conic solver.
pub trait ConicBackend: Send + Sync {
    /// Unique identifier (e.g., "clarabel")
    fn id(&self) -> &str;

    /// Whether positive-semidefinite cones can be handled
    fn supports_semidefinite(&self) -> bool;

    fn solve(
        &self,
        program: &ConicProgram,
        settings: &SolverSettings,
    ) -> Result<ConicSolution, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_are_object_safe() {
        fn _accepts_backend(_b: &dyn ConicBackend) {}
    }

    #[test]
    fn test_triangle_index_is_column_major_upper() {
        assert_eq!(triangle_index(0, 0), 0);
        assert_eq!(triangle_index(0, 1), 1);
        assert_eq!(triangle_index(1, 1), 2);
        assert_eq!(triangle_index(0, 2), 3);
        assert_eq!(triangle_index(2, 1), 4);
        assert_eq!(triangle_index(2, 2), 5);
    }

    #[test]
    fn test_add_variables_extends_bounds() {
        let mut program = ConicProgram {
            c: vec![1.0, 2.0],
            lower: vec![0.0, 0.0],
            upper: vec![1.0, 1.0],
            ..Default::default()
        };
        let range = program.add_variables(3);
        assert_eq!(range, 2..5);
        assert_eq!(program.num_vars(), 5);
        assert!(program.lower[4].is_nan());
        assert_eq!(program.c[3], 0.0);
    }
}
