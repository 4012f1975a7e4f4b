//! Clarabel interior-point backend.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½xᵗPx + qᵗx
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! Rows are laid out as: equalities (zero cone), then inequalities, finite
//! lower bounds and finite upper bounds (one nonnegative cone), then one
//! cone per [`ConeConstraint`]. For a cone over forms `f(x)` the rows are
//! `-f(x) + s = 0`, so `s = f(x) ∈ K`.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use super::{BackendError, ConeConstraint, ConicBackend, ConicProgram, ConicSolution};
use crate::settings::SolverSettings;

/// `DefaultSolver::new` returns the solver in 0.11 and a `Result` in later
/// releases; accept both.
trait SolverInit {
    fn into_solver(self) -> Result<DefaultSolver<f64>, String>;
}

impl SolverInit for DefaultSolver<f64> {
    fn into_solver(self) -> Result<DefaultSolver<f64>, String> {
        Ok(self)
    }
}

impl<E: std::fmt::Debug> SolverInit for Result<DefaultSolver<f64>, E> {
    fn into_solver(self) -> Result<DefaultSolver<f64>, String> {
        self.map_err(|e| format!("{:?}", e))
    }
}

/// Clarabel backend. Pure Rust, always available; semidefinite cones need
/// the `sdp` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

/// Column-wise accumulation of the constraint matrix `A` and `b`.
struct Assembly {
    columns: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
}

impl Assembly {
    fn new(num_vars: usize) -> Self {
        Self {
            columns: vec![Vec::new(); num_vars],
            rhs: Vec::new(),
        }
    }

    fn push_row(
        &mut self,
        form: &[(usize, f64)],
        scale: f64,
        rhs: f64,
    ) -> Result<(), BackendError> {
        let row = self.rhs.len();
        for &(col, value) in form {
            let column = self.columns.get_mut(col).ok_or_else(|| {
                BackendError::Failure(format!("row {row} references variable {col}"))
            })?;
            column.push((row, scale * value));
        }
        self.rhs.push(rhs);
        Ok(())
    }

    /// Sort each column by row and merge duplicate entries.
    fn into_csc(self) -> (CscMatrix<f64>, Vec<f64>) {
        let m = self.rhs.len();
        let n = self.columns.len();
        let mut col_ptr = Vec::with_capacity(n + 1);
        let mut row_idx = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        for mut column in self.columns {
            col_ptr.push(row_idx.len());
            column.sort_by_key(|&(r, _)| r);
            let start = row_idx.len();
            for (r, v) in column {
                if row_idx.len() > start && row_idx.last() == Some(&r) {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                } else {
                    row_idx.push(r);
                    values.push(v);
                }
            }
        }
        col_ptr.push(row_idx.len());

        (CscMatrix::new(m, n, col_ptr, row_idx, values), self.rhs)
    }
}

#[cfg(feature = "sdp")]
fn psd_cone(dim: usize) -> Result<SupportedConeT<f64>, BackendError> {
    Ok(SupportedConeT::PSDTriangleConeT(dim))
}

#[cfg(not(feature = "sdp"))]
fn psd_cone(_dim: usize) -> Result<SupportedConeT<f64>, BackendError> {
    Err(BackendError::Failure(
        "semidefinite cones require the `sdp` feature".into(),
    ))
}

fn triangle_scale(position: usize) -> f64 {
    // position k of the column-wise upper triangle is diagonal iff k + 1 is
    // a triangular number
    let j = ((((8 * position + 1) as f64).sqrt() - 1.0) / 2.0).floor() as usize;
    if j * (j + 1) / 2 + j == position {
        1.0
    } else {
        std::f64::consts::SQRT_2
    }
}

fn bound_rows(bounds: &[f64]) -> Vec<usize> {
    bounds
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_finite())
        .map(|(i, _)| i)
        .collect()
}

impl ConicBackend for ClarabelBackend {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn supports_semidefinite(&self) -> bool {
        cfg!(feature = "sdp")
    }

    fn solve(
        &self,
        program: &ConicProgram,
        settings: &SolverSettings,
    ) -> Result<ConicSolution, BackendError> {
        let n = program.num_vars();
        let lower_rows = bound_rows(&program.lower);
        let upper_rows = bound_rows(&program.upper);
        let m_eq = program.eq_rows.len();
        let m_ineq = program.ineq_rows.len();
        let m_nonneg = m_ineq + lower_rows.len() + upper_rows.len();

        let mut assembly = Assembly::new(n);
        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();

        for (row, &rhs) in program.eq_rows.iter().zip(&program.b_eq) {
            assembly.push_row(row, 1.0, rhs)?;
        }
        if m_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(m_eq));
        }

        for (row, &rhs) in program.ineq_rows.iter().zip(&program.b_ineq) {
            assembly.push_row(row, 1.0, rhs)?;
        }
        for &i in &lower_rows {
            assembly.push_row(&[(i, -1.0)], 1.0, -program.lower[i])?;
        }
        for &i in &upper_rows {
            assembly.push_row(&[(i, 1.0)], 1.0, program.upper[i])?;
        }
        if m_nonneg > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(m_nonneg));
        }

        for cone in &program.cones {
            match cone {
                ConeConstraint::SecondOrder(forms) => {
                    for form in forms {
                        assembly.push_row(form, -1.0, 0.0)?;
                    }
                    cones.push(SupportedConeT::SecondOrderConeT(forms.len()));
                }
                ConeConstraint::PsdTriangle { dim, entries } => {
                    let cone = psd_cone(*dim)?;
                    for (k, form) in entries.iter().enumerate() {
                        assembly.push_row(form, -triangle_scale(k), 0.0)?;
                    }
                    cones.push(cone);
                }
            }
        }

        let (a_mat, b) = assembly.into_csc();
        let p_mat = CscMatrix::new(n, n, vec![0; n + 1], Vec::new(), Vec::new());

        let clarabel_settings = DefaultSettingsBuilder::default()
            .verbose(settings.verbose)
            .max_iter(settings.max_iter)
            .time_limit(settings.time_limit_s.unwrap_or(f64::INFINITY))
            .tol_feas(settings.tol_feas)
            .tol_gap_abs(settings.tol_gap_abs)
            .tol_gap_rel(settings.tol_gap_rel)
            .tol_infeas_abs(settings.tol_infeas)
            .tol_infeas_rel(settings.tol_infeas)
            .equilibrate_enable(settings.equilibrate)
            .build()
            .map_err(|e| BackendError::Failure(format!("Clarabel settings error: {:?}", e)))?;

        tracing::debug!(
            num_vars = n,
            num_rows = b.len(),
            num_cones = cones.len(),
            "calling Clarabel"
        );

        let mut solver =
            DefaultSolver::new(&p_mat, &program.c, &a_mat, &b, &cones, clarabel_settings)
                .into_solver()
                .map_err(|e| {
                    BackendError::Failure(format!("Clarabel initialization failed: {e}"))
                })?;
        solver.solve();

        let sol = &solver.solution;
        let status = format!("{:?}", sol.status);
        if matches!(
            sol.status,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible
        ) {
            return Err(BackendError::Infeasible { status });
        }

        let z = &sol.z;
        if z.len() != b.len() || sol.x.len() != n {
            return Err(BackendError::Failure(format!(
                "Clarabel returned {} duals for {} rows",
                z.len(),
                b.len()
            )));
        }

        let mut offset = m_eq;
        let dual_eq = z[..m_eq].to_vec();
        let dual_ineq = z[offset..offset + m_ineq].to_vec();
        offset += m_ineq;

        let mut dual_lower = vec![0.0; n];
        for (k, &i) in lower_rows.iter().enumerate() {
            dual_lower[i] = z[offset + k];
        }
        offset += lower_rows.len();
        let mut dual_upper = vec![0.0; n];
        for (k, &i) in upper_rows.iter().enumerate() {
            dual_upper[i] = z[offset + k];
        }

        Ok(ConicSolution {
            status,
            x: sol.x.clone(),
            iterations: sol.iterations,
            dual_eq,
            dual_ineq,
            dual_lower,
            dual_upper,
        })
    }
}
