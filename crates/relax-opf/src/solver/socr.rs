//! Second-order cone relaxation.
//!
//! For every edge `k = (i, j)` the rotated cone `|V_ij|² <= V_ii V_jj` is
//! imposed as the standard cone
//!
//! ```text
//! V_ii + V_jj >= ‖(V_ii − V_jj, 2 Re V_ij, 2 Im V_ij)‖₂
//! ```
//!
//! i.e. every 2×2 principal minor of the voltage matrix on an edge is
//! positive semidefinite.

use std::sync::Arc;

use super::{default_backend, RelaxationSolver};
use crate::backend::{ConeConstraint, ConicBackend, ConicProgram};
use crate::qcqp::Qcqp;
use crate::result::RelaxationKind;
use crate::settings::SolverSettings;

/// SOCR solver.
pub struct SocrSolver {
    backend: Arc<dyn ConicBackend>,
    settings: SolverSettings,
}

impl Default for SocrSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SocrSolver {
    pub fn new() -> Self {
        Self {
            backend: default_backend(),
            settings: SolverSettings::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ConicBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl RelaxationSolver for SocrSolver {
    fn kind(&self) -> RelaxationKind {
        RelaxationKind::Socr
    }

    fn backend(&self) -> &dyn ConicBackend {
        self.backend.as_ref()
    }

    fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn relax(&self, qcqp: &Qcqp, program: &mut ConicProgram) {
        let l = qcqp.layout();
        for (k, &(i, j)) in qcqp.edges().iter().enumerate() {
            program.push_cone(ConeConstraint::SecondOrder(vec![
                vec![(l.v(i), 1.0), (l.v(j), 1.0)],
                vec![(l.v(i), 1.0), (l.v(j), -1.0)],
                vec![(l.re(k), 2.0)],
                vec![(l.im(k), 2.0)],
            ]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_core::test_utils;

    #[test]
    fn test_one_cone_per_edge() {
        let qcqp = Qcqp::from_scenario(&test_utils::three_bus_meshed()).unwrap();
        let vectorization = qcqp.get_vectorization();
        let mut program = ConicProgram::from_vectorization(&vectorization);
        SocrSolver::new().relax(&qcqp, &mut program);

        assert_eq!(program.cones.len(), qcqp.num_edges());
        assert!(program.cones.iter().all(|c| c.len() == 4));
        assert!(!program.has_semidefinite_cones());
        // the relaxation adds no variables
        assert_eq!(program.num_vars(), qcqp.num_vars());
    }
}
