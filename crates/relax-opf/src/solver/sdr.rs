//! Semidefinite relaxation.
//!
//! The Hermitian voltage matrix `V` (dimension `n`) is PSD iff the real
//! symmetric matrix
//!
//! ```text
//! M = [ Re V  −Im V ]
//!     [ Im V   Re V ]
//! ```
//!
//! is PSD. One auxiliary variable per upper-triangle entry of `M` carries
//! the cone; equality rows tie the tracked entries of `V` to it. Untracked
//! entries of `M` stay free.

use std::sync::Arc;

use super::{default_backend, RelaxationSolver};
use crate::backend::{triangle_index, ConeConstraint, ConicBackend, ConicProgram};
use crate::qcqp::Qcqp;
use crate::result::RelaxationKind;
use crate::settings::SolverSettings;

/// SDR solver. Needs a backend with semidefinite cones (Clarabel with the
/// `sdp` feature).
pub struct SdrSolver {
    backend: Arc<dyn ConicBackend>,
    settings: SolverSettings,
}

impl Default for SdrSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SdrSolver {
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

impl RelaxationSolver for SdrSolver {
    fn kind(&self) -> RelaxationKind {
        RelaxationKind::Sdr
    }

    fn backend(&self) -> &dyn ConicBackend {
        self.backend.as_ref()
    }

    fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn relax(&self, qcqp: &Qcqp, program: &mut ConicProgram) {
        let l = qcqp.layout();
        let n = qcqp.dim_v();
        let dim = 2 * n;
        let aux = program.add_variables(dim * (dim + 1) / 2);
        let m = |i: usize, j: usize| aux.start + triangle_index(i, j);

        for bus in 0..n {
            program.push_eq(vec![(m(bus, bus), 1.0), (l.v(bus), -1.0)], 0.0);
            program.push_eq(vec![(m(n + bus, n + bus), 1.0), (l.v(bus), -1.0)], 0.0);
        }
        // V[a, b] = R + jI with a > b
        for (k, &(a, b)) in qcqp.edges().iter().enumerate() {
            program.push_eq(vec![(m(b, a), 1.0), (l.re(k), -1.0)], 0.0);
            program.push_eq(vec![(m(n + b, n + a), 1.0), (l.re(k), -1.0)], 0.0);
            // top-right block is −Im V: −Im V[b, a] = I, −Im V[a, b] = −I
            program.push_eq(vec![(m(b, n + a), 1.0), (l.im(k), -1.0)], 0.0);
            program.push_eq(vec![(m(a, n + b), 1.0), (l.im(k), 1.0)], 0.0);
        }

        program.push_cone(ConeConstraint::PsdTriangle {
            dim,
            entries: aux.map(|var| vec![(var, 1.0)]).collect(),
        });
    }
}
