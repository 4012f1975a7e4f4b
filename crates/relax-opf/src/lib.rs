//! # relax-opf: Convex Relaxations of Optimal Power Flow
//!
//! Solves the OPF of a verified [`relax_core::Scenario`] through its
//! second-order cone (SOCR) or semidefinite (SDR) relaxation, recovers bus
//! voltages from the relaxed voltage matrix, and reports marginal prices.
//!
//! ## Pipeline
//!
//! 1. [`Qcqp::from_scenario`] maps the scenario onto a QCQP over the sparse
//!    Hermitian voltage matrix, converter flows, injections and cost
//!    epigraph variables.
//! 2. [`get_vectorization`] writes the linear part of that QCQP (balance
//!    rows, flow limits, capability facets, cost segments, bounds) in
//!    sparse matrix form.
//! 3. A [`RelaxationSolver`] adds its cones and hands the resulting conic
//!    program to a [`ConicBackend`] (Clarabel by default).
//! 4. The result is a [`QcqpResult`]: status, objective, the relaxed
//!    matrix, its rank-1 approximation with the reconstruction error, and
//!    the duals of every constraint group.
//!
//! [`calc_opf`] runs the whole pipeline and converts the result to
//! physical units.
//!
//! ```no_run
//! use relax_core::test_utils;
//! use relax_opf::{calc_opf, SolverSettings, SolverStatus};
//!
//! let scenario = test_utils::two_bus_scenario();
//! let solution = calc_opf(&scenario, &SolverSettings::default(), None)?;
//! assert_eq!(solution.status(), SolverStatus::Solved);
//! # Ok::<(), relax_opf::OpfError>(())
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): [`solve_many`] solves on the rayon thread pool
//! - `sdp`: semidefinite cones in Clarabel, required by [`SdrSolver`]
//! - `sdp-openblas`, `sdp-netlib`, `sdp-accelerate`: BLAS/LAPACK source for `sdp`

pub mod backend;
pub mod error;
pub mod opf;
pub mod qcqp;
pub mod recovery;
pub mod result;
pub mod settings;
pub mod solver;

pub use backend::{BackendError, ClarabelBackend, ConicBackend, ConicProgram, ConicSolution};
pub use error::{OpfError, OpfResult};
pub use opf::{calc_opf, OpfSolution};
pub use qcqp::{get_vectorization, ConstraintTag, Qcqp, SparseHermitian, Vectorization};
pub use recovery::rank1_approximation;
pub use result::{QcqpDuals, QcqpPoint, QcqpResult, RelaxationKind, SolverStatus};
pub use settings::SolverSettings;
pub use solver::{
    select_relaxation, solve_many, solver_for, RelaxationSolver, SdrSolver, SocrSolver,
};
