//! # relax-core: Scenario Model for OPF Convex Relaxations
//!
//! Provides the tabular scenario model (buses, branches, converters,
//! injectors), the topology helpers the relaxations depend on, and the
//! verifier that gates every solve.
//!
//! ## Scenario Tables
//!
//! A [`Scenario`] holds four tables whose rows are identified by newtype IDs:
//!
//! | Table | Row type | Key fields |
//! |-------|----------|------------|
//! | buses | [`Bus`] | AC/DC type, reference flag, voltage bounds, shunt, load |
//! | branches | [`Branch`] | `z_bar`, shunts `y_src`/`y_dst`, ratios `rho_src`/`rho_dst`, limits |
//! | converters | [`Converter`] | loss factors, capability region per terminal |
//! | injectors | [`Injector`] | capability region, piecewise-linear costs |
//!
//! Rows reference buses by [`BusId`]; the relaxations work on row indices,
//! which [`Scenario::bus_index_map`] provides.
//!
//! ## Verification
//!
//! - [`verify_scenario`] rejects scenarios that violate integrity rules with
//!   [`ScenarioError::Invalid`], listing every offending row.
//! - [`verify_hybrid_architecture`] checks the sufficient conditions for
//!   exactness of the relaxations and only reports a boolean.
//!
//! ```
//! use relax_core::{test_utils, verify_scenario, Diagnostics};
//!
//! let scenario = test_utils::two_bus_scenario();
//! let mut log = Diagnostics::new();
//! assert!(verify_scenario(&scenario, &mut log).is_ok());
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Issue collector used as the verification log
//! - [`graph_utils`] - Subgrids, islands, canonical edges, cycle detection
//! - [`verify`] - Integrity and exactness checks
//! - [`units`] - Unit newtypes for table columns

use serde::{Deserialize, Serialize};

pub mod capability;
pub mod cost;
pub mod diagnostics;
pub mod error;
pub mod graph_utils;
pub mod scenario;
pub mod test_utils;
pub mod units;
pub mod verify;

pub use capability::{CapRegion, HalfPlane};
pub use cost::{PwlFunction, Segment};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{ScenarioError, ScenarioResult};
pub use graph_utils::{BranchEdge, EdgeSet};
pub use scenario::{
    Branch, BranchAdmittance, BranchType, Bus, BusType, Converter, Injector, Scenario,
    DEFAULT_BASE_MVA,
};
pub use units::{Degrees, Kilovolts, MegavoltAmperes, Megavars, Megawatts, PerUnit, Radians};
pub use verify::{verify_hybrid_architecture, verify_scenario};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConverterId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InjectorId(usize);

macro_rules! impl_id {
    ($type:ident, $label:literal) => {
        impl $type {
            #[inline]
            pub fn new(value: usize) -> Self {
                $type(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} {}", $label, self.0)
            }
        }
    };
}

impl_id!(BusId, "Bus");
impl_id!(BranchId, "Branch");
impl_id!(ConverterId, "Converter");
impl_id!(InjectorId, "Injector");
