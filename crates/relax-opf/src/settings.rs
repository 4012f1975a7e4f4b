//! Numerical settings shared by both relaxations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OpfResult;

/// Tolerances and limits handed to the conic backend.
///
/// Defaults are tighter than the backend's own: OPF programs are often
/// badly scaled near network-short conditions (tiny series impedances).
///
/// ```
/// use relax_opf::SolverSettings;
///
/// let settings = SolverSettings::from_toml_str("max_iter = 50").unwrap();
/// assert_eq!(settings.max_iter, 50);
/// assert_eq!(settings.tol_feas, SolverSettings::default().tol_feas);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iter: u32,
    /// Wall-clock limit in seconds; `None` means unlimited
    pub time_limit_s: Option<f64>,
    pub tol_feas: f64,
    pub tol_gap_abs: f64,
    pub tol_gap_rel: f64,
    /// Absolute and relative infeasibility tolerance
    pub tol_infeas: f64,
    pub equilibrate: bool,
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 500,
            time_limit_s: None,
            tol_feas: 1e-9,
            tol_gap_abs: 1e-9,
            tol_gap_rel: 1e-9,
            tol_infeas: 1e-9,
            equilibrate: true,
            verbose: false,
        }
    }
}

impl SolverSettings {
    pub fn from_toml_str(source: &str) -> OpfResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load settings from a TOML file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> OpfResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "loaded solver settings");
        Ok(settings)
    }
}
