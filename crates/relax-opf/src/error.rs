use relax_core::ScenarioError;
use thiserror::Error;

/// Errors raised before a relaxation reaches the conic backend.
///
/// Backend failures are not errors: they are reported through
/// [`SolverStatus`](crate::SolverStatus) on the result.
#[derive(Debug, Clone, Error)]
pub enum OpfError {
    /// Scenario violates an integrity rule (fatal, never retried)
    #[error(transparent)]
    ScenarioInvalid(#[from] ScenarioError),

    /// Scenario cannot be turned into a QCQP
    #[error("QCQP build error: {0}")]
    Build(String),

    /// A flat vector does not match the QCQP layout
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    Dimension {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Solver settings could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for OpfError {
    fn from(err: toml::de::Error) -> Self {
        OpfError::Config(err.to_string())
    }
}

impl From<std::io::Error> for OpfError {
    fn from(err: std::io::Error) -> Self {
        OpfError::Config(err.to_string())
    }
}

pub type OpfResult<T> = Result<T, OpfError>;
