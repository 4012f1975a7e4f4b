//! Error types for scenario handling.

use crate::diagnostics::DiagnosticIssue;
use thiserror::Error;

/// Errors raised while validating or interpreting a scenario.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
    /// One or more integrity rules are violated. The issues name the
    /// offending rows; none of them are repaired.
    #[error("Scenario invalid: {}", summarize(.issues))]
    Invalid { issues: Vec<DiagnosticIssue> },

    /// A row references a bus that does not exist.
    #[error("Unknown bus {bus} referenced by {entity}")]
    UnknownBus { entity: String, bus: usize },
}

impl ScenarioError {
    /// Offending entities, in the order they were found.
    pub fn entities(&self) -> Vec<&str> {
        match self {
            ScenarioError::Invalid { issues } => {
                issues.iter().filter_map(|i| i.entity.as_deref()).collect()
            }
            ScenarioError::UnknownBus { entity, .. } => vec![entity.as_str()],
        }
    }
}

fn summarize(issues: &[DiagnosticIssue]) -> String {
    match issues {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

/// Convenience type alias for Results using ScenarioError.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;

    #[test]
    fn test_invalid_display_mentions_first_issue() {
        let err = ScenarioError::Invalid {
            issues: vec![
                DiagnosticIssue::new(Severity::Error, "reference", "unknown bus 9")
                    .with_entity("Branch 0"),
                DiagnosticIssue::new(Severity::Error, "topology", "self-loop")
                    .with_entity("Branch 1"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("unknown bus 9"));
        assert!(text.contains("and 1 more"));
        assert_eq!(err.entities(), vec!["Branch 0", "Branch 1"]);
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> ScenarioResult<()> {
            Err(ScenarioError::UnknownBus {
                entity: "Injector 3".into(),
                bus: 42,
            })
        }

        fn outer() -> ScenarioResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
