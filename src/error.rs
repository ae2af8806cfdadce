//! Error taxonomy
//!
//! Configuration and document errors abort an execution. Everything else is
//! recovered locally and surfaced as an [`ExecError`] entry or a synthetic
//! rule result.

use crate::config::ConfigError;
use crate::resolver::CircularReference;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure to read the document under lint
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unable to parse document at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("document is empty")]
    Empty,

    #[error("spec type not supported, please provide an OpenAPI or Swagger specification")]
    Unsupported,

    #[error("spec is defined as an openapi spec, but is using a swagger (2.0) or unknown version '{0}'")]
    OpenApiVersion(String),

    #[error("spec is defined as a swagger spec, but is using an openapi 3 or unknown version '{0}'")]
    SwaggerVersion(String),

    #[error("unable to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal execution error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("execution cancelled before any rule was scheduled")]
    Cancelled,
}

/// Non-fatal condition recorded in `ExecutionResult::errors`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecError {
    /// A reference cycle in the document
    CircularReference(CircularReference),

    /// The outer deadline elapsed before every rule finished
    DeadlineExceeded { completed: usize, total: usize },

    /// The caller cancelled the run
    Cancelled { completed: usize, total: usize },

    /// A `given` expression could not be evaluated against the document
    PathLookup {
        rule_id: String,
        given: String,
        message: String,
    },
}

impl ExecError {
    pub fn is_circular_reference(&self) -> bool {
        matches!(self, ExecError::CircularReference(_))
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::CircularReference(circ) => write!(
                f,
                "circular reference ({}) detected: {}",
                circ.kind,
                circ.journey.join(" -> ")
            ),
            ExecError::DeadlineExceeded { completed, total } => write!(
                f,
                "deadline exceeded after {} of {} rules",
                completed, total
            ),
            ExecError::Cancelled { completed, total } => {
                write!(f, "cancelled after {} of {} rules", completed, total)
            }
            ExecError::PathLookup {
                rule_id,
                given,
                message,
            } => write!(
                f,
                "rule '{}' cannot evaluate path '{}': {}",
                rule_id, given, message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::CircularKind;

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::DeadlineExceeded {
            completed: 3,
            total: 10,
        };
        assert_eq!(err.to_string(), "deadline exceeded after 3 of 10 rules");

        let circ = ExecError::CircularReference(CircularReference {
            kind: CircularKind::Generic,
            journey: vec!["A".into(), "B".into(), "A".into()],
            loop_point: "A".into(),
            loop_index: 0,
            line: 4,
            column: 9,
        });
        assert!(circ.is_circular_reference());
        assert!(circ.to_string().contains("A -> B -> A"));
    }

    #[test]
    fn test_exec_error_serializes_kind() {
        let err = ExecError::Cancelled {
            completed: 1,
            total: 2,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["total"], 2);
    }

    #[test]
    fn test_document_error_messages() {
        let err = DocumentError::Parse {
            message: "bad indent".into(),
            line: 3,
            column: 7,
        };
        assert!(err.to_string().contains("line 3, column 7"));
        assert!(DocumentError::Unsupported
            .to_string()
            .contains("not supported"));
    }
}
