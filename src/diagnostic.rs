//! Result types produced by rule functions

use crate::index::{NodeId, NodeRef};
use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity level for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suggestion only
    Hint,
    /// Informational message
    Info,
    /// Warning - potential issue
    #[default]
    Warn,
    /// Error - definite problem
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Hint,
    ];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Hint => write!(f, "hint"),
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hint" => Ok(Severity::Hint),
            "info" | "information" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A line/character position (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    #[serde(rename = "character")]
    pub char: usize,
}

impl Position {
    pub fn new(line: usize, char: usize) -> Self {
        Self { line, char }
    }
}

/// Start/end span of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.line == 0
    }
}

/// Absolute location for nodes that came from a referenced file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/// A single rule violation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleFunctionResult {
    /// Rule that produced this result
    pub rule_id: String,
    /// Human-readable message
    pub message: String,
    /// JSONPath of the offending node
    pub path: String,
    /// Severity, inherited from the rule
    pub severity: Severity,
    /// Source span
    pub range: Range,
    /// Node the result starts at
    #[serde(skip)]
    pub start_node: Option<NodeId>,
    /// Node the result ends at
    #[serde(skip)]
    pub end_node: Option<NodeId>,
    /// Source file for results from referenced documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Back-reference to the rule
    #[serde(skip)]
    pub rule: Option<Arc<Rule>>,
    /// Index of the input node in batch mode
    #[serde(skip)]
    pub batch_index: Option<usize>,
}

impl RuleFunctionResult {
    /// Create a result with only a message; the scheduler fills the rest
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Anchor the result at a node
    pub fn at(mut self, node: &NodeRef<'_>) -> Self {
        self.start_node = Some(node.id());
        self.end_node = Some(node.id());
        self.range = node.range();
        self.origin = node.origin();
        self
    }

    pub fn with_batch_index(mut self, index: usize) -> Self {
        self.batch_index = Some(index);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn line(&self) -> usize {
        self.range.start.line
    }

    pub fn column(&self) -> usize {
        self.range.start.char
    }

    /// Origin file, empty for the root document
    pub fn file(&self) -> &str {
        self.origin.as_ref().map(|o| o.file.as_str()).unwrap_or("")
    }

    /// Category id of the owning rule
    pub fn category(&self) -> Option<crate::rule::RuleCategory> {
        self.rule.as_ref().map(|r| r.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
        assert!(Severity::Info > Severity::Hint);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!("ERROR".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("hint".parse::<Severity>(), Ok(Severity::Hint));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serde() {
        let s: Severity = serde_yaml::from_str("warn").unwrap();
        assert_eq!(s, Severity::Warn);
        assert_eq!(serde_json::to_string(&Severity::Info).unwrap(), "\"info\"");
    }

    #[test]
    fn test_result_builder() {
        let result = RuleFunctionResult::new("bad thing")
            .with_path("$.info")
            .with_batch_index(2)
            .with_severity(Severity::Error);
        assert_eq!(result.message, "bad thing");
        assert_eq!(result.path, "$.info");
        assert_eq!(result.batch_index, Some(2));
        assert_eq!(result.file(), "");
        assert_eq!(result.line(), 0);
    }

    #[test]
    fn test_result_serialization_skips_internal_fields() {
        let result = RuleFunctionResult::new("m").with_batch_index(1);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("batch_index").is_none());
        assert!(json.get("origin").is_none());
        assert_eq!(json["range"]["start"]["character"], 0);
    }
}
