//! Rule definition

use crate::diagnostic::Severity;
use crate::value::Value;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Rule category, a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    /// Documentation quality
    Descriptions,
    /// Examples for schemas, parameters and media types
    Examples,
    /// The `info` object
    Info,
    /// Schema design
    Schemas,
    /// Security definitions and usage
    Security,
    /// Structural correctness
    #[default]
    Validation,
    /// Operations and paths
    Operations,
    /// Tags
    Tags,
    /// OWASP API security top ten
    Owasp,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 9] = [
        RuleCategory::Descriptions,
        RuleCategory::Examples,
        RuleCategory::Info,
        RuleCategory::Schemas,
        RuleCategory::Security,
        RuleCategory::Validation,
        RuleCategory::Operations,
        RuleCategory::Tags,
        RuleCategory::Owasp,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            RuleCategory::Descriptions => "Descriptions",
            RuleCategory::Examples => "Examples",
            RuleCategory::Info => "Contact Information",
            RuleCategory::Schemas => "Schemas",
            RuleCategory::Security => "Security",
            RuleCategory::Validation => "Validation",
            RuleCategory::Operations => "Operations",
            RuleCategory::Tags => "Tags",
            RuleCategory::Owasp => "OWASP",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RuleCategory::Descriptions => "Quality and presence of descriptions",
            RuleCategory::Examples => "Examples for schemas, parameters and content",
            RuleCategory::Info => "Contact, license and general information",
            RuleCategory::Schemas => "Schema design and consistency",
            RuleCategory::Security => "Security schemes and their use",
            RuleCategory::Validation => "Structural validity of the document",
            RuleCategory::Operations => "Operations, paths and parameters",
            RuleCategory::Tags => "Tag definitions and usage",
            RuleCategory::Owasp => "OWASP API security checks",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCategory::Descriptions => write!(f, "descriptions"),
            RuleCategory::Examples => write!(f, "examples"),
            RuleCategory::Info => write!(f, "information"),
            RuleCategory::Schemas => write!(f, "schemas"),
            RuleCategory::Security => write!(f, "security"),
            RuleCategory::Validation => write!(f, "validation"),
            RuleCategory::Operations => write!(f, "operations"),
            RuleCategory::Tags => write!(f, "tags"),
            RuleCategory::Owasp => write!(f, "owasp"),
        }
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "descriptions" => Ok(RuleCategory::Descriptions),
            "examples" => Ok(RuleCategory::Examples),
            "info" | "information" => Ok(RuleCategory::Info),
            "schemas" => Ok(RuleCategory::Schemas),
            "security" => Ok(RuleCategory::Security),
            "validation" => Ok(RuleCategory::Validation),
            "operations" => Ok(RuleCategory::Operations),
            "tags" => Ok(RuleCategory::Tags),
            "owasp" => Ok(RuleCategory::Owasp),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for RuleCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Rule set files write either `category: schemas` or `category: {id: schemas}`
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Id(String),
            Object { id: String },
        }

        let id = match Repr::deserialize(deserializer)? {
            Repr::Id(id) | Repr::Object { id } => id,
        };
        id.parse().map_err(serde::de::Error::custom)
    }
}

/// Specification dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpecFormat {
    #[serde(rename = "oas2")]
    Oas2,
    #[serde(rename = "oas3")]
    Oas3,
    #[serde(rename = "oas3_1", alias = "oas3.1")]
    Oas31,
}

impl SpecFormat {
    pub const ALL: [SpecFormat; 3] = [SpecFormat::Oas2, SpecFormat::Oas3, SpecFormat::Oas31];
    pub const OAS3: [SpecFormat; 2] = [SpecFormat::Oas3, SpecFormat::Oas31];
}

impl fmt::Display for SpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecFormat::Oas2 => write!(f, "oas2"),
            SpecFormat::Oas3 => write!(f, "oas3"),
            SpecFormat::Oas31 => write!(f, "oas3_1"),
        }
    }
}

impl std::str::FromStr for SpecFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "oas2" => Ok(SpecFormat::Oas2),
            "oas3" | "oas3_0" => Ok(SpecFormat::Oas3),
            "oas3_1" | "oas3.1" => Ok(SpecFormat::Oas31),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Rule type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    Validation,
    Style,
}

/// One path expression or an ordered list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Given {
    One(String),
    Many(Vec<String>),
}

impl Given {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Given::One(p) => vec![p.as_str()],
            Given::Many(ps) => ps.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for Given {
    fn default() -> Self {
        Given::One("$".to_string())
    }
}

/// A check to run on every node matched by `given`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    /// Sub-selector applied to each matched node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Function registry name
    pub function: String,

    /// Options handed to the function
    #[serde(
        default,
        rename = "functionOptions",
        alias = "options",
        skip_serializing_if = "Value::is_null"
    )]
    pub options: Value,
}

impl RuleAction {
    pub fn new(function: &str) -> Self {
        Self {
            field: None,
            function: function.to_string(),
            options: Value::Null,
        }
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Whether batch invocation was requested
    pub fn batch(&self) -> bool {
        self.option("batch").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// One action or an ordered list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Then {
    One(RuleAction),
    Many(Vec<RuleAction>),
}

impl Then {
    pub fn actions(&self) -> &[RuleAction] {
        match self {
            Then::One(a) => std::slice::from_ref(a),
            Then::Many(actions) => actions,
        }
    }

    fn last_mut(&mut self) -> Option<&mut RuleAction> {
        match self {
            Then::One(a) => Some(a),
            Then::Many(actions) => actions.last_mut(),
        }
    }

    fn push(&mut self, action: RuleAction) {
        let current = std::mem::replace(self, Then::Many(Vec::new()));
        let mut actions = match current {
            Then::One(a) => vec![a],
            Then::Many(actions) => actions,
        };
        actions.push(action);
        *self = Then::Many(actions);
    }
}

fn default_true() -> bool {
    true
}

/// A lint rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique rule identifier (e.g., "operation-operationId-unique")
    #[serde(default)]
    pub id: String,

    /// Detailed description
    #[serde(default)]
    pub description: String,

    /// Message template, replacing the function's message when set
    #[serde(default)]
    pub message: String,

    /// Remediation advice
    #[serde(default)]
    pub how_to_fix: String,

    /// Severity level
    #[serde(default)]
    pub severity: Severity,

    /// Path expressions selecting the nodes to check
    pub given: Given,

    /// Evaluate against the resolved view
    #[serde(default = "default_true")]
    pub resolved: bool,

    /// Part of the recommended profile
    #[serde(default)]
    pub recommended: bool,

    /// Rule category
    #[serde(default)]
    pub category: RuleCategory,

    /// Checks to run
    pub then: Then,

    /// Applicable formats (empty = all)
    #[serde(default)]
    pub formats: Vec<SpecFormat>,

    /// Validation or style
    #[serde(default, rename = "type")]
    pub rule_type: RuleType,

    /// Documentation URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl Rule {
    /// Create a rule with one given path and one action
    pub fn new(id: &str, given: &str, function: &str) -> Self {
        Self {
            id: id.to_string(),
            description: String::new(),
            message: String::new(),
            how_to_fix: String::new(),
            severity: Severity::Warn,
            given: Given::One(given.to_string()),
            resolved: true,
            recommended: false,
            category: RuleCategory::Validation,
            then: Then::One(RuleAction::new(function)),
            formats: Vec::new(),
            rule_type: RuleType::Validation,
            documentation_url: None,
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn with_how_to_fix(mut self, fix: &str) -> Self {
        self.how_to_fix = fix.to_string();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_formats(mut self, formats: &[SpecFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn with_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    /// Add another path expression
    pub fn with_given(mut self, path: &str) -> Self {
        let mut paths: Vec<String> = self.given.paths().into_iter().map(String::from).collect();
        paths.push(path.to_string());
        self.given = Given::Many(paths);
        self
    }

    /// Set the field of the last action
    pub fn with_field(mut self, field: &str) -> Self {
        if let Some(action) = self.then.last_mut() {
            action.field = Some(field.to_string());
        }
        self
    }

    /// Set the options of the last action
    pub fn with_options(mut self, options: Value) -> Self {
        if let Some(action) = self.then.last_mut() {
            action.options = options;
        }
        self
    }

    /// Append another action
    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.then.push(action);
        self
    }

    /// Mark as part of the recommended profile
    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    /// Evaluate against the raw document
    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    pub fn with_docs(mut self, url: &str) -> Self {
        self.documentation_url = Some(url.to_string());
        self
    }

    pub fn actions(&self) -> &[RuleAction] {
        self.then.actions()
    }

    /// Whether the rule applies to a document of the given format
    pub fn applies_to(&self, format: Option<SpecFormat>) -> bool {
        match format {
            Some(format) => self.formats.is_empty() || self.formats.contains(&format),
            None => true,
        }
    }

    /// Number of `{{...}}` interpolation slots in the message template
    pub fn message_slots(&self) -> usize {
        self.message.matches("{{").count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new("info-contact", "$.info", "truthy");

        assert_eq!(rule.id, "info-contact");
        assert_eq!(rule.given.paths(), vec!["$.info"]);
        assert_eq!(rule.actions()[0].function, "truthy");
        assert_eq!(rule.severity, Severity::Warn);
        assert!(rule.resolved);
        assert!(!rule.recommended);
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::new("test", "$.info", "truthy")
            .with_field("contact")
            .with_severity(Severity::Error)
            .with_category(RuleCategory::Info)
            .with_formats(&SpecFormat::OAS3)
            .with_given("$.tags[*]")
            .with_action(RuleAction::new("defined"))
            .recommended();

        assert_eq!(rule.actions().len(), 2);
        assert_eq!(rule.actions()[0].field.as_deref(), Some("contact"));
        assert_eq!(rule.given.paths(), vec!["$.info", "$.tags[*]"]);
        assert!(rule.recommended);
        assert!(rule.applies_to(Some(SpecFormat::Oas31)));
        assert!(!rule.applies_to(Some(SpecFormat::Oas2)));
        assert!(rule.applies_to(None));
    }

    #[test]
    fn test_rule_deserialize() {
        let yaml = r#"
description: Paths must be kebab-case
severity: error
given: $.paths
category:
  id: operations
then:
  - field: "@key"
    function: pattern
    functionOptions:
      match: "^[a-z/-]+$"
formats: [oas3, oas3_1]
type: style
howToFix: rename the path
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.category, RuleCategory::Operations);
        assert_eq!(rule.rule_type, RuleType::Style);
        assert_eq!(rule.formats, vec![SpecFormat::Oas3, SpecFormat::Oas31]);
        assert_eq!(rule.how_to_fix, "rename the path");
        assert_eq!(
            rule.actions()[0].option("match"),
            Some(&Value::from("^[a-z/-]+$"))
        );
        assert!(rule.resolved);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let yaml = "given: $\ncategory: nonsense\nthen: {function: truthy}";
        let err = serde_yaml::from_str::<Rule>(yaml).unwrap_err();
        assert!(err.to_string().contains("Unknown category"));
    }

    #[test]
    fn test_message_slots() {
        let rule = Rule::new("r", "$", "truthy").with_message("bad value {{value}}");
        assert_eq!(rule.message_slots(), 1);
        assert_eq!(Rule::new("r", "$", "truthy").message_slots(), 0);
    }

    #[test]
    fn test_batch_option() {
        let mut action = RuleAction::new("custom");
        assert!(!action.batch());
        action.options = Value::Map(
            [("batch".to_string(), Value::Bool(true))]
                .into_iter()
                .collect(),
        );
        assert!(action.batch());
    }

    #[test]
    fn test_category_display_roundtrip() {
        for category in RuleCategory::ALL {
            let parsed: RuleCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }
}
