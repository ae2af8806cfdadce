//! Rule functions and their registry
//!
//! A rule action names a function. The scheduler looks it up in a
//! [`FunctionRegistry`], hands it the matched nodes and a
//! [`FunctionContext`], and post-processes whatever results come back.

/// Declare a function that checks whole documents through a plain fn
macro_rules! document_function {
    ($ty:ident, $name:literal, $category:literal, $check:ident) => {
        document_function!(
            $ty,
            $name,
            $category,
            $check,
            crate::functions::FunctionSchema::new($name)
        );
    };
    ($ty:ident, $name:literal, $category:literal, $check:ident, $schema:expr) => {
        pub struct $ty;

        impl crate::functions::RuleFunction for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn schema(&self) -> crate::functions::FunctionSchema {
                $schema
            }

            fn category(&self) -> &str {
                $category
            }

            fn run(
                &self,
                input: &[crate::functions::InputNode<'_>],
                ctx: &crate::functions::FunctionContext<'_>,
            ) -> anyhow::Result<Vec<crate::diagnostic::RuleFunctionResult>> {
                let mut results = Vec::new();
                for item in input {
                    ctx.checkpoint()?;
                    results.extend($check(item, ctx));
                }
                Ok(results)
            }
        }
    };
}

pub mod core;
pub mod openapi;
pub mod owasp;
pub mod schema;

use crate::cancel::CancelToken;
use crate::config::FetchConfig;
use crate::diagnostic::RuleFunctionResult;
use crate::index::path::child_path;
use crate::index::{DocumentIndex, JsonPath, Match, NodeRef, SpecInfo, Tree};
use crate::logging::Logger;
use crate::rule::{Rule, RuleAction};
use crate::script::fetch::FetchClient;
use crate::value::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use thiserror::Error;

/// Errors a function can raise that the scheduler treats specially
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FunctionError {
    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

/// One node handed to a function
#[derive(Debug, Clone)]
pub struct InputNode<'a> {
    pub node: NodeRef<'a>,
    /// JSONPath of `node`
    pub path: String,
    /// Key node when the match was a mapping value
    pub key: Option<NodeRef<'a>>,
    /// Position in the batch, 0 in per-node mode
    pub index: usize,
}

impl<'a> InputNode<'a> {
    pub fn from_match(m: &Match<'a>, index: usize) -> Self {
        Self {
            node: m.node,
            path: m.path.clone(),
            key: m.key,
            index,
        }
    }

    /// A result anchored at this node
    pub fn result(&self, message: impl Into<String>) -> RuleFunctionResult {
        RuleFunctionResult::new(message)
            .at(&self.node)
            .with_path(self.path.clone())
            .with_batch_index(self.index)
    }

    /// A result anchored at a child of this node
    pub fn child_result(
        &self,
        node: &NodeRef<'_>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> RuleFunctionResult {
        RuleFunctionResult::new(message)
            .at(node)
            .with_path(path)
            .with_batch_index(self.index)
    }
}

/// Everything a function may look at besides its input
pub struct FunctionContext<'a> {
    pub rule: &'a Arc<Rule>,
    pub action: &'a RuleAction,
    /// The `given` expression that produced the input
    pub given: &'a str,
    pub options: &'a Value,
    pub index: &'a DocumentIndex,
    /// View the rule runs against (resolved or raw)
    pub tree: Tree<'a>,
    pub spec_info: &'a SpecInfo,
    pub fetch_config: &'a FetchConfig,
    pub fetch: Option<&'a Arc<FetchClient>>,
    pub deadline: Instant,
    pub cancel: &'a CancelToken,
    pub logger: &'a Logger,
    pub batch: bool,
}

impl FunctionContext<'_> {
    /// Deadline passed or run cancelled
    pub fn is_expired(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Return the matching error when the invocation must stop
    pub fn checkpoint(&self) -> Result<(), FunctionError> {
        if self.cancel.is_cancelled() {
            Err(FunctionError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(FunctionError::Timeout)
        } else {
            Ok(())
        }
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.option(key).and_then(Value::as_bool)
    }

    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.option(key).and_then(Value::as_i64)
    }

    /// A list option, also accepting a comma separated string
    pub fn option_list(&self, key: &str) -> Vec<String> {
        self.option(key).map(Value::string_list).unwrap_or_default()
    }

    pub fn field(&self) -> Option<&str> {
        self.action.field.as_deref()
    }
}

/// Declared type of a function option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl OptionKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            OptionKind::String => matches!(value, Value::String(_)),
            OptionKind::Integer => matches!(value, Value::Int(_)),
            OptionKind::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            OptionKind::Boolean => matches!(value, Value::Bool(_)),
            OptionKind::Array => matches!(value, Value::List(_) | Value::String(_)),
            OptionKind::Object => matches!(value, Value::Map(_)),
            OptionKind::Any => true,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "string" => OptionKind::String,
            "integer" | "int" => OptionKind::Integer,
            "number" | "float" => OptionKind::Number,
            "boolean" | "bool" => OptionKind::Boolean,
            "array" | "list" => OptionKind::Array,
            "object" | "map" => OptionKind::Object,
            _ => OptionKind::Any,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::String => write!(f, "a string"),
            OptionKind::Integer => write!(f, "an integer"),
            OptionKind::Number => write!(f, "a number"),
            OptionKind::Boolean => write!(f, "a boolean"),
            OptionKind::Array => write!(f, "an array"),
            OptionKind::Object => write!(f, "an object"),
            OptionKind::Any => write!(f, "any value"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionProperty {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
}

/// Options a function understands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSchema {
    pub name: String,
    pub required: Vec<String>,
    pub properties: Vec<FunctionProperty>,
    pub min_properties: usize,
    pub max_properties: Option<usize>,
}

impl FunctionSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: Vec::new(),
            properties: Vec::new(),
            min_properties: 0,
            max_properties: None,
        }
    }

    pub fn with_property(mut self, name: &str, kind: OptionKind, description: &str) -> Self {
        self.properties.push(FunctionProperty {
            name: name.to_string(),
            description: description.to_string(),
            kind,
        });
        self
    }

    pub fn require(mut self, name: &str) -> Self {
        self.required.push(name.to_string());
        self
    }

    pub fn with_min_properties(mut self, min: usize) -> Self {
        self.min_properties = min;
        self
    }

    pub fn with_max_properties(mut self, max: usize) -> Self {
        self.max_properties = Some(max);
        self
    }

    /// Check options, returning one message per violation
    pub fn validate(&self, options: &Value) -> Vec<String> {
        let empty = std::collections::BTreeMap::new();
        let map = match options {
            Value::Null => &empty,
            Value::Map(map) => map,
            other => {
                return vec![format!(
                    "function '{}' options must be an object, not {}",
                    self.name,
                    other.type_name()
                )]
            }
        };

        let mut violations = Vec::new();
        for required in &self.required {
            if !map.contains_key(required) {
                violations.push(format!(
                    "function '{}' is missing required option '{}'",
                    self.name, required
                ));
            }
        }

        let count = map.keys().filter(|k| k.as_str() != "batch").count();
        if count < self.min_properties {
            violations.push(format!(
                "function '{}' needs at least {} option(s), {} supplied",
                self.name, self.min_properties, count
            ));
        }
        if let Some(max) = self.max_properties {
            if count > max {
                violations.push(format!(
                    "function '{}' accepts at most {} option(s), {} supplied",
                    self.name, max, count
                ));
            }
        }

        if !self.properties.is_empty() {
            for (key, value) in map {
                if key == "batch" {
                    continue;
                }
                match self.properties.iter().find(|p| &p.name == key) {
                    Some(prop) if !prop.kind.accepts(value) => violations.push(format!(
                        "function '{}' option '{}' must be {}",
                        self.name, key, prop.kind
                    )),
                    Some(_) => {}
                    None => violations.push(format!(
                        "function '{}' does not understand option '{}'",
                        self.name, key
                    )),
                }
            }
        }
        violations
    }
}

/// A rule function implementation
pub trait RuleFunction: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new(self.name())
    }

    /// Grouping used in listings
    fn category(&self) -> &str {
        "core"
    }

    /// Evaluate the input. Per-node mode passes one node, batch mode all.
    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>>;

    /// Whether the function understands batch input
    fn supports_batch(&self) -> bool {
        false
    }

    /// Whether the function receives the matched node and applies `field` itself
    fn inspects_field(&self) -> bool {
        false
    }
}

/// Name to implementation map
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn RuleFunction>>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in function
    pub fn builtin() -> Self {
        static BUILTIN: OnceLock<FunctionRegistry> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                let mut registry = Self::new();
                for function in core::functions()
                    .into_iter()
                    .chain(schema::functions())
                    .chain(openapi::functions())
                    .chain(owasp::functions())
                {
                    registry.register(function);
                }
                registry
            })
            .clone()
    }

    /// Register or shadow a function under its own name
    pub fn register(&mut self, function: Arc<dyn RuleFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn register_as(&mut self, name: &str, function: Arc<dyn RuleFunction>) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RuleFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Sorted function names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Apply a `field` selector to a matched node.
///
/// Accepts `@key`, a `$`-rooted JSONPath relative to the node, a dotted key
/// path, or a plain child key.
pub fn project_field<'a>(input: &InputNode<'a>, field: &str) -> Option<InputNode<'a>> {
    if field == "@key" {
        let key = input.key?;
        return Some(InputNode {
            node: key,
            path: input.path.clone(),
            key: None,
            index: input.index,
        });
    }

    if field.starts_with('$') {
        let query = JsonPath::parse(field).ok()?;
        let start = Match {
            node: input.node,
            path: input.path.clone(),
            key: input.key,
            index: None,
        };
        let found = query.query_from(start).into_iter().next()?;
        return Some(InputNode {
            node: found.node,
            path: found.path,
            key: found.key,
            index: input.index,
        });
    }

    if let Some(child) = input.node.get(field) {
        let key = input.node.entry(field).map(|(k, _)| k);
        return Some(InputNode {
            node: child,
            path: child_path(&input.path, field),
            key,
            index: input.index,
        });
    }

    let mut current = input.clone();
    for segment in field.split('.') {
        current = if current.node.is_sequence() {
            let idx: usize = segment.parse().ok()?;
            let item = *current.node.items().get(idx)?;
            InputNode {
                node: item,
                path: crate::index::path::index_path(&current.path, idx),
                key: None,
                index: input.index,
            }
        } else {
            let (key, value) = current.node.entry(segment)?;
            InputNode {
                node: value,
                path: child_path(&current.path, segment),
                key: Some(key),
                index: input.index,
            }
        };
    }
    Some(current)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::SpecInfo;
    use crate::rule::Rule;
    use std::time::Duration;

    /// Owned pieces a [`FunctionContext`] borrows from
    pub(crate) struct Harness {
        pub index: DocumentIndex,
        pub rule: Arc<Rule>,
        pub spec_info: SpecInfo,
        pub fetch_config: FetchConfig,
        pub cancel: CancelToken,
        pub logger: Logger,
    }

    impl Harness {
        pub fn new(source: &str, rule: Rule) -> Self {
            let index = DocumentIndex::parse(source.as_bytes(), "api.yaml").unwrap();
            let spec_info = SpecInfo::unknown(&index, "api.yaml");
            Self {
                index,
                rule: Arc::new(rule),
                spec_info,
                fetch_config: FetchConfig::default(),
                cancel: CancelToken::new(),
                logger: Logger::silent(),
            }
        }

        pub fn context(&self) -> FunctionContext<'_> {
            let action = &self.rule.actions()[0];
            FunctionContext {
                rule: &self.rule,
                action,
                given: "$",
                options: &action.options,
                index: &self.index,
                tree: self.index.raw(),
                spec_info: &self.spec_info,
                fetch_config: &self.fetch_config,
                fetch: None,
                deadline: Instant::now() + Duration::from_secs(5),
                cancel: &self.cancel,
                logger: &self.logger,
                batch: false,
            }
        }

        /// Run a function against every match of `given`
        pub fn run(&self, function: &dyn RuleFunction, given: &str) -> Vec<RuleFunctionResult> {
            let ctx = self.context();
            let path = JsonPath::parse(given).unwrap();
            let mut results = Vec::new();
            for m in path.query(self.index.raw()) {
                let input = InputNode::from_match(&m, 0);
                let input = match (function.inspects_field(), ctx.field()) {
                    (false, Some(field)) => match project_field(&input, field) {
                        Some(projected) => projected,
                        None => continue,
                    },
                    _ => input,
                };
                results.extend(function.run(&[input], &ctx).unwrap());
            }
            results
        }
    }

    #[test]
    fn test_schema_validation() {
        let schema = FunctionSchema::new("length")
            .with_property("min", OptionKind::Integer, "minimum")
            .with_property("max", OptionKind::Integer, "maximum")
            .with_min_properties(1);

        assert!(schema.validate(&Value::Null).len() == 1);

        let mut options = Value::map();
        options.insert("min", Value::Int(1));
        assert!(schema.validate(&options).is_empty());

        options.insert("max", Value::from("ten"));
        options.insert("other", Value::Bool(true));
        let violations = schema.validate(&options);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].contains("'max' must be an integer"));
        assert!(violations[1].contains("does not understand option 'other'"));
    }

    #[test]
    fn test_schema_required_and_batch_ignored() {
        let schema = FunctionSchema::new("pattern")
            .require("match")
            .with_property("match", OptionKind::String, "regex")
            .with_max_properties(1);
        let mut options = Value::map();
        options.insert("batch", Value::Bool(true));
        let violations = schema.validate(&options);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("missing required option 'match'"));
    }

    #[test]
    fn test_registry_builtin_and_shadow() {
        let registry = FunctionRegistry::builtin();
        assert!(registry.contains("truthy"));
        assert!(registry.contains("oasOpIdUnique"));
        assert!(registry.contains("owaspNoBasicAuth"));
        assert!(!registry.contains("nope"));

        let mut custom = FunctionRegistry::builtin();
        custom.register_as("truthy", Arc::new(core::Falsy));
        assert_eq!(custom.get("truthy").map(|f| f.name()), Some("falsy"));
        // the shared catalog is untouched
        assert_eq!(
            FunctionRegistry::builtin().get("truthy").map(|f| f.name()),
            Some("truthy")
        );
    }

    #[test]
    fn test_project_field_forms() {
        let source = "info:\n  contact:\n    name: me\n  tags:\n    - a\n    - b\n";
        let index = DocumentIndex::parse(source.as_bytes(), "api.yaml").unwrap();
        let matches = JsonPath::parse("$.info").unwrap().query(index.raw());
        let input = InputNode::from_match(&matches[0], 0);

        let child = project_field(&input, "contact").unwrap();
        assert_eq!(child.path, "$.info.contact");

        let dotted = project_field(&input, "contact.name").unwrap();
        assert_eq!(dotted.node.as_str(), Some("me"));
        assert_eq!(dotted.path, "$.info.contact.name");

        let indexed = project_field(&input, "tags.1").unwrap();
        assert_eq!(indexed.node.as_str(), Some("b"));

        let relative = project_field(&input, "$.contact.name").unwrap();
        assert_eq!(relative.node.as_str(), Some("me"));

        let key = project_field(&input, "@key").unwrap();
        assert_eq!(key.node.as_str(), Some("info"));

        assert!(project_field(&input, "missing").is_none());
    }
}
