//! Rule sets and their composition
//!
//! A rule set document names the sets it `extends` and then adjusts the
//! inherited rules:
//!
//! ```yaml
//! extends:
//!   - [vacuum:oas, recommended]
//!   - ./team-rules.yaml
//! rules:
//!   operation-tags: off          # disable
//!   info-contact: error          # change severity
//!   owasp-no-http-basic: true    # pull in from the catalog
//!   my-rule:                     # define a new rule
//!     given: $.info
//!     then:
//!       field: x-owner
//!       function: truthy
//! ```
//!
//! Extends are applied in order, the document's own definitions last.

pub mod builtin;

pub use builtin::RuleCatalog;

use crate::config::{ConfigError, HttpClientConfig};
use crate::diagnostic::Severity;
use crate::functions::FunctionRegistry;
use crate::index::rolodex::{is_url, join_location};
use crate::index::JsonPath;
use crate::logging::{Logger, RULESET};
use crate::remote::RemoteLoader;
use crate::rule::{Rule, SpecFormat};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Deepest chain of extends followed
const MAX_DEPTH: usize = 10;

/// A named collection of rules
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub documentation_uri: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<SpecFormat>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<Extends>,
    pub rules: BTreeMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.id.clone(), r)).collect(),
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.insert(rule.id.clone(), rule);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_documentation_uri(mut self, uri: &str) -> Self {
        self.documentation_uri = uri.to_string();
        self
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule ids in sorted order
    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Merge another set into this one (other takes precedence per rule id)
    pub fn merge(&mut self, other: RuleSet) {
        if !other.documentation_uri.is_empty() {
            self.documentation_uri = other.documentation_uri;
        }
        if !other.description.is_empty() {
            self.description = other.description;
        }
        if !other.formats.is_empty() {
            self.formats = other.formats;
        }
        self.rules.extend(other.rules);
    }

    /// Keep only the rules marked recommended
    fn recommended_only(mut self) -> Self {
        self.rules.retain(|_, rule| rule.recommended);
        self
    }

    /// Immutable rules handed to the engine, in id order
    pub fn frozen(&self) -> Vec<Arc<Rule>> {
        self.rules.values().cloned().map(Arc::new).collect()
    }

    /// Check every rule against the functions in `registry`.
    ///
    /// Fails on the first rule with an unknown function, an unparsable
    /// `given`, options its function rejects, or a message template with
    /// more than one `{{...}}` slot.
    pub fn validate(&self, registry: &FunctionRegistry) -> Result<(), ConfigError> {
        for (id, rule) in &self.rules {
            if id.is_empty() || rule.id.is_empty() {
                return Err(ConfigError::rule(id, "rule id must not be empty"));
            }
            if rule.actions().is_empty() {
                return Err(ConfigError::rule(id, "rule has no actions in 'then'"));
            }
            if rule.given.paths().is_empty() {
                return Err(ConfigError::rule(id, "rule has no 'given' path"));
            }
            for given in rule.given.paths() {
                JsonPath::parse(given).map_err(|e| ConfigError::rule(id, e.to_string()))?;
            }
            for action in rule.actions() {
                let function = registry.get(&action.function).ok_or_else(|| {
                    ConfigError::rule(id, format!("unknown function '{}'", action.function))
                })?;
                let violations = function.schema().validate(&action.options);
                if !violations.is_empty() {
                    return Err(ConfigError::rule(id, violations.join("; ")));
                }
            }
            if rule.message_slots() > 1 {
                return Err(ConfigError::rule(
                    id,
                    "message template may contain at most one {{...}} slot",
                ));
            }
        }
        Ok(())
    }
}

/// How much of an extended set to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendsMode {
    /// Whatever the target defines
    #[default]
    Default,
    /// Only recommended rules
    Recommended,
    /// Every rule, recommended or not
    All,
    /// Nothing
    Off,
}

impl fmt::Display for ExtendsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtendsMode::Default => write!(f, "default"),
            ExtendsMode::Recommended => write!(f, "recommended"),
            ExtendsMode::All => write!(f, "all"),
            ExtendsMode::Off => write!(f, "off"),
        }
    }
}

impl FromStr for ExtendsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recommended" => Ok(ExtendsMode::Recommended),
            "all" => Ok(ExtendsMode::All),
            "off" => Ok(ExtendsMode::Off),
            _ => Err(format!("Unknown extends mode: {}", s)),
        }
    }
}

/// One `extends` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extends {
    pub target: String,
    pub mode: ExtendsMode,
}

impl Extends {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            mode: ExtendsMode::Default,
        }
    }

    pub fn with_mode(mut self, mode: ExtendsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the target names a file or URL rather than a built-in set
    fn is_location(&self) -> bool {
        is_url(&self.target)
            || [".yaml", ".yml", ".json"]
                .iter()
                .any(|ext| self.target.ends_with(ext))
    }

    /// Read `extends` as a string, or a list of strings and `[name, mode]` pairs
    fn parse_all(value: &Value) -> Result<Vec<Extends>, ConfigError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(target) => Ok(vec![Extends::new(target)]),
            Value::List(items) => items.iter().map(Extends::parse_one).collect(),
            other => Err(ConfigError::Invalid(format!(
                "extends must be a string or a list, not {}",
                other.type_name()
            ))),
        }
    }

    fn parse_one(value: &Value) -> Result<Extends, ConfigError> {
        match value {
            Value::String(target) => Ok(Extends::new(target)),
            Value::List(pair) => match pair.as_slice() {
                [Value::String(target)] => Ok(Extends::new(target)),
                [Value::String(target), Value::String(mode)] => {
                    let mode = mode.parse().map_err(ConfigError::Invalid)?;
                    Ok(Extends::new(target).with_mode(mode))
                }
                _ => Err(ConfigError::Invalid(
                    "extends entries must be a name or a [name, mode] pair".into(),
                )),
            },
            other => Err(ConfigError::Invalid(format!(
                "extends entries must be a name or a [name, mode] pair, not {}",
                other.type_name()
            ))),
        }
    }
}

/// A rule set document as written by users
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RuleSetDocument {
    #[serde(alias = "documentationUrl")]
    documentation_uri: String,
    description: String,
    formats: Vec<SpecFormat>,
    extends: Value,
    rules: BTreeMap<String, Value>,
}

impl RuleSetDocument {
    fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        // YAML is a superset of JSON
        Ok(serde_yaml::from_slice(bytes)?)
    }
}

/// Builds rule sets from built-in profiles, files and URLs
#[derive(Debug, Clone)]
pub struct RuleSetComposer {
    catalog: Arc<RuleCatalog>,
    http: HttpClientConfig,
    logger: Logger,
    named: BTreeMap<String, RuleSet>,
}

impl Default for RuleSetComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSetComposer {
    pub fn new() -> Self {
        Self {
            catalog: RuleCatalog::builtin(),
            http: HttpClientConfig::default(),
            logger: Logger::default(),
            named: BTreeMap::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<RuleCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.http = config;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Make a set available to `extends` under `name`
    pub fn register(mut self, name: &str, set: RuleSet) -> Self {
        self.named.insert(name.to_string(), set);
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// A built-in profile or registered set by name
    pub fn load_builtin(&self, name: &str) -> Result<RuleSet, ConfigError> {
        self.named_set(&Extends::new(name))
            .ok_or_else(|| ConfigError::UnknownExtends(name.to_string()))
    }

    /// Load a rule set file, following its extends
    pub fn load_file(&self, path: &Path) -> Result<RuleSet, ConfigError> {
        let location = join_location("", &path.to_string_lossy());
        let bytes = std::fs::read(path)?;
        self.compose(&bytes, &location, &mut vec![location.clone()])
    }

    /// Fetch a rule set over HTTP(S), following its extends
    pub fn load_url(&self, url: &str) -> Result<RuleSet, ConfigError> {
        let bytes = self.fetch(url)?;
        self.compose(&bytes, url, &mut vec![url.to_string()])
    }

    /// Compose a user rule set held in memory; relative extends resolve
    /// against the working directory
    pub fn load_user_set(&self, bytes: &[u8]) -> Result<RuleSet, ConfigError> {
        self.load_user_set_from(bytes, "ruleset.yaml")
    }

    /// Compose a user rule set held in memory as if read from `location`
    pub fn load_user_set_from(&self, bytes: &[u8], location: &str) -> Result<RuleSet, ConfigError> {
        self.compose(bytes, location, &mut vec![location.to_string()])
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, ConfigError> {
        let remote = |e: crate::remote::RemoteError| ConfigError::Remote {
            url: url.to_string(),
            message: e.to_string(),
        };
        let loader = RemoteLoader::new(&self.http).map_err(remote)?;
        self.logger
            .debug(RULESET, format_args!("fetching remote rule set {}", url));
        loader.fetch(url).map_err(remote)
    }

    /// `chain` holds the locations currently being composed, outermost first
    fn compose(
        &self,
        bytes: &[u8],
        location: &str,
        chain: &mut Vec<String>,
    ) -> Result<RuleSet, ConfigError> {
        if chain.len() > MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum rule set inheritance depth exceeded".to_string(),
            ));
        }

        let document = RuleSetDocument::parse(bytes)?;
        let extends = Extends::parse_all(&document.extends)?;

        let mut set = RuleSet::new();
        for entry in &extends {
            let extended = self.resolve_extends(entry, location, chain)?;
            set.merge(extended);
        }

        self.apply_definitions(&mut set, &document, location)?;

        set.documentation_uri = document.documentation_uri;
        set.description = document.description;
        set.formats = document.formats;
        set.extends = extends;

        self.logger.debug(
            RULESET,
            format_args!("composed {} rule(s) from {}", set.len(), location),
        );
        Ok(set)
    }

    fn resolve_extends(
        &self,
        entry: &Extends,
        location: &str,
        chain: &mut Vec<String>,
    ) -> Result<RuleSet, ConfigError> {
        if !entry.is_location() {
            return self
                .named_set(entry)
                .ok_or_else(|| ConfigError::UnknownExtends(entry.target.clone()));
        }

        let target = join_location(location, &entry.target);
        if chain.contains(&target) {
            let journey: Vec<String> = chain
                .iter()
                .chain(std::iter::once(&target))
                .map(|l| display_name(l))
                .collect();
            return Err(ConfigError::ExtendsCycle(journey.join(" -> ")));
        }

        let bytes = if is_url(&target) {
            self.fetch(&target)?
        } else {
            std::fs::read(&target)?
        };

        chain.push(target.clone());
        let extended = self.compose(&bytes, &target, chain);
        chain.pop();

        let extended = extended?;
        Ok(match entry.mode {
            ExtendsMode::Off => RuleSet::new(),
            ExtendsMode::Recommended => extended.recommended_only(),
            ExtendsMode::Default | ExtendsMode::All => extended,
        })
    }

    /// Built-in profiles and registered sets, with the mode applied
    fn named_set(&self, entry: &Extends) -> Option<RuleSet> {
        let catalog = &self.catalog;
        let mode = entry.mode;
        let set = match entry.target.as_str() {
            "recommended" | "vacuum:oas" | "spectral:oas" => match mode {
                ExtendsMode::All => catalog.all(),
                _ => catalog.recommended(),
            },
            "all" => catalog.all(),
            "owasp" | "vacuum:owasp" | "spectral:owasp" => catalog.owasp(),
            "vacuum:all" => catalog.all_combined(),
            name => {
                let set = self.named.get(name)?.clone();
                if mode == ExtendsMode::Recommended {
                    set.recommended_only()
                } else {
                    set
                }
            }
        };
        if mode == ExtendsMode::Off {
            return Some(RuleSet::new());
        }
        Some(set)
    }

    fn apply_definitions(
        &self,
        set: &mut RuleSet,
        document: &RuleSetDocument,
        location: &str,
    ) -> Result<(), ConfigError> {
        for (id, definition) in &document.rules {
            match definition {
                Value::Null | Value::Bool(false) => {
                    set.rules.remove(id);
                }
                Value::String(s) if s.eq_ignore_ascii_case("off") => {
                    set.rules.remove(id);
                }
                Value::String(s) => {
                    let Ok(severity) = s.parse::<Severity>() else {
                        self.logger.warn(
                            RULESET,
                            format_args!(
                                "{}: rule '{}' has unknown severity '{}'",
                                location, id, s
                            ),
                        );
                        continue;
                    };
                    match set.rules.get_mut(id) {
                        Some(rule) => rule.severity = severity,
                        None => self.logger.warn(
                            RULESET,
                            format_args!(
                                "{}: cannot set severity of '{}', rule is not in the set",
                                location, id
                            ),
                        ),
                    }
                }
                Value::Bool(true) => match self.catalog.find(id) {
                    Some(rule) => {
                        set.rules.insert(id.clone(), rule.clone());
                    }
                    None => self.logger.warn(
                        RULESET,
                        format_args!("{}: unknown built-in rule '{}'", location, id),
                    ),
                },
                Value::Map(map) => {
                    let mut rule = match set.rules.get(id) {
                        Some(existing) => patch_rule(existing, map)?,
                        None => define_rule(id, map)?,
                    };
                    if rule.formats.is_empty() && !document.formats.is_empty() {
                        rule.formats = document.formats.clone();
                    }
                    set.rules.insert(id.clone(), rule);
                }
                other => self.logger.warn(
                    RULESET,
                    format_args!(
                        "{}: ignoring rule '{}' defined as {}",
                        location,
                        id,
                        other.type_name()
                    ),
                ),
            }
        }
        Ok(())
    }
}

/// Last path segment of a location, for cycle messages
fn display_name(location: &str) -> String {
    location
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(location)
        .to_string()
}

/// Overlay the non-null keys of `patch` onto an existing rule
fn patch_rule(existing: &Rule, patch: &BTreeMap<String, Value>) -> Result<Rule, ConfigError> {
    let mut json = serde_json::to_value(existing)?;
    if let serde_json::Value::Object(fields) = &mut json {
        for (key, value) in patch {
            if !value.is_null() {
                fields.insert(key.clone(), serde_json::Value::from(value));
            }
        }
    }
    let mut rule: Rule =
        serde_json::from_value(json).map_err(|e| ConfigError::rule(&existing.id, e.to_string()))?;
    rule.id = existing.id.clone();
    Ok(rule)
}

fn define_rule(id: &str, definition: &BTreeMap<String, Value>) -> Result<Rule, ConfigError> {
    let json = serde_json::Value::from(&Value::Map(definition.clone()));
    let mut rule: Rule =
        serde_json::from_value(json).map_err(|e| ConfigError::rule(id, e.to_string()))?;
    rule.id = id.to_string();
    Ok(rule)
}
