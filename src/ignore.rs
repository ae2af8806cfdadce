//! Ignore file: suppress known results by rule id and JSONPath
//!
//! The file is a YAML mapping from rule id to the paths to suppress:
//!
//! ```yaml
//! oas3-missing-example:
//!   - $.components.schemas.Pet.properties.name
//! ```

use crate::diagnostic::RuleFunctionResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Rule id to the set of suppressed paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoredItems {
    rules: BTreeMap<String, BTreeSet<String>>,
}

impl IgnoredItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an ignore file; an empty file ignores nothing
    pub fn load(path: &Path) -> Result<Self, crate::config::ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, crate::config::ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let rules: Option<BTreeMap<String, Option<BTreeSet<String>>>> =
            serde_yaml::from_str(content)?;
        Ok(Self {
            rules: rules
                .unwrap_or_default()
                .into_iter()
                .map(|(id, paths)| (id, paths.unwrap_or_default()))
                .collect(),
        })
    }

    /// Write the ignore file as YAML
    pub fn save(&self, path: &Path) -> Result<(), crate::config::ConfigError> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// An ignore map suppressing every given result
    pub fn from_results(results: &[RuleFunctionResult]) -> Self {
        let mut ignored = Self::new();
        for result in results {
            ignored.add(&result.rule_id, &result.path);
        }
        ignored
    }

    pub fn add(&mut self, rule_id: &str, path: &str) {
        self.rules
            .entry(rule_id.to_string())
            .or_default()
            .insert(path.to_string());
    }

    pub fn merge(&mut self, other: &IgnoredItems) {
        for (rule_id, paths) in &other.rules {
            self.rules
                .entry(rule_id.clone())
                .or_default()
                .extend(paths.iter().cloned());
        }
    }

    /// Whether a result is suppressed: same rule id and the exact same path
    pub fn is_ignored(&self, rule_id: &str, path: &str) -> bool {
        self.rules
            .get(rule_id)
            .is_some_and(|paths| paths.contains(path))
    }

    /// Drop suppressed results, keeping the order of the rest
    pub fn filter(&self, results: Vec<RuleFunctionResult>) -> Vec<RuleFunctionResult> {
        if self.is_empty() {
            return results;
        }
        results
            .into_iter()
            .filter(|r| !self.is_ignored(&r.rule_id, &r.path))
            .collect()
    }

    /// Suppressed paths for a rule, sorted
    pub fn paths(&self, rule_id: &str) -> Vec<String> {
        self.rules
            .get(rule_id)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Number of suppressed (rule, path) pairs
    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(rule_id: &str, path: &str) -> RuleFunctionResult {
        let mut r = RuleFunctionResult::new("msg").with_path(path);
        r.rule_id = rule_id.to_string();
        r
    }

    #[test]
    fn test_parse_and_filter() {
        let ignored = IgnoredItems::parse(
            r#"
oas3-missing-example:
  - $.components.schemas.Pet.properties.name
  - $.components.schemas.Pet.properties.age
info-contact: []
"#,
        )
        .unwrap();
        assert_eq!(ignored.len(), 2);

        let results = vec![
            result("oas3-missing-example", "$.components.schemas.Pet.properties.name"),
            result("oas3-missing-example", "$.components.schemas.Pet.properties.tag"),
            result("info-contact", "$.components.schemas.Pet.properties.name"),
        ];
        let kept = ignored.filter(results);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].path, "$.components.schemas.Pet.properties.tag");
        assert_eq!(kept[1].rule_id, "info-contact");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let ignored = IgnoredItems::from_results(&[result("a", "$.x")]);
        let results = vec![result("a", "$.x"), result("a", "$.y"), result("b", "$.x")];
        let once = ignored.filter(results);
        let paths = |rs: &[RuleFunctionResult]| -> Vec<(String, String)> {
            rs.iter().map(|r| (r.rule_id.clone(), r.path.clone())).collect()
        };
        let twice = ignored.filter(once.clone());
        assert_eq!(paths(&once), paths(&twice));
    }

    #[test]
    fn test_empty_and_null_entries() {
        assert!(IgnoredItems::parse("").unwrap().is_empty());
        let ignored = IgnoredItems::parse("rule-a:\n").unwrap();
        assert!(ignored.is_empty());
        assert_eq!(ignored.rule_ids(), vec!["rule-a"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ignore.yaml");
        let mut ignored = IgnoredItems::new();
        ignored.add("rule-b", "$.paths['/b']");
        ignored.add("rule-a", "$.info");
        ignored.save(&path).unwrap();

        let loaded = IgnoredItems::load(&path).unwrap();
        assert_eq!(loaded, ignored);
        assert!(loaded.is_ignored("rule-b", "$.paths['/b']"));
        assert!(!loaded.is_ignored("rule-b", "$.paths['/a']"));
    }
}
