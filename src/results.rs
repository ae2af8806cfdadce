//! The authoritative list of results and its aggregate views

use crate::changes::{ChangeFilter, ChangeFilterStats};
use crate::diagnostic::{RuleFunctionResult, Severity};
use crate::ignore::IgnoredItems;
use crate::rule::RuleCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// Ordered results of one execution
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    results: Vec<RuleFunctionResult>,
}

impl ResultSet {
    pub fn new(results: Vec<RuleFunctionResult>) -> Self {
        Self { results }
    }

    pub fn add(&mut self, results: impl IntoIterator<Item = RuleFunctionResult>) {
        self.results.extend(results);
    }

    /// Stable sort by (file, line, column, rule id)
    pub fn sort_by_location(&mut self) {
        self.results.sort_by(|a, b| {
            a.file()
                .cmp(b.file())
                .then(a.line().cmp(&b.line()))
                .then(a.column().cmp(&b.column()))
                .then(a.rule_id.cmp(&b.rule_id))
        });
    }

    pub fn filter_by_ignore(&mut self, ignored: &IgnoredItems) {
        self.results = ignored.filter(std::mem::take(&mut self.results));
    }

    pub fn filter_by_changes(&mut self, filter: &ChangeFilter) -> ChangeFilterStats {
        let (kept, stats) = filter.apply(std::mem::take(&mut self.results));
        self.results = kept;
        stats
    }

    pub fn results(&self) -> &[RuleFunctionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<RuleFunctionResult> {
        self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RuleFunctionResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn count(&self, severity: Severity) -> usize {
        self.results.iter().filter(|r| r.severity == severity).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warn_count(&self) -> usize {
        self.count(Severity::Warn)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    pub fn hint_count(&self) -> usize {
        self.count(Severity::Hint)
    }

    pub fn by_severity(&self, severity: Severity) -> Vec<&RuleFunctionResult> {
        self.results.iter().filter(|r| r.severity == severity).collect()
    }

    pub fn by_category(&self, category: RuleCategory) -> Vec<&RuleFunctionResult> {
        self.results
            .iter()
            .filter(|r| r.category() == Some(category))
            .collect()
    }

    pub fn by_rule(&self, rule_id: &str) -> Vec<&RuleFunctionResult> {
        self.results.iter().filter(|r| r.rule_id == rule_id).collect()
    }

    /// Results grouped by rule id, in rule id order
    pub fn results_by_rule(&self) -> BTreeMap<&str, Vec<&RuleFunctionResult>> {
        let mut grouped: BTreeMap<&str, Vec<&RuleFunctionResult>> = BTreeMap::new();
        for result in &self.results {
            grouped.entry(result.rule_id.as_str()).or_default().push(result);
        }
        grouped
    }

    /// Result counts per category and severity
    pub fn category_breakdown(&self) -> BTreeMap<RuleCategory, SeverityCounts> {
        let mut breakdown: BTreeMap<RuleCategory, SeverityCounts> = BTreeMap::new();
        for result in &self.results {
            if let Some(category) = result.category() {
                breakdown.entry(category).or_default().record(result.severity);
            }
        }
        breakdown
    }

    /// Quality score for a document of `node_count` nodes
    pub fn score(&self, node_count: usize) -> u32 {
        crate::statistics::quality_score(
            self.error_count(),
            self.warn_count(),
            self.info_count(),
            node_count,
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.results)
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a RuleFunctionResult;
    type IntoIter = std::slice::Iter<'a, RuleFunctionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Number of results at each severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub error: usize,
    pub warn: usize,
    pub info: usize,
    pub hint: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warn => self.warn += 1,
            Severity::Info => self.info += 1,
            Severity::Hint => self.hint += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.error + self.warn + self.info + self.hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Origin, Position, Range};
    use crate::rule::Rule;
    use std::sync::Arc;

    fn result(
        rule: &Arc<Rule>,
        line: usize,
        column: usize,
        file: Option<&str>,
    ) -> RuleFunctionResult {
        let mut r = RuleFunctionResult::new(format!("{}:{}", line, column))
            .with_path("$")
            .with_severity(rule.severity);
        r.rule_id = rule.id.clone();
        r.rule = Some(rule.clone());
        r.range = Range::new(Position::new(line, column), Position::new(line, column));
        r.origin = file.map(|f| Origin {
            file: f.to_string(),
            line,
            column,
        });
        r
    }

    #[test]
    fn test_sort_by_location() {
        let a = Arc::new(Rule::new("a", "$", "truthy"));
        let b = Arc::new(Rule::new("b", "$", "truthy"));
        let mut set = ResultSet::new(vec![
            result(&b, 3, 1, None),
            result(&a, 3, 1, None),
            result(&a, 1, 5, Some("other.yaml")),
            result(&b, 1, 9, None),
            result(&a, 1, 2, None),
        ]);
        set.sort_by_location();
        let order: Vec<(String, usize, usize)> = set
            .iter()
            .map(|r| (r.rule_id.clone(), r.line(), r.column()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1, 2),
                ("b".to_string(), 1, 9),
                ("a".to_string(), 3, 1),
                ("b".to_string(), 3, 1),
                ("a".to_string(), 1, 5),
            ]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let a = Arc::new(Rule::new("a", "$", "truthy"));
        let mut first = result(&a, 2, 2, None);
        first.message = "first".into();
        let mut second = result(&a, 2, 2, None);
        second.message = "second".into();
        let mut set = ResultSet::new(vec![first, second]);
        set.sort_by_location();
        assert_eq!(set.results()[0].message, "first");
    }

    #[test]
    fn test_counts_and_groups() {
        let error = Arc::new(
            Rule::new("err", "$", "truthy")
                .with_severity(Severity::Error)
                .with_category(RuleCategory::Operations),
        );
        let hint = Arc::new(
            Rule::new("hint", "$", "truthy")
                .with_severity(Severity::Hint)
                .with_category(RuleCategory::Tags),
        );
        let set = ResultSet::new(vec![
            result(&error, 1, 1, None),
            result(&error, 2, 1, None),
            result(&hint, 3, 1, None),
        ]);
        assert_eq!(set.error_count(), 2);
        assert_eq!(set.warn_count(), 0);
        assert_eq!(set.hint_count(), 1);
        assert_eq!(set.by_rule("err").len(), 2);
        assert_eq!(set.by_category(RuleCategory::Tags).len(), 1);
        assert_eq!(set.results_by_rule().keys().copied().collect::<Vec<_>>(), vec!["err", "hint"]);

        let breakdown = set.category_breakdown();
        assert_eq!(breakdown[&RuleCategory::Operations].error, 2);
        assert_eq!(breakdown[&RuleCategory::Tags].total(), 1);

        assert!(set.score(100) < ResultSet::default().score(100));
        assert_eq!(ResultSet::default().score(100), 100);
    }

    #[test]
    fn test_to_json() {
        let rule = Arc::new(Rule::new("info-contact", "$", "truthy"));
        let set = ResultSet::new(vec![result(&rule, 4, 3, None)]);
        let json: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["rule_id"], "info-contact");
        assert_eq!(json[0]["range"]["start"]["line"], 4);
    }
}
