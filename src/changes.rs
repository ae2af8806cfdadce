//! Restrict results to what changed between two revisions of a document

use crate::diagnostic::RuleFunctionResult;
use crate::error::DocumentError;
use crate::index::path::{child_path, index_path};
use crate::index::{DocumentIndex, NodeRef};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Changed lines and JSON paths of the root document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    lines: BTreeSet<usize>,
    paths: BTreeSet<String>,
}

/// What a change filter removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeFilterStats {
    pub before: usize,
    pub after: usize,
    pub dropped: usize,
    /// Rules whose every result was dropped
    pub rules_fully_filtered: Vec<String>,
    /// Rules that kept some results and lost others
    pub rules_partially_filtered: Vec<String>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: impl IntoIterator<Item = usize>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn from_paths<S: Into<String>>(paths: impl IntoIterator<Item = S>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Changes needed to turn `old` into `new`, located in `new`
    pub fn from_documents(old: &[u8], new: &[u8]) -> Result<Self, DocumentError> {
        let old = DocumentIndex::parse(old, "old")?;
        let new = DocumentIndex::parse(new, "new")?;
        let mut filter = Self::new();
        filter.diff(Some(old.raw().root()), new.raw().root(), "$");
        Ok(filter)
    }

    fn diff(&mut self, old: Option<NodeRef<'_>>, new: NodeRef<'_>, path: &str) {
        let Some(old) = old else {
            self.mark(new, path);
            return;
        };
        if old.is_mapping() && new.is_mapping() {
            for (key, value) in new.entries() {
                let name = key.text().unwrap_or_default();
                self.diff(old.get(name), value, &child_path(path, name));
            }
        } else if old.is_sequence() && new.is_sequence() {
            let previous = old.items();
            for (i, item) in new.items().into_iter().enumerate() {
                self.diff(previous.get(i).copied(), item, &index_path(path, i));
            }
        } else if old.to_value() != new.to_value() {
            self.mark(new, path);
        }
    }

    /// Record `node` and every line it spans
    fn mark(&mut self, node: NodeRef<'_>, path: &str) {
        self.paths.insert(path.to_string());
        let range = node.range();
        let end = range.end.line.max(range.start.line);
        self.lines.extend(range.start.line..=end);
    }

    pub fn add_line(&mut self, line: usize) {
        self.lines.insert(line);
    }

    pub fn add_path(&mut self, path: &str) {
        self.paths.insert(path.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.paths.is_empty()
    }

    /// Whether a result touches a change: a changed line of the root
    /// document, or a path at or below a changed path
    pub fn matches(&self, result: &RuleFunctionResult) -> bool {
        if result.file().is_empty() && self.lines.contains(&result.line()) {
            return true;
        }
        self.paths.iter().any(|changed| {
            result.path == *changed
                || result
                    .path
                    .strip_prefix(changed.as_str())
                    .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
        })
    }

    /// Keep the results touching a change
    pub fn apply(
        &self,
        results: Vec<RuleFunctionResult>,
    ) -> (Vec<RuleFunctionResult>, ChangeFilterStats) {
        let before = results.len();
        // rule id -> (kept, dropped)
        let mut per_rule: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut kept = Vec::with_capacity(before);
        for result in results {
            let counts = per_rule.entry(result.rule_id.clone()).or_default();
            if self.matches(&result) {
                counts.0 += 1;
                kept.push(result);
            } else {
                counts.1 += 1;
            }
        }

        let mut stats = ChangeFilterStats {
            before,
            after: kept.len(),
            dropped: before - kept.len(),
            ..Default::default()
        };
        for (rule_id, (kept, dropped)) in per_rule {
            match (kept, dropped) {
                (_, 0) => {}
                (0, _) => stats.rules_fully_filtered.push(rule_id),
                _ => stats.rules_partially_filtered.push(rule_id),
            }
        }
        (kept, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{Position, Range};

    fn result(rule_id: &str, path: &str, line: usize) -> RuleFunctionResult {
        let mut r = RuleFunctionResult::new("msg").with_path(path);
        r.rule_id = rule_id.to_string();
        r.range = Range::new(Position::new(line, 1), Position::new(line, 10));
        r
    }

    #[test]
    fn test_paths_match_descendants() {
        let filter = ChangeFilter::from_paths(["$.paths['/pets']"]);
        assert!(filter.matches(&result("r", "$.paths['/pets']", 1)));
        assert!(filter.matches(&result("r", "$.paths['/pets'].get", 1)));
        assert!(!filter.matches(&result("r", "$.paths['/pets2']", 1)));
        assert!(!filter.matches(&result("r", "$.paths", 1)));
    }

    #[test]
    fn test_apply_stats() {
        let filter = ChangeFilter::from_lines([4, 5]);
        let (kept, stats) = filter.apply(vec![
            result("a", "$.x", 4),
            result("a", "$.y", 9),
            result("b", "$.z", 12),
            result("c", "$.w", 5),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.before, 4);
        assert_eq!(stats.after, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.rules_fully_filtered, vec!["b".to_string()]);
        assert_eq!(stats.rules_partially_filtered, vec!["a".to_string()]);
    }

    #[test]
    fn test_from_documents() {
        let old = b"info:\n  title: Pets\n  version: '1'\npaths:\n  /pets: {}\n";
        let new = b"info:\n  title: Pet Store\n  version: '1'\npaths:\n  /pets: {}\n  /owners: {}\n";
        let filter = ChangeFilter::from_documents(old, new).unwrap();

        assert!(filter.matches(&result("r", "$.info.title", 0)));
        assert!(filter.matches(&result("r", "$.paths['/owners']", 0)));
        assert!(!filter.matches(&result("r", "$.info.version", 0)));
        assert!(filter.matches(&result("r", "$.unrelated", 2)));
        assert!(!filter.matches(&result("r", "$.unrelated", 3)));
    }
}
