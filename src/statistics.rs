//! Quality score, grade and report statistics

use crate::index::{DocumentIndex, NodeRef, SpecInfo};
use crate::results::ResultSet;
use crate::rule::{RuleCategory, SpecFormat};
use serde::Serialize;
use std::fmt;

const ERROR_WEIGHT: f64 = 15.0;
const WARN_WEIGHT: f64 = 0.3;
const INFO_WEIGHT: f64 = 0.1;

/// Node count at which the size factor starts to bite
const SIZE_SCALE: f64 = 2000.0;

const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Score in `[1, 100]` from severity-weighted result counts.
///
/// The penalty shrinks as the document grows, so one error in a large
/// specification weighs less than in a tiny one. More results never raise
/// the score.
pub fn quality_score(errors: usize, warnings: usize, info: usize, node_count: usize) -> u32 {
    let penalty =
        ERROR_WEIGHT * errors as f64 + WARN_WEIGHT * warnings as f64 + INFO_WEIGHT * info as f64;
    let size_factor = 1.0 / (1.0 + (1.0 + node_count as f64 / SIZE_SCALE).ln());
    let score = 100.0 - penalty * size_factor;
    score.clamp(1.0, 100.0) as u32
}

/// Letter grade for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
    /// Below passing
    Fail,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        match score {
            96.. => Grade::APlus,
            91..=95 => Grade::A,
            86..=90 => Grade::B,
            76..=85 => Grade::C,
            66..=75 => Grade::D,
            56..=65 => Grade::F,
            _ => Grade::Fail,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::APlus => write!(f, "A+"),
            Grade::A => write!(f, "A"),
            Grade::B => write!(f, "B"),
            Grade::C => write!(f, "C"),
            Grade::D => write!(f, "D"),
            Grade::F => write!(f, "F"),
            Grade::Fail => write!(f, "💀"),
        }
    }
}

/// Results of one category
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStatistic {
    pub category: RuleCategory,
    pub name: &'static str,
    pub issues: usize,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub hints: usize,
    /// Share of all results not in this category, as a percentage
    pub score: u32,
}

/// Sizes of the main parts of the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentCounts {
    pub paths: usize,
    pub operations: usize,
    pub schemas: usize,
    pub parameters: usize,
    pub references: usize,
    pub tags: usize,
    pub security_schemes: usize,
    pub nodes: usize,
}

impl DocumentCounts {
    pub fn collect(index: &DocumentIndex, format: Option<SpecFormat>) -> Self {
        let root = index.raw().root();

        let mut counts = Self {
            references: index.references(false).len(),
            tags: len(root.get("tags")),
            nodes: index.node_count(),
            ..Self::default()
        };

        if let Some(paths) = root.get("paths") {
            for (_, item) in paths.entries() {
                counts.paths += 1;
                counts.parameters += len(item.get("parameters"));
                for method in METHODS {
                    if let Some(operation) = item.get(method) {
                        counts.operations += 1;
                        counts.parameters += len(operation.get("parameters"));
                    }
                }
            }
        }

        if format == Some(SpecFormat::Oas2) {
            counts.schemas = len(root.get("definitions"));
            counts.parameters += len(root.get("parameters"));
            counts.security_schemes = len(root.get("securityDefinitions"));
        } else if let Some(components) = root.get("components") {
            counts.schemas = len(components.get("schemas"));
            counts.parameters += len(components.get("parameters"));
            counts.security_schemes = len(components.get("securitySchemes"));
        }
        counts
    }
}

fn len(node: Option<NodeRef<'_>>) -> usize {
    node.map_or(0, |n| n.len())
}

/// Ready to render summary of an execution
#[derive(Debug, Clone, Serialize)]
pub struct ReportStatistics {
    pub spec_info: SpecInfo,
    pub file_size_bytes: usize,
    pub counts: DocumentCounts,
    pub overall_score: u32,
    pub grade: Grade,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub total_info: usize,
    pub total_hints: usize,
    pub categories: Vec<CategoryStatistic>,
}

impl ReportStatistics {
    pub fn build(
        index: &DocumentIndex,
        spec_info: &SpecInfo,
        results: &ResultSet,
        file_size_bytes: usize,
    ) -> Self {
        let counts = DocumentCounts::collect(index, spec_info.format);
        let overall_score = quality_score(
            results.error_count(),
            results.warn_count(),
            results.info_count(),
            counts.nodes,
        );

        let total = results.len();
        let breakdown = results.category_breakdown();
        let categories = RuleCategory::ALL
            .iter()
            .map(|&category| {
                let found = breakdown.get(&category).copied().unwrap_or_default();
                let issues = found.total();
                let score = if total == 0 {
                    100
                } else {
                    (100 - issues * 100 / total) as u32
                };
                CategoryStatistic {
                    category,
                    name: category.name(),
                    issues,
                    errors: found.error,
                    warnings: found.warn,
                    info: found.info,
                    hints: found.hint,
                    score,
                }
            })
            .collect();

        Self {
            spec_info: spec_info.clone(),
            file_size_bytes,
            counts,
            overall_score,
            grade: Grade::from_score(overall_score),
            total_errors: results.error_count(),
            total_warnings: results.warn_count(),
            total_info: results.info_count(),
            total_hints: results.hint_count(),
            categories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_perfect_and_floor() {
        assert_eq!(quality_score(0, 0, 0, 10), 100);
        assert_eq!(quality_score(50, 0, 0, 10), 1);
    }

    #[test]
    fn test_size_softens_penalty() {
        let small = quality_score(1, 0, 0, 100);
        let large = quality_score(1, 0, 0, 50_000);
        assert!(large > small);
        assert!(small < 100);
    }

    #[test]
    fn test_grades() {
        assert_eq!(Grade::from_score(100), Grade::APlus);
        assert_eq!(Grade::from_score(95), Grade::A);
        assert_eq!(Grade::from_score(88), Grade::B);
        assert_eq!(Grade::from_score(80), Grade::C);
        assert_eq!(Grade::from_score(70), Grade::D);
        assert_eq!(Grade::from_score(60), Grade::F);
        assert_eq!(Grade::from_score(12), Grade::Fail);
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn test_document_counts() {
        let index = DocumentIndex::parse(
            br#"openapi: 3.0.0
info: {title: t, version: "1"}
tags: [{name: pets}]
paths:
  /pets:
    parameters: [{name: limit, in: query}]
    get:
      parameters: [{name: q, in: query}]
    post: {}
components:
  schemas:
    Pet: {type: object}
    Owner: {$ref: '#/components/schemas/Pet'}
"#,
            "api.yaml",
        )
        .unwrap();
        let counts = DocumentCounts::collect(&index, Some(SpecFormat::Oas3));
        assert_eq!(counts.paths, 1);
        assert_eq!(counts.operations, 2);
        assert_eq!(counts.parameters, 2);
        assert_eq!(counts.schemas, 2);
        assert_eq!(counts.tags, 1);
        assert_eq!(counts.references, 1);
    }

    proptest! {
        #[test]
        fn prop_more_errors_never_raise_score(
            errors in 0usize..50,
            warnings in 0usize..500,
            info in 0usize..500,
            nodes in 1usize..100_000,
        ) {
            let base = quality_score(errors, warnings, info, nodes);
            prop_assert!(quality_score(errors + 1, warnings, info, nodes) <= base);
            prop_assert!((1..=100).contains(&base));
        }
    }
}
