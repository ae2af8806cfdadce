//! The execution pipeline
//!
//! ```text
//! bytes -> DocumentIndex -> Rolodex -> SpecInfo -> Resolver -> Engine -> ResultSet
//! ```
//!
//! Configuration and document failures abort with an [`Error`]. Everything
//! the engine recovers from is returned in [`ExecutionResult::errors`].

use crate::changes::ChangeFilterStats;
use crate::config::ExecutionOptions;
use crate::engine::{Document, Engine, RuleTiming};
use crate::error::{Error, ExecError};
use crate::functions::FunctionRegistry;
use crate::ignore::IgnoredItems;
use crate::index::rolodex::Rolodex;
use crate::index::{DocumentIndex, SpecInfo};
use crate::logging::{self, Logger};
use crate::remote::RemoteLoader;
use crate::resolver::{ReferenceGraph, Resolver, ResolverWarning};
use crate::results::ResultSet;
use crate::ruleset::RuleSet;
use crate::statistics::ReportStatistics;
use std::path::Path;
use std::time::Instant;

/// File name used for the root document when none is configured
const DEFAULT_FILE_NAME: &str = "openapi.yaml";

/// Everything one execution produced
#[derive(Debug)]
pub struct ExecutionResult {
    /// Sorted, filtered results
    pub results: ResultSet,
    /// Recovered conditions: cycles, path lookups, deadline and cancellation
    pub errors: Vec<ExecError>,
    pub spec_info: SpecInfo,
    /// The document and every file pulled in through references
    pub index: DocumentIndex,
    pub stats: ReportStatistics,
    pub resolver_warnings: Vec<ResolverWarning>,
    /// Present with `build_deep_graph`
    pub graph: Option<ReferenceGraph>,
    /// Rule and path pairs skipped through inline ignore markers
    pub ignored: IgnoredItems,
    /// Populated with `rule_timings`
    pub timings: Vec<RuleTiming>,
    /// Present when a change filter was applied
    pub change_stats: Option<ChangeFilterStats>,
}

impl ExecutionResult {
    pub fn has_errors(&self) -> bool {
        self.results.error_count() > 0
    }

    /// Detected reference cycles that were not suppressed
    pub fn circular_references(&self) -> Vec<&crate::resolver::CircularReference> {
        self.errors
            .iter()
            .filter_map(|e| match e {
                ExecError::CircularReference(circ) => Some(circ),
                _ => None,
            })
            .collect()
    }
}

/// Lint `spec` with `ruleset`
pub fn execute(
    ruleset: &RuleSet,
    spec: &[u8],
    options: ExecutionOptions,
) -> Result<ExecutionResult, Error> {
    let start = Instant::now();
    let logger = options.make_logger();
    if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        return Err(Error::Cancelled);
    }

    let file_name = if options.spec_file_name.is_empty() {
        DEFAULT_FILE_NAME
    } else {
        options.spec_file_name.as_str()
    };

    let registry = build_registry(&options);
    ruleset.validate(&registry)?;

    let mut index = DocumentIndex::parse(spec, file_name)?;
    let spec_info = if options.skip_document_check {
        SpecInfo::extract(&index, file_name)
            .unwrap_or_else(|_| SpecInfo::unknown(&index, file_name))
    } else {
        SpecInfo::extract(&index, file_name)?
    };
    logger.debug(
        logging::ENGINE,
        format_args!(
            "linting '{}' ({:?} {})",
            file_name, spec_info.spec_type, spec_info.version
        ),
    );

    index.set_root_location(&root_location(options.base.as_deref(), file_name));
    let mut resolver_warnings = load_references(&mut index, &options, &logger);

    let view = Resolver::new(&index, &logger)
        .with_options(options.resolver_options())
        .resolve();
    resolver_warnings.extend(view.warnings.iter().cloned());

    let rules = ruleset.frozen();
    let output = Engine::new(&registry, &options)
        .with_logger(logger.clone())
        .run(
            &rules,
            Document {
                index: &index,
                view: &view,
                spec_info: &spec_info,
            },
        );

    let mut errors: Vec<ExecError> = view
        .reportable()
        .into_iter()
        .map(ExecError::CircularReference)
        .collect();
    errors.extend(output.errors);

    let mut results = ResultSet::new(output.results);
    if let Some(ignore) = &options.ignore {
        results.filter_by_ignore(ignore);
    }
    let change_stats = options
        .change_filter
        .as_ref()
        .map(|filter| results.filter_by_changes(filter));
    results.sort_by_location();

    let stats = ReportStatistics::build(&index, &spec_info, &results, spec.len());
    logger.info(
        logging::ENGINE,
        format_args!(
            "'{}' scored {} ({}) with {} result(s) in {:?}",
            file_name,
            stats.overall_score,
            stats.grade,
            results.len(),
            start.elapsed()
        ),
    );

    Ok(ExecutionResult {
        results,
        errors,
        spec_info,
        index,
        stats,
        resolver_warnings,
        graph: view.graph.clone(),
        ignored: output.ignored,
        timings: if options.rule_timings {
            output.timings
        } else {
            Vec::new()
        },
        change_stats,
    })
}

/// Built-in functions plus the caller's, which win on name clashes
fn build_registry(options: &ExecutionOptions) -> FunctionRegistry {
    let mut registry = FunctionRegistry::builtin();
    for (name, function) in &options.custom_functions {
        registry.register_as(name, function.clone());
    }
    registry
}

/// Location relative references of the root document resolve against
fn root_location(base: Option<&Path>, file_name: &str) -> String {
    match base {
        Some(base) => base.join(file_name).to_string_lossy().replace('\\', "/"),
        None => file_name.to_string(),
    }
}

fn load_references(
    index: &mut DocumentIndex,
    options: &ExecutionOptions,
    logger: &Logger,
) -> Vec<ResolverWarning> {
    let remote = if options.allow_remote {
        match RemoteLoader::new(&options.http_client_config) {
            Ok(loader) => Some(loader),
            Err(e) => {
                logger.warn(
                    logging::RESOLVER,
                    format_args!("remote references disabled: {}", e),
                );
                None
            }
        }
    } else {
        None
    };

    Rolodex::new(logger)
        .with_remote(remote.as_ref())
        .with_extensions(options.extract_references_from_extensions)
        .load(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::config::ConfigError;
    use crate::error::DocumentError;
    use crate::rule::Rule;
    use crate::ruleset::builtin::RuleCatalog;
    use tempfile::TempDir;

    const PETSTORE: &str = r#"openapi: 3.0.3
info:
  title: Pets
  version: "1.0"
paths:
  /pets:
    get:
      operationId: listPets
      responses:
        "200":
          description: ok
"#;

    fn ruleset(rules: Vec<Rule>) -> RuleSet {
        RuleSet::from_rules(rules)
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let options = ExecutionOptions::new("api.yaml").silent().with_cancel(token);
        let err = execute(&RuleSet::default(), PETSTORE.as_bytes(), options).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_empty_document() {
        let options = ExecutionOptions::new("api.yaml").silent();
        let err = execute(&RuleSet::default(), b"", options).unwrap_err();
        assert!(matches!(err, Error::Document(DocumentError::Empty)));
    }

    #[test]
    fn test_unsupported_document() {
        let err = execute(
            &RuleSet::default(),
            b"name: not an api\n",
            ExecutionOptions::new("x.yaml").silent(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Document(DocumentError::Unsupported)));

        let result = execute(
            &RuleSet::default(),
            b"name: not an api\n",
            ExecutionOptions::new("x.yaml").silent().skip_document_check(true),
        )
        .unwrap();
        assert_eq!(result.spec_info.spec_type, crate::index::SpecType::Unknown);
    }

    #[test]
    fn test_invalid_ruleset_is_config_error() {
        let set = ruleset(vec![Rule::new("broken", "$.info", "noSuchFunction")]);
        let err = execute(&set, PETSTORE.as_bytes(), ExecutionOptions::new("api.yaml").silent())
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Rule { .. })));
    }

    #[test]
    fn test_results_are_sorted_and_scored() {
        let set = RuleCatalog::builtin().recommended();
        let result =
            execute(&set, PETSTORE.as_bytes(), ExecutionOptions::new("api.yaml").silent()).unwrap();
        let lines: Vec<usize> = result.results.iter().map(|r| r.line()).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert!(result.stats.overall_score >= 1);
        assert_eq!(result.stats.counts.operations, 1);
        assert!(result.timings.is_empty());
    }

    #[test]
    fn test_ignore_and_timings() {
        let set = ruleset(vec![Rule::new("op-summary", "$.paths[*][*]", "truthy")
            .with_field("summary")]);
        let mut ignore = IgnoredItems::new();
        ignore.add("op-summary", "$.paths['/pets'].get.summary");

        let mut options = ExecutionOptions::new("api.yaml").silent().with_ignore(ignore);
        options.rule_timings = true;
        let result = execute(&set, PETSTORE.as_bytes(), options).unwrap();
        assert!(result.results.is_empty());
        assert_eq!(result.timings.len(), 1);
        assert_eq!(result.timings[0].rule_id, "op-summary");
    }

    #[test]
    fn test_external_reference_with_base() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("pet.yaml"),
            "type: object\nproperties:\n  name:\n    type: string\n",
        )
        .unwrap();
        let spec = r#"openapi: 3.0.3
info: {title: t, version: "1"}
paths: {}
components:
  schemas:
    Pet:
      $ref: './pet.yaml'
    Missing:
      $ref: './missing.yaml'
"#;
        let options = ExecutionOptions::new("api.yaml").silent().with_base(dir.path());
        let result = execute(&RuleSet::default(), spec.as_bytes(), options).unwrap();
        assert_eq!(result.index.files().len(), 2);
        assert!(result
            .resolver_warnings
            .iter()
            .any(|w| w.reference == "./missing.yaml"));
    }
}
