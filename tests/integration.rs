//! Integration tests for frost

use frost::logging::Logger;
use frost::{
    execute, load_functions, CircularKind, ExecutionOptions, IgnoredItems, Rule, RuleCatalog,
    RuleFunction, RuleSet, RuleSetComposer, RuleState, ScriptFunction, Severity,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixtures_path().join(name)).unwrap()
}

fn options(name: &str) -> ExecutionOptions {
    ExecutionOptions::new(name).silent()
}

#[test]
fn test_recommended_rules_on_minimal_document() {
    let ruleset = RuleCatalog::builtin().recommended();
    let result = execute(&ruleset, &fixture("minimal.yaml"), options("minimal.yaml")).unwrap();

    assert_eq!(result.results.error_count(), 0);
    assert!(result.results.len() >= 2);
    assert_eq!(result.results.by_rule("info-contact").len(), 1);
    assert_eq!(result.results.by_rule("info-description").len(), 1);
    assert!((80..=100).contains(&result.stats.overall_score));
    assert!(result.errors.is_empty());

    for r in result.results.iter() {
        assert!(!r.rule_id.is_empty());
        assert!(r.rule.is_some());
        assert!(r.path.starts_with('$'));
        assert!(r.line() > 0);
    }
}

#[test]
fn test_duplicate_operation_ids() {
    let ruleset = RuleCatalog::builtin().recommended();
    let result = execute(
        &ruleset,
        &fixture("duplicate-operation-ids.yaml"),
        options("duplicate-operation-ids.yaml"),
    )
    .unwrap();

    let duplicates = result.results.by_rule("operation-operationId-unique");
    assert_eq!(duplicates.len(), 2);
    assert!(duplicates.iter().all(|r| r.severity == Severity::Error));
    let paths: Vec<&str> = duplicates.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "$.paths['/items'].get.operationId",
            "$.paths['/archive'].get.operationId",
        ]
    );
}

#[test]
fn test_script_awaiting_forever_times_out() {
    let source = r#"
        fn run_rule(input, context) {
            let p = new_promise(|resolve, reject| {
                set_timeout(|| resolve.call(1), 60000);
            });
            wait(p);
            []
        }
    "#;
    let function = ScriptFunction::from_source("slowCheck", source).unwrap();
    let ruleset = RuleSet::from_rules(vec![
        Rule::new("slow-rule", "$.info", "slowCheck").with_severity(Severity::Info),
        Rule::new("info-title", "$.info", "truthy").with_field("description"),
    ]);
    let mut options = options("minimal.yaml")
        .with_timeout(Duration::from_millis(50))
        .with_function(Arc::new(function));
    options.rule_timings = true;

    let result = execute(&ruleset, &fixture("minimal.yaml"), options).unwrap();
    let slow = result.results.by_rule("slow-rule");
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].message, "rule 'slow-rule' timed out after 50ms");
    assert_eq!(slow[0].severity, Severity::Info);
    let timing = result.timings.iter().find(|t| t.rule_id == "slow-rule").unwrap();
    assert_eq!(timing.state, RuleState::Timeout);
    // the other rule still ran
    assert_eq!(result.results.by_rule("info-title").len(), 1);
}

#[test]
fn test_fetch_blocked_by_policy() {
    let source = r#"
        fn run_rule(input, context) {
            fetch("http://example.com/x")
                .then(|response| [])
                .catch_error(|err| [#{ message: "lookup failed: " + err }])
                .wait()
        }
    "#;
    let function = ScriptFunction::from_source("remoteCheck", source).unwrap();
    let ruleset = RuleSet::from_rules(vec![Rule::new("remote-rule", "$.info", "remoteCheck")]);
    let options = options("minimal.yaml").with_function(Arc::new(function));

    let result = execute(&ruleset, &fixture("minimal.yaml"), options).unwrap();
    let results = result.results.by_rule("remote-rule");
    assert_eq!(results.len(), 1);
    assert!(results[0].message.contains("insecure HTTP not allowed"));
    assert_eq!(results[0].severity, Severity::Warn);
}

#[test]
fn test_circular_reference_reported() {
    let result = execute(
        &RuleSet::default(),
        &fixture("circular.yaml"),
        options("circular.yaml"),
    )
    .unwrap();

    let cycles = result.circular_references();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].kind, CircularKind::Generic);
    assert_eq!(cycles[0].journey, vec!["A", "B", "A"]);
    assert_eq!(cycles[0].loop_index, 0);
}

#[test]
fn test_ignore_file_suppresses_paths() {
    let ruleset = RuleCatalog::builtin().recommended();
    let spec = fixture("missing-examples.yaml");

    let full = execute(&ruleset, &spec, options("missing-examples.yaml")).unwrap();
    assert_eq!(full.results.by_rule("oas3-missing-example").len(), 5);

    let ignore = IgnoredItems::parse(
        r#"
oas3-missing-example:
  - $.components.schemas.Pet.properties.name
  - $.components.schemas.Pet.properties.age
  - $.components.schemas.Pet.properties.tag
"#,
    )
    .unwrap();
    let filtered = execute(
        &ruleset,
        &spec,
        options("missing-examples.yaml").with_ignore(ignore),
    )
    .unwrap();

    let remaining = filtered.results.by_rule("oas3-missing-example");
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|r| r.path.ends_with("color") || r.path.ends_with("owner")));
    assert_eq!(filtered.results.len(), full.results.len() - 3);
}

#[test]
fn test_custom_ruleset_with_script_functions() {
    let logger = Logger::silent();
    let functions = load_functions(&fixtures_path().join("functions"), &logger).unwrap();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].name(), "titleLength");

    let ruleset = RuleSetComposer::new()
        .load_file(&fixtures_path().join("ruleset.yaml"))
        .unwrap();
    assert!(ruleset.get("info-contact").is_none());
    assert_eq!(
        ruleset.get("operation-operationId-unique").map(|r| r.severity),
        Some(Severity::Warn)
    );

    let mut options = options("minimal.yaml");
    for function in functions {
        options = options.with_function(function);
    }
    let result = execute(&ruleset, &fixture("minimal.yaml"), options).unwrap();

    let short = result.results.by_rule("title-length");
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].message, "title `t` is shorter than 5");
    assert_eq!(short[0].severity, Severity::Hint);
    assert_eq!(short[0].path, "$.info.title");
    assert!(result.results.by_rule("info-contact").is_empty());
}

#[test]
fn test_deterministic_output() {
    let ruleset = RuleCatalog::builtin().all();
    let spec = fixture("duplicate-operation-ids.yaml");
    let first = execute(&ruleset, &spec, options("api.yaml").with_jobs(4)).unwrap();
    let second = execute(&ruleset, &spec, options("api.yaml").with_jobs(1)).unwrap();
    assert_eq!(
        first.results.to_json().unwrap(),
        second.results.to_json().unwrap()
    );
}
