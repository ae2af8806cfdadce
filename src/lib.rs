//! Frost - A rule-driven linter and quality engine for OpenAPI documents
//!
//! Frost lints OpenAPI 3.x and Swagger 2.0 documents with declarative rules.
//! A rule selects nodes with JSONPath expressions and hands them to a named
//! function; functions are built in or written as Rhai scripts.
//!
//! # Architecture
//!
//! ```text
//! RuleSetComposer -> RuleSet ─┐
//!                             ├─> Engine -> ResultSet -> ReportStatistics
//! bytes -> DocumentIndex ─────┘
//!            └─ Rolodex (external files) -> Resolver (overlay, cycles)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use frost::{execute, ExecutionOptions, RuleSetComposer};
//!
//! let ruleset = RuleSetComposer::new().load_builtin("recommended")?;
//! let spec = std::fs::read("openapi.yaml")?;
//! let result = execute(&ruleset, &spec, ExecutionOptions::new("openapi.yaml"))?;
//! for r in result.results.iter() {
//!     println!("{}:{} {} {}", r.line(), r.column(), r.rule_id, r.message);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Custom rule sets
//!
//! ```yaml
//! extends: [["vacuum:oas", recommended]]
//! rules:
//!   operation-description: off
//!   info-contact: error
//!   path-must-be-versioned:
//!     description: Paths start with a version
//!     given: $.paths
//!     severity: warn
//!     then:
//!       field: "@key"
//!       function: pattern
//!       functionOptions:
//!         match: "^/v[0-9]+/"
//! ```

pub mod cancel;
pub mod changes;
pub mod config;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod execute;
pub mod functions;
pub mod ignore;
pub mod index;
pub mod logging;
pub mod remote;
pub mod resolver;
pub mod results;
pub mod rule;
pub mod ruleset;
pub mod script;
pub mod statistics;
pub mod value;

// Re-export main types
pub use cancel::CancelToken;
pub use changes::{ChangeFilter, ChangeFilterStats};
pub use config::{ConfigError, ExecutionOptions, FetchConfig, HttpClientConfig};
pub use diagnostic::{Origin, Position, Range, RuleFunctionResult, Severity};
pub use engine::{Engine, RuleState, RuleTiming};
pub use error::{DocumentError, Error, ExecError};
pub use execute::{execute, ExecutionResult};
pub use functions::{FunctionContext, FunctionRegistry, FunctionSchema, InputNode, RuleFunction};
pub use ignore::IgnoredItems;
pub use index::{DocumentIndex, JsonPath, SpecInfo, SpecType};
pub use resolver::{CircularKind, CircularReference, ResolverWarning};
pub use results::ResultSet;
pub use rule::{Rule, RuleAction, RuleCategory, SpecFormat};
pub use ruleset::{RuleCatalog, RuleSet, RuleSetComposer};
pub use script::{load_functions, ScriptError, ScriptFunction};
pub use statistics::{quality_score, Grade, ReportStatistics};
