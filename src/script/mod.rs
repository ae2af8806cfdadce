//! Rule functions written as Rhai scripts
//!
//! A script defines `fn run_rule(input, context)` and may define
//! `fn get_schema()`. Every invocation gets a fresh engine and event loop, so
//! nothing a script does survives into the next call.
//!
//! ```rhai
//! fn run_rule(input, context) {
//!     let found = wait(fetch("https://registry.example.com/" + input));
//!     if found.status == 404 {
//!         return [#{ message: "unknown service `" + input + "`" }];
//!     }
//!     []
//! }
//! ```

pub mod api;
pub mod bridge;
pub mod event_loop;
pub mod fetch;
pub mod loader;
pub mod promise;
pub(crate) mod runtime;

pub use loader::load_functions;

use crate::diagnostic::RuleFunctionResult;
use crate::functions::{
    FunctionContext, FunctionError, FunctionSchema, InputNode, OptionKind, RuleFunction,
};
use promise::{message_of, root_cause, CANCELLED};
use rhai::{CallFnOptions, Dynamic, EvalAltResult, Map, Scope};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Entry point every script must define
pub const ENTRY_POINT: &str = "run_rule";
/// Optional schema function
pub const SCHEMA_FUNCTION: &str = "get_schema";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("unable to compile script function '{name}': {message}")]
    Compile { name: String, message: String },

    #[error("script function '{name}' does not define `run_rule(input, context)`")]
    MissingEntryPoint { name: String },

    #[error("unable to execute script function '{name}': {message}")]
    Runtime { name: String, message: String },

    #[error("script function '{name}' returned an invalid result: {message}")]
    Contract { name: String, message: String },

    #[error("script function timed out")]
    Timeout,

    #[error("script function cancelled")]
    Cancelled,

    #[error("unable to read script '{path}': {message}")]
    Io { path: String, message: String },
}

impl ScriptError {
    /// Classify an engine error raised while running `name`
    pub fn from_eval(name: &str, err: &EvalAltResult) -> Self {
        match root_cause(err) {
            EvalAltResult::ErrorTerminated(reason, _) => {
                if reason.to_string() == CANCELLED {
                    ScriptError::Cancelled
                } else {
                    ScriptError::Timeout
                }
            }
            EvalAltResult::ErrorRuntime(value, _) => ScriptError::Runtime {
                name: name.to_string(),
                message: message_of(value),
            },
            other => ScriptError::Runtime {
                name: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// A rule function backed by a Rhai script
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    name: String,
    source: Arc<str>,
    schema: FunctionSchema,
    path: Option<PathBuf>,
}

impl ScriptFunction {
    /// Compile-check `source` and read its schema.
    ///
    /// `name` is used unless `get_schema()` names the function itself.
    pub fn from_source(name: &str, source: &str) -> Result<Self, ScriptError> {
        let engine = runtime::new_engine();
        let ast = engine.compile(source).map_err(|e| ScriptError::Compile {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let mut has_entry = false;
        let mut has_schema = false;
        for function in ast.iter_functions() {
            if function.name == ENTRY_POINT && function.params.len() == 2 {
                has_entry = true;
            }
            if function.name == SCHEMA_FUNCTION && function.params.is_empty() {
                has_schema = true;
            }
        }
        if !has_entry {
            return Err(ScriptError::MissingEntryPoint {
                name: name.to_string(),
            });
        }

        let mut schema = FunctionSchema::new(name);
        if has_schema {
            let options = CallFnOptions::new().eval_ast(false);
            let declared = engine
                .call_fn_with_options::<Dynamic>(
                    options,
                    &mut Scope::new(),
                    &ast,
                    SCHEMA_FUNCTION,
                    (),
                )
                .map_err(|e| ScriptError::from_eval(name, &e))?;
            if let Some(map) = declared.try_cast::<Map>() {
                schema = parse_schema(name, &map);
            }
        }

        Ok(Self {
            name: schema.name.clone(),
            source: Arc::from(source),
            schema,
            path: None,
        })
    }

    /// Load a script file, naming it after the file stem by default
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("script");
        let mut function = Self::from_source(stem, &source)?;
        function.path = Some(path.to_path_buf());
        Ok(function)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn invoke(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> Result<Vec<RuleFunctionResult>, ScriptError> {
        let value = bridge::input_value(input, ctx.batch);
        let returned = runtime::invoke(&self.name, &self.source, value, ctx)?;
        bridge::collect_results(&self.name, returned, input, ctx.batch)
    }
}

/// Read `#{ name, description, required, properties, min_properties, max_properties }`
fn parse_schema(default_name: &str, map: &Map) -> FunctionSchema {
    let text = |key: &str| {
        map.get(key)
            .filter(|v| v.is_string())
            .map(|v| v.to_string())
    };
    let name = text("name").unwrap_or_else(|| default_name.to_string());
    let mut schema = FunctionSchema::new(&name);

    if let Some(required) = map.get("required").and_then(|r| r.clone().try_cast::<rhai::Array>()) {
        for key in required {
            schema = schema.require(&key.to_string());
        }
    }

    let property = |schema: FunctionSchema, name: &str, spec: &Dynamic| {
        let spec = spec.clone().try_cast::<Map>().unwrap_or_default();
        let kind = spec
            .get("type")
            .map(|t| OptionKind::parse(&t.to_string()))
            .unwrap_or(OptionKind::Any);
        let description = spec
            .get("description")
            .map(|d| d.to_string())
            .unwrap_or_default();
        schema.with_property(name, kind, &description)
    };
    if let Some(properties) = map.get("properties") {
        if let Some(list) = properties.clone().try_cast::<rhai::Array>() {
            for entry in &list {
                let name = entry
                    .clone()
                    .try_cast::<Map>()
                    .and_then(|m| m.get("name").map(|n| n.to_string()));
                if let Some(name) = name {
                    schema = property(schema, &name, entry);
                }
            }
        } else if let Some(props) = properties.clone().try_cast::<Map>() {
            for (name, spec) in &props {
                schema = property(schema, name.as_str(), spec);
            }
        }
    }

    for (key, apply) in [
        ("min_properties", true),
        ("minProperties", true),
        ("max_properties", false),
        ("maxProperties", false),
    ] {
        if let Some(count) = map.get(key).and_then(|v| v.as_int().ok()) {
            let count = count.max(0) as usize;
            schema = if apply {
                schema.with_min_properties(count)
            } else {
                schema.with_max_properties(count)
            };
        }
    }
    schema
}

impl RuleFunction for ScriptFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> FunctionSchema {
        self.schema.clone()
    }

    fn category(&self) -> &str {
        "custom"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let outcome = if ctx.batch {
            self.invoke(input, ctx)
        } else {
            // one fresh engine per node
            input.iter().try_fold(Vec::new(), |mut results, item| {
                results.extend(self.invoke(std::slice::from_ref(item), ctx)?);
                Ok::<_, ScriptError>(results)
            })
        };
        match outcome {
            Ok(results) => Ok(results),
            Err(ScriptError::Timeout) => Err(FunctionError::Timeout.into()),
            Err(ScriptError::Cancelled) => Err(FunctionError::Cancelled.into()),
            Err(e) => Err(e.into()),
        }
    }

    fn supports_batch(&self) -> bool {
        true
    }
}
