//! Conversions between engine data and script values
//!
//! Covers option and node values, the `context` map, batch input, results
//! coming back from `run_rule`, and the `vacuum_<name>` bridges that let
//! scripts call the core functions.

use super::promise::{terminated, RhaiResult, CANCELLED, TIMEOUT};
use super::ScriptError;
use crate::config::FetchConfig;
use crate::diagnostic::RuleFunctionResult;
use crate::cancel::CancelToken;
use crate::functions::core::BRIDGED;
use crate::functions::{
    project_field, FunctionContext, FunctionError, FunctionRegistry, InputNode, RuleFunction,
};
use crate::index::{DocumentIndex, SpecInfo};
use crate::logging::Logger;
use crate::rule::Rule;
use crate::value::Value;
use rhai::{Array, Dynamic, Engine, Map};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Int(i) => Dynamic::from(*i),
        Value::Float(f) => Dynamic::from(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
        Value::Map(map) => {
            let mut out = Map::new();
            for (key, item) in map {
                out.insert(key.as_str().into(), to_dynamic(item));
            }
            Dynamic::from_map(out)
        }
    }
}

pub fn from_dynamic(value: &Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::Int(i);
    }
    if let Ok(f) = value.as_float() {
        return Value::Float(f);
    }
    if value.is_string() {
        return Value::String(value.to_string());
    }
    if value.is_array() {
        if let Some(items) = value.clone().try_cast::<Array>() {
            return Value::List(items.iter().map(from_dynamic).collect());
        }
    }
    if value.is_map() {
        if let Some(map) = value.clone().try_cast::<Map>() {
            let converted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.to_string(), from_dynamic(v)))
                .collect();
            return Value::Map(converted);
        }
    }
    Value::String(value.to_string())
}

fn serialized<T: serde::Serialize>(item: &T) -> Value {
    serde_json::to_value(item)
        .map(Value::from)
        .unwrap_or(Value::Null)
}

/// The `context` argument of `run_rule`
pub fn context_value(ctx: &FunctionContext<'_>) -> Dynamic {
    let mut context = Map::new();
    context.insert("rule".into(), to_dynamic(&serialized(&**ctx.rule)));
    context.insert("given".into(), Dynamic::from(ctx.given.to_string()));
    context.insert(
        "field".into(),
        ctx.field()
            .map_or(Dynamic::UNIT, |f| Dynamic::from(f.to_string())),
    );
    context.insert("options".into(), to_dynamic(ctx.options));
    context.insert("spec_info".into(), to_dynamic(&serialized(ctx.spec_info)));
    Dynamic::from_map(context)
}

/// The `input` argument: a plain value per node, `[#{value, index}]` in batch mode
pub fn input_value(input: &[InputNode<'_>], batch: bool) -> Dynamic {
    if !batch {
        return input
            .first()
            .map_or(Dynamic::UNIT, |item| to_dynamic(&item.node.to_value()));
    }
    let items: Array = input
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let mut entry = Map::new();
            entry.insert("value".into(), to_dynamic(&item.node.to_value()));
            entry.insert("index".into(), Dynamic::from(index as i64));
            Dynamic::from_map(entry)
        })
        .collect();
    Dynamic::from_array(items)
}

fn batch_index(entry: &Map) -> Option<i64> {
    if let Some(input) = entry.get("input").and_then(|i| i.clone().try_cast::<Map>()) {
        if let Some(index) = input.get("index").and_then(|i| i.as_int().ok()) {
            return Some(index);
        }
    }
    entry.get("index").and_then(|i| i.as_int().ok())
}

/// Turn what `run_rule` returned into results anchored on the input
pub fn collect_results(
    name: &str,
    value: Dynamic,
    input: &[InputNode<'_>],
    batch: bool,
) -> Result<Vec<RuleFunctionResult>, ScriptError> {
    if value.is_unit() || input.is_empty() {
        return Ok(Vec::new());
    }
    let type_name = value.type_name().to_string();
    let Some(entries) = value.try_cast::<Array>() else {
        return Err(ScriptError::Contract {
            name: name.to_string(),
            message: format!("run_rule must return an array of results, not {}", type_name),
        });
    };

    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(entry) = entry.try_cast::<Map>() else {
            return Err(ScriptError::Contract {
                name: name.to_string(),
                message: "every result must be a map with a `message`".into(),
            });
        };
        let message = entry
            .get("message")
            .filter(|m| !m.is_unit())
            .map(|m| m.to_string())
            .ok_or_else(|| ScriptError::Contract {
                name: name.to_string(),
                message: "result is missing `message`".into(),
            })?;

        let node = if batch {
            let index = batch_index(&entry).ok_or_else(|| ScriptError::Contract {
                name: name.to_string(),
                message: "batch result is missing `input.index`".into(),
            })?;
            usize::try_from(index)
                .ok()
                .and_then(|i| input.get(i))
                .ok_or_else(|| ScriptError::Contract {
                    name: name.to_string(),
                    message: format!("batch result index {} is out of range", index),
                })?
        } else {
            &input[0]
        };

        let mut result = node.result(message);
        if let Some(path) = entry.get("path").filter(|p| p.is_string()) {
            result = result.with_path(path.to_string());
        }
        results.push(result);
    }
    Ok(results)
}

/// What the core bridges need from the invocation
struct BridgeEnv {
    spec_info: SpecInfo,
    fetch_config: FetchConfig,
    deadline: Instant,
    cancel: CancelToken,
    logger: Logger,
}

fn call_core(
    function: &Arc<dyn RuleFunction>,
    env: &BridgeEnv,
    value: &Dynamic,
    options: &Dynamic,
) -> RhaiResult<Array> {
    let mut options = from_dynamic(options);
    let field = match &mut options {
        Value::Map(map) => map.remove("field").and_then(|f| f.as_str().map(String::from)),
        _ => None,
    };
    let name = function.name();
    let mut rule = Rule::new(&format!("vacuum_{}", name), "$", name).with_options(options);
    if let Some(field) = &field {
        rule = rule.with_field(field);
    }
    let rule = Arc::new(rule);
    let action = rule
        .actions()
        .first()
        .ok_or_else(|| format!("vacuum_{}: rule has no action", name))?;

    let index = DocumentIndex::from_value(&from_dynamic(value));
    let tree = index.raw();
    let ctx = FunctionContext {
        rule: &rule,
        action,
        given: "$",
        options: &action.options,
        index: &index,
        tree,
        spec_info: &env.spec_info,
        fetch_config: &env.fetch_config,
        fetch: None,
        deadline: env.deadline,
        cancel: &env.cancel,
        logger: &env.logger,
        batch: false,
    };

    let root = InputNode {
        node: tree.root(),
        path: "$".to_string(),
        key: None,
        index: 0,
    };
    let input = match (&field, function.inspects_field()) {
        (Some(field), false) => match project_field(&root, field) {
            Some(projected) => projected,
            None => return Ok(Array::new()),
        },
        _ => root,
    };

    let results = function.run(&[input], &ctx).map_err(|err| {
        match err.downcast_ref::<FunctionError>() {
            Some(FunctionError::Timeout) => terminated(TIMEOUT),
            Some(FunctionError::Cancelled) => terminated(CANCELLED),
            None => format!("vacuum_{}: {}", name, err).into(),
        }
    })?;

    Ok(results
        .into_iter()
        .map(|r| {
            let mut entry = Map::new();
            entry.insert("message".into(), Dynamic::from(r.message));
            entry.insert("path".into(), Dynamic::from(r.path));
            Dynamic::from_map(entry)
        })
        .collect())
}

/// Register `vacuum_<name>(value[, options])` for every bridged core function
pub(crate) fn register_core(engine: &mut Engine, ctx: &FunctionContext<'_>) {
    let env = Rc::new(BridgeEnv {
        spec_info: ctx.spec_info.clone(),
        fetch_config: ctx.fetch_config.clone(),
        deadline: ctx.deadline,
        cancel: ctx.cancel.clone(),
        logger: ctx.logger.clone(),
    });
    let registry = FunctionRegistry::builtin();
    for name in BRIDGED {
        let Some(function) = registry.get(name).cloned() else {
            continue;
        };
        let bridge_name = format!("vacuum_{}", name);

        let (f, e) = (function.clone(), env.clone());
        engine.register_fn(
            bridge_name.clone(),
            move |value: Dynamic, options: Dynamic| -> RhaiResult<Array> {
                call_core(&f, &e, &value, &options)
            },
        );
        let (f, e) = (function, env.clone());
        engine.register_fn(bridge_name, move |value: Dynamic| -> RhaiResult<Array> {
            call_core(&f, &e, &value, &Dynamic::UNIT)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::Harness;
    use crate::index::JsonPath;

    #[test]
    fn test_value_conversion_keeps_types() {
        let json: serde_json::Value = serde_json::json!({
            "s": "text", "i": 3, "f": 1.5, "b": true, "n": null, "l": [1, "two"]
        });
        let value = Value::from(json);
        let back = from_dynamic(&to_dynamic(&value));
        assert_eq!(back, value);
    }

    #[test]
    fn test_batch_input_shape() {
        let harness = Harness::new("a: 1\nb: 2\n", Rule::new("r", "$.*", "x"));
        let matches = JsonPath::parse("$.*").unwrap().query(harness.index.raw());
        let input: Vec<InputNode> = matches
            .iter()
            .enumerate()
            .map(|(i, m)| InputNode::from_match(m, i))
            .collect();
        let value = input_value(&input, true);
        let items = value.try_cast::<Array>().unwrap();
        assert_eq!(items.len(), 2);
        let second = items[1].clone().try_cast::<Map>().unwrap();
        assert_eq!(second.get("index").unwrap().as_int().unwrap(), 1);
        assert_eq!(second.get("value").unwrap().as_int().unwrap(), 2);
    }

    fn map(entries: &[(&str, Dynamic)]) -> Dynamic {
        let mut out = Map::new();
        for (k, v) in entries {
            out.insert((*k).into(), v.clone());
        }
        Dynamic::from_map(out)
    }

    #[test]
    fn test_collect_batch_results() {
        let harness = Harness::new("a: 1\nb: 2\n", Rule::new("r", "$.*", "x"));
        let matches = JsonPath::parse("$.*").unwrap().query(harness.index.raw());
        let input: Vec<InputNode> = matches
            .iter()
            .enumerate()
            .map(|(i, m)| InputNode::from_match(m, i))
            .collect();

        let returned = Dynamic::from_array(vec![map(&[
            ("message", Dynamic::from("second is wrong")),
            ("input", map(&[("index", Dynamic::from(1_i64))])),
        ])]);
        let results = collect_results("s", returned, &input, true).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.b");
        assert_eq!(results[0].line(), 2);

        let missing = Dynamic::from_array(vec![map(&[("message", Dynamic::from("x"))])]);
        let err = collect_results("s", missing, &input, true).unwrap_err();
        assert!(err.to_string().contains("input.index"));
    }

    #[test]
    fn test_collect_rejects_non_array() {
        let harness = Harness::new("a: 1\n", Rule::new("r", "$", "x"));
        let matches = JsonPath::parse("$").unwrap().query(harness.index.raw());
        let input = vec![InputNode::from_match(&matches[0], 0)];
        let err = collect_results("s", Dynamic::from(5_i64), &input, false).unwrap_err();
        assert!(matches!(err, ScriptError::Contract { .. }));
        assert!(collect_results("s", Dynamic::UNIT, &input, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_core_bridge_from_script() {
        let harness = Harness::new("a: 1\n", Rule::new("r", "$", "x"));
        let ctx = harness.context();
        let mut engine = Engine::new();
        register_core(&mut engine, &ctx);

        let results: Array = engine
            .eval(r#"vacuum_truthy(#{ name: "" }, #{ field: "name" })"#)
            .unwrap();
        assert_eq!(results.len(), 1);

        let results: Array = engine
            .eval(r#"vacuum_pattern("abc", #{ "match": "^x" })"#)
            .unwrap();
        assert_eq!(results.len(), 1);
        let first = results[0].clone().try_cast::<Map>().unwrap();
        assert!(first.get("message").unwrap().to_string().contains("abc"));

        let results: Array = engine.eval(r#"vacuum_defined(#{ a: 1 }, #{ field: "a" })"#).unwrap();
        assert!(results.is_empty());
    }
}
