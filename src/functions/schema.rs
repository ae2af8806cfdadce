//! JSON Schema validation of document nodes

use super::{FunctionContext, FunctionSchema, InputNode, OptionKind, RuleFunction};
use crate::diagnostic::RuleFunctionResult;
use crate::index::path::{child_path, index_path};
use crate::index::{decode_pointer_segment, NodeRef};
use crate::rule::SpecFormat;
use serde_json::json;
use std::sync::{Arc, OnceLock};

pub fn functions() -> Vec<Arc<dyn RuleFunction>> {
    vec![Arc::new(SchemaCheck), Arc::new(DocumentSchema)]
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// JSON pointer into the instance
    pub pointer: String,
    pub message: String,
}

/// Validate `instance` against `schema`
pub fn validate(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> anyhow::Result<Vec<Violation>> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| anyhow::anyhow!("invalid schema: {}", e))?;
    Ok(validator
        .iter_errors(instance)
        .map(|e| Violation {
            pointer: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect())
}

/// Walk a JSON pointer from `node`, returning the deepest node reached and its path
fn locate<'a>(node: NodeRef<'a>, path: &str, pointer: &str) -> (NodeRef<'a>, String) {
    let mut current = node;
    let mut current_path = path.to_string();
    for raw in pointer.split('/').skip(1) {
        let segment = decode_pointer_segment(raw);
        let next = if current.is_sequence() {
            segment
                .parse::<usize>()
                .ok()
                .and_then(|i| current.items().get(i).copied().map(|n| (n, i)))
                .map(|(n, i)| (n, index_path(&current_path, i)))
        } else {
            current
                .get(&segment)
                .map(|n| (n, child_path(&current_path, &segment)))
        };
        match next {
            Some((n, p)) => {
                current = n;
                current_path = p;
            }
            None => break,
        }
    }
    (current, current_path)
}

fn report(input: &InputNode<'_>, violations: Vec<Violation>) -> Vec<RuleFunctionResult> {
    violations
        .into_iter()
        .map(|v| {
            let (node, path) = locate(input.node, &input.path, &v.pointer);
            input.child_result(&node, path, v.message)
        })
        .collect()
}

/// The `schema` function: validate each node against `options.schema`
pub struct SchemaCheck;

impl RuleFunction for SchemaCheck {
    fn name(&self) -> &str {
        "schema"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("schema")
            .require("schema")
            .with_property("schema", OptionKind::Object, "JSON Schema to validate against")
            .with_property("forceResolve", OptionKind::Boolean, "accepted for compatibility")
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let schema = ctx
            .option("schema")
            .map(serde_json::Value::from)
            .ok_or_else(|| anyhow::anyhow!("schema function requires a `schema` option"))?;
        let mut results = Vec::new();
        for item in input {
            ctx.checkpoint()?;
            let instance = serde_json::Value::from(&item.node.to_value());
            results.extend(report(item, validate(&schema, &instance)?));
        }
        Ok(results)
    }
}

fn oas3_schema() -> &'static serde_json::Value {
    static SCHEMA: OnceLock<serde_json::Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["openapi", "info"],
            "properties": {
                "openapi": {"type": "string", "pattern": "^3\\.\\d+(\\.\\d+)?"},
                "info": {"$ref": "#/$defs/info"},
                "servers": {
                    "type": "array",
                    "items": {"type": "object", "required": ["url"], "properties": {"url": {"type": "string"}}}
                },
                "paths": {"$ref": "#/$defs/paths"},
                "components": {"type": "object"},
                "security": {"type": "array", "items": {"type": "object"}},
                "tags": {"$ref": "#/$defs/tags"},
                "webhooks": {"type": "object"}
            },
            "patternProperties": {"^x-": true},
            "additionalProperties": false,
            "$defs": {
                "info": {
                    "type": "object",
                    "required": ["title", "version"],
                    "properties": {
                        "title": {"type": "string"},
                        "version": {"type": "string"},
                        "description": {"type": "string"},
                        "contact": {"type": "object"},
                        "license": {"type": "object", "required": ["name"]}
                    }
                },
                "paths": {
                    "type": "object",
                    "patternProperties": {"^/": {"type": "object"}, "^x-": true},
                    "additionalProperties": false
                },
                "tags": {
                    "type": "array",
                    "items": {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}
                }
            }
        })
    })
}

fn oas2_schema() -> &'static serde_json::Value {
    static SCHEMA: OnceLock<serde_json::Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        json!({
            "type": "object",
            "required": ["swagger", "info", "paths"],
            "properties": {
                "swagger": {"enum": ["2.0"]},
                "info": {
                    "type": "object",
                    "required": ["title", "version"],
                    "properties": {"title": {"type": "string"}, "version": {"type": "string"}}
                },
                "host": {"type": "string", "pattern": "^[^{}/ :\\\\]+(?::\\d+)?$"},
                "basePath": {"type": "string", "pattern": "^/"},
                "schemes": {"type": "array", "items": {"enum": ["http", "https", "ws", "wss"]}},
                "paths": {
                    "type": "object",
                    "patternProperties": {"^/": {"type": "object"}, "^x-": true},
                    "additionalProperties": false
                },
                "definitions": {"type": "object"},
                "parameters": {"type": "object"},
                "responses": {"type": "object"},
                "securityDefinitions": {"type": "object"},
                "security": {"type": "array"},
                "tags": {"type": "array", "items": {"type": "object", "required": ["name"]}}
            },
            "patternProperties": {"^x-": true},
            "additionalProperties": false
        })
    })
}

/// Structural validation of the document root
pub struct DocumentSchema;

impl RuleFunction for DocumentSchema {
    fn name(&self) -> &str {
        "oasDocumentSchema"
    }

    fn category(&self) -> &str {
        "openapi"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let schema = match ctx.spec_info.format {
            Some(SpecFormat::Oas2) => oas2_schema(),
            Some(SpecFormat::Oas3) | Some(SpecFormat::Oas31) => oas3_schema(),
            None => return Ok(Vec::new()),
        };
        let mut results = Vec::new();
        for item in input {
            let instance = serde_json::Value::from(&item.node.to_value());
            let mut violations = validate(schema, &instance)?;
            // 3.0 documents must carry `paths`, 3.1 may use components or webhooks instead
            if ctx.spec_info.format == Some(SpecFormat::Oas3) && !item.node.has("paths") {
                violations.push(Violation {
                    pointer: String::new(),
                    message: "\"paths\" is a required property".to_string(),
                });
            }
            results.extend(report(item, violations));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::Harness;
    use crate::index::SpecInfo;
    use crate::rule::Rule;
    use crate::value::Value;

    #[test]
    fn test_validate_reports_pointer() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "integer"}}});
        let violations = validate(&schema, &json!({"a": "x"})).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].pointer, "/a");
        assert!(validate(&json!({"type": 12}), &json!(1)).is_err());
    }

    #[test]
    fn test_schema_function() {
        let options: serde_yaml::Value = serde_yaml::from_str(
            "schema:\n  type: object\n  required: [name]\n  properties:\n    age:\n      type: integer\n",
        )
        .unwrap();
        let rule = Rule::new("pets", "$.pets[*]", "schema").with_options(Value::from(options));
        let source = "pets:\n  - name: rex\n    age: 3\n  - age: old\n";
        let harness = Harness::new(source, rule);
        let results = harness.run(&SchemaCheck, "$.pets[*]");
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.path == "$.pets[1].age" && r.line() == 4));
        assert!(results.iter().any(|r| r.path == "$.pets[1]"));
    }

    #[test]
    fn test_document_schema() {
        let source = "openapi: 3.0.0\ninfo:\n  title: t\n";
        let rule = Rule::new("oas3-schema", "$", "oasDocumentSchema");
        let mut harness = Harness::new(source, rule);
        harness.spec_info = SpecInfo::extract(&harness.index, "api.yaml").unwrap();
        let results = harness.run(&DocumentSchema, "$");
        // info.version and paths are missing
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.path == "$.info"));

        let valid = "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1'\npaths: {}\n";
        let mut harness = Harness::new(valid, Rule::new("oas3-schema", "$", "oasDocumentSchema"));
        harness.spec_info = SpecInfo::extract(&harness.index, "api.yaml").unwrap();
        assert!(harness.run(&DocumentSchema, "$").is_empty());
    }
}
