//! OWASP API security checks

use super::openapi::{operations, type_names};
use super::{FunctionContext, FunctionSchema, InputNode, OptionKind, RuleFunction};
use crate::diagnostic::RuleFunctionResult;
use crate::index::path::{child_path, index_path};
use crate::index::NodeRef;
use crate::rule::SpecFormat;
use crate::value::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub fn functions() -> Vec<Arc<dyn RuleFunction>> {
    vec![
        Arc::new(NoBasicAuth),
        Arc::new(NoNumericIds),
        Arc::new(CheckErrorResponse),
        Arc::new(DefineErrorDefinition),
        Arc::new(ArrayLimit),
        Arc::new(StringLimit),
        Arc::new(IntegerLimit),
        Arc::new(IntegerFormat),
        Arc::new(CheckSecurity),
        Arc::new(AuthInsecureSchemes),
        Arc::new(JwtBestPractice),
        Arc::new(HeaderDefinition),
        Arc::new(RatelimitRetryAfter),
    ]
}

document_function!(NoBasicAuth, "owaspNoBasicAuth", "owasp", no_basic_auth);
document_function!(NoNumericIds, "owaspNoNumericIDs", "owasp", no_numeric_ids);
document_function!(
    CheckErrorResponse,
    "owaspCheckErrorResponse",
    "owasp",
    check_error_response,
    FunctionSchema::new("owaspCheckErrorResponse")
        .require("code")
        .with_property("code", OptionKind::Any, "response code that must be defined")
);
document_function!(
    DefineErrorDefinition,
    "owaspDefineErrorDefinition",
    "owasp",
    define_error_definition,
    FunctionSchema::new("owaspDefineErrorDefinition")
        .require("codes")
        .with_property("codes", OptionKind::Array, "response codes, one must be defined")
);
document_function!(ArrayLimit, "owaspArrayLimit", "owasp", array_limit);
document_function!(StringLimit, "owaspStringLimit", "owasp", string_limit);
document_function!(IntegerLimit, "owaspIntegerLimit", "owasp", integer_limit);
document_function!(IntegerFormat, "owaspIntegerFormat", "owasp", integer_format);
document_function!(
    CheckSecurity,
    "owaspCheckSecurity",
    "owasp",
    check_security,
    FunctionSchema::new("owaspCheckSecurity")
        .require("methods")
        .with_property("methods", OptionKind::Array, "HTTP methods to check")
        .with_property("nullable", OptionKind::Boolean, "allow empty requirements")
);
document_function!(
    AuthInsecureSchemes,
    "owaspAuthInsecureSchemes",
    "owasp",
    auth_insecure_schemes
);
document_function!(JwtBestPractice, "owaspJWTBestPractice", "owasp", jwt_best_practice);
document_function!(
    HeaderDefinition,
    "owaspHeaderDefinition",
    "owasp",
    header_definition,
    FunctionSchema::new("owaspHeaderDefinition")
        .require("headers")
        .with_property("headers", OptionKind::Array, "header sets, one must be present")
);
document_function!(
    RatelimitRetryAfter,
    "owaspRatelimitRetryAfter",
    "owasp",
    ratelimit_retry_after
);

/// Security scheme definitions with their JSONPath
fn security_schemes<'a>(
    root: NodeRef<'a>,
    root_path: &str,
    format: Option<SpecFormat>,
) -> Vec<(String, NodeRef<'a>, String)> {
    let (container, container_path) = match format {
        Some(SpecFormat::Oas2) => (
            root.get("securityDefinitions"),
            child_path(root_path, "securityDefinitions"),
        ),
        _ => (
            root.get("components").and_then(|c| c.get("securitySchemes")),
            child_path(&child_path(root_path, "components"), "securitySchemes"),
        ),
    };
    let Some(container) = container else {
        return Vec::new();
    };
    container
        .entries()
        .into_iter()
        .filter_map(|(key, scheme)| {
            let name = key.text()?;
            scheme
                .is_mapping()
                .then(|| (name.to_string(), scheme, child_path(&container_path, name)))
        })
        .collect()
}

fn lower_field(node: &NodeRef<'_>, key: &str) -> String {
    node.get(key)
        .and_then(|v| v.text())
        .unwrap_or("")
        .to_lowercase()
}

/// Result at `node.key`, or at `node` when the key is absent
fn field_result(
    input: &InputNode<'_>,
    node: &NodeRef<'_>,
    path: &str,
    key: &str,
    message: &str,
) -> RuleFunctionResult {
    let anchor = node.get(key).unwrap_or(*node);
    input.child_result(&anchor, child_path(path, key), message)
}

fn no_basic_auth(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let message = "security scheme uses HTTP Basic Auth, which is an insecure practice";
    security_schemes(input.node, &input.path, ctx.spec_info.format)
        .into_iter()
        .filter_map(|(_, scheme, path)| {
            let kind = lower_field(&scheme, "type");
            let http_scheme = lower_field(&scheme, "scheme");
            if kind == "basic" {
                Some(field_result(input, &scheme, &path, "type", message))
            } else if kind == "http" && (http_scheme == "basic" || http_scheme == "negotiate") {
                Some(field_result(input, &scheme, &path, "scheme", message))
            } else {
                None
            }
        })
        .collect()
}

fn auth_insecure_schemes(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    security_schemes(input.node, &input.path, ctx.spec_info.format)
        .into_iter()
        .filter(|(_, scheme, _)| {
            let http_scheme = lower_field(scheme, "scheme");
            lower_field(scheme, "type") == "http"
                && (http_scheme == "negotiate" || http_scheme == "oauth")
        })
        .map(|(_, scheme, path)| {
            field_result(
                input,
                &scheme,
                &path,
                "scheme",
                "authentication scheme is considered outdated or insecure",
            )
        })
        .collect()
}

fn jwt_best_practice(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    security_schemes(input.node, &input.path, ctx.spec_info.format)
        .into_iter()
        .filter(|(_, scheme, _)| {
            let uses_jwt = lower_field(scheme, "type") == "oauth2"
                || lower_field(scheme, "bearerFormat") == "jwt";
            let declared = scheme
                .get("description")
                .and_then(|d| d.text())
                .is_some_and(|d| d.contains("RFC8725"));
            uses_jwt && !declared
        })
        .map(|(_, scheme, path)| {
            field_result(
                input,
                &scheme,
                &path,
                "description",
                "JWTs must explicitly declare support for `RFC8725` in the description",
            )
        })
        .collect()
}

fn is_id_name(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "id" || name.ends_with("_id") || name.ends_with("-id")
}

fn no_numeric_ids(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let root = input.node;
    let mut lists: Vec<(NodeRef<'_>, String)> = Vec::new();
    if let Some(paths) = root.get("paths") {
        let paths_path = child_path(&input.path, "paths");
        for (key, item) in paths.entries() {
            let Some(url) = key.text() else { continue };
            if let Some(params) = item.get("parameters") {
                lists.push((params, child_path(&child_path(&paths_path, url), "parameters")));
            }
        }
    }
    for op in operations(root, &input.path) {
        if let Some(params) = op.node.get("parameters") {
            lists.push((params, child_path(&op.json_path, "parameters")));
        }
    }

    let mut params: Vec<(NodeRef<'_>, String)> = Vec::new();
    for (list, list_path) in lists {
        for (i, param) in list.items().into_iter().enumerate() {
            params.push((param, index_path(&list_path, i)));
        }
    }
    let components_path = child_path(&input.path, "components");
    let reusable = [
        (
            root.get("components").and_then(|c| c.get("parameters")),
            child_path(&components_path, "parameters"),
        ),
        (root.get("parameters"), child_path(&input.path, "parameters")),
    ];
    for (container, base) in reusable {
        let Some(container) = container else { continue };
        for (key, param) in container.entries() {
            let Some(name) = key.text() else { continue };
            params.push((param, child_path(&base, name)));
        }
    }

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for (param, path) in params {
        if !seen.insert(param.id()) {
            continue;
        }
        let Some(name) = param.get("name").and_then(|n| n.text()) else {
            continue;
        };
        if !is_id_name(name) {
            continue;
        }
        // OpenAPI 3 nests the type under `schema`, Swagger keeps it on the parameter
        let (schema, schema_path) = match param.get("schema") {
            Some(schema) => (schema, child_path(&path, "schema")),
            None => (param, path.clone()),
        };
        if type_names(&schema).iter().any(|t| t == "integer") {
            results.push(field_result(
                input,
                &schema,
                &schema_path,
                "type",
                "don't use numeric IDs, use random IDs that cannot be guessed like UUIDs",
            ));
        }
    }
    results
}

fn check_error_response(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    if ctx.spec_info.format == Some(SpecFormat::Oas2) {
        return Vec::new();
    }
    let code = match ctx.option("code") {
        Some(Value::Int(i)) => i.to_string(),
        Some(other) => other.to_plain_string(),
        None => return Vec::new(),
    };
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let responses_path = child_path(&op.json_path, "responses");
        let Some(responses) = op.node.get("responses") else {
            results.push(input.child_result(
                &op.node,
                responses_path,
                format!("missing response code '{}' for '{}'", code, op.method.to_uppercase()),
            ));
            continue;
        };
        match responses.entry(&code) {
            None => results.push(input.child_result(
                &responses,
                responses_path,
                format!("missing response code '{}' for '{}'", code, op.method.to_uppercase()),
            )),
            Some((key, response)) => {
                let has_schema = response
                    .get("content")
                    .map(|c| c.entries())
                    .and_then(|entries| entries.into_iter().next())
                    .is_some_and(|(_, media)| media.has("schema"));
                if !has_schema {
                    results.push(input.child_result(
                        &key,
                        child_path(&responses_path, &code),
                        format!(
                            "missing schema for '{}' response on '{}'",
                            code,
                            op.method.to_uppercase()
                        ),
                    ));
                }
            }
        }
    }
    results
}

fn define_error_definition(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    let codes = ctx.option_list("codes");
    if codes.is_empty() {
        return Vec::new();
    }
    operations(input.node, &input.path)
        .into_iter()
        .filter(|op| {
            op.node.get("responses").map_or(true, |responses| {
                !responses.keys().iter().any(|k| codes.iter().any(|c| c == k))
            })
        })
        .map(|op| {
            let anchor = op.node.get("responses").unwrap_or(op.node);
            input.child_result(
                &anchor,
                child_path(&op.json_path, "responses"),
                format!("missing one of `{}` response codes", codes.join("`, `")),
            )
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum SchemaSlot {
    /// The node is a schema
    Schema,
    /// Mapping whose values are schemas
    Map,
    /// Sequence whose items are schemas
    List,
    Other,
}

fn slot_for(parent: SchemaSlot, key: &str, value: &NodeRef<'_>) -> Option<SchemaSlot> {
    if key.starts_with("x-") {
        return None;
    }
    match parent {
        SchemaSlot::Schema => match key {
            "properties" | "patternProperties" | "$defs" | "definitions" | "dependentSchemas" => {
                Some(SchemaSlot::Map)
            }
            "items" if value.is_sequence() => Some(SchemaSlot::List),
            "items" | "additionalProperties" | "additionalItems" | "not" | "if" | "then"
            | "else" | "contains" | "propertyNames" | "unevaluatedProperties" => {
                Some(SchemaSlot::Schema)
            }
            "allOf" | "oneOf" | "anyOf" | "prefixItems" => Some(SchemaSlot::List),
            _ => None,
        },
        _ => match key {
            "schema" => Some(SchemaSlot::Schema),
            "schemas" | "definitions" => Some(SchemaSlot::Map),
            "example" | "examples" | "default" | "enum" | "const" => None,
            _ => Some(SchemaSlot::Other),
        },
    }
}

/// Every inline or component schema of the document, first path wins
pub fn schemas<'a>(root: NodeRef<'a>, root_path: &str) -> Vec<(NodeRef<'a>, String)> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(root, root_path.to_string(), SchemaSlot::Other)];
    while let Some((node, path, slot)) = stack.pop() {
        if !seen.insert((node.id(), slot == SchemaSlot::Schema)) {
            continue;
        }
        if slot == SchemaSlot::Schema && node.is_mapping() && node.ref_target().is_none() {
            found.push((node, path.clone()));
        }
        let mut children = Vec::new();
        if node.is_mapping() {
            for (key, value) in node.entries() {
                let Some(key) = key.text() else { continue };
                let next = match slot {
                    SchemaSlot::Map | SchemaSlot::List => Some(SchemaSlot::Schema),
                    _ => slot_for(slot, key, &value),
                };
                if let Some(next) = next {
                    children.push((value, child_path(&path, key), next));
                }
            }
        } else if node.is_sequence() {
            let next = match slot {
                SchemaSlot::List => SchemaSlot::Schema,
                SchemaSlot::Other => SchemaSlot::Other,
                _ => continue,
            };
            for (i, item) in node.items().into_iter().enumerate() {
                children.push((item, index_path(&path, i), next));
            }
        }
        stack.extend(children.into_iter().rev());
    }
    found
}

fn schemas_of_type<'a>(input: &InputNode<'a>, kind: &str) -> Vec<(NodeRef<'a>, String)> {
    schemas(input.node, &input.path)
        .into_iter()
        .filter(|(schema, _)| type_names(schema).iter().any(|t| t == kind))
        .collect()
}

fn array_limit(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    schemas_of_type(input, "array")
        .into_iter()
        .filter(|(schema, _)| !schema.has("maxItems"))
        .map(|(schema, path)| {
            field_result(
                input,
                &schema,
                &path,
                "type",
                "schema of type `array` must specify `maxItems`",
            )
        })
        .collect()
}

fn string_limit(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    schemas_of_type(input, "string")
        .into_iter()
        .filter(|(schema, _)| {
            !["maxLength", "enum", "const"].iter().any(|k| schema.has(k))
        })
        .map(|(schema, path)| {
            field_result(
                input,
                &schema,
                &path,
                "type",
                "schema of type `string` must specify `maxLength`, `const` or `enum`",
            )
        })
        .collect()
}

fn integer_limit(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    schemas_of_type(input, "integer")
        .into_iter()
        .filter(|(schema, _)| {
            let lower = schema.has("minimum") || schema.has("exclusiveMinimum");
            let upper = schema.has("maximum") || schema.has("exclusiveMaximum");
            !(lower && upper)
        })
        .map(|(schema, path)| {
            field_result(
                input,
                &schema,
                &path,
                "type",
                "schema of type `integer` must specify `minimum` and `maximum` or `exclusiveMinimum` and `exclusiveMaximum`",
            )
        })
        .collect()
}

fn integer_format(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    schemas_of_type(input, "integer")
        .into_iter()
        .filter(|(schema, _)| {
            !matches!(
                schema.get("format").and_then(|f| f.text()),
                Some("int32") | Some("int64")
            )
        })
        .map(|(schema, path)| {
            field_result(
                input,
                &schema,
                &path,
                "type",
                "schema of type `integer` must specify `format` of `int32` or `int64`",
            )
        })
        .collect()
}

fn check_security(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let methods = ctx.option_list("methods");
    let nullable = ctx.option_bool("nullable").unwrap_or(false);
    let global = input.node.get("security");
    let global_path = child_path(&input.path, "security");

    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        if !methods.iter().any(|m| m.eq_ignore_ascii_case(&op.method)) {
            continue;
        }
        let (security, security_path) = match op.node.get("security") {
            Some(s) => (s, child_path(&op.json_path, "security")),
            None => match global {
                Some(g) => (g, global_path.clone()),
                None => {
                    results.push(input.child_result(
                        &op.node,
                        op.json_path.clone(),
                        format!(
                            "'security' was not defined: for path \"{}\" in method \"{}\".",
                            op.path, op.method
                        ),
                    ));
                    continue;
                }
            },
        };
        if security.is_empty() {
            results.push(input.child_result(
                &security,
                security_path,
                format!(
                    "'security' is empty: for path \"{}\" in method \"{}\".",
                    op.path, op.method
                ),
            ));
            continue;
        }
        if nullable {
            continue;
        }
        for (i, requirement) in security.items().into_iter().enumerate() {
            if requirement.is_mapping() && requirement.is_empty() {
                results.push(input.child_result(
                    &requirement,
                    index_path(&security_path, i),
                    format!(
                        "'security' has null elements: for path \"{}\" in method \"{}\" with element.",
                        op.path, op.method
                    ),
                ));
            }
        }
    }
    results
}

/// Header sets from options, each a list of names that must all be present
fn header_sets(options: Option<&Value>) -> Vec<Vec<String>> {
    options
        .and_then(Value::as_list)
        .map(|sets| sets.iter().map(Value::string_list).collect())
        .unwrap_or_default()
}

fn header_definition(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    let sets = header_sets(ctx.option("headers"));
    if sets.is_empty() {
        return Vec::new();
    }
    let described = sets
        .iter()
        .map(|set| format!("{{{}}}", set.join(", ")))
        .collect::<Vec<_>>()
        .join(" ");

    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let Some(responses) = op.node.get("responses") else { continue };
        let responses_path = child_path(&op.json_path, "responses");
        for (key, response) in responses.entries() {
            let Some(code) = key.text() else { continue };
            let Ok(status) = code.parse::<u16>() else { continue };
            if !((200..300).contains(&status) || (400..500).contains(&status)) {
                continue;
            }
            let names: Vec<&str> = response.get("headers").map(|h| h.keys()).unwrap_or_default();
            let satisfied = sets
                .iter()
                .any(|set| set.iter().all(|h| names.iter().any(|n| n.eq_ignore_ascii_case(h))));
            if !satisfied {
                let (anchor, path) = match response.get("headers") {
                    Some(headers) => (
                        headers,
                        child_path(&child_path(&responses_path, code), "headers"),
                    ),
                    None => (key, child_path(&responses_path, code)),
                };
                results.push(input.child_result(
                    &anchor,
                    path,
                    format!(
                        "response with code {} must contain one of the defined 'headers': {}",
                        code, described
                    ),
                ));
            }
        }
    }
    results
}

fn ratelimit_retry_after(
    input: &InputNode<'_>,
    _ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let Some((key, response)) = op.node.get("responses").and_then(|r| r.entry("429")) else {
            continue;
        };
        let has_retry = response
            .get("headers")
            .is_some_and(|h| h.keys().iter().any(|n| n.eq_ignore_ascii_case("Retry-After")));
        if !has_retry {
            results.push(input.child_result(
                &key,
                child_path(&child_path(&op.json_path, "responses"), "429"),
                "missing 'Retry-After' header for 429 error response",
            ));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::Harness;
    use crate::index::SpecInfo;
    use crate::rule::Rule;

    fn run_with(
        function: &dyn RuleFunction,
        source: &str,
        options: Option<&str>,
    ) -> Vec<RuleFunctionResult> {
        let mut rule = Rule::new("test", "$", function.name());
        if let Some(options) = options {
            let yaml: serde_yaml::Value = serde_yaml::from_str(options).unwrap();
            rule = rule.with_options(Value::from(yaml));
        }
        let mut harness = Harness::new(source, rule);
        harness.spec_info = SpecInfo::extract(&harness.index, "api.yaml").unwrap();
        harness.run(function, "$")
    }

    fn run(function: &dyn RuleFunction, source: &str) -> Vec<RuleFunctionResult> {
        run_with(function, source, None)
    }

    const SCHEMES: &str = r#"openapi: 3.1.0
components:
  securitySchemes:
    basic:
      type: http
      scheme: basic
    negotiate:
      type: http
      scheme: negotiate
    bearer:
      type: http
      scheme: bearer
      bearerFormat: JWT
    oauth:
      type: oauth2
      description: follows RFC8725
"#;

    #[test]
    fn test_security_schemes() {
        let results = run(&NoBasicAuth, SCHEMES);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "$.components.securitySchemes.basic.scheme");

        let results = run(&AuthInsecureSchemes, SCHEMES);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.securitySchemes.negotiate.scheme");

        let results = run(&JwtBestPractice, SCHEMES);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.securitySchemes.bearer.description");
    }

    #[test]
    fn test_swagger_basic_auth() {
        let source = "swagger: '2.0'\nsecurityDefinitions:\n  b:\n    type: basic\n";
        let results = run(&NoBasicAuth, source);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.securityDefinitions.b.type");
    }

    #[test]
    fn test_no_numeric_ids() {
        let source = r#"openapi: 3.0.0
paths:
  /users/{user_id}:
    parameters:
      - name: user_id
        in: path
        schema:
          type: integer
    get:
      parameters:
        - name: id
          in: query
          schema:
            type: string
"#;
        let results = run(&NoNumericIds, source);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].path,
            "$.paths['/users/{user_id}'].parameters[0].schema.type"
        );
    }

    const OPS: &str = r#"openapi: 3.0.0
paths:
  /a:
    get:
      responses:
        '200':
          description: ok
        '401':
          description: no
        '429':
          description: slow
    post:
      security: []
      responses:
        '400':
          description: bad
          content:
            application/json:
              schema:
                type: object
"#;

    #[test]
    fn test_error_responses() {
        let results = run_with(&CheckErrorResponse, OPS, Some("code: '401'"));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "missing schema for '401' response on 'GET'");
        assert_eq!(results[1].message, "missing response code '401' for 'POST'");

        let results = run_with(&DefineErrorDefinition, OPS, Some("codes: ['400', '422', '4XX']"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.paths['/a'].get.responses");
        assert_eq!(results[0].message, "missing one of `400`, `422`, `4XX` response codes");
    }

    #[test]
    fn test_check_security() {
        let results = run_with(&CheckSecurity, OPS, Some("methods: [get, post]"));
        assert_eq!(results.len(), 2);
        assert!(results[0].message.starts_with("'security' was not defined"));
        assert!(results[1].message.starts_with("'security' is empty"));

        let source = "openapi: 3.0.0\nsecurity:\n  - {}\npaths:\n  /a:\n    get: {}\n";
        let results = run_with(&CheckSecurity, source, Some("methods: [get]"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.security[0]");
        let results = run_with(&CheckSecurity, source, Some("methods: [get]\nnullable: true"));
        assert!(results.is_empty());
    }

    #[test]
    fn test_headers() {
        let results = run(&RatelimitRetryAfter, OPS);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.paths['/a'].get.responses['429']");

        let options = "headers:\n  - [X-RateLimit-Limit, X-RateLimit-Reset]\n  - [RateLimit]\n";
        let results = run_with(&HeaderDefinition, OPS, Some(options));
        // 200, 401 and 400 lack the headers, 429 is checked as a 4xx too
        assert_eq!(results.len(), 4);
        assert!(results[0]
            .message
            .ends_with("{X-RateLimit-Limit, X-RateLimit-Reset} {RateLimit}"));
    }

    #[test]
    fn test_schema_limits() {
        let source = r#"openapi: 3.0.0
components:
  schemas:
    Pet:
      type: object
      properties:
        name:
          type: string
        code:
          type: string
          enum: [a, b]
        age:
          type: integer
          format: int32
          minimum: 0
          maximum: 30
        tags:
          type: array
          items:
            type: string
            maxLength: 10
        count:
          type: integer
      example:
        name:
          type: string
"#;
        let results = run(&StringLimit, source);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.schemas.Pet.properties.name.type");

        assert_eq!(run(&ArrayLimit, source).len(), 1);

        let results = run(&IntegerLimit, source);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.components.schemas.Pet.properties.count.type");

        assert_eq!(run(&IntegerFormat, source).len(), 1);
    }

    #[test]
    fn test_schema_walk_finds_inline_schemas() {
        let source = r#"openapi: 3.0.0
paths:
  /a:
    get:
      parameters:
        - name: q
          in: query
          schema:
            type: string
      responses:
        '200':
          content:
            application/json:
              schema:
                oneOf:
                  - type: integer
                  - $ref: '#/components/schemas/X'
"#;
        let index = crate::index::DocumentIndex::parse(source.as_bytes(), "api.yaml").unwrap();
        let found = schemas(index.raw().root(), "$");
        let paths: Vec<&str> = found.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"$.paths['/a'].get.parameters[0].schema"));
        assert!(paths.contains(
            &"$.paths['/a'].get.responses['200'].content['application/json'].schema.oneOf[0]"
        ));
    }
}
