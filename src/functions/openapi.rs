//! OpenAPI specific functions
//!
//! Most of these run once on the document root (`given: $`) and walk the
//! operations themselves.

use super::{FunctionContext, FunctionSchema, InputNode, OptionKind, RuleFunction};
use crate::diagnostic::RuleFunctionResult;
use crate::index::path::{child_path, index_path};
use crate::index::rolodex::split_reference;
use crate::index::{decode_pointer_segment, NodeRef};
use crate::rule::SpecFormat;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

pub fn functions() -> Vec<Arc<dyn RuleFunction>> {
    vec![
        Arc::new(OperationIdUnique),
        Arc::new(OperationId),
        Arc::new(SuccessResponse),
        Arc::new(ErrorResponse),
        Arc::new(OperationParameters),
        Arc::new(OperationTags),
        Arc::new(TagDefined),
        Arc::new(TagDescription),
        Arc::new(PathParameters),
        Arc::new(OperationDescriptions),
        Arc::new(ComponentDescriptions),
        Arc::new(TypedEnum),
        Arc::new(DuplicatedEnum),
        Arc::new(RefSiblings),
        Arc::new(UnusedComponent),
        Arc::new(ExampleMissing),
        Arc::new(ApiServers),
        Arc::new(AmbiguousPaths),
        Arc::new(PathsKebabCase),
        Arc::new(OperationSecurityDefined),
    ]
}

pub const METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// An operation under `paths`
#[derive(Debug, Clone)]
pub struct Operation<'a> {
    /// URL template, e.g. `/pets/{id}`
    pub path: String,
    pub method: String,
    pub node: NodeRef<'a>,
    /// JSONPath of the operation
    pub json_path: String,
    pub path_item: NodeRef<'a>,
}

impl Operation<'_> {
    fn method_upper(&self) -> String {
        self.method.to_uppercase()
    }
}

/// Every operation of the document, in document order
pub fn operations<'a>(root: NodeRef<'a>, root_path: &str) -> Vec<Operation<'a>> {
    let Some(paths) = root.get("paths") else {
        return Vec::new();
    };
    let paths_path = child_path(root_path, "paths");
    let mut ops = Vec::new();
    for (key, item) in paths.entries() {
        let Some(url) = key.text() else { continue };
        if !item.is_mapping() {
            continue;
        }
        let item_path = child_path(&paths_path, url);
        for (method_key, op) in item.entries() {
            let Some(method) = method_key.text() else { continue };
            if !METHODS.contains(&method) || !op.is_mapping() {
                continue;
            }
            ops.push(Operation {
                path: url.to_string(),
                method: method.to_string(),
                node: op,
                json_path: child_path(&item_path, method),
                path_item: item,
            });
        }
    }
    ops
}

document_function!(OperationIdUnique, "oasOpIdUnique", "openapi", op_id_unique);
document_function!(OperationId, "oasOpId", "openapi", op_id);
document_function!(SuccessResponse, "oasOpSuccessResponse", "openapi", success_response);
document_function!(ErrorResponse, "oasOpErrorResponse", "openapi", error_response);
document_function!(OperationParameters, "oasOpParams", "openapi", op_params);
document_function!(OperationTags, "oasOpTags", "openapi", op_tags);
document_function!(TagDefined, "oasTagDefined", "openapi", tag_defined);
document_function!(TagDescription, "oasTagDescription", "openapi", tag_description);
document_function!(PathParameters, "oasPathParam", "openapi", path_params);
document_function!(
    OperationDescriptions,
    "oasDescriptions",
    "openapi",
    op_descriptions,
    FunctionSchema::new("oasDescriptions").with_property(
        "minWords",
        OptionKind::Integer,
        "minimum number of words"
    )
);
document_function!(
    ComponentDescriptions,
    "oasComponentDescriptions",
    "openapi",
    component_descriptions,
    FunctionSchema::new("oasComponentDescriptions").with_property(
        "minWords",
        OptionKind::Integer,
        "minimum number of words"
    )
);
document_function!(TypedEnum, "typedEnum", "openapi", typed_enum);
document_function!(DuplicatedEnum, "duplicatedEnum", "openapi", duplicated_enum);
document_function!(RefSiblings, "refSiblings", "openapi", ref_siblings);
document_function!(UnusedComponent, "oasUnusedComponent", "openapi", unused_component);
document_function!(ExampleMissing, "oasExampleMissing", "openapi", example_missing);
document_function!(ApiServers, "oasAPIServers", "openapi", api_servers);
document_function!(AmbiguousPaths, "noAmbiguousPaths", "openapi", ambiguous_paths);
document_function!(PathsKebabCase, "pathsKebabCase", "openapi", paths_kebab_case);
document_function!(
    OperationSecurityDefined,
    "oasOpSecurityDefined",
    "openapi",
    op_security_defined
);

fn op_id_unique(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let ops = operations(input.node, &input.path);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for op in &ops {
        if let Some(id) = op.node.get("operationId").and_then(|n| n.text()) {
            *counts.entry(id).or_default() += 1;
        }
    }
    ops.iter()
        .filter_map(|op| {
            let node = op.node.get("operationId")?;
            let id = node.text()?;
            (counts.get(id).copied().unwrap_or(0) > 1).then(|| {
                input.child_result(
                    &node,
                    child_path(&op.json_path, "operationId"),
                    format!("the `operationId` `{}` must be unique amongst all operations", id),
                )
            })
        })
        .collect()
}

fn op_id(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    operations(input.node, &input.path)
        .into_iter()
        .filter(|op| {
            op.node
                .get("operationId")
                .and_then(|n| n.text())
                .map_or(true, |t| t.trim().is_empty())
        })
        .map(|op| {
            input.child_result(
                &op.node,
                op.json_path.clone(),
                format!(
                    "the `{}` operation at path `{}` does not contain an `operationId`",
                    op.method_upper(),
                    op.path
                ),
            )
        })
        .collect()
}

fn response_codes<'a>(op: &Operation<'a>) -> (Option<NodeRef<'a>>, Vec<String>) {
    match op.node.get("responses") {
        Some(responses) => {
            let codes = responses.keys().into_iter().map(str::to_string).collect();
            (Some(responses), codes)
        }
        None => (None, Vec::new()),
    }
}

fn success_response(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let (responses, codes) = response_codes(&op);
        if codes.iter().any(|c| c.starts_with('2') || c.starts_with('3')) {
            continue;
        }
        let (anchor, path) = match responses {
            Some(r) => (r, child_path(&op.json_path, "responses")),
            None => (op.node, op.json_path.clone()),
        };
        results.push(input.child_result(
            &anchor,
            path,
            format!(
                "the `{}` operation at path `{}` must define at least a single `2xx` or `3xx` response",
                op.method_upper(),
                op.path
            ),
        ));
    }
    results
}

fn error_response(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let (responses, codes) = response_codes(&op);
        if codes.iter().any(|c| c.starts_with('4')) {
            continue;
        }
        let (anchor, path) = match responses {
            Some(r) => (r, child_path(&op.json_path, "responses")),
            None => (op.node, op.json_path.clone()),
        };
        results.push(input.child_result(
            &anchor,
            path,
            format!(
                "the `{}` operation at path `{}` must define at least one `4xx` error response",
                op.method_upper(),
                op.path
            ),
        ));
    }
    results
}

fn op_params(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let Some(params) = op.node.get("parameters") else { continue };
        let params_path = child_path(&op.json_path, "parameters");
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut body = 0;
        let mut form_data = false;
        for (i, param) in params.items().into_iter().enumerate() {
            let name = param.get("name").and_then(|n| n.text()).unwrap_or("");
            let location = param.get("in").and_then(|n| n.text()).unwrap_or("");
            if name.is_empty() {
                continue;
            }
            if !seen.insert((name.to_string(), location.to_string())) {
                results.push(input.child_result(
                    &param,
                    index_path(&params_path, i),
                    format!(
                        "the `{}` operation parameter at path `{}`, index {} has a duplicate name `{}` and `in` type",
                        op.method_upper(),
                        op.path,
                        i,
                        name
                    ),
                ));
            }
            match location {
                "body" => body += 1,
                "formData" => form_data = true,
                _ => {}
            }
        }
        if ctx.spec_info.format == Some(SpecFormat::Oas2) {
            if body > 1 {
                results.push(input.child_result(
                    &params,
                    params_path.clone(),
                    format!(
                        "the `{}` operation at path `{}` has more than a single `body` parameter",
                        op.method_upper(),
                        op.path
                    ),
                ));
            }
            if body > 0 && form_data {
                results.push(input.child_result(
                    &params,
                    params_path,
                    format!(
                        "the `{}` operation at path `{}` cannot define both `body` and `formData` parameters",
                        op.method_upper(),
                        op.path
                    ),
                ));
            }
        }
    }
    results
}

fn op_tags(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    operations(input.node, &input.path)
        .into_iter()
        .filter(|op| op.node.get("tags").map_or(true, |t| t.is_empty()))
        .map(|op| {
            input.child_result(
                &op.node,
                op.json_path.clone(),
                format!(
                    "the `{}` operation at path `{}` does not contain any tags",
                    op.method_upper(),
                    op.path
                ),
            )
        })
        .collect()
}

fn global_tags<'a>(root: NodeRef<'a>) -> Vec<NodeRef<'a>> {
    root.get("tags").map(|t| t.items()).unwrap_or_default()
}

fn tag_defined(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let defined: HashSet<&str> = global_tags(input.node)
        .iter()
        .filter_map(|t| t.get("name").and_then(|n| n.text()))
        .collect();
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        let Some(tags) = op.node.get("tags") else { continue };
        let tags_path = child_path(&op.json_path, "tags");
        for (i, tag) in tags.items().into_iter().enumerate() {
            let Some(name) = tag.text() else { continue };
            if !defined.contains(name) {
                results.push(input.child_result(
                    &tag,
                    index_path(&tags_path, i),
                    format!(
                        "the `{}` operation at path `{}` contains a tag `{}`, that is not defined in the global document tags",
                        op.method_upper(),
                        op.path,
                        name
                    ),
                ));
            }
        }
    }
    results
}

fn tag_description(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let tags_path = child_path(&input.path, "tags");
    global_tags(input.node)
        .into_iter()
        .enumerate()
        .filter(|(_, tag)| {
            tag.get("description")
                .and_then(|d| d.text())
                .map_or(true, |d| d.trim().is_empty())
        })
        .map(|(i, tag)| {
            let name = tag.get("name").and_then(|n| n.text()).unwrap_or("");
            input.child_result(
                &tag,
                index_path(&tags_path, i),
                format!("tag `{}` must have a description", name),
            )
        })
        .collect()
}

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^}/]+)\}").unwrap_or_else(|_| unreachable!()))
}

fn template_params(url: &str) -> Vec<String> {
    template_regex()
        .captures_iter(url)
        .map(|c| c[1].to_string())
        .collect()
}

/// Path parameters declared on a parameter list
fn declared_path_params<'a>(
    params: Option<NodeRef<'a>>,
    base: &str,
) -> Vec<(String, NodeRef<'a>, String)> {
    let Some(params) = params else {
        return Vec::new();
    };
    params
        .items()
        .into_iter()
        .enumerate()
        .filter(|(_, p)| p.get("in").and_then(|n| n.text()) == Some("path"))
        .filter_map(|(i, p)| {
            let name = p.get("name").and_then(|n| n.text())?;
            Some((name.to_string(), p, index_path(base, i)))
        })
        .collect()
}

fn path_params(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    let Some(paths) = input.node.get("paths") else {
        return results;
    };
    let paths_path = child_path(&input.path, "paths");
    let ops = operations(input.node, &input.path);

    for (key, item) in paths.entries() {
        let Some(url) = key.text() else { continue };
        let item_path = child_path(&paths_path, url);
        let expected = template_params(url);

        let mut counted: HashSet<&str> = HashSet::new();
        for name in &expected {
            if !counted.insert(name.as_str()) {
                results.push(input.child_result(
                    &key,
                    item_path.clone(),
                    format!("path `{}` must not use parameter `{}` multiple times", url, name),
                ));
            }
        }

        let top = declared_path_params(
            item.get("parameters"),
            &child_path(&item_path, "parameters"),
        );
        let item_ops: Vec<&Operation<'_>> = ops.iter().filter(|o| o.path == url).collect();

        let mut checked: HashSet<String> = HashSet::new();

        for (name, node, path) in &top {
            results.extend(check_path_param(input, &mut checked, url, &expected, name, node, path));
        }

        if item_ops.is_empty() {
            for name in &expected {
                if !top.iter().any(|(n, _, _)| n == name) {
                    results.push(input.child_result(
                        &key,
                        item_path.clone(),
                        format!("path `{}` must define parameter `{}`", url, name),
                    ));
                }
            }
            continue;
        }

        for op in item_ops {
            let own = declared_path_params(
                op.node.get("parameters"),
                &child_path(&op.json_path, "parameters"),
            );
            for (name, node, path) in &own {
                results.extend(check_path_param(
                    input,
                    &mut checked,
                    url,
                    &expected,
                    name,
                    node,
                    path,
                ));
            }
            for name in &expected {
                let declared = top.iter().chain(own.iter()).any(|(n, _, _)| n == name);
                if !declared {
                    results.push(input.child_result(
                        &op.node,
                        op.json_path.clone(),
                        format!(
                            "the `{}` operation must define parameter `{}` as expected by path `{}`",
                            op.method_upper(),
                            name,
                            url
                        ),
                    ));
                }
            }
        }
    }
    results
}

/// A declared path parameter must appear in the template and be required
fn check_path_param(
    input: &InputNode<'_>,
    checked: &mut HashSet<String>,
    url: &str,
    expected: &[String],
    name: &str,
    node: &NodeRef<'_>,
    path: &str,
) -> Vec<RuleFunctionResult> {
    let mut results = Vec::new();
    if !checked.insert(path.to_string()) {
        return results;
    }
    if !expected.iter().any(|e| e == name) {
        results.push(input.child_result(
            node,
            path.to_string(),
            format!("parameter `{}` must be used in path `{}`", name, url),
        ));
    }
    if node.get("required").and_then(|r| r.as_bool()) != Some(true) {
        results.push(input.child_result(
            node,
            path.to_string(),
            format!("path parameter `{}` must have `required` set to `true`", name),
        ));
    }
    results
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn op_descriptions(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let min_words = ctx.option_i64("minWords").unwrap_or(0).max(0) as usize;
    let mut results = Vec::new();
    for op in operations(input.node, &input.path) {
        match op.node.get("description").and_then(|d| d.text()) {
            Some(text) if !text.trim().is_empty() => {
                if word_count(text) < min_words {
                    let node = op.node.get("description").unwrap_or(op.node);
                    results.push(input.child_result(
                        &node,
                        child_path(&op.json_path, "description"),
                        format!(
                            "the `{}` operation at path `{}` description must contain at least {} words",
                            op.method_upper(),
                            op.path,
                            min_words
                        ),
                    ));
                }
            }
            _ => results.push(input.child_result(
                &op.node,
                op.json_path.clone(),
                format!(
                    "the `{}` operation at path `{}` is missing a description",
                    op.method_upper(),
                    op.path
                ),
            )),
        }
    }
    results
}

const DESCRIBED_COMPONENTS: &[&str] = &[
    "parameters",
    "requestBodies",
    "responses",
    "examples",
    "headers",
    "links",
    "securitySchemes",
];

fn component_descriptions(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    let min_words = ctx.option_i64("minWords").unwrap_or(0).max(0) as usize;
    let mut results = Vec::new();
    let Some(components) = input.node.get("components") else {
        return results;
    };
    let components_path = child_path(&input.path, "components");
    for kind in DESCRIBED_COMPONENTS {
        let Some(group) = components.get(kind) else { continue };
        let group_path = child_path(&components_path, kind);
        for (key, component) in group.entries() {
            let Some(name) = key.text() else { continue };
            if !component.is_mapping() || component.ref_target().is_some() {
                continue;
            }
            let words = component
                .get("description")
                .and_then(|d| d.text())
                .map(word_count)
                .unwrap_or(0);
            if words == 0 || words < min_words {
                results.push(input.child_result(
                    &component,
                    child_path(&group_path, name),
                    format!("component `{}` `{}` is missing a description", kind, name),
                ));
            }
        }
    }
    results
}

pub(crate) fn type_names(node: &NodeRef<'_>) -> Vec<String> {
    match node.get("type") {
        Some(t) if t.is_sequence() => t
            .items()
            .iter()
            .filter_map(|i| i.text().map(String::from))
            .collect(),
        Some(t) => t.text().map(|s| vec![s.to_string()]).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn value_matches_type(value: &NodeRef<'_>, kind: &str) -> bool {
    match kind {
        "string" => value.as_str().is_some(),
        "integer" => value.as_i64().is_some() && value.as_str().is_none(),
        "number" => value.as_f64().is_some() && value.as_str().is_none(),
        "boolean" => value.as_bool().is_some() && value.as_str().is_none(),
        "array" => value.is_sequence(),
        "object" => value.is_mapping(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn typed_enum(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let node = input.node;
    let Some(values) = node.get("enum").filter(|e| e.is_sequence()) else {
        return Vec::new();
    };
    let types = type_names(&node);
    if types.is_empty() {
        return Vec::new();
    }
    let nullable = node.get("nullable").and_then(|n| n.as_bool()) == Some(true);
    let enum_path = child_path(&input.path, "enum");
    values
        .items()
        .into_iter()
        .enumerate()
        .filter(|(_, v)| {
            !(v.is_null() && nullable) && !types.iter().any(|t| value_matches_type(v, t))
        })
        .map(|(i, v)| {
            input.child_result(
                &v,
                index_path(&enum_path, i),
                format!(
                    "enum contains a value that does not match the type `{}`: `{}`",
                    types.join(", "),
                    v.to_value().to_plain_string()
                ),
            )
        })
        .collect()
}

fn duplicated_enum(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let Some(values) = input.node.get("enum").filter(|e| e.is_sequence()) else {
        return Vec::new();
    };
    let enum_path = child_path(&input.path, "enum");
    let mut seen = Vec::new();
    let mut results = Vec::new();
    for (i, v) in values.items().into_iter().enumerate() {
        let value = v.to_value();
        if seen.contains(&value) {
            results.push(input.child_result(
                &v,
                index_path(&enum_path, i),
                format!("enum contains a duplicate: `{}`", value.to_plain_string()),
            ));
        } else {
            seen.push(value);
        }
    }
    results
}

fn ref_siblings(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    // siblings only exist in the raw document
    let raw = ctx.index.raw();
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(raw.node(input.node.id()), input.path.clone())];
    while let Some((node, path)) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        if node.is_mapping() && node.ref_target().is_some() && node.len() > 1 {
            results.push(input.child_result(
                &node,
                path.clone(),
                "a `$ref` cannot be placed next to any other properties",
            ));
        }
        let children = node.children();
        for (i, (key, child)) in children.into_iter().enumerate().rev() {
            let next_path = match key {
                Some(k) => child_path(&path, &k),
                None => index_path(&path, i),
            };
            stack.push((child, next_path));
        }
    }
    results
}

const OAS2_COMPONENT_PREFIX: &[&str] = &[];
const OAS2_COMPONENT_GROUPS: &[&str] = &["definitions", "parameters", "responses"];
const OAS3_COMPONENT_PREFIX: &[&str] = &["components"];
const OAS3_COMPONENT_GROUPS: &[&str] = &[
    "schemas",
    "parameters",
    "requestBodies",
    "responses",
    "examples",
    "headers",
    "links",
    "callbacks",
];

/// Component groups that can be referenced, per format
fn component_groups(
    format: Option<SpecFormat>,
) -> (&'static [&'static str], &'static [&'static str]) {
    match format {
        Some(SpecFormat::Oas2) => (OAS2_COMPONENT_PREFIX, OAS2_COMPONENT_GROUPS),
        _ => (OAS3_COMPONENT_PREFIX, OAS3_COMPONENT_GROUPS),
    }
}

fn unused_component(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let referenced: HashSet<Vec<String>> = ctx
        .index
        .references(true)
        .iter()
        .map(|r| {
            let (_, pointer) = split_reference(&r.target);
            pointer
                .split('/')
                .skip(1)
                .map(decode_pointer_segment)
                .collect()
        })
        .collect();

    let (prefix, groups) = component_groups(ctx.spec_info.format);
    let mut container = input.node;
    let mut container_path = input.path.clone();
    for segment in prefix {
        match container.get(segment) {
            Some(next) => {
                container = next;
                container_path = child_path(&container_path, segment);
            }
            None => return Vec::new(),
        }
    }

    let mut results = Vec::new();
    for group in groups {
        let Some(members) = container.get(group) else { continue };
        let group_path = child_path(&container_path, group);
        for (key, member) in members.entries() {
            let Some(name) = key.text() else { continue };
            let mut pointer: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
            pointer.push(group.to_string());
            pointer.push(name.to_string());
            if referenced.contains(&pointer) {
                continue;
            }
            let display = pointer
                .iter()
                .map(|s| s.replace('~', "~0").replace('/', "~1"))
                .collect::<Vec<_>>()
                .join("/");
            results.push(input.child_result(
                &member,
                child_path(&group_path, name),
                format!("`#/{}` is potentially unused or has been orphaned", display),
            ));
        }
    }
    results
}

fn has_example(node: &NodeRef<'_>) -> bool {
    node.has("example")
        || node.has("examples")
        || node
            .get("schema")
            .is_some_and(|s| s.has("example") || s.has("examples"))
}

fn is_composite(schema: &NodeRef<'_>) -> bool {
    ["properties", "items", "allOf", "oneOf", "anyOf", "$ref"]
        .iter()
        .any(|k| schema.has(k))
        || matches!(
            schema.get("type").and_then(|t| t.text()),
            Some("object") | Some("array")
        )
}

fn example_missing(input: &InputNode<'_>, ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let root = input.node;
    let mut results = Vec::new();

    // schema properties
    let (schemas, schemas_path) = match ctx.spec_info.format {
        Some(SpecFormat::Oas2) => (
            root.get("definitions"),
            child_path(&input.path, "definitions"),
        ),
        _ => (
            root.get("components").and_then(|c| c.get("schemas")),
            child_path(&child_path(&input.path, "components"), "schemas"),
        ),
    };
    if let Some(schemas) = schemas {
        for (key, schema) in schemas.entries() {
            let Some(schema_name) = key.text() else { continue };
            let Some(properties) = schema.get("properties") else { continue };
            let props_path = child_path(&child_path(&schemas_path, schema_name), "properties");
            for (prop_key, prop) in properties.entries() {
                let Some(prop_name) = prop_key.text() else { continue };
                if !prop.is_mapping() || is_composite(&prop) || has_example(&prop) {
                    continue;
                }
                results.push(input.child_result(
                    &prop,
                    child_path(&props_path, prop_name),
                    format!(
                        "schema property `{}` is missing `examples` or `example`",
                        prop_name
                    ),
                ));
            }
        }
    }

    if ctx.spec_info.format == Some(SpecFormat::Oas2) {
        return results;
    }

    // parameters and media types of operations
    for op in operations(root, &input.path) {
        if let Some(params) = op.node.get("parameters") {
            let params_path = child_path(&op.json_path, "parameters");
            for (i, param) in params.items().into_iter().enumerate() {
                if !param.is_mapping() || param.has("content") || has_example(&param) {
                    continue;
                }
                let name = param.get("name").and_then(|n| n.text()).unwrap_or("");
                results.push(input.child_result(
                    &param,
                    index_path(&params_path, i),
                    format!("parameter `{}` is missing `examples` or `example`", name),
                ));
            }
        }

        let mut contents = Vec::new();
        if let Some(content) = op.node.get("requestBody").and_then(|b| b.get("content")) {
            contents.push((
                content,
                child_path(&child_path(&op.json_path, "requestBody"), "content"),
            ));
        }
        if let Some(responses) = op.node.get("responses") {
            let responses_path = child_path(&op.json_path, "responses");
            for (code, response) in responses.entries() {
                let Some(code) = code.text() else { continue };
                if let Some(content) = response.get("content") {
                    contents.push((
                        content,
                        child_path(&child_path(&responses_path, code), "content"),
                    ));
                }
            }
        }
        for (content, content_path) in contents {
            for (media_key, media) in content.entries() {
                let Some(media_type) = media_key.text() else { continue };
                if !media.is_mapping() || has_example(&media) {
                    continue;
                }
                results.push(input.child_result(
                    &media,
                    child_path(&content_path, media_type),
                    format!("media type `{}` is missing `examples` or `example`", media_type),
                ));
            }
        }
    }
    results
}

fn api_servers(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let servers = match input.node.get("servers") {
        Some(s) if !s.is_empty() => s,
        _ => return vec![input.result("no servers defined for the specification")],
    };
    let servers_path = child_path(&input.path, "servers");
    let mut results = Vec::new();
    for (i, server) in servers.items().into_iter().enumerate() {
        let path = index_path(&servers_path, i);
        match server.get("url").and_then(|u| u.text()) {
            None => results.push(input.child_result(
                &server,
                path,
                "server definition is missing a URL",
            )),
            Some(url) => {
                let relative = url.starts_with('/');
                let templated = url.contains('{');
                if !relative && !templated && url::Url::parse(url).is_err() {
                    let node = server.get("url").unwrap_or(server);
                    results.push(input.child_result(
                        &node,
                        child_path(&path, "url"),
                        format!("server URL `{}` cannot be parsed", url),
                    ));
                }
            }
        }
    }
    results
}

fn normalize_template(url: &str) -> Vec<String> {
    url.trim_end_matches('/')
        .split('/')
        .map(|s| {
            if s.starts_with('{') && s.ends_with('}') {
                "{}".to_string()
            } else {
                s.to_string()
            }
        })
        .collect()
}

fn ambiguous_paths(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let Some(paths) = input.node.get("paths") else {
        return Vec::new();
    };
    let paths_path = child_path(&input.path, "paths");
    let mut seen: BTreeMap<Vec<String>, String> = BTreeMap::new();
    let mut results = Vec::new();
    for (key, _) in paths.entries() {
        let Some(url) = key.text() else { continue };
        if url.starts_with("x-") {
            continue;
        }
        let normalized = normalize_template(url);
        match seen.get(&normalized) {
            Some(first) => results.push(input.child_result(
                &key,
                child_path(&paths_path, url),
                format!("paths are ambiguous with one another `{}` and `{}`", first, url),
            )),
            None => {
                seen.insert(normalized, url.to_string());
            }
        }
    }
    results
}

fn kebab_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*(?:\.[a-z0-9]+)?$").unwrap_or_else(|_| unreachable!())
    })
}

fn paths_kebab_case(input: &InputNode<'_>, _ctx: &FunctionContext<'_>) -> Vec<RuleFunctionResult> {
    let Some(paths) = input.node.get("paths") else {
        return Vec::new();
    };
    let paths_path = child_path(&input.path, "paths");
    let mut results = Vec::new();
    for (key, _) in paths.entries() {
        let Some(url) = key.text() else { continue };
        if url.starts_with("x-") {
            continue;
        }
        let bad = url.split('/').find(|segment| {
            !segment.is_empty()
                && !(segment.starts_with('{') && segment.ends_with('}'))
                && !kebab_regex().is_match(segment)
        });
        if let Some(segment) = bad {
            results.push(input.child_result(
                &key,
                child_path(&paths_path, url),
                format!("path segment `{}` in `{}` must be kebab-case", segment, url),
            ));
        }
    }
    results
}

fn op_security_defined(
    input: &InputNode<'_>,
    ctx: &FunctionContext<'_>,
) -> Vec<RuleFunctionResult> {
    let root = input.node;
    let (schemes, location) = match ctx.spec_info.format {
        Some(SpecFormat::Oas2) => (root.get("securityDefinitions"), "securityDefinitions"),
        _ => (
            root.get("components").and_then(|c| c.get("securitySchemes")),
            "components.securitySchemes",
        ),
    };
    let defined: HashSet<&str> = schemes
        .map(|s| s.keys())
        .unwrap_or_default()
        .into_iter()
        .collect();

    let mut requirements = Vec::new();
    if let Some(security) = root.get("security") {
        requirements.push((security, child_path(&input.path, "security")));
    }
    for op in operations(root, &input.path) {
        if let Some(security) = op.node.get("security") {
            requirements.push((security, child_path(&op.json_path, "security")));
        }
    }

    let mut results = Vec::new();
    for (security, path) in requirements {
        for (i, requirement) in security.items().into_iter().enumerate() {
            let requirement_path = index_path(&path, i);
            for (key, _) in requirement.entries() {
                let Some(name) = key.text() else { continue };
                if !defined.contains(name) {
                    results.push(input.child_result(
                        &key,
                        child_path(&requirement_path, name),
                        format!(
                            "`security` requirement `{}` is not defined in `{}`",
                            name, location
                        ),
                    ));
                }
            }
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

    fn run(function: &dyn RuleFunction, source: &str) -> Vec<RuleFunctionResult> {
        let mut harness = Harness::new(source, Rule::new("test", "$", function.name()));
        harness.spec_info = SpecInfo::extract(&harness.index, "api.yaml").unwrap();
        harness.run(function, "$")
    }

    const PETS: &str = r#"openapi: 3.0.0
info:
  title: pets
  version: '1'
tags:
  - name: pets
paths:
  /pets:
    get:
      operationId: listItems
      tags: [pets]
      responses:
        '200':
          description: ok
    post:
      operationId: listItems
      tags: [animals]
      responses:
        '400':
          description: bad
  /pets/{id}:
    get:
      description: one pet
      responses:
        '200':
          description: ok
        '404':
          description: missing
"#;

    #[test]
    fn test_operations_in_order() {
        let index = crate::index::DocumentIndex::parse(PETS.as_bytes(), "api.yaml").unwrap();
        let ops = operations(index.raw().root(), "$");
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].method, "get");
        assert_eq!(ops[1].json_path, "$.paths['/pets'].post");
        assert_eq!(ops[2].path, "/pets/{id}");
    }

    #[test]
    fn test_operation_id_unique() {
        let results = run(&OperationIdUnique, PETS);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "$.paths['/pets'].get.operationId");
        assert_eq!(results[1].path, "$.paths['/pets'].post.operationId");
        assert!(results[0].message.contains("`listItems` must be unique"));
    }

    #[test]
    fn test_operation_id_missing() {
        let results = run(&OperationId, PETS);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.paths['/pets/{id}'].get");
    }

    #[test]
    fn test_responses() {
        let results = run(&SuccessResponse, PETS);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`POST`"));

        let results = run(&ErrorResponse, PETS);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`GET` operation at path `/pets`"));
    }

    #[test]
    fn test_tags() {
        let results = run(&OperationTags, PETS);
        assert_eq!(results.len(), 1);

        let results = run(&TagDefined, PETS);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`animals`"));
        assert_eq!(results[0].path, "$.paths['/pets'].post.tags[0]");

        let results = run(&TagDescription, PETS);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "tag `pets` must have a description");
    }

    #[test]
    fn test_path_params() {
        let results = run(&PathParameters, PETS);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("must define parameter `id`"));

        let source = r#"openapi: 3.0.0
paths:
  /pets/{id}:
    parameters:
      - name: id
        in: path
        required: true
      - name: other
        in: path
    get:
      responses: {}
"#;
        let results = run(&PathParameters, source);
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.message.contains("`other` must be used")));
        assert!(results.iter().any(|r| r.message.contains("`required` set to `true`")));
    }

    #[test]
    fn test_descriptions() {
        let results = run(&OperationDescriptions, PETS);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_op_params_duplicates() {
        let source = r#"swagger: '2.0'
paths:
  /a:
    post:
      parameters:
        - {name: q, in: query}
        - {name: q, in: query}
        - {name: b1, in: body}
        - {name: b2, in: body}
"#;
        let results = run(&OperationParameters, source);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "$.paths['/a'].post.parameters[1]");
        assert!(results[1].message.contains("more than a single `body`"));
    }

    #[test]
    fn test_enums() {
        let source = "schema:\n  type: integer\n  enum: [1, 'two', 1]\n";
        let mut harness = Harness::new(source, Rule::new("t", "$.schema", "typedEnum"));
        harness.spec_info = SpecInfo::unknown(&harness.index, "api.yaml");
        let results = harness.run(&TypedEnum, "$.schema");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.schema.enum[1]");

        let results = harness.run(&DuplicatedEnum, "$.schema");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.schema.enum[2]");
    }

    #[test]
    fn test_ref_siblings() {
        let source = "openapi: 3.0.0\na:\n  $ref: '#/b'\n  description: x\nb:\n  $ref: '#/a'\n";
        let results = run(&RefSiblings, source);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.a");
    }

    #[test]
    fn test_unused_component() {
        let source = r#"openapi: 3.0.0
paths:
  /a:
    get:
      responses:
        '200':
          $ref: '#/components/responses/Ok'
components:
  responses:
    Ok:
      description: ok
  schemas:
    Orphan:
      type: string
"#;
        let results = run(&UnusedComponent, source);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.starts_with("`#/components/schemas/Orphan`"));
    }

    #[test]
    fn test_example_missing() {
        let source = r#"openapi: 3.0.0
components:
  schemas:
    Pet:
      type: object
      properties:
        name:
          type: string
        age:
          type: integer
          example: 3
        owner:
          type: object
paths:
  /pets:
    get:
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
      responses:
        '200':
          content:
            application/json:
              example: {}
"#;
        let results = run(&ExampleMissing, source);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "$.components.schemas.Pet.properties.name");
        assert!(results[1].message.starts_with("parameter `limit`"));
    }

    #[test]
    fn test_api_servers() {
        let results = run(&ApiServers, "openapi: 3.0.0\n");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "no servers defined for the specification");

        let source = "openapi: 3.0.0\nservers:\n  - url: https://api.example.com\n  - description: x\n  - url: '::nope'\n";
        let results = run(&ApiServers, source);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_ambiguous_and_kebab_paths() {
        let source = "openapi: 3.0.0\npaths:\n  /pets/{id}: {}\n  /pets/{name}: {}\n  /PetOwners: {}\n";
        let results = run(&AmbiguousPaths, source);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`/pets/{id}` and `/pets/{name}`"));

        let results = run(&PathsKebabCase, source);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`PetOwners`"));
    }

    #[test]
    fn test_security_defined() {
        let source = r#"openapi: 3.0.0
security:
  - apiKey: []
paths:
  /a:
    get:
      security:
        - oauth: []
components:
  securitySchemes:
    apiKey:
      type: apiKey
"#;
        let results = run(&OperationSecurityDefined, source);
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("`oauth`"));
    }
}
