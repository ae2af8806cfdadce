//! Generic functions usable on any document shape

use super::{
    project_field, FunctionContext, FunctionSchema, InputNode, OptionKind, RuleFunction,
};
use crate::diagnostic::RuleFunctionResult;
use crate::index::path::child_path;
use crate::index::NodeRef;
use crate::value::Value;
use anyhow::Context as _;
use regex::Regex;
use std::sync::Arc;

/// Every function in this module
pub fn functions() -> Vec<Arc<dyn RuleFunction>> {
    vec![
        Arc::new(Truthy),
        Arc::new(Falsy),
        Arc::new(Defined),
        Arc::new(Undefined),
        Arc::new(Xor),
        Arc::new(Casing),
        Arc::new(Alphabetical),
        Arc::new(Enumeration),
        Arc::new(Pattern),
        Arc::new(Length),
        Arc::new(Blank),
    ]
}

/// Names of the functions scripts can call through `vacuum_<name>`
pub const BRIDGED: &[&str] = &[
    "truthy",
    "falsy",
    "defined",
    "undefined",
    "xor",
    "casing",
    "alphabetical",
    "enumeration",
    "pattern",
    "length",
    "blank",
    "schema",
];

/// Text used to name a node in messages
pub(crate) fn label(input: &InputNode<'_>) -> String {
    if let Some(text) = input.node.text() {
        return text.to_string();
    }
    if let Some(key) = input.key.and_then(|k| k.text()) {
        return key.to_string();
    }
    input.path.clone()
}

/// JSONPath a field selector would produce below `path`
fn field_path(path: &str, field: &str) -> String {
    if field == "@key" {
        return path.to_string();
    }
    if let Some(rest) = field.strip_prefix('$') {
        return format!("{}{}", path, rest);
    }
    field
        .split('.')
        .fold(path.to_string(), |acc, segment| child_path(&acc, segment))
}

/// Presence checks shared by truthy, falsy, defined and undefined
fn presence<F>(
    input: &[InputNode<'_>],
    ctx: &FunctionContext<'_>,
    ok: F,
    verb: &str,
) -> Vec<RuleFunctionResult>
where
    F: Fn(Option<&NodeRef<'_>>) -> bool,
{
    let mut results = Vec::new();
    for item in input {
        match ctx.field() {
            Some(field) => {
                let target = project_field(item, field);
                if !ok(target.as_ref().map(|t| &t.node)) {
                    let path = target
                        .as_ref()
                        .map(|t| t.path.clone())
                        .unwrap_or_else(|| field_path(&item.path, field));
                    let anchor = target.as_ref().map(|t| t.node).unwrap_or(item.node);
                    results.push(item.child_result(
                        &anchor,
                        path,
                        format!("`{}` must {}", field, verb),
                    ));
                }
            }
            None => {
                if !ok(Some(&item.node)) {
                    results.push(item.result(format!("`{}` must {}", label(item), verb)));
                }
            }
        }
    }
    results
}

pub struct Truthy;

impl RuleFunction for Truthy {
    fn name(&self) -> &str {
        "truthy"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        Ok(presence(input, ctx, |n| n.is_some_and(|n| n.is_truthy()), "be set"))
    }

    fn inspects_field(&self) -> bool {
        true
    }
}

pub struct Falsy;

impl RuleFunction for Falsy {
    fn name(&self) -> &str {
        "falsy"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        Ok(presence(input, ctx, |n| n.map_or(true, |n| !n.is_truthy()), "be falsy"))
    }

    fn inspects_field(&self) -> bool {
        true
    }
}

pub struct Defined;

impl RuleFunction for Defined {
    fn name(&self) -> &str {
        "defined"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        Ok(presence(input, ctx, |n| n.is_some(), "be defined"))
    }

    fn inspects_field(&self) -> bool {
        true
    }
}

pub struct Undefined;

impl RuleFunction for Undefined {
    fn name(&self) -> &str {
        "undefined"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        Ok(presence(input, ctx, |n| n.is_none(), "be undefined"))
    }

    fn inspects_field(&self) -> bool {
        true
    }
}

/// Exactly one of the listed properties must be present
pub struct Xor;

impl RuleFunction for Xor {
    fn name(&self) -> &str {
        "xor"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("xor")
            .require("properties")
            .with_property("properties", OptionKind::Array, "properties, one of which must be set")
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let properties = ctx.option_list("properties");
        if properties.len() < 2 {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for item in input.iter().filter(|i| i.node.is_mapping()) {
            let present = properties.iter().filter(|p| item.node.has(p)).count();
            if present != 1 {
                let names: Vec<String> = properties.iter().map(|p| format!("`{}`", p)).collect();
                results.push(item.result(format!(
                    "{} must not be both defined or both undefined",
                    names.join(" and ")
                )));
            }
        }
        Ok(results)
    }
}

/// Casing styles understood by [`Casing`]
fn casing_pattern(kind: &str, digits: bool) -> Option<String> {
    let d = if digits { "0-9" } else { "" };
    let pattern = match kind {
        "flat" => format!("[a-z][a-z{d}]*"),
        "camel" => format!("[a-z][a-z{d}]*(?:[A-Z{d}](?:[a-z{d}]+|$))*"),
        "pascal" => format!("[A-Z][a-z{d}]*(?:[A-Z{d}](?:[a-z{d}]+|$))*"),
        "kebab" => format!("[a-z][a-z{d}]*(?:-[a-z{d}]+)*"),
        "cobol" => format!("[A-Z][A-Z{d}]*(?:-[A-Z{d}]+)*"),
        "snake" => format!("[a-z][a-z{d}]*(?:_[a-z{d}]+)*"),
        "macro" => format!("[A-Z][A-Z{d}]*(?:_[A-Z{d}]+)*"),
        _ => return None,
    };
    Some(pattern)
}

pub struct Casing;

impl RuleFunction for Casing {
    fn name(&self) -> &str {
        "casing"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("casing")
            .require("type")
            .with_property(
                "type",
                OptionKind::String,
                "flat, camel, pascal, kebab, cobol, snake or macro",
            )
            .with_property("disallowDigits", OptionKind::Boolean, "reject digits")
            .with_property("separator", OptionKind::Object, "{char, allowLeading}")
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let kind = ctx.option_str("type").unwrap_or("");
        let digits = !ctx.option_bool("disallowDigits").unwrap_or(false);
        let base = casing_pattern(kind, digits)
            .ok_or_else(|| anyhow::anyhow!("unknown casing type '{}'", kind))?;

        let separator = ctx.option("separator");
        let sep_char = separator
            .and_then(|s| s.get("char"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());
        let pattern = match sep_char {
            Some(c) => {
                let sep = regex::escape(c);
                let leading = separator
                    .and_then(|s| s.get("allowLeading"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                format!(
                    "^{}{}(?:{}{})*$",
                    if leading { format!("{}?", sep) } else { String::new() },
                    base,
                    sep,
                    base
                )
            }
            None => format!("^{}$", base),
        };
        let re = Regex::new(&pattern).context("casing pattern")?;

        let mut results = Vec::new();
        for item in input {
            let Some(text) = item.node.text() else { continue };
            if text.is_empty() || re.is_match(text) {
                continue;
            }
            results.push(item.result(format!("`{}` is not {} case", text, kind)));
        }
        Ok(results)
    }
}

pub struct Alphabetical;

impl RuleFunction for Alphabetical {
    fn name(&self) -> &str {
        "alphabetical"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("alphabetical").with_property(
            "keyedBy",
            OptionKind::String,
            "property to sort objects by",
        )
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let keyed_by = ctx.option_str("keyedBy");
        let mut results = Vec::new();
        for item in input {
            let names: Vec<String> = if item.node.is_mapping() {
                item.node.keys().into_iter().map(String::from).collect()
            } else if item.node.is_sequence() {
                item.node
                    .items()
                    .iter()
                    .filter_map(|i| match keyed_by {
                        Some(key) => i.get(key).and_then(|v| v.text()).map(String::from),
                        None => i.text().map(String::from),
                    })
                    .collect()
            } else {
                continue;
            };
            if let Some(pair) = names.windows(2).find(|w| w[0] > w[1]) {
                results.push(item.result(format!(
                    "`{}` must be placed before `{}` (alphabetical)",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(results)
    }
}

pub struct Enumeration;

impl RuleFunction for Enumeration {
    fn name(&self) -> &str {
        "enumeration"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("enumeration")
            .require("values")
            .with_property("values", OptionKind::Array, "allowed values")
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let values = ctx.option_list("values");
        let mut results = Vec::new();
        for item in input {
            let Some(text) = item.node.text() else { continue };
            if !values.iter().any(|v| v == text) {
                results.push(item.result(format!(
                    "`{}` must equal to one of: [{}]",
                    text,
                    values.join(", ")
                )));
            }
        }
        Ok(results)
    }
}

/// Compile `re` or `/re/flags`
pub fn compile_pattern(source: &str) -> Result<Regex, regex::Error> {
    if let Some(rest) = source.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (body, flags) = (&rest[..end], &rest[end + 1..]);
            if flags.chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u' | 'g')) {
                let flags: String = flags.chars().filter(|c| *c != 'g' && *c != 'u').collect();
                return if flags.is_empty() {
                    Regex::new(body)
                } else {
                    Regex::new(&format!("(?{}){}", flags, body))
                };
            }
        }
    }
    Regex::new(source)
}

pub struct Pattern;

impl RuleFunction for Pattern {
    fn name(&self) -> &str {
        "pattern"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("pattern")
            .with_property("match", OptionKind::String, "value must match")
            .with_property("notMatch", OptionKind::String, "value must not match")
            .with_min_properties(1)
            .with_max_properties(2)
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let must = ctx
            .option_str("match")
            .map(|p| compile_pattern(p).map(|re| (p, re)))
            .transpose()
            .context("invalid `match` expression")?;
        let must_not = ctx
            .option_str("notMatch")
            .map(|p| compile_pattern(p).map(|re| (p, re)))
            .transpose()
            .context("invalid `notMatch` expression")?;

        let mut results = Vec::new();
        for item in input {
            let Some(text) = item.node.text() else { continue };
            if let Some((source, re)) = &must {
                if !re.is_match(text) {
                    results.push(item.result(format!(
                        "`{}` does not match the expression `{}`",
                        text, source
                    )));
                }
            }
            if let Some((source, re)) = &must_not {
                if re.is_match(text) {
                    results.push(
                        item.result(format!("`{}` matches the expression `{}`", text, source)),
                    );
                }
            }
        }
        Ok(results)
    }
}

pub struct Length;

impl RuleFunction for Length {
    fn name(&self) -> &str {
        "length"
    }

    fn schema(&self) -> FunctionSchema {
        FunctionSchema::new("length")
            .with_property("min", OptionKind::Integer, "minimum length")
            .with_property("max", OptionKind::Integer, "maximum length")
            .with_min_properties(1)
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let min = ctx.option("min").and_then(Value::as_f64);
        let max = ctx.option("max").and_then(Value::as_f64);
        let mut results = Vec::new();
        for item in input {
            let node = &item.node;
            let size = if node.is_mapping() || node.is_sequence() {
                node.len() as f64
            } else if node.is_null() {
                continue;
            } else if let (false, Some(n)) = (node.as_str().is_some(), node.as_f64()) {
                n
            } else {
                node.text().map(|t| t.chars().count()).unwrap_or(0) as f64
            };
            let name = label(item);
            if let Some(max) = max {
                if size > max {
                    results.push(item.result(format!(
                        "`{}` must not be longer than {}",
                        name, max
                    )));
                }
            }
            if let Some(min) = min {
                if size < min {
                    results.push(item.result(format!(
                        "`{}` must not be shorter than {}",
                        name, min
                    )));
                }
            }
        }
        Ok(results)
    }
}

pub struct Blank;

impl RuleFunction for Blank {
    fn name(&self) -> &str {
        "blank"
    }

    fn run(
        &self,
        input: &[InputNode<'_>],
        _ctx: &FunctionContext<'_>,
    ) -> anyhow::Result<Vec<RuleFunctionResult>> {
        let mut results = Vec::new();
        for item in input {
            let node = &item.node;
            let blank = if node.is_mapping() || node.is_sequence() {
                node.is_empty()
            } else {
                node.is_null() || node.text().map_or(true, |t| t.trim().is_empty())
            };
            if !blank {
                results.push(item.result(format!("`{}` must be blank", label(item))));
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::Harness;
    use crate::rule::Rule;

    fn rule_with(function: &str, field: Option<&str>, options: &str) -> Rule {
        let mut rule = Rule::new("test-rule", "$", function);
        if let Some(field) = field {
            rule = rule.with_field(field);
        }
        if !options.is_empty() {
            let value: serde_yaml::Value = serde_yaml::from_str(options).unwrap();
            rule = rule.with_options(Value::from(value));
        }
        rule
    }

    #[test]
    fn test_truthy_reports_missing_field() {
        let source = "info:\n  title: t\n";
        let harness = Harness::new(source, rule_with("truthy", Some("contact"), ""));
        let results = harness.run(&Truthy, "$.info");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "`contact` must be set");
        assert_eq!(results[0].path, "$.info.contact");
        assert_eq!(results[0].line(), 2);
    }

    #[test]
    fn test_truthy_and_falsy_values() {
        let source = "a: true\nb: ''\nc: 0\n";
        let harness = Harness::new(source, rule_with("truthy", None, ""));
        let results = harness.run(&Truthy, "$.*");
        assert_eq!(results.len(), 2);

        let harness = Harness::new(source, rule_with("falsy", None, ""));
        let results = harness.run(&Falsy, "$.*");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.a");
    }

    #[test]
    fn test_defined_undefined() {
        let source = "a:\n  x: null\n";
        let harness = Harness::new(source, rule_with("defined", Some("x"), ""));
        assert!(harness.run(&Defined, "$.a").is_empty());

        let harness = Harness::new(source, rule_with("undefined", Some("x"), ""));
        assert_eq!(harness.run(&Undefined, "$.a").len(), 1);

        let harness = Harness::new(source, rule_with("defined", Some("y"), ""));
        assert_eq!(harness.run(&Defined, "$.a").len(), 1);
    }

    #[test]
    fn test_xor() {
        let source = "a:\n  x: 1\n  y: 2\nb:\n  x: 1\nc:\n  z: 1\n";
        let harness = Harness::new(source, rule_with("xor", None, "properties: [x, y]"));
        let results = harness.run(&Xor, "$.*");
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].message,
            "`x` and `y` must not be both defined or both undefined"
        );
    }

    #[test]
    fn test_casing() {
        let source = "names: [getPets, GetPets, get_pets, get-pets]\n";
        let harness = Harness::new(source, rule_with("casing", None, "type: camel"));
        let results = harness.run(&Casing, "$.names[*]");
        assert_eq!(results.len(), 3);

        let harness = Harness::new(source, rule_with("casing", None, "type: kebab"));
        let results = harness.run(&Casing, "$.names[*]");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].message, "`getPets` is not kebab case");

        let harness = Harness::new(
            "v: ['x-one-two', 'one-two']\n",
            rule_with(
                "casing",
                None,
                "type: flat\nseparator:\n  char: '-'\n  allowLeading: false",
            ),
        );
        let results = harness.run(&Casing, "$.v[*]");
        assert_eq!(results.len(), 0);
    }

    #[test]
    fn test_casing_unknown_type_errors() {
        let harness = Harness::new("a: b\n", rule_with("casing", None, "type: wavy"));
        let ctx = harness.context();
        let input = crate::functions::InputNode {
            node: harness.index.raw().root(),
            path: "$".into(),
            key: None,
            index: 0,
        };
        assert!(Casing.run(&[input], &ctx).is_err());
    }

    #[test]
    fn test_alphabetical() {
        let source = "tags:\n  - name: b\n  - name: a\nkeys:\n  a: 1\n  b: 2\n";
        let harness = Harness::new(source, rule_with("alphabetical", None, "keyedBy: name"));
        let results = harness.run(&Alphabetical, "$.tags");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message, "`a` must be placed before `b` (alphabetical)");

        let harness = Harness::new(source, rule_with("alphabetical", None, ""));
        assert!(harness.run(&Alphabetical, "$.keys").is_empty());
    }

    #[test]
    fn test_enumeration() {
        let source = "in: [query, cookie]\n";
        let harness = Harness::new(
            source,
            rule_with("enumeration", None, "values: [query, path, header]"),
        );
        let results = harness.run(&Enumeration, "$.in[*]");
        assert_eq!(results.len(), 1);
        assert!(results[0].message.starts_with("`cookie` must equal to one of"));
    }

    #[test]
    fn test_pattern() {
        let source = "paths:\n  /pets/: {}\n  /users: {}\n";
        let harness = Harness::new(source, rule_with("pattern", Some("@key"), "notMatch: '.+/$'"));
        let results = harness.run(&Pattern, "$.paths[*]");
        assert_eq!(results.len(), 1);
        assert!(results[0].message.starts_with("`/pets/` matches"));
        assert_eq!(results[0].path, "$.paths['/pets/']");

        let harness = Harness::new("v: ABC\n", rule_with("pattern", None, "match: '/^abc$/i'"));
        assert!(harness.run(&Pattern, "$.v").is_empty());
    }

    #[test]
    fn test_compile_pattern_flags() {
        assert!(compile_pattern("/^a$/i").unwrap().is_match("A"));
        assert!(compile_pattern("^a/b$").unwrap().is_match("a/b"));
        assert!(compile_pattern("(").is_err());
    }

    #[test]
    fn test_length() {
        let source = "s: abcdef\nl: [1, 2]\nn: 10\n";
        let harness = Harness::new(source, rule_with("length", None, "max: 3"));
        let results = harness.run(&Length, "$.*");
        assert_eq!(results.len(), 2);

        let harness = Harness::new(source, rule_with("length", None, "min: 3"));
        let results = harness.run(&Length, "$.l");
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("must not be shorter than 3"));
    }

    #[test]
    fn test_blank() {
        let source = "a: ''\nb: []\nc: x\n";
        let harness = Harness::new(source, rule_with("blank", None, ""));
        let results = harness.run(&Blank, "$.*");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "$.c");
    }
}
