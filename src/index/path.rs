//! JSONPath queries over a [`Tree`]

use super::{NodeId, NodeRef, Tree};
use crate::value::Value;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// A `given` or `field` expression that failed to parse
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid path '{path}' at position {position}: {message}")]
pub struct PathError {
    pub path: String,
    pub position: usize,
    pub message: String,
}

/// A node selected by a query
#[derive(Debug, Clone)]
pub struct Match<'a> {
    pub node: NodeRef<'a>,
    /// Normalized JSONPath of the node
    pub path: String,
    /// Key node when the match is a mapping value
    pub key: Option<NodeRef<'a>>,
    /// Position when the match is a sequence item
    pub index: Option<usize>,
}

impl<'a> Match<'a> {
    pub fn root(node: NodeRef<'a>) -> Self {
        Self {
            node,
            path: "$".to_string(),
            key: None,
            index: None,
        }
    }

    /// Name of the match within its parent
    pub fn property(&self) -> Option<Value> {
        match (&self.key, self.index) {
            (Some(key), _) => key.text().map(Value::from),
            (None, Some(i)) => Some(Value::Int(i as i64)),
            _ => None,
        }
    }

    fn children(&self) -> Vec<Match<'a>> {
        if self.node.is_mapping() {
            self.node
                .entries()
                .into_iter()
                .map(|(k, v)| Match {
                    node: v,
                    path: child_path(&self.path, k.text().unwrap_or("")),
                    key: Some(k),
                    index: None,
                })
                .collect()
        } else {
            self.node
                .items()
                .into_iter()
                .enumerate()
                .map(|(i, v)| Match {
                    node: v,
                    path: index_path(&self.path, i),
                    key: None,
                    index: Some(i),
                })
                .collect()
        }
    }
}

/// Path of a mapping child
pub fn child_path(parent: &str, key: &str) -> String {
    let simple = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if simple {
        format!("{}.{}", parent, key)
    } else {
        format!("{}['{}']", parent, key.replace('\'', "\\'"))
    }
}

/// Path of a sequence item
pub fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

#[derive(Debug, Clone)]
enum Segment {
    Child(Vec<Selector>),
    Descendant(Vec<Selector>),
}

#[derive(Debug, Clone)]
enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Slice(Option<i64>, Option<i64>),
    Filter(Expr),
}

#[derive(Debug, Clone)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Truthy(Operand),
    Compare(Operand, CmpOp, Operand),
    Matches(Operand, Regex),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Step {
    Name(String),
    Index(i64),
}

#[derive(Debug, Clone)]
enum Operand {
    Current(Vec<Step>),
    Root(Vec<Step>),
    Property,
    Literal(Value),
}

/// A compiled JSONPath expression
#[derive(Debug, Clone)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        let mut parser = PathParser {
            src: source,
            chars: source.chars().collect(),
            pos: 0,
        };
        let segments = parser.parse_path()?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Run the query from the document root
    pub fn query<'a>(&self, tree: Tree<'a>) -> Vec<Match<'a>> {
        self.query_from(Match::root(tree.root()))
    }

    /// Run the query with `$` bound to `start`
    pub fn query_from<'a>(&self, start: Match<'a>) -> Vec<Match<'a>> {
        let root = start.node.tree().root();
        let mut current = vec![start];
        for segment in &self.segments {
            let mut next = Vec::new();
            match segment {
                Segment::Child(selectors) => {
                    for m in &current {
                        for selector in selectors {
                            select(m, selector, root, &mut next);
                        }
                    }
                }
                Segment::Descendant(selectors) => {
                    let mut seen = HashSet::new();
                    let mut all = Vec::new();
                    for m in &current {
                        descendants(m.clone(), &mut all, &mut seen);
                    }
                    for m in &all {
                        for selector in selectors {
                            select(m, selector, root, &mut next);
                        }
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

fn descendants<'a>(start: Match<'a>, out: &mut Vec<Match<'a>>, seen: &mut HashSet<NodeId>) {
    let mut stack = vec![start];
    while let Some(m) = stack.pop() {
        if !seen.insert(m.node.id()) {
            continue;
        }
        let mut children = m.children();
        children.reverse();
        out.push(m);
        stack.extend(children);
    }
}

fn select<'a>(m: &Match<'a>, selector: &Selector, root: NodeRef<'a>, out: &mut Vec<Match<'a>>) {
    match selector {
        Selector::Name(name) => {
            if let Some((key, value)) = m.node.entry(name) {
                out.push(Match {
                    node: value,
                    path: child_path(&m.path, name),
                    key: Some(key),
                    index: None,
                });
            }
        }
        Selector::Wildcard => out.extend(m.children()),
        Selector::Index(i) => {
            let items = m.node.items();
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if idx >= 0 && idx < len {
                out.push(Match {
                    node: items[idx as usize],
                    path: index_path(&m.path, idx as usize),
                    key: None,
                    index: Some(idx as usize),
                });
            }
        }
        Selector::Slice(start, end) => {
            let len = m.node.items().len() as i64;
            let clamp = |v: i64| if v < 0 { (len + v).max(0) } else { v.min(len) };
            let from = start.map(clamp).unwrap_or(0);
            let to = end.map(clamp).unwrap_or(len);
            out.extend(
                m.children()
                    .into_iter()
                    .filter(|c| c.index.is_some_and(|i| (i as i64) >= from && (i as i64) < to)),
            );
        }
        Selector::Filter(expr) => {
            out.extend(
                m.children()
                    .into_iter()
                    .filter(|child| eval(expr, child, root)),
            );
        }
    }
}

fn eval(expr: &Expr, current: &Match<'_>, root: NodeRef<'_>) -> bool {
    match expr {
        Expr::Or(a, b) => eval(a, current, root) || eval(b, current, root),
        Expr::And(a, b) => eval(a, current, root) && eval(b, current, root),
        Expr::Not(inner) => !eval(inner, current, root),
        Expr::Truthy(operand) => match operand {
            Operand::Current(steps) => walk(current.node, steps).is_some_and(|n| n.is_truthy()),
            Operand::Root(steps) => walk(root, steps).is_some_and(|n| n.is_truthy()),
            Operand::Property => current.property().is_some(),
            Operand::Literal(v) => !matches!(v, Value::Null | Value::Bool(false)),
        },
        Expr::Compare(a, op, b) => {
            let left = operand_value(a, current, root);
            let right = operand_value(b, current, root);
            compare(left.as_ref(), *op, right.as_ref())
        }
        Expr::Matches(operand, re) => match operand_value(operand, current, root) {
            Some(Value::String(s)) => re.is_match(&s),
            Some(Value::Int(i)) => re.is_match(&i.to_string()),
            Some(Value::Float(x)) => re.is_match(&x.to_string()),
            Some(Value::Bool(b)) => re.is_match(&b.to_string()),
            _ => false,
        },
    }
}

fn walk<'a>(start: NodeRef<'a>, steps: &[Step]) -> Option<NodeRef<'a>> {
    let mut node = start;
    for step in steps {
        node = match step {
            Step::Name(name) => node.get(name)?,
            Step::Index(i) => {
                let items = node.items();
                let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                *items.get(usize::try_from(idx).ok()?)?
            }
        };
    }
    Some(node)
}

fn operand_value(operand: &Operand, current: &Match<'_>, root: NodeRef<'_>) -> Option<Value> {
    match operand {
        Operand::Current(steps) => walk(current.node, steps).map(|n| n.to_value()),
        Operand::Root(steps) => walk(root, steps).map(|n| n.to_value()),
        Operand::Property => current.property(),
        Operand::Literal(v) => Some(v.clone()),
    }
}

fn compare(left: Option<&Value>, op: CmpOp, right: Option<&Value>) -> bool {
    let (Some(l), Some(r)) = (left, right) else {
        return op == CmpOp::Ne && left.is_some() != right.is_some();
    };
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    match (l, r, op) {
        (_, _, CmpOp::Eq) => l == r,
        (_, _, CmpOp::Ne) => l != r,
        (Value::String(a), Value::String(b), op) => match op {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq | CmpOp::Ne => false,
        },
        _ => false,
    }
}

struct PathParser<'s> {
    src: &'s str,
    chars: Vec<char>,
    pos: usize,
}

impl PathParser<'_> {
    fn error(&self, message: &str) -> PathError {
        PathError {
            path: self.src.to_string(),
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), PathError> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn parse_path(&mut self) -> Result<Vec<Segment>, PathError> {
        if self.peek() != Some('$') {
            return Err(self.error("path must start with '$'"));
        }
        self.pos += 1;
        let mut segments = Vec::new();
        while let Some(c) = self.peek() {
            if self.starts_with("..") {
                self.pos += 2;
                let selectors = match self.peek() {
                    Some('[') => self.parse_bracket()?,
                    Some('*') => {
                        self.pos += 1;
                        vec![Selector::Wildcard]
                    }
                    _ => vec![Selector::Name(self.parse_dot_name()?)],
                };
                segments.push(Segment::Descendant(selectors));
            } else if c == '.' {
                self.pos += 1;
                if self.peek() == Some('*') {
                    self.pos += 1;
                    segments.push(Segment::Child(vec![Selector::Wildcard]));
                } else {
                    segments.push(Segment::Child(vec![Selector::Name(self.parse_dot_name()?)]));
                }
            } else if c == '[' {
                let selectors = self.parse_bracket()?;
                segments.push(Segment::Child(selectors));
            } else {
                return Err(self.error(&format!("unexpected character '{}'", c)));
            }
        }
        Ok(segments)
    }

    fn parse_dot_name(&mut self) -> Result<String, PathError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '.' && c != '[') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a property name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_bracket(&mut self) -> Result<Vec<Selector>, PathError> {
        self.expect('[')?;
        self.skip_ws();
        if self.peek() == Some('?') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.expect(']')?;
            return Ok(vec![Selector::Filter(expr)]);
        }
        let mut selectors = Vec::new();
        loop {
            self.skip_ws();
            let selector = match self.peek() {
                Some('\'') | Some('"') => Selector::Name(self.parse_string()?),
                Some('*') => {
                    self.pos += 1;
                    Selector::Wildcard
                }
                Some(c) if c == '-' || c == ':' || c.is_ascii_digit() => {
                    self.parse_index_or_slice()?
                }
                Some(_) => {
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != ',' && c != ']') {
                        self.pos += 1;
                    }
                    let name: String = self.chars[start..self.pos].iter().collect();
                    Selector::Name(name.trim().to_string())
                }
                None => return Err(self.error("unterminated bracket")),
            };
            selectors.push(selector);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(selectors);
                }
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_int(&mut self) -> Option<i64> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse().ok()
    }

    fn parse_index_or_slice(&mut self) -> Result<Selector, PathError> {
        let start = self.parse_int();
        self.skip_ws();
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ws();
            let end = self.parse_int();
            return Ok(Selector::Slice(start, end));
        }
        start
            .map(Selector::Index)
            .ok_or_else(|| self.error("expected an index"))
    }

    fn parse_string(&mut self) -> Result<String, PathError> {
        let quote = self.peek().ok_or_else(|| self.error("expected a string"))?;
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\\' {
                if let Some(escaped) = self.peek() {
                    out.push(escaped);
                    self.pos += 1;
                }
            } else if c == quote {
                return Ok(out);
            } else {
                out.push(c);
            }
        }
        Err(self.error("unterminated string"))
    }

    fn parse_expr(&mut self) -> Result<Expr, PathError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.starts_with("||") {
                self.pos += 2;
                let right = self.parse_and()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, PathError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.starts_with("&&") {
                self.pos += 2;
                let right = self.parse_unary()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, PathError> {
        self.skip_ws();
        match self.peek() {
            Some('!') if self.peek_at(1) != Some('=') => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, PathError> {
        let left = self.parse_operand()?;
        self.skip_ws();
        let op = if self.starts_with("===") {
            self.pos += 3;
            CmpOp::Eq
        } else if self.starts_with("!==") {
            self.pos += 3;
            CmpOp::Ne
        } else if self.starts_with("==") {
            self.pos += 2;
            CmpOp::Eq
        } else if self.starts_with("!=") {
            self.pos += 2;
            CmpOp::Ne
        } else if self.starts_with("=~") {
            self.pos += 2;
            self.skip_ws();
            let re = self.parse_regex()?;
            return Ok(Expr::Matches(left, re));
        } else if self.starts_with("<=") {
            self.pos += 2;
            CmpOp::Le
        } else if self.starts_with(">=") {
            self.pos += 2;
            CmpOp::Ge
        } else if self.starts_with("<") {
            self.pos += 1;
            CmpOp::Lt
        } else if self.starts_with(">") {
            self.pos += 1;
            CmpOp::Gt
        } else {
            return Ok(Expr::Truthy(left));
        };
        let right = self.parse_operand()?;
        Ok(Expr::Compare(left, op, right))
    }

    fn parse_regex(&mut self) -> Result<Regex, PathError> {
        let pattern = match self.peek() {
            Some('/') => {
                self.pos += 1;
                let mut body = String::new();
                loop {
                    match self.peek() {
                        Some('\\') if self.peek_at(1) == Some('/') => {
                            body.push('/');
                            self.pos += 2;
                        }
                        Some('/') => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            body.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated regex")),
                    }
                }
                let mut flags = String::new();
                while let Some(c) = self
                    .peek()
                    .filter(|c| matches!(c, 'i' | 'm' | 's' | 'g' | 'u'))
                {
                    if c != 'g' && c != 'u' {
                        flags.push(c);
                    }
                    self.pos += 1;
                }
                if flags.is_empty() {
                    body
                } else {
                    format!("(?{}){}", flags, body)
                }
            }
            Some('\'') | Some('"') => self.parse_string()?,
            _ => return Err(self.error("expected a regular expression")),
        };
        Regex::new(&pattern).map_err(|e| self.error(&format!("invalid regex: {}", e)))
    }

    fn parse_steps(&mut self) -> Result<Vec<Step>, PathError> {
        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1) != Some('.') => {
                    self.pos += 1;
                    let start = self.pos;
                    while self
                        .peek()
                        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '$'))
                    {
                        self.pos += 1;
                    }
                    if start == self.pos {
                        return Err(self.error("expected a property name"));
                    }
                    steps.push(Step::Name(self.chars[start..self.pos].iter().collect()));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let step = match self.peek() {
                        Some('\'') | Some('"') => Step::Name(self.parse_string()?),
                        _ => Step::Index(
                            self.parse_int()
                                .ok_or_else(|| self.error("expected an index"))?,
                        ),
                    };
                    self.expect(']')?;
                    steps.push(step);
                }
                _ => return Ok(steps),
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, PathError> {
        self.skip_ws();
        match self.peek() {
            Some('@') => {
                self.pos += 1;
                if self.starts_with("property") {
                    self.pos += "property".len();
                    return Ok(Operand::Property);
                }
                if self.starts_with("key") {
                    self.pos += "key".len();
                    return Ok(Operand::Property);
                }
                Ok(Operand::Current(self.parse_steps()?))
            }
            Some('$') => {
                self.pos += 1;
                Ok(Operand::Root(self.parse_steps()?))
            }
            Some('\'') | Some('"') => Ok(Operand::Literal(Value::String(self.parse_string()?))),
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.pos += 1;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E')
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                if let Ok(i) = text.parse::<i64>() {
                    Ok(Operand::Literal(Value::Int(i)))
                } else {
                    text.parse::<f64>()
                        .map(|x| Operand::Literal(Value::Float(x)))
                        .map_err(|_| self.error("invalid number"))
                }
            }
            _ => {
                for (word, value) in [
                    ("true", Value::Bool(true)),
                    ("false", Value::Bool(false)),
                    ("null", Value::Null),
                ] {
                    if self.starts_with(word) {
                        self.pos += word.len();
                        return Ok(Operand::Literal(value));
                    }
                }
                Err(self.error("expected an operand"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DocumentIndex;

    const DOC: &str = r#"
openapi: 3.0.0
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - name: limit
          in: query
        - name: id
          in: path
    post:
      operationId: createPet
  /pets/{id}:
    delete:
      operationId: deletePet
components:
  schemas:
    Pet:
      type: object
      additionalProperties: true
    Closed:
      type: object
      additionalProperties: false
    Name:
      type: string
"#;

    fn paths(expr: &str) -> Vec<String> {
        let index = DocumentIndex::parse(DOC.as_bytes(), "t.yaml").unwrap();
        JsonPath::parse(expr)
            .unwrap()
            .query(index.raw())
            .into_iter()
            .map(|m| m.path)
            .collect()
    }

    #[test]
    fn test_root_and_children() {
        assert_eq!(paths("$"), vec!["$"]);
        assert_eq!(paths("$.openapi"), vec!["$.openapi"]);
        assert_eq!(paths("$.paths['/pets'].get"), vec!["$.paths['/pets'].get"]);
        assert!(paths("$.missing.deeper").is_empty());
    }

    #[test]
    fn test_wildcards_and_unions() {
        assert_eq!(
            paths("$.paths[*][get,post]"),
            vec!["$.paths['/pets'].get", "$.paths['/pets'].post"]
        );
        assert_eq!(paths("$.paths.*").len(), 2);
    }

    #[test]
    fn test_descendants() {
        let found = paths("$..operationId");
        assert_eq!(
            found,
            vec![
                "$.paths['/pets'].get.operationId",
                "$.paths['/pets'].post.operationId",
                "$.paths['/pets/{id}'].delete.operationId",
            ]
        );
    }

    #[test]
    fn test_indices_and_slices() {
        assert_eq!(
            paths("$.paths['/pets'].get.parameters[0].name"),
            vec!["$.paths['/pets'].get.parameters[0].name"]
        );
        assert_eq!(
            paths("$.paths['/pets'].get.parameters[-1]"),
            vec!["$.paths['/pets'].get.parameters[1]"]
        );
        assert_eq!(paths("$.paths['/pets'].get.parameters[0:1]").len(), 1);
    }

    #[test]
    fn test_filters() {
        assert_eq!(
            paths("$..parameters[?(@.in == 'path')]"),
            vec!["$.paths['/pets'].get.parameters[1]"]
        );
        assert_eq!(
            paths("$..[?(@.type==\"object\" && @.additionalProperties)]"),
            vec!["$.components.schemas.Pet"]
        );
        assert_eq!(
            paths("$.components.schemas[?(@property =~ /^N/)]"),
            vec!["$.components.schemas.Name"]
        );
        assert_eq!(
            paths("$.components.schemas[?(!(@.type == 'object'))]"),
            vec!["$.components.schemas.Name"]
        );
        assert_eq!(
            paths("$.components.schemas[?(@.type != 'object' || @property == 'Pet')]").len(),
            2
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(JsonPath::parse("paths").is_err());
        assert!(JsonPath::parse("$.paths[").is_err());
        assert!(JsonPath::parse("$[?(@.a =~ /[/)]").is_err());
        let err = JsonPath::parse("$.a[?(@.b ==)]").unwrap_err();
        assert_eq!(err.path, "$.a[?(@.b ==)]");
    }

    #[test]
    fn test_child_path_quoting() {
        assert_eq!(child_path("$", "info"), "$.info");
        assert_eq!(child_path("$", "/pets"), "$['/pets']");
        assert_eq!(child_path("$", "$ref"), "$['$ref']");
        assert_eq!(child_path("$", "x-logo"), "$['x-logo']");
        assert_eq!(child_path("$", "200"), "$['200']");
    }
}
