//! YAML/JSON event parser feeding the node arena

use super::{Node, NodeId, NodeKind, ScalarValue};
use crate::error::DocumentError;
use std::collections::HashMap;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

enum Frame {
    Mapping { id: NodeId, anchor: usize, key: Option<NodeId> },
    Sequence { id: NodeId, anchor: usize },
}

struct Builder<'a> {
    nodes: &'a mut Vec<Node>,
    file: usize,
    stack: Vec<Frame>,
    anchors: HashMap<usize, NodeId>,
    root: Option<NodeId>,
}

/// Parse `source` into `nodes`, returning the document root
pub fn parse_into(
    nodes: &mut Vec<Node>,
    source: &str,
    file: usize,
) -> Result<NodeId, DocumentError> {
    let mut builder = Builder {
        nodes,
        file,
        stack: Vec::new(),
        anchors: HashMap::new(),
        root: None,
    };
    let mut parser = Parser::new_from_str(source);
    parser
        .load(&mut builder, false)
        .map_err(|e| DocumentError::Parse {
            message: e.to_string(),
            line: e.marker().line(),
            column: e.marker().col() + 1,
        })?;
    builder.root.ok_or(DocumentError::Empty)
}

impl Builder<'_> {
    fn push(&mut self, kind: NodeKind, mark: &Marker) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let line = mark.line().max(1);
        let column = mark.col() + 1;
        let (end_line, end_column) = match &kind {
            NodeKind::Scalar { text, .. } if !text.contains('\n') => {
                (line, column + text.chars().count())
            }
            _ => (line, column),
        };
        self.nodes.push(Node {
            kind,
            file: self.file,
            line,
            column,
            end_line,
            end_column,
        });
        id
    }

    fn attach(&mut self, id: NodeId) {
        let Some(frame) = self.stack.last_mut() else {
            if self.root.is_none() {
                self.root = Some(id);
            }
            return;
        };
        match frame {
            Frame::Sequence { id: parent, .. } => {
                if let NodeKind::Sequence(items) = &mut self.nodes[parent.index()].kind {
                    items.push(id);
                }
            }
            Frame::Mapping { id: parent, key, .. } => match key.take() {
                None => {
                    *key = Some(id);
                    let (line, column) = {
                        let first = &self.nodes[id.index()];
                        (first.line, first.column)
                    };
                    // block mappings start at the first key, not at its ':'
                    let parent = &mut self.nodes[parent.index()];
                    if matches!(&parent.kind, NodeKind::Mapping(entries) if entries.is_empty())
                        && (line, column) < (parent.line, parent.column)
                    {
                        parent.line = line;
                        parent.column = column;
                    }
                }
                Some(k) => {
                    if let NodeKind::Mapping(entries) = &mut self.nodes[parent.index()].kind {
                        entries.push((k, id));
                    }
                }
            },
        }
    }

    fn close(&mut self, mark: &Marker) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let (id, anchor) = match frame {
            Frame::Mapping { id, anchor, .. } | Frame::Sequence { id, anchor } => (id, anchor),
        };
        let node = &mut self.nodes[id.index()];
        node.end_line = mark.line().max(node.line);
        node.end_column = mark.col() + 1;
        if anchor > 0 {
            self.anchors.insert(anchor, id);
        }
        self.attach(id);
    }
}

impl MarkedEventReceiver for Builder<'_> {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        match ev {
            Event::Scalar(text, style, anchor, ..) => {
                let value = resolve_scalar(&text, style);
                let id = self.push(NodeKind::Scalar { text, value }, &mark);
                if anchor > 0 {
                    self.anchors.insert(anchor, id);
                }
                self.attach(id);
            }
            Event::SequenceStart(anchor, ..) => {
                let id = self.push(NodeKind::Sequence(Vec::new()), &mark);
                self.stack.push(Frame::Sequence { id, anchor });
            }
            Event::MappingStart(anchor, ..) => {
                let id = self.push(NodeKind::Mapping(Vec::new()), &mark);
                self.stack.push(Frame::Mapping {
                    id,
                    anchor,
                    key: None,
                });
            }
            Event::SequenceEnd | Event::MappingEnd => self.close(&mark),
            Event::Alias(anchor) => {
                // Aliases share the anchored node; an alias to an unfinished
                // container would form a cycle and becomes null instead
                let id = match self.anchors.get(&anchor) {
                    Some(id) => *id,
                    None => self.push(
                        NodeKind::Scalar {
                            text: String::new(),
                            value: ScalarValue::Null,
                        },
                        &mark,
                    ),
                };
                self.attach(id);
            }
            _ => {}
        }
    }
}

/// Resolve a plain scalar with the YAML 1.2 core schema
fn resolve_scalar(text: &str, style: TScalarStyle) -> ScalarValue {
    if style != TScalarStyle::Plain {
        return ScalarValue::String;
    }
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return ScalarValue::Null,
        "true" | "True" | "TRUE" => return ScalarValue::Bool(true),
        "false" | "False" | "FALSE" => return ScalarValue::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" => return ScalarValue::Float(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => return ScalarValue::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return ScalarValue::Float(f64::NAN),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x") {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return ScalarValue::Int(i);
        }
    }
    if let Some(oct) = text.strip_prefix("0o") {
        if let Ok(i) = i64::from_str_radix(oct, 8) {
            return ScalarValue::Int(i);
        }
    }
    let numeric = text
        .strip_prefix(['-', '+'])
        .unwrap_or(text)
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'));
    if numeric && text.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i64>() {
            return ScalarValue::Int(i);
        }
        // Versions such as 1.2.3 are strings
        if text.matches('.').count() <= 1 {
            if let Ok(x) = text.parse::<f64>() {
                return ScalarValue::Float(x);
            }
        }
    }
    ScalarValue::String
}
