//! Document index
//!
//! Every YAML/JSON node of the document (and of every file reached through a
//! `$ref`) lives in one arena and is addressed by [`NodeId`]. Nodes keep their
//! source file, line and column. A [`Tree`] is a read-only view over the
//! arena, optionally overlaid with resolved references.

pub mod parser;
pub mod path;
pub mod rolodex;
pub mod spec_info;

pub use path::{JsonPath, Match, PathError};
pub use rolodex::Rolodex;
pub use spec_info::{FileType, SpecInfo, SpecType};

use crate::diagnostic::{Origin, Position, Range};
use crate::error::DocumentError;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Typed value of a scalar
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar { text: String, value: ScalarValue },
    Mapping(Vec<(NodeId, NodeId)>),
    Sequence(Vec<NodeId>),
}

/// A node with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub file: usize,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

/// A file held by the index
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Name used in origins
    pub name: String,
    /// Absolute path or URL used to resolve relative references
    pub location: String,
    pub root: NodeId,
    pub file_type: FileType,
}

/// A `$ref` site
#[derive(Debug, Clone)]
pub struct Reference {
    /// The mapping holding the `$ref` key
    pub site: NodeId,
    /// Raw reference text
    pub target: String,
    /// File holding the site
    pub file: usize,
    /// JSONPath of the site
    pub path: String,
    pub line: usize,
    pub column: usize,
}

/// Node arena for a document and its referenced files
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    nodes: Vec<Node>,
    files: Vec<SourceFile>,
}

impl DocumentIndex {
    /// Parse the root document
    pub fn parse(bytes: &[u8], file_name: &str) -> Result<Self, DocumentError> {
        let mut index = Self::default();
        index.add_file(bytes, file_name, file_name)?;
        Ok(index)
    }

    /// Build an index holding a single in-memory value
    pub fn from_value(value: &Value) -> Self {
        let mut index = Self::default();
        let root = index.push_value(value);
        index.files.push(SourceFile {
            name: String::new(),
            location: String::new(),
            root,
            file_type: FileType::Json,
        });
        index
    }

    /// Parse another file into the arena, returning its file id
    pub fn add_file(
        &mut self,
        bytes: &[u8],
        name: &str,
        location: &str,
    ) -> Result<usize, DocumentError> {
        let source = String::from_utf8_lossy(bytes);
        let file = self.files.len();
        let root = parser::parse_into(&mut self.nodes, &source, file)?;
        self.files.push(SourceFile {
            name: name.to_string(),
            location: location.to_string(),
            root,
            file_type: FileType::detect(&source),
        });
        Ok(file)
    }

    /// Set the location relative references of the root document resolve against
    pub fn set_root_location(&mut self, location: &str) {
        if let Some(root) = self.files.first_mut() {
            root.location = location.to_string();
        }
    }

    pub fn root(&self) -> NodeId {
        self.files.first().map(|f| f.root).unwrap_or(NodeId(0))
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, file: usize) -> Option<&SourceFile> {
        self.files.get(file)
    }

    pub fn find_file(&self, location: &str) -> Option<usize> {
        self.files.iter().position(|f| f.location == location)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The raw view
    pub fn raw(&self) -> Tree<'_> {
        Tree {
            index: self,
            overlay: None,
        }
    }

    /// A view that follows the given reference overlay
    pub fn resolved<'a>(&'a self, overlay: &'a HashMap<NodeId, NodeId>) -> Tree<'a> {
        Tree {
            index: self,
            overlay: Some(overlay),
        }
    }

    /// Collect every `$ref` site in every file
    pub fn references(&self, include_extensions: bool) -> Vec<Reference> {
        let mut refs = Vec::new();
        let tree = self.raw();
        for (file, source) in self.files.iter().enumerate() {
            let mut stack = vec![(source.root, "$".to_string(), false)];
            let mut seen = std::collections::HashSet::new();
            while let Some((id, path, in_extension)) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                let node = tree.node(id);
                if node.is_mapping() {
                    if let Some(target) = node.ref_target() {
                        if include_extensions || !in_extension {
                            refs.push(Reference {
                                site: id,
                                target: target.to_string(),
                                file,
                                path: path.clone(),
                                line: node.line(),
                                column: node.column(),
                            });
                        }
                    }
                }
                let children = node.children();
                for (key, child) in children.into_iter().rev() {
                    let child_in_extension =
                        in_extension || key.as_deref().is_some_and(|k| k.starts_with("x-"));
                    let child_path = match &key {
                        Some(k) => path::child_path(&path, k),
                        None => path.clone(),
                    };
                    stack.push((child.id(), child_path, child_in_extension));
                }
            }
        }
        refs
    }

    /// Walk a JSON pointer (`/a/b/0`) from a file root
    pub fn resolve_pointer(&self, file: usize, pointer: &str) -> Option<NodeId> {
        let mut current = self.raw().node(self.file(file)?.root);
        for raw in pointer.split('/').skip(1) {
            let segment = decode_pointer_segment(raw);
            current = if current.is_sequence() {
                let idx: usize = segment.parse().ok()?;
                current.items().get(idx).copied()?
            } else {
                current.get(&segment)?
            };
        }
        Some(current.id())
    }

    fn push_value(&mut self, value: &Value) -> NodeId {
        let kind = match value {
            Value::Null => scalar("null", ScalarValue::Null),
            Value::Bool(b) => scalar(&b.to_string(), ScalarValue::Bool(*b)),
            Value::Int(i) => scalar(&i.to_string(), ScalarValue::Int(*i)),
            Value::Float(x) => scalar(&x.to_string(), ScalarValue::Float(*x)),
            Value::String(s) => scalar(s, ScalarValue::String),
            Value::List(items) => {
                let ids = items.iter().map(|v| self.push_value(v)).collect();
                NodeKind::Sequence(ids)
            }
            Value::Map(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    let key = self.push_value(&Value::String(k.clone()));
                    let val = self.push_value(v);
                    entries.push((key, val));
                }
                NodeKind::Mapping(entries)
            }
        };
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            file: 0,
            line: 1,
            column: 1,
            end_line: 1,
            end_column: 1,
        });
        id
    }
}

fn scalar(text: &str, value: ScalarValue) -> NodeKind {
    NodeKind::Scalar {
        text: text.to_string(),
        value,
    }
}

/// Decode `~1`, `~0` and percent escapes in a JSON pointer segment
pub fn decode_pointer_segment(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                decoded.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded)
        .replace("~1", "/")
        .replace("~0", "~")
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// A read-only view over the arena
#[derive(Clone, Copy)]
pub struct Tree<'a> {
    index: &'a DocumentIndex,
    overlay: Option<&'a HashMap<NodeId, NodeId>>,
}

impl<'a> Tree<'a> {
    pub fn index(&self) -> &'a DocumentIndex {
        self.index
    }

    pub fn is_resolved(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn root(&self) -> NodeRef<'a> {
        self.node(self.index.root())
    }

    /// Node by id, following the reference overlay
    pub fn node(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef {
            tree: *self,
            id: self.deref(id),
        }
    }

    fn deref(&self, mut id: NodeId) -> NodeId {
        if let Some(overlay) = self.overlay {
            for _ in 0..64 {
                match overlay.get(&id) {
                    Some(target) => id = *target,
                    None => break,
                }
            }
        }
        id
    }
}

impl std::fmt::Debug for Tree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A node in a view
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: Tree<'a>,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> Tree<'a> {
        self.tree
    }

    pub fn raw(&self) -> &'a Node {
        self.tree.index.node(self.id)
    }

    pub fn line(&self) -> usize {
        self.raw().line
    }

    pub fn column(&self) -> usize {
        self.raw().column
    }

    pub fn file(&self) -> usize {
        self.raw().file
    }

    pub fn range(&self) -> Range {
        let node = self.raw();
        Range::new(
            Position::new(node.line, node.column),
            Position::new(node.end_line, node.end_column),
        )
    }

    /// Origin for nodes that live outside the root document
    pub fn origin(&self) -> Option<Origin> {
        let node = self.raw();
        if node.file == 0 {
            return None;
        }
        let file = self.tree.index.file(node.file)?;
        Some(Origin {
            file: file.location.clone(),
            line: node.line,
            column: node.column,
        })
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self.raw().kind, NodeKind::Mapping(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.raw().kind, NodeKind::Sequence(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.raw().kind, NodeKind::Scalar { .. })
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self.raw().kind,
            NodeKind::Scalar {
                value: ScalarValue::Null,
                ..
            }
        )
    }

    /// Scalar source text, whatever its type
    pub fn text(&self) -> Option<&'a str> {
        match &self.raw().kind {
            NodeKind::Scalar { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Text of string scalars only
    pub fn as_str(&self) -> Option<&'a str> {
        match &self.raw().kind {
            NodeKind::Scalar {
                text,
                value: ScalarValue::String,
            } => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.raw().kind {
            NodeKind::Scalar {
                value: ScalarValue::Bool(b),
                ..
            } => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match &self.raw().kind {
            NodeKind::Scalar {
                value: ScalarValue::Int(i),
                ..
            } => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.raw().kind {
            NodeKind::Scalar {
                value: ScalarValue::Int(i),
                ..
            } => Some(*i as f64),
            NodeKind::Scalar {
                value: ScalarValue::Float(x),
                ..
            } => Some(*x),
            _ => None,
        }
    }

    /// Number of entries or items; zero for scalars
    pub fn len(&self) -> usize {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries.len(),
            NodeKind::Sequence(items) => items.len(),
            NodeKind::Scalar { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of a mapping key
    pub fn get(&self, key: &str) -> Option<NodeRef<'a>> {
        self.entry(key).map(|(_, v)| v)
    }

    /// Key node and value of a mapping key
    pub fn entry(&self, key: &str) -> Option<(NodeRef<'a>, NodeRef<'a>)> {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries.iter().find_map(|(k, v)| {
                let key_node = self.tree.node(*k);
                (key_node.text() == Some(key)).then(|| (key_node, self.tree.node(*v)))
            }),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Mapping entries in document order
    pub fn entries(&self) -> Vec<(NodeRef<'a>, NodeRef<'a>)> {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries
                .iter()
                .map(|(k, v)| (self.tree.node(*k), self.tree.node(*v)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Mapping keys in document order
    pub fn keys(&self) -> Vec<&'a str> {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries
                .iter()
                .filter_map(|(k, _)| self.tree.index.node(*k).kind.text())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Sequence items
    pub fn items(&self) -> Vec<NodeRef<'a>> {
        match &self.raw().kind {
            NodeKind::Sequence(items) => items.iter().map(|i| self.tree.node(*i)).collect(),
            _ => Vec::new(),
        }
    }

    /// Children with their key (mapping) or none (sequence)
    pub fn children(&self) -> Vec<(Option<String>, NodeRef<'a>)> {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries
                .iter()
                .map(|(k, v)| {
                    let key = self.tree.index.node(*k).kind.text().unwrap_or("").to_string();
                    (Some(key), self.tree.node(*v))
                })
                .collect(),
            NodeKind::Sequence(items) => items.iter().map(|i| (None, self.tree.node(*i))).collect(),
            NodeKind::Scalar { .. } => Vec::new(),
        }
    }

    /// `$ref` string of a reference mapping
    pub fn ref_target(&self) -> Option<&'a str> {
        match &self.raw().kind {
            NodeKind::Mapping(entries) => entries.iter().find_map(|(k, v)| {
                let key = self.tree.index.node(*k);
                if key.kind.text() == Some("$ref") {
                    self.tree.index.node(*v).kind.string()
                } else {
                    None
                }
            }),
            _ => None,
        }
    }

    /// Truthiness: missing, null, false, 0, "" and "false" are falsy
    pub fn is_truthy(&self) -> bool {
        match &self.raw().kind {
            NodeKind::Scalar { text, value } => match value {
                ScalarValue::Null => false,
                ScalarValue::Bool(b) => *b,
                ScalarValue::Int(i) => *i != 0,
                ScalarValue::Float(x) => *x != 0.0,
                ScalarValue::String => !text.is_empty() && text != "false",
            },
            _ => true,
        }
    }

    /// Convert the subtree into a [`Value`]
    pub fn to_value(&self) -> Value {
        self.to_value_depth(0)
    }

    fn to_value_depth(&self, depth: usize) -> Value {
        if depth > 128 {
            return Value::Null;
        }
        match &self.raw().kind {
            NodeKind::Scalar { text, value } => match value {
                ScalarValue::Null => Value::Null,
                ScalarValue::Bool(b) => Value::Bool(*b),
                ScalarValue::Int(i) => Value::Int(*i),
                ScalarValue::Float(x) => Value::Float(*x),
                ScalarValue::String => Value::String(text.clone()),
            },
            NodeKind::Sequence(_) => Value::List(
                self.items()
                    .iter()
                    .map(|i| i.to_value_depth(depth + 1))
                    .collect(),
            ),
            NodeKind::Mapping(_) => {
                let mut map = BTreeMap::new();
                for (k, v) in self.entries() {
                    map.insert(
                        k.text().unwrap_or("").to_string(),
                        v.to_value_depth(depth + 1),
                    );
                }
                Value::Map(map)
            }
        }
    }
}

impl NodeKind {
    fn text(&self) -> Option<&str> {
        match self {
            NodeKind::Scalar { text, .. } => Some(text),
            _ => None,
        }
    }

    fn string(&self) -> Option<&str> {
        match self {
            NodeKind::Scalar {
                text,
                value: ScalarValue::String,
            } => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("line", &self.line())
            .field("column", &self.column())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"openapi: "3.0.0"
info:
  title: Pets
  version: 1
paths:
  /pets:
    get:
      operationId: listPets
tags:
  - name: pets
  - name: admin
"#;

    #[test]
    fn test_parse_positions() {
        let index = DocumentIndex::parse(DOC.as_bytes(), "pets.yaml").unwrap();
        let root = index.raw().root();
        assert!(root.is_mapping());

        let info = root.get("info").unwrap();
        assert_eq!(info.line(), 3);
        assert_eq!(info.column(), 3);

        let op = root.get("paths").and_then(|p| p.get("/pets")).and_then(|p| p.get("get")).unwrap();
        let op_id = op.get("operationId").unwrap();
        assert_eq!(op_id.as_str(), Some("listPets"));
        assert_eq!(op_id.line(), 8);
        assert_eq!(op_id.column(), 20);
    }

    #[test]
    fn test_scalar_typing() {
        let index = DocumentIndex::parse(DOC.as_bytes(), "pets.yaml").unwrap();
        let root = index.raw().root();
        assert_eq!(root.get("openapi").unwrap().as_str(), Some("3.0.0"));
        assert_eq!(root.get("info").unwrap().get("version").unwrap().as_i64(), Some(1));
        assert_eq!(root.get("tags").unwrap().items().len(), 2);
        assert_eq!(root.keys(), vec!["openapi", "info", "paths", "tags"]);
    }

    #[test]
    fn test_to_value() {
        let index = DocumentIndex::parse(b"a: [1, true, x]\nb: {c: ~}", "v.yaml").unwrap();
        let value = index.raw().root().to_value();
        assert_eq!(
            value.get("a"),
            Some(&Value::List(vec![
                Value::Int(1),
                Value::Bool(true),
                Value::String("x".into())
            ]))
        );
        assert_eq!(value.get("b").and_then(|b| b.get("c")), Some(&Value::Null));
    }

    #[test]
    fn test_from_value_roundtrip() {
        let value: Value = serde_yaml::from_str("name: x\nlist: [1, 2]").unwrap();
        let index = DocumentIndex::from_value(&value);
        assert_eq!(index.raw().root().to_value(), value);
    }

    #[test]
    fn test_references_and_pointers() {
        let doc = r#"
components:
  schemas:
    Pet:
      type: object
    Pets:
      type: array
      items:
        $ref: '#/components/schemas/Pet'
x-internal:
  thing:
    $ref: '#/components/schemas/Pet'
"#;
        let index = DocumentIndex::parse(doc.as_bytes(), "refs.yaml").unwrap();
        let refs = index.references(false);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "#/components/schemas/Pet");
        assert_eq!(refs[0].path, "$.components.schemas.Pets.items");
        assert_eq!(index.references(true).len(), 2);

        let pet = index.resolve_pointer(0, "/components/schemas/Pet").unwrap();
        assert_eq!(index.raw().node(pet).get("type").unwrap().as_str(), Some("object"));
        assert!(index.resolve_pointer(0, "/components/schemas/Missing").is_none());
    }

    #[test]
    fn test_pointer_segment_decoding() {
        assert_eq!(decode_pointer_segment("~1pets~1{id}"), "/pets/{id}");
        assert_eq!(decode_pointer_segment("a~0b"), "a~b");
        assert_eq!(decode_pointer_segment("%7Bid%7D"), "{id}");
    }

    #[test]
    fn test_truthiness() {
        let index =
            DocumentIndex::parse(b"a: false\nb: 0\nc: ''\nd: yes\ne: {}\nf: ~", "t.yaml").unwrap();
        let root = index.raw().root();
        assert!(!root.get("a").unwrap().is_truthy());
        assert!(!root.get("b").unwrap().is_truthy());
        assert!(!root.get("c").unwrap().is_truthy());
        assert!(root.get("d").unwrap().is_truthy());
        assert!(root.get("e").unwrap().is_truthy());
        assert!(!root.get("f").unwrap().is_truthy());
    }

    #[test]
    fn test_resolved_view_follows_overlay() {
        let doc = "a:\n  $ref: '#/b'\nb:\n  name: target\n";
        let index = DocumentIndex::parse(doc.as_bytes(), "o.yaml").unwrap();
        let raw = index.raw().root();
        let site = raw.get("a").unwrap().id();
        let target = raw.get("b").unwrap().id();
        let overlay: HashMap<NodeId, NodeId> = [(site, target)].into_iter().collect();

        let resolved = index.resolved(&overlay).root();
        let a = resolved.get("a").unwrap();
        assert_eq!(a.get("name").unwrap().as_str(), Some("target"));
        assert_eq!(a.line(), 4);
        assert!(raw.get("a").unwrap().ref_target().is_some());
    }
}
