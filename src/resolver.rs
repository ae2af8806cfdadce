//! Reference resolution
//!
//! References are not copied. The resolver builds an overlay mapping each
//! `$ref` mapping to the node it points at, and [`Tree`] follows that overlay
//! while walking. References that close a cycle are left out of the overlay,
//! so the resolved view stays acyclic and the `$ref` node remains visible as
//! the sentinel of the loop.

use crate::index::rolodex::{self, split_reference};
use crate::index::{DocumentIndex, NodeId, Reference, Tree};
use crate::logging::{self, Logger};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Shape of a reference cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircularKind {
    Generic,
    /// Every hop of the loop goes through `items`
    Array,
    /// Every hop goes through `oneOf`, `anyOf` or `allOf`
    Polymorphic,
}

impl fmt::Display for CircularKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircularKind::Generic => write!(f, "generic"),
            CircularKind::Array => write!(f, "array"),
            CircularKind::Polymorphic => write!(f, "polymorphic"),
        }
    }
}

/// A detected reference cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircularReference {
    pub kind: CircularKind,
    /// Definition names from the loop point back to itself
    pub journey: Vec<String>,
    /// Definition the loop returns to
    pub loop_point: String,
    /// Position of the first occurrence of the loop point in `journey`
    pub loop_index: usize,
    /// Location of the reference closing the loop
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MissingTarget,
    UnreachableFile,
    RemoteNotAllowed,
}

/// Non-fatal reference problem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolverWarning {
    pub kind: WarningKind,
    pub reference: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ResolverWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Leave array cycles out of the reported list
    pub ignore_array: bool,
    /// Leave polymorphic cycles out of the reported list
    pub ignore_polymorphic: bool,
    /// Follow references found below `x-` keys
    pub include_extensions: bool,
    /// Materialize the reference graph
    pub build_graph: bool,
}

/// One reference edge in the cross-file graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub from_file: String,
    pub from_path: String,
    pub reference: String,
    /// Definition key, `location#pointer`
    pub to: String,
    pub circular: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceGraph {
    pub edges: Vec<GraphEdge>,
}

impl ReferenceGraph {
    /// Edges pointing at a definition key
    pub fn referrers(&self, to: &str) -> Vec<&GraphEdge> {
        self.edges.iter().filter(|e| e.to == to).collect()
    }
}

/// Output of a resolver pass
#[derive(Debug, Clone, Default)]
pub struct ResolvedView {
    overlay: HashMap<NodeId, NodeId>,
    circular_sites: HashSet<NodeId>,
    ignore_array: bool,
    ignore_polymorphic: bool,
    /// Every cycle found, before suppression
    pub circular: Vec<CircularReference>,
    pub warnings: Vec<ResolverWarning>,
    pub graph: Option<ReferenceGraph>,
}

impl ResolvedView {
    pub fn tree<'a>(&'a self, index: &'a DocumentIndex) -> Tree<'a> {
        index.resolved(&self.overlay)
    }

    pub fn overlay(&self) -> &HashMap<NodeId, NodeId> {
        &self.overlay
    }

    /// Whether a `$ref` mapping was left unresolved because it closes a loop
    pub fn is_circular_site(&self, id: NodeId) -> bool {
        self.circular_sites.contains(&id)
    }

    /// Cycles left after the array/polymorphic suppression options
    pub fn reportable(&self) -> Vec<CircularReference> {
        self.circular
            .iter()
            .filter(|c| match c.kind {
                CircularKind::Array => !self.ignore_array,
                CircularKind::Polymorphic => !self.ignore_polymorphic,
                CircularKind::Generic => true,
            })
            .cloned()
            .collect()
    }
}

struct Definition {
    key: String,
    name: String,
    target: NodeId,
    file: usize,
    line: usize,
    column: usize,
}

struct Edge {
    site: NodeId,
    to: usize,
    /// Keys walked from the definition root to the reference
    via: Vec<String>,
    line: usize,
    column: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

pub struct Resolver<'a> {
    index: &'a DocumentIndex,
    options: ResolverOptions,
    logger: &'a Logger,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a DocumentIndex, logger: &'a Logger) -> Self {
        Self {
            index,
            options: ResolverOptions::default(),
            logger,
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolve(&self) -> ResolvedView {
        let refs = self.index.references(self.options.include_extensions);
        let mut warnings = Vec::new();
        let mut defs: Vec<Definition> = Vec::new();
        let mut def_by_key: HashMap<String, usize> = HashMap::new();
        let mut ref_def: Vec<Option<usize>> = Vec::with_capacity(refs.len());

        for reference in &refs {
            match rolodex::locate(self.index, reference) {
                Ok((key, target)) => {
                    let def = match def_by_key.get(&key) {
                        Some(&d) => d,
                        None => {
                            let node = self.index.raw().node(target);
                            defs.push(Definition {
                                name: definition_name(&key),
                                key: key.clone(),
                                target,
                                file: node.file(),
                                line: node.line(),
                                column: node.column(),
                            });
                            def_by_key.insert(key, defs.len() - 1);
                            defs.len() - 1
                        }
                    };
                    ref_def.push(Some(def));
                }
                Err(message) => {
                    warnings.push(self.warning(reference, message));
                    ref_def.push(None);
                }
            }
        }

        let site_ref: HashMap<NodeId, usize> =
            refs.iter().enumerate().map(|(i, r)| (r.site, i)).collect();
        let edges: Vec<Vec<Edge>> = defs
            .iter()
            .map(|def| self.edges_from(def.target, &site_ref, &ref_def))
            .collect();

        let (circular_sites, circular) = find_cycles(&defs, &edges);
        for cycle in &circular {
            self.logger.info(
                logging::RESOLVER,
                format_args!(
                    "circular reference ({}) detected: {}",
                    cycle.kind,
                    cycle.journey.join(" -> ")
                ),
            );
        }

        let mut overlay = HashMap::new();
        for (i, reference) in refs.iter().enumerate() {
            if let Some(def) = ref_def[i] {
                if !circular_sites.contains(&reference.site) {
                    overlay.insert(reference.site, defs[def].target);
                }
            }
        }

        let graph = self.options.build_graph.then(|| ReferenceGraph {
            edges: refs
                .iter()
                .enumerate()
                .filter_map(|(i, r)| {
                    let def = &defs[ref_def[i]?];
                    Some(GraphEdge {
                        from_file: self.location(r.file),
                        from_path: r.path.clone(),
                        reference: r.target.clone(),
                        to: def.key.clone(),
                        circular: circular_sites.contains(&r.site),
                    })
                })
                .collect(),
        });

        ResolvedView {
            overlay,
            circular_sites,
            ignore_array: self.options.ignore_array,
            ignore_polymorphic: self.options.ignore_polymorphic,
            circular,
            warnings,
            graph,
        }
    }

    /// References reachable inside a definition without passing another reference
    fn edges_from(
        &self,
        root: NodeId,
        site_ref: &HashMap<NodeId, usize>,
        ref_def: &[Option<usize>],
    ) -> Vec<Edge> {
        let tree = self.index.raw();
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, Vec::<String>::new())];
        while let Some((id, via)) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(&r) = site_ref.get(&id) {
                if let Some(to) = ref_def[r] {
                    let node = tree.node(id);
                    edges.push(Edge {
                        site: id,
                        to,
                        via,
                        line: node.line(),
                        column: node.column(),
                    });
                }
                continue;
            }
            let children = tree.node(id).children();
            for (i, (key, child)) in children.into_iter().enumerate().rev() {
                let mut next = via.clone();
                next.push(key.unwrap_or_else(|| i.to_string()));
                stack.push((child.id(), next));
            }
        }
        edges
    }

    fn warning(&self, reference: &Reference, message: String) -> ResolverWarning {
        let (file_part, _) = split_reference(&reference.target);
        let kind = if !file_part.is_empty() && message.starts_with("referenced file") {
            WarningKind::UnreachableFile
        } else {
            WarningKind::MissingTarget
        };
        self.logger.warn(
            logging::RESOLVER,
            format_args!("{}:{}: {}", reference.line, reference.column, message),
        );
        ResolverWarning {
            kind,
            reference: reference.target.clone(),
            file: self.location(reference.file),
            line: reference.line,
            column: reference.column,
            message,
        }
    }

    fn location(&self, file: usize) -> String {
        self.index
            .file(file)
            .map(|f| f.location.clone())
            .unwrap_or_default()
    }
}

/// Edge visits the cycle search may spend before it stops enumerating
const MAX_CYCLE_STEPS: usize = 100_000;

/// Definitions sorted by where they appear
fn document_order(defs: &[Definition]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..defs.len()).collect();
    order.sort_by_key(|&d| (defs[d].file, defs[d].line, defs[d].column));
    order
}

/// Reference sites whose removal leaves the graph acyclic: the back edges
/// of a depth-first search in document order
fn back_edges(order: &[usize], edges: &[Vec<Edge>]) -> HashSet<NodeId> {
    let mut color = vec![Color::White; edges.len()];
    let mut sites = HashSet::new();

    for &start in order {
        if color[start] != Color::White {
            continue;
        }
        color[start] = Color::Gray;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(top) = stack.last_mut() {
            let (def, edge) = *top;
            if edge >= edges[def].len() {
                color[def] = Color::Black;
                stack.pop();
                continue;
            }
            top.1 += 1;
            let current = &edges[def][edge];
            match color[current.to] {
                Color::White => {
                    color[current.to] = Color::Gray;
                    stack.push((current.to, 0));
                }
                Color::Gray => {
                    sites.insert(current.site);
                }
                Color::Black => {}
            }
        }
    }
    sites
}

/// Every elementary cycle, reported once from its first definition in
/// document order.
///
/// Each start walks only definitions that come after it, so a loop is found
/// exactly when the walk returns to the start. The closing reference of every
/// reported loop is marked circular along with the back edges.
fn find_cycles(
    defs: &[Definition],
    edges: &[Vec<Edge>],
) -> (HashSet<NodeId>, Vec<CircularReference>) {
    let order = document_order(defs);
    let mut rank = vec![0; defs.len()];
    for (position, &def) in order.iter().enumerate() {
        rank[def] = position;
    }

    let mut sites = back_edges(&order, edges);
    let mut cycles = Vec::new();
    let mut reported: HashSet<Vec<usize>> = HashSet::new();
    let mut budget = MAX_CYCLE_STEPS;

    for &start in &order {
        let mut journey = vec![start];
        let mut on_journey = vec![false; defs.len()];
        on_journey[start] = true;
        // next edge to try for each journey entry
        let mut cursor = vec![0];
        // edge taken from journey[i] to journey[i + 1]
        let mut taken: Vec<&Edge> = Vec::new();

        while let Some(&def) = journey.last() {
            let depth = journey.len() - 1;
            let next = cursor[depth];
            if next >= edges[def].len() || budget == 0 {
                on_journey[def] = false;
                journey.pop();
                cursor.pop();
                taken.pop();
                continue;
            }
            cursor[depth] += 1;
            budget -= 1;

            let edge = &edges[def][next];
            if edge.to == start {
                sites.insert(edge.site);
                if !reported.insert(journey.clone()) {
                    continue;
                }
                let hops: Vec<&[String]> = taken
                    .iter()
                    .map(|e| e.via.as_slice())
                    .chain(std::iter::once(edge.via.as_slice()))
                    .collect();
                let mut names: Vec<String> =
                    journey.iter().map(|&d| defs[d].name.clone()).collect();
                names.push(defs[start].name.clone());

                cycles.push(CircularReference {
                    kind: classify(&hops),
                    journey: names,
                    loop_point: defs[start].name.clone(),
                    loop_index: 0,
                    line: edge.line,
                    column: edge.column,
                });
            } else if rank[edge.to] > rank[start] && !on_journey[edge.to] {
                on_journey[edge.to] = true;
                journey.push(edge.to);
                cursor.push(0);
                taken.push(edge);
            }
        }
    }
    (sites, cycles)
}

fn classify(hops: &[&[String]]) -> CircularKind {
    let through = |keys: &[&str]| {
        !hops.is_empty()
            && hops
                .iter()
                .all(|via| via.iter().any(|k| keys.contains(&k.as_str())))
    };
    if through(&["items"]) {
        CircularKind::Array
    } else if through(&["oneOf", "anyOf", "allOf"]) {
        CircularKind::Polymorphic
    } else {
        CircularKind::Generic
    }
}

/// Last pointer segment, or the file name for whole-document references
fn definition_name(key: &str) -> String {
    let (location, pointer) = split_reference(key);
    match pointer.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => crate::index::decode_pointer_segment(segment),
        _ => location
            .rsplit('/')
            .next()
            .unwrap_or(location)
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolve(source: &str, options: ResolverOptions) -> (DocumentIndex, ResolvedView) {
        let index = DocumentIndex::parse(source.as_bytes(), "api.yaml").unwrap();
        let logger = Logger::silent();
        let view = Resolver::new(&index, &logger).with_options(options).resolve();
        (index, view)
    }

    const GENERIC: &str = r#"openapi: 3.0.0
components:
  schemas:
    A:
      type: object
      properties:
        b:
          $ref: '#/components/schemas/B'
    B:
      type: object
      properties:
        a:
          $ref: '#/components/schemas/A'
"#;

    #[test]
    fn test_generic_cycle() {
        let (_, view) = resolve(GENERIC, ResolverOptions::default());
        assert_eq!(view.circular.len(), 1);
        let cycle = &view.circular[0];
        assert_eq!(cycle.kind, CircularKind::Generic);
        assert_eq!(cycle.journey, vec!["A", "B", "A"]);
        assert_eq!(cycle.loop_point, "A");
        assert_eq!(cycle.loop_index, 0);
        assert_eq!(cycle.line, 13);
        assert_eq!(view.reportable().len(), 1);
    }

    #[test]
    fn test_resolved_view_is_acyclic() {
        let (index, view) = resolve(GENERIC, ResolverOptions::default());
        let tree = view.tree(&index);
        let a = tree
            .root()
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.get("A"))
            .unwrap();
        // A.b resolves into B, whose back reference stays as the sentinel
        let b = a.get("properties").unwrap().get("b").unwrap();
        assert_eq!(b.get("type").and_then(|t| t.as_str()), Some("object"));
        let back = b.get("properties").unwrap().get("a").unwrap();
        assert_eq!(back.ref_target(), Some("#/components/schemas/A"));
        assert!(view.is_circular_site(back.id()));
    }

    #[test]
    fn test_array_cycle_suppressed() {
        let source = r#"components:
  schemas:
    Node:
      type: object
      properties:
        children:
          type: array
          items:
            $ref: '#/components/schemas/Node'
"#;
        let (_, view) = resolve(source, ResolverOptions::default());
        assert_eq!(view.circular.len(), 1);
        assert_eq!(view.circular[0].kind, CircularKind::Array);
        assert_eq!(view.circular[0].journey, vec!["Node", "Node"]);

        let options = ResolverOptions {
            ignore_array: true,
            ..Default::default()
        };
        let (_, view) = resolve(source, options);
        assert!(view.reportable().is_empty());
        assert_eq!(view.circular.len(), 1);
    }

    #[test]
    fn test_polymorphic_cycle() {
        let source = r#"components:
  schemas:
    Pet:
      oneOf:
        - $ref: '#/components/schemas/Cat'
    Cat:
      allOf:
        - $ref: '#/components/schemas/Pet'
"#;
        let options = ResolverOptions {
            ignore_polymorphic: true,
            ..Default::default()
        };
        let (_, view) = resolve(source, options);
        assert_eq!(view.circular[0].kind, CircularKind::Polymorphic);
        assert_eq!(view.circular[0].journey, vec!["Pet", "Cat", "Pet"]);
        assert!(view.reportable().is_empty());
    }

    #[test]
    fn test_cycles_through_finished_definitions() {
        let source = r#"components:
  schemas:
    A:
      properties:
        b:
          $ref: '#/components/schemas/B'
        c:
          $ref: '#/components/schemas/C'
    B:
      properties:
        c:
          $ref: '#/components/schemas/C'
    C:
      properties:
        a:
          $ref: '#/components/schemas/A'
"#;
        let (index, view) = resolve(source, ResolverOptions::default());
        let journeys: Vec<Vec<String>> = view.circular.iter().map(|c| c.journey.clone()).collect();
        assert_eq!(
            journeys,
            vec![vec!["A", "B", "C", "A"], vec!["A", "C", "A"]]
        );
        for cycle in &view.circular {
            assert_eq!(cycle.journey.first(), cycle.journey.last());
            assert_eq!(cycle.loop_index, 0);
            assert_eq!(cycle.line, 16);
        }

        // C's way back to A is the sentinel on both loops
        let tree = view.tree(&index);
        let back = tree
            .root()
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.get("C"))
            .and_then(|c| c.get("properties"))
            .and_then(|p| p.get("a"))
            .unwrap();
        assert!(view.is_circular_site(back.id()));
    }

    #[test]
    fn test_self_reference() {
        let source = r#"components:
  schemas:
    Tree:
      properties:
        parent:
          $ref: '#/components/schemas/Tree'
"#;
        let (_, view) = resolve(source, ResolverOptions::default());
        assert_eq!(view.circular.len(), 1);
        assert_eq!(view.circular[0].journey, vec!["Tree", "Tree"]);
    }

    #[test]
    fn test_plain_reference_resolves() {
        let source = r#"paths:
  /pets:
    get:
      responses:
        '200':
          $ref: '#/components/responses/Ok'
components:
  responses:
    Ok:
      description: fine
"#;
        let (index, view) = resolve(source, ResolverOptions::default());
        assert!(view.circular.is_empty());
        let tree = view.tree(&index);
        let response = tree
            .root()
            .get("paths")
            .and_then(|p| p.get("/pets"))
            .and_then(|p| p.get("get"))
            .and_then(|g| g.get("responses"))
            .and_then(|r| r.get("200"))
            .unwrap();
        assert_eq!(
            response.get("description").and_then(|d| d.as_str()),
            Some("fine")
        );
        // positions come from the target
        assert_eq!(response.line(), 10);
    }

    #[test]
    fn test_missing_target_warns() {
        let source = "a:\n  $ref: '#/components/schemas/Nope'\n";
        let (index, view) = resolve(source, ResolverOptions::default());
        assert_eq!(view.warnings.len(), 1);
        assert_eq!(view.warnings[0].kind, WarningKind::MissingTarget);
        assert_eq!(view.warnings[0].line, 2);
        // the reference node stays in place
        let a = view.tree(&index).root().get("a").unwrap();
        assert!(a.ref_target().is_some());
    }

    #[test]
    fn test_extension_references_skipped_by_default() {
        let source = "x-internal:\n  $ref: '#/missing'\n";
        let (_, view) = resolve(source, ResolverOptions::default());
        assert!(view.warnings.is_empty());

        let options = ResolverOptions {
            include_extensions: true,
            ..Default::default()
        };
        let (_, view) = resolve(source, options);
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn test_reference_graph() {
        let options = ResolverOptions {
            build_graph: true,
            ..Default::default()
        };
        let (_, view) = resolve(GENERIC, options);
        let graph = view.graph.unwrap();
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.referrers("api.yaml#/components/schemas/A").len(), 1);
        assert_eq!(graph.edges.iter().filter(|e| e.circular).count(), 1);
    }

    #[test]
    fn test_definition_name() {
        assert_eq!(definition_name("api.yaml#/components/schemas/Pet"), "Pet");
        assert_eq!(definition_name("models/pet.yaml#"), "pet.yaml");
        assert_eq!(definition_name("api.yaml#/a~1b"), "a/b");
    }
}
