//! Canonical heap graph model.
//!
//! A [`HeapGraph`] is the format-independent node/edge representation of a
//! device heap snapshot. It is built once (by `memprof`'s graph builder),
//! checked for integrity on construction, and then only read: every
//! serializer borrows the same graph, so all output formats agree on node
//! count, edge count and root membership.
//!
//! # Example
//!
//! ```
//! use heap_graph::{EdgeKind, EdgeLabel, HeapEdge, HeapGraph, HeapNode, NodeKind};
//!
//! let nodes = vec![
//!     HeapNode::new(0, NodeKind::Object, "Object", 32),
//!     HeapNode::new(1, NodeKind::String, "hello", 16),
//! ];
//! let edges = vec![HeapEdge::new(0, 1, EdgeKind::Property, EdgeLabel::name("greeting"))];
//!
//! let graph = HeapGraph::new(nodes, edges, vec![0]).unwrap();
//! assert_eq!(graph.node_count(), 2);
//! assert!(graph.node(0).unwrap().is_root);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors raised when a graph's nodes, edges and roots do not fit together.
///
/// Well-formed input never produces these; they point at a decoder or
/// builder defect and are surfaced rather than silently dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIntegrityError {
    #[error("duplicate node id {0}")]
    DuplicateNode(u64),

    #[error("edge {from} -> {to} references a node that does not exist")]
    DanglingEdge { from: u64, to: u64 },

    #[error("root {0} references a node that does not exist")]
    UnknownRoot(u64),
}

/// Result type for graph construction.
pub type Result<T> = std::result::Result<T, GraphIntegrityError>;

// ============================================================================
// Node and edge types
// ============================================================================

/// Classification of a heap node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Object,
    Closure,
    String,
    Array,
    Native,
    Hidden,
}

impl NodeKind {
    /// Lowercase name used by the output formats.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Object => "object",
            NodeKind::Closure => "closure",
            NodeKind::String => "string",
            NodeKind::Array => "array",
            NodeKind::Native => "native",
            NodeKind::Hidden => "hidden",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a reference between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Property,
    Element,
    Context,
    Internal,
}

impl EdgeKind {
    /// Lowercase name used by the output formats.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Property => "property",
            EdgeKind::Element => "element",
            EdgeKind::Context => "context",
            EdgeKind::Internal => "internal",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label carried by an edge: a property name or an element index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeLabel {
    Name(String),
    Index(u32),
}

impl EdgeLabel {
    pub fn name(name: impl Into<String>) -> Self {
        EdgeLabel::Name(name.into())
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::Name(name) => f.write_str(name),
            EdgeLabel::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Original source position of a function, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single heap object or value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapNode {
    /// Unique within one graph.
    pub id: u64,
    pub kind: NodeKind,
    /// Resolved symbol name, constructor name, or string contents.
    pub name: String,
    /// Bytes owned directly by this node.
    pub self_size: u64,
    /// Set by [`HeapGraph::new`] from the root sequence.
    pub is_root: bool,
    /// Where a closure was defined, when the source map knew.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl HeapNode {
    /// Create a non-root node without a source location.
    pub fn new(id: u64, kind: NodeKind, name: impl Into<String>, self_size: u64) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            self_size,
            is_root: false,
            location: None,
        }
    }
}

/// A directed reference between two nodes, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapEdge {
    pub from: u64,
    pub to: u64,
    pub kind: EdgeKind,
    pub label: EdgeLabel,
}

impl HeapEdge {
    pub fn new(from: u64, to: u64, kind: EdgeKind, label: EdgeLabel) -> Self {
        Self {
            from,
            to,
            kind,
            label,
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

/// An immutable heap graph with a distinguished, ordered root set.
///
/// All fields are private; once [`HeapGraph::new`] returns, the graph can
/// only be read. It is `Send + Sync`, so several serializers may work from
/// one shared reference at the same time.
#[derive(Debug, Clone)]
pub struct HeapGraph {
    nodes: Vec<HeapNode>,
    edges: Vec<HeapEdge>,
    roots: Vec<u64>,
    /// Node id -> position in `nodes`.
    index: HashMap<u64, usize>,
    /// Node position -> positions in `edges` of its outgoing edges.
    outgoing: Vec<Vec<usize>>,
}

impl HeapGraph {
    /// Assemble a graph, checking that every id it mentions exists.
    ///
    /// The root sequence is authoritative: it is deduplicated (first
    /// occurrence wins) and `is_root` is set on exactly those nodes,
    /// whatever the incoming nodes carried.
    pub fn new(mut nodes: Vec<HeapNode>, edges: Vec<HeapEdge>, roots: Vec<u64>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if index.insert(node.id, idx).is_some() {
                return Err(GraphIntegrityError::DuplicateNode(node.id));
            }
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        for (edge_idx, edge) in edges.iter().enumerate() {
            let (Some(&from_idx), true) = (index.get(&edge.from), index.contains_key(&edge.to))
            else {
                return Err(GraphIntegrityError::DanglingEdge {
                    from: edge.from,
                    to: edge.to,
                });
            };
            outgoing[from_idx].push(edge_idx);
        }

        let mut seen = HashSet::new();
        let mut unique_roots = Vec::with_capacity(roots.len());
        for root in roots {
            if !index.contains_key(&root) {
                return Err(GraphIntegrityError::UnknownRoot(root));
            }
            if seen.insert(root) {
                unique_roots.push(root);
            }
        }

        for node in &mut nodes {
            node.is_root = seen.contains(&node.id);
        }

        Ok(Self {
            nodes,
            edges,
            roots: unique_roots,
            index,
            outgoing,
        })
    }

    /// Nodes in construction order.
    pub fn nodes(&self) -> &[HeapNode] {
        &self.nodes
    }

    /// Edges in construction order.
    pub fn edges(&self) -> &[HeapEdge] {
        &self.edges
    }

    /// Root ids in the order they were first declared.
    pub fn roots(&self) -> &[u64] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn node(&self, id: u64) -> Option<&HeapNode> {
        self.index.get(&id).map(|&idx| &self.nodes[idx])
    }

    /// Position of a node in [`HeapGraph::nodes`].
    pub fn position(&self, id: u64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Outgoing edges of a node, in construction order.
    ///
    /// Unknown ids have no edges.
    pub fn edges_from(&self, id: u64) -> impl Iterator<Item = &HeapEdge> {
        self.index
            .get(&id)
            .map(|&idx| self.outgoing[idx].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&edge_idx| &self.edges[edge_idx])
    }

    /// Largest node id, if the graph has any nodes.
    pub fn max_id(&self) -> Option<u64> {
        self.nodes.iter().map(|n| n.id).max()
    }

    /// Sum of every node's self size.
    pub fn total_self_size(&self) -> u64 {
        self.nodes.iter().map(|n| n.self_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: u64) -> HeapNode {
        HeapNode::new(id, NodeKind::Object, "Object", 24)
    }

    fn prop(from: u64, to: u64, name: &str) -> HeapEdge {
        HeapEdge::new(from, to, EdgeKind::Property, EdgeLabel::name(name))
    }

    #[test]
    fn builds_graph_with_roots() {
        let graph = HeapGraph::new(
            vec![object(0), object(1), object(2)],
            vec![prop(0, 1, "a"), prop(0, 2, "b")],
            vec![0],
        )
        .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.roots(), &[0]);
        assert!(graph.node(0).unwrap().is_root);
        assert!(!graph.node(1).unwrap().is_root);
        assert_eq!(graph.total_self_size(), 72);
    }

    #[test]
    fn dangling_edge_fails() {
        let result = HeapGraph::new(vec![object(0)], vec![prop(0, 7, "missing")], vec![]);
        assert_eq!(
            result.unwrap_err(),
            GraphIntegrityError::DanglingEdge { from: 0, to: 7 }
        );
    }

    #[test]
    fn dangling_source_fails() {
        let result = HeapGraph::new(vec![object(0)], vec![prop(3, 0, "x")], vec![]);
        assert!(matches!(
            result,
            Err(GraphIntegrityError::DanglingEdge { from: 3, to: 0 })
        ));
    }

    #[test]
    fn unknown_root_fails() {
        let result = HeapGraph::new(vec![object(0)], vec![], vec![0, 5]);
        assert_eq!(result.unwrap_err(), GraphIntegrityError::UnknownRoot(5));
    }

    #[test]
    fn duplicate_node_fails() {
        let result = HeapGraph::new(vec![object(4), object(4)], vec![], vec![]);
        assert_eq!(result.unwrap_err(), GraphIntegrityError::DuplicateNode(4));
    }

    #[test]
    fn roots_are_deduplicated_in_order() {
        let graph =
            HeapGraph::new(vec![object(0), object(1)], vec![], vec![1, 0, 1, 0]).unwrap();
        assert_eq!(graph.roots(), &[1, 0]);
    }

    #[test]
    fn root_sequence_overrides_incoming_flag() {
        let mut node = object(0);
        node.is_root = true;
        let graph = HeapGraph::new(vec![node, object(1)], vec![], vec![1]).unwrap();
        assert!(!graph.node(0).unwrap().is_root);
        assert!(graph.node(1).unwrap().is_root);
    }

    #[test]
    fn self_loop_is_allowed() {
        let graph = HeapGraph::new(vec![object(0)], vec![prop(0, 0, "self")], vec![0]).unwrap();
        let out: Vec<_> = graph.edges_from(0).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, 0);
    }

    #[test]
    fn edges_from_preserves_order() {
        let graph = HeapGraph::new(
            vec![object(0), object(1), object(2)],
            vec![prop(1, 2, "x"), prop(0, 2, "b"), prop(0, 1, "a")],
            vec![],
        )
        .unwrap();

        let labels: Vec<String> = graph.edges_from(0).map(|e| e.label.to_string()).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(graph.edges_from(42).count(), 0);
    }

    #[test]
    fn sparse_ids_are_supported() {
        let graph = HeapGraph::new(
            vec![object(10), object(3)],
            vec![prop(10, 3, "child")],
            vec![10],
        )
        .unwrap();
        assert_eq!(graph.position(3), Some(1));
        assert_eq!(graph.max_id(), Some(10));
    }

    #[test]
    fn kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&NodeKind::Closure).unwrap(), "\"closure\"");
        assert_eq!(serde_json::to_string(&EdgeKind::Internal).unwrap(), "\"internal\"");
        assert_eq!(NodeKind::Native.to_string(), "native");
    }

    #[test]
    fn labels_display() {
        assert_eq!(EdgeLabel::Index(3).to_string(), "3");
        assert_eq!(EdgeLabel::name("foo").to_string(), "foo");
        let loc = SourceLocation {
            file: "app/index.js".to_string(),
            line: 4,
            column: 2,
        };
        assert_eq!(loc.to_string(), "app/index.js:4:2");
    }
}
