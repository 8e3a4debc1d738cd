//! Project a [`HeapGraph`] into the V8 heap snapshot document format.
//!
//! The output is the `.heapsnapshot` JSON that Chrome DevTools' Memory
//! panel loads: a `snapshot.meta` section describing the field layout, flat
//! integer arrays for nodes and edges, and a deduplicated string table.
//!
//! Node 0 is a synthetic `(GC roots)` node whose element edges point at
//! every root of the graph. The remaining nodes follow in breadth-first
//! order from the roots, with unreachable nodes appended in graph order.
//! Each node's edges are stored contiguously right after the previous
//! node's, and its `edge_count` field says how many there are.
//!
//! # Example
//!
//! ```
//! use heap_graph::{HeapGraph, HeapNode, NodeKind};
//! use memprof::v8::serialize_v8;
//!
//! let graph = HeapGraph::new(vec![HeapNode::new(0, NodeKind::Object, "Object", 16)], vec![], vec![0]).unwrap();
//! let document = serialize_v8(&graph).unwrap();
//! assert!(document.starts_with(b"{\"snapshot\""));
//! ```

use heap_graph::{EdgeKind, EdgeLabel, HeapGraph, HeapNode, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use tracing::debug;

use crate::error::Result;

/// Node type names, in the order V8 declares them.
pub const NODE_TYPES: &[&str] = &[
    "hidden",
    "array",
    "string",
    "object",
    "code",
    "closure",
    "regexp",
    "number",
    "native",
    "synthetic",
    "concatenated string",
    "sliced string",
    "symbol",
    "bigint",
    "object shape",
];

/// Edge type names, in the order V8 declares them.
pub const EDGE_TYPES: &[&str] = &[
    "context", "element", "property", "internal", "hidden", "shortcut", "weak",
];

pub const NODE_FIELDS: &[&str] = &[
    "type",
    "name",
    "id",
    "self_size",
    "edge_count",
    "trace_node_id",
];

pub const EDGE_FIELDS: &[&str] = &["type", "name_or_index", "to_node"];

pub const LOCATION_FIELDS: &[&str] = &["object_index", "script_id", "line", "column"];

/// Name of the synthetic node holding the root set.
pub const ROOT_NAME: &str = "(GC roots)";

const NODE_FIELD_COUNT: u64 = 6;

// ============================================================================
// Document types
// ============================================================================

/// V8 heap snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// Snapshot metadata.
    pub snapshot: SnapshotMeta,
    /// Flat array of node fields.
    pub nodes: Vec<u64>,
    /// Flat array of edge fields.
    pub edges: Vec<u64>,
    #[serde(default)]
    pub trace_function_infos: Vec<u64>,
    #[serde(default)]
    pub trace_tree: Vec<u64>,
    #[serde(default)]
    pub samples: Vec<u64>,
    /// Flat array of closure source locations.
    #[serde(default)]
    pub locations: Vec<u64>,
    /// String table.
    pub strings: Vec<String>,
}

/// Snapshot metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Field layout metadata.
    pub meta: SnapshotFieldMeta,
    pub node_count: u64,
    pub edge_count: u64,
    #[serde(default)]
    pub trace_function_count: u64,
}

/// Describes the field layout for nodes, edges and locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFieldMeta {
    pub node_fields: Vec<String>,
    /// First element lists the node type names; the rest give field kinds.
    pub node_types: Vec<serde_json::Value>,
    pub edge_fields: Vec<String>,
    /// First element lists the edge type names; the rest give field kinds.
    pub edge_types: Vec<serde_json::Value>,
    #[serde(default)]
    pub trace_function_info_fields: Vec<String>,
    #[serde(default)]
    pub trace_node_fields: Vec<String>,
    #[serde(default)]
    pub sample_fields: Vec<String>,
    #[serde(default)]
    pub location_fields: Vec<String>,
}

impl SnapshotFieldMeta {
    fn standard() -> Self {
        let strings = |fields: &[&str]| fields.iter().map(|f| f.to_string()).collect::<Vec<_>>();
        let kinds = |kinds: &[&str]| {
            kinds
                .iter()
                .map(|k| serde_json::Value::from(*k))
                .collect::<Vec<_>>()
        };

        let mut node_types = vec![serde_json::Value::from(strings(NODE_TYPES))];
        node_types.extend(kinds(&["string", "number", "number", "number", "number"]));

        let mut edge_types = vec![serde_json::Value::from(strings(EDGE_TYPES))];
        edge_types.extend(kinds(&["string_or_number", "node"]));

        Self {
            node_fields: strings(NODE_FIELDS),
            node_types,
            edge_fields: strings(EDGE_FIELDS),
            edge_types,
            trace_function_info_fields: strings(&[
                "function_id",
                "name",
                "script_name",
                "script_id",
                "line",
                "column",
            ]),
            trace_node_fields: strings(&["id", "function_info_index", "count", "size", "children"]),
            sample_fields: strings(&["timestamp_us", "last_assigned_id"]),
            location_fields: strings(LOCATION_FIELDS),
        }
    }
}

// ============================================================================
// Serializer
// ============================================================================

/// Deduplicating string table; indices follow first use.
#[derive(Default)]
struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, u64>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> u64 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u64;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }
}

fn type_index(types: &[&str], name: &str) -> u64 {
    types.iter().position(|t| *t == name).unwrap_or(0) as u64
}

fn node_type(kind: NodeKind) -> u64 {
    type_index(NODE_TYPES, kind.as_str())
}

/// Graph positions in document order: breadth-first from the roots, then
/// whatever the roots cannot reach.
fn node_order(graph: &HeapGraph) -> Vec<usize> {
    let nodes = graph.nodes();
    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut queue = VecDeque::new();

    for &root in graph.roots() {
        if let Some(pos) = graph.position(root) {
            if !visited[pos] {
                visited[pos] = true;
                queue.push_back(pos);
            }
        }
    }

    while let Some(pos) = queue.pop_front() {
        order.push(pos);
        for edge in graph.edges_from(nodes[pos].id) {
            if let Some(target) = graph.position(edge.to) {
                if !visited[target] {
                    visited[target] = true;
                    queue.push_back(target);
                }
            }
        }
    }

    let reachable = order.len();
    order.extend((0..nodes.len()).filter(|&pos| !visited[pos]));
    debug!(
        reachable,
        unreachable = order.len() - reachable,
        "ordered nodes for heap snapshot"
    );
    order
}

/// Build the document for a graph.
pub fn to_snapshot(graph: &HeapGraph) -> HeapSnapshot {
    let order = node_order(graph);

    // Graph position -> document node index. Index 0 is the synthetic root.
    let mut doc_index = vec![0u64; graph.node_count()];
    for (i, &pos) in order.iter().enumerate() {
        doc_index[pos] = i as u64 + 1;
    }
    let to_node = |id: u64| -> u64 {
        graph
            .position(id)
            .map_or(0, |pos| doc_index[pos] * NODE_FIELD_COUNT)
    };

    let mut strings = StringTable::default();
    let mut nodes = Vec::with_capacity((graph.node_count() + 1) * NODE_FIELD_COUNT as usize);
    let mut edges = Vec::with_capacity((graph.edge_count() + graph.roots().len()) * EDGE_FIELDS.len());
    let mut locations = Vec::new();

    let root_id = graph.max_id().map_or(0, |max| max + 1);
    nodes.extend([
        type_index(NODE_TYPES, "synthetic"),
        strings.intern(ROOT_NAME),
        root_id,
        0,
        graph.roots().len() as u64,
        0,
    ]);
    for (i, &root) in graph.roots().iter().enumerate() {
        edges.extend([type_index(EDGE_TYPES, "element"), i as u64, to_node(root)]);
    }

    for &pos in &order {
        let node: &HeapNode = &graph.nodes()[pos];
        let edge_start = edges.len();

        for edge in graph.edges_from(node.id) {
            let (edge_type, name_or_index) = match (edge.kind, &edge.label) {
                (EdgeKind::Element, EdgeLabel::Index(index)) => {
                    (type_index(EDGE_TYPES, "element"), u64::from(*index))
                }
                (EdgeKind::Element, EdgeLabel::Name(name)) => {
                    (type_index(EDGE_TYPES, "property"), strings.intern(name))
                }
                (kind, EdgeLabel::Name(name)) => {
                    (type_index(EDGE_TYPES, kind.as_str()), strings.intern(name))
                }
                (kind, EdgeLabel::Index(index)) => (
                    type_index(EDGE_TYPES, kind.as_str()),
                    strings.intern(&index.to_string()),
                ),
            };
            edges.extend([edge_type, name_or_index, to_node(edge.to)]);
        }

        let edge_count = ((edges.len() - edge_start) / EDGE_FIELDS.len()) as u64;
        nodes.extend([
            node_type(node.kind),
            strings.intern(&node.name),
            node.id,
            node.self_size,
            edge_count,
            0,
        ]);

        if let Some(location) = &node.location {
            locations.extend([
                doc_index[pos] * NODE_FIELD_COUNT,
                strings.intern(&location.file),
                u64::from(location.line.saturating_sub(1)),
                u64::from(location.column.saturating_sub(1)),
            ]);
        }
    }

    HeapSnapshot {
        snapshot: SnapshotMeta {
            meta: SnapshotFieldMeta::standard(),
            node_count: graph.node_count() as u64 + 1,
            edge_count: (edges.len() / EDGE_FIELDS.len()) as u64,
            trace_function_count: 0,
        },
        nodes,
        edges,
        trace_function_infos: Vec::new(),
        trace_tree: Vec::new(),
        samples: Vec::new(),
        locations,
        strings: strings.strings,
    }
}

/// Write a graph as a V8 heap snapshot document.
pub fn write_v8<W: Write>(graph: &HeapGraph, mut writer: W) -> Result<()> {
    let snapshot = to_snapshot(graph);
    serde_json::to_writer(&mut writer, &snapshot)?;
    writer.flush()?;
    Ok(())
}

/// Serialize a graph to V8 heap snapshot bytes.
pub fn serialize_v8(graph: &HeapGraph) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_v8(graph, &mut out)?;
    Ok(out)
}
