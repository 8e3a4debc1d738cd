//! Reader and consistency checker for V8 heap snapshot documents.
//!
//! This reads a `.heapsnapshot` file back into nodes and edges so the
//! output of [`crate::v8`] (or any other producer) can be checked before it
//! is handed to DevTools.

use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

use crate::v8::HeapSnapshot;

#[derive(Error, Debug)]
pub enum HeapCheckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid snapshot: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, HeapCheckError>;

// ============================================================================
// Parsed snapshot representation
// ============================================================================

/// A node read back from a document.
#[derive(Debug, Clone)]
pub struct SnapshotNode {
    pub node_type: String,
    pub name: String,
    pub id: u64,
    pub self_size: u64,
    pub edge_count: usize,
    pub edges_start: usize,
}

/// An edge read back from a document.
#[derive(Debug, Clone)]
pub struct SnapshotEdge {
    pub edge_type: String,
    /// Property name, or `[n]` for element edges.
    pub name_or_index: String,
    pub to_node_idx: usize,
}

/// Column positions of the fields a reader needs.
#[derive(Debug, Clone, Copy)]
struct Layout {
    node_field_count: usize,
    node_type: usize,
    node_name: usize,
    node_id: usize,
    node_size: usize,
    node_edge_count: usize,
    edge_field_count: usize,
    edge_type: usize,
    edge_name: usize,
    edge_to: usize,
}

fn field(fields: &[String], name: &str) -> Result<usize> {
    fields
        .iter()
        .position(|f| f == name)
        .ok_or_else(|| HeapCheckError::Invalid(format!("missing field '{}'", name)))
}

fn type_names(types: &[serde_json::Value]) -> Vec<String> {
    types
        .first()
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

impl Layout {
    fn of(raw: &HeapSnapshot) -> Result<Self> {
        let meta = &raw.snapshot.meta;
        Ok(Self {
            node_field_count: meta.node_fields.len(),
            node_type: field(&meta.node_fields, "type")?,
            node_name: field(&meta.node_fields, "name")?,
            node_id: field(&meta.node_fields, "id")?,
            node_size: field(&meta.node_fields, "self_size")?,
            node_edge_count: field(&meta.node_fields, "edge_count")?,
            edge_field_count: meta.edge_fields.len(),
            edge_type: field(&meta.edge_fields, "type")?,
            edge_name: field(&meta.edge_fields, "name_or_index")?,
            edge_to: field(&meta.edge_fields, "to_node")?,
        })
    }
}

/// A heap snapshot document decoded into nodes and edges.
pub struct ParsedSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
    /// Map from node ID to node index.
    pub id_to_idx: HashMap<u64, usize>,
    pub node_type_names: Vec<String>,
    pub edge_type_names: Vec<String>,
    raw: HeapSnapshot,
    layout: Layout,
}

impl ParsedSnapshot {
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let raw: HeapSnapshot = serde_json::from_reader(reader)?;
        Self::from_raw(raw)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let raw: HeapSnapshot = serde_json::from_slice(data)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: HeapSnapshot) -> Result<Self> {
        let layout = Layout::of(&raw)?;
        let node_type_names = type_names(&raw.snapshot.meta.node_types);
        let edge_type_names = type_names(&raw.snapshot.meta.edge_types);

        let mut nodes = Vec::with_capacity(raw.nodes.len() / layout.node_field_count);
        let mut id_to_idx = HashMap::new();
        let mut edge_offset = 0usize;

        for (node_idx, chunk) in raw.nodes.chunks_exact(layout.node_field_count).enumerate() {
            let type_id = chunk[layout.node_type] as usize;
            let node_type = node_type_names
                .get(type_id)
                .cloned()
                .unwrap_or_else(|| format!("type_{}", type_id));
            let name = raw
                .strings
                .get(chunk[layout.node_name] as usize)
                .cloned()
                .unwrap_or_default();
            let id = chunk[layout.node_id];
            let edge_count = chunk[layout.node_edge_count] as usize;

            id_to_idx.insert(id, node_idx);
            nodes.push(SnapshotNode {
                node_type,
                name,
                id,
                self_size: chunk[layout.node_size],
                edge_count,
                edges_start: edge_offset,
            });
            edge_offset = edge_offset.checked_add(edge_count).ok_or_else(|| {
                HeapCheckError::Invalid(format!(
                    "node {} edge_count {} overflows the edge array",
                    node_idx, edge_count
                ))
            })?;
        }

        let mut edges = Vec::with_capacity(raw.edges.len() / layout.edge_field_count);
        for chunk in raw.edges.chunks_exact(layout.edge_field_count) {
            let type_id = chunk[layout.edge_type] as usize;
            let edge_type = edge_type_names
                .get(type_id)
                .cloned()
                .unwrap_or_else(|| format!("edge_{}", type_id));

            let raw_name = chunk[layout.edge_name];
            let name_or_index = if edge_type == "element" || edge_type == "hidden" {
                format!("[{}]", raw_name)
            } else {
                raw.strings
                    .get(raw_name as usize)
                    .cloned()
                    .unwrap_or_else(|| raw_name.to_string())
            };

            edges.push(SnapshotEdge {
                edge_type,
                name_or_index,
                to_node_idx: chunk[layout.edge_to] as usize / layout.node_field_count,
            });
        }

        Ok(ParsedSnapshot {
            nodes,
            edges,
            id_to_idx,
            node_type_names,
            edge_type_names,
            raw,
            layout,
        })
    }

    /// Get edges for a node.
    pub fn edges_for_node(&self, node_idx: usize) -> &[SnapshotEdge] {
        let Some(node) = self.nodes.get(node_idx) else {
            return &[];
        };
        let start = node.edges_start.min(self.edges.len());
        let end = node
            .edges_start
            .saturating_add(node.edge_count)
            .min(self.edges.len());
        &self.edges[start..end]
    }

    pub fn node_by_id(&self, id: u64) -> Option<&SnapshotNode> {
        self.id_to_idx.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn string_count(&self) -> usize {
        self.raw.strings.len()
    }

    pub fn location_count(&self) -> usize {
        self.raw.locations.len() / self.raw.snapshot.meta.location_fields.len().max(1)
    }

    /// Check that the flat arrays agree with each other and with the
    /// declared metadata.
    pub fn validate(&self) -> Result<()> {
        let raw = &self.raw;
        let layout = &self.layout;
        let invalid = |msg: String| -> Result<()> { Err(HeapCheckError::Invalid(msg)) };

        if raw.nodes.len() % layout.node_field_count != 0 {
            return invalid(format!(
                "node array length {} is not a multiple of {}",
                raw.nodes.len(),
                layout.node_field_count
            ));
        }
        if raw.edges.len() % layout.edge_field_count != 0 {
            return invalid(format!(
                "edge array length {} is not a multiple of {}",
                raw.edges.len(),
                layout.edge_field_count
            ));
        }

        let node_count = raw.nodes.len() / layout.node_field_count;
        let edge_count = raw.edges.len() / layout.edge_field_count;
        if raw.snapshot.node_count as usize != node_count {
            return invalid(format!(
                "declared node_count {} but found {} nodes",
                raw.snapshot.node_count, node_count
            ));
        }
        if raw.snapshot.edge_count as usize != edge_count {
            return invalid(format!(
                "declared edge_count {} but found {} edges",
                raw.snapshot.edge_count, edge_count
            ));
        }

        let claimed = self
            .nodes
            .iter()
            .try_fold(0usize, |sum, n| sum.checked_add(n.edge_count));
        let Some(claimed) = claimed else {
            return invalid("per-node edge counts overflow".to_string());
        };
        if claimed != edge_count {
            return invalid(format!(
                "nodes claim {} edges but the edge array holds {}",
                claimed, edge_count
            ));
        }

        for (idx, chunk) in raw.nodes.chunks_exact(layout.node_field_count).enumerate() {
            if chunk[layout.node_name] as usize >= raw.strings.len() {
                return invalid(format!(
                    "node {} names string {} outside the string table",
                    idx, chunk[layout.node_name]
                ));
            }
        }

        for (idx, chunk) in raw.edges.chunks_exact(layout.edge_field_count).enumerate() {
            let to_node = chunk[layout.edge_to] as usize;
            if to_node % layout.node_field_count != 0 || to_node / layout.node_field_count >= node_count
            {
                return invalid(format!("edge {} has invalid to_node {}", idx, to_node));
            }

            let named = !matches!(
                self.edges[idx].edge_type.as_str(),
                "element" | "hidden"
            );
            if named && chunk[layout.edge_name] as usize >= raw.strings.len() {
                return invalid(format!(
                    "edge {} names string {} outside the string table",
                    idx, chunk[layout.edge_name]
                ));
            }
        }

        Ok(())
    }
}
