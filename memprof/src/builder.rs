//! Assemble a [`HeapGraph`] from decoded records and resolved symbols.
//!
//! Node ids are the 0-based position at which an address first appears in
//! a node-bearing record (object header, string literal or function
//! location). Edges and roots are translated only after every record has
//! been seen, so records may reference addresses declared later.

use heap_graph::{
    EdgeKind, EdgeLabel, GraphIntegrityError, HeapEdge, HeapGraph, HeapNode, NodeKind,
};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::jerryscript::{ObjectKind, PropertyKind, RawRecord};
use crate::symbols::SymbolTable;

const ANONYMOUS: &str = "(anonymous)";

/// A node under construction.
struct PendingNode {
    kind: NodeKind,
    name: String,
    self_size: u64,
    /// An object header or string literal has been merged in.
    has_header: bool,
    location: Option<heap_graph::SourceLocation>,
}

impl PendingNode {
    fn blank() -> Self {
        Self {
            kind: NodeKind::Object,
            name: String::new(),
            self_size: 0,
            has_header: false,
            location: None,
        }
    }
}

/// Unresolved edge, still by address.
struct PendingEdge {
    from: u32,
    to: u32,
    kind: EdgeKind,
    label: EdgeLabel,
}

/// Build a heap graph.
///
/// Fails with [`GraphIntegrityError`] when an edge or root pointer names an
/// address no node-bearing record declared.
pub fn build(
    records: Vec<RawRecord>,
    symbols: &SymbolTable,
) -> Result<HeapGraph, GraphIntegrityError> {
    let mut ids: HashMap<u32, usize> = HashMap::new();
    let mut pending: Vec<PendingNode> = Vec::new();
    let mut edges: Vec<PendingEdge> = Vec::new();
    let mut roots: Vec<u32> = Vec::new();

    let mut slot = |address: u32, pending: &mut Vec<PendingNode>| -> usize {
        *ids.entry(address).or_insert_with(|| {
            pending.push(PendingNode::blank());
            pending.len() - 1
        })
    };

    for record in records {
        match record {
            RawRecord::ObjectHeader {
                address,
                kind,
                name,
                self_size,
            } => {
                let idx = slot(address, &mut pending);
                let node = &mut pending[idx];
                if node.has_header {
                    debug!(address, "ignoring repeated header");
                    continue;
                }
                node.has_header = true;
                node.self_size = u64::from(self_size);
                // A function record seen earlier already made this a closure.
                if node.kind != NodeKind::Closure {
                    node.kind = match kind {
                        ObjectKind::Object => NodeKind::Object,
                        ObjectKind::Array => NodeKind::Array,
                        ObjectKind::Native => NodeKind::Native,
                        ObjectKind::Hidden => NodeKind::Hidden,
                    };
                    node.name = name;
                }
            }
            RawRecord::StringLiteral {
                address,
                value,
                self_size,
            } => {
                let idx = slot(address, &mut pending);
                let node = &mut pending[idx];
                if node.has_header {
                    debug!(address, "ignoring repeated header");
                    continue;
                }
                if node.kind == NodeKind::Closure {
                    debug!(address, "string literal at a function address, dropping closure");
                    node.location = None;
                }
                node.has_header = true;
                node.kind = NodeKind::String;
                node.name = value;
                node.self_size = u64::from(self_size);
            }
            RawRecord::FunctionLocation {
                address,
                identifier,
                ..
            } => {
                let idx = slot(address, &mut pending);
                let node = &mut pending[idx];
                if node.kind == NodeKind::String || node.kind == NodeKind::Closure {
                    debug!(address, kind = %node.kind, "ignoring function location");
                    continue;
                }
                node.kind = NodeKind::Closure;
                match symbols.get(&address) {
                    Some(symbol) => {
                        node.name = symbol.name.clone();
                        node.location = symbol.location.clone();
                    }
                    None => node.name = identifier,
                }
                if node.name.is_empty() {
                    node.name = ANONYMOUS.to_string();
                }
            }
            RawRecord::PropertyEdge {
                from,
                to,
                kind,
                name,
            } => edges.push(PendingEdge {
                from,
                to,
                kind: match kind {
                    PropertyKind::Property => EdgeKind::Property,
                    PropertyKind::Context => EdgeKind::Context,
                    PropertyKind::Internal => EdgeKind::Internal,
                },
                label: EdgeLabel::Name(name),
            }),
            RawRecord::ElementEdge { from, to, index } => edges.push(PendingEdge {
                from,
                to,
                kind: EdgeKind::Element,
                label: EdgeLabel::Index(index),
            }),
            RawRecord::RootPointer { address, name } => {
                debug!(address, root = %name, "root pointer");
                roots.push(address);
            }
        }
    }

    let id_of = |address: u32| ids.get(&address).map(|&idx| idx as u64);

    let mut heap_edges = Vec::with_capacity(edges.len());
    for edge in edges {
        let (Some(from), Some(to)) = (id_of(edge.from), id_of(edge.to)) else {
            return Err(GraphIntegrityError::DanglingEdge {
                from: u64::from(edge.from),
                to: u64::from(edge.to),
            });
        };
        heap_edges.push(HeapEdge::new(from, to, edge.kind, edge.label));
    }

    let mut root_ids = Vec::with_capacity(roots.len());
    for address in roots {
        let id = id_of(address).ok_or(GraphIntegrityError::UnknownRoot(u64::from(address)))?;
        root_ids.push(id);
    }

    let nodes: Vec<HeapNode> = pending
        .into_iter()
        .enumerate()
        .map(|(idx, node)| HeapNode {
            id: idx as u64,
            kind: node.kind,
            name: node.name,
            self_size: node.self_size,
            is_root: false,
            location: node.location,
        })
        .collect();

    let graph = HeapGraph::new(nodes, heap_edges, root_ids)?;
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        roots = graph.roots().len(),
        self_size = graph.total_self_size(),
        "built heap graph"
    );
    Ok(graph)
}
