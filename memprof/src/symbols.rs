//! Symbol resolution for function records.
//!
//! A missing source-map entry is an expected outcome, not an error: the
//! symbol keeps its raw (minified) identifier and has no location, so a
//! partially mapped bundle never blocks a conversion.

use heap_graph::SourceLocation;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::jerryscript::RawRecord;
use crate::sourcemap::{RawIdentifier, SourceMap};

/// Display name and original location for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: String,
    pub location: Option<SourceLocation>,
}

impl ResolvedSymbol {
    /// A symbol the source map knew nothing about.
    pub fn unresolved(identifier: &RawIdentifier) -> Self {
        Self {
            name: identifier.name.clone(),
            location: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.location.is_some()
    }
}

/// Resolved symbols keyed by the heap address of their function object.
pub type SymbolTable = HashMap<u32, ResolvedSymbol>;

/// Resolve one raw identifier against a source map.
pub fn resolve(identifier: &RawIdentifier, source_map: &SourceMap) -> ResolvedSymbol {
    match source_map.lookup(identifier) {
        Some(entry) => ResolvedSymbol {
            name: entry
                .original_name
                .unwrap_or_else(|| identifier.name.clone()),
            location: Some(SourceLocation {
                file: entry.original_file,
                line: entry.original_line,
                column: entry.original_column,
            }),
        },
        None => {
            debug!(
                identifier = %identifier.name,
                line = identifier.line,
                column = identifier.column,
                "no source map entry"
            );
            ResolvedSymbol::unresolved(identifier)
        }
    }
}

/// Resolve every function-location record.
///
/// When an address carries several function records, the first wins, which
/// matches how the graph builder merges them.
pub fn resolve_records(records: &[RawRecord], source_map: &SourceMap) -> SymbolTable {
    let mut table = SymbolTable::new();
    let mut missed = 0usize;

    for record in records {
        let RawRecord::FunctionLocation {
            address,
            identifier,
            line,
            column,
        } = record
        else {
            continue;
        };
        if table.contains_key(address) {
            continue;
        }

        let raw = RawIdentifier {
            name: identifier.clone(),
            line: *line,
            column: *column,
        };
        let symbol = resolve(&raw, source_map);
        if !symbol.is_resolved() {
            missed += 1;
        }
        table.insert(*address, symbol);
    }

    info!(
        functions = table.len(),
        unresolved = missed,
        "resolved function symbols"
    );
    table
}
