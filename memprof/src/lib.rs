//! Device heap snapshot converter.
//!
//! Turns the raw heap dump a JerryScript device produces into documents
//! that developer tools can open, with minified function names mapped back
//! through the application's source map.
//!
//! # Pipeline
//!
//! - [`jerryscript`] - Decode the `jerryscript-1` byte stream into records
//! - [`symbols`] - Resolve function records against a [`sourcemap::SourceMap`]
//! - [`builder`] - Assemble the [`heap_graph::HeapGraph`]
//! - [`v8`] - Write Chrome DevTools `.heapsnapshot` documents
//! - [`gexf`] - Write GEXF graph documents
//!
//! # Tools
//!
//! - [`heapcheck`] - Read back and check V8 heap snapshot documents
//!
//! # Example
//!
//! ```no_run
//! use memprof::convert::{OutputFormat, SnapshotConverter};
//! use memprof::sourcemap::SourceMap;
//! use std::fs::{self, File};
//! use std::io::{BufReader, BufWriter};
//!
//! let map = SourceMap::for_device(&fs::read("app.json").unwrap(), "atlas").unwrap();
//! let input = BufReader::new(File::open("device.heap").unwrap());
//! let output = BufWriter::new(File::create("device.heapsnapshot").unwrap());
//!
//! let mut converter = SnapshotConverter::new(&map);
//! converter.parse(input, "jerryscript-1").unwrap();
//! converter.write(OutputFormat::V8, output).unwrap();
//! ```

pub mod builder;
pub mod convert;
pub mod error;
pub mod gexf;
pub mod heapcheck;
pub mod jerryscript;
pub mod sourcemap;
pub mod symbols;
pub mod v8;
pub mod vlq;

#[cfg(test)]
mod testutil;

pub use convert::{OutputFormat, SnapshotConverter, convert};
pub use error::{ConvertError, Result};

// Re-export heap_graph for convenience
pub use heap_graph;
