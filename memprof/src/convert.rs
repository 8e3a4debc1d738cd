//! Device heap snapshot to developer-tool document conversion.
//!
//! [`SnapshotConverter`] runs the pipeline in the usual two steps: `parse`
//! decodes the device bytes, resolves function symbols and builds the heap
//! graph; `write` projects that graph into one output format. [`convert`]
//! does both for callers that just want bytes.

use heap_graph::HeapGraph;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::builder;
use crate::error::{ConvertError, Result};
use crate::gexf;
use crate::jerryscript::{self, SnapshotFormat};
use crate::sourcemap::SourceMap;
use crate::symbols;
use crate::v8;

/// Document formats a heap graph can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Chrome DevTools `.heapsnapshot`.
    V8,
    /// GEXF 1.3 graph exchange XML.
    Gexf,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::V8 => "v8",
            OutputFormat::Gexf => "gexf",
        }
    }

    /// Conventional file extension for the format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::V8 => "heapsnapshot",
            OutputFormat::Gexf => "gexf",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v8" | "heapsnapshot" => Ok(OutputFormat::V8),
            "gexf" => Ok(OutputFormat::Gexf),
            other => Err(ConvertError::UnknownOutputFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Converter
// ============================================================================

/// Converter for device heap snapshots.
pub struct SnapshotConverter<'a> {
    source_map: &'a SourceMap,
    graph: Option<HeapGraph>,
}

impl<'a> SnapshotConverter<'a> {
    /// Create a converter that resolves symbols against `source_map`.
    pub fn new(source_map: &'a SourceMap) -> Self {
        Self {
            source_map,
            graph: None,
        }
    }

    /// Parse a device snapshot from a reader.
    ///
    /// The format identifier is checked before any bytes are read.
    pub fn parse<R: Read>(&mut self, mut reader: R, format_version: &str) -> Result<()> {
        let format: SnapshotFormat = format_version.parse()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_bytes(&bytes, format)
    }

    /// Parse a device snapshot already held in memory.
    pub fn parse_bytes(&mut self, bytes: &[u8], format: SnapshotFormat) -> Result<()> {
        let records = jerryscript::decode_format(bytes, format)?;
        let symbols = symbols::resolve_records(&records, self.source_map);
        self.graph = Some(builder::build(records, &symbols)?);
        Ok(())
    }

    /// The graph built by the last successful parse.
    pub fn graph(&self) -> Option<&HeapGraph> {
        self.graph.as_ref()
    }

    pub fn into_graph(self) -> Option<HeapGraph> {
        self.graph
    }

    fn require_graph(&self) -> Result<&HeapGraph> {
        self.graph.as_ref().ok_or(ConvertError::NoGraph)
    }

    /// Write the parsed graph in the given format.
    pub fn write<W: Write>(&self, format: OutputFormat, writer: W) -> Result<()> {
        match format {
            OutputFormat::V8 => self.write_v8(writer),
            OutputFormat::Gexf => self.write_gexf(writer),
        }
    }

    /// Write the parsed graph as a V8 heap snapshot.
    pub fn write_v8<W: Write>(&self, writer: W) -> Result<()> {
        v8::write_v8(self.require_graph()?, writer)
    }

    /// Write the parsed graph as GEXF.
    pub fn write_gexf<W: Write>(&self, writer: W) -> Result<()> {
        gexf::write_gexf(self.require_graph()?, writer)
    }
}

/// Convert one device snapshot to one output document.
///
/// The output selector is parsed first, so an unknown format fails before
/// any decoding work.
pub fn convert(
    bytes: &[u8],
    format_version: &str,
    source_map: &SourceMap,
    output_format: &str,
) -> Result<Vec<u8>> {
    let output: OutputFormat = output_format.parse()?;

    let mut converter = SnapshotConverter::new(source_map);
    converter.parse(bytes, format_version)?;

    let mut out = Vec::new();
    converter.write(output, &mut out)?;
    Ok(out)
}
