//! Source Map v3 lookup table for one device type.
//!
//! Application bundles ship one source map per device type. The map is
//! parsed once and then only borrowed: every lookup is a binary search over
//! the decoded mappings and never mutates the table.

use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::vlq::{DecodedMappings, decode_mappings};

/// Errors that can occur while loading a source map.
#[derive(Error, Debug)]
pub enum SourceMapError {
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid source map version: expected 3, got {0}")]
    InvalidVersion(u32),

    #[error("invalid VLQ character: {0}")]
    InvalidVlqChar(char),

    #[error("invalid VLQ segment: {0}")]
    InvalidVlq(String),

    #[error("provided bundle does not contain sourcemaps for requested device type '{0}'")]
    MissingDeviceType(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    mappings: String,
}

/// A raw function reference as reported by the device: the minified
/// identifier plus its 1-based position in the generated bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawIdentifier {
    pub name: String,
    pub line: u32,
    pub column: u32,
}

/// What the source map knows about a raw identifier. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub original_name: Option<String>,
    pub original_file: String,
    pub original_line: u32,
    pub original_column: u32,
}

/// Immutable source map for one device type.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    sources: Vec<String>,
    names: Vec<String>,
    mappings: DecodedMappings,
}

impl SourceMap {
    /// A map without entries; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_slice(data)?;
        Self::from_raw(raw)
    }

    /// Build from an already-parsed JSON value, e.g. one entry of a
    /// bundle's `sourceMaps.device` table.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Pick the map for one device type out of a bundle manifest.
    ///
    /// A document with a top-level `sourceMaps` object is a bundle and the
    /// map is taken from `sourceMaps.device.<device_type>`. Anything else is
    /// read as the device's own Source Map v3.
    pub fn for_device(data: &[u8], device_type: &str) -> Result<Self, SourceMapError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        let Some(bundle) = value.get("sourceMaps") else {
            return Self::from_value(value);
        };

        let map = bundle
            .get("device")
            .and_then(|device| device.get(device_type))
            .cloned()
            .ok_or_else(|| SourceMapError::MissingDeviceType(device_type.to_string()))?;
        debug!(device_type, "selected device source map from bundle");
        Self::from_value(map)
    }

    fn from_raw(raw: RawSourceMap) -> Result<Self, SourceMapError> {
        if raw.version != 3 {
            return Err(SourceMapError::InvalidVersion(raw.version));
        }

        let mappings = decode_mappings(&raw.mappings)?;
        let sources = match raw.source_root.as_deref() {
            Some(root) if !root.is_empty() => {
                let root = root.trim_end_matches('/');
                raw.sources
                    .iter()
                    .map(|source| format!("{}/{}", root, source))
                    .collect()
            }
            _ => raw.sources,
        };

        Ok(Self {
            sources,
            names: raw.names,
            mappings,
        })
    }

    /// Look up a raw identifier by its generated position.
    ///
    /// Returns `None` when nothing maps the position, including mappings
    /// that point at a source the map does not list.
    pub fn lookup(&self, identifier: &RawIdentifier) -> Option<SourceMapEntry> {
        let line = identifier.line.saturating_sub(1);
        let column = identifier.column.saturating_sub(1);
        let mapping = self.mappings.find(line, column)?;

        let Some(file) = self.sources.get(mapping.source_index as usize) else {
            debug!(
                source_index = mapping.source_index,
                identifier = %identifier.name,
                "mapping points outside the sources list"
            );
            return None;
        };

        Some(SourceMapEntry {
            original_name: mapping
                .name_index
                .and_then(|idx| self.names.get(idx as usize).cloned()),
            original_file: file.clone(),
            original_line: mapping.original_line + 1,
            original_column: mapping.original_column + 1,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl FromStr for SourceMap {
    type Err = SourceMapError;

    fn from_str(data: &str) -> Result<Self, SourceMapError> {
        Self::from_slice(data.as_bytes())
    }
}
