//! Fixture encoder for `jerryscript-1` snapshots used across the test suites.

use crate::jerryscript::{MAGIC, ObjectKind, PropertyKind, VERSION};

#[derive(Default)]
pub(crate) struct SnapshotWriter {
    strings: Vec<String>,
    records: Vec<u8>,
}

impl SnapshotWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn object(mut self, address: u32, kind: ObjectKind, name: &str, size: u32) -> Self {
        let kind = match kind {
            ObjectKind::Object => 0,
            ObjectKind::Array => 1,
            ObjectKind::Native => 2,
            ObjectKind::Hidden => 3,
        };
        let name = self.intern(name);
        self.records.push(1);
        self.push_u32(address);
        self.records.push(kind);
        self.push_u32(name);
        self.push_u32(size);
        self
    }

    pub(crate) fn string(mut self, address: u32, value: &str, size: u32) -> Self {
        let value = self.intern(value);
        self.records.push(2);
        self.push_u32(address);
        self.push_u32(value);
        self.push_u32(size);
        self
    }

    pub(crate) fn property(self, from: u32, to: u32, name: &str) -> Self {
        self.named_edge(from, to, PropertyKind::Property, name)
    }

    pub(crate) fn context(self, from: u32, to: u32, name: &str) -> Self {
        self.named_edge(from, to, PropertyKind::Context, name)
    }

    pub(crate) fn internal(self, from: u32, to: u32, name: &str) -> Self {
        self.named_edge(from, to, PropertyKind::Internal, name)
    }

    fn named_edge(mut self, from: u32, to: u32, kind: PropertyKind, name: &str) -> Self {
        let kind = match kind {
            PropertyKind::Property => 0,
            PropertyKind::Context => 1,
            PropertyKind::Internal => 2,
        };
        let name = self.intern(name);
        self.records.push(3);
        self.push_u32(from);
        self.push_u32(to);
        self.records.push(kind);
        self.push_u32(name);
        self
    }

    pub(crate) fn element(mut self, from: u32, to: u32, index: u32) -> Self {
        self.records.push(4);
        self.push_u32(from);
        self.push_u32(to);
        self.push_u32(index);
        self
    }

    pub(crate) fn root(mut self, address: u32, name: &str) -> Self {
        let name = self.intern(name);
        self.records.push(5);
        self.push_u32(address);
        self.push_u32(name);
        self
    }

    pub(crate) fn function(mut self, address: u32, identifier: &str, line: u32, column: u32) -> Self {
        let identifier = self.intern(identifier);
        self.records.push(6);
        self.push_u32(address);
        self.push_u32(identifier);
        self.push_u32(line);
        self.push_u32(column);
        self
    }

    pub(crate) fn finish(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(self.strings.len() as u32).to_le_bytes());
        for s in &self.strings {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&self.records);
        out
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(pos) = self.strings.iter().position(|existing| existing == s) {
            return pos as u32;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as u32
    }

    fn push_u32(&mut self, value: u32) {
        self.records.extend_from_slice(&value.to_le_bytes());
    }
}

/// Source map for a one-line bundle `app.js` compiled from `src/app.js`.
///
/// In 1-based terms: generated line 1 column 1 maps to `src/app.js:1:1`,
/// column 11 to `src/app.js:5:3` named `handleClick`, and column 21 to
/// `src/app.js:9:5` without a name. Line 2 has no mappings.
pub(crate) fn sample_source_map() -> &'static str {
    r#"{
        "version": 3,
        "file": "app.js",
        "sources": ["src/app.js"],
        "names": ["handleClick"],
        "mappings": "AAAA,UAIEA,UAIE"
    }"#
}
