//! Decoder for the `jerryscript-1` device heap snapshot encoding.
//!
//! The device runtime dumps its heap as a little-endian byte stream:
//!
//! ```text
//! header      magic "JRHS" | version u16 (= 1) | flags u16
//! string pool count u32 | count x (len u32 | len bytes of UTF-8)
//! records     tag u8 | payload, repeated until end of input
//! ```
//!
//! | tag | record             | payload                                            |
//! |-----|--------------------|----------------------------------------------------|
//! | 1   | object header      | address u32, kind u8, name str, self_size u32      |
//! | 2   | string literal     | address u32, value str, self_size u32              |
//! | 3   | property edge      | from u32, to u32, kind u8, name str                |
//! | 4   | element edge       | from u32, to u32, index u32                        |
//! | 5   | root pointer       | address u32, name str                              |
//! | 6   | function location  | address u32, identifier str, line u32, column u32  |
//!
//! `str` fields are u32 indices into the string pool. Records may refer to
//! addresses whose header has not been seen yet; resolving those is the
//! graph builder's job, not the decoder's.

use crate::error::{ConvertError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Leading bytes of every `jerryscript-1` snapshot.
pub const MAGIC: &[u8; 4] = b"JRHS";

/// Header version matching [`SnapshotFormat::JerryScript1`].
pub const VERSION: u16 = 1;

const TAG_OBJECT: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_PROPERTY: u8 = 3;
const TAG_ELEMENT: u8 = 4;
const TAG_ROOT: u8 = 5;
const TAG_FUNCTION: u8 = 6;

/// Device heap formats this decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    JerryScript1,
}

impl SnapshotFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotFormat::JerryScript1 => "jerryscript-1",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jerryscript-1" => Ok(SnapshotFormat::JerryScript1),
            other => Err(ConvertError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object classification as tagged by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Object,
    Array,
    Native,
    Hidden,
}

impl ObjectKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ObjectKind::Object),
            1 => Some(ObjectKind::Array),
            2 => Some(ObjectKind::Native),
            3 => Some(ObjectKind::Hidden),
            _ => None,
        }
    }
}

/// Flavor of a named reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Property,
    Context,
    Internal,
}

impl PropertyKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PropertyKind::Property),
            1 => Some(PropertyKind::Context),
            2 => Some(PropertyKind::Internal),
            _ => None,
        }
    }
}

/// One decoded unit of the snapshot stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    ObjectHeader {
        address: u32,
        kind: ObjectKind,
        name: String,
        self_size: u32,
    },
    StringLiteral {
        address: u32,
        value: String,
        self_size: u32,
    },
    PropertyEdge {
        from: u32,
        to: u32,
        kind: PropertyKind,
        name: String,
    },
    ElementEdge {
        from: u32,
        to: u32,
        index: u32,
    },
    RootPointer {
        address: u32,
        name: String,
    },
    /// Generated-code position of a function object, 1-based.
    FunctionLocation {
        address: u32,
        identifier: String,
        line: u32,
        column: u32,
    },
}

/// Decode a snapshot in the named format.
///
/// The format identifier is checked before any input is read.
pub fn decode(bytes: &[u8], format_version: &str) -> Result<Vec<RawRecord>> {
    let format: SnapshotFormat = format_version.parse()?;
    decode_format(bytes, format)
}

/// Decode a snapshot whose format is already known.
pub fn decode_format(bytes: &[u8], format: SnapshotFormat) -> Result<Vec<RawRecord>> {
    match format {
        SnapshotFormat::JerryScript1 => Decoder::new(bytes).decode(),
    }
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    strings: Vec<String>,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strings: Vec::new(),
        }
    }

    fn decode(mut self) -> Result<Vec<RawRecord>> {
        self.read_header()?;
        self.read_string_pool()?;

        let mut records = Vec::new();
        while self.pos < self.data.len() {
            records.push(self.read_record()?);
        }

        info!(
            records = records.len(),
            strings = self.strings.len(),
            bytes = self.data.len(),
            "decoded jerryscript-1 snapshot"
        );
        Ok(records)
    }

    fn read_header(&mut self) -> Result<()> {
        let magic = self.take(MAGIC.len(), "header magic")?;
        if magic != MAGIC {
            return Err(ConvertError::malformed(0, "missing JRHS magic"));
        }

        let version_offset = self.pos;
        let version = self.read_u16("header version")?;
        if version != VERSION {
            return Err(ConvertError::malformed(
                version_offset,
                format!("header declares version {}, expected {}", version, VERSION),
            ));
        }

        // Flags are reserved.
        self.read_u16("header flags")?;
        Ok(())
    }

    fn read_string_pool(&mut self) -> Result<()> {
        let count = self.read_u32("string pool count")? as usize;
        // Each entry needs at least its length prefix.
        let remaining = self.data.len() - self.pos;
        self.strings.reserve(count.min(remaining / 4));

        for idx in 0..count {
            let len = self.read_u32("string length")? as usize;
            let start = self.pos;
            let bytes = self.take(len, "string bytes")?;
            let value = std::str::from_utf8(bytes).map_err(|e| {
                ConvertError::malformed(start, format!("string {} is not valid UTF-8: {}", idx, e))
            })?;
            self.strings.push(value.to_string());
        }

        Ok(())
    }

    fn read_record(&mut self) -> Result<RawRecord> {
        let tag_offset = self.pos;
        let tag = self.read_u8("record tag")?;

        let record = match tag {
            TAG_OBJECT => {
                let address = self.read_u32("object address")?;
                let kind_offset = self.pos;
                let kind_byte = self.read_u8("object kind")?;
                let kind = ObjectKind::from_byte(kind_byte).ok_or_else(|| {
                    ConvertError::malformed(kind_offset, format!("unknown object kind {}", kind_byte))
                })?;
                RawRecord::ObjectHeader {
                    address,
                    kind,
                    name: self.read_string_ref("object name")?,
                    self_size: self.read_u32("object size")?,
                }
            }
            TAG_STRING => RawRecord::StringLiteral {
                address: self.read_u32("string address")?,
                value: self.read_string_ref("string value")?,
                self_size: self.read_u32("string size")?,
            },
            TAG_PROPERTY => {
                let from = self.read_u32("property source")?;
                let to = self.read_u32("property target")?;
                let kind_offset = self.pos;
                let kind_byte = self.read_u8("property kind")?;
                let kind = PropertyKind::from_byte(kind_byte).ok_or_else(|| {
                    ConvertError::malformed(
                        kind_offset,
                        format!("unknown property kind {}", kind_byte),
                    )
                })?;
                RawRecord::PropertyEdge {
                    from,
                    to,
                    kind,
                    name: self.read_string_ref("property name")?,
                }
            }
            TAG_ELEMENT => RawRecord::ElementEdge {
                from: self.read_u32("element source")?,
                to: self.read_u32("element target")?,
                index: self.read_u32("element index")?,
            },
            TAG_ROOT => RawRecord::RootPointer {
                address: self.read_u32("root address")?,
                name: self.read_string_ref("root name")?,
            },
            TAG_FUNCTION => RawRecord::FunctionLocation {
                address: self.read_u32("function address")?,
                identifier: self.read_string_ref("function identifier")?,
                line: self.read_u32("function line")?,
                column: self.read_u32("function column")?,
            },
            other => {
                return Err(ConvertError::malformed(
                    tag_offset,
                    format!("unknown record tag {:#04x}", other),
                ));
            }
        };

        Ok(record)
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let start = self.pos;
        let remaining = self.data.len() - start;
        if len > remaining {
            return Err(ConvertError::malformed(
                start,
                format!("truncated {}: need {} bytes, {} left", what, len, remaining),
            ));
        }
        self.pos = start + len;
        Ok(&self.data[start..self.pos])
    }

    fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_string_ref(&mut self, what: &str) -> Result<String> {
        let offset = self.pos;
        let idx = self.read_u32(what)? as usize;
        self.strings.get(idx).cloned().ok_or_else(|| {
            ConvertError::malformed(
                offset,
                format!(
                    "{} index {} out of range (pool has {} strings)",
                    what,
                    idx,
                    self.strings.len()
                ),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SnapshotWriter;

    fn malformed_offset(result: Result<Vec<RawRecord>>) -> usize {
        match result {
            Err(ConvertError::MalformedSnapshot { offset, .. }) => offset,
            other => panic!("expected MalformedSnapshot, got {:?}", other),
        }
    }

    #[test]
    fn decodes_every_record_kind() {
        let bytes = SnapshotWriter::new()
            .object(1, ObjectKind::Object, "Object", 32)
            .string(2, "hello", 16)
            .property(1, 2, "greeting")
            .context(1, 2, "scope")
            .element(3, 2, 0)
            .root(1, "global")
            .function(4, "a", 1, 120)
            .object(3, ObjectKind::Array, "Array", 24)
            .internal(3, 1, "owner")
            .finish();

        let records = decode(&bytes, "jerryscript-1").unwrap();
        assert_eq!(records.len(), 9);
        assert_eq!(
            records[0],
            RawRecord::ObjectHeader {
                address: 1,
                kind: ObjectKind::Object,
                name: "Object".to_string(),
                self_size: 32,
            }
        );
        assert_eq!(
            records[1],
            RawRecord::StringLiteral {
                address: 2,
                value: "hello".to_string(),
                self_size: 16,
            }
        );
        assert_eq!(
            records[3],
            RawRecord::PropertyEdge {
                from: 1,
                to: 2,
                kind: PropertyKind::Context,
                name: "scope".to_string(),
            }
        );
        assert_eq!(
            records[4],
            RawRecord::ElementEdge {
                from: 3,
                to: 2,
                index: 0
            }
        );
        assert_eq!(
            records[6],
            RawRecord::FunctionLocation {
                address: 4,
                identifier: "a".to_string(),
                line: 1,
                column: 120,
            }
        );
        assert_eq!(
            records[8],
            RawRecord::PropertyEdge {
                from: 3,
                to: 1,
                kind: PropertyKind::Internal,
                name: "owner".to_string(),
            }
        );
    }

    #[test]
    fn empty_record_section_is_valid() {
        let bytes = SnapshotWriter::new().finish();
        assert!(decode(&bytes, "jerryscript-1").unwrap().is_empty());
    }

    #[test]
    fn unsupported_format_is_rejected_before_reading() {
        let err = decode(b"", "jerryscript-2").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(ref id) if id == "jerryscript-2"));
    }

    #[test]
    fn empty_input_is_malformed() {
        assert_eq!(malformed_offset(decode(b"", "jerryscript-1")), 0);
    }

    #[test]
    fn bad_magic_is_malformed() {
        let mut bytes = SnapshotWriter::new().finish();
        bytes[0] = b'X';
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), 0);
    }

    #[test]
    fn header_version_mismatch_is_malformed() {
        let mut bytes = SnapshotWriter::new().finish();
        bytes[4] = 2;
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), 4);
    }

    #[test]
    fn truncated_record_reports_offset() {
        let mut bytes = SnapshotWriter::new()
            .object(1, ObjectKind::Object, "Object", 32)
            .finish();
        let full_len = bytes.len();
        bytes.truncate(full_len - 2);
        // The size field starts 4 bytes before the end of the full record.
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), full_len - 4);
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let mut bytes = SnapshotWriter::new().finish();
        let tag_offset = bytes.len();
        bytes.push(0x7f);
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), tag_offset);
    }

    #[test]
    fn string_index_out_of_range_is_malformed() {
        let mut bytes = SnapshotWriter::new().finish();
        let record_offset = bytes.len();
        bytes.push(TAG_ROOT);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&99u32.to_le_bytes());

        let err = decode(&bytes, "jerryscript-1").unwrap_err();
        match err {
            ConvertError::MalformedSnapshot { offset, reason } => {
                assert_eq!(offset, record_offset + 5);
                assert!(reason.contains("out of range"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn unknown_object_kind_is_malformed() {
        let mut bytes = SnapshotWriter::new().finish();
        let record_offset = bytes.len();
        bytes.push(TAG_OBJECT);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(9);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), record_offset + 5);
    }

    #[test]
    fn invalid_utf8_in_pool_is_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);
        assert_eq!(malformed_offset(decode(&bytes, "jerryscript-1")), 16);
    }

    #[test]
    fn format_names_round_trip() {
        let format: SnapshotFormat = "jerryscript-1".parse().unwrap();
        assert_eq!(format.to_string(), "jerryscript-1");
    }
}
