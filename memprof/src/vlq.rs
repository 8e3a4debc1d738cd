//! Base64 VLQ decoding for Source Map v3 `mappings`.

use crate::sourcemap::SourceMapError;

const BASE64_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn decode_char(ch: u8) -> Result<i64, SourceMapError> {
    BASE64_CHARS
        .iter()
        .position(|&c| c == ch)
        .map(|pos| pos as i64)
        .ok_or(SourceMapError::InvalidVlqChar(ch as char))
}

/// Decode one comma-separated segment into its signed values.
pub fn decode_segment(segment: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::new();
    let mut value = 0i64;
    let mut shift = 0u32;

    for ch in segment.bytes() {
        let digit = decode_char(ch)?;
        let continuation = digit & 0b10_0000 != 0;

        // Values are at most 32 bits wide; anything longer is corrupt.
        if shift > 30 {
            return Err(SourceMapError::InvalidVlq(segment.to_string()));
        }

        value += (digit & 0b1_1111) << shift;
        shift += 5;

        if !continuation {
            // Lowest bit is the sign.
            let negative = value & 1 != 0;
            value >>= 1;
            values.push(if negative { -value } else { value });
            value = 0;
            shift = 0;
        }
    }

    Ok(values)
}

/// A decoded mapping segment, all positions 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub source_index: u32,
    pub original_line: u32,
    pub original_column: u32,
    pub name_index: Option<u32>,
}

/// Mappings sorted by generated position.
#[derive(Debug, Clone, Default)]
pub struct DecodedMappings {
    mappings: Vec<Mapping>,
}

impl DecodedMappings {
    /// Closest mapping at or before `column` on `line`.
    pub fn find(&self, line: u32, column: u32) -> Option<&Mapping> {
        let line_start = self.mappings.partition_point(|m| m.generated_line < line);
        let line_end = self.mappings.partition_point(|m| m.generated_line <= line);
        let on_line = &self.mappings[line_start..line_end];

        match on_line.partition_point(|m| m.generated_column <= column) {
            0 => None,
            idx => Some(&on_line[idx - 1]),
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Decode a full `mappings` string.
///
/// Lines are separated by `;`, segments by `,`. Every field except the
/// generated column carries across lines as a running delta. Segments
/// without source information (a single value) only advance the column.
pub fn decode_mappings(mappings: &str) -> Result<DecodedMappings, SourceMapError> {
    let mut decoded = Vec::new();
    let mut source = 0i64;
    let mut original_line = 0i64;
    let mut original_column = 0i64;
    let mut name = 0i64;

    for (generated_line, line) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;

        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let values = decode_segment(segment)?;
            let Some(&column_delta) = values.first() else {
                continue;
            };
            generated_column = generated_column.saturating_add(column_delta);

            if values.len() < 4 {
                continue;
            }
            source = source.saturating_add(values[1]);
            original_line = original_line.saturating_add(values[2]);
            original_column = original_column.saturating_add(values[3]);
            let name_index = match values.get(4) {
                Some(&delta) => {
                    name = name.saturating_add(delta);
                    u32::try_from(name).ok()
                }
                None => None,
            };

            // Negative positions only come from corrupt maps; skip them.
            let (Ok(gen_col), Ok(src), Ok(orig_line), Ok(orig_col)) = (
                u32::try_from(generated_column),
                u32::try_from(source),
                u32::try_from(original_line),
                u32::try_from(original_column),
            ) else {
                continue;
            };

            decoded.push(Mapping {
                generated_line: generated_line as u32,
                generated_column: gen_col,
                source_index: src,
                original_line: orig_line,
                original_column: orig_col,
                name_index,
            });
        }
    }

    // Segments are emitted in order per line but not required to be sorted.
    decoded.sort_by_key(|m| (m.generated_line, m.generated_column));

    Ok(DecodedMappings { mappings: decoded })
}
