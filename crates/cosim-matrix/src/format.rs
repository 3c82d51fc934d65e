//! Matrix file format constants and header layout.
//!
//! # File Layout
//!
//! ```text
//! [Header (32B)] [Row ids: u32 x N] [Row offsets: u64 x N] [Row bodies...]
//! ```
//!
//! Row ids in the directory are sorted ascending so a lookup is a binary search.
//! Offsets are absolute file positions of the matching row body.
//!
//! # Header (first 32 bytes)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0-7    | 8    | magic: u64 "COSIMMTX" |
//! | 8      | 1    | format_version: u8 |
//! | 9-11   | 3    | reserved |
//! | 12-15  | 4    | min_score: f32 |
//! | 16-19  | 4    | max_score: f32 |
//! | 20-23  | 4    | num_rows: u32 |
//! | 24-27  | 4    | reserved |
//! | 28-31  | 4    | crc32c: u32 |
//!
//! # Row body
//!
//! | Field | Size |
//! |-------|------|
//! | marker | 4 (`ROW_MARKER`) |
//! | row_id | 4 |
//! | num_cols | 4 |
//! | col_ids | 4 x num_cols |
//! | values | 4 x num_cols (f32) |
//!
//! Bodies are padded with `ROW_PADDING` to 8-byte boundaries.

use crate::error::{MatrixError, Result};

/// Matrix magic number "COSIMMTX" in little-endian.
pub const MATRIX_MAGIC: u64 = 0x58544D4D49534F43;

/// Current on-disk format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Bytes per directory entry (row id + offset).
pub const DIRECTORY_ENTRY_SIZE: usize = 4 + 8;

/// Marker at the start of every encoded row.
pub const ROW_MARKER: u32 = 0xfefe_fefe;

/// Fixed bytes in front of the column data of a row.
pub const ROW_HEADER_SIZE: usize = 12;

/// Filler byte between rows.
pub const ROW_PADDING: u8 = 0x80;

/// Rows are padded to this alignment.
pub const ROW_ALIGNMENT: u64 = 8;

/// Declared value range of a matrix.
///
/// Feature matrices are unbounded. Cosimilarity matrices carry the range of the
/// similarity algorithm that produced them, and cells are clamped into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueConf {
    pub min_score: f32,
    pub max_score: f32,
}

impl ValueConf {
    /// Creates a bounded value range.
    pub fn new(min_score: f32, max_score: f32) -> Self {
        debug_assert!(min_score <= max_score, "min_score must not exceed max_score");
        Self {
            min_score,
            max_score,
        }
    }

    /// A range that admits every finite value.
    pub fn unbounded() -> Self {
        Self {
            min_score: f32::MIN,
            max_score: f32::MAX,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.min_score > f32::MIN || self.max_score < f32::MAX
    }

    #[inline]
    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min_score, self.max_score)
    }

    pub fn contains(&self, v: f32) -> bool {
        v >= self.min_score && v <= self.max_score
    }
}

impl Default for ValueConf {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Matrix file header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub format_version: u8,
    pub value_conf: ValueConf,
    pub num_rows: u32,
}

impl Header {
    pub fn new(value_conf: ValueConf, num_rows: u32) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            value_conf,
            num_rows,
        }
    }

    /// Encodes the header to a 32-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..8].copy_from_slice(&MATRIX_MAGIC.to_le_bytes());
        buf[8] = self.format_version;
        // 9..12: reserved
        buf[12..16].copy_from_slice(&self.value_conf.min_score.to_le_bytes());
        buf[16..20].copy_from_slice(&self.value_conf.max_score.to_le_bytes());
        buf[20..24].copy_from_slice(&self.num_rows.to_le_bytes());
        // 24..28: reserved

        let crc = crc32c::crc32c(&buf[0..28]);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decodes and validates a header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(MatrixError::InvalidFormat(format!(
                "file too small for header: {} bytes",
                buf.len()
            )));
        }

        let expected_crc = read_u32(buf, 28);
        let actual_crc = crc32c::crc32c(&buf[0..28]);
        if expected_crc != actual_crc {
            return Err(MatrixError::CrcMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let magic = read_u64(buf, 0);
        if magic != MATRIX_MAGIC {
            return Err(MatrixError::InvalidFormat(format!(
                "bad magic number: {:#x}",
                magic
            )));
        }

        let format_version = buf[8];
        if format_version != FORMAT_VERSION {
            return Err(MatrixError::InvalidFormat(format!(
                "unsupported format version: {}",
                format_version
            )));
        }

        Ok(Self {
            format_version,
            value_conf: ValueConf {
                min_score: read_f32(buf, 12),
                max_score: read_f32(buf, 16),
            },
            num_rows: read_u32(buf, 20),
        })
    }

    /// Byte offset where row bodies begin.
    pub fn body_offset(&self) -> u64 {
        (HEADER_SIZE + self.num_rows as usize * DIRECTORY_ENTRY_SIZE) as u64
    }
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(buf, offset))
}

#[inline]
pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header::new(ValueConf::new(-1.0, 1.0), 42);
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.body_offset(), (32 + 42 * 12) as u64);
    }

    #[test]
    fn test_header_crc_mismatch() {
        let mut buf = Header::new(ValueConf::unbounded(), 3).encode();
        buf[20] ^= 0xff;
        assert!(matches!(
            Header::decode(&buf),
            Err(MatrixError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(
            Header::decode(&[0u8; 10]),
            Err(MatrixError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_value_conf_clamp() {
        let vconf = ValueConf::new(-1.0, 1.0);
        assert!(vconf.is_bounded());
        assert_eq!(vconf.clamp(1.000_001), 1.0);
        assert_eq!(vconf.clamp(-3.0), -1.0);
        assert_eq!(vconf.clamp(0.25), 0.25);

        let open = ValueConf::unbounded();
        assert!(!open.is_bounded());
        assert_eq!(open.clamp(1e20), 1e20);
    }
}
