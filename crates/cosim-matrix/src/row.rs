//! Sparse rows: an owned builder form and a zero-copy view over encoded bytes.

use crate::error::{MatrixError, Result};
use crate::format::{read_f32, read_u32, ValueConf, ROW_ALIGNMENT, ROW_HEADER_SIZE, ROW_MARKER, ROW_PADDING};
use crate::ItemId;
use std::collections::HashMap;

/// An owned sparse row with columns sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRow {
    row_id: ItemId,
    col_ids: Vec<ItemId>,
    values: Vec<f32>,
}

impl SparseRow {
    /// Builds a row from parallel column and value arrays.
    ///
    /// Columns are sorted by id. Repeated column ids and non-finite values are rejected.
    pub fn new(row_id: ItemId, col_ids: Vec<ItemId>, values: Vec<f32>) -> Result<Self> {
        if col_ids.len() != values.len() {
            return Err(MatrixError::LengthMismatch {
                ids: col_ids.len(),
                values: values.len(),
            });
        }
        let mut pairs: Vec<(ItemId, f32)> = col_ids.into_iter().zip(values).collect();
        Self::from_pairs(row_id, &mut pairs)
    }

    /// Builds a row from a column -> value map.
    pub fn from_map(row_id: ItemId, cells: &HashMap<ItemId, f32>) -> Result<Self> {
        let mut pairs: Vec<(ItemId, f32)> = cells.iter().map(|(&c, &v)| (c, v)).collect();
        Self::from_pairs(row_id, &mut pairs)
    }

    fn from_pairs(row_id: ItemId, pairs: &mut [(ItemId, f32)]) -> Result<Self> {
        pairs.sort_unstable_by_key(|&(c, _)| c);

        let mut col_ids = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for &(col, v) in pairs.iter() {
            if col_ids.last() == Some(&col) {
                return Err(MatrixError::DuplicateColumn { row: row_id, col });
            }
            if !v.is_finite() {
                return Err(MatrixError::InvalidValue { row: row_id, col });
            }
            col_ids.push(col);
            values.push(v);
        }

        Ok(Self {
            row_id,
            col_ids,
            values,
        })
    }

    pub fn row_id(&self) -> ItemId {
        self.row_id
    }

    pub fn len(&self) -> usize {
        self.col_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.col_ids.is_empty()
    }

    pub fn col_ids(&self) -> &[ItemId] {
        &self.col_ids
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f32)> + '_ {
        self.col_ids.iter().copied().zip(self.values.iter().copied())
    }

    /// Encoded size, excluding padding.
    pub fn encoded_len(&self) -> usize {
        ROW_HEADER_SIZE + self.len() * 8
    }

    /// Appends the encoded row plus padding to `buf`, clamping values into `vconf`.
    pub fn encode_into(&self, vconf: &ValueConf, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.reserve(self.encoded_len() + ROW_ALIGNMENT as usize);

        buf.extend_from_slice(&ROW_MARKER.to_le_bytes());
        buf.extend_from_slice(&self.row_id.to_le_bytes());
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for col in &self.col_ids {
            buf.extend_from_slice(&col.to_le_bytes());
        }
        for v in &self.values {
            buf.extend_from_slice(&vconf.clamp(*v).to_le_bytes());
        }

        let written = (buf.len() - start) as u64;
        let pad = padding_for(written);
        buf.resize(buf.len() + pad, ROW_PADDING);
    }
}

/// Bytes needed to pad `len` to the row alignment.
#[inline]
pub(crate) fn padding_for(len: u64) -> usize {
    ((ROW_ALIGNMENT - len % ROW_ALIGNMENT) % ROW_ALIGNMENT) as usize
}

/// A borrowed view of one encoded row.
///
/// Reads columns straight out of the underlying buffer, which is usually a
/// memory-mapped matrix file.
#[derive(Clone, Copy)]
pub struct MatrixRow<'a> {
    data: &'a [u8],
    num_cols: usize,
}

impl<'a> MatrixRow<'a> {
    /// Parses a row at the start of `data`. Trailing bytes are ignored.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < ROW_HEADER_SIZE {
            return Err(MatrixError::InvalidFormat(format!(
                "truncated row header: {} bytes",
                data.len()
            )));
        }
        let marker = read_u32(data, 0);
        if marker != ROW_MARKER {
            return Err(MatrixError::InvalidFormat(format!(
                "bad row marker: {:#x}",
                marker
            )));
        }
        let num_cols = read_u32(data, 8) as usize;
        let len = ROW_HEADER_SIZE + num_cols * 8;
        if data.len() < len {
            return Err(MatrixError::InvalidFormat(format!(
                "row {} needs {} bytes, {} available",
                read_u32(data, 4),
                len,
                data.len()
            )));
        }
        Ok(Self {
            data: &data[..len],
            num_cols,
        })
    }

    #[inline]
    pub fn row_id(&self) -> ItemId {
        read_u32(self.data, 4)
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn is_empty(&self) -> bool {
        self.num_cols == 0
    }

    #[inline]
    pub fn col_id(&self, i: usize) -> ItemId {
        debug_assert!(i < self.num_cols);
        read_u32(self.data, ROW_HEADER_SIZE + i * 4)
    }

    #[inline]
    pub fn col_value(&self, i: usize) -> f32 {
        debug_assert!(i < self.num_cols);
        read_f32(self.data, ROW_HEADER_SIZE + self.num_cols * 4 + i * 4)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, f32)> + 'a {
        let row = *self;
        (0..row.num_cols).map(move |i| (row.col_id(i), row.col_value(i)))
    }

    /// Looks up a column by id. Columns are sorted, so this is a binary search.
    pub fn get(&self, col: ItemId) -> Option<f32> {
        let (mut lo, mut hi) = (0usize, self.num_cols);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let id = self.col_id(mid);
            if id == col {
                return Some(self.col_value(mid));
            } else if id < col {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        None
    }

    /// Euclidean norm of the row values.
    pub fn norm(&self) -> f64 {
        self.iter()
            .map(|(_, v)| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt()
    }

    pub fn to_sparse_row(&self) -> SparseRow {
        SparseRow {
            row_id: self.row_id(),
            col_ids: (0..self.num_cols).map(|i| self.col_id(i)).collect(),
            values: (0..self.num_cols).map(|i| self.col_value(i)).collect(),
        }
    }

    pub fn to_map(&self) -> HashMap<ItemId, f32> {
        self.iter().collect()
    }
}

impl std::fmt::Debug for MatrixRow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixRow")
            .field("row_id", &self.row_id())
            .field("num_cols", &self.num_cols)
            .finish()
    }
}
