//! Memory-mapped sparse matrix reader.

use crate::error::{MatrixError, Result};
use crate::format::{read_u32, read_u64, Header, ValueConf, HEADER_SIZE};
use crate::row::MatrixRow;
use crate::store::RowStore;
use crate::ItemId;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A sealed matrix file opened read-only.
///
/// Rows are returned as views into the mapping; nothing is copied until the
/// caller asks for an owned row.
pub struct SparseMatrix {
    path: PathBuf,
    mmap: memmap2::Mmap,
    header: Header,
    num_rows: usize,
}

impl SparseMatrix {
    /// Opens and validates a matrix file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(MatrixError::InvalidFormat(format!(
                "{}: file too small ({} bytes)",
                path.display(),
                len
            )));
        }

        // SAFETY: sealed matrix files are never modified in place; rebuilds
        // replace them by rename.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        let header = Header::decode(&mmap[..HEADER_SIZE])?;
        let num_rows = header.num_rows as usize;
        if header.body_offset() > len {
            return Err(MatrixError::InvalidFormat(format!(
                "{}: row directory for {} rows exceeds file size {}",
                path.display(),
                num_rows,
                len
            )));
        }

        tracing::debug!(path = %path.display(), rows = num_rows, "opened matrix");

        Ok(Self {
            path,
            mmap,
            header,
            num_rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn value_conf(&self) -> ValueConf {
        self.header.value_conf
    }

    #[inline]
    fn row_id_at(&self, idx: usize) -> ItemId {
        read_u32(&self.mmap, HEADER_SIZE + idx * 4)
    }

    #[inline]
    fn offset_at(&self, idx: usize) -> u64 {
        read_u64(&self.mmap, HEADER_SIZE + self.num_rows * 4 + idx * 8)
    }

    fn row_at(&self, idx: usize) -> Result<MatrixRow<'_>> {
        let offset = self.offset_at(idx);
        if offset >= self.mmap.len() as u64 {
            return Err(MatrixError::InvalidFormat(format!(
                "row offset {} out of bounds",
                offset
            )));
        }
        let row = MatrixRow::parse(&self.mmap[offset as usize..])?;
        let expected = self.row_id_at(idx);
        if row.row_id() != expected {
            return Err(MatrixError::InvalidFormat(format!(
                "directory says row {}, body says {}",
                expected,
                row.row_id()
            )));
        }
        Ok(row)
    }

    /// Returns the row with this id, if present.
    pub fn get_row(&self, id: ItemId) -> Result<Option<MatrixRow<'_>>> {
        let (mut lo, mut hi) = (0usize, self.num_rows);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_id = self.row_id_at(mid);
            if mid_id == id {
                return self.row_at(mid).map(Some);
            } else if mid_id < id {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(None)
    }

    /// Row ids in ascending order.
    pub fn row_ids(&self) -> Vec<ItemId> {
        (0..self.num_rows).map(|i| self.row_id_at(i)).collect()
    }

    /// Iterates rows in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = Result<MatrixRow<'_>>> + '_ {
        (0..self.num_rows).map(move |i| self.row_at(i))
    }
}

impl RowStore for SparseMatrix {
    fn get_row(&self, id: ItemId) -> Result<Option<MatrixRow<'_>>> {
        SparseMatrix::get_row(self, id)
    }

    fn row_ids(&self) -> Vec<ItemId> {
        SparseMatrix::row_ids(self)
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn value_conf(&self) -> ValueConf {
        self.header.value_conf
    }

    fn for_each_row(&self, f: &mut dyn FnMut(MatrixRow<'_>) -> Result<()>) -> Result<()> {
        for row in self.iter() {
            f(row?)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SparseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseMatrix")
            .field("path", &self.path)
            .field("num_rows", &self.num_rows)
            .field("value_conf", &self.header.value_conf)
            .finish()
    }
}
