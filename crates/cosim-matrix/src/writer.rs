//! Sealed sparse matrix writer.
//!
//! Rows are appended to a temporary body file as they arrive, from any number of
//! threads. `finish` writes the header and row directory to a second temporary
//! file, copies the body behind them and renames the result into place, so a
//! matrix file only ever appears complete.

use crate::error::{MatrixError, Result};
use crate::format::{Header, ValueConf, HEADER_SIZE};
use crate::row::SparseRow;
use crate::ItemId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Summary of a finished matrix file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixMetadata {
    pub path: PathBuf,
    pub num_rows: usize,
    pub num_cells: u64,
    pub file_size: u64,
}

struct BodyState {
    body: BufWriter<NamedTempFile>,
    /// Body-relative offset of every row written so far.
    offsets: HashMap<ItemId, u64>,
    bytes_written: u64,
    cells: u64,
}

/// Writer for a single matrix file.
///
/// `write_row` takes `&self` and may be called concurrently; each row is
/// encoded outside the lock and appended as one contiguous record.
pub struct SparseMatrixWriter {
    path: PathBuf,
    dir: PathBuf,
    vconf: ValueConf,
    state: Mutex<BodyState>,
}

impl SparseMatrixWriter {
    /// Starts a new matrix at `path`. Nothing appears at `path` until `finish`.
    pub fn create(path: impl Into<PathBuf>, vconf: ValueConf) -> Result<Self> {
        let path = path.into();
        let dir = parent_dir(&path);
        let body = tempfile::Builder::new()
            .prefix(".cosim-body")
            .tempfile_in(&dir)?;

        Ok(Self {
            path,
            dir,
            vconf,
            state: Mutex::new(BodyState {
                body: BufWriter::new(body),
                offsets: HashMap::new(),
                bytes_written: 0,
                cells: 0,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn value_conf(&self) -> ValueConf {
        self.vconf
    }

    /// Appends a row. Fails if the row id was already written.
    pub fn write_row(&self, row: &SparseRow) -> Result<()> {
        let mut encoded = Vec::new();
        row.encode_into(&self.vconf, &mut encoded);

        let mut state = self.state.lock();
        if state.offsets.contains_key(&row.row_id()) {
            return Err(MatrixError::DuplicateRow(row.row_id()));
        }
        state.body.write_all(&encoded)?;

        let offset = state.bytes_written;
        state.offsets.insert(row.row_id(), offset);
        state.bytes_written += encoded.len() as u64;
        state.cells += row.len() as u64;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.state.lock().offsets.len()
    }

    pub fn cells_written(&self) -> u64 {
        self.state.lock().cells
    }

    /// Seals the matrix: header, sorted row directory, then the body.
    pub fn finish(self) -> Result<MatrixMetadata> {
        let state = self.state.into_inner();
        let body = state.body.into_inner().map_err(|e| e.into_error())?;

        let mut row_ids: Vec<ItemId> = state.offsets.keys().copied().collect();
        row_ids.sort_unstable();

        let num_rows = u32::try_from(row_ids.len()).map_err(|_| {
            MatrixError::InvalidFormat(format!("too many rows: {}", row_ids.len()))
        })?;
        let header = Header::new(self.vconf, num_rows);
        let body_start = header.body_offset();

        let out = tempfile::Builder::new()
            .prefix(".cosim-matrix")
            .tempfile_in(&self.dir)?;
        let mut w = BufWriter::new(out);

        w.write_all(&header.encode())?;
        for id in &row_ids {
            w.write_all(&id.to_le_bytes())?;
        }
        for id in &row_ids {
            let offset = body_start + state.offsets[id];
            w.write_all(&offset.to_le_bytes())?;
        }

        let mut body_reader: File = body.reopen()?;
        std::io::copy(&mut body_reader, &mut w)?;

        let out = w.into_inner().map_err(|e| e.into_error())?;
        out.as_file().sync_all()?;
        out.persist(&self.path).map_err(|e| MatrixError::Io(e.error))?;

        let file_size = body_start + state.bytes_written;
        debug_assert!(file_size >= HEADER_SIZE as u64);

        tracing::debug!(
            path = %self.path.display(),
            rows = row_ids.len(),
            cells = state.cells,
            bytes = file_size,
            "sealed matrix"
        );

        Ok(MatrixMetadata {
            path: self.path,
            num_rows: row_ids.len(),
            num_cells: state.cells,
            file_size,
        })
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nothing_visible_before_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("matrix");

        let writer = SparseMatrixWriter::create(&path, ValueConf::unbounded()).unwrap();
        writer
            .write_row(&SparseRow::new(1, vec![2], vec![1.0]).unwrap())
            .unwrap();
        assert!(!path.exists());

        let meta = writer.finish().unwrap();
        assert!(path.exists());
        assert_eq!(meta.num_rows, 1);
        assert_eq!(meta.num_cells, 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), meta.file_size);
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let dir = TempDir::new().unwrap();
        let writer =
            SparseMatrixWriter::create(dir.path().join("m"), ValueConf::unbounded()).unwrap();
        let row = SparseRow::new(5, vec![1], vec![1.0]).unwrap();
        writer.write_row(&row).unwrap();
        assert!(matches!(
            writer.write_row(&row),
            Err(MatrixError::DuplicateRow(5))
        ));
        assert_eq!(writer.rows_written(), 1);
    }

    #[test]
    fn test_dropped_writer_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        {
            let writer =
                SparseMatrixWriter::create(dir.path().join("m"), ValueConf::unbounded()).unwrap();
            writer
                .write_row(&SparseRow::new(1, vec![1], vec![1.0]).unwrap())
                .unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_writes() {
        let dir = TempDir::new().unwrap();
        let writer =
            SparseMatrixWriter::create(dir.path().join("m"), ValueConf::unbounded()).unwrap();

        std::thread::scope(|s| {
            for t in 0..4u32 {
                let writer = &writer;
                s.spawn(move || {
                    for i in 0..25u32 {
                        let id = t * 100 + i;
                        let row = SparseRow::new(id, vec![id, id + 1], vec![1.0, 2.0]).unwrap();
                        writer.write_row(&row).unwrap();
                    }
                });
            }
        });

        assert_eq!(writer.rows_written(), 100);
        let meta = writer.finish().unwrap();
        assert_eq!(meta.num_cells, 200);
    }
}
