//! Batched matrix transposition.
//!
//! The transposer counts the cells of every column in one pass, then fills the
//! transposed rows a batch of columns at a time so that only the batch being
//! assembled is held in memory. Each batch is one more pass over the input.

use crate::error::{MatrixError, Result};
use crate::row::SparseRow;
use crate::store::RowStore;
use crate::writer::{MatrixMetadata, SparseMatrixWriter};
use crate::ItemId;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;

/// Default in-memory budget for one batch of transposed rows.
pub const DEFAULT_TRANSPOSE_BUFFER_MB: usize = 500;

/// Estimated bytes held per transposed row, on top of its cells.
const ROW_OVERHEAD_BYTES: usize = 64;

/// Estimated bytes per buffered cell (row id + value).
const CELL_BYTES: usize = 8;

/// Transposes a row store into a new matrix file.
///
/// Row `r` containing cell `(c, v)` becomes cell `(r, v)` of row `c`. The
/// output keeps the value range of the input.
pub struct SparseMatrixTransposer<'a> {
    input: &'a dyn RowStore,
    output: PathBuf,
    buffer_mb: usize,
}

impl<'a> SparseMatrixTransposer<'a> {
    pub fn new(input: &'a dyn RowStore, output: impl Into<PathBuf>) -> Self {
        Self {
            input,
            output: output.into(),
            buffer_mb: DEFAULT_TRANSPOSE_BUFFER_MB,
        }
    }

    /// Sets the per-batch memory budget in megabytes. Zero is treated as one.
    pub fn with_buffer_mb(mut self, mb: usize) -> Self {
        self.buffer_mb = mb.max(1);
        self
    }

    pub fn transpose(self) -> Result<MatrixMetadata> {
        let start = Instant::now();
        let col_counts = self.count_columns()?;
        let budget = self.buffer_mb.saturating_mul(1024 * 1024);

        let writer = SparseMatrixWriter::create(&self.output, self.input.value_conf())?;
        let col_ids: Vec<ItemId> = col_counts.keys().copied().collect();

        let mut batch_start = 0;
        let mut batches = 0usize;
        while batch_start < col_ids.len() {
            let batch_end = next_batch_end(&col_ids, &col_counts, batch_start, budget);
            self.transpose_batch(&writer, &col_ids[batch_start..batch_end], &col_counts)?;
            batches += 1;
            tracing::debug!(
                batch = batches,
                columns = batch_end - batch_start,
                done = batch_end,
                total = col_ids.len(),
                "transposed column batch"
            );
            batch_start = batch_end;
        }

        let meta = writer.finish()?;
        tracing::info!(
            path = %meta.path.display(),
            rows = meta.num_rows,
            cells = meta.num_cells,
            batches,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "transposed matrix"
        );
        Ok(meta)
    }

    /// Cell count per column, ordered by column id.
    fn count_columns(&self) -> Result<BTreeMap<ItemId, usize>> {
        let mut counts = BTreeMap::new();
        self.input.for_each_row(&mut |row| {
            for (col, _) in row.iter() {
                *counts.entry(col).or_insert(0usize) += 1;
            }
            Ok(())
        })?;
        Ok(counts)
    }

    fn transpose_batch(
        &self,
        writer: &SparseMatrixWriter,
        cols: &[ItemId],
        col_counts: &BTreeMap<ItemId, usize>,
    ) -> Result<()> {
        let mut rows: HashMap<ItemId, (Vec<ItemId>, Vec<f32>)> = cols
            .iter()
            .map(|&c| {
                let n = col_counts[&c];
                (c, (Vec::with_capacity(n), Vec::with_capacity(n)))
            })
            .collect();

        let (lo, hi) = (cols[0], cols[cols.len() - 1]);
        self.input.for_each_row(&mut |row| {
            let row_id = row.row_id();
            for (col, v) in row.iter() {
                if col < lo || col > hi {
                    continue;
                }
                if let Some((ids, values)) = rows.get_mut(&col) {
                    ids.push(row_id);
                    values.push(v);
                }
            }
            Ok(())
        })?;

        for &col in cols {
            let Some((ids, values)) = rows.remove(&col) else {
                continue;
            };
            let expected = col_counts[&col];
            if ids.len() != expected {
                return Err(MatrixError::InvalidFormat(format!(
                    "column {} counted {} cells but collected {}",
                    col,
                    expected,
                    ids.len()
                )));
            }
            writer.write_row(&SparseRow::new(col, ids, values)?)?;
        }
        Ok(())
    }
}

/// End (exclusive) of the batch starting at `start`. Always admits at least one column.
fn next_batch_end(
    col_ids: &[ItemId],
    col_counts: &BTreeMap<ItemId, usize>,
    start: usize,
    budget: usize,
) -> usize {
    let mut used = 0usize;
    let mut end = start;
    while end < col_ids.len() {
        let cost = ROW_OVERHEAD_BYTES + col_counts[&col_ids[end]] * CELL_BYTES;
        if end > start && used + cost > budget {
            break;
        }
        used += cost;
        end += 1;
    }
    end
}

/// Transposes `input` into `output` with the default memory budget.
pub fn transpose(input: &dyn RowStore, output: impl Into<PathBuf>) -> Result<MatrixMetadata> {
    SparseMatrixTransposer::new(input, output).transpose()
}
