//! Cosimilarity matrix construction.

use super::{emit, record_phase, BuildReport, Counters};
use crate::config::BuildOptions;
use crate::error::BuildError;
use crate::metric::FeatureSource;
use crate::pool::RowPool;
use crate::similarity::{FeatureMatrices, SimilarityAlgorithm};
use crate::types::{ItemId, SrResultList};
use cosim_matrix::{MatrixError, SparseMatrix, SparseMatrixWriter, SparseRow, ValueConf};
use cosim_observe::{BuildKind, MatrixKind, Meter, NoopMeter};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// How a cosimilarity row is computed.
#[derive(Clone, Copy)]
pub enum RowScorer<'a> {
    /// A similarity algorithm over the feature matrix and its transpose.
    Structural {
        algorithm: &'a dyn SimilarityAlgorithm,
        matrices: &'a FeatureMatrices,
    },
    /// The feature source's own most-similar capability.
    Metric(&'a FeatureSource),
}

impl RowScorer<'_> {
    fn score(
        &self,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<Option<SrResultList>, String> {
        match self {
            RowScorer::Structural {
                algorithm,
                matrices,
            } => algorithm
                .most_similar(matrices, id, k, valid_ids)
                .map(Some)
                .map_err(|e| e.to_string()),
            RowScorer::Metric(source) => source
                .most_similar(id, k, valid_ids)
                .map_err(|e| e.to_string()),
        }
    }

    fn value_range(&self) -> ValueConf {
        match self {
            RowScorer::Structural { algorithm, .. } => algorithm.value_conf(),
            RowScorer::Metric(_) => ValueConf::unbounded(),
        }
    }

    fn name(&self) -> &str {
        match self {
            RowScorer::Structural { algorithm, .. } => algorithm.name(),
            RowScorer::Metric(source) => source.name(),
        }
    }
}

/// Writes the top `max_sims_per_doc` partners of every item.
///
/// Scores are stored raw; normalization happens when the cache answers a query.
pub struct CosimilarityBuilder<'a> {
    scorer: RowScorer<'a>,
    path: PathBuf,
    options: BuildOptions,
    meter: Arc<dyn Meter>,
}

impl<'a> CosimilarityBuilder<'a> {
    pub fn new(scorer: RowScorer<'a>, path: impl Into<PathBuf>) -> Self {
        Self {
            scorer,
            path: path.into(),
            options: BuildOptions::default(),
            meter: Arc::new(NoopMeter),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.meter = meter;
        self
    }

    /// Builds the matrix and reopens it for reading.
    ///
    /// `col_ids` restricts which items may appear in a row.
    pub fn build(
        &self,
        row_ids: &[ItemId],
        col_ids: Option<&[ItemId]>,
        max_sims_per_doc: usize,
        max_threads: usize,
    ) -> Result<(BuildReport, SparseMatrix), BuildError> {
        let start = Instant::now();
        let meter = self.meter.as_ref();
        let valid: Option<HashSet<ItemId>> = col_ids.map(|ids| ids.iter().copied().collect());

        tracing::info!(
            rows = row_ids.len(),
            columns = valid.as_ref().map(|v| v.len()),
            max_sims_per_doc,
            scorer = self.scorer.name(),
            path = %self.path.display(),
            "building cosimilarity matrix"
        );
        emit(meter, MatrixKind::Cosimilarity, BuildKind::Start { rows: row_ids.len() });

        let writer = SparseMatrixWriter::create(&self.path, self.scorer.value_range()).map_err(
            |source| BuildError::Create {
                path: self.path.clone(),
                source,
            },
        )?;
        let counters = Counters::default();
        let pool = RowPool::new(max_threads, self.options.log_interval, "cosim")?;

        let outcome = pool.run(
            row_ids,
            |processed, total| {
                tracing::info!(
                    processed,
                    total,
                    "wrote {} non-zero similarity cells",
                    counters.cells()
                );
                emit(meter, MatrixKind::Cosimilarity, BuildKind::Progress { processed, total });
            },
            |id| self.write_row(&writer, &counters, id, max_sims_per_doc, valid.as_ref()),
        );
        if let Err(e) = outcome {
            emit(meter, MatrixKind::Cosimilarity, BuildKind::Failed);
            return Err(e);
        }

        let meta = writer.finish().map_err(|source| BuildError::Finalize {
            path: self.path.clone(),
            source,
        })?;
        let report = counters.report(row_ids.len());
        let ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            rows_written = report.rows_written,
            rows_skipped = report.rows_skipped,
            rows_failed = report.rows_failed,
            bytes = meta.file_size,
            elapsed_ms = ms,
            "wrote {} non-zero similarity cells",
            report.cells_written
        );
        record_phase(meter, MatrixKind::Cosimilarity, &report, ms);
        emit(
            meter,
            MatrixKind::Cosimilarity,
            BuildKind::Finish {
                rows_written: report.rows_written as u64,
                cells: report.cells_written,
                ms,
            },
        );

        let matrix = SparseMatrix::open(&self.path).map_err(|source| BuildError::Finalize {
            path: self.path.clone(),
            source,
        })?;
        Ok((report, matrix))
    }

    fn write_row(
        &self,
        writer: &SparseMatrixWriter,
        counters: &Counters,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<(), BuildError> {
        let results = match self.scorer.score(id, k, valid_ids) {
            Ok(Some(results)) => results,
            Ok(None) => {
                tracing::trace!(id, "no similarity result for item");
                counters.skipped();
                return Ok(());
            }
            Err(error) => {
                tracing::warn!(id, %error, "similarity computation failed, skipping row");
                counters.failed();
                return Ok(());
            }
        };

        let scores: Vec<f32> = results.iter().map(|r| r.score as f32).collect();
        let row = match SparseRow::new(id, results.ids(), scores) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(id, error = %e, "malformed similarity result, skipping row");
                counters.failed();
                return Ok(());
            }
        };

        match writer.write_row(&row) {
            Ok(()) => {
                counters.written(row.len());
                Ok(())
            }
            Err(MatrixError::DuplicateRow(_)) => {
                tracing::warn!(id, "item submitted twice, keeping first row");
                counters.skipped();
                Ok(())
            }
            Err(source) => Err(BuildError::Write { row: id, source }),
        }
    }
}
