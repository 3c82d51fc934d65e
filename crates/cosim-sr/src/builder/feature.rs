//! Feature matrix and transpose construction.

use super::{emit, record_phase, BuildReport, Counters};
use crate::config::BuildOptions;
use crate::error::BuildError;
use crate::metric::FeatureSource;
use crate::pool::RowPool;
use crate::types::ItemId;
use cosim_matrix::{
    MatrixError, SparseMatrix, SparseMatrixTransposer, SparseMatrixWriter, SparseRow, ValueConf,
};
use cosim_observe::{BuildKind, MatrixKind, Meter, NoopMeter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// A freshly built and reopened feature matrix with its transpose.
pub struct FeatureBuild {
    pub report: BuildReport,
    pub features: SparseMatrix,
    pub transpose: SparseMatrix,
}

/// Writes one feature row per item, then transposes the result.
pub struct FeatureMatrixBuilder<'a> {
    source: &'a FeatureSource,
    feature_path: PathBuf,
    transpose_path: PathBuf,
    options: BuildOptions,
    meter: Arc<dyn Meter>,
}

impl<'a> FeatureMatrixBuilder<'a> {
    pub fn new(
        source: &'a FeatureSource,
        feature_path: impl Into<PathBuf>,
        transpose_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            feature_path: feature_path.into(),
            transpose_path: transpose_path.into(),
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

    pub fn build(&self, row_ids: &[ItemId], max_threads: usize) -> Result<FeatureBuild, BuildError> {
        let report = self.write_features(row_ids, max_threads)?;
        let features = open(&self.feature_path)?;
        let transpose = self.write_transpose(&features)?;
        Ok(FeatureBuild {
            report,
            features,
            transpose,
        })
    }

    fn write_features(&self, row_ids: &[ItemId], max_threads: usize) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let meter = self.meter.as_ref();
        tracing::info!(
            rows = row_ids.len(),
            metric = self.source.name(),
            path = %self.feature_path.display(),
            "building feature matrix"
        );
        emit(meter, MatrixKind::Feature, BuildKind::Start { rows: row_ids.len() });

        let writer = SparseMatrixWriter::create(&self.feature_path, ValueConf::unbounded())
            .map_err(|source| BuildError::Create {
                path: self.feature_path.clone(),
                source,
            })?;
        let counters = Counters::default();
        let pool = RowPool::new(max_threads, self.options.log_interval, "feature")?;

        let outcome = pool.run(
            row_ids,
            |processed, total| {
                tracing::info!(processed, total, "feature matrix progress");
                emit(meter, MatrixKind::Feature, BuildKind::Progress { processed, total });
            },
            |id| self.write_feature_row(&writer, &counters, id),
        );
        if let Err(e) = outcome {
            emit(meter, MatrixKind::Feature, BuildKind::Failed);
            return Err(e);
        }

        let meta = writer.finish().map_err(|source| BuildError::Finalize {
            path: self.feature_path.clone(),
            source,
        })?;
        let report = counters.report(row_ids.len());
        let ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            rows_written = report.rows_written,
            rows_skipped = report.rows_skipped,
            rows_failed = report.rows_failed,
            cells = report.cells_written,
            bytes = meta.file_size,
            elapsed_ms = ms,
            "wrote feature matrix"
        );
        record_phase(meter, MatrixKind::Feature, &report, ms);
        emit(
            meter,
            MatrixKind::Feature,
            BuildKind::Finish {
                rows_written: report.rows_written as u64,
                cells: report.cells_written,
                ms,
            },
        );
        Ok(report)
    }

    fn write_feature_row(
        &self,
        writer: &SparseMatrixWriter,
        counters: &Counters,
        id: ItemId,
    ) -> Result<(), BuildError> {
        let vector = match self.source.vector(id) {
            Ok(Some(v)) if !v.is_empty() => v,
            Ok(_) => {
                tracing::trace!(id, "no features for item");
                counters.skipped();
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "feature computation failed, skipping row");
                counters.failed();
                return Ok(());
            }
        };

        let row = match SparseRow::from_map(id, &vector) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(id, error = %e, "malformed feature vector, skipping row");
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

    fn write_transpose(&self, features: &SparseMatrix) -> Result<SparseMatrix, BuildError> {
        let start = Instant::now();
        let meter = self.meter.as_ref();
        emit(
            meter,
            MatrixKind::FeatureTranspose,
            BuildKind::Start {
                rows: features.num_rows(),
            },
        );

        let meta = SparseMatrixTransposer::new(features, &self.transpose_path)
            .with_buffer_mb(self.options.transpose_buffer_mb)
            .transpose()
            .map_err(|e| {
                emit(meter, MatrixKind::FeatureTranspose, BuildKind::Failed);
                BuildError::Transpose(e)
            })?;

        let ms = start.elapsed().as_millis() as u64;
        let report = BuildReport {
            rows_submitted: features.num_rows(),
            rows_written: meta.num_rows,
            cells_written: meta.num_cells,
            ..BuildReport::default()
        };
        record_phase(meter, MatrixKind::FeatureTranspose, &report, ms);
        emit(
            meter,
            MatrixKind::FeatureTranspose,
            BuildKind::Finish {
                rows_written: meta.num_rows as u64,
                cells: meta.num_cells,
                ms,
            },
        );
        open(&self.transpose_path)
    }
}

fn open(path: &Path) -> Result<SparseMatrix, BuildError> {
    SparseMatrix::open(path).map_err(|source| BuildError::Finalize {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricError, SrMetric};
    use crate::types::SparseVector;
    use cosim_matrix::RowStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Table(HashMap<ItemId, SparseVector>);

    impl SrMetric for Table {
        fn name(&self) -> &str {
            "table"
        }

        fn vector(&self, id: ItemId) -> Result<Option<SparseVector>, MetricError> {
            if id == 13 {
                return Err(MetricError::Failed {
                    metric: "table".to_string(),
                    id,
                    reason: "unlucky".to_string(),
                });
            }
            Ok(self.0.get(&id).cloned())
        }
    }

    fn source() -> FeatureSource {
        let mut rows = HashMap::new();
        rows.insert(1, SparseVector::from([(2, 1.0), (3, 1.0)]));
        rows.insert(2, SparseVector::from([(3, 1.0)]));
        rows.insert(3, SparseVector::new());
        FeatureSource::universal(Arc::new(Table(rows)))
    }

    #[test]
    fn test_build_skips_empty_absent_and_failed_rows() {
        let dir = TempDir::new().unwrap();
        let source = source();
        let builder = FeatureMatrixBuilder::new(
            &source,
            dir.path().join("featureMatrix"),
            dir.path().join("featureTransposeMatrix"),
        );

        let built = builder.build(&[1, 2, 3, 4, 13], 2).unwrap();
        assert_eq!(
            built.report,
            BuildReport {
                rows_submitted: 5,
                rows_written: 2,
                rows_skipped: 2,
                rows_failed: 1,
                cells_written: 3,
            }
        );

        assert_eq!(RowStore::row_ids(&built.features), vec![1, 2]);
        assert_eq!(RowStore::row_ids(&built.transpose), vec![2, 3]);
        let col3 = built.transpose.get_row(3).unwrap().unwrap();
        assert_eq!(col3.to_map(), HashMap::from([(1, 1.0), (2, 1.0)]));
    }

    #[test]
    fn test_duplicate_ids_written_once() {
        let dir = TempDir::new().unwrap();
        let source = source();
        let builder = FeatureMatrixBuilder::new(&source, dir.path().join("f"), dir.path().join("t"));
        let built = builder.build(&[1, 1, 2], 1).unwrap();
        assert_eq!(built.report.rows_written, 2);
        assert_eq!(built.report.rows_skipped, 1);
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let source = source();
        let missing = dir.path().join("nope");
        let builder = FeatureMatrixBuilder::new(&source, missing.join("f"), missing.join("t"));
        assert!(matches!(
            builder.build(&[1], 1),
            Err(BuildError::Create { .. })
        ));
    }
}
