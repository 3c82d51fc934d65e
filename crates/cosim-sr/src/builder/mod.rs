//! Parallel matrix builders.
//!
//! Rows are computed on a worker pool and funneled into a single
//! [`SparseMatrixWriter`](cosim_matrix::SparseMatrixWriter). A row whose
//! computation fails is logged and skipped; only failures of the output matrix
//! itself abort a build.

mod cosimilarity;
mod feature;

pub use cosimilarity::{CosimilarityBuilder, RowScorer};
pub use feature::{FeatureBuild, FeatureMatrixBuilder};

use cosim_observe::{obs_count, obs_hist, BuildEvt, BuildKind, MatrixKind, Meter, VizEvent};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Row and cell counts of one build phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub rows_submitted: usize,
    pub rows_written: usize,
    /// Rows with nothing to write (empty or absent vectors, no result).
    pub rows_skipped: usize,
    /// Rows whose computation failed.
    pub rows_failed: usize,
    pub cells_written: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    written: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    cells: AtomicU64,
}

impl Counters {
    pub fn written(&self, cells: usize) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.cells.fetch_add(cells as u64, Ordering::Relaxed);
    }

    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cells(&self) -> u64 {
        self.cells.load(Ordering::Relaxed)
    }

    pub fn report(&self, rows_submitted: usize) -> BuildReport {
        BuildReport {
            rows_submitted,
            rows_written: self.written.load(Ordering::Relaxed),
            rows_skipped: self.skipped.load(Ordering::Relaxed),
            rows_failed: self.failed.load(Ordering::Relaxed),
            cells_written: self.cells(),
        }
    }
}

fn phase_labels(matrix: MatrixKind) -> &'static [(&'static str, &'static str)] {
    match matrix {
        MatrixKind::Feature => &[("phase", "feature")],
        MatrixKind::FeatureTranspose => &[("phase", "transpose")],
        MatrixKind::Cosimilarity => &[("phase", "cosimilarity")],
    }
}

pub(crate) fn emit(meter: &dyn Meter, matrix: MatrixKind, kind: BuildKind) {
    meter.emit(VizEvent::Build(BuildEvt { matrix, kind }));
}

/// Records the per-phase metrics once a phase completes.
pub(crate) fn record_phase(meter: &dyn Meter, matrix: MatrixKind, report: &BuildReport, ms: u64) {
    obs_hist!(meter, "cosim_build_duration_ms", phase_labels(matrix), ms);
    if matrix == MatrixKind::FeatureTranspose {
        return;
    }
    obs_count!(meter, "cosim_build_rows", &[("outcome", "written")], report.rows_written);
    obs_count!(meter, "cosim_build_rows", &[("outcome", "skipped")], report.rows_skipped);
    obs_count!(meter, "cosim_build_rows", &[("outcome", "failed")], report.rows_failed);
    obs_count!(meter, "cosim_cells_written", &[], report.cells_written);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_report() {
        let c = Counters::default();
        c.written(3);
        c.written(2);
        c.skipped();
        c.failed();
        assert_eq!(
            c.report(4),
            BuildReport {
                rows_submitted: 4,
                rows_written: 2,
                rows_skipped: 1,
                rows_failed: 1,
                cells_written: 5,
            }
        );
    }
}
