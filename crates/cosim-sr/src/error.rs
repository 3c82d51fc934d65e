//! Error types for the similarity cache.

use crate::metric::MetricError;
use crate::types::ItemId;
use cosim_matrix::MatrixError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures of a matrix build.
///
/// Per-row failures never surface here; they are logged and the row is skipped.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The output matrix could not be created.
    #[error("failed to create matrix {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: MatrixError,
    },

    /// A row could not be appended to the output matrix.
    #[error("failed to write row {row}: {source}")]
    Write {
        row: ItemId,
        #[source]
        source: MatrixError,
    },

    /// Sealing or reopening the output matrix failed.
    #[error("failed to finalize matrix {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: MatrixError,
    },

    /// Producing the transpose matrix failed.
    #[error("failed to transpose feature matrix: {0}")]
    Transpose(#[source] MatrixError),

    /// The worker pool could not be started.
    #[error("worker pool unavailable: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors surfaced by the similarity cache and algorithms.
#[derive(Debug, Error)]
pub enum SrError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("metric error: {0}")]
    Metric(#[from] MetricError),

    /// None of the supported matrix combinations are present in the cache directory.
    #[error("no readable matrices in {0}")]
    NoReadableMatrices(PathBuf),

    /// A similarity score is mathematically undefined for this pair.
    #[error(
        "similarity undefined (sizes {size_a} and {size_b}, intersection {intersection}, total rows {total_rows})"
    )]
    UndefinedSimilarity {
        size_a: usize,
        size_b: usize,
        intersection: usize,
        total_rows: usize,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, SrError>;
