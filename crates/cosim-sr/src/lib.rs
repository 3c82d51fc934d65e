//! Sparse pairwise-similarity cache.
//!
//! This crate precomputes and serves "most similar items" answers:
//!
//! - **Feature matrix**: one sparse feature vector per item, produced by an [`SrMetric`]
//! - **Transpose**: feature to items, used to find candidates sharing a feature
//! - **Cosimilarity matrix**: the top partners of every item, precomputed
//! - **Similarity algorithms**: [`CosineSimilarity`] and [`ContainmentSimilarity`]
//!
//! # Architecture
//!
//! ```text
//! SrMetric ──► FeatureMatrixBuilder ──► featureMatrix ──► featureTransposeMatrix
//!                                              │
//!                    SimilarityAlgorithm ◄─────┘
//!                            │
//!                            ▼
//!                  CosimilarityBuilder ──► cosimilarityMatrix
//!
//! SimilarityCache::most_similar: cosimilarity row, else recompute from features
//! ```
//!
//! # Example
//!
//! ```
//! use cosim_sr::{
//!     CosineSimilarity, FeatureSource, ItemId, MetricError, SimilarityCache, SparseVector,
//!     SrMetric,
//! };
//! use std::sync::Arc;
//!
//! struct Links;
//!
//! impl SrMetric for Links {
//!     fn name(&self) -> &str {
//!         "links"
//!     }
//!
//!     fn vector(&self, id: ItemId) -> Result<Option<SparseVector>, MetricError> {
//!         Ok(match id {
//!             1 => Some(SparseVector::from([(2, 1.0), (3, 1.0)])),
//!             2 => Some(SparseVector::from([(3, 1.0)])),
//!             _ => None,
//!         })
//!     }
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cache = SimilarityCache::new(
//!     dir.path(),
//!     FeatureSource::universal(Arc::new(Links)),
//!     Some(Arc::new(CosineSimilarity::new())),
//! );
//! cache.write(&[1, 2, 3], None, 10, 2).unwrap();
//!
//! let top = cache.most_similar(1, 10, None).unwrap().unwrap();
//! assert_eq!(top.ids(), vec![1, 2]);
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod metric;
mod pool;
pub mod similarity;
pub mod types;

pub use builder::{BuildReport, CosimilarityBuilder, FeatureBuild, FeatureMatrixBuilder, RowScorer};
pub use cache::{CacheState, SimilarityCache, WriteReport};
pub use config::{BuildOptions, CacheConfig};
pub use error::{BuildError, Result, SrError};
pub use leaderboard::Leaderboard;
pub use metric::{FeatureSource, IdentityNormalizer, MetricError, Normalizer, SrMetric};
pub use similarity::{
    build_similarity, ContainmentSimilarity, CosineSimilarity, FeatureMatrices, RowStats,
    SimilarityAlgorithm, SimilarityConfig,
};
pub use types::{ItemId, SparseVector, SrResult, SrResultList};
