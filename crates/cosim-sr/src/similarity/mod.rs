//! Similarity algorithms over a feature matrix and its transpose.
//!
//! Both algorithms find candidates by walking the transpose: for every column of
//! the query row, the transposed row lists every item that shares that column.
//! Items with nothing in common with the query are never touched.

mod containment;
mod cosine;

pub use containment::ContainmentSimilarity;
pub use cosine::CosineSimilarity;

use crate::error::{Result, SrError};
use crate::types::{ItemId, SparseVector, SrResultList};
use cosim_matrix::{RowStore, ValueConf};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// A value within this distance of 1.0 marks membership in an indicator vector.
pub const INDICATOR_TOLERANCE: f32 = 1e-5;

#[inline]
pub fn is_indicator(v: f32) -> bool {
    (v - 1.0).abs() <= INDICATOR_TOLERANCE
}

/// Per-row statistics of a feature matrix, computed in one scan.
#[derive(Debug, Clone, Default)]
pub struct RowStats {
    norms: HashMap<ItemId, f64>,
    indicator_sizes: HashMap<ItemId, usize>,
    num_rows: usize,
}

impl RowStats {
    pub fn compute(features: &dyn RowStore) -> Result<Self> {
        let start = Instant::now();
        let mut stats = RowStats {
            norms: HashMap::with_capacity(features.num_rows()),
            indicator_sizes: HashMap::with_capacity(features.num_rows()),
            num_rows: 0,
        };
        features.for_each_row(&mut |row| {
            let id = row.row_id();
            stats.norms.insert(id, row.norm());
            let members = row.iter().filter(|&(_, v)| is_indicator(v)).count();
            stats.indicator_sizes.insert(id, members);
            stats.num_rows += 1;
            Ok(())
        })?;

        tracing::info!(
            rows = stats.num_rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built row statistics"
        );
        Ok(stats)
    }

    /// L2 norm of a row; `None` if the row is not in the matrix.
    pub fn norm(&self, id: ItemId) -> Option<f64> {
        self.norms.get(&id).copied()
    }

    /// Number of indicator (≈1.0) entries in a row.
    pub fn indicator_size(&self, id: ItemId) -> Option<usize> {
        self.indicator_sizes.get(&id).copied()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

/// A feature matrix, its transpose and their lazily computed row statistics.
pub struct FeatureMatrices {
    features: Arc<dyn RowStore>,
    transpose: Arc<dyn RowStore>,
    stats: OnceCell<RowStats>,
}

impl FeatureMatrices {
    pub fn new(features: Arc<dyn RowStore>, transpose: Arc<dyn RowStore>) -> Self {
        Self {
            features,
            transpose,
            stats: OnceCell::new(),
        }
    }

    pub fn features(&self) -> &dyn RowStore {
        self.features.as_ref()
    }

    pub fn transpose(&self) -> &dyn RowStore {
        self.transpose.as_ref()
    }

    /// Row statistics, computed by the first caller and shared afterwards.
    pub fn stats(&self) -> Result<&RowStats> {
        self.stats
            .get_or_try_init(|| RowStats::compute(self.features.as_ref()))
    }

    /// Reads a persisted feature row as a vector.
    pub fn vector(&self, id: ItemId) -> Result<Option<SparseVector>> {
        Ok(self.features.get_row(id)?.map(|row| row.to_map()))
    }
}

impl std::fmt::Debug for FeatureMatrices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureMatrices")
            .field("feature_rows", &self.features.num_rows())
            .field("transpose_rows", &self.transpose.num_rows())
            .field("stats_ready", &self.stats.get().is_some())
            .finish()
    }
}

/// A structural similarity measure between sparse feature vectors.
///
/// # Thread Safety
///
/// Implementations are shared across builder worker threads and concurrent
/// queries, so they must be `Send + Sync`.
pub trait SimilarityAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn min_value(&self) -> f64;

    fn max_value(&self) -> f64;

    /// Value range for matrices of scores produced by this algorithm.
    fn value_conf(&self) -> ValueConf {
        ValueConf::new(self.min_value() as f32, self.max_value() as f32)
    }

    /// Score of two vectors, symmetric and within `[min_value, max_value]`.
    fn pairwise_score(&self, a: &SparseVector, b: &SparseVector) -> Result<f64>;

    /// Score of two vectors in the context of a feature matrix.
    ///
    /// Algorithms that depend on corpus-wide statistics take them from `matrices`.
    fn pairwise_score_in(
        &self,
        matrices: &FeatureMatrices,
        a: &SparseVector,
        b: &SparseVector,
    ) -> Result<f64> {
        let _ = matrices;
        self.pairwise_score(a, b)
    }

    /// Up to `k` best partners of a persisted row, by descending score.
    ///
    /// An id with no feature row yields an empty list.
    fn most_similar(
        &self,
        matrices: &FeatureMatrices,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList>;

    /// Up to `k` best partners of an arbitrary query vector.
    fn most_similar_to_vector(
        &self,
        matrices: &FeatureMatrices,
        vector: &SparseVector,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList>;
}

#[inline]
pub(crate) fn admits(valid_ids: Option<&HashSet<ItemId>>, id: ItemId) -> bool {
    valid_ids.map_or(true, |ids| ids.contains(&id))
}

/// Selects and parameterizes a similarity algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// `"cosine"` or `"containment"`.
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Corpus size for containment scoring. Defaults to the feature row count.
    #[serde(default)]
    pub total_rows: Option<usize>,
}

fn default_kind() -> String {
    "cosine".to_string()
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self::cosine()
    }
}

impl SimilarityConfig {
    pub fn cosine() -> Self {
        Self {
            kind: default_kind(),
            total_rows: None,
        }
    }

    pub fn containment(total_rows: Option<usize>) -> Self {
        Self {
            kind: "containment".to_string(),
            total_rows,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.kind.as_str() {
            "cosine" => Ok(()),
            "containment" => match self.total_rows {
                Some(0) => Err(SrError::Config(
                    "containment total_rows must be > 0".to_string(),
                )),
                _ => Ok(()),
            },
            other => Err(SrError::Config(format!(
                "unknown similarity kind: {}",
                other
            ))),
        }
    }
}

/// Builds the algorithm named by `config`.
pub fn build_similarity(config: &SimilarityConfig) -> Result<Arc<dyn SimilarityAlgorithm>> {
    config.validate()?;
    match config.kind.as_str() {
        "cosine" => Ok(Arc::new(CosineSimilarity::new())),
        "containment" => Ok(Arc::new(ContainmentSimilarity::new(config.total_rows))),
        other => Err(SrError::Config(format!(
            "unknown similarity kind: {}",
            other
        ))),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use cosim_matrix::{InMemoryMatrix, SparseRow};

    /// In-memory feature matrix and transpose built from `(row, [(col, value)])`.
    pub fn matrices(rows: &[(ItemId, &[(ItemId, f32)])]) -> FeatureMatrices {
        let mut forward = Vec::new();
        let mut by_col: std::collections::BTreeMap<ItemId, Vec<(ItemId, f32)>> =
            Default::default();
        for &(id, cells) in rows {
            if cells.is_empty() {
                continue;
            }
            let map: SparseVector = cells.iter().copied().collect();
            forward.push(SparseRow::from_map(id, &map).unwrap());
            for &(c, v) in cells {
                by_col.entry(c).or_default().push((id, v));
            }
        }
        let transposed = by_col.into_iter().map(|(c, cells)| {
            let map: SparseVector = cells.into_iter().collect();
            SparseRow::from_map(c, &map).unwrap()
        });

        FeatureMatrices::new(
            Arc::new(InMemoryMatrix::from_rows(ValueConf::unbounded(), forward).unwrap()),
            Arc::new(InMemoryMatrix::from_rows(ValueConf::unbounded(), transposed).unwrap()),
        )
    }
}
