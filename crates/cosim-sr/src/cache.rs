//! The similarity cache: three matrix files and the query paths over them.
//!
//! A cache directory holds up to three files:
//!
//! ```text
//! featureMatrix            item -> feature vector
//! featureTransposeMatrix   feature -> items having it
//! cosimilarityMatrix       item -> precomputed top partners (raw scores)
//! ```
//!
//! Which files exist decides how queries are answered; see [`CacheState`].

use crate::builder::{BuildReport, CosimilarityBuilder, FeatureMatrixBuilder, RowScorer};
use crate::config::{BuildOptions, CacheConfig};
use crate::error::{BuildError, Result, SrError};
use crate::leaderboard::Leaderboard;
use crate::metric::{FeatureSource, IdentityNormalizer, Normalizer};
use crate::similarity::{build_similarity, FeatureMatrices, SimilarityAlgorithm};
use crate::types::{ItemId, SparseVector, SrResultList};
use cosim_matrix::{MatrixRow, SparseMatrix};
use cosim_observe::{obs_count, obs_hist, Meter, NoopMeter, QueryEvt, QueryPath, VizEvent};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const FEATURE_MATRIX: &str = "featureMatrix";
pub const FEATURE_TRANSPOSE_MATRIX: &str = "featureTransposeMatrix";
pub const COSIMILARITY_MATRIX: &str = "cosimilarityMatrix";

/// Which matrices a cache directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Feature, transpose and cosimilarity matrices.
    Full,
    /// Only the cosimilarity matrix; no recomputation possible.
    CosimilarityOnly,
    /// Feature and transpose matrices; every query is recomputed.
    FeatureOnly,
    /// Nothing usable.
    Uninitialized,
}

impl CacheState {
    fn from_presence(has_features: bool, has_cosimilarity: bool) -> Self {
        match (has_features, has_cosimilarity) {
            (true, true) => CacheState::Full,
            (false, true) => CacheState::CosimilarityOnly,
            (true, false) => CacheState::FeatureOnly,
            (false, false) => CacheState::Uninitialized,
        }
    }
}

/// Reports of both phases of a full cache write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub features: BuildReport,
    pub cosimilarity: BuildReport,
}

#[derive(Default)]
struct Handles {
    features: Option<Arc<FeatureMatrices>>,
    cosimilarity: Option<Arc<SparseMatrix>>,
}

/// Answers most-similar queries from a directory of sparse matrices.
///
/// Queries prefer the precomputed cosimilarity row and fall back to
/// recomputing from the feature matrix and its transpose.
pub struct SimilarityCache {
    dir: PathBuf,
    source: FeatureSource,
    similarity: Option<Arc<dyn SimilarityAlgorithm>>,
    normalizer: Arc<dyn Normalizer>,
    meter: Arc<dyn Meter>,
    options: BuildOptions,
    handles: RwLock<Handles>,
}

impl SimilarityCache {
    /// Creates a cache over `dir`. No files are opened until [`read`](Self::read).
    pub fn new(
        dir: impl Into<PathBuf>,
        source: FeatureSource,
        similarity: Option<Arc<dyn SimilarityAlgorithm>>,
    ) -> Self {
        Self {
            dir: dir.into(),
            source,
            similarity,
            normalizer: Arc::new(IdentityNormalizer),
            meter: Arc::new(NoopMeter),
            options: BuildOptions::default(),
            handles: RwLock::new(Handles::default()),
        }
    }

    pub fn from_config(config: &CacheConfig, source: FeatureSource) -> Result<Self> {
        config.validate()?;
        let similarity = build_similarity(&config.similarity)?;
        Ok(Self::new(&config.dir, source, Some(similarity))
            .with_build_options(BuildOptions::from(config)))
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_meter(mut self, meter: Arc<dyn Meter>) -> Self {
        self.meter = meter;
        self
    }

    pub fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source(&self) -> &FeatureSource {
        &self.source
    }

    pub fn feature_path(&self) -> PathBuf {
        self.dir.join(FEATURE_MATRIX)
    }

    pub fn transpose_path(&self) -> PathBuf {
        self.dir.join(FEATURE_TRANSPOSE_MATRIX)
    }

    pub fn cosimilarity_path(&self) -> PathBuf {
        self.dir.join(COSIMILARITY_MATRIX)
    }

    /// Current state, from which files exist on disk.
    pub fn state(&self) -> CacheState {
        let has_features = self.feature_path().is_file() && self.transpose_path().is_file();
        CacheState::from_presence(has_features, self.cosimilarity_path().is_file())
    }

    pub fn has_readable_matrices(&self) -> bool {
        self.state() != CacheState::Uninitialized
    }

    /// Opens whichever matrices exist, replacing any open handles.
    pub fn read(&self) -> Result<CacheState> {
        let state = self.state();
        let mut handles = Handles::default();
        match state {
            CacheState::Uninitialized => {
                self.close();
                return Err(SrError::NoReadableMatrices(self.dir.clone()));
            }
            CacheState::Full | CacheState::FeatureOnly => {
                handles.features = Some(self.open_features()?);
            }
            CacheState::CosimilarityOnly => {}
        }
        if matches!(state, CacheState::Full | CacheState::CosimilarityOnly) {
            handles.cosimilarity = Some(Arc::new(SparseMatrix::open(self.cosimilarity_path())?));
        }

        tracing::info!(dir = %self.dir.display(), ?state, "opened similarity cache");
        *self.handles.write() = handles;
        Ok(state)
    }

    fn open_features(&self) -> Result<Arc<FeatureMatrices>> {
        let features = SparseMatrix::open(self.feature_path())?;
        let transpose = SparseMatrix::open(self.transpose_path())?;
        Ok(Arc::new(FeatureMatrices::new(
            Arc::new(features),
            Arc::new(transpose),
        )))
    }

    /// Releases all matrix handles. Safe to call repeatedly.
    pub fn close(&self) {
        let mut handles = self.handles.write();
        if handles.features.is_some() || handles.cosimilarity.is_some() {
            tracing::debug!(dir = %self.dir.display(), "closing similarity cache");
        }
        *handles = Handles::default();
    }

    pub fn is_open(&self) -> bool {
        let handles = self.handles.read();
        handles.features.is_some() || handles.cosimilarity.is_some()
    }

    /// Closes the cache and deletes all three matrix files.
    pub fn clear(&self) -> Result<()> {
        self.close();
        for path in [
            self.feature_path(),
            self.transpose_path(),
            self.cosimilarity_path(),
        ] {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> (Option<Arc<FeatureMatrices>>, Option<Arc<SparseMatrix>>) {
        let handles = self.handles.read();
        (handles.features.clone(), handles.cosimilarity.clone())
    }

    /// Up to `k` items most similar to `id`, restricted to `valid_ids` if given.
    ///
    /// Returns `Ok(None)` when the loaded matrices cannot answer the request,
    /// which is distinct from an answer with no results.
    pub fn most_similar(
        &self,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<Option<SrResultList>> {
        let start = Instant::now();
        let (features, cosimilarity) = self.snapshot();

        let mut partial = None;
        if let Some(cosim) = &cosimilarity {
            if let Some(row) = cosim.get_row(id)? {
                let results = row_to_result_list(row, k, valid_ids);
                if results.len() >= k {
                    return Ok(Some(self.answer(QueryPath::Cached, Some(id), k, results, start)));
                }
                partial = Some(results);
            }
        }

        if let (Some(matrices), Some(similarity)) = (&features, &self.similarity) {
            let results = similarity.most_similar(matrices, id, k, valid_ids)?;
            return Ok(Some(self.answer(QueryPath::Recomputed, Some(id), k, results, start)));
        }

        if let Some(results) = partial {
            return Ok(Some(self.answer(QueryPath::Partial, Some(id), k, results, start)));
        }

        self.record(QueryPath::Unanswerable, Some(id), 0, start);
        Ok(None)
    }

    /// Up to `k` items most similar to an arbitrary feature vector.
    ///
    /// Needs the feature matrix and its transpose; returns `Ok(None)` otherwise.
    pub fn most_similar_to_vector(
        &self,
        vector: &SparseVector,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<Option<SrResultList>> {
        let start = Instant::now();
        let (features, _) = self.snapshot();
        match (&features, &self.similarity) {
            (Some(matrices), Some(similarity)) => {
                let results = similarity.most_similar_to_vector(matrices, vector, k, valid_ids)?;
                Ok(Some(self.answer(QueryPath::Recomputed, None, k, results, start)))
            }
            _ => {
                self.record(QueryPath::Unanswerable, None, 0, start);
                Ok(None)
            }
        }
    }

    /// Raw similarity of two persisted feature rows.
    ///
    /// `None` without a loaded feature matrix and algorithm; 0 when either row is missing.
    pub fn similarity(&self, id1: ItemId, id2: ItemId) -> Result<Option<f64>> {
        let (features, _) = self.snapshot();
        let (Some(matrices), Some(similarity)) = (&features, &self.similarity) else {
            return Ok(None);
        };
        let (Some(a), Some(b)) = (matrices.vector(id1)?, matrices.vector(id2)?) else {
            return Ok(Some(0.0));
        };
        similarity.pairwise_score_in(matrices, &a, &b).map(Some)
    }

    fn answer(
        &self,
        path: QueryPath,
        id: Option<ItemId>,
        k: usize,
        results: SrResultList,
        start: Instant,
    ) -> SrResultList {
        let mut results = self.normalizer.normalize(results);
        results.sort_descending();
        results.truncate(k);
        self.record(path, id, results.len(), start);
        results
    }

    fn record(&self, path: QueryPath, id: Option<ItemId>, results: usize, start: Instant) {
        let meter = self.meter.as_ref();
        obs_count!(meter, "cosim_query", query_labels(path), 1);
        obs_hist!(
            meter,
            "cosim_query_duration_ms",
            &[],
            start.elapsed().as_secs_f64() * 1000.0
        );
        meter.emit(VizEvent::Query(QueryEvt { path, results }));
        tracing::debug!(?id, path = path.as_str(), results, "answered most-similar query");
    }

    /// Rebuilds all three matrices with the configured build options.
    pub fn build(&self, row_ids: &[ItemId], col_ids: Option<&[ItemId]>) -> Result<WriteReport> {
        self.write(
            row_ids,
            col_ids,
            self.options.max_sims_per_doc,
            self.options.max_threads,
        )
    }

    /// Deletes any existing matrices and rebuilds all three.
    ///
    /// On failure the directory may hold a subset of the files; clear and
    /// rebuild to recover.
    pub fn write(
        &self,
        row_ids: &[ItemId],
        col_ids: Option<&[ItemId]>,
        max_sims_per_doc: usize,
        max_threads: usize,
    ) -> Result<WriteReport> {
        self.clear()?;
        let features = self.write_feature_and_transpose(row_ids, max_threads)?;
        let cosimilarity = self.write_cosimilarity(row_ids, col_ids, max_sims_per_doc, max_threads)?;
        Ok(WriteReport {
            features,
            cosimilarity,
        })
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(BuildError::Io)?;
        Ok(())
    }

    /// Builds the feature matrix and its transpose, then loads them.
    pub fn write_feature_and_transpose(
        &self,
        row_ids: &[ItemId],
        max_threads: usize,
    ) -> Result<BuildReport> {
        self.ensure_dir()?;
        let built = FeatureMatrixBuilder::new(&self.source, self.feature_path(), self.transpose_path())
            .with_options(self.options)
            .with_meter(Arc::clone(&self.meter))
            .build(row_ids, max_threads)?;

        let matrices = FeatureMatrices::new(Arc::new(built.features), Arc::new(built.transpose));
        self.handles.write().features = Some(Arc::new(matrices));
        Ok(built.report)
    }

    /// Builds the cosimilarity matrix, then loads it.
    ///
    /// Uses the similarity algorithm over the loaded feature matrices when both
    /// are available, and the feature source's own metric otherwise.
    pub fn write_cosimilarity(
        &self,
        row_ids: &[ItemId],
        col_ids: Option<&[ItemId]>,
        max_sims_per_doc: usize,
        max_threads: usize,
    ) -> Result<BuildReport> {
        self.ensure_dir()?;
        let (features, _) = self.snapshot();
        let scorer = match (&features, &self.similarity) {
            (Some(matrices), Some(similarity)) => RowScorer::Structural {
                algorithm: similarity.as_ref(),
                matrices: matrices.as_ref(),
            },
            _ => RowScorer::Metric(&self.source),
        };

        let (report, matrix) = CosimilarityBuilder::new(scorer, self.cosimilarity_path())
            .with_options(self.options)
            .with_meter(Arc::clone(&self.meter))
            .build(row_ids, col_ids, max_sims_per_doc, max_threads)?;

        self.handles.write().cosimilarity = Some(Arc::new(matrix));
        Ok(report)
    }
}

impl Drop for SimilarityCache {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SimilarityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityCache")
            .field("dir", &self.dir)
            .field("source", &self.source)
            .field("similarity", &self.similarity.as_ref().map(|s| s.name()))
            .field("open", &self.is_open())
            .finish()
    }
}

/// Filters a cosimilarity row to `valid_ids` and keeps the best `k`.
fn row_to_result_list(
    row: MatrixRow<'_>,
    k: usize,
    valid_ids: Option<&HashSet<ItemId>>,
) -> SrResultList {
    let mut leaderboard = Leaderboard::new(k);
    for (id, score) in row.iter() {
        if valid_ids.map_or(true, |ids| ids.contains(&id)) {
            leaderboard.tally(id, score as f64);
        }
    }
    leaderboard.top()
}

fn query_labels(path: QueryPath) -> &'static [(&'static str, &'static str)] {
    match path {
        QueryPath::Cached => &[("path", "cached")],
        QueryPath::Recomputed => &[("path", "recomputed")],
        QueryPath::Partial => &[("path", "partial")],
        QueryPath::Unanswerable => &[("path", "unanswerable")],
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_presence() {
        assert_eq!(CacheState::from_presence(true, true), CacheState::Full);
        assert_eq!(CacheState::from_presence(false, true), CacheState::CosimilarityOnly);
        assert_eq!(CacheState::from_presence(true, false), CacheState::FeatureOnly);
        assert_eq!(CacheState::from_presence(false, false), CacheState::Uninitialized);
    }

    #[test]
    fn test_row_to_result_list_filters_and_sorts() {
        let row = cosim_matrix::SparseRow::new(10, vec![1, 2, 3, 4], vec![0.1, 0.9, 0.5, 0.7]).unwrap();
        let mut buf = Vec::new();
        row.encode_into(&cosim_matrix::ValueConf::new(-1.0, 1.0), &mut buf);
        let view = MatrixRow::parse(&buf).unwrap();

        let all = row_to_result_list(view, 3, None);
        assert_eq!(all.ids(), vec![2, 4, 3]);

        let valid: HashSet<ItemId> = [1, 3].into_iter().collect();
        let filtered = row_to_result_list(view, 3, Some(&valid));
        assert_eq!(filtered.ids(), vec![3, 1]);
    }
}
