//! Link-overlap similarity in the style of the Normalized Google Distance.
//!
//! Vectors are read as indicator sets: a column is a member when its value is
//! 1.0 (within [`INDICATOR_TOLERANCE`](super::INDICATOR_TOLERANCE)). For sets
//! `A` and `B` drawn from a corpus of `N` rows:
//!
//! ```text
//! sim = 1 - (ln(max(|A|,|B|)) - ln(|A ∩ B|)) / (ln(N) - ln(min(|A|,|B|)))
//! ```

use super::{admits, is_indicator, FeatureMatrices, SimilarityAlgorithm};
use crate::error::{Result, SrError};
use crate::leaderboard::Leaderboard;
use crate::types::{ItemId, SparseVector, SrResultList};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainmentSimilarity {
    total_rows: Option<usize>,
}

impl ContainmentSimilarity {
    /// `total_rows` is the corpus size `N`; `None` uses the feature matrix row count.
    pub fn new(total_rows: Option<usize>) -> Self {
        Self { total_rows }
    }

    pub fn total_rows(&self) -> Option<usize> {
        self.total_rows
    }

    fn corpus_size(&self, matrices: &FeatureMatrices) -> Result<usize> {
        match self.total_rows {
            Some(n) => Ok(n),
            None => Ok(matrices.stats()?.num_rows()),
        }
    }

    fn rank(
        &self,
        matrices: &FeatureMatrices,
        members: &[ItemId],
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList> {
        if members.is_empty() || k == 0 {
            return Ok(SrResultList::new());
        }
        let total_rows = self.corpus_size(matrices)?;
        let stats = matrices.stats()?;

        let mut intersections: HashMap<ItemId, usize> = HashMap::new();
        for &col in members {
            let Some(column) = matrices.transpose().get_row(col)? else {
                continue;
            };
            for (id2, v) in column.iter() {
                if is_indicator(v) && admits(valid_ids, id2) {
                    *intersections.entry(id2).or_insert(0) += 1;
                }
            }
        }

        let mut candidates: Vec<(ItemId, usize)> = intersections.into_iter().collect();
        candidates.sort_unstable_by_key(|&(id, _)| id);

        let mut leaderboard = Leaderboard::new(k);
        let mut undefined = 0usize;
        for (id2, intersection) in candidates {
            let size_b = stats.indicator_size(id2).unwrap_or(intersection);
            match containment_score(members.len(), size_b, intersection, total_rows) {
                Ok(score) => leaderboard.tally(id2, score),
                Err(SrError::UndefinedSimilarity { .. }) => undefined += 1,
                Err(e) => return Err(e),
            }
        }
        if undefined > 0 {
            tracing::debug!(undefined, total_rows, "skipped candidates with undefined similarity");
        }
        Ok(leaderboard.top())
    }
}

fn indicator_members(v: &SparseVector) -> Vec<ItemId> {
    let mut members: Vec<ItemId> = v
        .iter()
        .filter(|&(_, &x)| is_indicator(x))
        .map(|(&id, _)| id)
        .collect();
    members.sort_unstable();
    members
}

/// Scores one pair from its set sizes, clamped to `[-1, 1]`.
///
/// Undefined when the sets do not intersect or the smaller set already spans
/// the whole corpus.
pub(crate) fn containment_score(
    size_a: usize,
    size_b: usize,
    intersection: usize,
    total_rows: usize,
) -> Result<f64> {
    let undefined = || SrError::UndefinedSimilarity {
        size_a,
        size_b,
        intersection,
        total_rows,
    };
    if intersection == 0 || size_a == 0 || size_b == 0 || total_rows == 0 {
        return Err(undefined());
    }
    let (lo, hi) = if size_a <= size_b {
        (size_a, size_b)
    } else {
        (size_b, size_a)
    };
    let denom = (total_rows as f64).ln() - (lo as f64).ln();
    if denom <= 0.0 {
        return Err(undefined());
    }
    let score = 1.0 - ((hi as f64).ln() - (intersection as f64).ln()) / denom;
    Ok(score.clamp(-1.0, 1.0))
}

impl SimilarityAlgorithm for ContainmentSimilarity {
    fn name(&self) -> &'static str {
        "containment"
    }

    fn min_value(&self) -> f64 {
        -1.0
    }

    fn max_value(&self) -> f64 {
        1.0
    }

    /// Needs a configured corpus size; use `pairwise_score_in` inside a cache.
    fn pairwise_score(&self, a: &SparseVector, b: &SparseVector) -> Result<f64> {
        let total_rows = self.total_rows.ok_or_else(|| {
            SrError::Config("containment scoring outside a cache needs total_rows".to_string())
        })?;
        score_vectors(a, b, total_rows)
    }

    fn pairwise_score_in(
        &self,
        matrices: &FeatureMatrices,
        a: &SparseVector,
        b: &SparseVector,
    ) -> Result<f64> {
        score_vectors(a, b, self.corpus_size(matrices)?)
    }

    fn most_similar(
        &self,
        matrices: &FeatureMatrices,
        id: ItemId,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList> {
        let Some(row) = matrices.features().get_row(id)? else {
            tracing::debug!(id, "no feature row for item");
            return Ok(SrResultList::new());
        };
        let members: Vec<ItemId> = row
            .iter()
            .filter(|&(_, v)| is_indicator(v))
            .map(|(c, _)| c)
            .collect();
        self.rank(matrices, &members, k, valid_ids)
    }

    fn most_similar_to_vector(
        &self,
        matrices: &FeatureMatrices,
        vector: &SparseVector,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList> {
        self.rank(matrices, &indicator_members(vector), k, valid_ids)
    }
}

fn score_vectors(a: &SparseVector, b: &SparseVector, total_rows: usize) -> Result<f64> {
    let a = indicator_members(a);
    let b: HashSet<ItemId> = indicator_members(b).into_iter().collect();
    let intersection = a.iter().filter(|id| b.contains(id)).count();
    containment_score(a.len(), b.len(), intersection, total_rows)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::matrices;
    use super::*;

    fn set(ids: &[ItemId]) -> SparseVector {
        ids.iter().map(|&id| (id, 1.0)).collect()
    }

    #[test]
    fn test_score_formula() {
        // |A| = 10, |B| = 20, |A ∩ B| = 5, N = 1000
        let s = containment_score(10, 20, 5, 1000).unwrap();
        let expected = 1.0 - (20f64.ln() - 5f64.ln()) / (1000f64.ln() - 10f64.ln());
        assert!((s - expected).abs() < 1e-12);
        assert_eq!(s, containment_score(20, 10, 5, 1000).unwrap());

        // Identical sets score 1.
        assert!((containment_score(7, 7, 7, 100).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_cases() {
        assert!(matches!(
            containment_score(3, 4, 0, 100),
            Err(SrError::UndefinedSimilarity { intersection: 0, .. })
        ));
        assert!(matches!(
            containment_score(100, 100, 100, 100),
            Err(SrError::UndefinedSimilarity { .. })
        ));
    }

    #[test]
    fn test_pairwise_needs_corpus_size() {
        let a = set(&[1, 2, 3]);
        let b = set(&[3, 4]);
        assert!(matches!(
            ContainmentSimilarity::new(None).pairwise_score(&a, &b),
            Err(SrError::Config(_))
        ));
        let s = ContainmentSimilarity::new(Some(50)).pairwise_score(&a, &b).unwrap();
        assert_eq!(s, containment_score(3, 2, 1, 50).unwrap());
        assert!(matches!(
            ContainmentSimilarity::new(Some(50)).pairwise_score(&a, &set(&[9])),
            Err(SrError::UndefinedSimilarity { .. })
        ));
    }

    #[test]
    fn test_non_indicator_values_ignored() {
        let a: SparseVector = [(1, 1.0), (2, 0.3)].into_iter().collect();
        let b: SparseVector = [(1, 1.0), (2, 1.0)].into_iter().collect();
        let s = ContainmentSimilarity::new(Some(100)).pairwise_score(&a, &b).unwrap();
        assert_eq!(s, containment_score(1, 2, 1, 100).unwrap());
    }

    #[test]
    fn test_most_similar_through_transpose() {
        let ones = |ids: &[ItemId]| ids.iter().map(|&c| (c, 1.0)).collect::<Vec<_>>();
        let r1 = ones(&[10, 11, 12]);
        let r2 = ones(&[10, 11]);
        let r3 = ones(&[12, 13, 14, 15]);
        let r4 = ones(&[20]);
        let m = matrices(&[(1, &r1), (2, &r2), (3, &r3), (4, &r4)]);
        let sim = ContainmentSimilarity::new(Some(1000));

        let results = sim.most_similar(&m, 1, 10, None).unwrap();
        assert_eq!(results.ids(), vec![1, 2, 3]);
        assert!(!results.contains_id(4));
        assert_eq!(results.score_of(2), Some(containment_score(3, 2, 2, 1000).unwrap()));

        let valid: HashSet<ItemId> = [3].into_iter().collect();
        assert_eq!(sim.most_similar(&m, 1, 10, Some(&valid)).unwrap().ids(), vec![3]);
        assert!(sim.most_similar(&m, 42, 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_undefined_candidates_left_out() {
        let m = matrices(&[
            (1, &[(10, 1.0), (11, 1.0)]),
            (2, &[(10, 1.0), (11, 1.0)]),
            (3, &[(10, 1.0)]),
        ]);
        // With N = 2, pairs whose smaller set has two members have ln N - ln min = 0.
        let sim = ContainmentSimilarity::new(Some(2));

        let results = sim.most_similar(&m, 1, 10, None).unwrap();
        assert_eq!(results.ids(), vec![3]);
        assert!(!results.contains_id(1));
        assert!(!results.contains_id(2));
    }

    #[test]
    fn test_default_corpus_size_is_row_count() {
        let m = matrices(&[(1, &[(10, 1.0)]), (2, &[(10, 1.0), (11, 1.0)])]);
        let sim = ContainmentSimilarity::new(None);
        let s = sim.pairwise_score_in(&m, &set(&[10]), &set(&[10, 11])).unwrap();
        assert_eq!(s, containment_score(1, 2, 1, 2).unwrap());

        let results = sim.most_similar(&m, 1, 5, None).unwrap();
        assert_eq!(results.ids(), vec![1, 2]);
    }
}
