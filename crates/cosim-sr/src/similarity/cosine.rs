//! Cosine similarity over sparse vectors.

use super::{admits, FeatureMatrices, SimilarityAlgorithm};
use crate::error::Result;
use crate::leaderboard::Leaderboard;
use crate::types::{ItemId, SparseVector, SrResultList};
use std::collections::{HashMap, HashSet};

/// `dot(a, b) / (|a| * |b|)`, or 0 when either vector has zero norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineSimilarity;

impl CosineSimilarity {
    pub fn new() -> Self {
        Self
    }

    /// Accumulates dot products through the transpose, then normalizes and ranks.
    fn rank(
        &self,
        matrices: &FeatureMatrices,
        query: impl Iterator<Item = (ItemId, f32)>,
        query_norm: f64,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList> {
        if query_norm == 0.0 || k == 0 {
            return Ok(SrResultList::new());
        }
        let stats = matrices.stats()?;

        let mut dots: HashMap<ItemId, f64> = HashMap::new();
        for (col, v1) in query {
            let Some(column) = matrices.transpose().get_row(col)? else {
                continue;
            };
            for (id2, v2) in column.iter() {
                if admits(valid_ids, id2) {
                    *dots.entry(id2).or_insert(0.0) += v1 as f64 * v2 as f64;
                }
            }
        }

        let mut candidates: Vec<(ItemId, f64)> = dots.into_iter().collect();
        candidates.sort_unstable_by_key(|&(id, _)| id);

        let mut leaderboard = Leaderboard::new(k);
        for (id2, dot) in candidates {
            let norm2 = stats.norm(id2).unwrap_or(0.0);
            if norm2 == 0.0 {
                continue;
            }
            let score = (dot / (norm2 * query_norm)).clamp(-1.0, 1.0);
            leaderboard.tally(id2, score);
        }
        Ok(leaderboard.top())
    }
}

fn vector_norm(v: &SparseVector) -> f64 {
    v.values()
        .map(|&x| (x as f64) * (x as f64))
        .sum::<f64>()
        .sqrt()
}

impl SimilarityAlgorithm for CosineSimilarity {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn min_value(&self) -> f64 {
        -1.0
    }

    fn max_value(&self) -> f64 {
        1.0
    }

    fn pairwise_score(&self, a: &SparseVector, b: &SparseVector) -> Result<f64> {
        let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        let dot: f64 = small
            .iter()
            .filter_map(|(id, &x)| large.get(id).map(|&y| x as f64 * y as f64))
            .sum();
        let denom = vector_norm(a) * vector_norm(b);
        if denom == 0.0 {
            return Ok(0.0);
        }
        Ok((dot / denom).clamp(-1.0, 1.0))
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
        self.rank(matrices, row.iter(), row.norm(), k, valid_ids)
    }

    fn most_similar_to_vector(
        &self,
        matrices: &FeatureMatrices,
        vector: &SparseVector,
        k: usize,
        valid_ids: Option<&HashSet<ItemId>>,
    ) -> Result<SrResultList> {
        let query = vector.iter().map(|(&c, &v)| (c, v));
        self.rank(matrices, query, vector_norm(vector), k, valid_ids)
    }
}
