//! Result and vector types shared across the crate.

use std::collections::HashMap;

pub use cosim_matrix::ItemId;

/// Sparse feature vector: column id to weight. Only non-zero entries are stored.
pub type SparseVector = HashMap<ItemId, f32>;

/// One scored partner of a query item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrResult {
    pub id: ItemId,
    pub score: f64,
}

impl SrResult {
    pub fn new(id: ItemId, score: f64) -> Self {
        Self { id, score }
    }
}

/// A ranked list of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SrResultList {
    results: Vec<SrResult>,
}

impl SrResultList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ItemId, score: f64) {
        self.results.push(SrResult::new(id, score));
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&SrResult> {
        self.results.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SrResult> {
        self.results.iter()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.results.iter().map(|r| r.id).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.score).collect()
    }

    /// Stable sort by descending score.
    pub fn sort_descending(&mut self) {
        self.results.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    pub fn truncate(&mut self, k: usize) {
        self.results.truncate(k);
    }

    pub fn contains_id(&self, id: ItemId) -> bool {
        self.results.iter().any(|r| r.id == id)
    }

    pub fn score_of(&self, id: ItemId) -> Option<f64> {
        self.results.iter().find(|r| r.id == id).map(|r| r.score)
    }
}

impl From<Vec<SrResult>> for SrResultList {
    fn from(results: Vec<SrResult>) -> Self {
        Self { results }
    }
}

impl FromIterator<SrResult> for SrResultList {
    fn from_iter<I: IntoIterator<Item = SrResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SrResultList {
    type Item = SrResult;
    type IntoIter = std::vec::IntoIter<SrResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a SrResultList {
    type Item = &'a SrResult;
    type IntoIter = std::slice::Iter<'a, SrResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_descending_is_stable() {
        let mut list: SrResultList = vec![
            SrResult::new(1, 0.2),
            SrResult::new(2, 0.9),
            SrResult::new(3, 0.2),
            SrResult::new(4, -0.5),
        ]
        .into();
        list.sort_descending();
        assert_eq!(list.ids(), vec![2, 1, 3, 4]);
        assert_eq!(list.score_of(4), Some(-0.5));
        assert!(!list.contains_id(5));
    }
}
