//! Bounded top-k selection.

use crate::types::{ItemId, SrResult, SrResultList};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    score: f64,
    seq: u64,
    id: ItemId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Among equal scores the later tally ranks lower, so it is evicted first.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Keeps the `capacity` highest-scoring `(id, score)` pairs seen.
///
/// A full leaderboard admits a new entry only if it scores strictly higher than
/// the current minimum. Repeated ids are kept as independent entries. NaN
/// scores are ignored.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    capacity: usize,
    heap: BinaryHeap<Reverse<Entry>>,
    seq: u64,
}

impl Leaderboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Lowest score currently held.
    pub fn min_score(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(e)| e.score)
    }

    pub fn tally(&mut self, id: ItemId, score: f64) {
        if self.capacity == 0 || score.is_nan() {
            return;
        }
        let entry = Entry {
            score,
            seq: self.seq,
            id,
        };
        self.seq += 1;

        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(entry));
            return;
        }
        if let Some(mut min) = self.heap.peek_mut() {
            if score > min.0.score {
                *min = Reverse(entry);
            }
        }
    }

    /// Consumes the leaderboard, returning its entries by descending score.
    ///
    /// Equal scores keep the order in which they were tallied.
    pub fn top(self) -> SrResultList {
        let mut entries: Vec<Entry> = self.heap.into_iter().map(|Reverse(e)| e).collect();
        entries.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.seq.cmp(&b.seq)));
        entries
            .into_iter()
            .map(|e| SrResult::new(e.id, e.score))
            .collect()
    }
}
