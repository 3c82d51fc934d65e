//! Property-based tests for top-k selection and the similarity algorithms.

use cosim_matrix::{transpose, InMemoryMatrix, SparseMatrix, SparseRow, ValueConf};
use cosim_sr::{
    ContainmentSimilarity, CosineSimilarity, FeatureMatrices, ItemId, Leaderboard,
    SimilarityAlgorithm, SparseVector, SrError,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tempfile::TempDir;

fn arb_vector() -> impl Strategy<Value = SparseVector> {
    prop::collection::hash_map(0u32..20, -5.0f32..5.0, 0..10)
}

fn arb_indicator() -> impl Strategy<Value = SparseVector> {
    prop::collection::hash_map(0u32..20, Just(1.0f32), 0..10)
}

fn arb_corpus() -> impl Strategy<Value = BTreeMap<ItemId, HashMap<ItemId, f32>>> {
    prop::collection::btree_map(
        0u32..60,
        prop::collection::hash_map(0u32..30, 0.1f32..5.0, 1..8),
        1..25,
    )
}

fn in_memory(
    dir: &TempDir,
    corpus: &BTreeMap<ItemId, HashMap<ItemId, f32>>,
) -> FeatureMatrices {
    let rows = corpus
        .iter()
        .map(|(&id, cells)| SparseRow::from_map(id, cells).unwrap());
    let features = InMemoryMatrix::from_rows(ValueConf::unbounded(), rows).unwrap();
    let path = dir.path().join("transpose");
    transpose(&features, &path).unwrap();
    let transposed = SparseMatrix::open(&path).unwrap();
    FeatureMatrices::new(Arc::new(features), Arc::new(transposed))
}

proptest! {
    #[test]
    fn prop_leaderboard_is_stable_top_k(
        entries in prop::collection::vec((0u32..50, 0i32..10), 0..60),
        k in 0usize..12,
    ) {
        let mut board = Leaderboard::new(k);
        for &(id, score) in &entries {
            board.tally(id, score as f64);
        }
        let got: Vec<(ItemId, f64)> = board.top().iter().map(|r| (r.id, r.score)).collect();

        let mut expected: Vec<(ItemId, f64)> =
            entries.iter().map(|&(id, s)| (id, s as f64)).collect();
        expected.sort_by(|a, b| b.1.total_cmp(&a.1));
        expected.truncate(k);

        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_cosine_symmetric_and_bounded(a in arb_vector(), b in arb_vector()) {
        let cos = CosineSimilarity::new();
        let ab = cos.pairwise_score(&a, &b).unwrap();
        let ba = cos.pairwise_score(&b, &a).unwrap();
        prop_assert!((ab - ba).abs() < 1e-9);
        prop_assert!((-1.0..=1.0).contains(&ab));

        let norm: f64 = a.values().map(|&v| (v as f64) * (v as f64)).sum();
        if norm > 0.0 {
            prop_assert!((cos.pairwise_score(&a, &a).unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_containment_symmetric_or_undefined(
        a in arb_indicator(),
        b in arb_indicator(),
        total_rows in 1usize..100,
    ) {
        let sim = ContainmentSimilarity::new(Some(total_rows));
        match (sim.pairwise_score(&a, &b), sim.pairwise_score(&b, &a)) {
            (Ok(ab), Ok(ba)) => {
                prop_assert!((ab - ba).abs() < 1e-12);
                prop_assert!((-1.0..=1.0).contains(&ab));
            }
            (Err(SrError::UndefinedSimilarity { .. }), Err(SrError::UndefinedSimilarity { .. })) => {}
            (x, y) => prop_assert!(false, "asymmetric outcome: {:?} / {:?}", x, y),
        }
    }

    #[test]
    fn prop_cosine_most_similar_matches_pairwise(corpus in arb_corpus(), k in 1usize..10) {
        let dir = TempDir::new().unwrap();
        let matrices = in_memory(&dir, &corpus);
        let cos = CosineSimilarity::new();

        for &id in corpus.keys() {
            let query = matrices.vector(id).unwrap().unwrap();
            let mut expected: Vec<f64> = corpus
                .keys()
                .map(|&other| {
                    let v = matrices.vector(other).unwrap().unwrap();
                    cos.pairwise_score(&query, &v).unwrap()
                })
                .filter(|&s| s > 0.0)
                .collect();
            expected.sort_by(|a, b| b.total_cmp(a));
            expected.truncate(k);

            let got = cos.most_similar(&matrices, id, k, None).unwrap();
            prop_assert_eq!(got.len(), expected.len());
            for (g, e) in got.scores().iter().zip(&expected) {
                prop_assert!((g - e).abs() < 1e-6, "{} vs {}", g, e);
            }
        }
    }
}
