//! Benchmarks for most-similar queries over in-memory feature matrices.

use cosim_matrix::{transpose, InMemoryMatrix, SparseMatrix, SparseRow, ValueConf};
use cosim_sr::{
    ContainmentSimilarity, CosineSimilarity, FeatureMatrices, ItemId, SimilarityAlgorithm,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

const FEATURES: u32 = 5_000;
const FEATURES_PER_ROW: usize = 40;

fn generate_matrices(dir: &TempDir, rows: u32, indicator: bool) -> FeatureMatrices {
    let mut rng = StdRng::seed_from_u64(42);
    let sparse_rows = (0..rows).map(|id| {
        let cells: HashMap<ItemId, f32> = (0..FEATURES_PER_ROW)
            .map(|_| {
                let value = if indicator { 1.0 } else { rng.gen_range(0.1..2.0) };
                (rng.gen_range(0..FEATURES), value)
            })
            .collect();
        SparseRow::from_map(id, &cells).unwrap()
    });
    let features = InMemoryMatrix::from_rows(ValueConf::unbounded(), sparse_rows).unwrap();

    let path = dir.path().join(format!("transpose-{}-{}", rows, indicator));
    transpose(&features, &path).unwrap();
    let transposed = SparseMatrix::open(&path).unwrap();
    FeatureMatrices::new(Arc::new(features), Arc::new(transposed))
}

fn bench_algorithm(c: &mut Criterion, name: &str, algorithm: &dyn SimilarityAlgorithm, indicator: bool) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group(name);

    for rows in [1_000u32, 10_000, 50_000].iter() {
        let matrices = generate_matrices(&dir, *rows, indicator);
        matrices.stats().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |bencher, &rows| {
            let mut id = 0;
            bencher.iter(|| {
                id = (id + 7919) % rows;
                algorithm
                    .most_similar(black_box(&matrices), black_box(id), 100, None)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_cosine(c: &mut Criterion) {
    bench_algorithm(c, "cosine_most_similar", &CosineSimilarity::new(), false);
}

fn bench_containment(c: &mut Criterion) {
    bench_algorithm(c, "containment_most_similar", &ContainmentSimilarity::new(None), true);
}

criterion_group!(benches, bench_cosine, bench_containment);
criterion_main!(benches);
