//! Benchmarks comparing insert/search cost across the five index variants.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use vectorlite::{
    FlatConfig, FlatIndex, HnswConfig, HnswIndex, Index, MemoryStorage,
};

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn benchmark_flat_search(c: &mut Criterion) {
    let index = FlatIndex::new(FlatConfig::default()).unwrap();
    index.initialize(Arc::new(MemoryStorage::new())).unwrap();
    let vectors = random_vectors(2_000, 32, 1);
    index.insert(vectors.clone(), vec![None; 2_000]).unwrap();

    c.bench_function("flat_search_k10", |b| {
        b.iter(|| index.search(black_box(&vectors[0]), black_box(10)).unwrap())
    });
}

fn benchmark_hnsw_search(c: &mut Criterion) {
    let index = HnswIndex::new(HnswConfig::default()).unwrap();
    index.initialize(Arc::new(MemoryStorage::new())).unwrap();
    let vectors = random_vectors(2_000, 32, 2);
    index.insert(vectors.clone(), vec![None; 2_000]).unwrap();

    c.bench_function("hnsw_search_k10", |b| {
        b.iter(|| index.search(black_box(&vectors[0]), black_box(10)).unwrap())
    });
}

criterion_group!(benches, benchmark_flat_search, benchmark_hnsw_search);
criterion_main!(benches);
