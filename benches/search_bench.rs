//! Benchmarks for beam search and insert throughput.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use diskvec::graph::{GraphIndex, SearchOptions};
use diskvec::host::mem::MemEngine;
use diskvec::host::{StorageEngine, TableRef};
use diskvec::meta::IndexOptions;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

const DIM: usize = 64;

fn generate_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn build(n: usize) -> (MemEngine, GraphIndex, Vec<Vec<f32>>) {
    let mut engine = MemEngine::new();
    engine
        .execute_ddl(
            "CREATE TABLE \"main\".\"t_blocks\" (\"rowid\" INTEGER PRIMARY KEY, \"data\" BLOB)",
        )
        .unwrap();
    let mut options = IndexOptions::new(DIM);
    options.build_search_list = 64;
    options.search_list = 64;
    let mut index = GraphIndex::open(TableRef::new("main", "t_blocks"), options).unwrap();
    let vectors = generate_vectors(n, 42);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(&mut engine, i as u64 + 1, v).unwrap();
    }
    (engine, index, vectors)
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("beam_search_top10");
    group.sample_size(20);
    for n in [500usize, 2000] {
        let (engine, mut index, _vectors) = build(n);
        let queries = generate_vectors(50, 7);
        let mut cursor = 0usize;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, _| {
            bencher.iter(|| {
                let q = &queries[cursor % queries.len()];
                cursor += 1;
                let hits = index
                    .search(&engine, black_box(q), 10, &SearchOptions::default())
                    .unwrap();
                black_box(hits)
            });
        });
    }
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.sample_size(10);
    group.bench_function("into_1000", |bencher| {
        let (mut engine, mut index, _) = build(1000);
        let extra = generate_vectors(10_000, 9);
        let mut next = 10_001u64;
        let mut cursor = 0usize;
        bencher.iter(|| {
            let v = &extra[cursor % extra.len()];
            cursor += 1;
            index.insert(&mut engine, next, black_box(v)).unwrap();
            next += 1;
        });
    });
    group.finish();
}

criterion_group!(benches, bench_search, bench_insert);
criterion_main!(benches);
