//! Performance benchmarks for the Treeline engine
//!
//! Tracks commit throughput, history reconstruction time, diff
//! computation, and content store round-trips.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::time::Duration;
use treeline::{ContentStore, InMemoryStore, ManualClock, Treeline, TreelineBuilder};

fn engine() -> Treeline {
    TreelineBuilder::new()
        .clock(ManualClock::new(1))
        .build_in_memory()
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random()).collect()
}

/// Benchmark committing change sets of varying size
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    for file_count in [10usize, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(file_count),
            file_count,
            |b, &file_count| {
                let mut rng = StdRng::seed_from_u64(42);
                let contents: Vec<Vec<u8>> = (0..file_count)
                    .map(|_| random_bytes(&mut rng, 256))
                    .collect();
                b.iter(|| {
                    let mut engine = engine();
                    engine.begin_change_set();
                    engine.create_directory("dir").unwrap();
                    for (i, content) in contents.iter().enumerate() {
                        engine
                            .create_file(format!("dir/file_{}", i), content)
                            .unwrap();
                    }
                    engine.end_change_set().unwrap();
                    black_box(engine.history().len());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark reconstructing the tree at the oldest point of a history
fn bench_time_travel(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_travel");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    for set_count in [10usize, 100, 500].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(set_count),
            set_count,
            |b, &set_count| {
                let mut engine = engine();
                engine.create_file("file", b"v0").unwrap();
                for i in 0..set_count {
                    engine
                        .change_content("file", format!("v{}", i + 1).as_bytes())
                        .unwrap();
                }
                let labels = engine.labels_for(&"file".into()).unwrap();
                let oldest = labels.last().unwrap().clone();
                b.iter(|| {
                    let tree = engine.tree_at(&oldest).unwrap();
                    black_box(tree);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark diffing two snapshots of a wide tree
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(7);
    let mut engine = engine();
    engine.begin_change_set();
    engine.create_directory("dir").unwrap();
    for i in 0..200 {
        engine
            .create_file(format!("dir/file_{}", i), &random_bytes(&mut rng, 128))
            .unwrap();
    }
    engine.end_change_set().unwrap();
    // Touch a tenth of the files
    for i in (0..200).step_by(10) {
        engine
            .change_content(format!("dir/file_{}", i), &random_bytes(&mut rng, 128))
            .unwrap();
    }
    let labels = engine.labels();
    let oldest = labels.last().unwrap().clone();
    let newest = labels[0].clone();

    group.bench_function("200_files_10pct_changed", |b| {
        b.iter(|| {
            let diff = engine.diff(&oldest, &newest).unwrap();
            black_box(diff.change_count());
        });
    });

    group.finish();
}

/// Benchmark deduplicated store round-trips
fn bench_content_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_store");
    group.measurement_time(Duration::from_secs(2));

    let mut rng = StdRng::seed_from_u64(99);
    let blobs: Vec<Vec<u8>> = (0..64).map(|_| random_bytes(&mut rng, 4096)).collect();

    group.bench_function("store_and_load_4k", |b| {
        b.iter(|| {
            let mut store = InMemoryStore::new();
            let ids: Vec<u64> = blobs.iter().map(|b| store.store(b).unwrap()).collect();
            for id in &ids {
                black_box(store.load(*id).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_commit,
    bench_time_travel,
    bench_diff,
    bench_content_store
);
criterion_main!(benches);
