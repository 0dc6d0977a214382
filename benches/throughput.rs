//! Throughput Benchmark for dotkv
//!
//! This benchmark measures the performance of the key-value store
//! under various workloads. The store runs without a snapshot file so
//! the numbers reflect the in-memory paths only.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dotkv::storage::{KeyValueStore, SetEntry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Builds a store holding `count` keys spread over `groups` dotted parents
fn populated(count: usize, groups: usize) -> KeyValueStore {
    let store = KeyValueStore::new();
    let entries = (0..count)
        .map(|i| SetEntry::new(format!("group{}.key{}", i % groups, i), json!(i), 0))
        .collect();
    store.set(entries).expect("populate store");
    store
}

/// Benchmark Set operations
fn bench_set(c: &mut Criterion) {
    let store = Arc::new(KeyValueStore::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_single", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let entry = SetEntry::new(format!("key:{}", i), "small_value", 0);
            black_box(store.set(vec![entry]).unwrap());
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let entry = SetEntry::new(format!("ttl:{}", i), "small_value", 3600);
            black_box(store.set(vec![entry]).unwrap());
            i += 1;
        });
    });

    group.throughput(Throughput::Elements(100));
    group.bench_function("set_batch_100", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let entries = (0..100)
                .map(|j| SetEntry::new(format!("batch:{}:{}", i, j), json!({"n": j}), 0))
                .collect();
            black_box(store.set(entries).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark Get operations
fn bench_get(c: &mut Criterion) {
    let store = populated(100_000, 100);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_exact", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let key = format!("group{}.key{}", i % 100, i % 100_000);
            black_box(store.get(&[key]).unwrap());
            i += 1;
        });
    });

    // Each parent has 1000 children to merge
    group.bench_function("get_hierarchical", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let key = format!("group{}", i % 100);
            black_box(store.get(&[key]).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(&[key]).is_err());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark Search operations
fn bench_search(c: &mut Criterion) {
    let store = populated(10_000, 10);

    let mut group = c.benchmark_group("search");
    group.throughput(Throughput::Elements(1));

    group.bench_function("search_early_match", |b| {
        b.iter(|| {
            black_box(store.search("group0.key0"));
        });
    });

    group.bench_function("search_no_match", |b| {
        b.iter(|| {
            black_box(store.search("absent"));
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(KeyValueStore::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..1_000 {
                            let key = format!("thread{}.key{}", t, i);
                            store
                                .set(vec![SetEntry::new(key.clone(), "value", 0)])
                                .unwrap();
                            store.get(&[key]).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_search,
    bench_concurrent,
);

criterion_main!(benches);
