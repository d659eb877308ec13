//! Performance benchmarks for muster-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use muster_engine::{
    AddOptions, Collection, CollectionConfig, IdSource, SetOptions, fixed_time,
};
use serde_json::{json, Value};

fn test_collection() -> Collection {
    Collection::new(
        CollectionConfig::new("bench")
            .with_ids(IdSource::new("b"))
            .with_time(fixed_time(1000)),
    )
}

fn snapshot(size: u64, round: u64) -> Vec<Value> {
    (0..size)
        .map(|k| json!({"id": k, "name": format!("item-{}", k), "round": round}))
        .collect()
}

fn bench_collection_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_operations");

    group.bench_function("collection_new", |b| {
        b.iter(|| Collection::new(black_box(CollectionConfig::new("bench"))))
    });

    group.bench_function("add_one", |b| {
        let mut collection = test_collection();
        let mut id = 0u64;
        b.iter(|| {
            id += 1;
            collection.add_one(
                black_box(json!({"id": id, "name": "item"})),
                &AddOptions::default(),
            )
        })
    });

    group.bench_function("get_record", |b| {
        let mut collection = test_collection();
        collection
            .set(snapshot(1000, 0), &SetOptions::default())
            .unwrap();
        b.iter(|| collection.get(black_box(&json!(500))))
    });

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for size in [10u64, 100, 500] {
        // Identical snapshot: pure matching cost, empty delta.
        group.bench_with_input(BenchmarkId::new("noop_set", size), &size, |b, &size| {
            let mut collection = test_collection();
            collection
                .set(snapshot(size, 0), &SetOptions::default())
                .unwrap();
            b.iter(|| {
                collection
                    .set(black_box(snapshot(size, 0)), &SetOptions::default())
                    .unwrap()
            })
        });

        // Every record changes each round.
        group.bench_with_input(BenchmarkId::new("full_change", size), &size, |b, &size| {
            let mut collection = test_collection();
            collection
                .set(snapshot(size, 0), &SetOptions::default())
                .unwrap();
            let mut round = 0u64;
            b.iter(|| {
                round += 1;
                collection
                    .set(black_box(snapshot(size, round)), &SetOptions::default())
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collection_operations, bench_reconcile);
criterion_main!(benches);
