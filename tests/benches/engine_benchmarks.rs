//! # bloombox benchmarks
//!
//! Throughput checks for the three hot paths: hashing a record into its
//! positions, feeding rows, and the full-scan count.

use std::sync::Arc;

use bloombox_filter::{derive_positions, DataPoint, FilterSizing, HashGenerator};
use bloombox_query::{
    EngineOptions, Expression, PreparationContext, Query, QueryExecutionEngine,
};
use bloombox_store::{Feeder, MemoryStore, RecordStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parking_lot::Mutex;
use rand::Rng;

fn sizing() -> FilterSizing {
    FilterSizing::from_elements_and_fpr(32, 0.0001).unwrap()
}

fn bench_derive_positions(c: &mut Criterion) {
    let sizing = sizing();
    let hasher = HashGenerator::new();
    let point = DataPoint::new("color", "red");

    c.bench_function("derive_positions", |b| {
        b.iter(|| black_box(derive_positions(&sizing, &hasher, &point.parts())))
    });
}

fn bench_feed_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed");
    let rows = 10_000u64;
    group.throughput(Throughput::Elements(rows));

    group.bench_function("feed_10k_rows", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let store = Arc::new(Mutex::new(MemoryStore::new(sizing(), rows, "bench")));
            let mut feeder = Feeder::new(store.clone());
            for _ in 0..rows {
                let color = ["red", "blue", "green"][rng.gen_range(0..3)];
                feeder
                    .add_row(&[
                        DataPoint::new("color", color),
                        DataPoint::new("id", rng.gen::<u32>().to_string()),
                    ])
                    .unwrap();
            }
            black_box(store.lock().rows_fed())
        })
    });
    group.finish();
}

fn bench_scan_count(c: &mut Criterion) {
    let rows = 10_000u64;
    let store = Arc::new(Mutex::new(MemoryStore::new(sizing(), rows, "bench")));
    let mut feeder = Feeder::new(store.clone());
    for row in 0..rows {
        let color = ["red", "blue", "green"][row as usize % 3];
        feeder.add_row(&[DataPoint::new("color", color)]).unwrap();
    }
    let mut store = Arc::into_inner(store).unwrap().into_inner();
    store.feeding_complete().unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(rows));
    group.bench_function("count_10k_rows", |b| {
        b.iter(|| {
            let mut engine = QueryExecutionEngine::new(
                PreparationContext::new(sizing(), HashGenerator::new()),
                EngineOptions::default(),
            );
            engine.add_query(Query::new(
                "red_or_blue",
                Expression::or(vec![
                    Expression::matches("color", "red"),
                    Expression::matches("color", "blue"),
                ]),
            ));
            black_box(engine.execute(&store).unwrap())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_derive_positions,
    bench_feed_rows,
    bench_scan_count
);
criterion_main!(benches);
