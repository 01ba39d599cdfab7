//! Query Performance Benchmarks
//!
//! Measures the overhead the builder and executor add on top of the driver:
//! - Builder: cost of chaining (no I/O)
//! - Constraint evaluation: in-process matching
//! - Resolution: read, update and insert paths over the in-memory driver
//!
//! Run with: `cargo bench --bench query_benchmarks`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use docquery_core::constraint::{Constraint, Operator, matches_all};
use docquery_core::doc;
use docquery_runtime::Client;
use docquery_testing::{InMemoryDocumentStore, SequentialIdGenerator, test_clock};

fn seeded_store(size: usize) -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new();
    for n in 0..size {
        let status = if n % 3 == 0 { "draft" } else { "published" };
        let city = if n % 2 == 0 { "Lyon" } else { "Paris" };
        store.seed(
            "events",
            format!("e{n:06}"),
            doc!({
                "name": format!("Event {n}"),
                "status": status,
                "price": n % 100,
                "venue": { "city": city }
            }),
        );
    }
    store
}

fn client(store: &InMemoryDocumentStore) -> Client {
    Client::builder(store.clone())
        .clock(test_clock())
        .id_generator(SequentialIdGenerator::new("bench"))
        .build()
}

/// Benchmark builder chaining
fn benchmark_builder(c: &mut Criterion) {
    let mut group = c.benchmark_group("builder");
    group.throughput(Throughput::Elements(1));

    let client = client(&InMemoryDocumentStore::new());

    group.bench_function("read_chain", |b| {
        b.iter(|| {
            black_box(
                client
                    .collection("events")
                    .select("id, name, price")
                    .eq("status", "published")
                    .gte("price", 10)
                    .order_desc("price")
                    .limit(20),
            );
        });
    });

    group.bench_function("mutation_from_read", |b| {
        let query = client.collection("events").eq("status", "draft");
        b.iter(|| {
            black_box(query.update(doc!({ "status": "archived" })));
        });
    });

    group.finish();
}

/// Benchmark in-process constraint evaluation
fn benchmark_constraints(c: &mut Criterion) {
    let mut group = c.benchmark_group("constraints");
    group.throughput(Throughput::Elements(1));

    let document = doc!({
        "status": "published",
        "price": 42,
        "tags": ["music", "jazz"],
        "venue": { "city": "Lyon" }
    });
    let constraints = vec![
        Constraint::new("status", Operator::Eq, "published"),
        Constraint::new("price", Operator::Lte, 50),
        Constraint::new("tags", Operator::ArrayContains, "jazz"),
        Constraint::new("venue.city", Operator::In, vec!["Lyon", "Paris"]),
    ];

    group.bench_function("matches_all_4", |b| {
        b.iter(|| black_box(matches_all(black_box(&constraints), black_box(&document))));
    });

    group.finish();
}

/// Benchmark full resolution over the in-memory driver
fn benchmark_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    for size in [100, 1_000, 10_000] {
        let store = seeded_store(size);
        let client = client(&store);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("filtered_read", size), &size, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let data = client
                    .collection("events")
                    .eq("status", "published")
                    .lt("price", 50)
                    .order_asc("price")
                    .limit(50)
                    .resolve()
                    .await
                    .expect("read failed");
                black_box(data);
            });
        });

        group.bench_with_input(BenchmarkId::new("update_city", size), &size, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let data = client
                    .collection("events")
                    .eq("venue.city", "Lyon")
                    .update(doc!({ "featured": true }))
                    .resolve()
                    .await
                    .expect("update failed");
                black_box(data);
            });
        });
    }

    group.bench_function("insert_batch_100", |b| {
        let store = InMemoryDocumentStore::new();
        let client = client(&store);
        b.to_async(&runtime).iter(|| async {
            let payload: Vec<_> = (0..100).map(|n| doc!({ "seat": n })).collect();
            let data = client
                .collection("seats")
                .insert(payload)
                .resolve()
                .await
                .expect("insert failed");
            black_box(data);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_builder,
    benchmark_constraints,
    benchmark_resolution,
);
criterion_main!(benches);
