//! Benchmarks for svip-migrate against the in-memory store.
//!
//! Run with: cargo bench -p svip-migrate

#![allow(clippy::pedantic)]

use bson::{doc, DateTime, Document};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indicatif::ProgressBar;
use std::sync::Arc;

use svip_migrate::{ClosureRecord, MemoryStore, MigrationConfig, Pipeline};

fn closures(n: usize, checkins_per_closure: usize) -> Vec<Document> {
    let envio = DateTime::parse_rfc3339_str("2022-03-01T00:00:00Z").unwrap();
    (0..n)
        .map(|i| {
            let checkins: Vec<Document> = (0..checkins_per_closure)
                .map(|j| {
                    let year = 2020 + (j % 3) as i32;
                    doc! {
                        "_id": format!("k-{i}-{j}"),
                        "fechaIngreso": DateTime::parse_rfc3339_str(&format!("{year}-06-01T00:00:00Z")).unwrap(),
                        "codigoAutorizacionTbk": "000000",
                        "totalPagadoTbk": 25_000_i64,
                        "cantidadAcompanantes": 1,
                    }
                })
                .collect();
            doc! { "_id": format!("c-{i}"), "envio": envio, "lstCheckins": checkins }
        })
        .collect()
}

/// Benchmark decoding a closure with embedded checkins
fn bench_decode_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_closure_by_checkins");
    for checkins in [1, 10, 50] {
        let document = closures(1, checkins).remove(0);
        group.bench_with_input(BenchmarkId::new("checkins", checkins), &document, |b, d| {
            b.iter(|| black_box(ClosureRecord::from_document(d.clone()).unwrap()))
        });
    }
    group.finish();
}

/// Benchmark the whole pipeline by concurrency level
fn bench_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let source = closures(500, 5);

    let mut group = c.benchmark_group("pipeline_by_concurrency");
    group.sample_size(10);
    for concurrency in [1, 4, 20] {
        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&runtime).iter(|| {
                    let source = source.clone();
                    async move {
                        let store = Arc::new(MemoryStore::new().with_documents("cierre", source));
                        let mut config = MigrationConfig::default();
                        config.options.concurrency = concurrency;
                        let pipeline = Pipeline::new(store, &config).with_progress(ProgressBar::hidden());
                        black_box(pipeline.run().await.unwrap())
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_decode_closure, bench_pipeline);
criterion_main!(benches);
