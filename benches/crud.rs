//! CRUD workload benchmarks over the public `Database` API.
#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use poseidon::db::Database;
use poseidon::model::PropertyMap;
use tempfile::TempDir;

fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path()).unwrap();
    (dir, db)
}

fn bench_insert_nodes(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_nodes");
    for &batch in &[64usize, 256, 1024] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter_batched(
                open_db,
                |(_dir, mut db)| {
                    db.run_transaction(|tx| {
                        for i in 0..batch {
                            let mut props = PropertyMap::new();
                            props.insert("seq".to_string(), poseidon::PropertyValue::UInt64(i as u64));
                            tx.add_node("Bench", &props)?;
                        }
                        Ok(())
                    })
                    .unwrap();
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_insert_relationships(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_relationships");
    group.throughput(Throughput::Elements(256));
    group.bench_function("chain_of_256", |b| {
        b.iter_batched(
            || {
                let (dir, mut db) = open_db();
                let ids = db
                    .run_transaction(|tx| {
                        let mut ids = Vec::with_capacity(257);
                        for _ in 0..257 {
                            ids.push(tx.add_node("Bench", &PropertyMap::new())?);
                        }
                        Ok(ids)
                    })
                    .unwrap();
                (dir, db, ids)
            },
            |(_dir, mut db, ids)| {
                db.run_transaction(|tx| {
                    for pair in ids.windows(2) {
                        tx.add_relationship("NEXT", pair[0], pair[1], &PropertyMap::new())?;
                    }
                    Ok(())
                })
                .unwrap();
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_insert_nodes, bench_insert_relationships);
criterion_main!(benches);
