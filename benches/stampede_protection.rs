//! Benchmarks for cache stampede protection

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use tagged_cache::{CacheStrategy, CacheSystemBuilder, SingleFlight, TypedCache};
use tokio::runtime::Runtime;

fn setup_cache() -> (TypedCache<u64>, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let cache = rt.block_on(async {
        CacheSystemBuilder::new()
            .build()
            .await
            .unwrap_or_else(|_| panic!("Failed to create cache system"))
    });
    let typed = cache
        .typed::<u64>("bench")
        .unwrap_or_else(|_| panic!("Failed to create typed cache"));
    (typed, rt)
}

/// Benchmark stampede protection
fn bench_stampede_protection(c: &mut Criterion) {
    let (cache, rt) = setup_cache();
    let cache = Arc::new(cache);

    c.bench_function("stampede_100_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("stampede:{}", rand::random::<u32>());
                let mut handles = vec![];

                for _ in 0..100 {
                    let cache = Arc::clone(&cache);
                    let key = key.clone();
                    let handle = tokio::spawn(async move {
                        cache
                            .get_or_load(
                                &key,
                                CacheStrategy::ShortTerm.into(),
                                || async {
                                    tokio::time::sleep(Duration::from_millis(10)).await;
                                    Ok(42)
                                },
                                &[],
                            )
                            .await
                            .unwrap_or_else(|_| panic!("Failed to load"))
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    black_box(handle.await.unwrap_or_else(|_| panic!("Task failed")));
                }
            });
        });
    });
}

/// Benchmark the bare single-flight overhead without a store
fn bench_single_flight(c: &mut Criterion) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("Failed to create runtime"));
    let flight = Arc::new(SingleFlight::<u64>::new());

    c.bench_function("single_flight_uncontended", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    flight
                        .run("k", || async { Ok(1) })
                        .await
                        .unwrap_or_else(|_| panic!("Failed to run")),
                );
            });
        });
    });
}

criterion_group!(benches, bench_stampede_protection, bench_single_flight);
criterion_main!(benches);
