use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flagcache::adapters::cache::BoundedCache;
use flagcache::domain::models::{CacheKey, EvaluationResult, RemoteEvaluation};
use flagcache::domain::ports::CacheStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const KEYS: usize = 1_000;

fn keys() -> Vec<String> {
    (0..KEYS)
        .map(|i| CacheKey::flag(&format!("flag-{i}"), "user-1", "bench").into_string())
        .collect()
}

fn result(i: usize) -> EvaluationResult {
    EvaluationResult::from_remote(
        format!("flag-{i}"),
        RemoteEvaluation::value(json!({"variant": i, "enabled": true})),
    )
}

/// Get hits against a warm cache
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_get");
    group.throughput(Throughput::Elements(KEYS as u64));

    let keys = keys();
    let cache = BoundedCache::new(KEYS, Duration::from_secs(300));
    for (i, key) in keys.iter().enumerate() {
        cache.set(key, result(i), Duration::ZERO);
    }

    group.bench_function("warm", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(cache.get(key));
            }
        });
    });
    group.finish();
}

/// Sets with and without eviction pressure
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_set");
    group.throughput(Throughput::Elements(KEYS as u64));

    let keys = keys();
    let values: Vec<EvaluationResult> = (0..KEYS).map(result).collect();

    for capacity in [KEYS, KEYS / 10] {
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &capacity, |b, &capacity| {
            let cache = BoundedCache::new(capacity, Duration::from_secs(300));
            b.iter(|| {
                for (key, value) in keys.iter().zip(&values) {
                    cache.set(key, value.clone(), Duration::ZERO);
                }
            });
        });
    }
    group.finish();
}

/// Mixed reads and writes from several threads sharing one cache
fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_contended");
    let keys = Arc::new(keys());

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements((KEYS * threads) as u64));
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            let cache = Arc::new(BoundedCache::new(KEYS / 2, Duration::from_secs(300)));
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let cache = Arc::clone(&cache);
                        let keys = Arc::clone(&keys);
                        std::thread::spawn(move || {
                            for (i, key) in keys.iter().enumerate() {
                                if (i + t) % 4 == 0 {
                                    cache.set(key, result(i), Duration::ZERO);
                                } else {
                                    black_box(cache.get(key));
                                }
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_get, bench_set, bench_contended);
criterion_main!(benches);
