//! Micro-operation benchmarks for the memory tier.
//!
//! Run with: `cargo bench --bench ops`
//!
//! Measures per-operation latency for get/set across the key-type fast
//! paths (integer, string) and a mixed Zipf-flavored workload.

use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tierkit::memory::MemoryTier;

const CAPACITY: usize = 16_384;
const OPS: u64 = 100_000;

// ============================================================================
// Get Hit Latency
// ============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("integer_keys", |b| {
        let tier: MemoryTier<u64, u64> = MemoryTier::new(CAPACITY);
        for i in 0..CAPACITY as u64 {
            tier.set(i, i, Duration::ZERO);
        }
        b.iter(|| {
            for i in 0..OPS {
                let key = i % (CAPACITY as u64);
                black_box(tier.get(&key));
            }
        })
    });

    group.bench_function("string_keys", |b| {
        let tier: MemoryTier<String, u64> = MemoryTier::new(CAPACITY);
        let keys: Vec<String> = (0..CAPACITY).map(|i| format!("user:{i:08}")).collect();
        for (i, key) in keys.iter().enumerate() {
            tier.set(key.clone(), i as u64, Duration::ZERO);
        }
        b.iter(|| {
            for i in 0..OPS {
                let key = &keys[(i % CAPACITY as u64) as usize];
                black_box(tier.get(key));
            }
        })
    });

    group.finish();
}

// ============================================================================
// Insert Latency (with eviction pressure)
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("integer_keys_evicting", |b| {
        let tier: MemoryTier<u64, u64> = MemoryTier::new(CAPACITY);
        let mut next = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                tier.set(next, next, Duration::ZERO);
                next = next.wrapping_add(1);
            }
        })
    });

    group.finish();
}

// ============================================================================
// Mixed Workload (90% reads, skewed keys)
// ============================================================================

fn bench_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_90_10");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("skewed_integer_keys", |b| {
        let tier: MemoryTier<u64, u64> = MemoryTier::new(CAPACITY);
        let mut rng = StdRng::seed_from_u64(42);
        // Skew: square a uniform draw so low keys dominate, scan keys rare.
        let keys: Vec<u64> = (0..OPS)
            .map(|_| {
                let u: f64 = rng.gen();
                (u * u * (4 * CAPACITY) as f64) as u64
            })
            .collect();
        let ops: Vec<bool> = (0..OPS).map(|_| rng.gen_bool(0.9)).collect();

        b.iter(|| {
            for (key, is_read) in keys.iter().zip(&ops) {
                if *is_read {
                    black_box(tier.get(key));
                } else {
                    tier.set(*key, *key, Duration::ZERO);
                }
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_get_hit, bench_insert, bench_mixed);
criterion_main!(benches);
