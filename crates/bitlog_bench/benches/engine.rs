//! Engine benchmarks.

use bitlog_bench::{generate_keys, random_data, temp_engine};
use bitlog_core::Config;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

fn unsynced() -> Config {
    Config::new().sync_on_write(false)
}

/// Benchmark puts of various value sizes.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for size in [64, 1024, 16 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_dir, engine) = temp_engine(unsynced());
            let value = random_data(size);
            let keys = generate_keys(1024);
            let mut i = 0;

            b.iter(|| {
                engine.put(black_box(&keys[i % keys.len()]), black_box(&value)).unwrap();
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark puts with fsync after every write.
fn bench_put_synced(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_synced");
    group.sample_size(20);

    group.bench_function("256", |b| {
        let (_dir, engine) = temp_engine(Config::new());
        let value = random_data(256);
        b.iter(|| engine.put(black_box(b"synced"), black_box(&value)).unwrap());
    });

    group.finish();
}

/// Benchmark random gets across many segments.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (_dir, engine) = temp_engine(unsynced().max_segment_size(64 * 1024));
            let keys = generate_keys(count);
            let value = random_data(128);
            for key in &keys {
                engine.put(key, &value).unwrap();
            }
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let key = &keys[rng.gen_range(0..keys.len())];
                black_box(engine.get(black_box(key)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark compaction of segments holding many overwritten keys.
fn bench_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("compact");
    group.sample_size(10);

    group.bench_function("10k_records_1k_keys", |b| {
        b.iter_with_setup(
            || {
                let (dir, engine) = temp_engine(unsynced().max_segment_size(32 * 1024));
                let keys = generate_keys(1_000);
                let value = random_data(100);
                for round in 0..10 {
                    for (i, key) in keys.iter().enumerate() {
                        if (i + round) % 13 == 0 {
                            engine.delete(key).unwrap();
                        } else {
                            engine.put(key, &value).unwrap();
                        }
                    }
                }
                (dir, engine)
            },
            |(_dir, engine)| {
                black_box(engine.compact().unwrap());
            },
        );
    });

    group.finish();
}

criterion_group!(benches, bench_put, bench_put_synced, bench_get, bench_compact);
criterion_main!(benches);
