//! Storage backend benchmarks.

use bitlog_bench::random_data;
use bitlog_storage::{FileBackend, InMemoryBackend, StorageBackend};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Benchmark InMemoryBackend append operations.
fn bench_inmemory_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("inmemory_append");

    for size in [64, 256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut backend = InMemoryBackend::new();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend append operations.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(50);

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut backend = FileBackend::open(&dir.path().join("bench.seg")).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }

    group.finish();
}

/// Benchmark FileBackend reads at random offsets.
fn bench_file_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut backend = FileBackend::open(&dir.path().join("bench.seg")).unwrap();
            let data = random_data(size);
            let offsets: Vec<u64> = (0..256).map(|_| backend.append(&data).unwrap()).collect();
            backend.flush().unwrap();
            let mut i = 0;

            b.iter(|| {
                let offset = offsets[i % offsets.len()];
                i += 1;
                black_box(backend.read_at(black_box(offset), size).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_inmemory_append,
    bench_file_append,
    bench_file_read
);
criterion_main!(benches);
