//! Map operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmap_bench::{bench_config, populated_map, random_data, shuffled_keys};
use shmap_core::{Config, LongValue, SharedMap};
use tempfile::TempDir;

/// Benchmark put of new and existing keys.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");

    for size in [8, 64, 256].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let map: SharedMap<String, Vec<u8>> =
                SharedMap::open(bench_config(10_000, size)).unwrap();
            let keys = shuffled_keys(10_000);
            let data = random_data(size);
            let mut i = 0usize;

            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                black_box(map.put(key.as_str(), black_box(&data)).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark put without reading back the previous value.
fn bench_put_returns_null(c: &mut Criterion) {
    let map: SharedMap<String, Vec<u8>> =
        SharedMap::open(bench_config(10_000, 64).put_returns_null(true)).unwrap();
    let keys = shuffled_keys(10_000);
    let data = random_data(64);
    let mut i = 0usize;

    c.bench_function("put_returns_null", |b| {
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            black_box(map.put(key.as_str(), &data).unwrap());
        });
    });
}

/// Benchmark get of present and absent keys.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("hit", count), count, |b, &count| {
            let (map, keys) = populated_map(count, 64);
            let mut i = 0usize;

            b.iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                black_box(map.get(key.as_str()).unwrap());
            });
        });
        group.bench_with_input(BenchmarkId::new("miss", count), count, |b, &count| {
            let (map, _) = populated_map(count, 64);

            b.iter(|| {
                black_box(map.get("absent").unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark reading into a reused view.
fn bench_get_using(c: &mut Criterion) {
    let map: SharedMap<String, LongValue> = SharedMap::open(bench_config(1_000, 8)).unwrap();
    let keys = shuffled_keys(1_000);
    for key in &keys {
        map.acquire_record::<str, LongValue>(key).unwrap();
    }
    let mut view = Some(map.view_for("LongValue").unwrap());
    let mut i = 0usize;

    c.bench_function("get_using", |b| {
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            view = map.get_using(key.as_str(), view.take()).unwrap();
            black_box(&view);
        });
    });
}

/// Benchmark acquire of existing entries.
fn bench_acquire(c: &mut Criterion) {
    let map: SharedMap<String, LongValue> = SharedMap::open(bench_config(1_000, 8)).unwrap();
    let keys = shuffled_keys(1_000);
    let mut i = 0usize;

    c.bench_function("acquire", |b| {
        b.iter(|| {
            let key = &keys[i % keys.len()];
            i += 1;
            black_box(map.acquire_record::<str, LongValue>(key).unwrap());
        });
    });
}

/// Benchmark full iteration.
fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for count in [100, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (map, _) = populated_map(count, 16);

            b.iter(|| {
                black_box(map.iter().count());
            });
        });
    }
    group.finish();
}

/// Benchmark put on a file-backed map.
fn bench_file_put(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new()
        .entries(10_000)
        .entry_size(64)
        .path(temp_dir.path().join("bench.shm"));
    let map: SharedMap<u64, Vec<u8>> = SharedMap::open(config).unwrap();
    let data = random_data(64);
    let mut i = 0u64;

    c.bench_function("file_put", |b| {
        b.iter(|| {
            i = (i + 1) % 10_000;
            black_box(map.put(&i, &data).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_put_returns_null,
    bench_get,
    bench_get_using,
    bench_acquire,
    bench_iterate,
    bench_file_put,
);

criterion_main!(benches);
