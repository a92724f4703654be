//! REVINDEX - Performance Benchmarks
//! Measures throughput of core index operations using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use revindex::engine::tree_index::{Index, TreeIndex};
use revindex::types::Revision;

fn populated(keys: i64, revs_per_key: i64) -> TreeIndex {
    let index = TreeIndex::new();
    let mut main = 0;
    for _ in 0..revs_per_key {
        for k in 0..keys {
            main += 1;
            index.put(format!("key_{:06}", k).as_bytes(), Revision::new(main, 0));
        }
    }
    index
}

fn bench_index_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_index");

    group.bench_function("put_1000", |b| {
        b.iter(|| {
            let index = TreeIndex::new();
            for i in 0..1000 {
                let key = format!("key_{:06}", i);
                index.put(black_box(key.as_bytes()), Revision::new(i + 1, 0));
            }
        });
    });

    group.bench_function("get_latest", |b| {
        let index = populated(1000, 4);
        b.iter(|| {
            black_box(index.get(b"key_000500", 4000).ok());
        });
    });

    group.bench_function("get_historical", |b| {
        let index = populated(1000, 4);
        b.iter(|| {
            black_box(index.get(b"key_000500", 1501).ok());
        });
    });

    group.bench_function("get_miss", |b| {
        let index = populated(1000, 4);
        b.iter(|| {
            black_box(index.get(b"nonexistent_key", 4000).ok());
        });
    });

    group.bench_function("range_100", |b| {
        let index = populated(1000, 4);
        b.iter(|| {
            black_box(index.range(b"key_000100", Some(b"key_000200"), 3000));
        });
    });

    group.finish();
}

fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");

    for keys in [1_000, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::new("compact_keys", keys), keys, |b, &keys| {
            b.iter_batched(
                || populated(keys, 4),
                |index| black_box(index.compact(keys * 2)),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_index_operations, bench_compaction);
criterion_main!(benches);
