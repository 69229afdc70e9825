use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridrt_collections::LocalHashMap;

fn insert_then_lookup(c: &mut Criterion) {
    c.bench_function("map_insert_8k", |b| {
        b.iter(|| {
            let map: LocalHashMap<u64, u64> = LocalHashMap::new(64, 128);
            for i in 0..8192u64 {
                map.insert(black_box(i), black_box(i));
            }
            map
        })
    });

    let warm: LocalHashMap<u64, u64> = LocalHashMap::new(64, 128);
    for i in 0..8192u64 {
        warm.insert(i, i);
    }
    c.bench_function("map_lookup_8k", |b| {
        b.iter(|| {
            for i in 0..8192u64 {
                black_box(warm.lookup(&black_box(i)));
            }
        })
    });
}

criterion_group!(benches, insert_then_lookup);
criterion_main!(benches);
