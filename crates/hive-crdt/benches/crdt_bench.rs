use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hive_crdt::{merkle_root, VectorClock};

fn clock_with(agents: usize, offset: u64) -> VectorClock {
    let mut clock = VectorClock::new();
    for i in 0..agents {
        for _ in 0..(i as u64 % 7 + offset) {
            clock.increment(&format!("agent-{i}"));
        }
    }
    clock
}

fn bench_clock_compare(c: &mut Criterion) {
    let a = clock_with(64, 1);
    let b = clock_with(64, 2);
    c.bench_function("vector_clock_compare_64", |bench| {
        bench.iter(|| black_box(a.compare(black_box(&b))))
    });
    c.bench_function("vector_clock_merge_64", |bench| {
        bench.iter(|| black_box(a.merged(black_box(&b))))
    });
}

fn bench_clock_encoding(c: &mut Criterion) {
    let a = clock_with(64, 3);
    let encoded = a.to_stable_string();
    c.bench_function("vector_clock_parse_64", |bench| {
        bench.iter(|| black_box(VectorClock::parse(black_box(&encoded))))
    });
}

fn bench_merkle(c: &mut Criterion) {
    let leaves: Vec<String> = (0..1024)
        .map(|i| blake3::hash(format!("op-{i}").as_bytes()).to_hex().to_string())
        .collect();
    c.bench_function("merkle_root_1024", |bench| {
        bench.iter(|| black_box(merkle_root(black_box(&leaves))))
    });
}

criterion_group!(benches, bench_clock_compare, bench_clock_encoding, bench_merkle);
criterion_main!(benches);
