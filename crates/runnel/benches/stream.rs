//! Stream throughput benchmarks.
//!
//! Run with: cargo bench -p runnel

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use runnel::{Mode, Stream, StreamSet};

fn write_read_batch(c: &mut Criterion) {
    let s: Arc<Stream<u64>> = Stream::new(64);
    let w = s.open(Mode::Write);
    let r = s.open(Mode::Read);

    c.bench_function("write_read_batch_64", |b| {
        b.iter(|| {
            for i in 0..64u64 {
                w.write(black_box(i));
            }
            for _ in 0..64 {
                black_box(r.read());
            }
        });
    });
}

fn write_read_capacity_one(c: &mut Criterion) {
    let s: Arc<Stream<u64>> = Stream::new(1);
    let w = s.open(Mode::Write);
    let r = s.open(Mode::Read);

    c.bench_function("write_read_capacity_1", |b| {
        b.iter(|| {
            w.write(black_box(1u64));
            black_box(r.read());
        });
    });
}

fn poll_one_ready_of_eight(c: &mut Criterion) {
    let streams: Vec<Arc<Stream<u64>>> = (0..8).map(|_| Stream::new(4)).collect();
    let mut set = StreamSet::new();
    for s in &streams {
        set.add(s.open(Mode::Read));
    }
    let w = streams[3].open(Mode::Write);

    c.bench_function("poll_one_ready_of_8", |b| {
        b.iter(|| {
            w.write(black_box(7u64));
            let ready = set.poll();
            black_box(ready.read());
        });
    });
}

criterion_group!(
    benches,
    write_read_batch,
    write_read_capacity_one,
    poll_one_ready_of_eight,
);
criterion_main!(benches);
