//! End-to-end tests over the public API.

use std::sync::Arc;

use runnel::{spawn, Full, Mode, Stream, StreamSet};

#[test]
fn pipeline_moves_items_in_order() {
    const N: u32 = 100;
    let s: Arc<Stream<u32>> = Stream::new(8);

    let ps = s.clone();
    let producer = spawn(move || {
        let w = ps.open(Mode::Write);
        for i in 0..N {
            w.write(i);
        }
    });

    let r = s.open(Mode::Read);
    for i in 0..N {
        assert_eq!(r.read(), i);
    }
    producer.join();
}

#[test]
fn fan_in_with_poll() {
    const PER_PRODUCER: usize = 50;
    let s1: Arc<Stream<u8>> = Stream::new(4);
    let s2: Arc<Stream<u8>> = Stream::new(4);

    let producers: Vec<_> = [(s1.clone(), 1u8), (s2.clone(), 2u8)]
        .into_iter()
        .map(|(s, id)| {
            spawn(move || {
                let w = s.open(Mode::Write);
                for _ in 0..PER_PRODUCER {
                    w.write(id);
                }
            })
        })
        .collect();

    let consumer = spawn(move || {
        let r1 = s1.open(Mode::Read);
        let r2 = s2.open(Mode::Read);
        let mut set = StreamSet::new();
        set.add(r1);
        set.add(r2);

        let mut counts = [0usize; 3];
        for _ in 0..2 * PER_PRODUCER {
            let ready = set.poll();
            counts[ready.read() as usize] += 1;
        }
        counts
    });

    for p in producers {
        p.join();
    }
    let counts = consumer.join();
    assert_eq!(counts[1], PER_PRODUCER);
    assert_eq!(counts[2], PER_PRODUCER);
}

#[test]
fn try_write_reports_full() {
    let s: Arc<Stream<i32>> = Stream::new(1);
    let w = s.open(Mode::Write);
    let r = s.open(Mode::Read);

    assert!(w.try_write(1).is_ok());
    assert!(matches!(w.try_write(2), Err(Full(2))));
    assert_eq!(r.read(), 1);
    assert!(w.try_write(3).is_ok());
    assert_eq!(r.read(), 3);
}

#[test]
fn close_and_reopen_read_side() {
    let s: Arc<Stream<i32>> = Stream::new(2);
    let w = s.open(Mode::Write);
    let r = s.open(Mode::Read);

    w.write(5);
    assert_eq!(r.read(), 5);
    r.close(false);

    let r = s.open(Mode::Read);
    w.write(6);
    assert_eq!(r.read(), 6);
}
