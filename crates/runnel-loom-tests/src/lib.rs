//! Loom models of the stream concurrency protocols.
//!
//! These tests verify the synchronization patterns used by the stream layer
//! under all possible thread interleavings using the loom model checker:
//! the signed-semaphore wakeup handshake, the poll-token election, the
//! armed-scan vs. write race under the producer lock, the block/unblock
//! parker state machine, and release/acquire publication through a ring
//! slot.
//!
//! Run with:
//! ```sh
//! RUSTFLAGS="--cfg loom" cargo test -p runnel-loom-tests --release
//! ```
//!
//! For faster iteration with bounded preemptions:
//! ```sh
//! LOOM_MAX_PREEMPTIONS=2 RUSTFLAGS="--cfg loom" cargo test -p runnel-loom-tests --release
//! ```

#[cfg(loom)]
mod tests {
    use loom::cell::UnsafeCell;
    use loom::sync::atomic::{AtomicBool, AtomicIsize, AtomicU8, Ordering};
    use loom::sync::{Arc, Mutex};
    use loom::thread;

    // =========================================================================
    // Signed semaphore — the side that crosses zero owns the wakeup
    // =========================================================================

    #[test]
    fn semaphore_wakeup_handshake() {
        loom::model(|| {
            let n_sem = Arc::new(AtomicIsize::new(0));
            let blocked = Arc::new(AtomicBool::new(false));
            let woke = Arc::new(AtomicBool::new(false));

            let (n2, b2) = (n_sem.clone(), blocked.clone());
            let consumer = thread::spawn(move || {
                // Claim a filled slot; pre-value 0 means "I will block".
                if n2.fetch_sub(1, Ordering::SeqCst) == 0 {
                    b2.store(true, Ordering::SeqCst);
                }
            });

            // Publish a filled slot; pre-value -1 means "I must wake".
            if n_sem.fetch_add(1, Ordering::SeqCst) == -1 {
                woke.store(true, Ordering::SeqCst);
            }

            consumer.join().unwrap();

            // The wakeup happens exactly when the consumer suspended.
            assert_eq!(blocked.load(Ordering::SeqCst), woke.load(Ordering::SeqCst));
        });
    }

    // =========================================================================
    // Poll token — a one-shot election with a single winner
    // =========================================================================

    #[test]
    fn poll_token_single_winner() {
        loom::model(|| {
            let token = Arc::new(AtomicBool::new(true));

            let t1 = token.clone();
            let h1 = thread::spawn(move || t1.swap(false, Ordering::SeqCst));
            let t2 = token.clone();
            let h2 = thread::spawn(move || t2.swap(false, Ordering::SeqCst));

            let w1 = h1.join().unwrap();
            let w2 = h2.join().unwrap();

            assert!(w1 ^ w2, "exactly one producer may win the token");
            assert!(!token.load(Ordering::SeqCst));
        });
    }

    // =========================================================================
    // Armed scan vs. write — serialized by the producer lock
    // =========================================================================

    struct Gate {
        is_poll: bool,
        has_item: bool,
    }

    #[test]
    fn scan_and_write_elect_one_waker() {
        loom::model(|| {
            let gate = Arc::new(Mutex::new(Gate {
                is_poll: false,
                has_item: false,
            }));
            let token = Arc::new(AtomicBool::new(true));

            // Consumer scan: short-circuit on data, otherwise arm the stream.
            let (g2, t2) = (gate.clone(), token.clone());
            let consumer = thread::spawn(move || {
                let mut gate = g2.lock().unwrap();
                if gate.has_item {
                    t2.swap(false, Ordering::SeqCst)
                } else {
                    gate.is_poll = true;
                    false
                }
            });

            // Producer write: deposit, then hand off the token if armed.
            let producer_won = {
                let mut gate = gate.lock().unwrap();
                gate.has_item = true;
                if gate.is_poll {
                    gate.is_poll = false;
                    token.swap(false, Ordering::SeqCst)
                } else {
                    false
                }
            };

            let consumer_won = consumer.join().unwrap();

            // Whichever order the lock grants, exactly one side takes the
            // wakeup: the consumer saw the item, or the producer saw the arm.
            assert!(consumer_won ^ producer_won);
            assert!(!token.load(Ordering::SeqCst));
        });
    }

    // =========================================================================
    // Parker state machine — no lost wakeup around the park
    // =========================================================================

    const RUNNING: u8 = 0;
    const READY: u8 = 1;
    const BLOCKED: u8 = 2;

    fn block(state: &AtomicU8) {
        match state.compare_exchange(RUNNING, BLOCKED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {}
            Err(actual) => {
                // The wakeup landed first; consume it.
                assert_eq!(actual, READY);
                state.store(RUNNING, Ordering::Release);
                return;
            }
        }
        while state
            .compare_exchange(READY, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            loom::thread::yield_now();
        }
    }

    fn unblock(state: &AtomicU8) {
        let prev = state.swap(READY, Ordering::AcqRel);
        assert_ne!(prev, READY, "double wakeup");
        // prev == RUNNING: the peer has not reached block() yet and will
        // consume READY there. prev == BLOCKED: the spin in block() sees
        // READY on its next iteration.
    }

    #[test]
    fn parker_never_loses_a_wakeup() {
        loom::model(|| {
            let n_sem = Arc::new(AtomicIsize::new(0));
            let state = Arc::new(AtomicU8::new(RUNNING));

            let (n2, s2) = (n_sem.clone(), state.clone());
            let consumer = thread::spawn(move || {
                if n2.fetch_sub(1, Ordering::SeqCst) == 0 {
                    block(&s2);
                }
                // Either path must leave us running.
                assert_eq!(s2.load(Ordering::SeqCst), RUNNING);
            });

            if n_sem.fetch_add(1, Ordering::SeqCst) == -1 {
                unblock(&state);
            }

            consumer.join().unwrap();
        });
    }

    // =========================================================================
    // Ring slot — the occupancy flag publishes the item write
    // =========================================================================

    #[test]
    fn slot_flag_publishes_item() {
        loom::model(|| {
            let slot = Arc::new(UnsafeCell::new(0usize));
            let full = Arc::new(AtomicBool::new(false));

            let (s2, f2) = (slot.clone(), full.clone());
            let producer = thread::spawn(move || {
                s2.with_mut(|p| unsafe { *p = 42 });
                f2.store(true, Ordering::Release);
            });

            if full.load(Ordering::Acquire) {
                let v = slot.with(|p| unsafe { *p });
                assert_eq!(v, 42);
            }

            producer.join().unwrap();
        });
    }
}

// Keeps the crate non-empty when built without --cfg loom.
#[cfg(not(loom))]
pub fn placeholder() {}
