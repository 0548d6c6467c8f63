//! Streams and stream descriptors.
//!
//! A stream is the communication and synchronization primitive between two
//! tasks: a bounded, unidirectional channel with a single producer and a
//! single consumer. A task never touches a stream directly; it opens the
//! stream in one direction and works through the returned descriptor.
//!
//! Occupancy and blocking are folded into two signed counters. `n_sem`
//! tracks filled slots, `e_sem` free slots; a value of `-1` encodes the one
//! peer that may be suspended on the stream. Each blocking operation first
//! claims a slot by moving its counter, and whichever side observes the
//! counter cross zero owns the corresponding wakeup. That single rule makes
//! the suspend/resume handshake race-free without holding any lock around
//! the buffer.
//!
//! The only lock, `prod_lock`, serializes a producer's deposit against a
//! consumer's poll scan so that the poll token handoff (see
//! [`crate::set::StreamSet::poll`]) sees a consistent buffer.

use std::sync::{Arc, Weak};

use thiserror::Error;

use crate::buffer::Buffer;
use crate::monitor::StreamMonitor;
use crate::sync::{AtomicIsize, Mutex, Ordering};
use crate::task::{BlockReason, Task};

/// Capacity substituted when `Stream::new` is given a zero size.
pub const DEFAULT_CAPACITY: usize = 16;

/// Process-wide unique stream identifier.
pub type StreamUid = u64;

static STREAM_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// Direction a descriptor was opened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// The stream was full; the rejected item is handed back.
#[derive(Debug, Error)]
#[error("stream is full")]
pub struct Full<T>(pub T);

/// Poll coordination state, guarded by the producer lock.
pub(crate) struct PollGate {
    /// Set while a consumer has registered this stream as a poll activator.
    pub(crate) is_poll: bool,
}

/// A bounded stream shared between one producer task and one consumer task.
pub struct Stream<T> {
    pub(crate) buffer: Buffer<T>,
    pub(crate) uid: StreamUid,
    /// Filled slots, minus a possibly blocked consumer.
    pub(crate) n_sem: AtomicIsize,
    /// Free slots, minus a possibly blocked producer.
    pub(crate) e_sem: AtomicIsize,
    /// Serializes deposits against poll scans; guards `is_poll`.
    pub(crate) prod_lock: Mutex<PollGate>,
    prod_sd: Mutex<Option<Weak<StreamDesc<T>>>>,
    cons_sd: Mutex<Option<Weak<StreamDesc<T>>>>,
}

impl<T> Stream<T> {
    /// Create a stream with the given buffer capacity; `0` selects
    /// [`DEFAULT_CAPACITY`].
    pub fn new(size: usize) -> Arc<Self> {
        let capacity = if size == 0 { DEFAULT_CAPACITY } else { size };
        Arc::new(Self {
            buffer: Buffer::new(capacity),
            uid: STREAM_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            n_sem: AtomicIsize::new(0),
            e_sem: AtomicIsize::new(capacity as isize),
            prod_lock: Mutex::new(PollGate { is_poll: false }),
            prod_sd: Mutex::new(None),
            cons_sd: Mutex::new(None),
        })
    }

    pub fn uid(&self) -> StreamUid {
        self.uid
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Open the stream for the calling task in the given direction.
    ///
    /// Panics if that side of the stream is already bound.
    pub fn open(self: &Arc<Self>, mode: Mode) -> Arc<StreamDesc<T>> {
        self.open_monitored(mode, None)
    }

    /// Like [`Stream::open`], with observation callbacks attached to the
    /// descriptor.
    pub fn open_monitored(
        self: &Arc<Self>,
        mode: Mode,
        mon: Option<Arc<dyn StreamMonitor>>,
    ) -> Arc<StreamDesc<T>> {
        let sd = Arc::new(StreamDesc {
            task: Task::current(),
            stream: Mutex::new(self.clone()),
            mode,
            mon,
        });
        {
            let mut bound = self.side(mode).lock().unwrap();
            if let Some(existing) = &*bound {
                assert!(
                    existing.upgrade().is_none(),
                    "stream {} is already open for {:?}",
                    self.uid,
                    mode
                );
            }
            *bound = Some(Arc::downgrade(&sd));
        }
        if let Some(mon) = &sd.mon {
            mon.opened(self.uid, mode);
        }
        sd
    }

    fn side(&self, mode: Mode) -> &Mutex<Option<Weak<StreamDesc<T>>>> {
        match mode {
            Mode::Read => &self.cons_sd,
            Mode::Write => &self.prod_sd,
        }
    }

    fn bound(&self, mode: Mode) -> Option<Arc<StreamDesc<T>>> {
        self.side(mode).lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// The consumer descriptor. Only called on paths where the protocol
    /// guarantees a consumer is bound (it armed a poll or blocked in read).
    pub(crate) fn consumer_desc(&self) -> Arc<StreamDesc<T>> {
        self.bound(Mode::Read)
            .expect("stream has no bound consumer")
    }

    fn producer_task(&self) -> Arc<Task> {
        self.bound(Mode::Write)
            .expect("stream has no bound producer")
            .task
            .clone()
    }

    /// Discard a stream. Requires that no descriptor is bound and no peer is
    /// suspended; unread items are dropped with the buffer once the last
    /// handle goes away.
    pub fn destroy(self: Arc<Self>) {
        debug_assert!(
            self.bound(Mode::Read).is_none() && self.bound(Mode::Write).is_none(),
            "destroying stream {} while it is still open",
            self.uid
        );
        debug_assert!(
            self.n_sem.load(Ordering::SeqCst) >= 0 && self.e_sem.load(Ordering::SeqCst) >= 0,
            "destroying stream {} with a blocked peer",
            self.uid
        );
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("uid", &self.uid)
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}

/// A task's handle for one end of a stream.
pub struct StreamDesc<T> {
    pub(crate) task: Arc<Task>,
    stream: Mutex<Arc<Stream<T>>>,
    mode: Mode,
    mon: Option<Arc<dyn StreamMonitor>>,
}

impl<T> StreamDesc<T> {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The stream currently behind this descriptor.
    pub fn stream(&self) -> Arc<Stream<T>> {
        self.stream.lock().unwrap().clone()
    }

    /// Uid of the stream currently behind this descriptor.
    pub fn uid(&self) -> StreamUid {
        self.stream.lock().unwrap().uid
    }

    /// Non-blocking, non-consuming read of the next item.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        assert_eq!(self.mode, Mode::Read, "peek on a write descriptor");
        self.stream().buffer.top().cloned()
    }

    /// Consume the next item, suspending while the stream is empty.
    pub fn read(&self) -> T {
        assert_eq!(self.mode, Mode::Read, "read on a write descriptor");
        let stream = self.stream();

        // Claim a filled slot. The transition 0 -> -1 means the buffer was
        // empty and the producer now owns our wakeup.
        if stream.n_sem.fetch_sub(1, Ordering::SeqCst) == 0 {
            if let Some(mon) = &self.mon {
                mon.blocked(stream.uid);
            }
            self.task.block(BlockReason::Input);
        }

        debug_assert!(stream.buffer.top().is_some());
        let item = stream.buffer.pop();

        // Hand a free slot back. Crossing -1 -> 0 proves the producer is
        // suspended on a full buffer.
        if stream.e_sem.fetch_add(1, Ordering::SeqCst) == -1 {
            stream.producer_task().unblock();
            if let Some(mon) = &self.mon {
                mon.woke(stream.uid);
            }
        }

        if let Some(mon) = &self.mon {
            mon.moved(stream.uid);
        }
        item
    }

    /// Append an item, suspending while the stream is full.
    pub fn write(&self, item: T) {
        assert_eq!(self.mode, Mode::Write, "write on a read descriptor");
        let stream = self.stream();

        // Claim a free slot. The transition 0 -> -1 means the buffer was
        // full and the consumer now owns our wakeup.
        if stream.e_sem.fetch_sub(1, Ordering::SeqCst) == 0 {
            if let Some(mon) = &self.mon {
                mon.blocked(stream.uid);
            }
            self.task.block(BlockReason::Output);
        }

        // Depositing and inspecting the poll flag must be atomic with
        // respect to the consumer's poll scan.
        let mut poll_winner: Option<Arc<Task>> = None;
        {
            let mut gate = stream.prod_lock.lock().unwrap();
            assert!(stream.buffer.has_space());
            stream.buffer.put(item);
            if gate.is_poll {
                // Try to take the consumer's poll token. Exactly one party
                // wins it: us, another producer, or the consumer's own scan.
                let cons = stream.consumer_desc();
                if cons.task.poll_token.swap(false, Ordering::SeqCst) {
                    poll_winner = Some(cons.task.clone());
                }
                gate.is_poll = false;
            }
        }

        // Publish the filled slot. Crossing -1 -> 0 proves the consumer is
        // suspended in read; otherwise a won poll token means it is
        // suspended in poll and we are the sole task waking it.
        if stream.n_sem.fetch_add(1, Ordering::SeqCst) == -1 {
            stream.consumer_desc().task.unblock();
            if let Some(mon) = &self.mon {
                mon.woke(stream.uid);
            }
        } else if let Some(cons) = poll_winner {
            cons.set_wakeup(stream.uid);
            cons.unblock();
            if let Some(mon) = &self.mon {
                mon.woke(stream.uid);
            }
        }

        if let Some(mon) = &self.mon {
            mon.moved(stream.uid);
        }
    }

    /// Non-blocking write. Fails without side effects when the stream is
    /// full.
    pub fn try_write(&self, item: T) -> Result<(), Full<T>> {
        assert_eq!(self.mode, Mode::Write, "write on a read descriptor");
        // A racing consumer can only free space concurrently, so this check
        // errs toward a stale `Full`, never toward blocking.
        if !self.stream().buffer.has_space() {
            return Err(Full(item));
        }
        self.write(item);
        Ok(())
    }

    /// Release the descriptor. With `destroy`, the stream must be fully
    /// unbound afterwards and is discarded along with any unread items.
    ///
    /// The peer must not be suspended on the stream.
    pub fn close(self: Arc<Self>, destroy: bool) {
        let stream = self.stream();
        debug_assert!(
            stream.n_sem.load(Ordering::SeqCst) >= 0
                && stream.e_sem.load(Ordering::SeqCst) >= 0,
            "closing stream {} with a blocked peer",
            stream.uid
        );
        if let Some(mon) = &self.mon {
            mon.closed(stream.uid);
        }
        *stream.side(self.mode).lock().unwrap() = None;
        if destroy {
            stream.destroy();
        }
    }

    /// Swap the stream behind a read descriptor for a fresh one. The old
    /// stream is discarded; the descriptor keeps its identity and its place
    /// in any containing set.
    ///
    /// `snew` must not already have a consumer, and the old stream's
    /// producer side must be vacant.
    pub fn replace(self: &Arc<Self>, snew: Arc<Stream<T>>) {
        assert_eq!(self.mode, Mode::Read, "replace on a write descriptor");
        {
            let mut cons = snew.cons_sd.lock().unwrap();
            if let Some(existing) = &*cons {
                assert!(
                    existing.upgrade().is_none(),
                    "replacement stream {} already has a consumer",
                    snew.uid
                );
            }
            *cons = Some(Arc::downgrade(self));
        }
        let old = {
            let mut current = self.stream.lock().unwrap();
            std::mem::replace(&mut *current, snew.clone())
        };
        let old_uid = old.uid;
        *old.cons_sd.lock().unwrap() = None;
        debug_assert!(
            old.bound(Mode::Write).is_none(),
            "replacing stream {} while its producer is still open",
            old_uid
        );
        old.destroy();
        if let Some(mon) = &self.mon {
            mon.replaced(old_uid, snew.uid);
        }
    }
}

impl<T> std::fmt::Debug for StreamDesc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDesc")
            .field("uid", &self.uid())
            .field("mode", &self.mode)
            .field("task", &self.task.id())
            .finish()
    }
}
