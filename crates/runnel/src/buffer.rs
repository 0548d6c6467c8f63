//! Bounded single-producer single-consumer ring buffer.
//!
//! FastForward-style design: each slot carries its own occupancy flag, so the
//! producer and consumer never contend on a shared index. The write cursor is
//! touched only by the producer and the read cursor only by the consumer; the
//! two live on separate cache lines.
//!
//! The buffer itself never blocks. `put` requires `has_space()` and `pop`
//! requires a non-empty `top()`; blocking on full/empty is layered on top by
//! the stream.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::sync::{AtomicBool, Ordering};

/// One ring slot: occupancy flag plus the (possibly uninitialized) item.
struct Slot<T> {
    full: AtomicBool,
    item: UnsafeCell<MaybeUninit<T>>,
}

pub(crate) struct Buffer<T> {
    slots: Box<[Slot<T>]>,
    /// Read cursor. Only the consumer side reads or writes it.
    head: CachePadded<UnsafeCell<usize>>,
    /// Write cursor. Only the producer side reads or writes it.
    tail: CachePadded<UnsafeCell<usize>>,
}

// SAFETY: a slot is either owned by the producer (flag clear) or by the
// consumer (flag set); the release/acquire pair on `full` is the handoff.
// The cursors are single-owner per side, which callers must uphold.
unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send> Sync for Buffer<T> {}

impl<T> Buffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "buffer capacity must be at least 1");
        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot {
                full: AtomicBool::new(false),
                item: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            head: CachePadded::new(UnsafeCell::new(0)),
            tail: CachePadded::new(UnsafeCell::new(0)),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True if the slot under the write cursor is free.
    ///
    /// The consumer only ever turns a slot from full to free, so a `true`
    /// result is stable for the producer; a racing consumer can at worst
    /// leave a stale `false`.
    pub(crate) fn has_space(&self) -> bool {
        // SAFETY: the write cursor is only accessed from the producer side.
        let tail = unsafe { *self.tail.get() };
        !self.slots[tail].full.load(Ordering::Acquire)
    }

    /// Append an item at the write cursor.
    ///
    /// Caller must be the single producer and must have observed
    /// `has_space()`.
    pub(crate) fn put(&self, item: T) {
        // SAFETY: single producer; see `has_space`.
        let tail = unsafe { *self.tail.get() };
        let slot = &self.slots[tail];
        debug_assert!(!slot.full.load(Ordering::Acquire), "put into a full slot");
        // SAFETY: the flag is clear, so the consumer does not touch this slot
        // until the release store below publishes it.
        unsafe { (*slot.item.get()).write(item) };
        slot.full.store(true, Ordering::Release);
        unsafe { *self.tail.get() = next(tail, self.slots.len()) };
    }

    /// Item at the read cursor, or `None` if the buffer is empty.
    pub(crate) fn top(&self) -> Option<&T> {
        // SAFETY: the read cursor is only accessed from the consumer side.
        let head = unsafe { *self.head.get() };
        let slot = &self.slots[head];
        if slot.full.load(Ordering::Acquire) {
            // SAFETY: the acquire load pairs with the producer's release
            // store, so the item write is visible; the producer will not
            // reuse the slot until the consumer clears the flag.
            Some(unsafe { (*slot.item.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Remove and return the item at the read cursor.
    ///
    /// Caller must be the single consumer and must have observed a non-empty
    /// `top()`.
    pub(crate) fn pop(&self) -> T {
        let head = unsafe { *self.head.get() };
        let slot = &self.slots[head];
        assert!(slot.full.load(Ordering::Acquire), "pop from an empty buffer");
        // SAFETY: flag is set, so the slot holds an initialized item that the
        // producer no longer touches.
        let item = unsafe { (*slot.item.get()).assume_init_read() };
        // Hand the slot back to the producer.
        slot.full.store(false, Ordering::Release);
        unsafe { *self.head.get() = next(head, self.slots.len()) };
        item
    }
}

#[inline]
fn next(cursor: usize, capacity: usize) -> usize {
    let n = cursor + 1;
    if n == capacity {
        0
    } else {
        n
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        // Drain whatever the consumer never read.
        while self.top().is_some() {
            drop(self.pop());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Buffer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fill_and_drain() {
        let buf = Buffer::new(4);
        assert_eq!(buf.capacity(), 4);
        for i in 0..4 {
            assert!(buf.has_space());
            buf.put(i);
        }
        assert!(!buf.has_space());
        for i in 0..4 {
            assert_eq!(buf.top(), Some(&i));
            assert_eq!(buf.pop(), i);
        }
        assert!(buf.top().is_none());
    }

    #[test]
    fn wraps_around() {
        let buf = Buffer::new(2);
        for i in 0..10 {
            buf.put(i);
            assert_eq!(buf.pop(), i);
        }
        assert!(buf.top().is_none());
        assert!(buf.has_space());
    }

    #[test]
    fn top_is_idempotent() {
        let buf = Buffer::new(2);
        buf.put(7);
        assert_eq!(buf.top(), Some(&7));
        assert_eq!(buf.top(), Some(&7));
        assert_eq!(buf.pop(), 7);
        assert!(buf.top().is_none());
    }

    #[test]
    fn drop_drains_unread_items() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let buf = Buffer::new(3);
        buf.put(Counted(drops.clone()));
        buf.put(Counted(drops.clone()));
        drop(buf.pop());
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        drop(buf);
        assert_eq!(drops.load(Ordering::Relaxed), 2);
    }
}
