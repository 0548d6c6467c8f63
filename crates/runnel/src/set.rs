//! Ordered sets of read descriptors and the poll primitive.
//!
//! A consumer that serves several input streams keeps their descriptors in a
//! [`StreamSet`] and calls [`StreamSet::poll`] to sleep until any of them
//! has data. The set is cyclic: traversal starts at a head index that poll
//! rotates just past the stream that woke the task, which approximates
//! round-robin fairness across inputs.

use std::sync::Arc;

use crate::debug::rn_debug;
use crate::stream::{Mode, StreamDesc};
use crate::sync::Ordering;
use crate::task::{BlockReason, Task};

/// An ordered, cyclic collection of read descriptors owned by one consumer
/// task.
pub struct StreamSet<T> {
    descs: Vec<Arc<StreamDesc<T>>>,
    /// Index where the next traversal starts.
    head: usize,
}

impl<T> StreamSet<T> {
    pub fn new() -> Self {
        Self {
            descs: Vec::new(),
            head: 0,
        }
    }

    /// Append a read descriptor to the set.
    pub fn add(&mut self, sd: Arc<StreamDesc<T>>) {
        assert_eq!(sd.mode(), Mode::Read, "poll sets hold read descriptors");
        debug_assert!(
            self.descs.iter().all(|d| Arc::ptr_eq(d.task(), sd.task())),
            "all descriptors in a set must belong to one task"
        );
        self.descs.push(sd);
    }

    /// Remove a descriptor from the set. Returns whether it was present.
    pub fn remove(&mut self, sd: &Arc<StreamDesc<T>>) -> bool {
        let Some(pos) = self.descs.iter().position(|d| Arc::ptr_eq(d, sd)) else {
            return false;
        };
        self.descs.remove(pos);
        if self.head > pos {
            self.head -= 1;
        }
        if self.descs.is_empty() {
            self.head = 0;
        } else {
            self.head %= self.descs.len();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    /// Cyclic traversal over the set, starting at the current head.
    pub fn iter(&self) -> SetIter<'_, T> {
        SetIter { set: self, pos: 0 }
    }

    /// Suspend the owning task until one of the streams in the set has data,
    /// then return that stream's descriptor.
    ///
    /// On return the set head is rotated just past the returned descriptor,
    /// so the next traversal (and the next poll's scan) starts with the
    /// stream after the one that was ready.
    pub fn poll(&mut self) -> Arc<StreamDesc<T>> {
        assert!(!self.descs.is_empty(), "poll on an empty stream set");
        let task = self.descs[0].task().clone();
        debug_assert!(
            Arc::ptr_eq(&task, &Task::current()),
            "poll from a task that does not own the set"
        );

        // Arm. The token is a one-shot election between our own scan and
        // the producers writing while we scan: whoever swaps it to false
        // owns the wakeup.
        task.poll_token.store(true, Ordering::SeqCst);

        let mut armed = 0usize;
        let mut suspend = true;
        for sd in self.iter() {
            let stream = sd.stream();
            let mut gate = stream.prod_lock.lock().unwrap();
            if stream.buffer.top().is_some() {
                // Data is already here; take the token back if no producer
                // beat us to it. Losing the swap means a wakeup is already
                // in flight for one of the armed streams.
                if task.poll_token.swap(false, Ordering::SeqCst) {
                    task.set_wakeup(stream.uid);
                    suspend = false;
                }
                drop(gate);
                break;
            }
            // Empty: register the stream as an activator for this poll.
            gate.is_poll = true;
            armed += 1;
        }
        rn_debug!("task {} polled, armed {} streams", task.id(), armed);

        if suspend {
            task.block(BlockReason::AnyInput);
        }
        debug_assert!(!task.poll_token.load(Ordering::SeqCst));

        // Disarm. The scan stops at the first non-empty stream, so the
        // streams armed above are exactly the first `armed` entries of the
        // traversal; clearing that prefix visits every flag we set. A stale
        // flag must not survive here: the consumer may close these streams
        // before its next poll, and a later producer would then try to reach
        // a consumer descriptor that no longer exists.
        let mut remaining = armed;
        for sd in self.iter() {
            if remaining == 0 {
                break;
            }
            sd.stream().prod_lock.lock().unwrap().is_poll = false;
            remaining -= 1;
        }

        // Rotate the set just past the stream that won the wakeup.
        let uid = task.take_wakeup();
        let pos = self
            .descs
            .iter()
            .position(|d| d.uid() == uid)
            .expect("wakeup stream is not in the polled set");
        self.head = (pos + 1) % self.descs.len();
        self.descs[pos].clone()
    }
}

impl<T> Default for StreamSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restartable cyclic iterator over a [`StreamSet`].
pub struct SetIter<'a, T> {
    set: &'a StreamSet<T>,
    pos: usize,
}

impl<T> SetIter<'_, T> {
    /// Restart the traversal from the set head.
    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl<'a, T> Iterator for SetIter<'a, T> {
    type Item = &'a Arc<StreamDesc<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.set.descs.len() {
            return None;
        }
        let idx = (self.set.head + self.pos) % self.set.descs.len();
        self.pos += 1;
        Some(&self.set.descs[idx])
    }
}
