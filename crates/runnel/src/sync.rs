//! Synchronization primitives, switchable between std and loom.
//!
//! Protocol code imports atomics, locks, and threading from here so that a
//! `--cfg loom` build swaps in loom's deterministic versions without touching
//! the call sites.

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicU8, Ordering};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, AtomicU8, Ordering};

#[cfg(loom)]
pub(crate) use loom::sync::Mutex;

#[cfg(not(loom))]
pub(crate) use std::sync::Mutex;

#[cfg(loom)]
pub(crate) use loom::thread;

#[cfg(not(loom))]
pub(crate) use std::thread;

// =============================================================================
// Thread parking
// =============================================================================

// Loom has no park/unpark; a yield is enough for the model checker to explore
// the schedules around the parking point.

#[cfg(loom)]
pub(crate) fn park() {
    loom::thread::yield_now();
}

#[cfg(not(loom))]
pub(crate) fn park() {
    std::thread::park();
}

#[cfg(loom)]
pub(crate) fn unpark(thread: &loom::thread::Thread) {
    thread.unpark();
}

#[cfg(not(loom))]
pub(crate) fn unpark(thread: &std::thread::Thread) {
    thread.unpark();
}
