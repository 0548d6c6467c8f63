//! Task handles and the block/unblock protocol.
//!
//! A task is the unit that suspends on stream operations. Here a task is
//! bound to an OS thread: [`Task::current`] lazily binds the calling thread,
//! and [`spawn`] starts a closure on a fresh thread with a task pre-bound.
//!
//! Suspension goes through a three-way state machine over a single atomic:
//! `Running`, `Ready` (a wakeup landed but was not yet consumed), and
//! `Blocked(reason)`. A wakeup may arrive between the moment a task decides
//! to block (it observed a counter cross zero) and the moment it parks;
//! `block` consumes an early `Ready` without parking, so no wakeup is lost.

use std::cell::RefCell;
use std::sync::Arc;

use crate::debug::rn_debug;
use crate::sync::{self, AtomicBool, AtomicU64, AtomicU8, Mutex, Ordering, thread};

// Task state encoding. Values >= BLOCKED_INPUT are blocked states.
const RUNNING: u8 = 0;
const READY: u8 = 1;
const BLOCKED_INPUT: u8 = 2;
const BLOCKED_OUTPUT: u8 = 3;
const BLOCKED_ANY_INPUT: u8 = 4;

static TASK_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// Why a task suspended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// `read` on an empty stream.
    Input,
    /// `write` on a full stream.
    Output,
    /// `poll` with no data on any stream in the set.
    AnyInput,
}

impl BlockReason {
    fn encode(self) -> u8 {
        match self {
            BlockReason::Input => BLOCKED_INPUT,
            BlockReason::Output => BLOCKED_OUTPUT,
            BlockReason::AnyInput => BLOCKED_ANY_INPUT,
        }
    }
}

/// Observable task state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    /// A wakeup was delivered but the task has not yet resumed.
    Ready,
    Blocked(BlockReason),
}

/// A task bound to an OS thread.
pub struct Task {
    id: u64,
    state: AtomicU8,
    /// One-shot wakeup arbiter consumed by `StreamSet::poll` or by the
    /// single producer that wins the swap during a write.
    pub(crate) poll_token: AtomicBool,
    /// Uid of the stream whose arrival won the poll wakeup; 0 when empty.
    wakeup_uid: AtomicU64,
    thread: Mutex<Option<thread::Thread>>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<Task>>> = const { RefCell::new(None) };
}

impl Task {
    fn unbound() -> Self {
        Self {
            id: TASK_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            state: AtomicU8::new(RUNNING),
            poll_token: AtomicBool::new(false),
            wakeup_uid: AtomicU64::new(0),
            thread: Mutex::new(None),
        }
    }

    fn bind_current(self: &Arc<Self>) {
        *self.thread.lock().unwrap() = Some(thread::current());
        CURRENT.with(|c| *c.borrow_mut() = Some(self.clone()));
    }

    /// The task bound to the calling thread, binding one lazily if needed.
    pub fn current() -> Arc<Task> {
        CURRENT.with(|c| {
            c.borrow_mut()
                .get_or_insert_with(|| {
                    let task = Arc::new(Task::unbound());
                    *task.thread.lock().unwrap() = Some(thread::current());
                    task
                })
                .clone()
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => TaskState::Running,
            READY => TaskState::Ready,
            BLOCKED_INPUT => TaskState::Blocked(BlockReason::Input),
            BLOCKED_OUTPUT => TaskState::Blocked(BlockReason::Output),
            _ => TaskState::Blocked(BlockReason::AnyInput),
        }
    }

    /// Suspend the calling task until its peer delivers a wakeup.
    ///
    /// Must be called on the task's own thread, and only after the caller
    /// has published its intent through a counter transition (so that
    /// exactly one peer will call [`Task::unblock`]).
    pub(crate) fn block(&self, reason: BlockReason) {
        rn_debug!("task {} blocking on {:?}", self.id, reason);
        match self.state.compare_exchange(
            RUNNING,
            reason.encode(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(actual) => {
                // The wakeup beat us here; consume it and keep running.
                debug_assert_eq!(actual, READY, "unexpected task state on block");
                self.state.store(RUNNING, Ordering::Release);
                return;
            }
        }
        loop {
            sync::park();
            if self
                .state
                .compare_exchange(READY, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                rn_debug!("task {} resumed", self.id);
                return;
            }
            // Spurious unpark; the wakeup has not arrived yet.
        }
    }

    /// Mark the task ready and unpark it, without preempting the caller.
    ///
    /// Safe to call from any thread. The caller must own the wakeup (it
    /// observed the counter cross zero, or it won the poll token).
    pub(crate) fn unblock(&self) {
        let prev = self.state.swap(READY, Ordering::AcqRel);
        debug_assert_ne!(prev, READY, "double wakeup on task {}", self.id);
        rn_debug!("task {} unblocked (was {})", self.id, prev);
        if prev != RUNNING {
            // The peer has published a blocked state; it is parked or about
            // to park, so hand it the unpark token.
            if let Some(t) = self.thread.lock().unwrap().as_ref() {
                sync::unpark(t);
            }
        }
        // prev == RUNNING: the peer has not reached `block` yet; it will
        // consume READY there without parking.
    }

    pub(crate) fn set_wakeup(&self, uid: u64) {
        self.wakeup_uid.store(uid, Ordering::Release);
    }

    pub(crate) fn take_wakeup(&self) -> u64 {
        self.wakeup_uid.swap(0, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle for a spawned task thread.
pub struct TaskJoin<R> {
    task: Arc<Task>,
    handle: thread::JoinHandle<R>,
}

impl<R> TaskJoin<R> {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn join(self) -> R {
        self.handle.join().expect("task thread panicked")
    }
}

/// Run a closure on a fresh OS thread with a task bound to it.
pub fn spawn<F, R>(f: F) -> TaskJoin<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let task = Arc::new(Task::unbound());
    let bound = task.clone();
    let handle = thread::spawn(move || {
        bound.bind_current();
        f()
    });
    TaskJoin { task, handle }
}
