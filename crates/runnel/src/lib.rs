//! Bounded SPSC streams with task blocking and poll.
//!
//! runnel is the stream layer of a cooperative task runtime: many tasks,
//! each bound to a thread of execution, communicate exclusively through
//! unidirectional single-producer/single-consumer streams with bounded
//! buffers. A consumer waiting on several inputs uses [`StreamSet::poll`]
//! to sleep until any one of them has data.
//!
//! # Architecture
//!
//! ```text
//! task (producer)                          task (consumer)
//!   StreamDesc ──write──▶ Stream ──read──▶ StreamDesc
//!                │  Buffer (lock-free SPSC ring)
//!                │  n_sem / e_sem (signed wakeup counters)
//!                │  prod_lock + is_poll (poll handoff)
//!                ▼
//!          blocked peer woken by the side that crosses zero
//! ```
//!
//! - [`buffer`]: the FastForward-style ring — lock-free, slot-flag based.
//! - [`stream`]: streams, descriptors, and the read/write suspend protocol.
//! - [`set`]: ordered descriptor sets and the poll primitive.
//! - [`task`]: thread-bound tasks with the block/unblock handshake.
//! - [`monitor`]: observation callbacks for lifecycle and data movement.
//!
//! Set `RUNNEL_DEBUG=1` for protocol traces on stderr.

mod buffer;
mod debug;
pub mod monitor;
pub mod set;
pub mod stream;
mod sync;
pub mod task;

pub use monitor::{DebugMonitor, StreamMonitor};
pub use set::{SetIter, StreamSet};
pub use stream::{Full, Mode, Stream, StreamDesc, StreamUid, DEFAULT_CAPACITY};
pub use task::{spawn, BlockReason, Task, TaskJoin, TaskState};
