//! Stream monitoring hooks.
//!
//! Observation callbacks for stream lifecycle and data movement, attached to
//! a descriptor at open time via [`crate::stream::Stream::open_monitored`].
//! Handlers must be cheap and must not panic; the stream code never invokes
//! them with the producer lock held.
//!
//! Events fire in protocol order: `blocked` just before the task suspends,
//! `woke` right after the peer is made ready, and `moved` only once the
//! operation has fully completed — after the deposit and any wakeup on the
//! write side, after the item is out of the buffer on the read side. The
//! item itself is not passed along: by the time `moved` fires for a write,
//! ownership has already crossed to the buffer (and possibly to the
//! consumer), so the event identifies the stream by uid.

use crate::debug::rn_debug;
use crate::stream::{Mode, StreamUid};

/// Per-descriptor observation callbacks. All methods default to no-ops, so
/// implementors only override the events they care about.
pub trait StreamMonitor: Send + Sync {
    /// The descriptor was bound to the stream.
    fn opened(&self, uid: StreamUid, mode: Mode) {
        let _ = (uid, mode);
    }

    /// The descriptor was released.
    fn closed(&self, uid: StreamUid) {
        let _ = uid;
    }

    /// The stream behind a read descriptor was swapped for a new one.
    fn replaced(&self, old_uid: StreamUid, new_uid: StreamUid) {
        let _ = (old_uid, new_uid);
    }

    /// The owning task is about to suspend on this descriptor.
    fn blocked(&self, uid: StreamUid) {
        let _ = uid;
    }

    /// An operation on this descriptor woke the peer task.
    fn woke(&self, uid: StreamUid) {
        let _ = uid;
    }

    /// An item finished crossing the descriptor.
    fn moved(&self, uid: StreamUid) {
        let _ = uid;
    }
}

/// Monitor that traces every event through the `RUNNEL_DEBUG` channel.
pub struct DebugMonitor;

impl StreamMonitor for DebugMonitor {
    fn opened(&self, uid: StreamUid, mode: Mode) {
        rn_debug!("stream {} opened for {:?}", uid, mode);
    }

    fn closed(&self, uid: StreamUid) {
        rn_debug!("stream {} closed", uid);
    }

    fn replaced(&self, old_uid: StreamUid, new_uid: StreamUid) {
        rn_debug!("stream {} replaced by {}", old_uid, new_uid);
    }

    fn blocked(&self, uid: StreamUid) {
        rn_debug!("blocked on stream {}", uid);
    }

    fn woke(&self, uid: StreamUid) {
        rn_debug!("woke peer of stream {}", uid);
    }

    fn moved(&self, uid: StreamUid) {
        rn_debug!("item moved on stream {}", uid);
    }
}
