//! Env-gated debug logging.
//!
//! Set `RUNNEL_DEBUG=1` to get protocol traces on stderr. This is the
//! low-level tracing channel; structured observation goes through
//! [`crate::monitor::StreamMonitor`].

pub(crate) fn debug_enabled() -> bool {
    use std::sync::OnceLock;
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var("RUNNEL_DEBUG").map_or(false, |v| v == "1"))
}

macro_rules! rn_debug {
    ($($arg:tt)*) => {
        if $crate::debug::debug_enabled() {
            eprintln!("[runnel] {}", format!($($arg)*));
        }
    };
}

pub(crate) use rn_debug;
