//! Process-wide log bus and verbosity level used by the daemon and shim.
//!
//! Subscribers register a callback receiving `(level, errno, message)` as
//! described by the wire-visible log contract; messages are rendered into a
//! per-thread fixed buffer (see [`scratch`]) so logging never allocates on
//! the hot path and never re-enters while a subscriber callback is running.

mod bus;
mod level;
mod scratch;
#[cfg(feature = "tracing")]
mod tracing_bridge;

pub use bus::{LogBus, SubscriptionId, Subscriber};
pub use level::Level;
#[cfg(feature = "tracing")]
pub use tracing_bridge::install as install_tracing_bridge;

use std::sync::OnceLock;

static GLOBAL_BUS: OnceLock<LogBus> = OnceLock::new();

/// Returns the process-wide log bus, creating it on first use.
///
/// Unlike the instance pool and handle scramblers (see the `pool` and
/// `handle` crates), the log bus has no explicit `init()`: subscribers may
/// legitimately register before the daemon's accept loop starts (e.g. to
/// capture startup diagnostics), so lazy creation of the empty subscriber
/// list carries none of the footgun that lazy-initializing stateful
/// services would.
pub fn bus() -> &'static LogBus {
    GLOBAL_BUS.get_or_init(LogBus::new)
}

/// Renders `args` and emits it to every registered subscriber at `level`,
/// attaching `errno` (0 when not applicable). Prefer the [`log!`] macro at
/// call sites.
pub fn record(level: Level, errno: i32, args: std::fmt::Arguments<'_>) {
    bus().record(level, errno, args);
}

/// Formats and emits a log record, e.g. `log!(Level::Warning, 0, "snapshot {} is untrusted", name)`.
#[macro_export]
macro_rules! log {
    ($level:expr, $errno:expr, $($arg:tt)*) => {
        $crate::record($level, $errno, format_args!($($arg)*))
    };
}

/// Emits a critical record and then aborts the process. Reserved for the
/// allocation-failure-inside-a-mutex-held-critical-section case and for
/// mutex-acquisition failures, which spec.md §7 documents as programmer
/// error rather than recoverable state.
#[macro_export]
macro_rules! log_critical_and_abort {
    ($errno:expr, $($arg:tt)*) => {{
        $crate::record($crate::Level::Critical, $errno, format_args!($($arg)*));
        ::std::process::abort();
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn macro_reaches_global_bus() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let id = bus().register(Arc::new(move |_, _, _: &str| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        log!(Level::Info, 0, "test record {}", 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        bus().deregister(id);
    }
}
