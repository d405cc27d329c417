//! Ignoring `SIGPIPE` once, process-wide, and turning `SIGINT`/`SIGTERM`
//! into a flag the accept loop polls.
//!
//! Every connection handler writes to a peer that can disappear mid-write;
//! without this, the first write after a client closes its end kills the
//! whole daemon instead of surfacing as an `EPIPE` on that one connection.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Once, OnceLock};

use nix::sys::signal::{self, SigHandler, Signal};

static IGNORE_SIGPIPE: Once = Once::new();

/// Installs `SIG_IGN` for `SIGPIPE`. Idempotent and safe to call from
/// every connection handler; the underlying `sigaction(2)` call only
/// happens once per process.
pub fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| {
        // SAFETY: SIG_IGN is a valid disposition and this runs at most
        // once before any socket I/O starts.
        unsafe {
            signal::signal(Signal::SIGPIPE, SigHandler::SigIgn).expect("install SIGPIPE disposition");
        }
    });
}

static SHUTDOWN_REQUESTED: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Installs a handler for `SIGINT` and `SIGTERM` that sets a process-wide
/// flag, and returns a `'static` reference to it. Idempotent: the
/// registration only happens once per process, regardless of how many
/// times this is called.
///
/// `signal_hook::flag::register` does nothing but an atomic store inside
/// the handler, so it stays async-signal-safe; callers poll the returned
/// flag from ordinary code (e.g. `link::serve`'s `StopSignal`) rather
/// than doing any work inside the handler itself.
pub fn install_shutdown_handler() -> &'static AtomicBool {
    let flag = SHUTDOWN_REQUESTED.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone()).expect("register SIGINT shutdown flag");
        signal_hook::flag::register(signal_hook::consts::SIGTERM, flag.clone()).expect("register SIGTERM shutdown flag");
        flag
    });
    flag.as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_calls_do_not_panic() {
        ignore_sigpipe();
        ignore_sigpipe();
    }

    #[test]
    fn install_shutdown_handler_is_idempotent_and_returns_the_same_flag() {
        let first = install_shutdown_handler();
        let second = install_shutdown_handler();
        assert!(std::ptr::eq(first, second));
    }
}
