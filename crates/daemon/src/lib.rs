//! Multiplexing proxy daemon: accepts connections on a Unix stream
//! socket, mounts a shared native filesystem client per configuration
//! digest, and serves data-plane requests over the binary wire
//! protocol. See `wire`, `handle`, `pool`, and `link` for the layers
//! this crate wires together; this crate owns the process entry point
//! and per-connection dispatch only.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod messages;
#[cfg(feature = "native-cephfs")]
pub mod native;
pub mod state;

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use link::{bind, serve, StopSignal};
use logging::{log, Level};
use pool::{CredentialTable, Pool};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::DaemonConfig;

/// Outcome of a full `run` invocation, independent of how the process
/// reports it (see [`exit_code_from`]).
#[derive(Debug)]
pub enum Status {
    /// The accept loop ran and returned because it was asked to stop.
    Stopped,
    /// Argument parsing failed; `message` has already been written to
    /// the caller's stderr handle.
    UsageError,
    /// The listening socket could not be bound.
    BindFailed,
}

/// Translates a [`Status`] into the process exit code `main` returns,
/// mirroring the daemon's own `oc-rsyncd` binary's delegation to its
/// library crate's `run`/`exit_code_from` pair.
#[must_use]
pub fn exit_code_from(status: Status) -> ExitCode {
    match status {
        Status::Stopped => ExitCode::SUCCESS,
        Status::UsageError | Status::BindFailed => ExitCode::FAILURE,
    }
}

struct AtomicStop<'a>(&'a AtomicBool);
impl StopSignal for AtomicStop<'_> {
    fn should_stop(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Needs no native client implementation to live in this crate: the
/// daemon only knows it needs *a* [`pool::NativeClientFactory`], not
/// which one. A real deployment links this crate against whatever
/// `NativeClientFactory` wraps the system's native filesystem client
/// library; this function takes the factory as a parameter rather than
/// constructing one itself so tests can supply a fake.
pub fn run_with_factory(
    args: impl IntoIterator<Item = OsString>,
    stderr: &mut impl Write,
    factory: Box<dyn pool::NativeClientFactory>,
    stop: &AtomicBool,
) -> Status {
    let config = match DaemonConfig::from_args(args) {
        Ok(config) => config,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            return Status::UsageError;
        }
    };

    let listener = match bind(&config.socket) {
        Ok(listener) => listener,
        Err(error) => {
            let _ = writeln!(stderr, "failed to bind {}: {error}", config.socket.display());
            return Status::BindFailed;
        }
    };

    let pool = Arc::new(Pool::new(factory));
    let credentials = Arc::new(CredentialTable::new(handle::Scrambler::new(&mut StdRng::from_entropy())));

    log!(Level::Info, 0, "listening on {}", config.socket.display());

    let stop_signal = AtomicStop(stop);
    serve(&listener, &stop_signal, |stream| {
        let pool = pool.clone();
        let credentials = credentials.clone();
        let snapshot_dir = config.snapshot_dir.clone();
        connection::handle(stream, pool, credentials, snapshot_dir, &stop_signal);
    });

    Status::Stopped
}
