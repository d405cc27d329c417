//! Listener setup and the accept loop.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use logging::{log, Level};

use crate::io::StopSignal;
use crate::signal::ignore_sigpipe;

/// Binds and listens on a Unix stream socket at `path`, removing a
/// stale socket file left behind by a crashed previous run first.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    ignore_sigpipe();
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Accepts connections until `stop` reports true, handing each one to
/// `handler`. An `EINTR` from `accept(2)` is retried unless `stop` says
/// to give up; any other accept error is logged and the loop continues,
/// mirroring the daemon staying up through a transient per-connection
/// failure.
pub fn serve(listener: &UnixListener, stop: &impl StopSignal, mut handler: impl FnMut(UnixStream)) {
    while !stop.should_stop() {
        match listener.accept() {
            Ok((stream, _addr)) => handler(stream),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                if stop.should_stop() {
                    break;
                }
            }
            Err(err) => {
                log!(Level::Error, err.raw_os_error().unwrap_or(0), "failed to accept a connection: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    struct FlagStop<'a>(&'a AtomicBool);
    impl StopSignal for FlagStop<'_> {
        fn should_stop(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn bind_removes_a_stale_socket_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cephfsd.sock");
        std::fs::write(&path, b"stale").unwrap();
        let listener = bind(&path).unwrap();
        assert!(listener.as_raw_fd() >= 0);
    }

    #[test]
    fn serve_stops_once_flagged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cephfsd.sock");
        let listener = bind(&path).unwrap();
        listener.set_nonblocking(true).unwrap();
        let stopped = AtomicBool::new(true);
        let mut calls = 0;
        serve(&listener, &FlagStop(&stopped), |_| calls += 1);
        assert_eq!(calls, 0);
    }
}
