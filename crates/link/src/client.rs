//! Client-side connection.

use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::signal::ignore_sigpipe;

/// Connects to the daemon's Unix socket at `path`, retrying on `EINTR`.
/// Any other connect failure (most commonly `ENOENT`/`ECONNREFUSED`
/// because no daemon is listening) is returned as-is.
pub fn connect(path: &Path) -> io::Result<UnixStream> {
    ignore_sigpipe();
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}
