//! Partial-I/O loops over a connected socket.
//!
//! `std::net`/`std::os::unix::net` already retry `EINTR` internally, but
//! that retry can't be told to give up when the daemon is shutting down.
//! These helpers go through `nix`'s thin `read(2)`/`write(2)` wrappers
//! so a caller-supplied [`StopSignal`] gets a chance to abort a read or
//! write that is stuck retrying against a peer that will never send or
//! accept more data.

use std::io;
use std::os::unix::io::RawFd;

use nix::errno::Errno;
use nix::unistd::{read, write};
use wire::CephfsError;

/// Checked between `EINTR` retries; a connection handler's stop flag
/// implements this so a signal that should shut the daemon down can cut
/// a blocked read or write short instead of waiting for the peer.
pub trait StopSignal {
    fn should_stop(&self) -> bool;
}

impl StopSignal for () {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Reads until `buffer` is full, `0 <= n < buffer.len()` bytes arrive as
/// two or more `read(2)` calls, or the peer closes (returning
/// `Err(Truncated)` for a short read at EOF).
pub fn read_full(fd: RawFd, buffer: &mut [u8], stop: &impl StopSignal) -> Result<(), CephfsError> {
    let mut filled = 0usize;
    while filled < buffer.len() {
        match read(fd, &mut buffer[filled..]) {
            Ok(0) => return Err(CephfsError::Truncated),
            Ok(n) => filled += n,
            Err(Errno::EINTR) => {
                if stop.should_stop() {
                    return Err(CephfsError::Io(io::Error::from(Errno::EINTR)));
                }
            }
            Err(errno) => return Err(CephfsError::Io(io::Error::from(errno))),
        }
    }
    Ok(())
}

/// Writes all of `buffer`, looping over short writes the same way
/// [`read_full`] loops over short reads.
pub fn write_all(fd: RawFd, buffer: &[u8], stop: &impl StopSignal) -> Result<(), CephfsError> {
    // SAFETY: `fd` is caller-owned and stays open for the duration of
    // this call; this borrow never outlives it.
    let fd = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    let mut sent = 0usize;
    while sent < buffer.len() {
        match write(fd, &buffer[sent..]) {
            Ok(0) => return Err(CephfsError::Io(io::Error::new(io::ErrorKind::WriteZero, "no data written to socket"))),
            Ok(n) => sent += n,
            Err(Errno::EINTR) => {
                if stop.should_stop() {
                    return Err(CephfsError::Io(io::Error::from(Errno::EINTR)));
                }
            }
            Err(errno) => return Err(CephfsError::Io(io::Error::from(errno))),
        }
    }
    Ok(())
}
