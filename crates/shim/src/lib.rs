//! Client library linked by consumer processes: marshals calls to
//! `cephfsd` over a lazily-established connection and maintains the
//! inode/dentry cache locally. See `daemon` for the process this talks
//! to and `wire` for the frame layout shared by both sides.
//!
//! The cache tables this crate drives (`cache::InodeTable`,
//! `cache::DentryTable`) are documented single-threaded by the upstream
//! shim; a multi-threaded consumer is expected to serialize its own
//! calls into one [`MountSession`], exactly as it would around the
//! native client library this replaces.

pub mod ffi;
pub mod session;
pub mod transport;
pub mod wire_calls;

use std::path::PathBuf;
use std::sync::Arc;

pub use session::{MountSession, Session};
pub use transport::Transport;

/// Opens a lazily-connecting transport to `cephfsd` at `socket`, shared
/// by every [`Session`]/[`MountSession`] this process creates.
#[must_use]
pub fn connect(socket: impl Into<PathBuf>) -> Arc<Transport> {
    Arc::new(Transport::new(socket.into()))
}
