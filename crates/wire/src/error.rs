use thiserror::Error;

use crate::opcode::Opcode;

/// A handful of errno constants used across the workspace, kept local so
/// crates that only ever see these as symbolic wire values don't each pull
/// in a full `libc` binding just for this list.
pub mod errno {
    pub const ENODATA: i32 = 61;
    pub const ENOBUFS: i32 = 105;
    pub const ENOSYS: i32 = 38;
    pub const EOPNOTSUPP: i32 = 95;
    pub const ENOTCONN: i32 = 107;
    pub const ENOTSUP: i32 = 95;
    pub const EIO: i32 = 5;
    pub const EFAULT: i32 = 14;
    pub const EISCONN: i32 = 106;
    pub const ELOOP: i32 = 40;
    pub const ENOMEM: i32 = 12;
    pub const ENOSPC: i32 = 28;
}

/// Unified error type shared by the wire, handle, pool, and cache layers.
///
/// Every variant maps to a POSIX errno for propagation over the wire (see
/// [`CephfsError::errno`]) so a handler never has to hand-roll an errno
/// mapping; the table mirrors the error taxonomy each subsystem is
/// responsible for (framing, handle validation, pool state, path walking,
/// native client, resource exhaustion, connection loss).
#[derive(Debug, Error)]
pub enum CephfsError {
    #[error("frame truncated before the declared length could be read")]
    Truncated,

    #[error("frame payload of {requested} bytes exceeds the receive buffer capacity of {capacity}")]
    OversizeFrame { requested: u32, capacity: u32 },

    #[error("opcode {0} is outside the registered handler table")]
    UnknownOpcode(u16),

    #[error("opcode {0:?} is registered but not implemented")]
    Unimplemented(Opcode),

    #[error("connection is not established")]
    NotConnected,

    #[error("peer protocol major version {peer} is incompatible with ours ({ours})")]
    ProtocolMismatch { ours: u16, peer: u16 },

    /// A handle failed the scrambler's alignment or top-byte-zero check
    /// before scrambling, or its checksum/parity check after unscrambling.
    #[error("handle failed validation: {0}")]
    InvalidHandle(&'static str),

    /// A configuration call arrived after the owning instance had already
    /// mounted, or an unmount was attempted on an instance that was never
    /// mounted.
    #[error("instance state does not permit this operation: {0}")]
    InstanceState(&'static str),

    /// Symlink resolution exceeded the bounded indirection limit.
    #[error("too many levels of symbolic links")]
    SymlinkLoop,

    #[error("out of memory")]
    OutOfMemory,

    #[error("no space left on device")]
    NoSpace,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An error code returned by the native filesystem client, already in
    /// errno form (positive here; negated when written to the wire).
    #[error("native client error {0}")]
    Native(i32),
}

impl CephfsError {
    /// Returns the POSIX errno this error propagates to the wire as,
    /// always positive; callers negate it when writing the `result` field.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::Truncated => errno::ENODATA,
            Self::OversizeFrame { .. } => errno::ENOBUFS,
            Self::UnknownOpcode(_) => errno::ENOSYS,
            Self::Unimplemented(_) => errno::EOPNOTSUPP,
            Self::NotConnected => errno::ENOTCONN,
            Self::ProtocolMismatch { .. } => errno::ENOTSUP,
            Self::InvalidHandle(_) => errno::EFAULT,
            Self::InstanceState(_) => errno::EISCONN,
            Self::SymlinkLoop => errno::ELOOP,
            Self::OutOfMemory => errno::ENOMEM,
            Self::NoSpace => errno::ENOSPC,
            Self::Io(_) => errno::EIO,
            Self::Native(code) => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_taxonomy() {
        assert_eq!(CephfsError::Truncated.errno(), errno::ENODATA);
        assert_eq!(
            CephfsError::OversizeFrame { requested: 1, capacity: 0 }.errno(),
            errno::ENOBUFS
        );
        assert_eq!(CephfsError::UnknownOpcode(999).errno(), errno::ENOSYS);
        assert_eq!(CephfsError::NotConnected.errno(), errno::ENOTCONN);
        assert_eq!(CephfsError::InvalidHandle("parity").errno(), errno::EFAULT);
        assert_eq!(CephfsError::InstanceState("mounted").errno(), errno::EISCONN);
        assert_eq!(CephfsError::SymlinkLoop.errno(), errno::ELOOP);
        assert_eq!(CephfsError::Native(-2).errno(), -2);
    }
}
