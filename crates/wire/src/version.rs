//! The connection-opening greeting: a 4-byte client identifier in network
//! byte order (the one exchange that is *not* host-order, so a
//! protocol-mismatch peer can be told apart from an endianness mismatch),
//! answered by a host-order `{major, minor}` pair for binary clients.

use crate::error::CephfsError;

/// Sent by a client that speaks the binary request/reply protocol this
/// crate implements.
pub const BINARY_CLIENT: u32 = 0x4C42_4358;
/// Sent by a client that wants the diagnostic text REPL; out of scope
/// beyond recognizing the identifier and switching the connection into
/// text mode (see `daemon::connection::GreetingMode`).
pub const TEXT_CLIENT: u32 = 0x4C54_5854;

/// Current protocol version advertised by this daemon. Bump `minor` when a
/// new opcode is appended; bump `major` only for an incompatible framing
/// change.
pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    #[must_use]
    pub fn to_host_bytes(self) -> [u8; 4] {
        let mut buf = [0u8; 4];
        buf[0..2].copy_from_slice(&self.major.to_ne_bytes());
        buf[2..4].copy_from_slice(&self.minor.to_ne_bytes());
        buf
    }

    #[must_use]
    pub fn from_host_bytes(bytes: [u8; 4]) -> Self {
        Self {
            major: u16::from_ne_bytes([bytes[0], bytes[1]]),
            minor: u16::from_ne_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Identifier sent by the connecting peer, decoded from network byte order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GreetingMode {
    Binary,
    Text,
}

/// Parses the 4-byte greeting. Any value other than the two recognized
/// identifiers is a protocol error (the caller should log and close).
pub fn decode_greeting(wire_bytes: [u8; 4]) -> Option<GreetingMode> {
    let value = u32::from_be_bytes(wire_bytes);
    if value == BINARY_CLIENT {
        Some(GreetingMode::Binary)
    } else if value == TEXT_CLIENT {
        Some(GreetingMode::Text)
    } else {
        None
    }
}

#[must_use]
pub fn encode_greeting(mode: GreetingMode) -> [u8; 4] {
    let value = match mode {
        GreetingMode::Binary => BINARY_CLIENT,
        GreetingMode::Text => TEXT_CLIENT,
    };
    value.to_be_bytes()
}

/// Client-side check after receiving the daemon's version reply: the
/// client disconnects with `ENOTSUP` if majors differ or its own minor
/// exceeds the daemon's.
pub fn negotiate(ours: ProtocolVersion, theirs: ProtocolVersion) -> Result<(), CephfsError> {
    if ours.major != theirs.major || ours.minor > theirs.minor {
        return Err(CephfsError::ProtocolMismatch {
            ours: ours.major,
            peer: theirs.major,
        });
    }
    Ok(())
}
