//! Wire framing for the cephfs multiplexing proxy's request/reply
//! protocol: frame headers, the opcode table, version negotiation, and
//! the NUL-terminated-string payload convention. No I/O lives here; see
//! the `link` crate for the socket-level read/write loop that produces
//! and consumes the byte slices this crate encodes and decodes.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod opcode;
pub mod payload;
pub mod stat;
pub mod version;

pub use codec::{ReplyFrame, RequestFrame, MAX_PAYLOAD_LEN};
pub use envelope::{ReplyHeader, RequestHeader, COMMON_PREFIX_LEN, RESULT_LEN};
pub use error::CephfsError;
pub use opcode::Opcode;
pub use payload::{PayloadReader, PayloadWriter, ABSENT};
pub use stat::{WireAttrs, WireStatfs, WIRE_ATTRS_LEN, WIRE_STATFS_LEN};
pub use version::{decode_greeting, encode_greeting, negotiate, GreetingMode, ProtocolVersion, BINARY_CLIENT, CURRENT, TEXT_CLIENT};
