//! Lazy, poison-on-failure connection to the daemon.
//!
//! The socket is opened on first use rather than at construction, so
//! building a session before the daemon is up does not fail by itself.
//! A connection that drops mid-call poisons the transport for good:
//! every subsequent call fails fast with `ENOTCONN` rather than retrying
//! into a daemon that may have crashed mid-protocol, or silently
//! resuming against a stream whose framing state is now unknown.

use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Mutex;

use link::{connect, read_full, write_all, StopSignal};
use logging::{log, Level};
use wire::{
    encode_greeting, CephfsError, GreetingMode, ProtocolVersion, ReplyFrame, RequestFrame, COMMON_PREFIX_LEN,
    MAX_PAYLOAD_LEN, RESULT_LEN,
};

struct NeverStop;
impl StopSignal for NeverStop {
    fn should_stop(&self) -> bool {
        false
    }
}

enum State {
    Disconnected,
    Connected(UnixStream),
    Poisoned,
}

/// One connection to `cephfsd`, shared by every [`crate::Session`] and
/// [`crate::MountedSession`] a process creates, exactly as a real
/// `libcephfsd`-backed process multiplexes many mounts over one stream
/// socket to the daemon.
pub struct Transport {
    socket: PathBuf,
    state: Mutex<State>,
}

impl Transport {
    #[must_use]
    pub fn new(socket: PathBuf) -> Self {
        Self { socket, state: Mutex::new(State::Disconnected) }
    }

    /// Sends one request and waits for its reply, serialized against any
    /// other in-flight call on this transport: the wire protocol is
    /// strictly request-then-reply, with no multiplexing of concurrent
    /// requests over a single connection.
    pub fn call(&self, opcode: u16, fixed: Vec<u8>, payload: Vec<u8>) -> Result<ReplyFrame, CephfsError> {
        let mut guard = self.state.lock().expect("transport mutex poisoned");
        if matches!(*guard, State::Poisoned) {
            return Err(CephfsError::NotConnected);
        }
        if matches!(*guard, State::Disconnected) {
            match self.open() {
                Ok(stream) => *guard = State::Connected(stream),
                Err(error) => {
                    *guard = State::Poisoned;
                    return Err(error);
                }
            }
        }
        let State::Connected(stream) = &*guard else {
            unreachable!("just ensured the connected branch above")
        };

        match exchange(stream, opcode, fixed, payload) {
            Ok(reply) => Ok(reply),
            Err(error) => {
                log!(Level::Warning, error.errno(), "connection to daemon lost: {error}");
                *guard = State::Poisoned;
                Err(error)
            }
        }
    }

    fn open(&self) -> Result<UnixStream, CephfsError> {
        let stream = connect(&self.socket).map_err(CephfsError::Io)?;
        let fd = stream.as_raw_fd();
        write_all(fd, &encode_greeting(GreetingMode::Binary), &NeverStop)?;

        let mut version_bytes = [0u8; 4];
        read_full(fd, &mut version_bytes, &NeverStop)?;
        let theirs = ProtocolVersion::from_host_bytes(version_bytes);
        wire::negotiate(wire::CURRENT, theirs)?;

        Ok(stream)
    }
}

fn exchange(stream: &UnixStream, opcode: u16, fixed: Vec<u8>, payload: Vec<u8>) -> Result<ReplyFrame, CephfsError> {
    let fd = stream.as_raw_fd();
    let request = RequestFrame { opcode, fixed, payload };
    let encoded = request.encode()?;
    write_all(fd, &encoded, &NeverStop)?;

    let mut prefix = [0u8; COMMON_PREFIX_LEN + RESULT_LEN];
    read_full(fd, &mut prefix, &NeverStop)?;
    let header = wire::ReplyHeader::from_bytes(prefix);
    if header.data_len > MAX_PAYLOAD_LEN {
        return Err(CephfsError::OversizeFrame { requested: header.data_len, capacity: MAX_PAYLOAD_LEN });
    }
    let mut rest = vec![0u8; header.trailing_fixed_len() + header.data_len as usize];
    read_full(fd, &mut rest, &NeverStop)?;

    let mut frame_bytes = Vec::with_capacity(prefix.len() + rest.len());
    frame_bytes.extend_from_slice(&prefix);
    frame_bytes.extend_from_slice(&rest);
    let (reply, _consumed) = ReplyFrame::decode(&frame_bytes)?;
    Ok(reply)
}
