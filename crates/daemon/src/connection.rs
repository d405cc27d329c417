//! Per-connection state machine: `Greeting -> Ready -> Closed`.
//!
//! Each accepted connection gets its own [`ConnectionState`] (its own
//! slot table and scrambler) and runs entirely on the thread that
//! accepted it; nothing here is shared across connections except the
//! `Arc`-wrapped pool and credential table.

use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;

use link::{read_full, write_all, StopSignal};
use logging::{log, Level};
use pool::{CredentialTable, Pool};
use wire::{decode_greeting, CephfsError, GreetingMode, ReplyFrame, RequestFrame, COMMON_PREFIX_LEN, MAX_PAYLOAD_LEN};

use crate::dispatch::dispatch;
use crate::state::ConnectionState;

/// Services one accepted connection until the peer disconnects, a
/// framing error occurs, or `stop` is raised. Errors are logged and end
/// the connection; they never propagate to the accept loop, matching
/// the daemon staying up through one bad peer.
pub fn handle(stream: UnixStream, pool: Arc<Pool>, credentials: Arc<CredentialTable>, snapshot_dir: PathBuf, stop: &impl StopSignal) {
    if let Err(error) = run(&stream, pool, credentials, snapshot_dir, stop) {
        log!(Level::Warning, error.errno(), "connection closed: {error}");
    }
}

fn run(stream: &UnixStream, pool: Arc<Pool>, credentials: Arc<CredentialTable>, snapshot_dir: PathBuf, stop: &impl StopSignal) -> Result<(), CephfsError> {
    let fd = stream.as_raw_fd();

    let mut greeting = [0u8; 4];
    read_full(fd, &mut greeting, stop)?;
    match decode_greeting(greeting) {
        Some(GreetingMode::Binary) => {
            write_all(fd, &wire::CURRENT.to_host_bytes(), stop)?;
        }
        Some(GreetingMode::Text) => {
            log!(Level::Info, 0, "text-protocol client connected; closing (unsupported)");
            return Ok(());
        }
        None => {
            log!(Level::Warning, 0, "unrecognized greeting {:02x?}", greeting);
            return Err(CephfsError::NotConnected);
        }
    }

    let mut state = ConnectionState::new(pool, credentials, snapshot_dir);

    loop {
        let mut prefix = [0u8; COMMON_PREFIX_LEN];
        match read_full(fd, &mut prefix, stop) {
            Ok(()) => {}
            Err(CephfsError::Truncated) => return Ok(()),
            Err(error) => return Err(error),
        }

        let header = wire::RequestHeader::from_bytes(prefix);
        if header.data_len > MAX_PAYLOAD_LEN {
            return Err(CephfsError::OversizeFrame { requested: header.data_len, capacity: MAX_PAYLOAD_LEN });
        }
        let mut rest = vec![0u8; header.fixed_len() + header.data_len as usize];
        read_full(fd, &mut rest, stop)?;

        let mut frame_bytes = Vec::with_capacity(COMMON_PREFIX_LEN + rest.len());
        frame_bytes.extend_from_slice(&prefix);
        frame_bytes.extend_from_slice(&rest);
        let (request, _consumed) = RequestFrame::decode(&frame_bytes)?;

        let reply = dispatch(&mut state, &request);
        let encoded = encode_or_truncate(reply);
        write_all(fd, &encoded, stop)?;
    }
}

/// An oversize reply payload (never expected from this daemon's own
/// handlers, all of which emit bounded fixed-size or single-string
/// replies) is reported to the peer as `ENOBUFS` rather than silently
/// truncated.
fn encode_or_truncate(reply: ReplyFrame) -> Vec<u8> {
    reply.encode().unwrap_or_else(|error| {
        ReplyFrame { result: -error.errno(), fixed: Vec::new(), payload: Vec::new() }
            .encode()
            .expect("an empty reply frame always fits")
    })
}
