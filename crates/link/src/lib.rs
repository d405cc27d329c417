//! Unix stream socket transport: listener setup, the accept loop, client
//! connect, and the `EINTR`/stop-flag-aware partial read/write loops the
//! daemon and shim both build their framing on top of.

pub mod client;
pub mod io;
pub mod server;
pub mod signal;

pub use client::connect;
pub use io::{read_full, write_all, StopSignal};
pub use server::{bind, serve};
