//! Opaque 64-bit handles for slot-table indices, reversibly scrambled so
//! a client cannot infer or forge one without having been handed it by
//! the daemon first.

pub mod checksum;
pub mod scrambler;
pub mod slot;

pub use scrambler::Scrambler;
pub use slot::{decode, encode};
