//! Native client instance pooling: deduplicating mounted Ceph client
//! instances across sessions whose configuration histories hash
//! identically, plus the process-global credential handle table.

pub mod change;
pub mod client;
pub mod credential;
pub mod instance;
pub mod pool;
pub mod snapshot;

pub use change::{Change, ChangeKind, ChangeLog};
pub use client::{NativeAttrs, NativeClient, NativeClientFactory, NativeFile, NativeInode, NativeStatfs};
pub use credential::{CredentialTable, UserPerm};
pub use instance::Instance;
pub use pool::{Mounted, Pool, Session};
pub use snapshot::{snapshot, ConfigSnapshot};
