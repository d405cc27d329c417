//! Inode and dentry caches shared by every mount session on a pooled
//! instance, plus the path walker built on top of them.

pub mod attrs;
pub mod dentry;
pub mod inode;
pub mod murmur;
pub mod walk;

pub use attrs::{AttrMask, Attrs};
pub use dentry::DentryTable;
pub use inode::{Inode, InodeTable};
pub use murmur::hash_name;
pub use walk::{walk, PathResolver, Step};
