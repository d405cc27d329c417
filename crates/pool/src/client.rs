//! The external collaborator interface: everything this crate needs
//! from the native filesystem client library, kept as a trait so tests
//! run against an in-memory fake (see the `test-support` crate) instead
//! of a real Ceph cluster.

use std::path::Path;

use wire::CephfsError;

/// A native stat result, always returned in full by the underlying
/// client (unlike the wire reply the daemon builds from it, which a
/// caller's cache may only partially trust - see `cache::AttrMask` on
/// the shim side).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeAttrs {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// One resolved or created native inode: the opaque handle the client
/// library uses internally plus the stat it returned in the same call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeInode {
    pub native: u64,
    pub attrs: NativeAttrs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeStatfs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
    pub files_free: u64,
}

/// One open file descriptor (`Fh*` in the C API), returned alongside the
/// inode a `create`/`open` call resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeFile {
    pub native: u64,
}

/// One native client handle (`ceph_mount_info` in the C API). A pooled
/// [`crate::Instance`] owns exactly one of these; sharing happens at the
/// instance level, never by handing the same `NativeClient` to two
/// instances.
pub trait NativeClient: Send + Sync {
    fn conf_read_file(&self, path: &Path) -> Result<(), CephfsError>;
    fn conf_get(&self, name: &str) -> Result<String, CephfsError>;
    fn conf_set(&self, name: &str, value: &str) -> Result<(), CephfsError>;
    fn select_filesystem(&self, name: &str) -> Result<(), CephfsError>;
    fn init(&self) -> Result<(), CephfsError>;
    fn mount(&self, root: &str) -> Result<(), CephfsError>;
    fn unmount(&self) -> Result<(), CephfsError>;

    fn statfs(&self) -> Result<NativeStatfs, CephfsError>;
    fn root_inode(&self) -> Result<NativeInode, CephfsError>;
    fn lookup(&self, parent: u64, name: &str) -> Result<NativeInode, CephfsError>;
    fn getattr(&self, ino: u64) -> Result<NativeAttrs, CephfsError>;
    fn readlink(&self, ino: u64) -> Result<String, CephfsError>;
    fn mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<NativeInode, CephfsError>;
    fn unlink(&self, parent: u64, name: &str) -> Result<(), CephfsError>;
    fn rmdir(&self, parent: u64, name: &str) -> Result<(), CephfsError>;
    fn symlink(&self, parent: u64, name: &str, target: &str) -> Result<NativeInode, CephfsError>;
    /// Drops the native client's own reference to `ino` (`ceph_ll_put`).
    fn put(&self, ino: u64) -> Result<(), CephfsError>;

    /// Creates and opens `name` under `parent` (`ceph_ll_create`),
    /// returning both the new inode and the file descriptor opened
    /// against it in the same call.
    fn create_file(&self, parent: u64, name: &str, mode: u32, flags: u32) -> Result<(NativeInode, NativeFile), CephfsError>;
    /// Opens an already-resolved inode (`ceph_ll_open`).
    fn open(&self, ino: u64, flags: u32) -> Result<NativeFile, CephfsError>;
    /// Reads up to `len` bytes at `offset` (`ceph_ll_read`); the returned
    /// vector's length is the short-read count, never padded to `len`.
    fn read(&self, file: NativeFile, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError>;
    /// Writes `data` at `offset` (`ceph_ll_write`), returning the number
    /// of bytes actually written.
    fn write(&self, file: NativeFile, offset: i64, data: &[u8]) -> Result<u64, CephfsError>;
    /// Closes a file descriptor opened by [`NativeClient::create_file`]
    /// or [`NativeClient::open`] (`ceph_ll_close`).
    fn close(&self, file: NativeFile) -> Result<(), CephfsError>;
}

/// Mints a fresh [`NativeClient`] for a given instance identifier,
/// mirroring `ceph_create(&cmount, id)`. A real deployment backs this
/// with FFI into libcephfs; tests back it with an in-memory fake.
pub trait NativeClientFactory: Send + Sync {
    fn create(&self, id: &str) -> Result<Box<dyn NativeClient>, CephfsError>;
}
