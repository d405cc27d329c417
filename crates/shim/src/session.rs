//! Two-phase instance lifecycle mirroring the daemon's own
//! `Configuring`/`Mounted` split: a [`Session`] only talks configuration
//! opcodes, and turns into a [`MountSession`] once `mount` succeeds.
//!
//! The dentry cache owns exactly one reference to every inode it names:
//! creating a mapping takes a reference, overwriting or removing one
//! drops it. A directory's cached entry is therefore always safe to
//! `peek` for its native handle without taking a fresh reference of our
//! own - something already keeps it alive for as long as it is
//! reachable by name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cache::{DentryTable, Inode, InodeTable, PathResolver, Step};
use wire::CephfsError;

use crate::transport::Transport;
use crate::wire_calls;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;
const O_CREAT: i32 = 0o100;

fn is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Splits `path` into its parent directory and final component, the way
/// every create/remove/rename opcode addresses its target: by a
/// (directory, name) pair rather than the full path.
fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(index) => (&path[..index], &path[index + 1..]),
        None => (".", path),
    }
}

/// A configured-but-not-yet-mounted instance.
pub struct Session {
    transport: Arc<Transport>,
    handle: u64,
}

impl Session {
    pub fn create(transport: Arc<Transport>, id: &str) -> Result<Self, CephfsError> {
        let handle = wire_calls::create(&transport, id)?;
        Ok(Self { transport, handle })
    }

    pub fn conf_read_file(&self, path: &str) -> Result<(), CephfsError> {
        wire_calls::conf_read_file(&self.transport, self.handle, path)
    }

    pub fn conf_get(&self, name: &str) -> Result<String, CephfsError> {
        wire_calls::conf_get(&self.transport, self.handle, name)
    }

    pub fn conf_set(&self, name: &str, value: &str) -> Result<(), CephfsError> {
        wire_calls::conf_set(&self.transport, self.handle, name, value)
    }

    pub fn select_filesystem(&self, name: &str) -> Result<(), CephfsError> {
        wire_calls::select_filesystem(&self.transport, self.handle, name)
    }

    pub fn init(&self) -> Result<(), CephfsError> {
        wire_calls::init(&self.transport, self.handle)
    }

    pub fn release(self) -> Result<(), CephfsError> {
        wire_calls::release(&self.transport, self.handle)
    }

    /// Mounts at `root`, consuming the session. A failed mount destroys
    /// the instance on the daemon side too; there is nothing left to
    /// release, a fresh [`Session::create`] is the only way forward.
    pub fn mount(self, root: &str) -> Result<MountSession, CephfsError> {
        wire_calls::mount(&self.transport, self.handle, root)?;
        let (root_handle, attrs) = wire_calls::lookup_root(&self.transport, self.handle)?;
        let inodes = InodeTable::new();
        let root_inode = inodes.create(root_handle, attrs)?;
        Ok(MountSession {
            transport: self.transport,
            instance_handle: self.handle,
            root_ino: root_inode.ino(),
            cwd_ino: Mutex::new(root_inode.ino()),
            inodes,
            dentries: DentryTable::new(),
            open_files: Mutex::new(HashMap::new()),
            next_fd: Mutex::new(0),
        })
    }
}

/// A mounted instance: owns the path-resolution caches for everything
/// reachable under its root, and the transport connection's instance
/// handle used to scope every call to this mount.
pub struct MountSession {
    transport: Arc<Transport>,
    instance_handle: u64,
    root_ino: u64,
    cwd_ino: Mutex<u64>,
    inodes: InodeTable,
    dentries: DentryTable,
    /// Maps a caller-visible file descriptor to the daemon-assigned file
    /// handle backing it. The daemon's own handle table already scrambles
    /// these; this layer just needs small, reusable integers to hand
    /// back through the C ABI.
    open_files: Mutex<HashMap<i32, u64>>,
    next_fd: Mutex<i32>,
}

impl MountSession {
    /// Inserts a freshly-resolved `(handle, attrs)` pair into the inode
    /// cache, releasing `handle` immediately if the cache already held a
    /// reference for this inode (a hardlink, or a concurrent resolver
    /// winning the race) so the daemon-side handle this call obtained is
    /// never leaked.
    fn store_or_release(&self, handle: u64, attrs: cache::Attrs) -> Result<Inode, CephfsError> {
        let cached = self.inodes.create(handle, attrs)?;
        if cached.native != handle {
            wire_calls::put(&self.transport, handle)?;
        }
        Ok(cached)
    }

    fn cached_native(&self, ino: u64) -> Result<u64, CephfsError> {
        self.inodes.peek(ino).map(|entry| entry.native).ok_or(CephfsError::InvalidHandle("inode not cached"))
    }

    pub fn resolve(&self, path: &str) -> Result<u64, CephfsError> {
        let cwd = *self.cwd_ino.lock().expect("cwd mutex poisoned");
        cache::walk(self, self.root_ino, cwd, path)
    }

    pub fn statfs(&self) -> Result<wire::WireStatfs, CephfsError> {
        wire_calls::statfs(&self.transport, self.instance_handle)
    }

    /// Looks up `path` and returns its attributes. A cache hit is
    /// trusted as-is unless `force_revalidate` is set, in which case a
    /// fresh `getattr` is issued and merged into the cached entry; a
    /// deliberately preserved quirk, this bypasses whatever credential
    /// check a fresh lookup of the path itself would have applied.
    pub fn getattr(&self, path: &str, force_revalidate: bool) -> Result<cache::Attrs, CephfsError> {
        let ino = self.resolve(path)?;
        if !force_revalidate {
            if let Some(cached) = self.inodes.peek(ino) {
                return Ok(cached.attrs);
            }
        }
        let native = self.cached_native(ino)?;
        let fresh = wire_calls::getattr(&self.transport, native)?;
        let merged = self.inodes.merge(ino, &fresh).ok_or(CephfsError::InvalidHandle("inode not cached"))?;
        Ok(merged.attrs)
    }

    pub fn readlink(&self, path: &str) -> Result<String, CephfsError> {
        let ino = self.resolve(path)?;
        let native = self.cached_native(ino)?;
        wire_calls::readlink(&self.transport, native)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<(), CephfsError> {
        let (parent_path, name) = split_path(path);
        let parent_ino = self.resolve(parent_path)?;
        let parent_native = self.cached_native(parent_ino)?;
        let (handle, attrs) = wire_calls::mkdir(&self.transport, parent_native, name, mode)?;
        let child = self.store_or_release(handle, attrs)?;
        self.link_dentry(parent_ino, name, child.ino())
    }

    pub fn unlink(&self, path: &str) -> Result<(), CephfsError> {
        let (parent_path, name) = split_path(path);
        let parent_ino = self.resolve(parent_path)?;
        let parent_native = self.cached_native(parent_ino)?;
        wire_calls::unlink(&self.transport, parent_native, name)?;
        self.unlink_dentry(parent_ino, name)
    }

    pub fn rmdir(&self, path: &str) -> Result<(), CephfsError> {
        let (parent_path, name) = split_path(path);
        let parent_ino = self.resolve(parent_path)?;
        let parent_native = self.cached_native(parent_ino)?;
        wire_calls::rmdir(&self.transport, parent_native, name)?;
        self.unlink_dentry(parent_ino, name)
    }

    pub fn symlink(&self, target: &str, linkpath: &str) -> Result<(), CephfsError> {
        let (parent_path, name) = split_path(linkpath);
        let parent_ino = self.resolve(parent_path)?;
        let parent_native = self.cached_native(parent_ino)?;
        let (handle, attrs) = wire_calls::symlink(&self.transport, parent_native, name, target)?;
        let child = self.store_or_release(handle, attrs)?;
        self.link_dentry(parent_ino, name, child.ino())
    }

    fn register_fd(&self, file_handle: u64) -> i32 {
        let mut next_fd = self.next_fd.lock().expect("fd counter mutex poisoned");
        let fd = *next_fd;
        *next_fd += 1;
        self.open_files.lock().expect("open file table mutex poisoned").insert(fd, file_handle);
        fd
    }

    fn fd_handle(&self, fd: i32) -> Result<u64, CephfsError> {
        self.open_files
            .lock()
            .expect("open file table mutex poisoned")
            .get(&fd)
            .copied()
            .ok_or(CephfsError::InvalidHandle("file descriptor not open"))
    }

    /// Opens `path`, creating it first if `flags` carries `O_CREAT` and
    /// it does not already exist, matching `ceph_open`'s combined
    /// open-or-create semantics.
    pub fn open(&self, path: &str, flags: i32, mode: u32) -> Result<i32, CephfsError> {
        let file_handle = if flags & O_CREAT != 0 {
            let (parent_path, name) = split_path(path);
            let parent_ino = self.resolve(parent_path)?;
            let parent_native = self.cached_native(parent_ino)?;
            let (handle, file_handle, attrs) =
                wire_calls::create_file(&self.transport, parent_native, name, mode, flags as u32)?;
            let child = self.store_or_release(handle, attrs)?;
            self.link_dentry(parent_ino, name, child.ino())?;
            file_handle
        } else {
            let ino = self.resolve(path)?;
            let native = self.cached_native(ino)?;
            wire_calls::open(&self.transport, native, flags as u32)?
        };
        Ok(self.register_fd(file_handle))
    }

    pub fn read(&self, fd: i32, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError> {
        let file_handle = self.fd_handle(fd)?;
        wire_calls::read(&self.transport, file_handle, offset, len)
    }

    pub fn write(&self, fd: i32, offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
        let file_handle = self.fd_handle(fd)?;
        wire_calls::write(&self.transport, file_handle, offset, data)
    }

    pub fn close(&self, fd: i32) -> Result<(), CephfsError> {
        let file_handle = self
            .open_files
            .lock()
            .expect("open file table mutex poisoned")
            .remove(&fd)
            .ok_or(CephfsError::InvalidHandle("file descriptor not open"))?;
        wire_calls::close(&self.transport, file_handle)
    }

    fn link_dentry(&self, parent_ino: u64, name: &str, child_ino: u64) -> Result<(), CephfsError> {
        if let Some(replaced) = self.dentries.create(parent_ino, name, child_ino) {
            self.inodes.put(replaced, |handle| wire_calls::put(&self.transport, handle))?;
        }
        Ok(())
    }

    fn unlink_dentry(&self, parent_ino: u64, name: &str) -> Result<(), CephfsError> {
        if let Some(child_ino) = self.dentries.remove(parent_ino, name) {
            self.inodes.put(child_ino, |handle| wire_calls::put(&self.transport, handle))?;
        }
        Ok(())
    }

    pub fn unmount(self) -> Result<(), CephfsError> {
        wire_calls::unmount(&self.transport, self.instance_handle)
    }
}

impl PathResolver for MountSession {
    fn lookup(&self, parent_ino: u64, name: &str) -> Result<Step, CephfsError> {
        if let Some(child_ino) = self.dentries.lookup(parent_ino, name) {
            let cached = self.inodes.peek(child_ino).ok_or(CephfsError::InvalidHandle("dentry target not cached"))?;
            if !is_symlink(cached.attrs.mode) {
                return Ok(Step::Inode(child_ino));
            }
            let held = self.inodes.lookup(child_ino).ok_or(CephfsError::InvalidHandle("dentry target not cached"))?;
            let target = wire_calls::readlink(&self.transport, held.native);
            self.inodes.put(child_ino, |handle| wire_calls::put(&self.transport, handle))?;
            return Ok(Step::Symlink(target?));
        }

        let parent_native = self.cached_native(parent_ino)?;
        let (handle, attrs) = wire_calls::lookup(&self.transport, parent_native, name)?;
        let child = self.store_or_release(handle, attrs)?;
        self.link_dentry(parent_ino, name, child.ino())?;

        if is_symlink(child.attrs.mode) {
            Ok(Step::Symlink(wire_calls::readlink(&self.transport, child.native)?))
        } else {
            Ok(Step::Inode(child.ino()))
        }
    }

    fn parent_of(&self, ino: u64) -> Result<u64, CephfsError> {
        if ino == self.root_ino {
            return Ok(self.root_ino);
        }
        let native = self.cached_native(ino)?;
        let (handle, attrs) = wire_calls::lookup(&self.transport, native, "..")?;
        let parent = self.store_or_release(handle, attrs)?;
        Ok(parent.ino())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_directory_and_name() {
        assert_eq!(split_path("/a/b"), ("/a", "b"));
        assert_eq!(split_path("/a"), ("/", "a"));
        assert_eq!(split_path("a"), (".", "a"));
    }

    #[test]
    fn mode_bits_identify_a_symlink() {
        assert!(is_symlink(0o120_777));
        assert!(!is_symlink(0o040_755));
        assert!(!is_symlink(0o100_644));
    }
}
