//! An in-memory [`pool::NativeClient`] fake, shared by every crate's
//! integration tests that need more than the single-call stubs each
//! crate's own `#[cfg(test)]` module rolls inline. Mirrors a small
//! POSIX tree: one root directory, with `mkdir`/`symlink`/`unlink`/
//! `rmdir` maintaining it the way a real mounted filesystem would.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use pool::{NativeAttrs, NativeClient, NativeClientFactory, NativeFile, NativeInode, NativeStatfs};
use wire::CephfsError;

const ROOT_INO: u64 = 1;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFREG: u32 = 0o100_000;
const ENOENT: i32 = 2;
const ENOTDIR: i32 = 20;
const ENOTEMPTY: i32 = 39;
const EEXIST: i32 = 17;
const EINVAL: i32 = 22;
const EBADF: i32 = 9;

#[derive(Clone)]
enum Kind {
    Dir,
    Symlink(String),
    File(Vec<u8>),
}

#[derive(Clone)]
struct Node {
    kind: Kind,
    parent: u64,
    mode: u32,
    children: HashMap<String, u64>,
}

struct Tree {
    nodes: HashMap<u64, Node>,
    next_ino: u64,
    mounted: bool,
    config: HashMap<String, String>,
    open_files: HashMap<u64, u64>,
    next_fh: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INO, Node { kind: Kind::Dir, parent: ROOT_INO, mode: S_IFDIR | 0o755, children: HashMap::new() });
        Self { nodes, next_ino: ROOT_INO + 1, mounted: false, config: HashMap::new(), open_files: HashMap::new(), next_fh: 1 }
    }

    fn open(&mut self, ino: u64) -> Result<u64, CephfsError> {
        match self.nodes.get(&ino) {
            Some(Node { kind: Kind::File(_), .. }) => {}
            Some(_) => return Err(CephfsError::Native(EINVAL)),
            None => return Err(CephfsError::Native(ENOENT)),
        }
        let fh = self.next_fh;
        self.next_fh += 1;
        self.open_files.insert(fh, ino);
        Ok(fh)
    }

    fn file_data(&self, fh: u64) -> Result<&Vec<u8>, CephfsError> {
        let ino = self.open_files.get(&fh).ok_or(CephfsError::Native(EBADF))?;
        match &self.nodes.get(ino).expect("open fh always names a live node").kind {
            Kind::File(data) => Ok(data),
            _ => unreachable!("only files are ever opened"),
        }
    }

    fn file_data_mut(&mut self, fh: u64) -> Result<&mut Vec<u8>, CephfsError> {
        let ino = *self.open_files.get(&fh).ok_or(CephfsError::Native(EBADF))?;
        match &mut self.nodes.get_mut(&ino).expect("open fh always names a live node").kind {
            Kind::File(data) => Ok(data),
            _ => unreachable!("only files are ever opened"),
        }
    }

    fn attrs(&self, ino: u64, node: &Node) -> NativeAttrs {
        let size = match &node.kind {
            Kind::File(data) => data.len() as u64,
            _ => 0,
        };
        NativeAttrs {
            ino,
            mode: node.mode,
            nlink: if matches!(node.kind, Kind::Dir) { 2 } else { 1 },
            uid: 0,
            gid: 0,
            rdev: 0,
            size,
            blocks: 0,
            blksize: 4096,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }

    fn child(&self, parent: u64, name: &str) -> Result<(u64, Node), CephfsError> {
        let parent_node = self.nodes.get(&parent).ok_or(CephfsError::Native(ENOENT))?;
        if name == ".." {
            let ino = parent_node.parent;
            return Ok((ino, self.nodes[&ino].clone()));
        }
        let ino = *parent_node.children.get(name).ok_or(CephfsError::Native(ENOENT))?;
        Ok((ino, self.nodes[&ino].clone()))
    }

    fn insert(&mut self, parent: u64, name: &str, kind: Kind, mode: u32) -> Result<(u64, Node), CephfsError> {
        {
            let parent_node = self.nodes.get(&parent).ok_or(CephfsError::Native(ENOENT))?;
            if !matches!(parent_node.kind, Kind::Dir) {
                return Err(CephfsError::Native(ENOTDIR));
            }
            if parent_node.children.contains_key(name) {
                return Err(CephfsError::Native(EEXIST));
            }
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        let node = Node { kind, parent, mode, children: HashMap::new() };
        self.nodes.insert(ino, node.clone());
        self.nodes.get_mut(&parent).expect("checked above").children.insert(name.to_string(), ino);
        Ok((ino, node))
    }

    fn remove(&mut self, parent: u64, name: &str, expect_dir: bool) -> Result<(), CephfsError> {
        let (ino, node) = self.child(parent, name)?;
        match (&node.kind, expect_dir) {
            (Kind::Dir, false) => return Err(CephfsError::Native(EINVAL)),
            (Kind::Dir, true) if !node.children.is_empty() => return Err(CephfsError::Native(ENOTEMPTY)),
            (Kind::File(_) | Kind::Symlink(_), true) => return Err(CephfsError::Native(ENOTDIR)),
            _ => {}
        }
        self.nodes.get_mut(&parent).expect("child resolved above").children.remove(name);
        self.nodes.remove(&ino);
        Ok(())
    }
}

/// An in-memory filesystem standing in for one mounted native client
/// instance; every [`FakeNativeClientFactory::create`] call gets an
/// independent tree, matching `ceph_create` minting a fresh mount handle.
pub struct FakeNativeClient {
    tree: Mutex<Tree>,
}

impl Default for FakeNativeClient {
    fn default() -> Self {
        Self { tree: Mutex::new(Tree::new()) }
    }
}

impl FakeNativeClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a plain file inode directly, without opening a file handle,
    /// for tests that only need a resolvable leaf to `getattr`/`lookup`.
    pub fn seed_file(&self, parent: u64, name: &str, mode: u32) -> Result<u64, CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let (ino, _) = tree.insert(parent, name, Kind::File(Vec::new()), S_IFREG | (mode & 0o7777))?;
        Ok(ino)
    }
}

impl NativeClient for FakeNativeClient {
    fn conf_read_file(&self, _path: &Path) -> Result<(), CephfsError> {
        Ok(())
    }

    fn conf_get(&self, name: &str) -> Result<String, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        tree.config.get(name).cloned().ok_or(CephfsError::Native(ENOENT))
    }

    fn conf_set(&self, name: &str, value: &str) -> Result<(), CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        tree.config.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn select_filesystem(&self, _name: &str) -> Result<(), CephfsError> {
        Ok(())
    }

    fn init(&self) -> Result<(), CephfsError> {
        Ok(())
    }

    fn mount(&self, _root: &str) -> Result<(), CephfsError> {
        self.tree.lock().expect("fake tree mutex poisoned").mounted = true;
        Ok(())
    }

    fn unmount(&self) -> Result<(), CephfsError> {
        self.tree.lock().expect("fake tree mutex poisoned").mounted = false;
        Ok(())
    }

    fn statfs(&self) -> Result<NativeStatfs, CephfsError> {
        Ok(NativeStatfs { block_size: 4096, blocks: 1_000_000, blocks_free: 900_000, files: 10_000, files_free: 9_000 })
    }

    fn root_inode(&self) -> Result<NativeInode, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        let node = &tree.nodes[&ROOT_INO];
        Ok(NativeInode { native: ROOT_INO, attrs: tree.attrs(ROOT_INO, node) })
    }

    fn lookup(&self, parent: u64, name: &str) -> Result<NativeInode, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        let (ino, node) = tree.child(parent, name)?;
        Ok(NativeInode { native: ino, attrs: tree.attrs(ino, &node) })
    }

    fn getattr(&self, ino: u64) -> Result<NativeAttrs, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        let node = tree.nodes.get(&ino).ok_or(CephfsError::Native(ENOENT))?;
        Ok(tree.attrs(ino, node))
    }

    fn readlink(&self, ino: u64) -> Result<String, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        match tree.nodes.get(&ino) {
            Some(Node { kind: Kind::Symlink(target), .. }) => Ok(target.clone()),
            Some(_) => Err(CephfsError::Native(EINVAL)),
            None => Err(CephfsError::Native(ENOENT)),
        }
    }

    fn mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<NativeInode, CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let (ino, node) = tree.insert(parent, name, Kind::Dir, S_IFDIR | (mode & 0o7777))?;
        Ok(NativeInode { native: ino, attrs: tree.attrs(ino, &node) })
    }

    fn unlink(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        self.tree.lock().expect("fake tree mutex poisoned").remove(parent, name, false)
    }

    fn rmdir(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        self.tree.lock().expect("fake tree mutex poisoned").remove(parent, name, true)
    }

    fn symlink(&self, parent: u64, name: &str, target: &str) -> Result<NativeInode, CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let (ino, node) = tree.insert(parent, name, Kind::Symlink(target.to_string()), S_IFLNK | 0o777)?;
        Ok(NativeInode { native: ino, attrs: tree.attrs(ino, &node) })
    }

    fn put(&self, _ino: u64) -> Result<(), CephfsError> {
        Ok(())
    }

    fn create_file(&self, parent: u64, name: &str, mode: u32, _flags: u32) -> Result<(NativeInode, NativeFile), CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let (ino, node) = tree.insert(parent, name, Kind::File(Vec::new()), S_IFREG | (mode & 0o7777))?;
        let fh = tree.open(ino)?;
        Ok((NativeInode { native: ino, attrs: tree.attrs(ino, &node) }, NativeFile { native: fh }))
    }

    fn open(&self, ino: u64, _flags: u32) -> Result<NativeFile, CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let fh = tree.open(ino)?;
        Ok(NativeFile { native: fh })
    }

    fn read(&self, file: NativeFile, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError> {
        let tree = self.tree.lock().expect("fake tree mutex poisoned");
        let data = tree.file_data(file.native)?;
        let start = offset as usize;
        if start >= data.len() {
            return Ok(Vec::new());
        }
        let end = (start + len as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn write(&self, file: NativeFile, offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        let buf = tree.file_data_mut(file.native)?;
        let start = offset as usize;
        if buf.len() < start + data.len() {
            buf.resize(start + data.len(), 0);
        }
        buf[start..start + data.len()].copy_from_slice(data);
        Ok(data.len() as u64)
    }

    fn close(&self, file: NativeFile) -> Result<(), CephfsError> {
        let mut tree = self.tree.lock().expect("fake tree mutex poisoned");
        tree.open_files.remove(&file.native).ok_or(CephfsError::Native(EBADF))?;
        Ok(())
    }
}

/// Mints one independent [`FakeNativeClient`] per `create` call,
/// matching `ceph_create` handing back a fresh mount handle every time;
/// the pool's own digest-bucket sharing happens one layer up.
#[derive(Default)]
pub struct FakeNativeClientFactory;

impl NativeClientFactory for FakeNativeClientFactory {
    fn create(&self, _id: &str) -> Result<Box<dyn NativeClient>, CephfsError> {
        Ok(Box::new(FakeNativeClient::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_then_lookup_finds_the_new_directory() {
        let client = FakeNativeClient::new();
        let dir = client.mkdir(ROOT_INO, "a", 0o755).unwrap();
        let found = client.lookup(ROOT_INO, "a").unwrap();
        assert_eq!(found.native, dir.native);
        assert_eq!(found.attrs.mode & S_IFDIR, S_IFDIR);
    }

    #[test]
    fn rmdir_on_a_nonempty_directory_is_rejected() {
        let client = FakeNativeClient::new();
        let dir = client.mkdir(ROOT_INO, "a", 0o755).unwrap();
        client.mkdir(dir.native, "b", 0o755).unwrap();
        assert!(matches!(client.rmdir(ROOT_INO, "a"), Err(CephfsError::Native(ENOTEMPTY))));
    }

    #[test]
    fn symlink_then_readlink_round_trips_the_target() {
        let client = FakeNativeClient::new();
        client.symlink(ROOT_INO, "link", "/a/b").unwrap();
        let found = client.lookup(ROOT_INO, "link").unwrap();
        assert_eq!(client.readlink(found.native).unwrap(), "/a/b");
    }

    #[test]
    fn dotdot_from_root_resolves_to_root() {
        let client = FakeNativeClient::new();
        let found = client.lookup(ROOT_INO, "..").unwrap();
        assert_eq!(found.native, ROOT_INO);
    }

    #[test]
    fn create_file_write_read_and_close_round_trip() {
        let client = FakeNativeClient::new();
        let (inode, file) = client.create_file(ROOT_INO, "leaf", 0o644, 0).unwrap();
        assert_eq!(client.write(file, 0, b"hello").unwrap(), 5);
        assert_eq!(client.read(file, 0, 5).unwrap(), b"hello");
        assert_eq!(client.getattr(inode.native).unwrap().size, 5);
        client.close(file).unwrap();
    }

    #[test]
    fn reading_past_end_of_file_returns_an_empty_slice() {
        let client = FakeNativeClient::new();
        let (_, file) = client.create_file(ROOT_INO, "leaf", 0o644, 0).unwrap();
        client.write(file, 0, b"hi").unwrap();
        assert_eq!(client.read(file, 100, 10).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn reading_through_a_closed_handle_is_rejected() {
        let client = FakeNativeClient::new();
        let (_, file) = client.create_file(ROOT_INO, "leaf", 0o644, 0).unwrap();
        client.close(file).unwrap();
        assert!(matches!(client.read(file, 0, 1), Err(CephfsError::Native(EBADF))));
    }

    #[test]
    fn two_factory_instances_do_not_share_state() {
        let factory = FakeNativeClientFactory;
        let a = factory.create("one").unwrap();
        let b = factory.create("two").unwrap();
        a.mkdir(ROOT_INO, "only-in-a", 0o755).unwrap();
        assert!(b.lookup(ROOT_INO, "only-in-a").is_err());
    }
}
