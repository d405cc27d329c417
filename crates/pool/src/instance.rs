//! A single native client instance and the configuration steps applied
//! to it before it mounts.

use std::path::Path;

use wire::CephfsError;

use crate::change::{ChangeKind, ChangeLog};
use crate::client::{NativeAttrs, NativeClient, NativeFile, NativeInode, NativeStatfs};
use crate::snapshot::snapshot;

pub struct Instance {
    client: Box<dyn NativeClient>,
    changes: ChangeLog,
    inited: bool,
    mounted: bool,
}

impl Instance {
    pub(crate) fn new(client: Box<dyn NativeClient>, id: &str) -> Self {
        let mut changes = ChangeLog::new();
        changes.push(ChangeKind::Id, id, None);
        Self { client, changes, inited: false, mounted: false }
    }

    #[must_use]
    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Applies a configuration file, snapshotting it into `snapshot_dir`
    /// first so the pool hashes pinned content rather than a path that
    /// could change underneath it.
    pub fn configure_file(&mut self, source: &Path, snapshot_dir: &Path) -> Result<(), CephfsError> {
        if self.mounted {
            return Err(CephfsError::InstanceState("cannot configure a mounted instance"));
        }
        let snap = snapshot(source, snapshot_dir)?;
        self.changes.push(ChangeKind::Conf, snap.path.to_string_lossy().into_owned(), None);
        if let Err(err) = self.client.conf_read_file(&snap.path) {
            self.changes.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn get(&mut self, name: &str) -> Result<String, CephfsError> {
        let value = self.client.conf_get(name)?;
        self.changes.push(ChangeKind::Get, name, Some(value.clone()));
        Ok(value)
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), CephfsError> {
        if self.mounted {
            return Err(CephfsError::InstanceState("cannot configure a mounted instance"));
        }
        self.changes.push(ChangeKind::Set, name, Some(value.to_string()));
        if let Err(err) = self.client.conf_set(name, value) {
            self.changes.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn select_filesystem(&mut self, name: &str) -> Result<(), CephfsError> {
        if self.mounted {
            return Err(CephfsError::InstanceState("cannot select a filesystem on a mounted instance"));
        }
        self.changes.push(ChangeKind::Fs, name, None);
        if let Err(err) = self.client.select_filesystem(name) {
            self.changes.pop();
            return Err(err);
        }
        Ok(())
    }

    pub fn init(&mut self) -> Result<(), CephfsError> {
        if self.mounted || self.inited {
            return Ok(());
        }
        self.client.init()?;
        self.inited = true;
        Ok(())
    }

    pub(crate) fn mount(&mut self, root: &str) -> Result<(), CephfsError> {
        if self.mounted {
            return Err(CephfsError::InstanceState("instance is already mounted"));
        }
        self.client.mount(root)?;
        self.inited = true;
        self.mounted = true;
        Ok(())
    }

    pub(crate) fn unmount(&mut self) -> Result<(), CephfsError> {
        if !self.mounted {
            return Err(CephfsError::InstanceState("instance is not mounted"));
        }
        self.client.unmount()?;
        self.mounted = false;
        Ok(())
    }

    fn require_mounted(&self) -> Result<(), CephfsError> {
        if !self.mounted {
            return Err(CephfsError::InstanceState("instance is not mounted"));
        }
        Ok(())
    }

    /// Every data-plane call below requires a mounted instance and never
    /// touches the change log: these are ordinary filesystem operations,
    /// not configuration that could make two sessions diverge.
    pub fn statfs(&self) -> Result<NativeStatfs, CephfsError> {
        self.require_mounted()?;
        self.client.statfs()
    }

    pub fn root_inode(&self) -> Result<NativeInode, CephfsError> {
        self.require_mounted()?;
        self.client.root_inode()
    }

    pub fn lookup(&self, parent: u64, name: &str) -> Result<NativeInode, CephfsError> {
        self.require_mounted()?;
        self.client.lookup(parent, name)
    }

    pub fn getattr(&self, ino: u64) -> Result<NativeAttrs, CephfsError> {
        self.require_mounted()?;
        self.client.getattr(ino)
    }

    pub fn readlink(&self, ino: u64) -> Result<String, CephfsError> {
        self.require_mounted()?;
        self.client.readlink(ino)
    }

    pub fn mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<NativeInode, CephfsError> {
        self.require_mounted()?;
        self.client.mkdir(parent, name, mode)
    }

    pub fn unlink(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        self.require_mounted()?;
        self.client.unlink(parent, name)
    }

    pub fn rmdir(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        self.require_mounted()?;
        self.client.rmdir(parent, name)
    }

    pub fn symlink(&self, parent: u64, name: &str, target: &str) -> Result<NativeInode, CephfsError> {
        self.require_mounted()?;
        self.client.symlink(parent, name, target)
    }

    pub fn put(&self, ino: u64) -> Result<(), CephfsError> {
        self.require_mounted()?;
        self.client.put(ino)
    }

    pub fn create_file(&self, parent: u64, name: &str, mode: u32, flags: u32) -> Result<(NativeInode, NativeFile), CephfsError> {
        self.require_mounted()?;
        self.client.create_file(parent, name, mode, flags)
    }

    pub fn open(&self, ino: u64, flags: u32) -> Result<NativeFile, CephfsError> {
        self.require_mounted()?;
        self.client.open(ino, flags)
    }

    pub fn read(&self, file: NativeFile, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError> {
        self.require_mounted()?;
        self.client.read(file, offset, len)
    }

    pub fn write(&self, file: NativeFile, offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
        self.require_mounted()?;
        self.client.write(file, offset, data)
    }

    pub fn close(&self, file: NativeFile) -> Result<(), CephfsError> {
        self.require_mounted()?;
        self.client.close(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeClient {
        set_calls: Mutex<Vec<(String, String)>>,
    }

    impl NativeClient for FakeClient {
        fn conf_read_file(&self, _path: &Path) -> Result<(), CephfsError> {
            Ok(())
        }
        fn conf_get(&self, name: &str) -> Result<String, CephfsError> {
            Ok(format!("value-of-{name}"))
        }
        fn conf_set(&self, name: &str, value: &str) -> Result<(), CephfsError> {
            if name == "bogus" {
                return Err(CephfsError::Native(22));
            }
            self.set_calls.lock().unwrap().push((name.to_string(), value.to_string()));
            Ok(())
        }
        fn select_filesystem(&self, _name: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn init(&self) -> Result<(), CephfsError> {
            Ok(())
        }
        fn mount(&self, _root: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn unmount(&self) -> Result<(), CephfsError> {
            Ok(())
        }
        fn statfs(&self) -> Result<crate::client::NativeStatfs, CephfsError> {
            Ok(crate::client::NativeStatfs::default())
        }
        fn root_inode(&self) -> Result<crate::client::NativeInode, CephfsError> {
            Ok(crate::client::NativeInode::default())
        }
        fn lookup(&self, _parent: u64, _name: &str) -> Result<crate::client::NativeInode, CephfsError> {
            Ok(crate::client::NativeInode::default())
        }
        fn getattr(&self, _ino: u64) -> Result<crate::client::NativeAttrs, CephfsError> {
            Ok(crate::client::NativeAttrs::default())
        }
        fn readlink(&self, _ino: u64) -> Result<String, CephfsError> {
            Ok(String::new())
        }
        fn mkdir(&self, _parent: u64, _name: &str, _mode: u32) -> Result<crate::client::NativeInode, CephfsError> {
            Ok(crate::client::NativeInode::default())
        }
        fn unlink(&self, _parent: u64, _name: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn rmdir(&self, _parent: u64, _name: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn symlink(&self, _parent: u64, _name: &str, _target: &str) -> Result<crate::client::NativeInode, CephfsError> {
            Ok(crate::client::NativeInode::default())
        }
        fn put(&self, _ino: u64) -> Result<(), CephfsError> {
            Ok(())
        }
        fn create_file(&self, _parent: u64, _name: &str, _mode: u32, _flags: u32) -> Result<(crate::client::NativeInode, crate::client::NativeFile), CephfsError> {
            Ok((crate::client::NativeInode::default(), crate::client::NativeFile::default()))
        }
        fn open(&self, _ino: u64, _flags: u32) -> Result<crate::client::NativeFile, CephfsError> {
            Ok(crate::client::NativeFile::default())
        }
        fn read(&self, _file: crate::client::NativeFile, _offset: i64, _len: u64) -> Result<Vec<u8>, CephfsError> {
            Ok(Vec::new())
        }
        fn write(&self, _file: crate::client::NativeFile, _offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
            Ok(data.len() as u64)
        }
        fn close(&self, _file: crate::client::NativeFile) -> Result<(), CephfsError> {
            Ok(())
        }
    }

    #[test]
    fn a_failed_set_rolls_back_the_change_log() {
        let mut instance = Instance::new(Box::new(FakeClient::default()), "client.admin");
        let before = instance.changes().digest();
        assert!(instance.set("bogus", "x").is_err());
        assert_eq!(instance.changes().digest(), before);
    }

    #[test]
    fn a_successful_set_is_recorded() {
        let mut instance = Instance::new(Box::new(FakeClient::default()), "client.admin");
        instance.set("client_mount_uid", "0").unwrap();
        assert_eq!(instance.changes().entries().len(), 2);
    }

    #[test]
    fn configuring_a_mounted_instance_is_rejected() {
        let mut instance = Instance::new(Box::new(FakeClient::default()), "client.admin");
        instance.mount("/").unwrap();
        assert!(instance.set("x", "y").is_err());
    }

    #[test]
    fn configure_file_snapshots_and_records_the_generated_path() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("ceph.conf");
        std::fs::write(&source, b"[global]\n").unwrap();
        let mut instance = Instance::new(Box::new(FakeClient::default()), "client.admin");
        instance.configure_file(&source, &dir.path().join("snaps")).unwrap();
        assert_eq!(instance.changes().entries().len(), 2);
    }
}
