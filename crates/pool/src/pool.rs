//! The instance pool: 256 hash buckets keyed by a mounting instance's
//! configuration digest, so that two sessions with byte-identical
//! configuration histories share one native client instance instead of
//! each opening a private data cache.

use std::sync::{Arc, Mutex};

use wire::CephfsError;

use crate::client::NativeClientFactory;
use crate::instance::Instance;

const BUCKET_COUNT: usize = 256;

struct Entry {
    digest: [u8; 32],
    instance: Arc<Mutex<Instance>>,
    refs: usize,
}

/// A not-yet-mounted instance under construction by one session. Holds
/// its `Instance` exclusively until [`Pool::mount`] either takes
/// ownership (new entry) or discards it in favor of an existing share.
pub struct Session {
    instance: Instance,
}

impl Session {
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[must_use]
    pub fn instance_mut(&mut self) -> &mut Instance {
        &mut self.instance
    }
}

/// A handle to a mounted, possibly-shared instance. Dropping this
/// without calling [`Pool::unmount`] leaks the pool's refcount; callers
/// are expected to unmount exactly once per `Mounted` they were handed.
#[derive(Clone)]
pub struct Mounted {
    digest: [u8; 32],
    instance: Arc<Mutex<Instance>>,
}

impl Mounted {
    pub fn with_instance<R>(&self, f: impl FnOnce(&mut Instance) -> R) -> R {
        let mut guard = self.instance.lock().expect("instance mutex poisoned");
        f(&mut guard)
    }
}

pub struct Pool {
    factory: Box<dyn NativeClientFactory>,
    buckets: Mutex<Vec<Vec<Entry>>>,
}

impl Pool {
    #[must_use]
    pub fn new(factory: Box<dyn NativeClientFactory>) -> Self {
        Self {
            factory,
            buckets: Mutex::new((0..BUCKET_COUNT).map(|_| Vec::new()).collect()),
        }
    }

    /// Starts a new session against a fresh native client instance,
    /// ready to accept configuration calls before mounting.
    pub fn create(&self, id: &str) -> Result<Session, CephfsError> {
        let client = self.factory.create(id)?;
        Ok(Session { instance: Instance::new(client, id) })
    }

    /// Mounts `session`'s instance at `root`, sharing an existing pooled
    /// instance whose configuration history hashes identically instead
    /// of mounting a second time.
    pub fn mount(&self, session: Session, root: &str) -> Result<Mounted, CephfsError> {
        let mut session = session;
        let digest = session.instance.changes().digest();
        let bucket_index = digest[0] as usize;

        let mut buckets = self.buckets.lock().expect("pool mutex poisoned");
        let bucket = &mut buckets[bucket_index];

        if let Some(entry) = bucket.iter_mut().find(|entry| entry.digest == digest) {
            entry.refs += 1;
            return Ok(Mounted { digest, instance: entry.instance.clone() });
        }

        session.instance.mount(root)?;
        let instance = Arc::new(Mutex::new(session.instance));
        bucket.push(Entry { digest, instance: instance.clone(), refs: 1 });

        Ok(Mounted { digest, instance })
    }

    /// Releases one reference to `mounted`. The underlying client is
    /// unmounted only when the last reference is released.
    pub fn unmount(&self, mounted: Mounted) -> Result<(), CephfsError> {
        let bucket_index = mounted.digest[0] as usize;
        let mut buckets = self.buckets.lock().expect("pool mutex poisoned");
        let bucket = &mut buckets[bucket_index];

        let position = bucket
            .iter()
            .position(|entry| entry.digest == mounted.digest)
            .ok_or(CephfsError::InstanceState("instance is not registered in the pool"))?;

        bucket[position].refs -= 1;
        let should_unmount = bucket[position].refs == 0;
        if should_unmount {
            bucket.remove(position);
        }
        drop(buckets);

        if should_unmount {
            mounted.instance.lock().expect("instance mutex poisoned").unmount()?;
        }
        Ok(())
    }

    /// Number of distinct configuration digests currently mounted, for
    /// diagnostics and tests.
    #[must_use]
    pub fn live_instance_count(&self) -> usize {
        self.buckets.lock().expect("pool mutex poisoned").iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NativeClient;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        mounts: Arc<AtomicUsize>,
    }

    impl NativeClient for FakeClient {
        fn conf_read_file(&self, _path: &Path) -> Result<(), CephfsError> {
            Ok(())
        }
        fn conf_get(&self, name: &str) -> Result<String, CephfsError> {
            Ok(format!("value-of-{name}"))
        }
        fn conf_set(&self, _name: &str, _value: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn select_filesystem(&self, _name: &str) -> Result<(), CephfsError> {
            Ok(())
        }
        fn init(&self) -> Result<(), CephfsError> {
            Ok(())
        }
        fn mount(&self, _root: &str) -> Result<(), CephfsError> {
            self.mounts.fetch_add(1, Ordering::SeqCst);
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

    struct FakeFactory {
        mounts: Arc<AtomicUsize>,
    }

    impl NativeClientFactory for FakeFactory {
        fn create(&self, _id: &str) -> Result<Box<dyn NativeClient>, CephfsError> {
            Ok(Box::new(FakeClient { mounts: self.mounts.clone() }))
        }
    }

    #[test]
    fn identical_sessions_share_one_mount_call() {
        let mounts = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(Box::new(FakeFactory { mounts: mounts.clone() }));

        let a = pool.create("client.admin").unwrap();
        let b = pool.create("client.admin").unwrap();

        let mounted_a = pool.mount(a, "/").unwrap();
        let mounted_b = pool.mount(b, "/").unwrap();

        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_instance_count(), 1);

        pool.unmount(mounted_a).unwrap();
        assert_eq!(pool.live_instance_count(), 1);
        pool.unmount(mounted_b).unwrap();
        assert_eq!(pool.live_instance_count(), 0);
    }

    #[test]
    fn divergent_configuration_gets_a_separate_mount_call() {
        let mounts = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(Box::new(FakeFactory { mounts: mounts.clone() }));

        let mut a = pool.create("client.admin").unwrap();
        a.instance_mut().set("client_mount_uid", "0").unwrap();
        let b = pool.create("client.admin").unwrap();

        pool.mount(a, "/").unwrap();
        pool.mount(b, "/").unwrap();

        assert_eq!(mounts.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_instance_count(), 2);
    }

    #[test]
    fn the_last_unmount_actually_releases_the_client() {
        let mounts = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(Box::new(FakeFactory { mounts: mounts.clone() }));

        let a = pool.create("client.admin").unwrap();
        let mounted = pool.mount(a, "/").unwrap();
        pool.unmount(mounted).unwrap();

        assert_eq!(pool.live_instance_count(), 0);
    }
}
