//! The dentry cache: maps `(parent inode, child name)` to the child's
//! inode number, keyed by the parent's own inode number XORed with a
//! MurmurHash3 of the name, exactly as the upstream shim keys it by the
//! parent's pointer XORed with the same hash - ino numbers are this
//! port's stand-in for pointer identity.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::murmur::hash_name;

#[derive(Clone, Debug, Eq, PartialEq)]
struct Dentry {
    parent_ino: u64,
    name: String,
    child_ino: u64,
}

fn key(parent_ino: u64, name: &str) -> u64 {
    parent_ino ^ hash_name(name)
}

#[derive(Default)]
pub struct DentryTable {
    buckets: Mutex<HashMap<u64, Vec<Dentry>>>,
}

impl DentryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, parent_ino: u64, name: &str) -> Option<u64> {
        let buckets = self.buckets.lock().expect("dentry table mutex poisoned");
        let bucket = buckets.get(&key(parent_ino, name))?;
        bucket
            .iter()
            .find(|d| d.parent_ino == parent_ino && d.name == name)
            .map(|d| d.child_ino)
    }

    /// Records that `name` under `parent_ino` resolves to `child_ino`.
    /// If an entry already exists for this pair and names a different
    /// inode, it is overwritten and the previous target is returned so
    /// the caller can drop its reference to it.
    pub fn create(&self, parent_ino: u64, name: &str, child_ino: u64) -> Option<u64> {
        let mut buckets = self.buckets.lock().expect("dentry table mutex poisoned");
        let bucket = buckets.entry(key(parent_ino, name)).or_default();

        if let Some(existing) = bucket.iter_mut().find(|d| d.parent_ino == parent_ino && d.name == name) {
            if existing.child_ino == child_ino {
                return None;
            }
            let previous = existing.child_ino;
            existing.child_ino = child_ino;
            return Some(previous);
        }

        bucket.push(Dentry { parent_ino, name: name.to_string(), child_ino });
        None
    }

    /// Removes the entry for `(parent_ino, name)`, if any, returning the
    /// inode it pointed at.
    pub fn remove(&self, parent_ino: u64, name: &str) -> Option<u64> {
        let mut buckets = self.buckets.lock().expect("dentry table mutex poisoned");
        let k = key(parent_ino, name);
        let bucket = buckets.get_mut(&k)?;
        let position = bucket.iter().position(|d| d.parent_ino == parent_ino && d.name == name)?;
        let removed = bucket.remove(position);
        if bucket.is_empty() {
            buckets.remove(&k);
        }
        Some(removed.child_ino)
    }
}
