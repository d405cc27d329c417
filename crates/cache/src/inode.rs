//! The inode cache: one entry per Ceph inode number seen by this
//! instance, shared and reference-counted across every dentry and
//! open handle that points at it.

use std::collections::HashMap;
use std::sync::Mutex;

use wire::CephfsError;

use crate::attrs::Attrs;

/// One cached inode. `native` is the opaque value the native client
/// library uses to identify this inode in its own address space; the
/// cache never interprets it, only threads it through to release calls.
#[derive(Clone, Debug)]
pub struct Inode {
    pub native: u64,
    pub attrs: Attrs,
    refs: u32,
}

impl Inode {
    #[must_use]
    pub fn ino(&self) -> u64 {
        self.attrs.ino
    }
}

#[derive(Default)]
pub struct InodeTable {
    by_ino: Mutex<HashMap<u64, Inode>>,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `ino`, bumping its refcount on a hit.
    #[must_use]
    pub fn lookup(&self, ino: u64) -> Option<Inode> {
        let mut table = self.by_ino.lock().expect("inode table mutex poisoned");
        let entry = table.get_mut(&ino)?;
        entry.refs += 1;
        Some(entry.clone())
    }

    /// Looks up `ino` without taking a reference, for a read-only cache
    /// check (a cached-`getattr` fast path) that must not perturb the
    /// entry's lifetime.
    #[must_use]
    pub fn peek(&self, ino: u64) -> Option<Inode> {
        let table = self.by_ino.lock().expect("inode table mutex poisoned");
        table.get(&ino).cloned()
    }

    /// Merges freshly-fetched `attrs` into an already-held entry without
    /// touching its refcount, for a caller that revalidates an inode it
    /// already holds a reference to rather than resolving it anew.
    pub fn merge(&self, ino: u64, attrs: &Attrs) -> Option<Inode> {
        let mut table = self.by_ino.lock().expect("inode table mutex poisoned");
        let entry = table.get_mut(&ino)?;
        entry.attrs.merge(attrs);
        Some(entry.clone())
    }

    /// Inserts a freshly-resolved inode, or merges `attrs` into an
    /// existing entry and bumps its refcount, mirroring the upstream
    /// shim's `inode_create`: a lookup that resolves to an
    /// already-cached inode still takes a new reference, it never
    /// reuses the caller's.
    pub fn create(&self, native: u64, attrs: Attrs) -> Result<Inode, CephfsError> {
        if !attrs.mask.contains(crate::attrs::AttrMask::INO) {
            return Err(CephfsError::InvalidHandle("attribute reply carries no inode number"));
        }
        let mut table = self.by_ino.lock().expect("inode table mutex poisoned");
        let entry = table.entry(attrs.ino).or_insert_with(|| Inode { native, attrs: Attrs::default(), refs: 0 });
        entry.attrs.merge(&attrs);
        entry.refs += 1;
        Ok(entry.clone())
    }

    /// Drops one reference to `ino`. When the refcount reaches zero the
    /// entry is removed and `release` (the native `ll_put` call) is
    /// invoked; if `release` fails the entry is reinstated with its
    /// refcount restored, since the native object was not actually
    /// freed and a second `put` must still be able to find it.
    pub fn put(&self, ino: u64, release: impl FnOnce(u64) -> Result<(), CephfsError>) -> Result<(), CephfsError> {
        let mut table = self.by_ino.lock().expect("inode table mutex poisoned");
        let Some(entry) = table.get_mut(&ino) else {
            return Err(CephfsError::InvalidHandle("put on an inode not in the cache"));
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(());
        }
        let removed = table.remove(&ino).expect("just checked it exists");
        drop(table);

        if let Err(err) = release(removed.native) {
            let mut table = self.by_ino.lock().expect("inode table mutex poisoned");
            table.entry(ino).or_insert(removed).refs = 1;
            return Err(err);
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ino.lock().expect("inode table mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::AttrMask;

    fn attrs(ino: u64) -> Attrs {
        Attrs { mask: AttrMask::INO, ino, ..Attrs::default() }
    }

    #[test]
    fn create_then_lookup_shares_the_same_entry() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        let found = table.lookup(5).unwrap();
        assert_eq!(found.ino(), 5);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn refcount_reaches_zero_and_the_entry_is_removed() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        table.put(5, |_| Ok(())).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn two_references_require_two_puts() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        table.lookup(5).unwrap();
        table.put(5, |_| Ok(())).unwrap();
        assert_eq!(table.len(), 1);
        table.put(5, |_| Ok(())).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn a_failed_release_reinstates_the_entry() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        let err = table.put(5, |_| Err(CephfsError::Native(5)));
        assert!(err.is_err());
        assert_eq!(table.len(), 1);
        // A second put can still find it and this time succeeds.
        table.put(5, |_| Ok(())).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn missing_inode_number_is_rejected() {
        let table = InodeTable::new();
        assert!(table.create(1, Attrs::default()).is_err());
    }

    #[test]
    fn peek_does_not_affect_the_refcount() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        table.peek(5).unwrap();
        table.put(5, |_| Ok(())).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn merge_updates_fields_without_bumping_refs() {
        let table = InodeTable::new();
        table.create(111, attrs(5)).unwrap();
        let fresh = Attrs { mask: AttrMask::SIZE, size: 42, ..Attrs::default() };
        let merged = table.merge(5, &fresh).unwrap();
        assert_eq!(merged.attrs.size, 42);
        table.put(5, |_| Ok(())).unwrap();
        assert!(table.is_empty());
    }
}
