//! Per-connection state: the scrambled handle slot table this worker
//! thread owns exclusively, plus the shared pool and credential table
//! every connection draws from.
//!
//! Unlike [`pool::CredentialTable`], this table is per-connection, not
//! process-global: a mount/inode handle only ever makes sense to the
//! worker that minted it (spec.md §4.2), and mount-instance handles and
//! inode handles share one slot table and one scrambler, matching the
//! wire layer's single per-connection scrambler.

use std::path::PathBuf;
use std::sync::Arc;

use handle::Scrambler;
use pool::{CredentialTable, Mounted, Pool, Session};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wire::CephfsError;

/// One instance this connection has created, somewhere between `Create`
/// and `Mount`, or already mounted and serving data-plane calls.
pub enum InstanceSlot {
    Configuring(Session),
    Mounted(Mounted),
}

/// One inode resolved (or created) through a mounted instance. Kept
/// separate from `Slot::Instance` so a data-plane call can be checked
/// against the instance it was resolved through.
pub struct InodeEntry {
    pub instance_handle: u64,
    pub native_ino: u64,
}

/// One file descriptor opened (or created) through a mounted instance,
/// the data-plane counterpart to `InodeEntry`.
pub struct FileEntry {
    pub instance_handle: u64,
    pub native_fh: u64,
}

pub enum Slot {
    Instance(InstanceSlot),
    Inode(InodeEntry),
    File(FileEntry),
}

pub struct ConnectionState {
    pub pool: Arc<Pool>,
    pub credentials: Arc<CredentialTable>,
    pub snapshot_dir: PathBuf,
    scrambler: Scrambler,
    slots: Vec<Option<Slot>>,
}

impl ConnectionState {
    #[must_use]
    pub fn new(pool: Arc<Pool>, credentials: Arc<CredentialTable>, snapshot_dir: PathBuf) -> Self {
        Self {
            pool,
            credentials,
            snapshot_dir,
            scrambler: Scrambler::new(&mut StdRng::from_entropy()),
            slots: Vec::new(),
        }
    }

    fn insert(&mut self, slot: Slot) -> u64 {
        let index = self.slots.iter().position(Option::is_none).unwrap_or(self.slots.len());
        if index == self.slots.len() {
            self.slots.push(None);
        }
        self.slots[index] = Some(slot);
        handle::encode(&self.scrambler, Some(index as u32))
    }

    fn index_of(&self, wire_handle: u64) -> Result<usize, CephfsError> {
        let index = handle::decode(&self.scrambler, wire_handle)?
            .ok_or(CephfsError::InvalidHandle("handle is null"))?;
        Ok(index as usize)
    }

    fn take_slot(&mut self, wire_handle: u64) -> Result<Slot, CephfsError> {
        let index = self.index_of(wire_handle)?;
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(CephfsError::InvalidHandle("handle does not name a live slot"))
    }

    fn put_slot(&mut self, wire_handle: u64, slot: Slot) -> Result<(), CephfsError> {
        let index = self.index_of(wire_handle)?;
        let existing = self.slots.get_mut(index).ok_or(CephfsError::InvalidHandle("handle does not name a live slot"))?;
        *existing = Some(slot);
        Ok(())
    }

    pub fn insert_instance(&mut self, slot: InstanceSlot) -> u64 {
        self.insert(Slot::Instance(slot))
    }

    pub fn insert_inode(&mut self, entry: InodeEntry) -> u64 {
        self.insert(Slot::Inode(entry))
    }

    pub fn insert_file(&mut self, entry: FileEntry) -> u64 {
        self.insert(Slot::File(entry))
    }

    pub fn instance(&self, wire_handle: u64) -> Result<&InstanceSlot, CephfsError> {
        let index = self.index_of(wire_handle)?;
        match self.slots.get(index).and_then(Option::as_ref) {
            Some(Slot::Instance(slot)) => Ok(slot),
            Some(Slot::Inode(_)) => Err(CephfsError::InvalidHandle("handle names an inode, not an instance")),
            Some(Slot::File(_)) => Err(CephfsError::InvalidHandle("handle names a file, not an instance")),
            None => Err(CephfsError::InvalidHandle("handle does not name a live slot")),
        }
    }

    pub fn inode(&self, wire_handle: u64) -> Result<&InodeEntry, CephfsError> {
        let index = self.index_of(wire_handle)?;
        match self.slots.get(index).and_then(Option::as_ref) {
            Some(Slot::Inode(entry)) => Ok(entry),
            Some(Slot::Instance(_)) => Err(CephfsError::InvalidHandle("handle names an instance, not an inode")),
            Some(Slot::File(_)) => Err(CephfsError::InvalidHandle("handle names a file, not an inode")),
            None => Err(CephfsError::InvalidHandle("handle does not name a live slot")),
        }
    }

    pub fn file(&self, wire_handle: u64) -> Result<&FileEntry, CephfsError> {
        let index = self.index_of(wire_handle)?;
        match self.slots.get(index).and_then(Option::as_ref) {
            Some(Slot::File(entry)) => Ok(entry),
            Some(Slot::Instance(_)) => Err(CephfsError::InvalidHandle("handle names an instance, not a file")),
            Some(Slot::Inode(_)) => Err(CephfsError::InvalidHandle("handle names an inode, not a file")),
            None => Err(CephfsError::InvalidHandle("handle does not name a live slot")),
        }
    }

    /// Clones out the pooled instance handle named by `wire_handle`,
    /// rejecting one that has not mounted yet. Cloning is cheap (an
    /// `Arc<Mutex<Instance>>` underneath) and lets callers run a
    /// data-plane call without holding this table's slot borrow open.
    pub fn mounted(&self, wire_handle: u64) -> Result<Mounted, CephfsError> {
        match self.instance(wire_handle)? {
            InstanceSlot::Mounted(mounted) => Ok(mounted.clone()),
            InstanceSlot::Configuring(_) => Err(CephfsError::InstanceState("instance is not mounted")),
        }
    }

    /// Takes ownership of the instance slot at `wire_handle`, running
    /// `f` against it and putting the result back unless `f` itself
    /// consumes it (returning `None` in the replacement half of the
    /// pair means the slot is left empty, freeing the handle for reuse).
    pub fn with_instance_taken<R>(
        &mut self,
        wire_handle: u64,
        f: impl FnOnce(InstanceSlot) -> (Option<InstanceSlot>, Result<R, CephfsError>),
    ) -> Result<R, CephfsError> {
        let slot = self.take_slot(wire_handle)?;
        let instance = match slot {
            Slot::Instance(instance) => instance,
            Slot::Inode(entry) => {
                self.put_slot(wire_handle, Slot::Inode(entry)).expect("handle just validated");
                return Err(CephfsError::InvalidHandle("handle names an inode, not an instance"));
            }
            Slot::File(entry) => {
                self.put_slot(wire_handle, Slot::File(entry)).expect("handle just validated");
                return Err(CephfsError::InvalidHandle("handle names a file, not an instance"));
            }
        };
        let (replacement, result) = f(instance);
        if let Some(replacement) = replacement {
            self.put_slot(wire_handle, Slot::Instance(replacement)).expect("handle just validated");
        }
        result
    }

    /// Removes the inode slot at `wire_handle`, for `Put`.
    pub fn remove_inode(&mut self, wire_handle: u64) -> Result<InodeEntry, CephfsError> {
        match self.take_slot(wire_handle)? {
            Slot::Inode(entry) => Ok(entry),
            Slot::Instance(instance) => {
                self.put_slot(wire_handle, Slot::Instance(instance)).expect("handle just validated");
                Err(CephfsError::InvalidHandle("handle names an instance, not an inode"))
            }
            Slot::File(entry) => {
                self.put_slot(wire_handle, Slot::File(entry)).expect("handle just validated");
                Err(CephfsError::InvalidHandle("handle names a file, not an inode"))
            }
        }
    }

    /// Puts an inode slot back after a failed `Put`, so the client can retry.
    pub fn restore_inode(&mut self, wire_handle: u64, entry: InodeEntry) -> Result<(), CephfsError> {
        self.put_slot(wire_handle, Slot::Inode(entry))
    }

    /// Removes the file slot at `wire_handle`, for `Close`.
    pub fn remove_file(&mut self, wire_handle: u64) -> Result<FileEntry, CephfsError> {
        match self.take_slot(wire_handle)? {
            Slot::File(entry) => Ok(entry),
            Slot::Instance(instance) => {
                self.put_slot(wire_handle, Slot::Instance(instance)).expect("handle just validated");
                Err(CephfsError::InvalidHandle("handle names an instance, not a file"))
            }
            Slot::Inode(entry) => {
                self.put_slot(wire_handle, Slot::Inode(entry)).expect("handle just validated");
                Err(CephfsError::InvalidHandle("handle names an inode, not a file"))
            }
        }
    }

    /// Puts a file slot back after a failed `Close`, so the client can retry.
    pub fn restore_file(&mut self, wire_handle: u64, entry: FileEntry) -> Result<(), CephfsError> {
        self.put_slot(wire_handle, Slot::File(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool::NativeClientFactory;

    struct UnusedFactory;
    impl NativeClientFactory for UnusedFactory {
        fn create(&self, _id: &str) -> Result<Box<dyn pool::NativeClient>, CephfsError> {
            unreachable!("not exercised by these tests")
        }
    }

    fn state() -> ConnectionState {
        ConnectionState::new(
            Arc::new(Pool::new(Box::new(UnusedFactory))),
            Arc::new(CredentialTable::new(Scrambler::new(&mut StdRng::seed_from_u64(1)))),
            PathBuf::from("/tmp"),
        )
    }

    #[test]
    fn an_unknown_handle_is_rejected() {
        let state = state();
        assert!(state.instance(12_345).is_err());
    }

    #[test]
    fn the_null_handle_is_rejected_rather_than_resolving_to_slot_zero() {
        let state = state();
        assert!(state.instance(0).is_err());
    }

    #[test]
    fn an_inode_handle_is_not_accepted_as_an_instance_handle() {
        let mut state = state();
        let handle = state.insert_inode(InodeEntry { instance_handle: 0, native_ino: 1 });
        assert!(state.instance(handle).is_err());
        assert!(state.inode(handle).is_ok());
    }

    #[test]
    fn freed_slots_are_reused_across_kinds() {
        let mut state = state();
        let inode_handle = state.insert_inode(InodeEntry { instance_handle: 0, native_ino: 1 });
        state.remove_inode(inode_handle).unwrap();
        assert!(state.inode(inode_handle).is_err());
    }
}
