//! User-credential handles (`UserperimNew`/`UserpermDestroy` on the
//! wire). These are process-global rather than per-instance: a
//! credential object carries no state tied to any one mounted
//! filesystem, so every connection shares one slot table and one
//! scrambler, unlike inode and file handles which are scoped to the
//! instance that minted them.

use std::sync::Mutex;

use handle::Scrambler;
use wire::CephfsError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserPerm {
    pub uid: u32,
    pub gid: u32,
    pub groups: Vec<u32>,
}

pub struct CredentialTable {
    scrambler: Scrambler,
    slots: Mutex<Vec<Option<UserPerm>>>,
}

impl CredentialTable {
    #[must_use]
    pub fn new(scrambler: Scrambler) -> Self {
        Self { scrambler, slots: Mutex::new(Vec::new()) }
    }

    /// Registers a credential and returns the opaque handle to give the
    /// client.
    pub fn register(&self, perm: UserPerm) -> u64 {
        let mut slots = self.slots.lock().expect("credential table mutex poisoned");
        let index = slots.iter().position(Option::is_none).unwrap_or(slots.len());
        if index == slots.len() {
            slots.push(None);
        }
        slots[index] = Some(perm);
        handle::encode(&self.scrambler, Some(index as u32))
    }

    /// Looks up the credential a handle names, cloning it out so the
    /// caller isn't left holding the table's lock.
    pub fn resolve(&self, wire_handle: u64) -> Result<UserPerm, CephfsError> {
        let index = handle::decode(&self.scrambler, wire_handle)?
            .ok_or(CephfsError::InvalidHandle("credential handle is null"))?;
        let slots = self.slots.lock().expect("credential table mutex poisoned");
        slots
            .get(index as usize)
            .and_then(Option::clone)
            .ok_or(CephfsError::InvalidHandle("credential handle does not name a live slot"))
    }

    /// Frees the slot a handle names. Freeing an already-freed or
    /// unknown handle is an error, not a no-op, matching
    /// `UserpermDestroy`'s strict handle validation on the wire.
    pub fn release(&self, wire_handle: u64) -> Result<(), CephfsError> {
        let index = handle::decode(&self.scrambler, wire_handle)?
            .ok_or(CephfsError::InvalidHandle("credential handle is null"))?;
        let mut slots = self.slots.lock().expect("credential table mutex poisoned");
        match slots.get_mut(index as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(CephfsError::InvalidHandle("credential handle does not name a live slot")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table() -> CredentialTable {
        CredentialTable::new(Scrambler::new(&mut StdRng::seed_from_u64(3)))
    }

    #[test]
    fn register_then_resolve_round_trips() {
        let table = table();
        let handle = table.register(UserPerm { uid: 1000, gid: 1000, groups: vec![27] });
        assert_eq!(table.resolve(handle).unwrap(), UserPerm { uid: 1000, gid: 1000, groups: vec![27] });
    }

    #[test]
    fn released_handle_is_no_longer_resolvable() {
        let table = table();
        let handle = table.register(UserPerm { uid: 0, gid: 0, groups: vec![] });
        table.release(handle).unwrap();
        assert!(table.resolve(handle).is_err());
    }

    #[test]
    fn releasing_twice_fails_the_second_time() {
        let table = table();
        let handle = table.register(UserPerm { uid: 0, gid: 0, groups: vec![] });
        table.release(handle).unwrap();
        assert!(table.release(handle).is_err());
    }

    #[test]
    fn freed_slots_are_reused() {
        let table = table();
        let first = table.register(UserPerm { uid: 1, gid: 1, groups: vec![] });
        table.release(first).unwrap();
        let second = table.register(UserPerm { uid: 2, gid: 2, groups: vec![] });
        assert_eq!(table.resolve(second).unwrap().uid, 2);
    }
}
