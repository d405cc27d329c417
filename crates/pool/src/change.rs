//! The ordered log of configuration changes applied to an instance
//! before it mounts, and the digest used to decide whether two sessions'
//! configurations are equivalent.
//!
//! Equivalence here means byte-exact history, not semantic equality: two
//! configurations that end up meaning the same thing but were built by a
//! different sequence of `conf set` calls, or with extra blank lines in
//! a config file, hash differently and get separate client instances.
//! Treating configuration as a black box this way is deliberate (see
//! `pool::Pool`) - the proxy cannot know which settings are safe to
//! consider equivalent.

use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    /// The instance identifier passed to the underlying client factory.
    Id,
    /// A config file snapshot was applied; `name` holds its generated
    /// path, not the path the caller originally supplied.
    Conf,
    /// A `conf get` was recorded so that reading back a setting doesn't
    /// let two sessions diverge silently if the default later changes.
    Get,
    /// A `conf set` call.
    Set,
    /// A filesystem was selected for a multi-filesystem cluster.
    Fs,
}

impl ChangeKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Conf => "conf",
            Self::Get => "get",
            Self::Set => "set",
            Self::Fs => "fs",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Change {
    pub kind: ChangeKind,
    pub name: String,
    pub value: Option<String>,
}

impl Change {
    fn feed(&self, hasher: &mut Sha256) {
        hasher.update(self.kind.tag().as_bytes());
        hasher.update([0]);
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        if let Some(value) = &self.value {
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
    }
}

/// Append-only until a change fails to apply, in which case the caller
/// pops the tentative entry back off (see `Instance::config`/`set`).
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    entries: Vec<Change>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn push(&mut self, kind: ChangeKind, name: impl Into<String>, value: Option<String>) {
        self.entries.push(Change { kind, name: name.into(), value });
    }

    /// Removes the most recently pushed entry; used to roll back a
    /// change whose underlying client call failed.
    pub fn pop(&mut self) {
        self.entries.pop();
    }

    #[must_use]
    pub fn entries(&self) -> &[Change] {
        &self.entries
    }

    /// Digest of the full ordered history, used as the instance pool's
    /// sharing key. The first byte also selects the pool's hash bucket.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            entry.feed(&mut hasher);
        }
        hasher.finalize().into()
    }
}
