//! Cached stat attributes and the field mask that describes which of
//! them are currently valid.
//!
//! A lookup or getattr reply only ever fills in the fields its mask
//! bits name; merging a fresh reply into a cached inode must OR the
//! mask and overwrite only the newly-valid fields; it must never
//! wholesale-replace the record; a thread racing an older, narrower
//! reply in after a newer one would otherwise blow away the newer
//! fields. `blksize` and `dev` are unconditional because the upstream
//! shim treats them as always refreshed regardless of the mask.

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
    pub struct AttrMask: u32 {
        const MODE = 1 << 0;
        const NLINK = 1 << 1;
        const UID = 1 << 2;
        const GID = 1 << 3;
        const RDEV = 1 << 4;
        const ATIME = 1 << 5;
        const MTIME = 1 << 6;
        const CTIME = 1 << 7;
        const INO = 1 << 8;
        const SIZE = 1 << 9;
        const BLOCKS = 1 << 10;
        const BTIME = 1 << 11;
        const VERSION = 1 << 12;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attrs {
    pub mask: AttrMask,
    pub blksize: u32,
    pub dev: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub btime: i64,
    pub version: u64,
}

impl Attrs {
    /// Merges `fresh` into `self`, field by field, gated on the bit in
    /// `fresh.mask` that names each field.
    pub fn merge(&mut self, fresh: &Attrs) {
        self.mask |= fresh.mask;
        self.blksize = fresh.blksize;
        self.dev = fresh.dev;

        macro_rules! take {
            ($field:ident, $bit:expr) => {
                if fresh.mask.contains($bit) {
                    self.$field = fresh.$field;
                }
            };
        }

        take!(mode, AttrMask::MODE);
        take!(nlink, AttrMask::NLINK);
        take!(uid, AttrMask::UID);
        take!(gid, AttrMask::GID);
        take!(rdev, AttrMask::RDEV);
        take!(atime, AttrMask::ATIME);
        take!(mtime, AttrMask::MTIME);
        take!(ctime, AttrMask::CTIME);
        take!(ino, AttrMask::INO);
        take!(size, AttrMask::SIZE);
        take!(blocks, AttrMask::BLOCKS);
        take!(btime, AttrMask::BTIME);
        take!(version, AttrMask::VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_narrower_reply_does_not_clobber_unmentioned_fields() {
        let mut cached = Attrs { mask: AttrMask::MODE | AttrMask::SIZE, mode: 0o644, size: 100, ..Attrs::default() };
        let fresh = Attrs { mask: AttrMask::SIZE, size: 200, ..Attrs::default() };
        cached.merge(&fresh);
        assert_eq!(cached.mode, 0o644);
        assert_eq!(cached.size, 200);
        assert!(cached.mask.contains(AttrMask::MODE));
        assert!(cached.mask.contains(AttrMask::SIZE));
    }

    #[test]
    fn mask_accumulates_across_merges() {
        let mut cached = Attrs::default();
        cached.merge(&Attrs { mask: AttrMask::UID, uid: 1, ..Attrs::default() });
        cached.merge(&Attrs { mask: AttrMask::GID, gid: 2, ..Attrs::default() });
        assert!(cached.mask.contains(AttrMask::UID | AttrMask::GID));
        assert_eq!(cached.uid, 1);
        assert_eq!(cached.gid, 2);
    }
}
