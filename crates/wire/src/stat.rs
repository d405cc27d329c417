//! Wire layout for a full stat result, shared by every opcode reply that
//! carries one (`Lookup`, `LookupRoot`, `Getattr`, `Mkdir`, `Symlink`).
//!
//! Kept here rather than duplicated in the `daemon` and `shim` crates so
//! the two sides of the wire can never drift on field order.

pub const WIRE_ATTRS_LEN: usize = 76;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireAttrs {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blocks: u64,
    pub blksize: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl WireAttrs {
    #[must_use]
    pub fn to_bytes(self) -> [u8; WIRE_ATTRS_LEN] {
        let mut buf = [0u8; WIRE_ATTRS_LEN];
        let mut at = 0;
        macro_rules! put {
            ($field:expr) => {{
                let bytes = $field.to_ne_bytes();
                buf[at..at + bytes.len()].copy_from_slice(&bytes);
                at += bytes.len();
            }};
        }
        put!(self.ino);
        put!(self.mode);
        put!(self.nlink);
        put!(self.uid);
        put!(self.gid);
        put!(self.rdev);
        put!(self.size);
        put!(self.blocks);
        put!(self.blksize);
        put!(self.atime);
        put!(self.mtime);
        put!(self.ctime);
        buf
    }

    #[must_use]
    pub fn from_bytes(buf: [u8; WIRE_ATTRS_LEN]) -> Self {
        let mut at = 0;
        macro_rules! take {
            ($ty:ty) => {{
                let width = std::mem::size_of::<$ty>();
                let value = <$ty>::from_ne_bytes(buf[at..at + width].try_into().expect("fixed width slice"));
                at += width;
                value
            }};
        }
        Self {
            ino: take!(u64),
            mode: take!(u32),
            nlink: take!(u32),
            uid: take!(u32),
            gid: take!(u32),
            rdev: take!(u64),
            size: take!(u64),
            blocks: take!(u64),
            blksize: take!(u32),
            atime: take!(i64),
            mtime: take!(i64),
            ctime: take!(i64),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireStatfs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
    pub files_free: u64,
}

pub const WIRE_STATFS_LEN: usize = 40;

impl WireStatfs {
    #[must_use]
    pub fn to_bytes(self) -> [u8; WIRE_STATFS_LEN] {
        let mut buf = [0u8; WIRE_STATFS_LEN];
        buf[0..8].copy_from_slice(&self.block_size.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.blocks.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.blocks_free.to_ne_bytes());
        buf[24..32].copy_from_slice(&self.files.to_ne_bytes());
        buf[32..40].copy_from_slice(&self.files_free.to_ne_bytes());
        buf
    }

    #[must_use]
    pub fn from_bytes(buf: [u8; WIRE_STATFS_LEN]) -> Self {
        Self {
            block_size: u64::from_ne_bytes(buf[0..8].try_into().unwrap()),
            blocks: u64::from_ne_bytes(buf[8..16].try_into().unwrap()),
            blocks_free: u64::from_ne_bytes(buf[16..24].try_into().unwrap()),
            files: u64::from_ne_bytes(buf[24..32].try_into().unwrap()),
            files_free: u64::from_ne_bytes(buf[32..40].try_into().unwrap()),
        }
    }
}
