/// Stable opcode numbers for every request the daemon understands.
///
/// Numbers are append-only: a new opcode is always added at the end and
/// bumps the protocol minor version (see [`crate::version`]). An opcode
/// at or beyond [`Opcode::TOTAL_OPS`] is `ENOSYS`; one within range whose
/// handler slot is empty is `EOPNOTSUPP` (see `wire::error::CephfsError`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Version = 0,
    UserpermNew = 1,
    UserpermDestroy = 2,
    Create = 3,
    Release = 4,
    ConfReadFile = 5,
    ConfGet = 6,
    ConfSet = 7,
    Init = 8,
    SelectFilesystem = 9,
    Mount = 10,
    Unmount = 11,
    Statfs = 12,
    Lookup = 13,
    LookupInode = 14,
    LookupRoot = 15,
    Put = 16,
    Walk = 17,
    Chdir = 18,
    Getcwd = 19,
    Readdir = 20,
    Rewinddir = 21,
    Open = 22,
    CreateFile = 23,
    Mknod = 24,
    Close = 25,
    Rename = 26,
    Lseek = 27,
    Read = 28,
    Write = 29,
    Link = 30,
    Unlink = 31,
    Getattr = 32,
    Setattr = 33,
    Fallocate = 34,
    Fsync = 35,
    Listxattr = 36,
    Getxattr = 37,
    Setxattr = 38,
    Removexattr = 39,
    Readlink = 40,
    Symlink = 41,
    Opendir = 42,
    Mkdir = 43,
    Rmdir = 44,
    Releasedir = 45,
}

impl Opcode {
    /// One past the highest valid opcode number; also the fixed length of
    /// the daemon's handler dispatch table.
    pub const TOTAL_OPS: u16 = 46;

    /// The full table in wire order, used to build the dispatch array and
    /// to round-trip every variant in tests.
    pub const ALL: [Opcode; Self::TOTAL_OPS as usize] = [
        Opcode::Version,
        Opcode::UserpermNew,
        Opcode::UserpermDestroy,
        Opcode::Create,
        Opcode::Release,
        Opcode::ConfReadFile,
        Opcode::ConfGet,
        Opcode::ConfSet,
        Opcode::Init,
        Opcode::SelectFilesystem,
        Opcode::Mount,
        Opcode::Unmount,
        Opcode::Statfs,
        Opcode::Lookup,
        Opcode::LookupInode,
        Opcode::LookupRoot,
        Opcode::Put,
        Opcode::Walk,
        Opcode::Chdir,
        Opcode::Getcwd,
        Opcode::Readdir,
        Opcode::Rewinddir,
        Opcode::Open,
        Opcode::CreateFile,
        Opcode::Mknod,
        Opcode::Close,
        Opcode::Rename,
        Opcode::Lseek,
        Opcode::Read,
        Opcode::Write,
        Opcode::Link,
        Opcode::Unlink,
        Opcode::Getattr,
        Opcode::Setattr,
        Opcode::Fallocate,
        Opcode::Fsync,
        Opcode::Listxattr,
        Opcode::Getxattr,
        Opcode::Setxattr,
        Opcode::Removexattr,
        Opcode::Readlink,
        Opcode::Symlink,
        Opcode::Opendir,
        Opcode::Mkdir,
        Opcode::Rmdir,
        Opcode::Releasedir,
    ];

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Resolves a wire opcode number, returning `None` for anything at or
    /// beyond [`Self::TOTAL_OPS`] (the caller maps that to `ENOSYS`).
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}
