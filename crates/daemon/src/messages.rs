//! Fixed-header field layouts for the opcodes this daemon actually
//! implements business logic for (see [`crate::dispatch`] for the full
//! table, including the opcodes that are registered but unimplemented).
//!
//! Every field is native-endian, matching `wire::envelope`'s own frame
//! header fields; a string field is a `u32` offset into the frame's
//! payload area, per `wire::payload`'s convention.

use wire::CephfsError;

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, CephfsError> {
    buf.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_ne_bytes)
        .ok_or(CephfsError::Truncated)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, CephfsError> {
    buf.get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_ne_bytes)
        .ok_or(CephfsError::Truncated)
}

fn read_i64(buf: &[u8], offset: usize) -> Result<i64, CephfsError> {
    buf.get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .map(i64::from_ne_bytes)
        .ok_or(CephfsError::Truncated)
}

pub struct HandleOnly {
    pub handle: u64,
}

impl HandleOnly {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)? })
    }
}

pub struct HandleAndString {
    pub handle: u64,
    pub offset: u32,
}

impl HandleAndString {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)?, offset: read_u32(fixed, 8)? })
    }
}

pub struct HandleAndTwoStrings {
    pub handle: u64,
    pub first: u32,
    pub second: u32,
}

impl HandleAndTwoStrings {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)?, first: read_u32(fixed, 8)?, second: read_u32(fixed, 12)? })
    }
}

pub struct CreateRequest {
    pub id_offset: u32,
}

impl CreateRequest {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { id_offset: read_u32(fixed, 0)? })
    }
}

pub struct HandleStringAndMode {
    pub handle: u64,
    pub name_offset: u32,
    pub mode: u32,
}

impl HandleStringAndMode {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)?, name_offset: read_u32(fixed, 8)?, mode: read_u32(fixed, 12)? })
    }
}

/// `CreateFile`: creates and opens `name_offset` under the inode named
/// by `handle`.
pub struct CreateFileRequest {
    pub handle: u64,
    pub name_offset: u32,
    pub mode: u32,
    pub flags: u32,
}

impl CreateFileRequest {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self {
            handle: read_u64(fixed, 0)?,
            name_offset: read_u32(fixed, 8)?,
            mode: read_u32(fixed, 12)?,
            flags: read_u32(fixed, 16)?,
        })
    }
}

/// `Open`: opens the already-resolved inode named by `handle`.
pub struct HandleAndFlags {
    pub handle: u64,
    pub flags: u32,
}

impl HandleAndFlags {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)?, flags: read_u32(fixed, 8)? })
    }
}

/// `Write`: `handle` names an open file; the bytes to write sit in the
/// payload at `data_offset..data_offset + data_len` (an opaque blob, not
/// a NUL-terminated string).
pub struct WriteRequest {
    pub handle: u64,
    pub offset: i64,
    pub data_offset: u32,
    pub data_len: u32,
}

impl WriteRequest {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self {
            handle: read_u64(fixed, 0)?,
            offset: read_i64(fixed, 8)?,
            data_offset: read_u32(fixed, 16)?,
            data_len: read_u32(fixed, 20)?,
        })
    }
}

/// `Read`: `handle` names an open file.
pub struct ReadRequest {
    pub handle: u64,
    pub offset: i64,
    pub len: u64,
}

impl ReadRequest {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { handle: read_u64(fixed, 0)?, offset: read_i64(fixed, 8)?, len: read_u64(fixed, 16)? })
    }
}

pub struct UserpermNewRequest {
    pub uid: u32,
    pub gid: u32,
    pub ngroups: u32,
}

impl UserpermNewRequest {
    pub fn decode(fixed: &[u8]) -> Result<Self, CephfsError> {
        Ok(Self { uid: read_u32(fixed, 0)?, gid: read_u32(fixed, 4)?, ngroups: read_u32(fixed, 8)? })
    }
}

#[must_use]
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

#[must_use]
pub fn encode_u32(value: u32) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

#[must_use]
pub fn encode_version(major: u16, minor: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    buf.extend_from_slice(&major.to_ne_bytes());
    buf.extend_from_slice(&minor.to_ne_bytes());
    buf
}
