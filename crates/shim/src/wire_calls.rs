//! Per-opcode request marshalling and reply parsing.
//!
//! Fixed-header field order here must match `daemon::dispatch`/
//! `daemon::messages` byte for byte; both sides are built directly
//! against `wire::envelope`/`wire::payload`/`wire::stat`, so there is no
//! shared struct to drift, only the convention documented in those
//! crates (a string field is a payload offset, offset zero is absent,
//! the first string in a reply always lands at offset one).

use cache::{AttrMask, Attrs};
use wire::{CephfsError, Opcode, PayloadReader, PayloadWriter, ReplyFrame, WireAttrs, WireStatfs, WIRE_ATTRS_LEN, WIRE_STATFS_LEN};

use crate::transport::Transport;

fn expect_ok(reply: ReplyFrame) -> Result<ReplyFrame, CephfsError> {
    if reply.result < 0 {
        Err(CephfsError::Native(-reply.result))
    } else {
        Ok(reply)
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, CephfsError> {
    buf.get(offset..offset + 8).and_then(|s| s.try_into().ok()).map(u64::from_ne_bytes).ok_or(CephfsError::Truncated)
}

fn read_reply_string(reply: &ReplyFrame) -> Result<String, CephfsError> {
    PayloadReader::new(&reply.payload)
        .read_str(1)?
        .map(str::to_string)
        .ok_or(CephfsError::InvalidHandle("reply carried no string payload"))
}

fn from_wire_attrs(wire: WireAttrs) -> Attrs {
    Attrs {
        mask: AttrMask::MODE
            | AttrMask::NLINK
            | AttrMask::UID
            | AttrMask::GID
            | AttrMask::RDEV
            | AttrMask::ATIME
            | AttrMask::MTIME
            | AttrMask::CTIME
            | AttrMask::INO
            | AttrMask::SIZE
            | AttrMask::BLOCKS,
        blksize: wire.blksize,
        dev: 0,
        mode: wire.mode,
        nlink: wire.nlink,
        uid: wire.uid,
        gid: wire.gid,
        rdev: wire.rdev,
        atime: wire.atime,
        mtime: wire.mtime,
        ctime: wire.ctime,
        ino: wire.ino,
        size: wire.size,
        blocks: wire.blocks,
        btime: 0,
        version: 0,
    }
}

fn decode_attrs_reply(reply: &ReplyFrame) -> Result<(u64, Attrs), CephfsError> {
    let inode_handle = read_u64(&reply.fixed, 0)?;
    let attrs_bytes: [u8; WIRE_ATTRS_LEN] =
        reply.fixed.get(8..8 + WIRE_ATTRS_LEN).and_then(|s| s.try_into().ok()).ok_or(CephfsError::Truncated)?;
    Ok((inode_handle, from_wire_attrs(WireAttrs::from_bytes(attrs_bytes))))
}

pub fn create(transport: &Transport, id: &str) -> Result<u64, CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(id);
    let reply = expect_ok(transport.call(Opcode::Create.as_u16(), offset.to_ne_bytes().to_vec(), writer.into_bytes())?)?;
    read_u64(&reply.fixed, 0)
}

pub fn release(transport: &Transport, handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::Release.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

pub fn conf_read_file(transport: &Transport, handle: u64, path: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(path);
    let mut fixed = handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::ConfReadFile.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn conf_get(transport: &Transport, handle: u64, name: &str) -> Result<String, CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::ConfGet.as_u16(), fixed, writer.into_bytes())?)?;
    read_reply_string(&reply)
}

pub fn conf_set(transport: &Transport, handle: u64, name: &str, value: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let name_offset = writer.push_str(name);
    let value_offset = writer.push_str(value);
    let mut fixed = handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&name_offset.to_ne_bytes());
    fixed.extend_from_slice(&value_offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::ConfSet.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn select_filesystem(transport: &Transport, handle: u64, name: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::SelectFilesystem.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn init(transport: &Transport, handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::Init.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

pub fn mount(transport: &Transport, handle: u64, root: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(root);
    let mut fixed = handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::Mount.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn unmount(transport: &Transport, handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::Unmount.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

pub fn statfs(transport: &Transport, handle: u64) -> Result<WireStatfs, CephfsError> {
    let reply = expect_ok(transport.call(Opcode::Statfs.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    let bytes: [u8; WIRE_STATFS_LEN] = reply.fixed.as_slice().try_into().map_err(|_| CephfsError::Truncated)?;
    Ok(WireStatfs::from_bytes(bytes))
}

pub fn lookup_root(transport: &Transport, handle: u64) -> Result<(u64, Attrs), CephfsError> {
    let reply = expect_ok(transport.call(Opcode::LookupRoot.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    decode_attrs_reply(&reply)
}

pub fn lookup(transport: &Transport, parent_handle: u64, name: &str) -> Result<(u64, Attrs), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Lookup.as_u16(), fixed, writer.into_bytes())?)?;
    decode_attrs_reply(&reply)
}

pub fn getattr(transport: &Transport, inode_handle: u64) -> Result<Attrs, CephfsError> {
    let reply = expect_ok(transport.call(Opcode::Getattr.as_u16(), inode_handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    let bytes: [u8; WIRE_ATTRS_LEN] = reply.fixed.as_slice().try_into().map_err(|_| CephfsError::Truncated)?;
    Ok(from_wire_attrs(WireAttrs::from_bytes(bytes)))
}

pub fn readlink(transport: &Transport, inode_handle: u64) -> Result<String, CephfsError> {
    let reply = expect_ok(transport.call(Opcode::Readlink.as_u16(), inode_handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    read_reply_string(&reply)
}

pub fn mkdir(transport: &Transport, parent_handle: u64, name: &str, mode: u32) -> Result<(u64, Attrs), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    fixed.extend_from_slice(&mode.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Mkdir.as_u16(), fixed, writer.into_bytes())?)?;
    decode_attrs_reply(&reply)
}

pub fn unlink(transport: &Transport, parent_handle: u64, name: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::Unlink.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn rmdir(transport: &Transport, parent_handle: u64, name: &str) -> Result<(), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    expect_ok(transport.call(Opcode::Rmdir.as_u16(), fixed, writer.into_bytes())?)?;
    Ok(())
}

pub fn symlink(transport: &Transport, parent_handle: u64, name: &str, target: &str) -> Result<(u64, Attrs), CephfsError> {
    let mut writer = PayloadWriter::new();
    let name_offset = writer.push_str(name);
    let target_offset = writer.push_str(target);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&name_offset.to_ne_bytes());
    fixed.extend_from_slice(&target_offset.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Symlink.as_u16(), fixed, writer.into_bytes())?)?;
    decode_attrs_reply(&reply)
}

pub fn put(transport: &Transport, inode_handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::Put.as_u16(), inode_handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

/// Creates and opens `name` under `parent_handle`, returning the new
/// inode handle, the file handle opened against it, and its attrs.
pub fn create_file(
    transport: &Transport,
    parent_handle: u64,
    name: &str,
    mode: u32,
    flags: u32,
) -> Result<(u64, u64, Attrs), CephfsError> {
    let mut writer = PayloadWriter::new();
    let offset = writer.push_str(name);
    let mut fixed = parent_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    fixed.extend_from_slice(&mode.to_ne_bytes());
    fixed.extend_from_slice(&flags.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::CreateFile.as_u16(), fixed, writer.into_bytes())?)?;
    let inode_handle = read_u64(&reply.fixed, 0)?;
    let file_handle = read_u64(&reply.fixed, 8)?;
    let attrs_bytes: [u8; WIRE_ATTRS_LEN] =
        reply.fixed.get(16..16 + WIRE_ATTRS_LEN).and_then(|s| s.try_into().ok()).ok_or(CephfsError::Truncated)?;
    Ok((inode_handle, file_handle, from_wire_attrs(WireAttrs::from_bytes(attrs_bytes))))
}

pub fn open(transport: &Transport, inode_handle: u64, flags: u32) -> Result<u64, CephfsError> {
    let mut fixed = inode_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&flags.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Open.as_u16(), fixed, Vec::new())?)?;
    read_u64(&reply.fixed, 0)
}

pub fn read(transport: &Transport, file_handle: u64, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError> {
    let mut fixed = file_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    fixed.extend_from_slice(&len.to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Read.as_u16(), fixed, Vec::new())?)?;
    let read_len = read_u64(&reply.fixed, 0)? as usize;
    PayloadReader::new(&reply.payload).read_bytes(1, read_len).map(<[u8]>::to_vec)
}

pub fn write(transport: &Transport, file_handle: u64, offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
    let mut writer = PayloadWriter::new();
    let data_offset = writer.push_bytes(data);
    let mut fixed = file_handle.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&offset.to_ne_bytes());
    fixed.extend_from_slice(&data_offset.to_ne_bytes());
    fixed.extend_from_slice(&(data.len() as u32).to_ne_bytes());
    let reply = expect_ok(transport.call(Opcode::Write.as_u16(), fixed, writer.into_bytes())?)?;
    read_u64(&reply.fixed, 0)
}

pub fn close(transport: &Transport, file_handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::Close.as_u16(), file_handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

pub fn userperm_new(transport: &Transport, uid: u32, gid: u32, groups: &[u32]) -> Result<u64, CephfsError> {
    let mut fixed = uid.to_ne_bytes().to_vec();
    fixed.extend_from_slice(&gid.to_ne_bytes());
    fixed.extend_from_slice(&(groups.len() as u32).to_ne_bytes());
    let mut payload = Vec::with_capacity(groups.len() * 4);
    for group in groups {
        payload.extend_from_slice(&group.to_ne_bytes());
    }
    let reply = expect_ok(transport.call(Opcode::UserpermNew.as_u16(), fixed, payload)?)?;
    read_u64(&reply.fixed, 0)
}

pub fn userperm_destroy(transport: &Transport, handle: u64) -> Result<(), CephfsError> {
    expect_ok(transport.call(Opcode::UserpermDestroy.as_u16(), handle.to_ne_bytes().to_vec(), Vec::new())?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_error_reply_is_reported_as_a_native_error() {
        let reply = ReplyFrame { result: -2, fixed: Vec::new(), payload: Vec::new() };
        assert!(matches!(expect_ok(reply), Err(CephfsError::Native(2))));
    }

    #[test]
    fn attrs_reply_decodes_handle_and_attrs() {
        let attrs = WireAttrs { ino: 7, mode: 0o40755, nlink: 2, uid: 0, gid: 0, rdev: 0, size: 4096, blocks: 8, blksize: 4096, atime: 1, mtime: 2, ctime: 3 };
        let mut fixed = 9u64.to_ne_bytes().to_vec();
        fixed.extend_from_slice(&attrs.to_bytes());
        let reply = ReplyFrame { result: 0, fixed, payload: Vec::new() };
        let (handle, decoded) = decode_attrs_reply(&reply).unwrap();
        assert_eq!(handle, 9);
        assert_eq!(decoded.ino, 7);
        assert_eq!(decoded.mode, 0o40755);
        assert!(decoded.mask.contains(AttrMask::INO | AttrMask::MODE));
    }
}
