//! Opcode dispatch: one [`RequestFrame`] in, one [`ReplyFrame`] out.
//!
//! A handler never panics on bad input; invalid handles, unmounted
//! instances, and malformed fixed headers all come back as an error
//! reply with the matching errno, exactly like a native client call
//! failing would. Dispatch itself never touches the socket — see
//! `connection` for the read/decode/dispatch/encode/write loop this
//! feeds into.

use pool::{CredentialTable, NativeFile, Pool, Session, UserPerm};
use wire::{CephfsError, Opcode, PayloadReader, PayloadWriter, ReplyFrame, RequestFrame, WireAttrs, WireStatfs};

use crate::messages::{
    encode_u32, encode_u64, encode_version, CreateFileRequest, CreateRequest, HandleAndFlags, HandleAndString,
    HandleAndTwoStrings, HandleOnly, HandleStringAndMode, ReadRequest, UserpermNewRequest, WriteRequest,
};
use crate::state::{ConnectionState, FileEntry, InodeEntry, InstanceSlot};

fn ok(fixed: Vec<u8>, payload: Vec<u8>) -> ReplyFrame {
    ReplyFrame { result: 0, fixed, payload }
}

fn ok_empty() -> ReplyFrame {
    ok(Vec::new(), Vec::new())
}

fn err(error: CephfsError) -> ReplyFrame {
    ReplyFrame { result: -error.errno(), fixed: Vec::new(), payload: Vec::new() }
}

fn ok_or_err(result: Result<ReplyFrame, CephfsError>) -> ReplyFrame {
    result.unwrap_or_else(err)
}

/// A single string reply always writes its one string first, so it
/// always lands at payload offset 1 (offset 0 is `PayloadWriter`'s own
/// reserved sentinel byte): no offset field is needed in `fixed`.
fn single_string_reply(value: &str) -> ReplyFrame {
    let mut writer = PayloadWriter::new();
    writer.push_str(value);
    ok(Vec::new(), writer.into_bytes())
}

fn attrs_reply(inode_handle: u64, attrs: WireAttrs) -> ReplyFrame {
    let mut fixed = encode_u64(inode_handle);
    fixed.extend_from_slice(&attrs.to_bytes());
    ok(fixed, Vec::new())
}

fn read_str<'a>(reader: &PayloadReader<'a>, offset: u32) -> Result<&'a str, CephfsError> {
    reader.read_str(offset)?.ok_or(CephfsError::InvalidHandle("expected a present string field"))
}

pub fn dispatch(state: &mut ConnectionState, request: &RequestFrame) -> ReplyFrame {
    let Some(opcode) = Opcode::from_u16(request.opcode) else {
        return err(CephfsError::UnknownOpcode(request.opcode));
    };

    match opcode {
        Opcode::Version => ok(encode_version(wire::CURRENT.major, wire::CURRENT.minor), Vec::new()),
        Opcode::UserpermNew => ok_or_err(userperm_new(&state.credentials, request)),
        Opcode::UserpermDestroy => ok_or_err(userperm_destroy(&state.credentials, request)),
        Opcode::Create => ok_or_err(create(state, request)),
        Opcode::Release => ok_or_err(release(state, request)),
        Opcode::ConfReadFile => ok_or_err(conf_read_file(state, request)),
        Opcode::ConfGet => ok_or_err(conf_get(state, request)),
        Opcode::ConfSet => ok_or_err(conf_set(state, request)),
        Opcode::Init => ok_or_err(init(state, request)),
        Opcode::SelectFilesystem => ok_or_err(select_filesystem(state, request)),
        Opcode::Mount => ok_or_err(mount(state, request)),
        Opcode::Unmount => ok_or_err(unmount(state, request)),
        Opcode::Statfs => ok_or_err(statfs(state, request)),
        Opcode::LookupRoot => ok_or_err(lookup_root(state, request)),
        Opcode::Lookup => ok_or_err(lookup(state, request)),
        Opcode::Getattr => ok_or_err(getattr(state, request)),
        Opcode::Readlink => ok_or_err(readlink(state, request)),
        Opcode::Mkdir => ok_or_err(mkdir(state, request)),
        Opcode::Unlink => ok_or_err(unlink(state, request)),
        Opcode::Rmdir => ok_or_err(rmdir(state, request)),
        Opcode::Symlink => ok_or_err(symlink(state, request)),
        Opcode::Put => ok_or_err(put(state, request)),

        Opcode::CreateFile => ok_or_err(create_file(state, request)),
        Opcode::Open => ok_or_err(open(state, request)),
        Opcode::Read => ok_or_err(read(state, request)),
        Opcode::Write => ok_or_err(write(state, request)),
        Opcode::Close => ok_or_err(close(state, request)),

        // Requires a directory-cursor abstraction (readdir position,
        // working-directory tracking) this proxy does not yet model; a
        // real implementation of these belongs in a follow-up.
        Opcode::LookupInode
        | Opcode::Walk
        | Opcode::Chdir
        | Opcode::Getcwd
        | Opcode::Readdir
        | Opcode::Rewinddir
        | Opcode::Mknod
        | Opcode::Rename
        | Opcode::Lseek
        | Opcode::Link
        | Opcode::Setattr
        | Opcode::Fallocate
        | Opcode::Fsync
        | Opcode::Listxattr
        | Opcode::Getxattr
        | Opcode::Setxattr
        | Opcode::Removexattr
        | Opcode::Opendir
        | Opcode::Releasedir => err(CephfsError::Unimplemented(opcode)),
    }
}

fn userperm_new(credentials: &CredentialTable, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = UserpermNewRequest::decode(&request.fixed)?;
    let group_bytes = fields.ngroups as usize * 4;
    let raw = request.payload.get(..group_bytes).ok_or(CephfsError::Truncated)?;
    let groups = raw.chunks_exact(4).map(|c| u32::from_ne_bytes(c.try_into().expect("chunked by 4"))).collect();
    let handle = credentials.register(UserPerm { uid: fields.uid, gid: fields.gid, groups });
    Ok(ok(encode_u64(handle), Vec::new()))
}

fn userperm_destroy(credentials: &CredentialTable, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    credentials.release(fields.handle)?;
    Ok(ok_empty())
}

fn create(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = CreateRequest::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let id = read_str(&reader, fields.id_offset)?;
    let session: Session = state.pool.create(id)?;
    let handle = state.insert_instance(InstanceSlot::Configuring(session));
    Ok(ok(encode_u64(handle), Vec::new()))
}

fn release(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(_) => (None, Ok(ok_empty())),
        InstanceSlot::Mounted(mounted) => (
            Some(InstanceSlot::Mounted(mounted)),
            Err(CephfsError::InstanceState("cannot release a mounted instance, unmount it first")),
        ),
    })
}

fn conf_read_file(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let path = read_str(&reader, fields.offset)?;
    let snapshot_dir = state.snapshot_dir.clone();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(mut session) => {
            let result = session.instance_mut().configure_file(std::path::Path::new(path), &snapshot_dir);
            (Some(InstanceSlot::Configuring(session)), result.map(|()| ok_empty()))
        }
        InstanceSlot::Mounted(mounted) => (
            Some(InstanceSlot::Mounted(mounted)),
            Err(CephfsError::InstanceState("cannot configure a mounted instance")),
        ),
    })
}

fn conf_get(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.offset)?.to_string();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(mut session) => {
            let result = session.instance_mut().get(&name);
            (Some(InstanceSlot::Configuring(session)), result.map(|value| single_string_reply(&value)))
        }
        InstanceSlot::Mounted(mounted) => {
            let result = mounted.with_instance(|instance| instance.get(&name));
            (Some(InstanceSlot::Mounted(mounted)), result.map(|value| single_string_reply(&value)))
        }
    })
}

fn conf_set(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndTwoStrings::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.first)?.to_string();
    let value = read_str(&reader, fields.second)?.to_string();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(mut session) => {
            let result = session.instance_mut().set(&name, &value);
            (Some(InstanceSlot::Configuring(session)), result.map(|()| ok_empty()))
        }
        InstanceSlot::Mounted(mounted) => (
            Some(InstanceSlot::Mounted(mounted)),
            Err(CephfsError::InstanceState("cannot configure a mounted instance")),
        ),
    })
}

fn init(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(mut session) => {
            let result = session.instance_mut().init();
            (Some(InstanceSlot::Configuring(session)), result.map(|()| ok_empty()))
        }
        InstanceSlot::Mounted(mounted) => (Some(InstanceSlot::Mounted(mounted)), Ok(ok_empty())),
    })
}

fn select_filesystem(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.offset)?.to_string();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(mut session) => {
            let result = session.instance_mut().select_filesystem(&name);
            (Some(InstanceSlot::Configuring(session)), result.map(|()| ok_empty()))
        }
        InstanceSlot::Mounted(mounted) => (
            Some(InstanceSlot::Mounted(mounted)),
            Err(CephfsError::InstanceState("cannot select a filesystem on a mounted instance")),
        ),
    })
}

fn mount(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let root = read_str(&reader, fields.offset)?.to_string();
    let pool: std::sync::Arc<Pool> = state.pool.clone();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Configuring(session) => match pool.mount(session, &root) {
            Ok(mounted) => (Some(InstanceSlot::Mounted(mounted)), Ok(ok_empty())),
            // The session (and the native client inside it) is gone on a
            // failed mount; the client must `Create` a fresh instance.
            Err(error) => (None, Err(error)),
        },
        InstanceSlot::Mounted(mounted) => (
            Some(InstanceSlot::Mounted(mounted)),
            Err(CephfsError::InstanceState("instance is already mounted")),
        ),
    })
}

fn unmount(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let pool: std::sync::Arc<Pool> = state.pool.clone();
    state.with_instance_taken(fields.handle, |slot| match slot {
        InstanceSlot::Mounted(mounted) => match pool.unmount(mounted) {
            Ok(()) => (None, Ok(ok_empty())),
            Err(error) => (None, Err(error)),
        },
        InstanceSlot::Configuring(session) => (
            Some(InstanceSlot::Configuring(session)),
            Err(CephfsError::InstanceState("instance is not mounted")),
        ),
    })
}

fn statfs(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let mounted = state.mounted(fields.handle)?;
    let native = mounted.with_instance(|instance| instance.statfs())?;
    let wire_statfs = WireStatfs {
        block_size: native.block_size,
        blocks: native.blocks,
        blocks_free: native.blocks_free,
        files: native.files,
        files_free: native.files_free,
    };
    Ok(ok(wire_statfs.to_bytes().to_vec(), Vec::new()))
}

fn lookup_root(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let mounted = state.mounted(fields.handle)?;
    let native = mounted.with_instance(|instance| instance.root_inode())?;
    let inode_handle = state.insert_inode(InodeEntry { instance_handle: fields.handle, native_ino: native.native });
    Ok(attrs_reply(inode_handle, to_wire_attrs(native.attrs)))
}

fn lookup(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.offset)?.to_string();
    let parent = state.inode(fields.handle)?;
    let instance_handle = parent.instance_handle;
    let parent_ino = parent.native_ino;
    let mounted = state.mounted(instance_handle)?;
    let native = mounted.with_instance(|instance| instance.lookup(parent_ino, &name))?;
    let inode_handle = state.insert_inode(InodeEntry { instance_handle, native_ino: native.native });
    Ok(attrs_reply(inode_handle, to_wire_attrs(native.attrs)))
}

fn getattr(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let entry = state.inode(fields.handle)?;
    let mounted = state.mounted(entry.instance_handle)?;
    let attrs = mounted.with_instance(|instance| instance.getattr(entry.native_ino))?;
    Ok(ok(to_wire_attrs(attrs).to_bytes().to_vec(), Vec::new()))
}

fn readlink(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let entry = state.inode(fields.handle)?;
    let mounted = state.mounted(entry.instance_handle)?;
    let target = mounted.with_instance(|instance| instance.readlink(entry.native_ino))?;
    Ok(single_string_reply(&target))
}

fn mkdir(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleStringAndMode::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.name_offset)?.to_string();
    let parent = state.inode(fields.handle)?;
    let instance_handle = parent.instance_handle;
    let parent_ino = parent.native_ino;
    let mounted = state.mounted(instance_handle)?;
    let native = mounted.with_instance(|instance| instance.mkdir(parent_ino, &name, fields.mode))?;
    let inode_handle = state.insert_inode(InodeEntry { instance_handle, native_ino: native.native });
    Ok(attrs_reply(inode_handle, to_wire_attrs(native.attrs)))
}

fn unlink(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.offset)?.to_string();
    let parent = state.inode(fields.handle)?;
    let mounted = state.mounted(parent.instance_handle)?;
    mounted.with_instance(|instance| instance.unlink(parent.native_ino, &name))?;
    Ok(ok_empty())
}

fn rmdir(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndString::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.offset)?.to_string();
    let parent = state.inode(fields.handle)?;
    let mounted = state.mounted(parent.instance_handle)?;
    mounted.with_instance(|instance| instance.rmdir(parent.native_ino, &name))?;
    Ok(ok_empty())
}

fn symlink(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndTwoStrings::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.first)?.to_string();
    let target = read_str(&reader, fields.second)?.to_string();
    let parent = state.inode(fields.handle)?;
    let instance_handle = parent.instance_handle;
    let parent_ino = parent.native_ino;
    let mounted = state.mounted(instance_handle)?;
    let native = mounted.with_instance(|instance| instance.symlink(parent_ino, &name, &target))?;
    let inode_handle = state.insert_inode(InodeEntry { instance_handle, native_ino: native.native });
    Ok(attrs_reply(inode_handle, to_wire_attrs(native.attrs)))
}

fn put(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let entry = state.remove_inode(fields.handle)?;
    let mounted = match state.mounted(entry.instance_handle) {
        Ok(mounted) => mounted,
        Err(error) => {
            state.restore_inode(fields.handle, entry)?;
            return Err(error);
        }
    };
    match mounted.with_instance(|instance| instance.put(entry.native_ino)) {
        Ok(()) => Ok(ok_empty()),
        Err(error) => {
            state.restore_inode(fields.handle, entry)?;
            Err(error)
        }
    }
}

fn create_file(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = CreateFileRequest::decode(&request.fixed)?;
    let reader = PayloadReader::new(&request.payload);
    let name = read_str(&reader, fields.name_offset)?.to_string();
    let parent = state.inode(fields.handle)?;
    let instance_handle = parent.instance_handle;
    let parent_ino = parent.native_ino;
    let mounted = state.mounted(instance_handle)?;
    let (native_inode, native_file) =
        mounted.with_instance(|instance| instance.create_file(parent_ino, &name, fields.mode, fields.flags))?;
    let inode_handle = state.insert_inode(InodeEntry { instance_handle, native_ino: native_inode.native });
    let file_handle = state.insert_file(FileEntry { instance_handle, native_fh: native_file.native });
    let mut fixed = encode_u64(inode_handle);
    fixed.extend_from_slice(&encode_u64(file_handle));
    fixed.extend_from_slice(&to_wire_attrs(native_inode.attrs).to_bytes());
    Ok(ok(fixed, Vec::new()))
}

fn open(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleAndFlags::decode(&request.fixed)?;
    let entry = state.inode(fields.handle)?;
    let instance_handle = entry.instance_handle;
    let mounted = state.mounted(instance_handle)?;
    let native_file = mounted.with_instance(|instance| instance.open(entry.native_ino, fields.flags))?;
    let file_handle = state.insert_file(FileEntry { instance_handle, native_fh: native_file.native });
    Ok(ok(encode_u64(file_handle), Vec::new()))
}

fn read(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = ReadRequest::decode(&request.fixed)?;
    let entry = state.file(fields.handle)?;
    let mounted = state.mounted(entry.instance_handle)?;
    let native_file = NativeFile { native: entry.native_fh };
    let data = mounted.with_instance(|instance| instance.read(native_file, fields.offset, fields.len))?;
    let mut writer = PayloadWriter::new();
    writer.push_bytes(&data);
    Ok(ok(encode_u64(data.len() as u64), writer.into_bytes()))
}

fn write(state: &ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = WriteRequest::decode(&request.fixed)?;
    let entry = state.file(fields.handle)?;
    let mounted = state.mounted(entry.instance_handle)?;
    let data = request
        .payload
        .get(fields.data_offset as usize..fields.data_offset as usize + fields.data_len as usize)
        .ok_or(CephfsError::Truncated)?;
    let native_file = NativeFile { native: entry.native_fh };
    let written = mounted.with_instance(|instance| instance.write(native_file, fields.offset, data))?;
    Ok(ok(encode_u64(written), Vec::new()))
}

fn close(state: &mut ConnectionState, request: &RequestFrame) -> Result<ReplyFrame, CephfsError> {
    let fields = HandleOnly::decode(&request.fixed)?;
    let entry = state.remove_file(fields.handle)?;
    let mounted = match state.mounted(entry.instance_handle) {
        Ok(mounted) => mounted,
        Err(error) => {
            state.restore_file(fields.handle, entry)?;
            return Err(error);
        }
    };
    let native_file = NativeFile { native: entry.native_fh };
    match mounted.with_instance(|instance| instance.close(native_file)) {
        Ok(()) => Ok(ok_empty()),
        Err(error) => {
            state.restore_file(fields.handle, entry)?;
            Err(error)
        }
    }
}

fn to_wire_attrs(native: pool::NativeAttrs) -> WireAttrs {
    WireAttrs {
        ino: native.ino,
        mode: native.mode,
        nlink: native.nlink,
        uid: native.uid,
        gid: native.gid,
        rdev: native.rdev,
        size: native.size,
        blocks: native.blocks,
        blksize: native.blksize,
        atime: native.atime,
        mtime: native.mtime,
        ctime: native.ctime,
    }
}
