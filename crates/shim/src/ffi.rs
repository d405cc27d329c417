//! C ABI surface, re-exporting the same entry points the native client
//! library itself exposes (`ceph_create`, `ceph_mount`, `ceph_mkdir`, …)
//! so a consumer linking against `libcephfs_shim.so` needs no source
//! changes beyond its link line. Every function here is a thin
//! marshalling layer over [`crate::session`]; no logic lives here.
//!
//! Handles are opaque boxed pointers, exactly like the native client's
//! own `struct ceph_mount_info *`; the bytes behind the pointer are a
//! private enum this crate never exposes a field of.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use wire::CephfsError;

use crate::session::{MountSession, Session};
use crate::transport::Transport;

/// Matches the daemon's own default, overridable for a consumer process
/// that runs its own private `cephfsd` instance.
const DEFAULT_SOCKET: &str = "/run/cephfsd/cephfsd.sock";
const SOCKET_ENV_VAR: &str = "CEPHFSD_SOCKET";

enum State {
    Configuring(Session),
    Mounted(MountSession),
    /// Left behind after a failed `mount`, which destroys the instance
    /// on the daemon side; every further call reports `ENOTCONN`.
    Gone,
}

/// Opaque handle type mirroring `struct ceph_mount_info`.
pub struct CephMountInfo {
    state: State,
}

#[repr(C)]
pub struct CephStatx {
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

impl From<cache::Attrs> for CephStatx {
    fn from(attrs: cache::Attrs) -> Self {
        Self {
            ino: attrs.ino,
            mode: attrs.mode,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: attrs.rdev,
            size: attrs.size,
            blocks: attrs.blocks,
            blksize: attrs.blksize,
            atime: attrs.atime,
            mtime: attrs.mtime,
            ctime: attrs.ctime,
        }
    }
}

#[repr(C)]
pub struct CephStatvfs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub files: u64,
    pub files_free: u64,
}

impl From<wire::WireStatfs> for CephStatvfs {
    fn from(statfs: wire::WireStatfs) -> Self {
        Self {
            block_size: statfs.block_size,
            blocks: statfs.blocks,
            blocks_free: statfs.blocks_free,
            files: statfs.files,
            files_free: statfs.files_free,
        }
    }
}

fn errno_of(error: &CephfsError) -> c_int {
    -error.errno()
}

unsafe fn str_arg<'a>(ptr: *const c_char) -> Result<&'a str, c_int> {
    if ptr.is_null() {
        return Err(-wire::error::errno::EFAULT);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| -wire::error::errno::EFAULT)
}

fn transport_from_env() -> Arc<Transport> {
    let socket = std::env::var_os(SOCKET_ENV_VAR).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
    crate::connect(socket)
}

/// # Safety
/// `out` must be a valid, writable `*mut *mut CephMountInfo`; `id` must
/// be a valid NUL-terminated C string or null.
#[no_mangle]
pub unsafe extern "C" fn ceph_create(out: *mut *mut CephMountInfo, id: *const c_char) -> c_int {
    if out.is_null() {
        return -wire::error::errno::EFAULT;
    }
    let id = if id.is_null() { "" } else { match str_arg(id) { Ok(value) => value, Err(code) => return code } };
    match Session::create(transport_from_env(), id) {
        Ok(session) => {
            let boxed = Box::new(CephMountInfo { state: State::Configuring(session) });
            *out = Box::into_raw(boxed);
            0
        }
        Err(error) => errno_of(&error),
    }
}

fn with_configuring(cmount: *mut CephMountInfo, f: impl FnOnce(&Session) -> Result<(), CephfsError>) -> c_int {
    let Some(handle) = (unsafe { cmount.as_mut() }) else { return -wire::error::errno::EFAULT };
    match &handle.state {
        State::Configuring(session) => f(session).map_or_else(|error| errno_of(&error), |()| 0),
        State::Mounted(_) => -wire::error::errno::EISCONN,
        State::Gone => -wire::error::errno::ENOTCONN,
    }
}

/// # Safety
/// `cmount` must be a live handle from [`ceph_create`]; `path` a valid
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ceph_conf_read_file(cmount: *mut CephMountInfo, path: *const c_char) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_configuring(cmount, |session| session.conf_read_file(path))
}

/// # Safety
/// Same as [`ceph_conf_read_file`]; `buf` must point at `len` writable
/// bytes, `option` at a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ceph_conf_get(
    cmount: *mut CephMountInfo,
    option: *const c_char,
    buf: *mut c_char,
    len: usize,
) -> c_int {
    let Some(handle) = cmount.as_mut() else { return -wire::error::errno::EFAULT };
    let option = match str_arg(option) {
        Ok(value) => value,
        Err(code) => return code,
    };
    let value = match &handle.state {
        State::Configuring(session) => session.conf_get(option),
        State::Mounted(_) => return -wire::error::errno::EISCONN,
        State::Gone => return -wire::error::errno::ENOTCONN,
    };
    match value {
        Ok(value) => match CString::new(value) {
            Ok(c_value) => {
                let bytes = c_value.as_bytes_with_nul();
                if bytes.len() > len || buf.is_null() {
                    return -wire::error::errno::ENOBUFS;
                }
                ptr::copy_nonoverlapping(bytes.as_ptr().cast(), buf, bytes.len());
                0
            }
            Err(_) => -wire::error::errno::EFAULT,
        },
        Err(error) => errno_of(&error),
    }
}

/// # Safety
/// Same as [`ceph_conf_read_file`], with two string arguments.
#[no_mangle]
pub unsafe extern "C" fn ceph_conf_set(cmount: *mut CephMountInfo, option: *const c_char, value: *const c_char) -> c_int {
    let option = match str_arg(option) {
        Ok(value) => value,
        Err(code) => return code,
    };
    let value = match str_arg(value) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_configuring(cmount, |session| session.conf_set(option, value))
}

/// # Safety
/// Same as [`ceph_conf_read_file`].
#[no_mangle]
pub unsafe extern "C" fn ceph_select_filesystem(cmount: *mut CephMountInfo, fs_name: *const c_char) -> c_int {
    let fs_name = match str_arg(fs_name) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_configuring(cmount, |session| session.select_filesystem(fs_name))
}

/// # Safety
/// `cmount` must be a live handle from [`ceph_create`].
#[no_mangle]
pub unsafe extern "C" fn ceph_init(cmount: *mut CephMountInfo) -> c_int {
    with_configuring(cmount, Session::init)
}

/// # Safety
/// `cmount` must be a live handle from [`ceph_create`]; on success it
/// transitions in place to the mounted state, on failure it is left
/// unusable (matching the daemon destroying the instance).
#[no_mangle]
pub unsafe extern "C" fn ceph_mount(cmount: *mut CephMountInfo, root: *const c_char) -> c_int {
    let Some(handle) = cmount.as_mut() else { return -wire::error::errno::EFAULT };
    let root = match str_arg(root) {
        Ok(value) => value,
        Err(code) => return code,
    };
    let State::Configuring(_) = &handle.state else {
        return match handle.state {
            State::Mounted(_) => -wire::error::errno::EISCONN,
            _ => -wire::error::errno::ENOTCONN,
        };
    };
    let State::Configuring(session) = std::mem::replace(&mut handle.state, State::Gone) else {
        unreachable!("just matched Configuring above")
    };
    match session.mount(root) {
        Ok(mounted) => {
            handle.state = State::Mounted(mounted);
            0
        }
        Err(error) => errno_of(&error),
    }
}

/// # Safety
/// `cmount` must be a live handle from [`ceph_create`].
#[no_mangle]
pub unsafe extern "C" fn ceph_unmount(cmount: *mut CephMountInfo) -> c_int {
    let Some(handle) = cmount.as_mut() else { return -wire::error::errno::EFAULT };
    let State::Mounted(_) = &handle.state else { return -wire::error::errno::ENOTCONN };
    let State::Mounted(mounted) = std::mem::replace(&mut handle.state, State::Gone) else {
        unreachable!("just matched Mounted above")
    };
    mounted.unmount().map_or_else(|error| errno_of(&error), |()| 0)
}

/// Frees `cmount`, releasing the configuration-phase instance if it was
/// never mounted. Mirrors the native client's `ceph_release`.
///
/// # Safety
/// `cmount` must be a pointer previously returned by [`ceph_create`],
/// not yet released, and not used again afterwards.
#[no_mangle]
pub unsafe extern "C" fn ceph_release(cmount: *mut CephMountInfo) -> c_int {
    if cmount.is_null() {
        return -wire::error::errno::EFAULT;
    }
    let boxed = Box::from_raw(cmount);
    match boxed.state {
        State::Configuring(session) => session.release().map_or_else(|error| errno_of(&error), |()| 0),
        State::Mounted(_) | State::Gone => -wire::error::errno::EISCONN,
    }
}

fn with_mounted<T>(cmount: *mut CephMountInfo, f: impl FnOnce(&MountSession) -> Result<T, CephfsError>) -> Result<T, c_int> {
    let Some(handle) = (unsafe { cmount.as_mut() }) else { return Err(-wire::error::errno::EFAULT) };
    match &handle.state {
        State::Mounted(mounted) => f(mounted).map_err(|error| errno_of(&error)),
        State::Configuring(_) | State::Gone => Err(-wire::error::errno::ENOTCONN),
    }
}

/// # Safety
/// `cmount` must be a mounted handle; `stbuf` a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn ceph_statfs(cmount: *mut CephMountInfo, stbuf: *mut CephStatvfs) -> c_int {
    if stbuf.is_null() {
        return -wire::error::errno::EFAULT;
    }
    match with_mounted(cmount, MountSession::statfs) {
        Ok(statfs) => {
            ptr::write(stbuf, statfs.into());
            0
        }
        Err(code) => code,
    }
}

/// # Safety
/// `cmount` must be a mounted handle; `path` a valid NUL-terminated
/// string; `stx` a valid writable pointer.
#[no_mangle]
pub unsafe extern "C" fn ceph_statx(cmount: *mut CephMountInfo, path: *const c_char, stx: *mut CephStatx, force_revalidate: c_int) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    if stx.is_null() {
        return -wire::error::errno::EFAULT;
    }
    match with_mounted(cmount, |mounted| mounted.getattr(path, force_revalidate != 0)) {
        Ok(attrs) => {
            ptr::write(stx, attrs.into());
            0
        }
        Err(code) => code,
    }
}

/// # Safety
/// `cmount` must be a mounted handle; `path` valid NUL-terminated;
/// `buf` must point at `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn ceph_readlink(cmount: *mut CephMountInfo, path: *const c_char, buf: *mut c_char, len: usize) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    match with_mounted(cmount, |mounted| mounted.readlink(path)) {
        Ok(target) => {
            let bytes = target.as_bytes();
            if bytes.len() >= len || buf.is_null() {
                return -wire::error::errno::ENOBUFS;
            }
            ptr::copy_nonoverlapping(bytes.as_ptr().cast(), buf, bytes.len());
            *buf.add(bytes.len()) = 0;
            bytes.len() as c_int
        }
        Err(code) => code,
    }
}

/// # Safety
/// `cmount` must be a mounted handle; `path` a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ceph_mkdir(cmount: *mut CephMountInfo, path: *const c_char, mode: u32) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_mounted(cmount, |mounted| mounted.mkdir(path, mode)).map_or_else(|code| code, |()| 0)
}

/// # Safety
/// Same as [`ceph_mkdir`].
#[no_mangle]
pub unsafe extern "C" fn ceph_unlink(cmount: *mut CephMountInfo, path: *const c_char) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_mounted(cmount, |mounted| mounted.unlink(path)).map_or_else(|code| code, |()| 0)
}

/// # Safety
/// Same as [`ceph_mkdir`].
#[no_mangle]
pub unsafe extern "C" fn ceph_rmdir(cmount: *mut CephMountInfo, path: *const c_char) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_mounted(cmount, |mounted| mounted.rmdir(path)).map_or_else(|code| code, |()| 0)
}

/// # Safety
/// `cmount` must be a mounted handle; both string arguments must be
/// valid NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn ceph_symlink(cmount: *mut CephMountInfo, target: *const c_char, linkpath: *const c_char) -> c_int {
    let target = match str_arg(target) {
        Ok(value) => value,
        Err(code) => return code,
    };
    let linkpath = match str_arg(linkpath) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_mounted(cmount, |mounted| mounted.symlink(target, linkpath)).map_or_else(|code| code, |()| 0)
}

/// # Safety
/// `cmount` must be a mounted handle; `path` a valid NUL-terminated
/// string. Returns a non-negative file descriptor on success, or a
/// negative errno.
#[no_mangle]
pub unsafe extern "C" fn ceph_open(cmount: *mut CephMountInfo, path: *const c_char, flags: c_int, mode: u32) -> c_int {
    let path = match str_arg(path) {
        Ok(value) => value,
        Err(code) => return code,
    };
    with_mounted(cmount, |mounted| mounted.open(path, flags, mode)).map_or_else(|code| code, |fd| fd)
}

/// # Safety
/// `cmount` must be a mounted handle; `fd` a descriptor returned by
/// [`ceph_open`] on this same handle and not yet closed.
#[no_mangle]
pub unsafe extern "C" fn ceph_close(cmount: *mut CephMountInfo, fd: c_int) -> c_int {
    with_mounted(cmount, |mounted| mounted.close(fd)).map_or_else(|code| code, |()| 0)
}

/// # Safety
/// `cmount` must be a mounted handle; `fd` an open descriptor; `buf`
/// must point at `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn ceph_read(cmount: *mut CephMountInfo, fd: c_int, buf: *mut c_char, len: usize, offset: i64) -> c_int {
    if buf.is_null() {
        return -wire::error::errno::EFAULT;
    }
    match with_mounted(cmount, |mounted| mounted.read(fd, offset, len as u64)) {
        Ok(data) => {
            ptr::copy_nonoverlapping(data.as_ptr().cast(), buf, data.len());
            data.len() as c_int
        }
        Err(code) => code,
    }
}

/// # Safety
/// `cmount` must be a mounted handle; `fd` an open descriptor; `buf`
/// must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ceph_write(cmount: *mut CephMountInfo, fd: c_int, buf: *const c_char, len: usize, offset: i64) -> c_int {
    if buf.is_null() {
        return -wire::error::errno::EFAULT;
    }
    let data = std::slice::from_raw_parts(buf.cast::<u8>(), len);
    match with_mounted(cmount, |mounted| mounted.write(fd, offset, data)) {
        Ok(written) => written as c_int,
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_null_cmount_is_rejected_with_efault() {
        assert_eq!(unsafe { ceph_init(ptr::null_mut()) }, -wire::error::errno::EFAULT);
    }

    #[test]
    fn a_null_id_is_treated_as_empty_rather_than_dereferenced() {
        let mut out: *mut CephMountInfo = ptr::null_mut();
        // No daemon is listening on the default socket in this test
        // environment, so the call fails, but it must fail via the
        // transport, not by dereferencing a null `id`.
        let result = unsafe { ceph_create(&mut out, ptr::null()) };
        assert_ne!(result, 0);
    }
}
