//! [`NativeClient`] backed by the real `libcephfs` C library, linked at
//! build time via `#[link(name = "cephfs")]`.
//!
//! Bindings are hand-written rather than generated: this crate only
//! calls a small, stable slice of the low-level (`ceph_ll_*`) API, and a
//! generated binding would pull in far more surface than this proxy
//! ever touches. Opaque C types (`ceph_mount_info`, `Inode`, `UserPerm`)
//! are modelled as zero-variant enums per the usual FFI idiom, so this
//! module never assumes a layout for memory it doesn't own.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::Path;
use std::ptr;

use libc::{mode_t, stat, statvfs};

use pool::{NativeAttrs, NativeClient, NativeClientFactory, NativeFile, NativeInode, NativeStatfs};
use wire::CephfsError;

enum CephMountInfo {}
enum Inode {}
enum UserPerm {}
enum Fh {}

#[link(name = "cephfs")]
extern "C" {
    fn ceph_create(cmount: *mut *mut CephMountInfo, id: *const c_char) -> c_int;
    fn ceph_release(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_conf_read_file(cmount: *mut CephMountInfo, path: *const c_char) -> c_int;
    fn ceph_conf_get(cmount: *mut CephMountInfo, option: *const c_char, buf: *mut c_char, len: usize) -> c_int;
    fn ceph_conf_set(cmount: *mut CephMountInfo, option: *const c_char, value: *const c_char) -> c_int;
    fn ceph_select_filesystem(cmount: *mut CephMountInfo, fs_name: *const c_char) -> c_int;
    fn ceph_init(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_mount(cmount: *mut CephMountInfo, root: *const c_char) -> c_int;
    fn ceph_unmount(cmount: *mut CephMountInfo) -> c_int;
    fn ceph_mount_perms(cmount: *mut CephMountInfo) -> *mut UserPerm;
    fn ceph_statfs(cmount: *mut CephMountInfo, path: *const c_char, stbuf: *mut statvfs) -> c_int;
    fn ceph_ll_lookup_root(cmount: *mut CephMountInfo, out: *mut *mut Inode) -> c_int;
    fn ceph_ll_lookup(
        cmount: *mut CephMountInfo,
        parent: *mut Inode,
        name: *const c_char,
        out: *mut *mut Inode,
        attr: *mut stat,
        uid: c_int,
        gid: c_int,
    ) -> c_int;
    fn ceph_ll_getattr(cmount: *mut CephMountInfo, inode: *mut Inode, attr: *mut stat, perms: *mut UserPerm) -> c_int;
    fn ceph_ll_readlink(cmount: *mut CephMountInfo, inode: *mut Inode, buf: *mut c_char, bufsiz: usize, perms: *mut UserPerm) -> c_int;
    fn ceph_ll_mkdir(
        cmount: *mut CephMountInfo,
        parent: *mut Inode,
        name: *const c_char,
        mode: mode_t,
        out: *mut *mut Inode,
        attr: *mut stat,
        uid: c_int,
        gid: c_int,
    ) -> c_int;
    fn ceph_ll_unlink(cmount: *mut CephMountInfo, parent: *mut Inode, name: *const c_char, perms: *mut UserPerm) -> c_int;
    fn ceph_ll_rmdir(cmount: *mut CephMountInfo, parent: *mut Inode, name: *const c_char, perms: *mut UserPerm) -> c_int;
    fn ceph_ll_symlink(
        cmount: *mut CephMountInfo,
        parent: *mut Inode,
        name: *const c_char,
        value: *const c_char,
        out: *mut *mut Inode,
        attr: *mut stat,
        uid: c_int,
        gid: c_int,
    ) -> c_int;
    fn ceph_ll_put(cmount: *mut CephMountInfo, inode: *mut Inode) -> c_int;
    fn ceph_ll_create(
        cmount: *mut CephMountInfo,
        parent: *mut Inode,
        name: *const c_char,
        mode: mode_t,
        flags: c_int,
        out: *mut *mut Inode,
        fhp: *mut *mut Fh,
        attr: *mut stat,
        uid: c_int,
        gid: c_int,
    ) -> c_int;
    fn ceph_ll_open(cmount: *mut CephMountInfo, inode: *mut Inode, flags: c_int, fhp: *mut *mut Fh, perms: *mut UserPerm) -> c_int;
    fn ceph_ll_read(cmount: *mut CephMountInfo, fh: *mut Fh, off: i64, len: u64, buf: *mut c_char) -> c_int;
    fn ceph_ll_write(cmount: *mut CephMountInfo, fh: *mut Fh, off: i64, len: u64, data: *const c_char) -> c_int;
    fn ceph_ll_close(cmount: *mut CephMountInfo, fh: *mut Fh) -> c_int;
}

fn cstring(value: &str) -> Result<CString, CephfsError> {
    CString::new(value).map_err(|_| CephfsError::InvalidHandle("argument contains an interior NUL"))
}

fn check(result: c_int) -> Result<(), CephfsError> {
    if result < 0 {
        return Err(CephfsError::Native(-result));
    }
    Ok(())
}

fn stat_to_attrs(raw: &stat) -> NativeAttrs {
    NativeAttrs {
        ino: raw.st_ino,
        mode: raw.st_mode,
        nlink: raw.st_nlink as u32,
        uid: raw.st_uid,
        gid: raw.st_gid,
        rdev: raw.st_rdev,
        size: raw.st_size as u64,
        blocks: raw.st_blocks as u64,
        blksize: raw.st_blksize as u32,
        atime: raw.st_atime,
        mtime: raw.st_mtime,
        ctime: raw.st_ctime,
    }
}

/// Wraps one `ceph_mount_info*`. The C library keeps its own internal
/// locking, so this type only needs to be `Send`; the `pool` crate
/// serializes access with a `Mutex<Instance>` regardless.
pub struct CephClient {
    cmount: *mut CephMountInfo,
    perms: std::sync::Mutex<*mut UserPerm>,
}

// SAFETY: `ceph_mount_info` and the `ceph_*`/`ceph_ll_*` entry points are
// documented by libcephfs as safe to call from any thread, one call at a
// time, which the `pool` crate's instance mutex already guarantees.
unsafe impl Send for CephClient {}
unsafe impl Sync for CephClient {}

impl CephClient {
    pub fn create(id: &str) -> Result<Self, CephfsError> {
        let id = cstring(id)?;
        let mut cmount = ptr::null_mut();
        // SAFETY: `cmount` is a valid out-pointer for a freshly declared
        // local; `id` stays alive for the duration of the call.
        check(unsafe { ceph_create(&mut cmount, id.as_ptr()) })?;
        Ok(Self { cmount, perms: std::sync::Mutex::new(ptr::null_mut()) })
    }

    fn perms(&self) -> *mut UserPerm {
        *self.perms.lock().expect("userperm cache mutex poisoned")
    }
}

impl Drop for CephClient {
    fn drop(&mut self) {
        if !self.cmount.is_null() {
            // SAFETY: `ceph_release` is valid to call on a mount handle
            // in any state (configuring, mounted, or unmounted), exactly
            // once, which this `Drop` impl guarantees.
            unsafe {
                ceph_release(self.cmount);
            }
        }
    }
}

impl NativeClient for CephClient {
    fn conf_read_file(&self, path: &Path) -> Result<(), CephfsError> {
        let path = cstring(&path.to_string_lossy())?;
        check(unsafe { ceph_conf_read_file(self.cmount, path.as_ptr()) })
    }

    fn conf_get(&self, name: &str) -> Result<String, CephfsError> {
        let name = cstring(name)?;
        let mut buf = vec![0u8; 4096];
        check(unsafe { ceph_conf_get(self.cmount, name.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) })?;
        let value = unsafe { CStr::from_ptr(buf.as_ptr().cast()) };
        Ok(value.to_string_lossy().into_owned())
    }

    fn conf_set(&self, name: &str, value: &str) -> Result<(), CephfsError> {
        let name = cstring(name)?;
        let value = cstring(value)?;
        check(unsafe { ceph_conf_set(self.cmount, name.as_ptr(), value.as_ptr()) })
    }

    fn select_filesystem(&self, name: &str) -> Result<(), CephfsError> {
        let name = cstring(name)?;
        check(unsafe { ceph_select_filesystem(self.cmount, name.as_ptr()) })
    }

    fn init(&self) -> Result<(), CephfsError> {
        check(unsafe { ceph_init(self.cmount) })
    }

    fn mount(&self, root: &str) -> Result<(), CephfsError> {
        let root = cstring(root)?;
        check(unsafe { ceph_mount(self.cmount, root.as_ptr()) })?;
        let perms = unsafe { ceph_mount_perms(self.cmount) };
        *self.perms.lock().expect("userperm cache mutex poisoned") = perms;
        Ok(())
    }

    fn unmount(&self) -> Result<(), CephfsError> {
        check(unsafe { ceph_unmount(self.cmount) })
    }

    fn statfs(&self) -> Result<NativeStatfs, CephfsError> {
        let mut raw: statvfs = unsafe { std::mem::zeroed() };
        let root = cstring("/")?;
        check(unsafe { ceph_statfs(self.cmount, root.as_ptr(), &mut raw) })?;
        Ok(NativeStatfs {
            block_size: raw.f_bsize as u64,
            blocks: raw.f_blocks as u64,
            blocks_free: raw.f_bfree as u64,
            files: raw.f_files as u64,
            files_free: raw.f_ffree as u64,
        })
    }

    fn root_inode(&self) -> Result<NativeInode, CephfsError> {
        let mut out: *mut Inode = ptr::null_mut();
        check(unsafe { ceph_ll_lookup_root(self.cmount, &mut out) })?;
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe { ceph_ll_getattr(self.cmount, out, &mut attr, self.perms()) })?;
        Ok(NativeInode { native: out as u64, attrs: stat_to_attrs(&attr) })
    }

    fn lookup(&self, parent: u64, name: &str) -> Result<NativeInode, CephfsError> {
        let name = cstring(name)?;
        let mut out: *mut Inode = ptr::null_mut();
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe { ceph_ll_lookup(self.cmount, parent as *mut Inode, name.as_ptr(), &mut out, &mut attr, 0, 0) })?;
        Ok(NativeInode { native: out as u64, attrs: stat_to_attrs(&attr) })
    }

    fn getattr(&self, ino: u64) -> Result<NativeAttrs, CephfsError> {
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe { ceph_ll_getattr(self.cmount, ino as *mut Inode, &mut attr, self.perms()) })?;
        Ok(stat_to_attrs(&attr))
    }

    fn readlink(&self, ino: u64) -> Result<String, CephfsError> {
        let mut buf = vec![0u8; 4096];
        let written = unsafe { ceph_ll_readlink(self.cmount, ino as *mut Inode, buf.as_mut_ptr().cast(), buf.len(), self.perms()) };
        check(written)?;
        buf.truncate(written as usize);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<NativeInode, CephfsError> {
        let name = cstring(name)?;
        let mut out: *mut Inode = ptr::null_mut();
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe { ceph_ll_mkdir(self.cmount, parent as *mut Inode, name.as_ptr(), mode as mode_t, &mut out, &mut attr, 0, 0) })?;
        Ok(NativeInode { native: out as u64, attrs: stat_to_attrs(&attr) })
    }

    fn unlink(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        let name = cstring(name)?;
        check(unsafe { ceph_ll_unlink(self.cmount, parent as *mut Inode, name.as_ptr(), self.perms()) })
    }

    fn rmdir(&self, parent: u64, name: &str) -> Result<(), CephfsError> {
        let name = cstring(name)?;
        check(unsafe { ceph_ll_rmdir(self.cmount, parent as *mut Inode, name.as_ptr(), self.perms()) })
    }

    fn symlink(&self, parent: u64, name: &str, target: &str) -> Result<NativeInode, CephfsError> {
        let name = cstring(name)?;
        let target = cstring(target)?;
        let mut out: *mut Inode = ptr::null_mut();
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe {
            ceph_ll_symlink(self.cmount, parent as *mut Inode, name.as_ptr(), target.as_ptr(), &mut out, &mut attr, 0, 0)
        })?;
        Ok(NativeInode { native: out as u64, attrs: stat_to_attrs(&attr) })
    }

    fn put(&self, ino: u64) -> Result<(), CephfsError> {
        check(unsafe { ceph_ll_put(self.cmount, ino as *mut Inode) })
    }

    fn create_file(&self, parent: u64, name: &str, mode: u32, flags: u32) -> Result<(NativeInode, NativeFile), CephfsError> {
        let name = cstring(name)?;
        let mut out: *mut Inode = ptr::null_mut();
        let mut fh: *mut Fh = ptr::null_mut();
        let mut attr: stat = unsafe { std::mem::zeroed() };
        check(unsafe {
            ceph_ll_create(
                self.cmount,
                parent as *mut Inode,
                name.as_ptr(),
                mode as mode_t,
                flags as c_int,
                &mut out,
                &mut fh,
                &mut attr,
                0,
                0,
            )
        })?;
        Ok((NativeInode { native: out as u64, attrs: stat_to_attrs(&attr) }, NativeFile { native: fh as u64 }))
    }

    fn open(&self, ino: u64, flags: u32) -> Result<NativeFile, CephfsError> {
        let mut fh: *mut Fh = ptr::null_mut();
        check(unsafe { ceph_ll_open(self.cmount, ino as *mut Inode, flags as c_int, &mut fh, self.perms()) })?;
        Ok(NativeFile { native: fh as u64 })
    }

    fn read(&self, file: NativeFile, offset: i64, len: u64) -> Result<Vec<u8>, CephfsError> {
        let mut buf = vec![0u8; len as usize];
        let read = unsafe { ceph_ll_read(self.cmount, file.native as *mut Fh, offset, len, buf.as_mut_ptr().cast()) };
        if read < 0 {
            return Err(CephfsError::Native(-read));
        }
        buf.truncate(read as usize);
        Ok(buf)
    }

    fn write(&self, file: NativeFile, offset: i64, data: &[u8]) -> Result<u64, CephfsError> {
        let written = unsafe { ceph_ll_write(self.cmount, file.native as *mut Fh, offset, data.len() as u64, data.as_ptr().cast()) };
        if written < 0 {
            return Err(CephfsError::Native(-written));
        }
        Ok(written as u64)
    }

    fn close(&self, file: NativeFile) -> Result<(), CephfsError> {
        check(unsafe { ceph_ll_close(self.cmount, file.native as *mut Fh) })
    }
}

pub struct CephClientFactory;

impl NativeClientFactory for CephClientFactory {
    fn create(&self, id: &str) -> Result<Box<dyn NativeClient>, CephfsError> {
        Ok(Box::new(CephClient::create(id)?))
    }
}

