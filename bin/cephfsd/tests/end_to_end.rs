//! Exercises the daemon and shim together over a real Unix stream
//! socket: a background thread runs `daemon::connection::handle`
//! against one accepted connection while the test drives it through
//! `shim::Transport`/`shim::wire_calls`, the same way a consumer
//! process would.

use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use pool::{CredentialTable, Pool};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shim::wire_calls;
use test_support::FakeNativeClientFactory;
use wire::{decode_greeting, CephfsError, GreetingMode, Opcode, ProtocolVersion};

fn spawn_daemon() -> (PathBuf, PathBuf) {
    let socket_dir = tempfile::tempdir().expect("tempdir").keep();
    let socket = socket_dir.join("cephfsd.sock");
    let snapshot_dir = socket_dir.join("snapshots");
    std::fs::create_dir_all(&snapshot_dir).expect("create snapshot dir");

    let listener = link::bind(&socket).expect("bind");
    let pool = Arc::new(Pool::new(Box::new(FakeNativeClientFactory)));
    let credentials = Arc::new(CredentialTable::new(handle::Scrambler::new(&mut StdRng::from_entropy())));
    let accept_snapshot_dir = snapshot_dir.clone();

    thread::spawn(move || loop {
        let Ok((stream, _)) = listener.accept() else { return };
        let pool = pool.clone();
        let credentials = credentials.clone();
        let snapshot_dir = accept_snapshot_dir.clone();
        thread::spawn(move || {
            daemon::connection::handle(stream, pool, credentials, snapshot_dir, &());
        });
    });

    (socket, snapshot_dir)
}

/// Three sessions with byte-identical configuration histories (same id,
/// same `conf_set` call) each mount successfully and resolve the same
/// root; unmounting all three in turn, including the one that would be
/// holding the pool's last reference, must not error.
#[test]
fn shared_instance_with_identical_config_mounts_once() {
    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let handle = wire_calls::create(&transport, "client.shared").expect("create");
        wire_calls::conf_set(&transport, handle, "client_acl_type", "posix_acl").expect("conf_set");
        wire_calls::mount(&transport, handle, "/").expect("mount");
        handles.push(handle);
    }

    for &handle in &handles {
        let (_root_handle, attrs) = wire_calls::lookup_root(&transport, handle).expect("lookup_root");
        assert_eq!(attrs.ino, 1);
    }

    for &handle in &handles[..2] {
        wire_calls::unmount(&transport, handle).expect("unmount");
    }
    wire_calls::unmount(&transport, handles[2]).expect("final unmount");
}

/// Two sessions whose change logs differ by one `conf_set` call mount
/// distinct native clients; operations against one cannot be observed
/// through the other.
#[test]
fn divergent_config_mounts_distinct_instances() {
    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let a = wire_calls::create(&transport, "client.a").expect("create a");
    wire_calls::mount(&transport, a, "/").expect("mount a");

    let b = wire_calls::create(&transport, "client.b").expect("create b");
    wire_calls::conf_set(&transport, b, "bdev_enable_discard", "true").expect("conf_set b");
    wire_calls::mount(&transport, b, "/").expect("mount b");

    let (root_a, _) = wire_calls::lookup_root(&transport, a).expect("lookup_root a");
    wire_calls::mkdir(&transport, root_a, "only-in-a", 0o755).expect("mkdir in a");

    let (root_b, _) = wire_calls::lookup_root(&transport, b).expect("lookup_root b");
    let result = wire_calls::lookup(&transport, root_b, "only-in-a");
    assert!(result.is_err(), "directory created under the divergent instance must not be visible to this one");

    wire_calls::unmount(&transport, a).expect("unmount a");
    wire_calls::unmount(&transport, b).expect("unmount b");
}

/// `mkdir`, `lookup`, `unlink`/`rmdir` round-trip through the shim's
/// `MountSession`.
#[test]
fn mkdir_lookup_and_removal_round_trip_through_a_mount_session() {
    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let session = shim::Session::create(transport, "client.roundtrip").expect("create session");
    let mounted = session.mount("/").expect("mount");

    mounted.mkdir("/dir.1", 0o755).expect("mkdir");
    let attrs = mounted.getattr("/dir.1", false).expect("getattr");
    assert_eq!(attrs.mode & 0o170_000, 0o040_000, "mkdir's entry must be a directory");

    mounted.rmdir("/dir.1").expect("rmdir");
    assert!(mounted.getattr("/dir.1", false).is_err(), "removed directory must no longer resolve");

    mounted.unmount().expect("unmount");
}

/// `mkdir` a directory, `create`+`write`+`read`+compare 256 bytes,
/// `unlink` the file, `rmdir` the directory, `unmount` - the full
/// create/write/read data-plane path through the shim's `MountSession`.
#[test]
fn create_write_read_and_removal_round_trip_through_a_mount_session() {
    const O_CREAT: i32 = 0o100;
    const O_RDWR: i32 = 0o2;

    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let session = shim::Session::create(transport, "client.datapath").expect("create session");
    let mounted = session.mount("/").expect("mount");

    mounted.mkdir("/data", 0o755).expect("mkdir");

    let payload: Vec<u8> = (0..256u32).map(|byte| byte as u8).collect();
    let fd = mounted.open("/data/leaf", O_CREAT | O_RDWR, 0o644).expect("create+open");
    let written = mounted.write(fd, 0, &payload).expect("write");
    assert_eq!(written, payload.len() as u64);

    let read_back = mounted.read(fd, 0, payload.len() as u64).expect("read");
    assert_eq!(read_back, payload, "read must return exactly what was written");
    mounted.close(fd).expect("close");

    let attrs = mounted.getattr("/data/leaf", true).expect("getattr");
    assert_eq!(attrs.size, payload.len() as u64);

    mounted.unlink("/data/leaf").expect("unlink");
    mounted.rmdir("/data").expect("rmdir");
    mounted.unmount().expect("unmount");
}

/// `a -> b`, `b -> a`: walking either one must terminate with `ELOOP`
/// rather than spin forever.
#[test]
fn a_symlink_cycle_is_rejected_with_eloop() {
    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let session = shim::Session::create(transport, "client.loop").expect("create session");
    let mounted = session.mount("/").expect("mount");

    mounted.symlink("/b", "/a").expect("symlink a -> b");
    mounted.symlink("/a", "/b").expect("symlink b -> a");

    let error = mounted.getattr("/a", false).expect_err("cyclic symlinks must not resolve");
    assert!(matches!(error, CephfsError::SymlinkLoop), "expected SymlinkLoop, got {error:?}");

    mounted.unmount().expect("unmount");
}

/// A peer that greets as binary but is answered with a newer major
/// version must be rejected by negotiation rather than proceed with a
/// protocol it cannot safely speak.
#[test]
fn a_newer_major_version_reply_is_rejected_as_a_protocol_mismatch() {
    let socket_dir = tempfile::tempdir().expect("tempdir").keep();
    let socket = socket_dir.join("fake.sock");
    let listener = UnixListener::bind(&socket).expect("bind fake listener");

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let fd = stream.as_raw_fd();
        let mut greeting = [0u8; 4];
        link::read_full(fd, &mut greeting, &()).expect("read greeting");
        assert_eq!(decode_greeting(greeting), Some(GreetingMode::Binary));

        let bumped = ProtocolVersion { major: wire::CURRENT.major + 1, minor: 0 };
        link::write_all(fd, &bumped.to_host_bytes(), &()).expect("write bumped version");
    });

    let transport = shim::connect(socket);
    let result = wire_calls::create(&transport, "client.mismatch");
    let error = result.expect_err("a newer major version must be rejected");
    assert_eq!(error.errno(), wire::error::errno::ENOTSUP);

    // The transport is poisoned by the failed negotiation; a second
    // call does not retry the handshake.
    let second = wire_calls::create(&transport, "client.mismatch");
    assert!(matches!(second, Err(CephfsError::NotConnected)));
}

/// Corrupting a real, previously-issued handle by a single bit must be
/// rejected with `EFAULT` and no payload, never silently tolerated or
/// misinterpreted as a different live handle.
#[test]
fn a_forged_handle_is_rejected_with_efault_and_no_payload() {
    let (socket, _snapshot_dir) = spawn_daemon();
    let transport = shim::connect(socket);

    let instance = wire_calls::create(&transport, "client.forged").expect("create");
    wire_calls::mount(&transport, instance, "/").expect("mount");
    let (real_handle, _attrs) = wire_calls::lookup_root(&transport, instance).expect("lookup_root");

    let forged = real_handle ^ 1;
    let reply = transport.call(Opcode::Getattr.as_u16(), forged.to_ne_bytes().to_vec(), Vec::new()).expect("reply arrives");

    assert_eq!(reply.result, -wire::error::errno::EFAULT);
    assert!(reply.fixed.is_empty() && reply.payload.is_empty(), "an error reply must carry no payload");
}
