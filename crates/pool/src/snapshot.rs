//! Private, content-addressed copies of configuration files.
//!
//! A config file handed to the proxy is copied into the pool's snapshot
//! directory under a name derived from its own SHA-256 hash, so that two
//! sessions pointing at byte-identical files end up pointing at the same
//! snapshot without the pool needing to compare file paths or mtimes.
//! The copy also pins the content the instance pool hashes against: a
//! caller that edits its config file after mounting cannot retroactively
//! change which instance it was sharing.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use logging::{log, Level};
use wire::CephfsError;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSnapshot {
    pub path: PathBuf,
    pub digest_hex: String,
}

/// Copies `source` into `snapshot_dir` under a `ceph-<hash>.conf` name.
/// If the file changes size between being read and the copy completing,
/// this logs a warning and proceeds anyway (the original C proxy does
/// the same: a torn read is surfaced as a diagnostic, not a hard error,
/// since the hash is computed from whatever bytes were actually read).
pub fn snapshot(source: &Path, snapshot_dir: &Path) -> Result<ConfigSnapshot, CephfsError> {
    let before = fs::metadata(source).map_err(CephfsError::Io)?;
    let contents = fs::read(source).map_err(CephfsError::Io)?;
    let after = fs::metadata(source).map_err(CephfsError::Io)?;

    if before.len() != after.len() || before.modified().ok() != after.modified().ok() {
        log!(Level::Warning, 0, "configuration file {} was modified while reading it", source.display());
    }

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let digest = hasher.finalize();
    let digest_hex = hex_lower(&digest);

    fs::create_dir_all(snapshot_dir).map_err(CephfsError::Io)?;
    let dest = snapshot_dir.join(format!("ceph-{digest_hex}.conf"));

    match publish(&dest, &contents) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            // Same digest means same content by construction; another
            // session already published this snapshot.
        }
        Err(err) => return Err(CephfsError::Io(err)),
    }

    Ok(ConfigSnapshot { path: dest, digest_hex })
}

fn publish(dest: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, contents)?;
    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(()),
        Err(err) => Err(err.error),
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn two_identical_files_produce_the_same_snapshot_name() {
        let dir = tempdir().unwrap();
        let snap_dir = dir.path().join("snapshots");
        let a = dir.path().join("a.conf");
        let b = dir.path().join("b.conf");
        fs::write(&a, b"[global]\nfsid = x\n").unwrap();
        fs::write(&b, b"[global]\nfsid = x\n").unwrap();

        let snap_a = snapshot(&a, &snap_dir).unwrap();
        let snap_b = snapshot(&b, &snap_dir).unwrap();

        assert_eq!(snap_a.path, snap_b.path);
        assert_eq!(snap_a.digest_hex, snap_b.digest_hex);
    }

    #[test]
    fn differing_content_produces_differing_snapshots() {
        let dir = tempdir().unwrap();
        let snap_dir = dir.path().join("snapshots");
        let a = dir.path().join("a.conf");
        let b = dir.path().join("b.conf");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let snap_a = snapshot(&a, &snap_dir).unwrap();
        let snap_b = snapshot(&b, &snap_dir).unwrap();

        assert_ne!(snap_a.path, snap_b.path);
    }

    #[test]
    fn the_snapshot_file_is_readable_and_matches_the_source() {
        let dir = tempdir().unwrap();
        let snap_dir = dir.path().join("snapshots");
        let source = dir.path().join("a.conf");
        fs::write(&source, b"hello").unwrap();

        let snap = snapshot(&source, &snap_dir).unwrap();
        assert_eq!(fs::read(&snap.path).unwrap(), b"hello");
    }
}
