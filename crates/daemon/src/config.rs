//! Daemon startup configuration, parsed from argv the way the teacher's
//! `server::config::ServerConfig` parses its own flag set: a plain
//! struct plus a `from_args` constructor returning a human-readable
//! error string on misuse.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cephfsd", about = "Multiplexing proxy daemon for a shared native filesystem client")]
struct Cli {
    /// Unix stream socket to listen on, replacing any stale socket file left behind.
    #[arg(long, default_value = "/run/cephfsd/cephfsd.sock")]
    socket: PathBuf,

    /// Directory content-addressed configuration snapshots are published into.
    #[arg(long, default_value = "/run/cephfsd/snapshots")]
    snapshot_dir: PathBuf,

    /// Repeatable; raises the daemon's own diagnostic trace verbosity.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DaemonConfig {
    pub socket: PathBuf,
    pub snapshot_dir: PathBuf,
    pub verbosity: u8,
}

impl DaemonConfig {
    /// Parses `args` (conventionally `std::env::args_os()`), returning a
    /// human-readable error rather than calling `process::exit` itself so
    /// the caller controls how usage errors are reported.
    pub fn from_args(args: impl IntoIterator<Item = OsString>) -> Result<Self, String> {
        let cli = Cli::try_parse_from(args).map_err(|err| err.to_string())?;
        Ok(Self {
            socket: cli.socket,
            snapshot_dir: cli.snapshot_dir,
            verbosity: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_with_no_flags() {
        let config = DaemonConfig::from_args(["cephfsd".into()]).unwrap();
        assert_eq!(config.socket, PathBuf::from("/run/cephfsd/cephfsd.sock"));
        assert_eq!(config.verbosity, 0);
    }

    #[test]
    fn socket_and_snapshot_dir_flags_are_honored() {
        let config = DaemonConfig::from_args(
            ["cephfsd".into(), "--socket".into(), "/tmp/a.sock".into(), "--snapshot-dir".into(), "/tmp/snaps".into(), "-vv".into()],
        )
        .unwrap();
        assert_eq!(config.socket, PathBuf::from("/tmp/a.sock"));
        assert_eq!(config.snapshot_dir, PathBuf::from("/tmp/snaps"));
        assert_eq!(config.verbosity, 2);
    }

    #[test]
    fn an_unknown_flag_is_a_usage_error() {
        assert!(DaemonConfig::from_args(["cephfsd".into(), "--bogus".into()]).is_err());
    }
}
