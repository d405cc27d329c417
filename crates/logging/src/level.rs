use std::fmt;

/// Severity of a log bus record, mirroring syslog levels used by the native
/// client library so daemon and shim diagnostics stay on one numeric scale.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(i32)]
pub enum Level {
    /// Process cannot continue; paired with an immediate abort.
    Critical = 2,
    /// Operation failed.
    Error = 3,
    /// Operation succeeded but something is noteworthy.
    Warning = 4,
    /// Routine informational record (mount/unmount, instance sharing).
    Info = 6,
    /// Verbose diagnostic detail, off by default.
    Debug = 7,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_by_severity_descending_verbosity() {
        assert!(Level::Critical < Level::Error);
        assert!(Level::Error < Level::Warning);
        assert!(Level::Warning < Level::Info);
        assert!(Level::Info < Level::Debug);
    }

    #[test]
    fn labels_match_variants() {
        assert_eq!(Level::Critical.as_str(), "critical");
        assert_eq!(Level::Debug.to_string(), "debug");
    }
}
