//! Mount options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Options fixed at mount time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountOptions {
    /// Owner reported for every file in the filesystem.
    pub uid: u32,

    /// Group reported for every file in the filesystem.
    pub gid: u32,

    /// Whether to pass `-o allow_other` to the FUSE transport.
    #[serde(default)]
    pub allow_other: bool,

    /// Verbose per-operation logging.
    #[serde(default)]
    pub debug: bool,

    /// Attribute cache timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub attr_timeout: u64,

    /// Entry (lookup) cache timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub entry_timeout: u64,

    /// Filesystem name shown in the mount table.
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
}

fn default_timeout_secs() -> u64 {
    1
}

fn default_fs_name() -> String {
    "mchfuse".into()
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            uid: 0,
            gid: 0,
            allow_other: false,
            debug: false,
            attr_timeout: default_timeout_secs(),
            entry_timeout: default_timeout_secs(),
            fs_name: default_fs_name(),
        }
    }
}

impl MountOptions {
    pub fn attr_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.attr_timeout)
    }

    pub fn entry_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.entry_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = MountOptions::default();
        assert_eq!(opts.uid, 0);
        assert_eq!(opts.gid, 0);
        assert!(!opts.allow_other);
        assert_eq!(opts.attr_timeout_duration(), Duration::from_secs(1));
        assert_eq!(opts.entry_timeout_duration(), Duration::from_secs(1));
        assert_eq!(opts.fs_name, "mchfuse");
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: MountOptions =
            serde_json::from_str(r#"{"uid": 1000, "gid": 1000, "allow_other": true}"#).unwrap();
        assert_eq!(opts.uid, 1000);
        assert!(opts.allow_other);
        assert_eq!(opts.attr_timeout, 1);
        assert_eq!(opts.fs_name, "mchfuse");
    }
}
