//! Configuration for network state persistence.

use std::path::PathBuf;

use anyhow::Result;
use thiserror::Error;

/// Default directory holding per-VM network state databases.
pub const DEFAULT_STATE_DIR: &str = "/var/run/vmnet/network-state";

/// File name of a VM's network state database.
const STATE_DB_FILE: &str = "netstate.db";

/// A VM id that cannot name a directory under the state dir.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid VM id {0:?}: must be a single path component")]
pub struct InvalidVmId(pub String);

/// Network setup configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one sub-directory per VM.
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let state_dir = std::env::var("VMNET_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR));

        if state_dir.as_os_str().is_empty() {
            anyhow::bail!("VMNET_STATE_DIR must not be empty");
        }

        Ok(Self { state_dir })
    }

    /// Path of the state database of a VM.
    ///
    /// The id becomes a directory name, so it must not be empty, `.` or
    /// `..`, and must not contain a path separator or NUL.
    pub fn state_db_path(&self, vm_id: &str) -> Result<PathBuf, InvalidVmId> {
        let invalid = matches!(vm_id, "" | "." | "..")
            || vm_id.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if invalid {
            return Err(InvalidVmId(vm_id.to_string()));
        }

        Ok(self.state_dir.join(vm_id).join(STATE_DB_FILE))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;

    const STATE_DIR_VAR: &str = "VMNET_STATE_DIR";

    fn config() -> Config {
        Config {
            state_dir: PathBuf::from("/run/state"),
        }
    }

    #[test]
    fn test_state_db_path() {
        assert_eq!(
            config().state_db_path("vm-a").unwrap(),
            PathBuf::from("/run/state/vm-a/netstate.db")
        );
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../vm-a")]
    #[case("vm-a/..")]
    #[case("/etc")]
    #[case("ns\\vm-a")]
    #[case("vm\0a")]
    fn test_state_db_path_rejects_non_component(#[case] vm_id: &str) {
        assert_eq!(
            config().state_db_path(vm_id),
            Err(InvalidVmId(vm_id.to_string()))
        );
    }

    #[test]
    fn test_state_db_path_allows_dots_inside_id() {
        assert_eq!(
            config().state_db_path("vm..a").unwrap(),
            PathBuf::from("/run/state/vm..a/netstate.db")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_uses_state_dir_override() {
        std::env::set_var(STATE_DIR_VAR, "/tmp/vmnet-state");
        let config = Config::from_env();
        std::env::remove_var(STATE_DIR_VAR);

        assert_eq!(
            config.unwrap().state_dir,
            PathBuf::from("/tmp/vmnet-state")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_empty_state_dir() {
        std::env::set_var(STATE_DIR_VAR, "");
        let result = Config::from_env();
        std::env::remove_var(STATE_DIR_VAR);

        let err = result.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_when_unset() {
        std::env::remove_var(STATE_DIR_VAR);

        let config = Config::from_env().unwrap();

        assert_eq!(config.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    }

    #[test]
    fn test_default_state_dir() {
        assert_eq!(Config::default().state_dir, PathBuf::from(DEFAULT_STATE_DIR));
    }
}
