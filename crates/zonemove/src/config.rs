//! Settings file for zonemove
//!
//! The file is optional. When it is missing every setting takes its default,
//! and a file only needs the keys it changes:
//!
//! ```toml
//! [arm]
//! poll_interval_secs = 10
//! operation_timeout_secs = 7200
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use zonemove_arm::ArmConfig;
use zonemove_common::{MigrateError, MigrateResult};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/zonemove/zonemove.toml";

/// Complete zonemove settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonemoveConfig {
    /// Resource Manager client settings
    #[serde(default)]
    pub arm: ArmConfig,
}

impl ZonemoveConfig {
    /// Loads from `path`, falling back to defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| {
                    MigrateError::invalid_config(
                        "config",
                        format!("failed to parse {}: {}", path.display(), e),
                    )
                })?;
                info!(path = %path.display(), "Loaded settings file");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Settings file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(MigrateError::Io(e)),
        }
    }

    pub fn validate(&self) -> MigrateResult<()> {
        self.arm.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ZonemoveConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ZonemoveConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[arm]\npoll_interval_secs = 10").unwrap();

        let config = ZonemoveConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.arm.poll_interval_secs, 10);
        assert_eq!(config.arm.endpoint, ArmConfig::default().endpoint);
    }

    #[test]
    fn test_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ZonemoveConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config, ZonemoveConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[arm\npoll_interval_secs = ").unwrap();

        match ZonemoveConfig::load_or_default(file.path()) {
            Err(MigrateError::InvalidConfig { field, .. }) => assert_eq!(field, "config"),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = ZonemoveConfig::default();
        config.arm.endpoint = "ftp://example".to_string();
        assert!(config.validate().is_err());
    }
}
