//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.network.recognize_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network.recognize_timeout_ms must be > 0".into(),
            ));
        }
        if self.network.test_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network.test_timeout_ms must be > 0".into(),
            ));
        }
        if self.general.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "general.data_dir must not be empty".into(),
            ));
        }
        if self.security.key_file.is_empty() {
            return Err(ConfigError::ValidationError(
                "security.key_file must not be empty".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(
                "logging.format must be \"pretty\" or \"json\"".into(),
            ));
        }
        Ok(())
    }
}
