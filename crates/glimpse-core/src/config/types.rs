//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the database and the secret key file
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.glimpse"),
        }
    }
}

/// Network timeouts for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Whole-request timeout for recognition calls, in milliseconds
    pub recognize_timeout_ms: u64,

    /// Whole-request timeout for connection tests, in milliseconds
    pub test_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            recognize_timeout_ms: 120_000,
            test_timeout_ms: 30_000,
        }
    }
}

/// Secret storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key used to encrypt API keys at rest.
    /// Supports `${ENV_VAR}` syntax. When empty, a key file is generated in
    /// the data directory.
    pub secret_key: String,

    /// Key file name inside the data directory
    pub key_file: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: "${GLIMPSE_SECRET_KEY}".to_string(),
            key_file: "secret.key".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
