//! Error types for Glimpse.
//!
//! Errors are organized by subsystem. `RecognitionError` is special: its
//! `Display` text is the human-readable message surfaced to users in a
//! failed `RecognitionResult`, so its wording is part of the contract.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Glimpse operations.
#[derive(Error, Debug)]
pub enum GlimpseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Image loading or encoding errors
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised by the SQLite store and the secret cipher.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking writer
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// Encrypting or decrypting an API key failed
    #[error("Secret error: {0}")]
    Secret(String),

    /// A row that the operation depends on does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Image loading and encoding errors.
///
/// The normalizer swallows these and falls back to the original bytes; they
/// only reach callers from explicit operations such as thumbnail generation
/// or loading a file from disk.
#[derive(Error, Debug)]
pub enum ImageError {
    /// Input was not valid base64 or not a valid data URI
    #[error("Invalid image payload: {0}")]
    InvalidPayload(String),

    /// Image decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Image encoding failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// File exceeds the configured size ceiling
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every way a recognition or connection test can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("Configuration {0} does not exist")]
    ConfigNotFound(i64),

    #[error("Configuration \"{0}\" is disabled")]
    ConfigInactive(String),

    #[error("Unsupported provider type: {0}")]
    UnsupportedProvider(String),

    #[error("Image data is empty")]
    EmptyImage,

    #[error("Request timed out, please check your network connection")]
    Timeout,

    #[error("Could not resolve the API host, please check the API URL")]
    Dns,

    #[error("Connection refused, please check the API URL")]
    ConnectionRefused,

    #[error("Connection was reset by the server")]
    ConnectionReset,

    #[error("Invalid API key")]
    Unauthorized,

    #[error("API key does not have permission for this request")]
    Forbidden,

    #[error("API URL is wrong or the model does not exist")]
    NotFound,

    #[error("Too many requests or quota exhausted")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request body could not be built locally
    #[error("Failed to build request: {0}")]
    RequestEncoding(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Unexpected response format")]
    UnexpectedFormat,

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Recognition cancelled")]
    Cancelled,

    #[error("Another recognition is already in progress")]
    Busy,

    #[error("Failed to load configuration: {0}")]
    Store(String),
}

impl From<StoreError> for RecognitionError {
    fn from(err: StoreError) -> Self {
        RecognitionError::Store(err.to_string())
    }
}

/// Convenience type alias for Glimpse results.
pub type Result<T> = std::result::Result<T, GlimpseError>;

/// Convenience type alias for store results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_error_messages_are_user_facing() {
        assert_eq!(
            RecognitionError::ConfigNotFound(7).to_string(),
            "Configuration 7 does not exist"
        );
        assert_eq!(
            RecognitionError::UnsupportedProvider("ollama".into()).to_string(),
            "Unsupported provider type: ollama"
        );
        let err = RecognitionError::Server {
            status: 502,
            message: "upstream".into(),
        };
        assert_eq!(err.to_string(), "Server error (502): upstream");
    }

    #[test]
    fn test_request_encoding_is_not_a_server_rejection() {
        let cause = serde_json::from_str::<u32>("null").unwrap_err();
        let err = RecognitionError::RequestEncoding(cause.to_string());
        assert!(err.to_string().starts_with("Failed to build request: "));
        assert_ne!(err, RecognitionError::BadRequest(cause.to_string()));
    }

    #[test]
    fn test_store_error_converts_to_recognition_error() {
        let err: RecognitionError = StoreError::LockPoisoned.into();
        assert!(matches!(err, RecognitionError::Store(_)));
        assert!(err.to_string().contains("lock poisoned"));
    }
}
