//! Glimpse Core - multimodal image recognition library.
//!
//! Glimpse sends an image and a prompt to an OpenAI-compatible or Anthropic
//! endpoint, streams the answer back, and keeps a local history of results.
//!
//! # Architecture
//!
//! ```text
//! Request → resolve config → normalize image → adapter → provider HTTP API
//!                                                  ↓
//!                              history ← result ← response
//! ```
//!
//! Provider configurations (with API keys encrypted at rest), history,
//! prompt templates and user settings live in one SQLite database.
//!
//! # Usage
//!
//! ```rust,ignore
//! use glimpse_core::{Config, Glimpse, ImageSource, RecognitionRequest};
//!
//! #[tokio::main]
//! async fn main() -> glimpse_core::Result<()> {
//!     let glimpse = Glimpse::open(Config::load()?)?;
//!     let request = RecognitionRequest {
//!         config_id: 1,
//!         image: ImageSource::load_path("./photo.jpg".as_ref(), 10)?,
//!         prompt: "Describe this image".into(),
//!         options: Default::default(),
//!     };
//!     let result = glimpse.dispatcher().recognize(request, None).await;
//!     println!("{:?}", result.content);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod crypto;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;

// Re-exports for convenient access
pub use config::Config;
pub use crypto::{mask_api_key, SecretCipher};
pub use error::{
    ConfigError, GlimpseError, ImageError, RecognitionError, Result, StoreError, StoreResult,
};
pub use llm::{
    ConnectionTarget, ConnectionTestResult, Dispatcher, ParamValue, ProgressSink, ProviderKind,
    RecognitionOptions, RecognitionRequest, RecognitionResult, RecognitionSession,
};
pub use pipeline::{CompressionPolicy, ImageNormalizer, ImageSource, NormalizedImage};
pub use store::{AppSettings, Database};

use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An opened Glimpse instance: configuration, database and dispatcher.
pub struct Glimpse {
    config: Config,
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Glimpse {
    /// Open the database under the configured data directory.
    ///
    /// Generates the secret key file on first run when no key is configured.
    pub fn open(config: Config) -> Result<Self> {
        tracing::debug!("Initializing Glimpse v{}", VERSION);
        let cipher = SecretCipher::from_config(&config)?;
        let db = Arc::new(Database::open(&config.database_path(), cipher)?);
        let dispatcher = Dispatcher::new(db.clone(), &config.network);
        Ok(Self {
            config,
            db,
            dispatcher,
        })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_open_creates_database_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.data_dir = dir.path().join("data");
        config.security.secret_key = String::new();

        let glimpse = Glimpse::open(config.clone()).unwrap();
        assert!(config.database_path().exists());
        assert!(config.key_file_path().exists());
        assert_eq!(glimpse.db().templates().list().unwrap().len(), 5);
    }
}
