//! Routes recognition requests from a stored configuration to an adapter.
//!
//! The dispatcher resolves the configuration, normalizes the image on a
//! blocking worker, calls the adapter for the configuration's wire protocol
//! and records successful results in history.

use super::anthropic::AnthropicAdapter;
use super::openai::OpenAiAdapter;
use super::provider::{
    AdapterConfig, AdapterTimeouts, ConnectionTestResult, ProgressSink, ProviderAdapter,
    ProviderKind, RecognitionCall, RecognitionOptions, RecognitionResult, WireProtocol,
};
use crate::config::NetworkConfig;
use crate::error::RecognitionError;
use crate::pipeline::{ImageNormalizer, ImageSource};
use crate::store::{AppSettings, Database, NewHistoryRecord, ProviderConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Token ceiling used when testing an unsaved configuration.
const DRAFT_MAX_TOKENS: u32 = 100;

/// One recognition to run against a stored configuration.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub config_id: i64,
    pub image: ImageSource,
    pub prompt: String,
    pub options: RecognitionOptions,
}

/// What a connection test runs against.
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    /// A stored configuration
    Saved(i64),
    /// Connection details that have not been saved yet
    Draft {
        provider: ProviderKind,
        api_url: String,
        api_key: String,
        model_name: String,
    },
}

/// Dispatches recognitions and connection tests to protocol adapters.
pub struct Dispatcher {
    db: Arc<Database>,
    adapters: HashMap<WireProtocol, Arc<dyn ProviderAdapter>>,
}

impl Dispatcher {
    /// Build a dispatcher with the HTTP adapters sharing one client.
    pub fn new(db: Arc<Database>, network: &NetworkConfig) -> Self {
        let client = reqwest::Client::new();
        let timeouts = AdapterTimeouts::from(network);

        let mut adapters: HashMap<WireProtocol, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            WireProtocol::OpenAiCompatible,
            Arc::new(OpenAiAdapter::new(client.clone(), timeouts)),
        );
        adapters.insert(
            WireProtocol::Anthropic,
            Arc::new(AnthropicAdapter::new(client, timeouts)),
        );
        Self::with_adapters(db, adapters)
    }

    /// Build a dispatcher over an explicit adapter map.
    pub fn with_adapters(
        db: Arc<Database>,
        adapters: HashMap<WireProtocol, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        Self { db, adapters }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a recognition. Failures are reported in the result, never as `Err`.
    pub async fn recognize(
        &self,
        request: RecognitionRequest,
        progress: Option<&dyn ProgressSink>,
    ) -> RecognitionResult {
        self.recognize_with_cancel(request, progress, &CancellationToken::new())
            .await
    }

    /// Run a recognition that stops early when `cancel` is triggered.
    ///
    /// Cancellation drops the in-flight request, which closes the local
    /// connection; the provider may still finish and bill the call.
    pub async fn recognize_with_cancel(
        &self,
        request: RecognitionRequest,
        progress: Option<&dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> RecognitionResult {
        let config = match self.active_config(request.config_id) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Recognition rejected: {e}");
                return RecognitionResult::failure(&e, None);
            }
        };

        let start = Instant::now();
        match self.run(config, request, progress, cancel, start).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Recognition failed: {e}");
                RecognitionResult::failure(&e, Some(elapsed_ms(start)))
            }
        }
    }

    async fn run(
        &self,
        config: ProviderConfig,
        request: RecognitionRequest,
        progress: Option<&dyn ProgressSink>,
        cancel: &CancellationToken,
        start: Instant,
    ) -> Result<RecognitionResult, RecognitionError> {
        let adapter = self.adapter_for(config.kind()?)?;

        let settings = self.db.settings().get_all().unwrap_or_else(|e| {
            tracing::warn!("Failed to read settings, using defaults: {e}");
            AppSettings::default()
        });
        let normalizer = ImageNormalizer::new(settings.compression_policy());

        let image = request.image;
        let (original, normalized) = tokio::task::spawn_blocking(move || {
            let original = image.original_data_uri();
            (original, normalizer.normalize(image))
        })
        .await
        .map_err(|e| RecognitionError::ImageProcessing(e.to_string()))?;

        if normalized.was_compressed {
            tracing::debug!(
                "Compressed image from {} to {} bytes",
                normalized.original_size,
                normalized.compressed_size.unwrap_or_default()
            );
        }

        let call = RecognitionCall {
            image_base64: &normalized.base64,
            mime_type: &normalized.mime_type,
            prompt: &request.prompt,
            options: &request.options,
        };
        let adapter_config = config.adapter_config();

        tracing::info!(
            "Recognizing with '{}' ({}, model {})",
            config.name,
            config.provider,
            config.model_name
        );
        let mut result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let elapsed = elapsed_ms(start);
                tracing::info!("Recognition cancelled after {elapsed}ms");
                return Ok(RecognitionResult::failure(&RecognitionError::Cancelled, Some(elapsed)));
            }
            result = adapter.call(&adapter_config, &call, progress) => result,
        };
        // Adapters leave the duration unset when they reject a call up front
        if result.duration_ms.is_none() {
            result.duration_ms = Some(elapsed_ms(start));
        }

        if result.success {
            self.record_history(&config, &request.prompt, &result, original);
        }
        if normalized.was_compressed {
            result.processed_image = Some(normalized.data_uri());
        }
        Ok(result)
    }

    /// Probe a saved or draft configuration.
    pub async fn test_connection(&self, target: ConnectionTarget) -> ConnectionTestResult {
        let resolved = match target {
            ConnectionTarget::Saved(id) => self
                .db
                .configs()
                .get(id)
                .map_err(RecognitionError::from)
                .and_then(|c| c.ok_or(RecognitionError::ConfigNotFound(id)))
                .and_then(|c| Ok((c.kind()?, c.adapter_config()))),
            ConnectionTarget::Draft {
                provider,
                api_url,
                api_key,
                model_name,
            } => Ok((
                provider,
                AdapterConfig {
                    api_url,
                    api_key,
                    model_name,
                    max_tokens: DRAFT_MAX_TOKENS,
                },
            )),
        };

        let (kind, config) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return ConnectionTestResult::failed(&e),
        };
        match self.adapter_for(kind) {
            Ok(adapter) => adapter.test_connection(&config).await,
            Err(e) => ConnectionTestResult::failed(&e),
        }
    }

    fn active_config(&self, id: i64) -> Result<ProviderConfig, RecognitionError> {
        let config = self
            .db
            .configs()
            .get(id)?
            .ok_or(RecognitionError::ConfigNotFound(id))?;
        if !config.is_active {
            return Err(RecognitionError::ConfigInactive(config.name));
        }
        Ok(config)
    }

    fn adapter_for(
        &self,
        kind: ProviderKind,
    ) -> Result<Arc<dyn ProviderAdapter>, RecognitionError> {
        self.adapters
            .get(&kind.protocol())
            .cloned()
            .ok_or_else(|| RecognitionError::UnsupportedProvider(kind.to_string()))
    }

    fn record_history(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        result: &RecognitionResult,
        image: String,
    ) {
        let record = NewHistoryRecord {
            config_id: config.id,
            config_name: config.name.clone(),
            image: Some(image),
            prompt: prompt.to_string(),
            result: result.content.clone().unwrap_or_default(),
            tokens_used: result.tokens_used,
            duration_ms: result.duration_ms,
        };
        if let Err(e) = self.db.history().create(record) {
            tracing::error!("Failed to save recognition history: {e}");
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Allows one recognition at a time and cancels it on request.
#[derive(Debug, Default)]
pub struct RecognitionSession {
    active: Mutex<Option<CancellationToken>>,
}

/// Marks a running recognition; dropping it frees the session.
#[derive(Debug)]
pub struct ActiveRecognition<'a> {
    session: &'a RecognitionSession,
    token: CancellationToken,
}

impl ActiveRecognition<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveRecognition<'_> {
    fn drop(&mut self) {
        self.session.slot().take();
    }
}

impl RecognitionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session, failing with `Busy` while another recognition runs.
    pub fn begin(&self) -> Result<ActiveRecognition<'_>, RecognitionError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(RecognitionError::Busy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(ActiveRecognition {
            session: self,
            token,
        })
    }

    /// Cancel the running recognition. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.slot().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::Completion;
    use crate::llm::testing::{MockEndpoint, MockReply};
    use crate::pipeline::decode::sample_image;
    use crate::store::{new_config, test_db, HistoryQuery, ProviderConfigPatch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn dispatcher(db: Arc<Database>) -> Dispatcher {
        Dispatcher::new(db, &NetworkConfig::default())
    }

    fn png_request(config_id: i64) -> RecognitionRequest {
        RecognitionRequest {
            config_id,
            image: ImageSource::Bytes(sample_image(16, 16, image::ImageFormat::Png)),
            prompt: "What is this?".to_string(),
            options: RecognitionOptions::default(),
        }
    }

    /// Adapter that counts calls and never touches the network.
    struct CountingAdapter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(
            &self,
            _config: &AdapterConfig,
            _call: &RecognitionCall<'_>,
            _progress: Option<&dyn ProgressSink>,
        ) -> Result<Completion, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                content: "ok".to_string(),
                tokens_used: None,
            })
        }

        async fn probe(&self, _config: &AdapterConfig) -> Result<(), RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_end_to_end_recognition_records_history() {
        let mock = MockEndpoint::json(
            200,
            r#"{"choices":[{"message":{"content":"}}A cat"}}],"usage":{"total_tokens":12}}"#,
        )
        .await;
        let db = Arc::new(test_db());
        let config = db
            .configs()
            .create(new_config("main", ProviderKind::OpenAi, &mock.url))
            .unwrap();

        let result = dispatcher(db.clone())
            .recognize(png_request(config.id), None)
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.content.as_deref(), Some("A cat"));
        assert_eq!(result.tokens_used, Some(12));
        assert!(result.processed_image.is_none());
        assert_eq!(mock.hits(), 1);

        let history = db.history().list(&HistoryQuery::default()).unwrap();
        assert_eq!(history.total, 1);
        let record = &history.records[0];
        assert_eq!(record.result, "A cat");
        assert_eq!(record.config_name, "main");
        assert!(record
            .image
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_inactive_config_makes_no_request() {
        let mock = MockEndpoint::json(200, "{}").await;
        let db = Arc::new(test_db());
        let config = db
            .configs()
            .create(new_config("off", ProviderKind::OpenAi, &mock.url))
            .unwrap();
        db.configs()
            .update(
                config.id,
                ProviderConfigPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = dispatcher(db.clone())
            .recognize(png_request(config.id), None)
            .await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some(RecognitionError::ConfigInactive("off".into()).to_string().as_str())
        );
        assert_eq!(mock.hits(), 0);

        let missing = dispatcher(db).recognize(png_request(999), None).await;
        assert_eq!(
            missing.error,
            Some(RecognitionError::ConfigNotFound(999).to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_recognition_is_not_recorded() {
        let mock = MockEndpoint::json(401, r#"{"error":{"message":"bad key"}}"#).await;
        let db = Arc::new(test_db());
        let config = db
            .configs()
            .create(new_config("main", ProviderKind::Azure, &mock.url))
            .unwrap();

        let result = dispatcher(db.clone())
            .recognize(png_request(config.id), None)
            .await;
        assert_eq!(result.error, Some(RecognitionError::Unauthorized.to_string()));
        assert!(result.duration_ms.is_some());
        assert_eq!(db.history().list(&HistoryQuery::default()).unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_failures_after_config_lookup_carry_duration() {
        let mock = MockEndpoint::json(200, "{}").await;
        let db = Arc::new(test_db());
        let config = db
            .configs()
            .create(new_config("main", ProviderKind::OpenAi, &mock.url))
            .unwrap();

        let empty = RecognitionRequest {
            image: ImageSource::Base64 {
                data: String::new(),
                mime_type: "image/png".to_string(),
            },
            ..png_request(config.id)
        };
        let result = dispatcher(db.clone()).recognize(empty, None).await;
        assert_eq!(result.error, Some(RecognitionError::EmptyImage.to_string()));
        assert!(result.duration_ms.is_some());
        assert_eq!(mock.hits(), 0);

        let missing = dispatcher(db).recognize(png_request(999), None).await;
        assert!(missing.duration_ms.is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_unsupported() {
        let db = Arc::new(test_db());
        let id = db
            .configs()
            .create(new_config("odd", ProviderKind::Custom, "http://localhost"))
            .unwrap()
            .id;
        db.lock()
            .unwrap()
            .execute(
                "UPDATE model_configs SET provider = 'gemini' WHERE id = ?1",
                [id],
            )
            .unwrap();

        let result = dispatcher(db).recognize(png_request(id), None).await;
        assert_eq!(
            result.error,
            Some(RecognitionError::UnsupportedProvider("gemini".into()).to_string())
        );
        assert!(result.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_routes_by_protocol() {
        let db = Arc::new(test_db());
        let openai = Arc::new(CountingAdapter {
            calls: AtomicU32::new(0),
        });
        let anthropic = Arc::new(CountingAdapter {
            calls: AtomicU32::new(0),
        });
        let mut adapters: HashMap<WireProtocol, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(WireProtocol::OpenAiCompatible, openai.clone());
        adapters.insert(WireProtocol::Anthropic, anthropic.clone());
        let dispatcher = Dispatcher::with_adapters(db.clone(), adapters);

        for kind in [ProviderKind::OneApi, ProviderKind::Anthropic, ProviderKind::Custom] {
            let id = db
                .configs()
                .create(new_config(kind.as_str(), kind, "http://localhost"))
                .unwrap()
                .id;
            assert!(dispatcher.recognize(png_request(id), None).await.success);
        }

        assert_eq!(openai.calls.load(Ordering::SeqCst), 2);
        assert_eq!(anthropic.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_oversized_image_is_compressed() {
        let db = Arc::new(test_db());
        db.settings()
            .set("compressThreshold", serde_json::json!(1))
            .unwrap();
        let adapter = Arc::new(CountingAdapter {
            calls: AtomicU32::new(0),
        });
        let mut adapters: HashMap<WireProtocol, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(WireProtocol::OpenAiCompatible, adapter);
        let dispatcher = Dispatcher::with_adapters(db.clone(), adapters);
        let id = db
            .configs()
            .create(new_config("main", ProviderKind::OpenAi, "http://localhost"))
            .unwrap()
            .id;

        let mut request = png_request(id);
        request.image = ImageSource::Bytes(sample_image(256, 256, image::ImageFormat::Png));
        let result = dispatcher.recognize(request, None).await;

        assert!(result.success);
        assert!(result.processed_image.unwrap().starts_with("data:image/"));
    }

    #[tokio::test]
    async fn test_cancel_stops_slow_request() {
        let mock = MockEndpoint::start(MockReply::Delay(Duration::from_secs(10))).await;
        let db = Arc::new(test_db());
        let id = db
            .configs()
            .create(new_config("slow", ProviderKind::OpenAi, &mock.url))
            .unwrap()
            .id;
        let dispatcher = dispatcher(db.clone());
        let session = RecognitionSession::new();

        let active = session.begin().unwrap();
        assert!(matches!(session.begin(), Err(RecognitionError::Busy)));

        let token = active.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = dispatcher
            .recognize_with_cancel(png_request(id), None, active.token())
            .await;
        assert_eq!(result.error, Some(RecognitionError::Cancelled.to_string()));
        assert_eq!(db.history().list(&HistoryQuery::default()).unwrap().total, 0);

        drop(active);
        assert!(!session.is_busy());
        assert!(!session.cancel());
        assert!(session.begin().is_ok());
    }

    #[tokio::test]
    async fn test_connection_targets() {
        let mock = MockEndpoint::json(200, r#"{"choices":[]}"#).await;
        let db = Arc::new(test_db());
        let id = db
            .configs()
            .create(new_config("main", ProviderKind::OpenAi, &mock.url))
            .unwrap()
            .id;
        let dispatcher = dispatcher(db);

        assert!(dispatcher.test_connection(ConnectionTarget::Saved(id)).await.success);

        let missing = dispatcher.test_connection(ConnectionTarget::Saved(42)).await;
        assert!(!missing.success);
        assert_eq!(missing.message, RecognitionError::ConfigNotFound(42).to_string());

        let draft = dispatcher
            .test_connection(ConnectionTarget::Draft {
                provider: ProviderKind::Custom,
                api_url: mock.url.clone(),
                api_key: "sk-draft".into(),
                model_name: "m".into(),
            })
            .await;
        assert!(draft.success, "{}", draft.message);
        assert_eq!(mock.last_header("authorization").as_deref(), Some("Bearer sk-draft"));
        assert_eq!(mock.hits(), 2);
    }
}
