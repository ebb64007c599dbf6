//! Provider adapter trait and the request/response types shared by all adapters.
//!
//! An adapter speaks one wire protocol. Several provider kinds share a
//! protocol (Azure, OneAPI and custom gateways all speak OpenAI chat
//! completions), so routing goes through [`ProviderKind::protocol`].

use crate::config::NetworkConfig;
use crate::error::RecognitionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// The provider kinds a configuration can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Azure,
    #[serde(rename = "oneapi")]
    OneApi,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Azure,
        ProviderKind::OneApi,
        ProviderKind::Custom,
    ];

    /// The name stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Azure => "azure",
            ProviderKind::OneApi => "oneapi",
            ProviderKind::Custom => "custom",
        }
    }

    /// The wire protocol this provider kind speaks.
    pub fn protocol(&self) -> WireProtocol {
        match self {
            ProviderKind::Anthropic => WireProtocol::Anthropic,
            ProviderKind::OpenAi
            | ProviderKind::Azure
            | ProviderKind::OneApi
            | ProviderKind::Custom => WireProtocol::OpenAiCompatible,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RecognitionError::UnsupportedProvider(s.to_string()))
    }
}

/// Request/response shapes an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireProtocol {
    /// `POST` chat completions with `image_url` content parts
    OpenAiCompatible,
    /// Anthropic messages API with base64 `image` content blocks
    Anthropic,
}

/// Connection details an adapter needs for one call.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Full endpoint URL the request is posted to
    pub api_url: String,
    pub api_key: String,
    pub model_name: String,
    /// Token ceiling used when the options carry no override
    pub max_tokens: u32,
}

/// Per-request timeouts used by the adapters.
#[derive(Debug, Clone, Copy)]
pub struct AdapterTimeouts {
    pub recognize: Duration,
    pub test: Duration,
}

impl From<&NetworkConfig> for AdapterTimeouts {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            recognize: Duration::from_millis(network.recognize_timeout_ms),
            test: Duration::from_millis(network.test_timeout_ms),
        }
    }
}

impl Default for AdapterTimeouts {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

/// A provider-specific parameter passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interpret a command-line value: booleans and numbers are typed, anything else is text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            ParamValue::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            ParamValue::Integer(i)
        } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
            ParamValue::Float(f)
        } else {
            ParamValue::Text(raw.to_string())
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Integer(i) => serde_json::Value::from(*i),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ParamValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Sampling and transport options for one recognition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Overrides the configuration's token ceiling
    pub max_tokens: Option<u32>,
    /// Stream the response; only honored when a progress sink is supplied
    pub stream: bool,
    /// Extra top-level body fields (OpenAI-compatible only)
    pub custom_params: BTreeMap<String, ParamValue>,
}

impl RecognitionOptions {
    pub fn effective_max_tokens(&self, config: &AdapterConfig) -> u32 {
        self.max_tokens.unwrap_or(config.max_tokens)
    }
}

/// The image and prompt for a single adapter call.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionCall<'a> {
    pub image_base64: &'a str,
    pub mime_type: &'a str,
    pub prompt: &'a str,
    pub options: &'a RecognitionOptions,
}

impl RecognitionCall<'_> {
    /// Whether this call should use the streaming transport.
    pub fn wants_stream(&self, progress: Option<&dyn ProgressSink>) -> bool {
        self.options.stream && progress.is_some()
    }
}

/// The outcome of a recognition, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
    /// Re-encoded image as a data URI, present when the image was compressed
    pub processed_image: Option<String>,
}

impl RecognitionResult {
    pub fn success(completion: Completion, duration_ms: u64) -> Self {
        Self {
            success: true,
            content: Some(completion.content),
            error: None,
            tokens_used: completion.tokens_used,
            duration_ms: Some(duration_ms),
            processed_image: None,
        }
    }

    pub fn failure(error: &RecognitionError, duration_ms: Option<u64>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.to_string()),
            tokens_used: None,
            duration_ms,
            processed_image: None,
        }
    }
}

/// Text and token usage returned by a successful provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// The outcome of a connection test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
}

impl ConnectionTestResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
        }
    }

    pub fn failed(error: &RecognitionError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
        }
    }
}

/// Receives incremental text while a response streams in.
pub trait ProgressSink: Send + Sync {
    fn on_delta(&self, delta: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_delta(&self, delta: &str) {
        self(delta)
    }
}

/// Trait that every wire-protocol adapter implements.
///
/// Adapters are stateless apart from a shared HTTP client, so one instance
/// serves concurrent calls. `complete` and `probe` carry typed errors; the
/// provided `call` and `test_connection` fold them into result records.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Send the image and prompt, returning the model's reply.
    async fn complete(
        &self,
        config: &AdapterConfig,
        call: &RecognitionCall<'_>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Completion, RecognitionError>;

    /// Send a minimal text-only request to check credentials and endpoint.
    async fn probe(&self, config: &AdapterConfig) -> Result<(), RecognitionError>;

    /// Run a recognition and fold the outcome into a [`RecognitionResult`].
    async fn call(
        &self,
        config: &AdapterConfig,
        call: &RecognitionCall<'_>,
        progress: Option<&dyn ProgressSink>,
    ) -> RecognitionResult {
        if call.image_base64.is_empty() {
            return RecognitionResult::failure(&RecognitionError::EmptyImage, None);
        }

        let start = Instant::now();
        let outcome = self.complete(config, call, progress).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(completion) => {
                tracing::debug!(
                    "{} returned {} chars in {}ms",
                    self.name(),
                    completion.content.len(),
                    duration_ms
                );
                RecognitionResult::success(completion, duration_ms)
            }
            Err(e) => {
                tracing::warn!("{} recognition failed: {e}", self.name());
                RecognitionResult::failure(&e, Some(duration_ms))
            }
        }
    }

    /// Probe the endpoint and fold the outcome into a [`ConnectionTestResult`].
    async fn test_connection(&self, config: &AdapterConfig) -> ConnectionTestResult {
        match self.probe(config).await {
            Ok(()) => ConnectionTestResult::ok(),
            Err(e) => {
                tracing::info!("{} connection test failed: {e}", self.name());
                ConnectionTestResult::failed(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Adapter that replays a canned outcome and counts invocations.
    struct CannedAdapter {
        outcome: Result<Completion, RecognitionError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for CannedAdapter {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            _config: &AdapterConfig,
            _call: &RecognitionCall<'_>,
            _progress: Option<&dyn ProgressSink>,
        ) -> Result<Completion, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        async fn probe(&self, _config: &AdapterConfig) -> Result<(), RecognitionError> {
            self.outcome.clone().map(|_| ())
        }
    }

    fn config() -> AdapterConfig {
        AdapterConfig {
            api_url: "http://localhost".into(),
            api_key: "sk-test".into(),
            model_name: "m".into(),
            max_tokens: 4096,
        }
    }

    #[test]
    fn test_provider_kind_routing() {
        assert_eq!(ProviderKind::Anthropic.protocol(), WireProtocol::Anthropic);
        for kind in ["openai", "azure", "oneapi", "custom"] {
            let kind: ProviderKind = kind.parse().unwrap();
            assert_eq!(kind.protocol(), WireProtocol::OpenAiCompatible);
        }
        let err = "ollama".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported provider type: ollama");
    }

    #[test]
    fn test_param_value_parse() {
        assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse("42"), ParamValue::Integer(42));
        assert_eq!(ParamValue::parse("0.5"), ParamValue::Float(0.5));
        assert_eq!(ParamValue::parse("high"), ParamValue::Text("high".into()));
        for raw in ["nan", "inf", "-infinity"] {
            let value = ParamValue::parse(raw);
            assert_eq!(value, ParamValue::Text(raw.into()));
            assert_eq!(value.to_json(), serde_json::Value::String(raw.into()));
        }
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = RecognitionResult::success(
            Completion {
                content: "A cat".into(),
                tokens_used: Some(12),
            },
            30,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["tokensUsed"], 12);
        assert_eq!(json["durationMs"], 30);
        assert!(json["processedImage"].is_null());
    }

    #[test]
    fn test_closure_is_a_progress_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |delta: &str| seen.lock().unwrap().push(delta.to_string());
        let sink_ref: &dyn ProgressSink = &sink;
        sink_ref.on_delta("Hel");
        sink_ref.on_delta("lo");
        assert_eq!(*seen.lock().unwrap(), vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_empty_image_fails_before_calling_provider() {
        let adapter = CannedAdapter {
            outcome: Ok(Completion {
                content: "unused".into(),
                tokens_used: None,
            }),
            calls: AtomicU32::new(0),
        };
        let options = RecognitionOptions::default();
        let call = RecognitionCall {
            image_base64: "",
            mime_type: "image/png",
            prompt: "describe",
            options: &options,
        };

        let result = adapter.call(&config(), &call, None).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Image data is empty"));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_errors_become_failed_results() {
        let adapter = CannedAdapter {
            outcome: Err(RecognitionError::Unauthorized),
            calls: AtomicU32::new(0),
        };
        let options = RecognitionOptions::default();
        let call = RecognitionCall {
            image_base64: "AAAA",
            mime_type: "image/png",
            prompt: "describe",
            options: &options,
        };

        let result = adapter.call(&config(), &call, None).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Invalid API key"));
        assert!(result.duration_ms.is_some());

        let test = adapter.test_connection(&config()).await;
        assert!(!test.success);
        assert_eq!(test.message, "Invalid API key");
    }
}
