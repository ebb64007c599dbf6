//! Multimodal provider integration.
//!
//! Provides a provider abstraction over the two wire protocols in use
//! (OpenAI chat completions and Anthropic messages) and a dispatcher that
//! resolves stored configurations, normalizes images and records history.

pub(crate) mod anthropic;
pub(crate) mod dispatcher;
pub(crate) mod openai;
pub(crate) mod provider;
pub(crate) mod sse;
pub(crate) mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use anthropic::AnthropicAdapter;
pub use dispatcher::{
    ActiveRecognition, ConnectionTarget, Dispatcher, RecognitionRequest, RecognitionSession,
};
pub use openai::OpenAiAdapter;
pub use provider::{
    AdapterConfig, AdapterTimeouts, Completion, ConnectionTestResult, ParamValue, ProgressSink,
    ProviderAdapter, ProviderKind, RecognitionCall, RecognitionOptions, RecognitionResult,
    WireProtocol,
};
pub use transport::clean_response_content;
