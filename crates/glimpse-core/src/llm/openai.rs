//! OpenAI-compatible adapter using the Chat Completions API.
//!
//! Also serves Azure, OneAPI and custom gateways. The image is sent as a
//! data URL in the user message content array.

use super::provider::{
    AdapterConfig, AdapterTimeouts, Completion, ProgressSink, ProviderAdapter, RecognitionCall,
};
use super::sse::{read_events, Flow};
use super::transport::{clean_response_content, read_json, send};
use crate::error::RecognitionError;
use crate::pipeline::to_data_uri;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Adapter for OpenAI-style `chat/completions` endpoints.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    timeouts: AdapterTimeouts,
}

impl OpenAiAdapter {
    pub fn new(client: reqwest::Client, timeouts: AdapterTimeouts) -> Self {
        Self { client, timeouts }
    }

    /// Build the request body, with custom params merged over the standard fields.
    fn build_body(
        config: &AdapterConfig,
        call: &RecognitionCall<'_>,
        stream: bool,
    ) -> Result<serde_json::Value, RecognitionError> {
        let request = ChatRequest {
            model: &config.model_name,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ChatContent::Text { text: call.prompt },
                    ChatContent::ImageUrl {
                        image_url: ImageUrl {
                            url: to_data_uri(call.mime_type, call.image_base64),
                        },
                    },
                ],
            }],
            max_tokens: call.options.effective_max_tokens(config),
            temperature: call.options.temperature,
            top_p: call.options.top_p,
            stream,
        };

        let mut body = serde_json::to_value(&request)
            .map_err(|e| RecognitionError::RequestEncoding(e.to_string()))?;
        if let serde_json::Value::Object(map) = &mut body {
            for (key, value) in &call.options.custom_params {
                map.insert(key.clone(), value.to_json());
            }
        }
        Ok(body)
    }

    fn post(&self, config: &AdapterConfig) -> reqwest::RequestBuilder {
        self.client
            .post(&config.api_url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("Content-Type", "application/json")
    }

    async fn complete_buffered(
        &self,
        resp: reqwest::Response,
    ) -> Result<Completion, RecognitionError> {
        let chat: ChatResponse = read_json(resp).await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| clean_response_content(&text))
            .unwrap_or_default();

        Ok(Completion {
            content,
            tokens_used: chat.usage.and_then(|u| u.total_tokens),
        })
    }

    async fn complete_streaming(
        &self,
        resp: reqwest::Response,
        progress: &dyn ProgressSink,
    ) -> Result<Completion, RecognitionError> {
        let mut content = String::new();
        let mut tokens = 0;

        read_events(resp.bytes_stream(), |data| {
            if data == "[DONE]" {
                return Flow::Stop;
            }
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => {
                    if let Some(total) = chunk.usage.and_then(|u| u.total_tokens) {
                        tokens = total;
                    }
                    let delta = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);
                    if let Some(delta) = delta.filter(|d| !d.is_empty()) {
                        progress.on_delta(&delta);
                        content.push_str(&delta);
                    }
                }
                Err(e) => tracing::debug!("Skipping unparseable stream line: {e}"),
            }
            Flow::Continue
        })
        .await?;

        Ok(Completion {
            content,
            tokens_used: Some(tokens),
        })
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ChatContent<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContent<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ProbeRequest<'a> {
    model: &'a str,
    messages: [ProbeMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ProbeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        config: &AdapterConfig,
        call: &RecognitionCall<'_>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Completion, RecognitionError> {
        let streaming = call.wants_stream(progress);
        let body = Self::build_body(config, call, streaming)?;

        tracing::debug!(
            "POST {} model={} stream={streaming}",
            config.api_url,
            config.model_name
        );
        let request = self.post(config).json(&body).timeout(self.timeouts.recognize);
        let resp = send(request).await?;

        match progress {
            Some(sink) if streaming => self.complete_streaming(resp, sink).await,
            _ => self.complete_buffered(resp).await,
        }
    }

    async fn probe(&self, config: &AdapterConfig) -> Result<(), RecognitionError> {
        let body = ProbeRequest {
            model: &config.model_name,
            messages: [ProbeMessage {
                role: "user",
                content: "Hello",
            }],
            max_tokens: 5,
        };

        let resp = send(self.post(config).json(&body).timeout(self.timeouts.test)).await?;
        let value: serde_json::Value = read_json(resp).await?;
        if value.get("choices").is_some_and(serde_json::Value::is_array) {
            Ok(())
        } else {
            Err(RecognitionError::UnexpectedFormat)
        }
    }
}
