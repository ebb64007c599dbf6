//! Anthropic adapter using the Messages API.
//!
//! Sends the image as a base64 `image` content block.

use super::provider::{
    AdapterConfig, AdapterTimeouts, Completion, ProgressSink, ProviderAdapter, RecognitionCall,
};
use super::sse::{read_events, Flow};
use super::transport::{read_json, send};
use crate::error::RecognitionError;
use crate::pipeline::mime::normalize_media_type;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for Anthropic-style `messages` endpoints.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    timeouts: AdapterTimeouts,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, timeouts: AdapterTimeouts) -> Self {
        Self { client, timeouts }
    }

    fn post(&self, config: &AdapterConfig) -> reqwest::RequestBuilder {
        self.client
            .post(&config.api_url)
            .header("x-api-key", &config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    async fn complete_buffered(
        &self,
        resp: reqwest::Response,
    ) -> Result<Completion, RecognitionError> {
        let api_resp: MessagesResponse = read_json(resp).await?;
        let content = api_resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            content,
            tokens_used: api_resp.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    async fn complete_streaming(
        &self,
        resp: reqwest::Response,
        progress: &dyn ProgressSink,
    ) -> Result<Completion, RecognitionError> {
        let mut content = String::new();
        let mut input_tokens = 0;
        let mut output_tokens = 0;

        read_events(resp.bytes_stream(), |data| {
            let event = match serde_json::from_str::<StreamEvent>(data) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!("Skipping unparseable stream line: {e}");
                    return Flow::Continue;
                }
            };

            match event {
                StreamEvent::MessageStart { message } => {
                    if let Some(usage) = message.usage {
                        input_tokens = usage.input_tokens;
                        output_tokens = usage.output_tokens;
                    }
                }
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::TextDelta { text },
                } => {
                    if !text.is_empty() {
                        progress.on_delta(&text);
                        content.push_str(&text);
                    }
                }
                StreamEvent::MessageDelta { usage: Some(usage) } => {
                    // Output count in message_delta is cumulative
                    output_tokens = usage.output_tokens;
                }
                StreamEvent::MessageStop => return Flow::Stop,
                StreamEvent::Error { error } => {
                    return Flow::Fail(RecognitionError::Server {
                        status: 500,
                        message: error.message,
                    });
                }
                _ => {}
            }
            Flow::Continue
        })
        .await?;

        Ok(Completion {
            content,
            tokens_used: Some(input_tokens + output_tokens),
        })
    }
}

// --- Request types ---

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum RequestContent<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image")]
    Image { source: ImageSource<'a> },
}

#[derive(Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    source_type: &'a str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct ProbeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ProbeMessage<'a>; 1],
}

#[derive(Serialize)]
struct ProbeMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// --- Response types ---

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<Usage>,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        config: &AdapterConfig,
        call: &RecognitionCall<'_>,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<Completion, RecognitionError> {
        let streaming = call.wants_stream(progress);
        let body = MessagesRequest {
            model: &config.model_name,
            max_tokens: call.options.effective_max_tokens(config),
            messages: vec![Message {
                role: "user",
                content: vec![
                    RequestContent::Text { text: call.prompt },
                    RequestContent::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: normalize_media_type(call.mime_type),
                            data: call.image_base64,
                        },
                    },
                ],
            }],
            temperature: call.options.temperature,
            top_p: call.options.top_p,
            stream: streaming,
        };

        tracing::debug!(
            "POST {} model={} stream={streaming}",
            config.api_url,
            config.model_name
        );
        let resp = send(self.post(config).json(&body).timeout(self.timeouts.recognize)).await?;

        match progress {
            Some(sink) if streaming => self.complete_streaming(resp, sink).await,
            _ => self.complete_buffered(resp).await,
        }
    }

    async fn probe(&self, config: &AdapterConfig) -> Result<(), RecognitionError> {
        let body = ProbeRequest {
            model: &config.model_name,
            max_tokens: 10,
            messages: [ProbeMessage {
                role: "user",
                content: "Hello",
            }],
        };

        let resp = send(self.post(config).json(&body).timeout(self.timeouts.test)).await?;
        let value: serde_json::Value = read_json(resp).await?;
        if value.get("content").is_some_and(serde_json::Value::is_array) {
            Ok(())
        } else {
            Err(RecognitionError::UnexpectedFormat)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::RecognitionOptions;
    use crate::llm::testing::MockEndpoint;
    use std::sync::Mutex;

    fn adapter() -> AnthropicAdapter {
        AnthropicAdapter::new(reqwest::Client::new(), AdapterTimeouts::default())
    }

    fn config(url: &str) -> AdapterConfig {
        AdapterConfig {
            api_url: url.to_string(),
            api_key: "sk-ant-test".into(),
            model_name: "claude-3-5-sonnet".into(),
            max_tokens: 1024,
        }
    }

    #[tokio::test]
    async fn test_buffered_call_body_and_usage() {
        let mock = MockEndpoint::json(
            200,
            r#"{"content":[{"type":"text","text":"A "},{"type":"tool_use","id":"x"},{"type":"text","text":"cat"}],
                "usage":{"input_tokens":10,"output_tokens":5}}"#,
        )
        .await;
        let options = RecognitionOptions {
            top_p: Some(0.4),
            ..Default::default()
        };
        let call = RecognitionCall {
            image_base64: "AAAA",
            mime_type: "image/bmp",
            prompt: "Describe",
            options: &options,
        };

        let result = adapter().call(&config(&mock.url), &call, None).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.content.as_deref(), Some("A cat"));
        assert_eq!(result.tokens_used, Some(15));

        assert_eq!(mock.last_header("x-api-key").as_deref(), Some("sk-ant-test"));
        assert_eq!(
            mock.last_header("anthropic-version").as_deref(),
            Some(ANTHROPIC_VERSION)
        );
        let body = mock.last_body();
        assert_eq!(body["max_tokens"], 1024);
        assert!(body.get("temperature").is_none());
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["type"], "base64");
        assert_eq!(content[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["source"]["data"], "AAAA");
    }

    #[tokio::test]
    async fn test_streaming_events() {
        let mock = MockEndpoint::stream(&[
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":20,\"output_tokens\":1}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "data: {\"type\":\"ping\"}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{},\"usage\":{\"output_tokens\":7}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ])
        .await;
        let options = RecognitionOptions {
            stream: true,
            ..Default::default()
        };
        let call = RecognitionCall {
            image_base64: "AAAA",
            mime_type: "image/png",
            prompt: "Describe",
            options: &options,
        };
        let deltas = Mutex::new(Vec::new());
        let sink = |d: &str| deltas.lock().unwrap().push(d.to_string());

        let result = adapter().call(&config(&mock.url), &call, Some(&sink)).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.content.as_deref(), Some("Hi there"));
        assert_eq!(result.tokens_used, Some(27));
        assert_eq!(*deltas.lock().unwrap(), vec!["Hi ", "there"]);
        assert_eq!(mock.last_body()["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_error_event_fails_the_call() {
        let mock = MockEndpoint::stream(&[
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        ])
        .await;
        let options = RecognitionOptions {
            stream: true,
            ..Default::default()
        };
        let call = RecognitionCall {
            image_base64: "AAAA",
            mime_type: "image/png",
            prompt: "Describe",
            options: &options,
        };
        let sink = |_: &str| {};

        let result = adapter().call(&config(&mock.url), &call, Some(&sink)).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Server error (500): Overloaded"));
    }

    #[tokio::test]
    async fn test_probe_requires_content_array() {
        let ok = MockEndpoint::json(200, r#"{"content":[]}"#).await;
        assert!(adapter().test_connection(&config(&ok.url)).await.success);
        assert_eq!(ok.last_body()["max_tokens"], 10);

        let forbidden = MockEndpoint::json(403, "{}").await;
        let result = adapter().test_connection(&config(&forbidden.url)).await;
        assert!(!result.success);
        assert_eq!(
            result.message,
            "API key does not have permission for this request"
        );
    }
}
