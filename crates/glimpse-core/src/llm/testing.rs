//! A local HTTP endpoint that stands in for a provider in tests.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the endpoint replies with.
#[derive(Clone)]
pub(crate) enum MockReply {
    /// A buffered response with the given status and body
    Json { status: u16, body: String },
    /// A `text/event-stream` response sent as separate chunks
    Stream(Vec<Vec<u8>>),
    /// Wait before replying with an empty JSON object
    Delay(Duration),
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    hits: Arc<AtomicU32>,
    last_body: Arc<Mutex<Option<serde_json::Value>>>,
    last_headers: Arc<Mutex<Option<HeaderMap>>>,
}

/// A running mock endpoint; its server task lives until the runtime shuts down.
pub(crate) struct MockEndpoint {
    pub url: String,
    state: MockState,
}

impl MockEndpoint {
    pub async fn start(reply: MockReply) -> Self {
        let state = MockState {
            reply,
            hits: Arc::new(AtomicU32::new(0)),
            last_body: Arc::new(Mutex::new(None)),
            last_headers: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/v1/chat", post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/v1/chat"),
            state,
        }
    }

    pub async fn json(status: u16, body: &str) -> Self {
        Self::start(MockReply::Json {
            status,
            body: body.to_string(),
        })
        .await
    }

    pub async fn stream(chunks: &[&str]) -> Self {
        Self::start(MockReply::Stream(
            chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
        ))
        .await
    }

    pub fn hits(&self) -> u32 {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> serde_json::Value {
        self.state.last_body.lock().unwrap().clone().unwrap()
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.state
            .last_headers
            .lock()
            .unwrap()
            .as_ref()?
            .get(name)?
            .to_str()
            .ok()
            .map(str::to_string)
    }
}

async fn handle(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock().unwrap() = serde_json::from_slice(&body).ok();
    *state.last_headers.lock().unwrap() = Some(headers);

    match state.reply {
        MockReply::Json { status, body } => (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        MockReply::Stream(chunks) => {
            let stream = futures_util::stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, Infallible>(Bytes::from(chunk))
            });
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
        MockReply::Delay(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, "{}").into_response()
        }
    }
}
