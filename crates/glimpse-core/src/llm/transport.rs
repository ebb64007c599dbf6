//! HTTP plumbing shared by the adapters.
//!
//! Every failure mode of a provider call (transport errors, non-2xx
//! statuses, unparseable bodies) is mapped onto [`RecognitionError`] here
//! so the adapters only deal with the happy path.

use crate::error::RecognitionError;
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::io;

/// Send a request and return the response if its status is 2xx.
///
/// Non-2xx bodies are drained exactly once and interpreted by [`status_error`].
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, RecognitionError> {
    let resp = request.send().await.map_err(|e| classify_transport(&e))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("HTTP {status}: {body}");
    Err(status_error(status.as_u16(), &body))
}

/// Read a success body and parse it as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, RecognitionError> {
    let bytes = resp.bytes().await.map_err(|e| classify_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| RecognitionError::InvalidResponse(e.to_string()))
}

/// Map a reqwest error onto the user-facing error taxonomy.
pub(crate) fn classify_transport(err: &reqwest::Error) -> RecognitionError {
    if err.is_timeout() {
        return RecognitionError::Timeout;
    }
    classify_error_chain(err).unwrap_or_else(|| RecognitionError::Network(err.to_string()))
}

/// Walk an error's source chain looking for a recognizable cause.
pub(crate) fn classify_error_chain(err: &(dyn StdError + 'static)) -> Option<RecognitionError> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::ConnectionAborted => {
                    return Some(RecognitionError::Timeout)
                }
                io::ErrorKind::ConnectionRefused => {
                    return Some(RecognitionError::ConnectionRefused)
                }
                io::ErrorKind::ConnectionReset => {
                    return Some(RecognitionError::ConnectionReset)
                }
                _ => {}
            }
        }

        let message = e.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return Some(RecognitionError::Dns);
        }

        current = e.source();
    }
    None
}

/// Map a non-2xx status and its body onto a [`RecognitionError`].
pub(crate) fn status_error(status: u16, body: &str) -> RecognitionError {
    match status {
        400 => {
            RecognitionError::BadRequest(server_message(body).unwrap_or_else(|| body.to_string()))
        }
        401 => RecognitionError::Unauthorized,
        403 => RecognitionError::Forbidden,
        404 => RecognitionError::NotFound,
        429 => RecognitionError::RateLimited,
        _ => RecognitionError::Server {
            status,
            message: server_message(body).unwrap_or_else(|| body.to_string()),
        },
    }
}

/// Extract `error.message` from a JSON error body, if present.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Strip leading brace artifacts some gateways prepend to the reply.
pub fn clean_response_content(content: &str) -> String {
    let mut cleaned = content.trim_start();
    loop {
        let next = cleaned
            .strip_prefix("{{")
            .or_else(|| cleaned.strip_prefix("}}"))
            .or_else(|| cleaned.strip_prefix('{'))
            .or_else(|| cleaned.strip_prefix('}'));
        match next {
            Some(rest) => cleaned = rest.trim_start(),
            None => return cleaned.to_string(),
        }
    }
}
