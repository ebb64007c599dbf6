//! Server-sent event parsing for streamed completions.

use super::transport::classify_transport;
use crate::error::RecognitionError;
use futures_util::{Stream, StreamExt};

/// What to do after handling one `data:` payload.
pub(crate) enum Flow {
    Continue,
    /// The completion sentinel was seen
    Stop,
    /// The stream carried an error event
    Fail(RecognitionError),
}

/// Accumulates raw bytes and yields complete lines.
///
/// Lines are split on `\n` at the byte level before any UTF-8 decoding, so
/// a multi-byte character split across two network chunks is reassembled.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and drain every complete, non-blank line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left after the stream ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Payload of a `data:` line; other SSE fields (`event:`, `id:`) yield `None`.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Feed every `data:` payload of a byte stream to `on_data`.
///
/// Returns once `on_data` signals the sentinel or the stream ends. A clean
/// end without a sentinel is accepted with a warning; a transport error
/// mid-stream fails the call.
pub(crate) async fn read_events<S, B, F>(stream: S, mut on_data: F) -> Result<(), RecognitionError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
    F: FnMut(&str) -> Flow,
{
    let mut stream = std::pin::pin!(stream);
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify_transport(&e))?;
        for line in lines.push(chunk.as_ref()) {
            if let Some(done) = dispatch(&line, &mut on_data) {
                return done;
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(done) = dispatch(&line, &mut on_data) {
            return done;
        }
    }

    tracing::warn!("Stream ended without a completion marker");
    Ok(())
}

fn dispatch<F>(line: &str, on_data: &mut F) -> Option<Result<(), RecognitionError>>
where
    F: FnMut(&str) -> Flow,
{
    let data = data_payload(line)?;
    match on_data(data) {
        Flow::Continue => None,
        Flow::Stop => Some(Ok(())),
        Flow::Fail(e) => Some(Err(e)),
    }
}
