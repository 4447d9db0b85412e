//! Generation service boundary.
//!
//! [`GenerationService`] is the seam between the question pipeline and the
//! text generation backend: given a model id and a prompt it yields a finite
//! stream of text chunks. [`GeminiService`] is the production implementation
//! over the Gemini `streamGenerateContent` server-sent-events endpoint.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{LlmErrorKind, QuantError, Result};

/// A consume-once stream of text chunks in arrival order.
pub type TextStream = BoxStream<'static, Result<String>>;

/// A backend that turns a prompt into a stream of text chunks.
pub trait GenerationService: Send + Sync {
    /// Opens one streaming generation call.
    ///
    /// The outer future fails if the call cannot be started (connection
    /// refused, non-success status). Failures after the first byte surface as
    /// an `Err` item on the stream.
    fn stream<'a>(&'a self, model_id: &'a str, prompt: &'a str)
        -> BoxFuture<'a, Result<TextStream>>;
}

// ============================================================================
// Gemini
// ============================================================================

/// Streams completions from the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiService {
    /// Creates a client for the endpoint and timeout configured in `config`.
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Creates a client using the API key from the configured environment
    /// variable.
    pub fn from_env(config: &Config) -> Result<Self> {
        let key = config.resolve_api_key()?;
        Self::new(config, key)
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!(
            "{}/models/{model_id}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }

    async fn open(&self, model_id: &str, prompt: &str) -> Result<TextStream> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        debug!(model = model_id, "opening generation stream");
        let response = self
            .client
            .post(self.endpoint(model_id))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = model_id, %status, "generation request rejected");
            return Err(QuantError::llm_api_error(
                LlmErrorKind::from_status(status.as_u16()),
                format!("status {status}: {}", error_message(&body)),
            ));
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(sse_text_stream(bytes))
    }
}

impl GenerationService for GeminiService {
    fn stream<'a>(
        &'a self,
        model_id: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<TextStream>> {
        self.open(model_id, prompt).boxed()
    }
}

/// Extracts `error.message` from a JSON error body, falling back to the raw
/// body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<StreamEvent>(body)
        .ok()
        .and_then(|event| event.error)
        .map_or_else(|| body.trim().to_string(), |e| e.message)
}

// ============================================================================
// Server-sent events
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

/// Incremental decoder for a `text/event-stream` body.
///
/// Bytes are buffered until a full line is available; each `data:` line is
/// decoded as a Gemini response event and its candidate text extracted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns the text of every complete event.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = decode_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<Result<String>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest).into_iter().collect()
    }
}

/// Decodes one line. Returns `None` for blank lines, comments, non-data
/// fields and events that carry no text.
fn decode_line(line: &[u8]) -> Option<Result<String>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(&['\r', '\n'][..]);

    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => return Some(Err(QuantError::stream_decode(format!("{e}: {payload}")))),
    };

    if let Some(error) = event.error {
        return Some(Err(QuantError::llm_api_error(
            LlmErrorKind::from_status(error.code),
            error.message,
        )));
    }

    let text: String = event
        .candidates
        .into_iter()
        .take(1)
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect();

    (!text.is_empty()).then_some(Ok(text))
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

/// Adapts a raw SSE byte stream into a stream of text chunks.
fn sse_text_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> TextStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(&chunk);
                    state.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.push_back(Err(e.into()));
                }
                None => {
                    state.finished = true;
                    let rest = state.decoder.finish();
                    state.pending.extend(rest);
                }
            }
        }
    })
    .boxed()
}
