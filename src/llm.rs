//! HTTP transport for Anthropic and OpenAI-compatible streaming chat APIs.
//!
//! Both providers answer with server-sent events. The decoder here is
//! provider-agnostic; [`decode_event`] maps one event to a text fragment.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::error::AppError;
use crate::settings::{LlmProvider, LlmProviderConfig};
use crate::transport::{AssistantTransport, ChatRequest, Role, TextStream, TransportError};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

/// Resolved provider details ready for making an API call.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub provider: LlmProvider,
}

impl ResolvedProvider {
    /// Resolve a provider config into concrete URL / key / model values.
    pub fn from_config(config: &LlmProviderConfig) -> Result<Self, AppError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AppError::NoApiKey)?
            .to_string();

        match config.provider {
            LlmProvider::Anthropic => {
                let url = config.base_url.as_deref().map_or_else(
                    || ANTHROPIC_URL.to_string(),
                    |base| format!("{}/v1/messages", base.trim_end_matches('/')),
                );
                Ok(Self {
                    url,
                    api_key,
                    model: config
                        .model
                        .clone()
                        .unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string()),
                    provider: LlmProvider::Anthropic,
                })
            }
            LlmProvider::OpenAiCompatible => {
                let base = config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE);
                let base = base.trim_end_matches('/');
                Ok(Self {
                    url: format!("{base}/chat/completions"),
                    api_key,
                    model: config
                        .model
                        .clone()
                        .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
                    provider: LlmProvider::OpenAiCompatible,
                })
            }
        }
    }
}

/// Build the JSON body for the resolved provider.
pub fn request_body(provider: &ResolvedProvider, request: &ChatRequest) -> Value {
    match provider.provider {
        LlmProvider::Anthropic => anthropic_body(provider, request),
        LlmProvider::OpenAiCompatible => openai_body(provider, request),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// ── Anthropic ────────────────────────────────────────────────────

/// Anthropic takes the system instruction as a top-level field, not a message.
fn anthropic_body(provider: &ResolvedProvider, request: &ChatRequest) -> Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let messages: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| serde_json::json!({ "role": role_name(m.role), "content": m.content }))
        .collect();

    serde_json::json!({
        "model": provider.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": request.stream,
        "system": system.join("\n\n"),
        "messages": messages,
    })
}

fn anthropic_delta(data: &Value) -> Result<Delta, TransportError> {
    match data.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(data
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map_or(Delta::Skip, |t| Delta::Text(t.to_string()))),
        Some("message_stop") => Ok(Delta::Done),
        Some("error") => Err(TransportError::Provider(
            data.pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )),
        _ => Ok(Delta::Skip),
    }
}

// ── OpenAI-compatible ────────────────────────────────────────────

fn openai_body(provider: &ResolvedProvider, request: &ChatRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| serde_json::json!({ "role": role_name(m.role), "content": m.content }))
        .collect();

    serde_json::json!({
        "model": provider.model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": request.stream,
        "messages": messages,
    })
}

fn openai_delta(data: &Value) -> Result<Delta, TransportError> {
    if let Some(err) = data.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| err.to_string(), str::to_string);
        return Err(TransportError::Provider(message));
    }
    Ok(data
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map_or(Delta::Skip, |t| Delta::Text(t.to_string())))
}

// ── SSE decoding ─────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Splits a byte stream into SSE events. Partial lines are held until the
/// next chunk so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    leftover: Vec<u8>,
    event_name: Option<String>,
    data_buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.leftover.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline_pos) = self.leftover.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.leftover.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                // Empty line = end of SSE event
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event_name = Some(value.to_string()),
                "data" => {
                    if !self.data_buf.is_empty() {
                        self.data_buf.push('\n');
                    }
                    self.data_buf.push_str(value);
                }
                _ => {}
            }
        }
        events
    }

    /// Flush an event left unterminated when the body ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let mut tail = self.push(b"\n");
        tail.pop().or_else(|| self.dispatch())
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event_name.take();
        if self.data_buf.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data_buf),
        })
    }
}

/// What one SSE event contributes to the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Text(String),
    Done,
    Skip,
}

/// Map one event to a text fragment, end-of-stream, or nothing.
pub fn decode_event(provider: LlmProvider, event: &SseEvent) -> Result<Delta, TransportError> {
    let data = event.data.trim();
    if data == "[DONE]" {
        return Ok(Delta::Done);
    }
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        log::debug!("Skipping non-JSON SSE data: {data}");
        return Ok(Delta::Skip);
    };
    match provider {
        LlmProvider::Anthropic => anthropic_delta(&json),
        LlmProvider::OpenAiCompatible => openai_delta(&json),
    }
}

// ── Transport ────────────────────────────────────────────────────

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, TransportError>>,
    provider: LlmProvider,
    finished: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            if self.finished {
                return;
            }
            match decode_event(self.provider, &event) {
                Ok(Delta::Text(text)) if !text.is_empty() => self.pending.push_back(Ok(text)),
                Ok(Delta::Text(_) | Delta::Skip) => {}
                Ok(Delta::Done) => self.finished = true,
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a raw SSE byte stream into ordered text fragments.
fn text_stream(body: ByteStream, provider: LlmProvider) -> TextStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        provider,
        finished: false,
    };
    Box::pin(futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let events = st.decoder.push(&bytes);
                    st.absorb(events);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    let tail: Vec<SseEvent> = st.decoder.finish().into_iter().collect();
                    st.absorb(tail);
                    if !st.finished {
                        // No end-of-message marker: the reply was cut off.
                        st.pending.push_back(Err(TransportError::Stream(
                            "stream ended before completion".into(),
                        )));
                        st.finished = true;
                    }
                }
            }
        }
    }))
}

/// [`AssistantTransport`] backed by a real provider over HTTPS.
pub struct HttpTransport {
    client: reqwest::Client,
    provider: ResolvedProvider,
}

impl HttpTransport {
    pub fn new(config: &LlmProviderConfig) -> Result<Self, AppError> {
        let provider = ResolvedProvider::from_config(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::ApiError {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, provider })
    }

    fn build_request(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
        let body = request_body(&self.provider, request);
        let builder = self
            .client
            .post(&self.provider.url)
            .header("content-type", "application/json");
        let builder = match self.provider.provider {
            LlmProvider::Anthropic => builder
                .header("x-api-key", &self.provider.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            LlmProvider::OpenAiCompatible => {
                builder.header("Authorization", format!("Bearer {}", self.provider.api_key))
            }
        };
        builder.json(&body)
    }
}

#[async_trait]
impl AssistantTransport for HttpTransport {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, TransportError> {
        log::debug!(
            "Sending {} messages to {} ({})",
            request.messages.len(),
            self.provider.url,
            self.provider.model
        );
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ByteStream = Box::pin(response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|e| TransportError::Stream(e.to_string()))
        }));
        Ok(text_stream(body, self.provider.provider))
    }
}
