//! The seam between the conversation driver and whatever talks to the model.
//!
//! A transport takes the full outbound message list and returns a lazy,
//! single-consumption stream of text fragments. It may fail before the stream
//! starts or at any point while it is being drained.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
}

impl OutboundMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One streaming completion request. `messages` starts with the system
/// instruction, followed by prior history and the new user text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<OutboundMessage>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("provider error: {0}")]
    Provider(String),
}

/// Ordered text fragments, terminated by the end of the stream.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[async_trait]
pub trait AssistantTransport: Send + Sync {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, TransportError>;
}

// ── Scripted transport ──────────────────────────────────────────────

/// Plays back a fixed script instead of calling a model. Records every
/// request it receives.
pub struct ScriptedTransport {
    script: Script,
    requests: parking_lot::Mutex<Vec<ChatRequest>>,
}

#[derive(Debug, Clone)]
enum Script {
    Chunks(Vec<String>),
    FailBeforeStream(TransportError),
    FailAfter(Vec<String>, TransportError),
}

impl ScriptedTransport {
    /// Stream `chunks` in order, then complete.
    pub fn replying<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::Chunks(chunks.into_iter().map(Into::into).collect()))
    }

    /// Fail the call itself; no stream is produced.
    pub fn failing(error: TransportError) -> Self {
        Self::with_script(Script::FailBeforeStream(error))
    }

    /// Stream `chunks`, then fail mid-stream.
    pub fn failing_after<I, S>(chunks: I, error: TransportError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_script(Script::FailAfter(
            chunks.into_iter().map(Into::into).collect(),
            error,
        ))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AssistantTransport for ScriptedTransport {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, TransportError> {
        self.requests.lock().push(request.clone());
        let items: Vec<Result<String, TransportError>> = match &self.script {
            Script::Chunks(chunks) => chunks.iter().cloned().map(Ok).collect(),
            Script::FailBeforeStream(e) => return Err(e.clone()),
            Script::FailAfter(chunks, e) => chunks
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(e.clone())))
                .collect(),
        };
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}
