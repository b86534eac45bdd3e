use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;

use crate::extract::extract;
use crate::model::{Sender, VisualParameters};
use crate::prompt::{build_messages, FALLBACK_MESSAGE};
use crate::settings::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::store::SceneStore;
use crate::transport::{AssistantTransport, ChatRequest, TransportError};

// ── ChatEmitter trait ────────────────────────────────────────────

/// Abstraction over progress reporting so a turn runs the same under any
/// front end.
pub trait ChatEmitter: Send + Sync {
    fn emit_token(&self, text: &str);
    fn emit_thinking(&self, thinking: bool);
    fn emit_scene_updated(&self, params: &VisualParameters);
    fn emit_error(&self, message: &str);
    fn emit_complete(&self);
}

/// No-op emitter for callers that only want the returned outcome.
pub struct NoopChatEmitter;

impl ChatEmitter for NoopChatEmitter {
    fn emit_token(&self, _text: &str) {}
    fn emit_thinking(&self, _thinking: bool) {}
    fn emit_scene_updated(&self, _params: &VisualParameters) {}
    fn emit_error(&self, _message: &str) {}
    fn emit_complete(&self) {}
}

// ── Types ────────────────────────────────────────────────────────

/// Why a turn was refused before anything happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnRejected {
    #[error("message is empty")]
    EmptyInput,
    #[error("a turn is already in progress")]
    Busy,
}

/// How a completed turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The reply carried a valid payload and the parameters were replaced.
    Applied(VisualParameters),
    /// The reply was recorded but carried no usable payload.
    NoUpdate,
    /// The transport failed; the fallback message was recorded instead.
    TransportFailed(TransportError),
}

/// Clears the in-progress flag however the turn ends, including when the
/// turn future is dropped mid-stream.
struct InProgressGuard<'a> {
    store: &'a SceneStore,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.store.set_in_progress(false);
    }
}

// ── Conversation driver ──────────────────────────────────────────

/// Runs one conversational turn at a time against a shared store.
pub struct ConversationDriver {
    store: Arc<SceneStore>,
    transport: Arc<dyn AssistantTransport>,
    temperature: f64,
    max_tokens: u32,
}

impl ConversationDriver {
    pub fn new(store: Arc<SceneStore>, transport: Arc<dyn AssistantTransport>) -> Self {
        Self {
            store,
            transport,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }

    /// Send `user_text` to the assistant and apply whatever comes back.
    ///
    /// A rejected call leaves the store untouched. Once accepted, the turn
    /// always ends with an assistant message recorded and in-progress cleared.
    pub async fn run_turn(
        &self,
        user_text: &str,
        emitter: &dyn ChatEmitter,
    ) -> Result<TurnOutcome, TurnRejected> {
        if user_text.trim().is_empty() {
            return Err(TurnRejected::EmptyInput);
        }
        if !self.store.try_begin_turn() {
            log::debug!("Rejecting turn: another is in progress");
            return Err(TurnRejected::Busy);
        }
        let _guard = InProgressGuard { store: &self.store };

        let history = self.store.messages();
        self.store.append_message(Sender::User, user_text);

        let request = ChatRequest {
            messages: build_messages(&history, user_text),
            stream: true,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        log::info!("Starting turn with {} prior messages", history.len());

        emitter.emit_thinking(true);
        let mut reply = String::new();
        let streamed = self.stream_reply(&request, emitter, &mut reply).await;
        emitter.emit_thinking(false);

        let outcome = match streamed {
            Err(e) => {
                log::error!("Assistant transport failed: {e}");
                self.store.append_message(Sender::Assistant, FALLBACK_MESSAGE);
                emitter.emit_error(&e.to_string());
                TurnOutcome::TransportFailed(e)
            }
            Ok(()) => {
                let parsed = extract(&reply);
                self.store.append_message(Sender::Assistant, reply);
                match parsed {
                    Some(params) => {
                        self.store.replace_parameters(params.clone());
                        emitter.emit_scene_updated(&params);
                        log::info!("Applied new scene parameters: {:?}", params.text);
                        TurnOutcome::Applied(params)
                    }
                    None => {
                        log::info!("Reply carried no scene update");
                        TurnOutcome::NoUpdate
                    }
                }
            }
        };

        emitter.emit_complete();
        Ok(outcome)
    }

    /// Drain the transport into `reply`, fragment by fragment in arrival order.
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        emitter: &dyn ChatEmitter,
        reply: &mut String,
    ) -> Result<(), TransportError> {
        let mut stream = self.transport.stream_chat(request).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            emitter.emit_token(&fragment);
            reply.push_str(&fragment);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::prompt::SYSTEM_PROMPT;
    use crate::transport::{Role, ScriptedTransport, TextStream};

    const PAYLOAD: &str = r##"{"text":"NEON","subtitle":"city nights","color":{"primary":"#1a0033","accent":"#ff00ff","glow":"#00ffff"},"material":{"transparency":0.8,"roughness":0.1,"metalness":0.3,"refractiveIndex":1.5},"animation":{"rotationSpeed":0.04,"floatAmplitude":0.3,"floatSpeed":0.005},"pattern":{"type":"circuit","density":0.7,"movement":"pulsing"},"lighting":{"ambient":0.3,"directional":1.2,"spotlightColor":"#ff00ff"}}"##;

    #[derive(Default)]
    struct RecordingEmitter {
        events: Mutex<Vec<String>>,
    }

    impl RecordingEmitter {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl ChatEmitter for RecordingEmitter {
        fn emit_token(&self, text: &str) {
            self.events.lock().push(format!("token:{text}"));
        }
        fn emit_thinking(&self, thinking: bool) {
            self.events.lock().push(format!("thinking:{thinking}"));
        }
        fn emit_scene_updated(&self, params: &VisualParameters) {
            self.events.lock().push(format!("scene:{}", params.text));
        }
        fn emit_error(&self, _message: &str) {
            self.events.lock().push("error".into());
        }
        fn emit_complete(&self) {
            self.events.lock().push("complete".into());
        }
    }

    /// Yields one fragment, then never finishes.
    struct StallingTransport;

    #[async_trait]
    impl AssistantTransport for StallingTransport {
        async fn stream_chat(&self, _request: &ChatRequest) -> Result<TextStream, TransportError> {
            let head = futures_util::stream::iter(vec![Ok("{\"te".to_string())]);
            Ok(Box::pin(head.chain(futures_util::stream::pending())))
        }
    }

    fn driver(transport: Arc<dyn AssistantTransport>) -> ConversationDriver {
        ConversationDriver::new(Arc::new(SceneStore::in_memory()), transport)
    }

    #[tokio::test]
    async fn transport_error_records_fallback() {
        let d = driver(Arc::new(ScriptedTransport::failing(TransportError::Request(
            "offline".into(),
        ))));
        let before = d.store().parameters();
        let emitter = RecordingEmitter::default();

        let outcome = d.run_turn("sunset", &emitter).await.unwrap();

        assert!(matches!(outcome, TurnOutcome::TransportFailed(_)));
        let state = d.store().snapshot();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].sender, Sender::User);
        assert_eq!(state.messages[0].content, "sunset");
        assert_eq!(state.messages[1].sender, Sender::Assistant);
        assert_eq!(state.messages[1].content, FALLBACK_MESSAGE);
        assert_eq!(*d.store().parameters(), *before);
        assert!(!state.in_progress);
        assert!(emitter.events().contains(&"error".to_string()));
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_partial_text() {
        let d = driver(Arc::new(ScriptedTransport::failing_after(
            ["{\"text\":", "\"HAL"],
            TransportError::Stream("reset".into()),
        )));
        let outcome = d.run_turn("sunset", &NoopChatEmitter).await.unwrap();
        assert!(matches!(outcome, TurnOutcome::TransportFailed(TransportError::Stream(_))));
        let messages = d.store().messages();
        assert_eq!(messages[1].content, FALLBACK_MESSAGE);
        assert!(!d.store().in_progress());
    }

    #[tokio::test]
    async fn prose_reply_is_recorded_without_update() {
        let d = driver(Arc::new(ScriptedTransport::replying(["I love ", "that idea!"])));
        let before = d.store().parameters();

        let outcome = d.run_turn("make it pop", &NoopChatEmitter).await.unwrap();

        assert_eq!(outcome, TurnOutcome::NoUpdate);
        let messages = d.store().messages();
        assert_eq!(messages[1].content, "I love that idea!");
        assert_eq!(*d.store().parameters(), *before);
        assert!(!d.store().in_progress());
    }

    #[tokio::test]
    async fn valid_reply_replaces_parameters() {
        let chunks: Vec<String> = PAYLOAD
            .as_bytes()
            .chunks(17)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let d = driver(Arc::new(ScriptedTransport::replying(chunks)));
        let emitter = RecordingEmitter::default();

        let outcome = d.run_turn("cyberpunk", &emitter).await.unwrap();

        let TurnOutcome::Applied(params) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(params.text, "NEON");
        assert_eq!(*d.store().parameters(), params);
        assert_eq!(d.store().messages()[1].content, PAYLOAD);

        let events = emitter.events();
        assert_eq!(events.first().map(String::as_str), Some("thinking:true"));
        assert_eq!(events.last().map(String::as_str), Some("complete"));
        assert!(events.contains(&"scene:NEON".to_string()));
    }

    #[tokio::test]
    async fn out_of_range_reply_is_not_applied() {
        let bad = PAYLOAD.replace("\"floatAmplitude\":0.3", "\"floatAmplitude\":5");
        let d = driver(Arc::new(ScriptedTransport::replying([bad.clone()])));
        let outcome = d.run_turn("bigger", &NoopChatEmitter).await.unwrap();
        assert_eq!(outcome, TurnOutcome::NoUpdate);
        assert_eq!(d.store().messages()[1].content, bad);
        assert_eq!(*d.store().parameters(), VisualParameters::default());
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_side_effects() {
        let transport = Arc::new(ScriptedTransport::replying(["x"]));
        let d = driver(transport.clone());
        assert_eq!(
            d.run_turn("   \n", &NoopChatEmitter).await,
            Err(TurnRejected::EmptyInput)
        );
        assert!(d.store().messages().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn busy_store_rejects_second_turn() {
        let transport = Arc::new(ScriptedTransport::replying(["x"]));
        let d = driver(transport.clone());
        assert!(d.store().try_begin_turn());
        assert_eq!(
            d.run_turn("hello", &NoopChatEmitter).await,
            Err(TurnRejected::Busy)
        );
        assert!(d.store().messages().is_empty());
        assert!(d.store().in_progress());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn request_carries_prompt_history_and_sampling() {
        let transport = Arc::new(ScriptedTransport::replying(["ok"]));
        let d = driver(transport.clone()).with_sampling(0.5, 300);
        d.run_turn("first", &NoopChatEmitter).await.unwrap();
        d.run_turn("second", &NoopChatEmitter).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let last = &requests[1];
        assert!(last.stream);
        assert!((last.temperature - 0.5).abs() < f64::EPSILON);
        assert_eq!(last.max_tokens, 300);
        let roles: Vec<Role> = last.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(last.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(last.messages[1].content, "first");
        assert_eq!(last.messages[2].content, "ok");
        assert_eq!(last.messages[3].content, "second");
    }

    #[tokio::test]
    async fn dropped_turn_clears_in_progress() {
        let d = driver(Arc::new(StallingTransport));
        let result =
            tokio::time::timeout(Duration::from_millis(50), d.run_turn("hi", &NoopChatEmitter))
                .await;
        assert!(result.is_err());
        assert!(!d.store().in_progress());
        // Only the user message was written.
        assert_eq!(d.store().messages().len(), 1);
    }
}
