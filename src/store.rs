//! The scene state store: single point of truth for the transcript, the
//! target visual parameters and the in-progress flag.
//!
//! Readers get owned snapshots (or a cheap `Arc` of the parameters for the
//! frame loop); writers go through the handful of mutation methods below,
//! each of which writes the (history, parameters) pair through to storage and
//! then notifies subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use ts_rs::TS;

use crate::model::{ConversationMessage, MessageId, Sender, VisualParameters};
use crate::storage::{MemoryStorage, PersistedState, StateStorage};
use crate::validate::validate;

/// Name of the durable slot the conversation state lives under.
pub const STATE_SLOT: &str = "ai-3d-chat-storage";

// ── Snapshot & change types ─────────────────────────────────────────

/// Owned, read-only view of the store at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ConversationState {
    pub messages: Vec<ConversationMessage>,
    pub scene_params: VisualParameters,
    pub in_progress: bool,
}

/// What changed, delivered to subscribers after the change is visible.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    MessageAppended(ConversationMessage),
    InProgressChanged(bool),
    ParametersReplaced(Arc<VisualParameters>),
}

/// Receives change notifications. Called outside the store's locks, so
/// listeners may read the store.
pub trait StoreListener: Send + Sync {
    fn on_change(&self, change: &StoreChange);
}

impl<F> StoreListener for F
where
    F: Fn(&StoreChange) + Send + Sync,
{
    fn on_change(&self, change: &StoreChange) {
        self(change);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ── Store ───────────────────────────────────────────────────────────

/// Highest id the millisecond clock can produce.
const MAX_CLOCK_ID: u64 = i64::MAX.unsigned_abs();

/// Persisted ids must be strictly increasing and within clock range. A
/// transcript that breaks either rule is renumbered from 1 in stored order.
fn renumber_if_needed(mut messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    let ordered = messages.windows(2).all(|w| matches!(w, [a, b] if a.id < b.id));
    let in_range = messages.iter().all(|m| m.id.0 <= MAX_CLOCK_ID);
    if ordered && in_range {
        return messages;
    }
    warn!("Saved message ids are out of order or out of range, renumbering {} messages", messages.len());
    for (id, message) in (1..).zip(messages.iter_mut()) {
        message.id = MessageId(id);
    }
    messages
}

struct Inner {
    messages: Vec<ConversationMessage>,
    params: Arc<VisualParameters>,
    in_progress: bool,
    last_id: u64,
}

pub struct SceneStore {
    inner: RwLock<Inner>,
    storage: Box<dyn StateStorage>,
    /// Serialises write-through so the last save always carries the latest state.
    persist_lock: Mutex<()>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn StoreListener>)>>,
    next_subscription: AtomicU64,
}

impl SceneStore {
    /// Construct the store, rehydrating history and parameters from `storage`.
    ///
    /// Unreadable state or parameters that no longer validate fall back to
    /// the defaults; the in-progress flag always starts false.
    pub fn open(storage: Box<dyn StateStorage>) -> Self {
        let persisted = match storage.load() {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load saved conversation state, starting fresh: {e}");
                None
            }
        };

        let (messages, params) = match persisted {
            Some(state) => {
                let params = match validate(&state.scene_params) {
                    Ok(params) => params,
                    Err(e) => {
                        warn!("Saved scene parameters are invalid, using defaults: {e}");
                        VisualParameters::default()
                    }
                };
                (state.messages, params)
            }
            None => (Vec::new(), VisualParameters::default()),
        };

        let messages = renumber_if_needed(messages);
        let last_id = messages.last().map_or(0, |m| m.id.0);
        info!("Scene store opened with {} messages", messages.len());

        Self {
            inner: RwLock::new(Inner {
                messages,
                params: Arc::new(params),
                in_progress: false,
                last_id,
            }),
            storage,
            persist_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// A store backed by [`MemoryStorage`], starting from defaults.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStorage::new()))
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> ConversationState {
        let inner = self.inner.read();
        ConversationState {
            messages: inner.messages.clone(),
            scene_params: VisualParameters::clone(&inner.params),
            in_progress: inner.in_progress,
        }
    }

    /// Current target parameters. Cheap enough to call every frame.
    pub fn parameters(&self) -> Arc<VisualParameters> {
        Arc::clone(&self.inner.read().params)
    }

    pub fn messages(&self) -> Vec<ConversationMessage> {
        self.inner.read().messages.clone()
    }

    pub fn in_progress(&self) -> bool {
        self.inner.read().in_progress
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Append a message with a fresh id and the current timestamp.
    pub fn append_message(&self, sender: Sender, content: impl Into<String>) -> ConversationMessage {
        let now = chrono::Utc::now().timestamp_millis();
        let message = {
            let mut inner = self.inner.write();
            // Millisecond clock as the id base, bumped when two messages share a tick.
            let id = u64::try_from(now).unwrap_or(0).max(inner.last_id.saturating_add(1));
            inner.last_id = id;
            let message = ConversationMessage {
                id: MessageId(id),
                sender,
                content: content.into(),
                timestamp: now,
            };
            inner.messages.push(message.clone());
            message
        };
        debug!("Appended {:?} message {}", message.sender, message.id.0);
        self.persist();
        self.notify(&StoreChange::MessageAppended(message.clone()));
        message
    }

    pub fn set_in_progress(&self, in_progress: bool) {
        self.inner.write().in_progress = in_progress;
        self.persist();
        self.notify(&StoreChange::InProgressChanged(in_progress));
    }

    /// Set the in-progress flag only if it is currently clear.
    /// Returns false (and changes nothing) when a turn is already running.
    pub fn try_begin_turn(&self) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.in_progress {
                return false;
            }
            inner.in_progress = true;
        }
        self.persist();
        self.notify(&StoreChange::InProgressChanged(true));
        true
    }

    /// Swap in new target parameters. Callers must pass a validated value.
    pub fn replace_parameters(&self, params: VisualParameters) {
        let params = Arc::new(params);
        self.inner.write().params = Arc::clone(&params);
        self.persist();
        self.notify(&StoreChange::ParametersReplaced(params));
    }

    // ── Subscriptions ───────────────────────────────────────────────

    pub fn subscribe(&self, listener: Arc<dyn StoreListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    // ── Internals ───────────────────────────────────────────────────

    fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let state = {
            let inner = self.inner.read();
            PersistedState {
                messages: inner.messages.clone(),
                scene_params: match serde_json::to_value(&*inner.params) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Failed to encode scene parameters: {e}");
                        return;
                    }
                },
            }
        };
        if let Err(e) = self.storage.save(&state) {
            warn!("Failed to persist conversation state: {e}");
        }
    }

    fn notify(&self, change: &StoreChange) {
        let listeners: Vec<Arc<dyn StoreListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener.on_change(change);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::PatternKind;
    use crate::storage::{JsonFileStorage, StorageError};

    fn particles() -> VisualParameters {
        let mut params = VisualParameters::default();
        params.text = "ALEX".into();
        params.pattern.kind = PatternKind::Particles;
        params
    }

    #[test]
    fn starts_from_defaults() {
        let store = SceneStore::in_memory();
        let snap = store.snapshot();
        assert!(snap.messages.is_empty());
        assert_eq!(snap.scene_params, VisualParameters::default());
        assert!(!snap.in_progress);
    }

    #[test]
    fn message_ids_are_unique_and_increasing() {
        let store = SceneStore::in_memory();
        let ids: Vec<u64> = (0..50)
            .map(|i| store.append_message(Sender::User, format!("m{i}")).id.0)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.messages().len(), 50);
        assert_eq!(store.messages()[3].content, "m3");
    }

    #[test]
    fn every_mutation_writes_through() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SceneStore::open(Box::new(SharedStorage(Arc::clone(&storage))));

        store.append_message(Sender::User, "hello");
        store.set_in_progress(true);
        store.replace_parameters(particles());
        assert_eq!(storage.save_count(), 3);

        let saved = storage.saved().unwrap();
        assert_eq!(saved.messages.len(), 1);
        assert_eq!(saved.scene_params["text"], "ALEX");
    }

    #[test]
    fn rehydrates_history_and_parameters_but_not_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SceneStore::open(Box::new(JsonFileStorage::new(dir.path(), STATE_SLOT)));
            store.append_message(Sender::User, "sunset please");
            store.append_message(Sender::Assistant, "{...}");
            store.replace_parameters(particles());
            store.set_in_progress(true);
        }

        let store = SceneStore::open(Box::new(JsonFileStorage::new(dir.path(), STATE_SLOT)));
        let snap = store.snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].content, "sunset please");
        assert_eq!(snap.scene_params, particles());
        assert!(!snap.in_progress);

        // Ids keep increasing past the rehydrated ones.
        let next = store.append_message(Sender::User, "again");
        assert!(next.id > snap.messages[1].id);
    }

    #[test]
    fn saved_ids_at_the_top_of_the_range_are_renumbered() {
        let message = |id: u64, content: &str| ConversationMessage {
            id: MessageId(id),
            sender: Sender::User,
            content: content.into(),
            timestamp: 0,
        };
        let storage = MemoryStorage::with_state(PersistedState {
            messages: vec![message(7, "first"), message(u64::MAX, "second")],
            scene_params: serde_json::to_value(VisualParameters::default()).unwrap(),
        });
        let store = SceneStore::open(Box::new(storage));

        let next = store.append_message(Sender::Assistant, "third");
        let messages = store.messages();
        let ids: Vec<u64> = messages.iter().map(|m| m.id.0).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
        assert_eq!(messages[1].content, "second");
        assert_eq!(messages.last().unwrap().id, next.id);
        assert!(next.id.0 < u64::MAX);
    }

    #[test]
    fn out_of_order_saved_ids_are_renumbered() {
        let message = |id: u64| ConversationMessage {
            id: MessageId(id),
            sender: Sender::User,
            content: id.to_string(),
            timestamp: 0,
        };
        let storage = MemoryStorage::with_state(PersistedState {
            messages: vec![message(30), message(30), message(10)],
            scene_params: serde_json::Value::Null,
        });
        let store = SceneStore::open(Box::new(storage));
        let ids: Vec<u64> = store.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(store.messages()[2].content, "10");
    }

    #[test]
    fn invalid_saved_parameters_fall_back_to_defaults() {
        let mut params = serde_json::to_value(particles()).unwrap();
        params["animation"]["rotationSpeed"] = serde_json::json!(5.0);
        let storage = MemoryStorage::with_state(PersistedState {
            messages: Vec::new(),
            scene_params: params,
        });
        let store = SceneStore::open(Box::new(storage));
        assert_eq!(*store.parameters(), VisualParameters::default());
    }

    #[test]
    fn unreadable_storage_starts_fresh() {
        struct Broken;
        impl StateStorage for Broken {
            fn load(&self) -> Result<Option<PersistedState>, StorageError> {
                Err(StorageError::Io(std::io::Error::other("disk on fire")))
            }
            fn save(&self, _state: &PersistedState) -> Result<(), StorageError> {
                Err(StorageError::Io(std::io::Error::other("disk on fire")))
            }
        }

        let store = SceneStore::open(Box::new(Broken));
        // Save failures are logged, never surfaced.
        store.append_message(Sender::User, "still works");
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn try_begin_turn_is_single_flight() {
        let store = SceneStore::in_memory();
        assert!(store.try_begin_turn());
        assert!(!store.try_begin_turn());
        store.set_in_progress(false);
        assert!(store.try_begin_turn());
    }

    #[test]
    fn parameter_reads_see_whole_values() {
        let store = SceneStore::in_memory();
        let before = store.parameters();
        store.replace_parameters(particles());
        let after = store.parameters();
        assert_eq!(*before, VisualParameters::default());
        assert_eq!(*after, particles());
    }

    #[test]
    fn subscribers_are_notified_until_unsubscribed() {
        let store = SceneStore::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store.subscribe(Arc::new(move |change: &StoreChange| {
            sink.lock().push(change.clone());
        }));

        store.set_in_progress(true);
        store.replace_parameters(particles());
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.append_message(Sender::User, "unheard");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], StoreChange::InProgressChanged(true));
        assert!(matches!(&seen[1], StoreChange::ParametersReplaced(p) if p.text == "ALEX"));
    }

    #[test]
    fn listeners_may_read_the_store() {
        let store = Arc::new(SceneStore::in_memory());
        let reader = Arc::clone(&store);
        let observed = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&observed);
        store.subscribe(Arc::new(move |_: &StoreChange| {
            *sink.lock() = reader.messages().len();
        }));
        store.append_message(Sender::User, "hi");
        assert_eq!(*observed.lock(), 1);
    }

    /// Lets a test keep a handle on the storage the store owns.
    struct SharedStorage(Arc<MemoryStorage>);

    impl StateStorage for SharedStorage {
        fn load(&self) -> Result<Option<PersistedState>, StorageError> {
            self.0.load()
        }
        fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
            self.0.save(state)
        }
    }
}
