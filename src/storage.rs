//! Durable storage for the conversation state.
//!
//! The scene store writes the (history, parameters) pair through a
//! [`StateStorage`] on every mutation and reads it once at startup.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ConversationMessage;

/// Persisted envelope version.
pub const STATE_VERSION: u32 = 1;

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Persisted shape ─────────────────────────────────────────────────

/// What survives a restart. Parameters are kept as raw JSON so that the store
/// can run them back through the validator on rehydration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub scene_params: Value,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    state: PersistedState,
}

/// Persistence backend for one named slot.
pub trait StateStorage: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedState>, StorageError>;
    fn save(&self, state: &PersistedState) -> Result<(), StorageError>;
}

// ── File backend ────────────────────────────────────────────────────

/// Stores the slot as `<dir>/<slot>.json`.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: &Path, slot: &str) -> Self {
        Self {
            path: crate::paths::state_slot_path(dir, slot),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<PersistedState>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let envelope: Envelope = read_json(&self.path)?;
        if envelope.version != STATE_VERSION {
            log::warn!(
                "State slot {} has version {}, expected {STATE_VERSION}; loading anyway",
                self.path.display(),
                envelope.version
            );
        }
        Ok(Some(envelope.state))
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_json(
            &self.path,
            &Envelope {
                version: STATE_VERSION,
                state: state.clone(),
            },
        )
    }
}

// ── Memory backend ──────────────────────────────────────────────────

/// Keeps the last saved state in memory. Useful for tests and for hosts
/// that manage persistence themselves.
#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        Self {
            slot: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Option<PersistedState> {
        self.slot.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedState>, StorageError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        *self.slot.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// 1. Acquires a per-file mutex so concurrent callers don't race on the `.tmp` file
/// 2. Writes data to a `.tmp` sibling file and `fsync`s it
/// 3. Renames the `.tmp` file over the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let lock = FILE_LOCKS
        .lock()
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock();

    let file_name = path.file_name().unwrap_or_default();
    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}
