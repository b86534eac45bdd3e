use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::animation::SmoothingMode;
use crate::storage::{atomic_write, read_json, write_json, StorageError};

/// Takes precedence over the credentials file when set and non-empty.
pub const API_KEY_ENV: &str = "GLASS_CARD_API_KEY";

pub const DEFAULT_TEMPERATURE: f64 = 0.8;
pub const DEFAULT_MAX_TOKENS: u32 = 800;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// ── LLM provider types ──────────────────────────────────────────

/// Which LLM provider answers the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub enum LlmProvider {
    Anthropic,
    OpenAiCompatible,
}

/// Full configuration for the chosen LLM provider.
///
/// The `api_key` field is never written to `settings.json`. It is stored in a
/// separate credentials file and loaded/saved via [`load_api_key`]/[`save_api_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LlmProviderConfig {
    pub provider: LlmProvider,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override. None = the provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model override. None = use provider default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whole-request timeout for the HTTP transport, streaming included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            api_key: None,
            base_url: None,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Redacted view of the LLM config for display (no raw API key).
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct LlmConfigInfo {
    pub provider: LlmProvider,
    pub has_api_key: bool,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl LlmConfigInfo {
    #[must_use]
    pub fn from_config(config: &LlmProviderConfig) -> Self {
        Self {
            provider: config.provider,
            has_api_key: config.api_key.as_ref().is_some_and(|k| !k.is_empty()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

// ── Animation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnimationSettings {
    #[serde(default)]
    pub smoothing: SmoothingMode,
    /// Fixed seed for particle placement. None = fresh entropy each run.
    #[serde(default)]
    #[ts(type = "number | null")]
    pub particle_seed: Option<u64>,
}

// ── App settings ─────────────────────────────────────────────────

/// Application-level settings stored in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppSettings {
    pub version: u32,
    #[serde(default)]
    pub llm: LlmProviderConfig,
    #[serde(default)]
    pub animation: AnimationSettings,
}

const SETTINGS_VERSION: u32 = 1;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            llm: LlmProviderConfig::default(),
            animation: AnimationSettings::default(),
        }
    }
}

/// Load the API key: `GLASS_CARD_API_KEY` if set, else the credentials file.
pub fn load_api_key(app_config_dir: &Path) -> Option<String> {
    resolve_api_key(std::env::var(API_KEY_ENV).ok(), app_config_dir)
}

fn resolve_api_key(env_value: Option<String>, app_config_dir: &Path) -> Option<String> {
    let from_env = env_value
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    from_env.or_else(|| {
        let path = crate::paths::credentials_path(app_config_dir);
        std::fs::read_to_string(path)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    })
}

/// Save the API key to the separate credentials file (atomic write). An empty
/// key removes the file.
pub fn save_api_key(app_config_dir: &Path, key: &str) -> Result<(), StorageError> {
    std::fs::create_dir_all(app_config_dir)?;
    let path = crate::paths::credentials_path(app_config_dir);
    if key.is_empty() {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    } else {
        atomic_write(&path, key.as_bytes())?;
    }
    Ok(())
}

/// Load settings from the config directory, with the API key filled in.
///
/// A missing file yields defaults. An unreadable one also yields defaults,
/// with a warning; it is left on disk until the next save.
pub fn load_settings(app_config_dir: &Path) -> AppSettings {
    let path = crate::paths::settings_path(app_config_dir);
    let mut settings = if path.exists() {
        match read_json::<AppSettings>(&path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
                AppSettings::default()
            }
        }
    } else {
        AppSettings::default()
    };

    if settings.llm.api_key.is_none() {
        settings.llm.api_key = load_api_key(app_config_dir);
    }
    settings
}

/// Save settings to the config directory. The API key is not written here.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), StorageError> {
    std::fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.llm.provider = LlmProvider::OpenAiCompatible;
        settings.llm.model = Some("gpt-4o-mini".into());
        settings.animation.smoothing = SmoothingMode::DeltaNormalized { reference_fps: 60.0 };
        settings.animation.particle_seed = Some(7);
        save_settings(dir.path(), &settings).unwrap();

        let loaded = load_settings(dir.path());
        assert_eq!(loaded.llm.provider, LlmProvider::OpenAiCompatible);
        assert_eq!(loaded.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(loaded.animation, settings.animation);
    }

    #[test]
    fn missing_settings_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_settings(&dir.path().join("nope"));
        assert_eq!(loaded.llm.provider, LlmProvider::Anthropic);
        assert_eq!(loaded.llm.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(loaded.llm.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(loaded.animation.smoothing, SmoothingMode::PerFrame);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            crate::paths::settings_path(dir.path()),
            r#"{ "version": 1, "llm": { "provider": "Anthropic" } }"#,
        )
        .unwrap();
        let loaded = load_settings(dir.path());
        assert_eq!(loaded.llm.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(loaded.llm.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(crate::paths::settings_path(dir.path()), "{ not json").unwrap();
        let loaded = load_settings(dir.path());
        assert_eq!(loaded.version, SETTINGS_VERSION);
    }

    #[test]
    fn api_key_is_never_written_to_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.llm.api_key = Some("sk-secret".into());
        save_settings(dir.path(), &settings).unwrap();
        let raw = std::fs::read_to_string(crate::paths::settings_path(dir.path())).unwrap();
        assert!(!raw.contains("sk-secret"));
    }

    #[test]
    fn credentials_file_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        save_api_key(dir.path(), "sk-test\n").unwrap();
        assert_eq!(resolve_api_key(None, dir.path()).as_deref(), Some("sk-test"));
        save_api_key(dir.path(), "").unwrap();
        assert_eq!(resolve_api_key(None, dir.path()), None);
        // Clearing twice is fine.
        save_api_key(dir.path(), "").unwrap();
    }

    #[test]
    fn env_key_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        save_api_key(dir.path(), "from-file").unwrap();
        assert_eq!(
            resolve_api_key(Some("from-env".into()), dir.path()).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            resolve_api_key(Some("  ".into()), dir.path()).as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn redacted_info_hides_key() {
        let mut config = LlmProviderConfig::default();
        assert!(!LlmConfigInfo::from_config(&config).has_api_key);
        config.api_key = Some("k".into());
        let info = LlmConfigInfo::from_config(&config);
        assert!(info.has_api_key);
        assert!(!serde_json::to_string(&info).unwrap().contains("\"k\""));
    }
}
