//! Centralized path definitions for all data files and directories.
//!
//! This module is the single source of truth for leaf filenames and
//! path-building functions. No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "glass-card";

/// Overrides the config directory when set.
pub const CONFIG_DIR_ENV: &str = "GLASS_CARD_CONFIG_DIR";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const CREDENTIALS_FILE: &str = ".credentials";

// ── Config-dir functions (take app_config_dir) ───────────────────

/// `$GLASS_CARD_CONFIG_DIR`, else the platform config dir joined with
/// [`APP_ID`], else `./.glass-card`.
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::config_dir().map_or_else(|| PathBuf::from(format!(".{APP_ID}")), |d| d.join(APP_ID))
}

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn credentials_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(CREDENTIALS_FILE)
}

/// File backing a named state slot.
pub fn state_slot_path(dir: &Path, slot: &str) -> PathBuf {
    dir.join(format!("{slot}.json"))
}
