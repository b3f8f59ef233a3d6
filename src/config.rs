//! Library configuration.
//!
//! Settings come from a TOML file found via `$MAILINDEX_CONFIG`, or at
//! the platform's standard location (`~/.config/mailindex/config.toml`
//! on Linux/macOS, `%APPDATA%\mailindex\config.toml` on Windows). A
//! missing or unusable file means built-in defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior.
    pub general: GeneralConfig,
    /// Index format and linking parameters.
    pub index: IndexConfig,
}

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override for the cache directory (indexes, logs).
    pub cache_dir: Option<PathBuf>,
}

/// Index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Message-IDs longer than this are replaced by a hash-based
    /// projection when used as metadata keys. The stored message-ID
    /// itself is never rewritten.
    pub message_id_cap: usize,

    /// Whether newly created indexes carry ghost records (placeholder
    /// documents for referenced-but-not-yet-seen messages). An existing
    /// index always obeys the flag recorded in its own header.
    pub ghost_records: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            message_id_cap: 300,
            ghost_records: true,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Locate the config file: `$MAILINDEX_CONFIG` wins, then the platform
/// config directory.
pub fn config_file_path() -> Option<PathBuf> {
    std::env::var_os("MAILINDEX_CONFIG")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("mailindex/config.toml")))
}

/// Load configuration, falling back to the defaults when no file exists
/// or the file is unusable.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    match try_load(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => Config::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable config");
            Config::default()
        }
    }
}

fn try_load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let cfg = toml::from_str(&text)?;
    tracing::debug!(path = %path.display(), "Config loaded");
    Ok(Some(cfg))
}

/// Write the configuration to its standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path().context("no config directory available")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, toml::to_string_pretty(config)?)?;
    tracing::debug!(path = %path.display(), "Config written");
    Ok(())
}

/// The directory for index files and other cached state.
pub fn cache_dir(config: &Config) -> PathBuf {
    config
        .general
        .cache_dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|d| d.join("mailindex")))
        .unwrap_or_else(|| PathBuf::from("."))
}
