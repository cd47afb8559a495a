//! Configuration management.
//!
//! This module resolves where tack keeps its data and how background sync
//! is configured.
//!
//! # Layout
//!
//! - **Database**: `~/.tack/data/tack.db`
//! - **Config**: `~/.tack/config.json`
//!
//! `TACK_HOME` relocates the whole `~/.tack` directory (used by tests and
//! for running several profiles side by side).
//!
//! Every sync setting resolves with the same priority: environment variable,
//! then config file, then built-in default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SchedulerConfig;

/// How often `tack watch` checks whether the remote is reachable.
pub const REACHABILITY_INTERVAL: Duration = Duration::from_secs(10);

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSettings>,
}

/// Sync section of `config.json`. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
}

/// Keys accepted by `tack config set`.
pub const CONFIG_KEYS: &[&str] = &[
    "enabled",
    "endpoint",
    "token",
    "owner",
    "debounce_ms",
    "interval_secs",
    "reconnect_delay_ms",
];

impl TackConfig {
    /// The sync section, or empty settings when absent.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        self.sync.clone().unwrap_or_default()
    }

    /// Set one sync setting from its string form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown key or an unparsable value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let settings = self.sync.get_or_insert_with(SyncSettings::default);
        let value = value.trim();
        match key {
            "enabled" => settings.enabled = Some(parse_bool(value)?),
            "endpoint" => settings.endpoint = non_empty(value),
            "token" => settings.token = non_empty(value),
            "owner" | "owner_id" => settings.owner_id = non_empty(value),
            "debounce_ms" => settings.debounce_ms = Some(parse_number(key, value)?),
            "interval_secs" => settings.interval_secs = Some(parse_number(key, value)?),
            "reconnect_delay_ms" => settings.reconnect_delay_ms = Some(parse_number(key, value)?),
            other => {
                return Err(Error::Config(format!(
                    "unknown config key '{other}' (expected one of: {})",
                    CONFIG_KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("expected true or false, got '{other}'"))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number, got '{value}'")))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the tack home directory (`TACK_HOME` or `~/.tack`).
#[must_use]
pub fn tack_home() -> Option<PathBuf> {
    if let Some(home) = env_var("TACK_HOME") {
        return Some(PathBuf::from(home));
    }
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tack"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TACK_DB` environment variable
/// 3. `<tack home>/data/tack.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(db_path) = env_var("TACK_DB") {
        return Some(PathBuf::from(db_path));
    }

    tack_home().map(|dir| dir.join("data").join("tack.db"))
}

/// Get the config file path.
///
/// # Errors
///
/// Returns `Error::Config` if no home directory can be determined.
pub fn config_path() -> Result<PathBuf> {
    tack_home()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the configuration file, or defaults when it does not exist.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<TackConfig> {
    load_config_from(&config_path()?)
}

/// Load configuration from a specific file.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<TackConfig> {
    if !path.exists() {
        return Ok(TackConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the configuration file.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be written.
pub fn save_config(config: &TackConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

/// Save configuration to a specific file, creating parent directories.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be written.
pub fn save_config_to(config: &TackConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Check if background sync is enabled.
#[must_use]
pub fn resolve_sync_enabled(config: &TackConfig) -> bool {
    // Priority: env var > config > default
    if let Some(enabled) = env_var("TACK_SYNC_ENABLED") {
        return enabled != "false" && enabled != "0";
    }
    config.sync_settings().enabled.unwrap_or(true)
}

/// Resolve the remote endpoint.
///
/// # Errors
///
/// Returns `Error::Config` when no endpoint is configured.
pub fn resolve_endpoint(config: &TackConfig) -> Result<String> {
    env_var("TACK_ENDPOINT")
        .or_else(|| config.sync_settings().endpoint)
        .ok_or_else(|| {
            Error::Config("no sync endpoint configured".to_string())
        })
}

/// Resolve the bearer token, if any.
#[must_use]
pub fn resolve_token(config: &TackConfig) -> Option<String> {
    env_var("TACK_TOKEN").or_else(|| config.sync_settings().token)
}

/// Resolve the owner whose records a command works on.
///
/// Priority: explicit `--owner` flag, `TACK_OWNER`, config file.
///
/// # Errors
///
/// Returns `Error::Config` when no owner is known.
pub fn resolve_owner(explicit: Option<&str>, config: &TackConfig) -> Result<String> {
    if let Some(owner) = explicit.map(str::trim).filter(|o| !o.is_empty()) {
        return Ok(owner.to_string());
    }
    env_var("TACK_OWNER")
        .or_else(|| config.sync_settings().owner_id)
        .ok_or_else(|| Error::Config("no owner set".to_string()))
}

/// Build scheduler timing from config, falling back to defaults.
#[must_use]
pub fn scheduler_config(config: &TackConfig) -> SchedulerConfig {
    let settings = config.sync_settings();
    let defaults = SchedulerConfig::default();
    SchedulerConfig {
        enabled: resolve_sync_enabled(config),
        debounce: settings
            .debounce_ms
            .map_or(defaults.debounce, Duration::from_millis),
        interval: settings
            .interval_secs
            .filter(|s| *s > 0)
            .map_or(defaults.interval, Duration::from_secs),
        reconnect_delay: settings
            .reconnect_delay_ms
            .map_or(defaults.reconnect_delay, Duration::from_millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/tack.db");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_default_name() {
        let path = resolve_db_path(None).unwrap();
        assert!(path.to_string_lossy().ends_with(".db"));
    }

    #[test]
    fn test_set_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = TackConfig::default();
        config.set("endpoint", "https://sync.example.com").unwrap();
        config.set("owner", "user_1").unwrap();
        config.set("enabled", "off").unwrap();
        config.set("debounce_ms", "1500").unwrap();
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, config);
        let sync = loaded.sync_settings();
        assert_eq!(sync.endpoint.as_deref(), Some("https://sync.example.com"));
        assert_eq!(sync.owner_id.as_deref(), Some("user_1"));
        assert_eq!(sync.enabled, Some(false));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = TackConfig::default();
        assert!(matches!(config.set("colour", "blue"), Err(Error::Config(_))));
        assert!(matches!(
            config.set("interval_secs", "soon"),
            Err(Error::Config(_))
        ));
        assert!(matches!(config.set("enabled", "maybe"), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TackConfig::default());
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_scheduler_config_overrides() {
        let mut config = TackConfig::default();
        config.set("debounce_ms", "250").unwrap();
        config.set("interval_secs", "0").unwrap();

        let scheduler = scheduler_config(&config);
        assert_eq!(scheduler.debounce, Duration::from_millis(250));
        // Zero interval falls back to the default
        assert_eq!(scheduler.interval, SchedulerConfig::default().interval);
        assert_eq!(
            scheduler.reconnect_delay,
            SchedulerConfig::default().reconnect_delay
        );
    }

    #[test]
    fn test_explicit_owner_wins() {
        let mut config = TackConfig::default();
        config.set("owner", "from_config").unwrap();
        assert_eq!(
            resolve_owner(Some("from_flag"), &config).unwrap(),
            "from_flag"
        );
    }
}
