use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::DEFAULT_KEY_PREFIX;
use crate::session::SessionConfig;
use crate::sync::SyncConfig;
use tracing::warn;

/// Overrides both the config and the data directory.
pub const HOME_ENV: &str = "TALLY_HOME";
pub const CLOUD_URL_ENV: &str = "TALLY_CLOUD_URL";
pub const CLOUD_KEY_ENV: &str = "TALLY_CLOUD_KEY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub sync: SyncSection,
    /// Preferred output format: `pretty`, `text` or `json`.
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl CloudConfig {
    /// URL and key, when both are present and non-blank. Cloud sync is off
    /// otherwise.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let key = self.key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some((url, key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_failsafe_secs")]
    pub failsafe_secs: u64,
    /// Period of the device-session heartbeat in `watch`.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            failsafe_secs: default_failsafe_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl SyncSection {
    /// Orchestrator timings. Zero intervals are raised to one second so the
    /// background loop cannot spin. A cycle makes two rounds of requests
    /// (pull, then push), so the failsafe is raised to cover both.
    #[must_use]
    pub fn to_sync_config(&self) -> SyncConfig {
        let request_timeout = self.request_timeout_secs.max(1);
        let min_failsafe = request_timeout.saturating_mul(2);
        if self.failsafe_secs < min_failsafe {
            warn!(
                failsafe_secs = self.failsafe_secs,
                request_timeout_secs = request_timeout,
                "failsafe is shorter than a full cycle, raising it to {min_failsafe}s"
            );
        }
        SyncConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            interval: Duration::from_secs(self.interval_secs.max(1)),
            request_timeout: Duration::from_secs(request_timeout),
            failsafe: Duration::from_secs(self.failsafe_secs.max(min_failsafe)),
            session: SessionConfig {
                heartbeat: Duration::from_secs(self.heartbeat_secs.max(1)),
                ..SessionConfig::default()
            },
        }
    }
}

fn home_override() -> Option<PathBuf> {
    env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// `$TALLY_HOME/config.toml`, else `<config_dir>/tally/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    home_override()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("tally")))
        .map(|dir| dir.join("config.toml"))
}

/// Directory holding the cache database.
///
/// # Errors
///
/// Returns an error when neither `TALLY_HOME` nor a platform data directory
/// is available.
pub fn data_dir() -> Result<PathBuf> {
    home_override()
        .or_else(|| dirs::data_dir().map(|dir| dir.join("tally")))
        .context("no data directory: set TALLY_HOME")
}

/// Load the config file (defaults if absent) and apply environment
/// overrides.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<Config> {
    let mut config = match config_path() {
        Some(path) => load_config_from(&path)?,
        None => Config::default(),
    };
    apply_env(
        &mut config,
        env::var(CLOUD_URL_ENV).ok(),
        env::var(CLOUD_KEY_ENV).ok(),
    );
    Ok(config)
}

/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<Config>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn apply_env(config: &mut Config, url: Option<String>, key: Option<String>) {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        config.cloud.url = Some(url);
    }
    if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
        config.cloud.key = Some(key);
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

const fn default_debounce_ms() -> u64 {
    2000
}

const fn default_interval_secs() -> u64 {
    30
}

const fn default_request_timeout_secs() -> u64 {
    7
}

const fn default_failsafe_secs() -> u64 {
    15
}

const fn default_heartbeat_secs() -> u64 {
    30
}
