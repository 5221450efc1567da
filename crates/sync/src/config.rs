// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Stored as TOML. Every field has a default, so an empty file is valid:
//!
//! ```toml
//! url = "wss://tabletop.example/session"
//! user = "gm"
//! max_retries = 3
//! heartbeat_interval_ms = 30000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const APP_DIR_NAME: &str = "mesa";
const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid server url '{0}': must start with ws:// or wss://")]
    InvalidUrl(String),

    #[error("no data directory available\n  hint: set snapshot_path in the config")]
    NoDataDir,

    #[error("no config directory available\n  hint: pass --config with a path")]
    NoConfigDir,

    #[error("config already exists: {}\n  hint: use --force to overwrite it", .0.display())]
    Exists(PathBuf),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Session client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Session server url (`ws://` or `wss://`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Name sent as the author of local mutations.
    #[serde(default = "default_user")]
    pub user: String,
    /// Session to join. When absent a new session is created on connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Name used when creating a session.
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Reconnect attempts before going offline (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First reconnect backoff in milliseconds (default: 500).
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 30000).
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Heartbeat interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Silence after which the link is declared dead (default: 60000).
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Time an operation may wait for its ack (default: 5000).
    #[serde(default = "default_operation_deadline_ms")]
    pub operation_deadline_ms: u64,
    /// Time one connect attempt may take (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Where the session snapshot is written. Defaults to the user data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

fn default_user() -> String {
    "player".to_string()
}

fn default_session_name() -> String {
    "mesa session".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

fn default_operation_deadline_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: None,
            user: default_user(),
            session_id: None,
            session_name: default_session_name(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            operation_deadline_ms: default_operation_deadline_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            snapshot_path: None,
        }
    }
}

impl ClientConfig {
    /// Loads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: ClientConfig = toml::from_str(&content)?;
        if let Some(ref url) = config.url {
            validate_url(url)?;
        }
        Ok(config)
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Resolves where snapshots are written.
    pub fn snapshot_path(&self) -> ConfigResult<PathBuf> {
        match self.snapshot_path {
            Some(ref path) => Ok(path.clone()),
            None => default_snapshot_path().ok_or(ConfigError::NoDataDir),
        }
    }
}

/// `$XDG_DATA_HOME/mesa/snapshot.json` or the platform equivalent.
pub fn default_snapshot_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME).join(SNAPSHOT_FILE_NAME))
}

/// `$XDG_CONFIG_HOME/mesa/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}

/// Accepts `ws://` and `wss://` urls with a host.
pub fn validate_url(url: &str) -> ConfigResult<()> {
    let rest = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .ok_or_else(|| ConfigError::InvalidUrl(url.to_string()))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
