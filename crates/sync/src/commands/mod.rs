// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod config;
pub mod connect;
pub mod snapshot;

use std::path::{Path, PathBuf};

use crate::config::{default_config_path, ClientConfig, ConfigError};
use crate::error::SyncResult;

/// Picks the explicit config path or the default location.
pub fn config_path(explicit: Option<&Path>) -> SyncResult<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(default_config_path)
        .ok_or_else(|| ConfigError::NoConfigDir.into())
}

/// Loads the config, falling back to defaults when no file exists.
pub fn load_config(explicit: Option<&Path>) -> SyncResult<ClientConfig> {
    match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => Ok(ClientConfig::load(&path)?),
        None => Ok(ClientConfig::default()),
    }
}
