// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use crate::cli::ConfigCommand;
use crate::config::{validate_url, ClientConfig, ConfigError};
use crate::error::SyncResult;

use super::{config_path, load_config};

/// Execute a config subcommand.
pub fn run(cmd: ConfigCommand) -> SyncResult<()> {
    match cmd {
        ConfigCommand::Show { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", render(&config)?);
            Ok(())
        }
        ConfigCommand::Init { config, url, force } => {
            let path = config_path(config.as_deref())?;
            init(&path, url, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

pub(crate) fn render(config: &ClientConfig) -> SyncResult<String> {
    Ok(toml::to_string_pretty(config).map_err(ConfigError::from)?)
}

/// Writes a config with every default filled in.
pub(crate) fn init(path: &Path, url: Option<String>, force: bool) -> SyncResult<ClientConfig> {
    if path.exists() && !force {
        return Err(ConfigError::Exists(path.to_path_buf()).into());
    }
    if let Some(ref url) = url {
        validate_url(url)?;
    }
    let config = ClientConfig {
        url,
        ..ClientConfig::default()
    };
    config.save(path)?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
