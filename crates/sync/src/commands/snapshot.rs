// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use mesa_core::SessionSnapshot;

use crate::cli::SnapshotCommand;
use crate::error::{SyncError, SyncResult};
use crate::persistence::{FileSnapshotStore, PersistenceError, SnapshotStore};

use super::load_config;

/// Execute a snapshot subcommand.
pub fn run(cmd: SnapshotCommand) -> SyncResult<()> {
    match cmd {
        SnapshotCommand::Show { path, json, config } => {
            let path = resolve_path(path, config.as_deref())?;
            let snapshot = load(&path)?;
            if json {
                let text = snapshot.to_json().map_err(PersistenceError::from)?;
                println!("{text}");
            } else {
                print!("{}", render(&snapshot));
            }
            Ok(())
        }
        SnapshotCommand::Path { config } => {
            let path = load_config(config.as_deref())?.snapshot_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// An explicit path wins over the one the config names.
pub(crate) fn resolve_path(path: Option<PathBuf>, config: Option<&Path>) -> SyncResult<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(load_config(config)?.snapshot_path()?),
    }
}

pub(crate) fn load(path: &Path) -> SyncResult<SessionSnapshot> {
    FileSnapshotStore::new(path)
        .load()?
        .ok_or(SyncError::NoSnapshot)
}

fn format_saved_at(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Human-readable summary of a snapshot.
pub(crate) fn render(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "session:  {}",
        snapshot.session_id.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(out, "saved:    {}", format_saved_at(snapshot.saved_at));
    match snapshot.turn {
        Some(t) => {
            let _ = writeln!(out, "turn:     round {}, turn {}", t.round, t.turn);
        }
        None => {
            let _ = writeln!(out, "turn:     -");
        }
    }
    let _ = writeln!(out, "entities: {}", snapshot.entities.len());
    for entity in &snapshot.entities {
        let _ = writeln!(
            out,
            "  {:<10} {:<24} v{:<4} {}",
            entity.kind.as_str(),
            entity.id,
            entity.version,
            entity.sync_status.as_str()
        );
    }
    out
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
