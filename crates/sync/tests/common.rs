// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use mesa_core::entity::payload_from_value;
use mesa_core::{Entity, EntityKind, SessionSnapshot, TurnState};
use mesa_sync::{FileSnapshotStore, SnapshotStore};

pub use predicates::prelude::*;
pub use tempfile::TempDir;

pub fn mesa() -> Command {
    cargo_bin_cmd!("mesa")
}

/// Writes a snapshot with one synced character at round 3, turn 2.
pub fn write_snapshot(path: &Path) {
    let thorin = Entity::authoritative(
        "thorin",
        EntityKind::Character,
        payload_from_value(serde_json::json!({"name": "Thorin", "hp": 45})).unwrap(),
        4,
        1_000,
    );
    let snapshot = SessionSnapshot {
        session_id: Some("s-42".into()),
        saved_at: 1_767_323_045_000,
        entities: vec![thorin],
        turn: Some(TurnState::new(3, 2)),
    };
    FileSnapshotStore::new(path).save(&snapshot).unwrap();
}
