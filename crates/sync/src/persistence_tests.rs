// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use mesa_core::{EntityRecord, Payload};
use serde_json::json;
use tempfile::tempdir;

fn payload(value: serde_json::Value) -> Payload {
    mesa_core::entity::payload_from_value(value).unwrap()
}

fn session_store() -> EntityStore {
    [
        Entity::authoritative(
            "char-1",
            EntityKind::Character,
            payload(json!({"name": "Thorin", "hp": 45})),
            2,
            10,
        ),
        Entity::authoritative(
            "tok-1",
            EntityKind::Token,
            payload(json!({"position": {"x": 1, "y": 1}})),
            1,
            10,
        ),
        Entity::authoritative(
            "tok-2",
            EntityKind::Token,
            payload(json!({"position": {"x": 5, "y": 5}})),
            1,
            10,
        ),
        Entity::authoritative(
            "session",
            EntityKind::Session,
            payload(json!({"name": "Lost Mine"})),
            1,
            10,
        ),
    ]
    .into_iter()
    .collect()
}

#[test]
fn file_store_round_trips_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("snapshot.json");
    let mut gateway = PersistenceGateway::new(FileSnapshotStore::new(&path));

    let saved = gateway
        .persist(&session_store(), Some("s-1"), Some(TurnState::new(3, 1)), 99)
        .unwrap();

    assert!(path.exists());
    assert!(!path.with_file_name("snapshot.json.tmp").exists());
    assert_eq!(gateway.load().unwrap(), Some(saved));
}

#[test]
fn file_store_missing_file_loads_none() {
    let dir = tempdir().unwrap();
    let store = FileSnapshotStore::new(dir.path().join("none.json"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn file_store_clear_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut store = FileSnapshotStore::new(dir.path().join("s.json"));
    store.save(&SessionSnapshot::default()).unwrap();
    store.clear().unwrap();
    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
}

#[test]
fn corrupt_snapshot_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(
        FileSnapshotStore::new(&path).load().unwrap_err(),
        PersistenceError::Serialization(_)
    ));
}

#[test]
fn board_handle_filters_tokens_only() {
    let gateway = PersistenceGateway::new(MemorySnapshotStore::new())
        .with_board(StaticBoard(vec!["tok-2".into()]));
    let snapshot = gateway.capture(&session_store(), None, None, 0);

    let ids: Vec<_> = snapshot.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["char-1", "session", "tok-2"]);
}

#[test]
fn without_board_every_token_is_kept() {
    let gateway = PersistenceGateway::new(MemorySnapshotStore::new());
    let snapshot = gateway.capture(&session_store(), None, None, 0);
    assert_eq!(snapshot.entities.len(), 4);
}

#[test]
fn memory_store_clones_share_state() {
    let shared = MemorySnapshotStore::new();
    let mut gateway = PersistenceGateway::new(shared.clone());
    gateway
        .persist(&session_store(), None, Some(TurnState::new(3, 0)), 5)
        .unwrap();

    let loaded = shared.load().unwrap().unwrap();
    assert_eq!(loaded.turn, Some(TurnState::new(3, 0)));
}

fn snapshot_at_round(round: u32) -> SessionSnapshot {
    let mut thorin = session_store().get("char-1").unwrap().clone();
    thorin.payload.insert("hp".into(), json!(30));
    thorin.payload.insert("note".into(), json!("blessed"));
    let mut scout = Entity::new_local(
        "char-9",
        EntityKind::Character,
        payload(json!({"name": "Scout"})),
    );
    scout.sync_status = SyncStatus::Local;

    SessionSnapshot {
        session_id: Some("s-1".into()),
        saved_at: 100,
        entities: vec![thorin, scout],
        turn: Some(TurnState::new(round, 2)),
    }
}

fn server_thorin(hp: i64) -> EntityRecord {
    EntityRecord {
        id: "char-1".into(),
        kind: EntityKind::Character,
        version: 5,
        payload: payload(json!({"name": "Thorin", "hp": hp})),
        updated_at: 200,
    }
}

#[test]
fn restore_keeps_saved_round_when_server_has_none() {
    let merged = merge_snapshots(
        &snapshot_at_round(3),
        &GameState {
            entities: vec![server_thorin(12)],
            turn: None,
        },
    );
    assert_eq!(merged.turn.unwrap().round, 3);
}

#[test]
fn restore_server_round_wins() {
    let merged = merge_snapshots(
        &snapshot_at_round(3),
        &GameState {
            entities: vec![server_thorin(12)],
            turn: Some(TurnState::new(4, 0)),
        },
    );
    assert_eq!(merged.turn, Some(TurnState::new(4, 0)));
}

#[test]
fn restore_server_wins_overlapping_fields() {
    let merged = merge_snapshots(
        &snapshot_at_round(3),
        &GameState {
            entities: vec![server_thorin(12)],
            turn: None,
        },
    );

    let thorin = merged.entity("char-1").unwrap();
    assert_eq!(thorin.field("hp"), Some(&json!(12)));
    assert_eq!(thorin.field("note"), Some(&json!("blessed")));
    assert_eq!(thorin.version, 5);
    assert_eq!(thorin.sync_status, SyncStatus::Local);
    assert_eq!(
        thorin.base.as_ref().unwrap(),
        &payload(json!({"name": "Thorin", "hp": 12}))
    );
}

#[test]
fn restore_identical_entity_is_synced() {
    let snapshot = SessionSnapshot {
        entities: vec![server_thorin(12).into_entity()],
        ..SessionSnapshot::default()
    };
    let merged = merge_snapshots(
        &snapshot,
        &GameState {
            entities: vec![server_thorin(12)],
            turn: None,
        },
    );
    assert_eq!(
        merged.entity("char-1").unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[test]
fn restore_keeps_snapshot_only_entities_as_local_creates() {
    let merged = merge_snapshots(&snapshot_at_round(3), &GameState::default());

    let scout = merged.entity("char-9").unwrap();
    assert_eq!(scout.sync_status, SyncStatus::Local);
    assert_eq!(scout.last_op, Some(OperationKind::Create));
    assert_eq!(merged.entities.len(), 2);
}

#[test]
fn restore_without_server_state_keeps_confirmed_entities() {
    let mut confirmed = server_thorin(12).into_entity();
    confirmed.version = 3;
    let mut edited = Entity::authoritative(
        "char-2",
        EntityKind::Character,
        payload(json!({"name": "Goblin", "hp": 7})),
        2,
        10,
    );
    edited.payload.insert("hp".into(), json!(4));
    edited.sync_status = SyncStatus::Local;
    let snapshot = SessionSnapshot {
        entities: vec![confirmed, edited],
        ..SessionSnapshot::default()
    };

    let merged = merge_snapshots(&snapshot, &GameState::default());

    let thorin = merged.entity("char-1").unwrap();
    assert_eq!(thorin.sync_status, SyncStatus::Synced);
    assert_eq!(thorin.version, 3);
    assert!(thorin.base.is_some());
    assert_eq!(thorin.last_op, None);

    let goblin = merged.entity("char-2").unwrap();
    assert_eq!(goblin.sync_status, SyncStatus::Local);
    assert_eq!(goblin.last_op, Some(OperationKind::Update));
    assert_eq!(
        goblin.base.as_ref().unwrap(),
        &payload(json!({"name": "Goblin", "hp": 7}))
    );
}
