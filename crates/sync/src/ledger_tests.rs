// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use mesa_core::protocol::MessageType;
use mesa_core::{EntityKind, Payload};
use serde_json::json;

fn payload(value: serde_json::Value) -> Payload {
    mesa_core::entity::payload_from_value(value).unwrap()
}

fn op(id: &str, entity: &str, kind: OperationKind, snapshot: Option<Entity>) -> PendingOperation {
    PendingOperation::new(
        id,
        entity,
        kind,
        snapshot,
        Envelope::new(MessageType::CharacterUpdate, 0),
    )
}

fn synced_goblin() -> Entity {
    Entity::authoritative(
        "char-2",
        EntityKind::Character,
        payload(json!({"name": "Goblin", "hp": 7})),
        4,
        100,
    )
}

#[test]
fn register_sets_deadline() {
    let mut ledger = PendingOperationLedger::new(5_000);
    assert!(ledger
        .register(op("op-1", "char-1", OperationKind::Create, None), 1_000)
        .is_none());

    let entry = ledger.get("char-1").unwrap();
    assert_eq!(entry.submitted_at, 1_000);
    assert_eq!(entry.deadline, 6_000);
    assert_eq!(ledger.next_deadline(), Some(6_000));
}

#[test]
fn nothing_expires_before_deadline() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-1", "char-1", OperationKind::Create, None), 0);
    assert!(ledger.expire(4_999).is_empty());
    assert_eq!(ledger.expire(5_000).len(), 1);
    assert!(ledger.is_empty());
}

#[test]
fn superseded_operation_never_expires() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-a", "char-1", OperationKind::Update, None), 0);
    let replaced = ledger
        .register(op("op-b", "char-1", OperationKind::Update, None), 3_000)
        .unwrap();
    assert_eq!(replaced.operation_id, "op-a");

    // Past A's deadline, before B's.
    assert!(ledger.expire(5_500).is_empty());
    assert_eq!(ledger.len(), 1);

    let expired = ledger.expire(8_000);
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].operation_id, "op-b");
}

#[test]
fn confirm_clears_timer() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-1", "char-1", OperationKind::Create, None), 0);

    let confirmed = ledger.confirm("char-1").unwrap();
    assert_eq!(confirmed.operation_id, "op-1");
    assert!(ledger.expire(100_000).is_empty());
    assert_eq!(ledger.next_deadline(), None);
}

#[test]
fn confirm_operation_ignores_superseded_ids() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-a", "char-1", OperationKind::Update, None), 0);
    ledger.register(op("op-b", "char-1", OperationKind::Update, None), 10);

    assert!(ledger.confirm_operation("op-a").is_none());
    assert!(ledger.contains("char-1"));
    assert_eq!(
        ledger.confirm_operation("op-b").unwrap().operation_id,
        "op-b"
    );
    assert!(!ledger.contains("char-1"));
}

#[test]
fn cancel_all_returns_entries_in_submission_order() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-2", "tok-1", OperationKind::Update, None), 20);
    ledger.register(op("op-1", "char-1", OperationKind::Update, None), 10);

    let cancelled = ledger.cancel_all();
    let ids: Vec<_> = cancelled.iter().map(|o| o.operation_id.as_str()).collect();
    assert_eq!(ids, vec!["op-1", "op-2"]);
    assert!(ledger.expire(u64::MAX).is_empty());
}

#[test]
fn rearm_restarts_deadlines() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-1", "char-1", OperationKind::Update, None), 0);
    ledger.rearm_all(4_000);

    assert!(ledger.expire(5_000).is_empty());
    assert_eq!(ledger.get("char-1").unwrap().deadline, 9_000);
    assert_eq!(ledger.expire(9_000).len(), 1);
}

#[test]
fn held_entries_never_expire_until_rearmed() {
    let mut ledger = PendingOperationLedger::new(5_000);
    ledger.register(op("op-1", "char-1", OperationKind::Update, None), 0);
    ledger.hold(op("op-2", "char-2", OperationKind::Create, None), 1_000);
    ledger.hold_all();

    assert_eq!(ledger.next_deadline(), None);
    assert!(!ledger.is_armed("char-1"));
    assert!(ledger.expire(60_000).is_empty());
    assert_eq!(ledger.len(), 2);

    ledger.rearm_all(60_000);
    assert!(ledger.is_armed("char-2"));
    assert!(ledger.expire(64_999).is_empty());
    assert_eq!(ledger.expire(65_000).len(), 2);
}

#[test]
fn create_rollback_keeps_entity_as_error() {
    let mut store = EntityStore::new();
    let mut thorin = Entity::new_local(
        "char-1",
        EntityKind::Character,
        payload(json!({"name": "Thorin", "hp": 45})),
    );
    thorin.sync_status = SyncStatus::Syncing;
    store.insert(thorin).unwrap();

    rollback(&mut store, &op("op-1", "char-1", OperationKind::Create, None)).unwrap();

    let entity = store.get("char-1").unwrap();
    assert_eq!(entity.sync_status, SyncStatus::Error);
    assert_eq!(entity.field("hp"), Some(&json!(45)));
}

#[test]
fn update_rollback_restores_snapshot_exactly() {
    let mut store = EntityStore::new();
    let original = synced_goblin();
    let mut edited = original.clone();
    edited.payload.insert("hp".into(), json!(1));
    edited.payload.insert("status".into(), json!("poisoned"));
    edited.sync_status = SyncStatus::Syncing;
    store.insert(edited).unwrap();

    rollback(
        &mut store,
        &op("op-1", "char-2", OperationKind::Update, Some(original.clone())),
    )
    .unwrap();

    let entity = store.get("char-2").unwrap();
    assert_eq!(entity.payload, original.payload);
    assert_eq!(entity.version, original.version);
    assert_eq!(entity.base, original.base);
    assert_eq!(entity.sync_status, SyncStatus::Error);
    assert_eq!(entity.last_op, Some(OperationKind::Update));
}

#[test]
fn delete_rollback_reinserts_entity() {
    let mut store = EntityStore::new();
    let original = synced_goblin();

    rollback(
        &mut store,
        &op("op-1", "char-2", OperationKind::Delete, Some(original.clone())),
    )
    .unwrap();

    let entity = store.get("char-2").unwrap();
    assert_eq!(entity.payload, original.payload);
    assert_eq!(entity.sync_status, SyncStatus::Error);
    assert_eq!(entity.last_op, Some(OperationKind::Delete));
}
