// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn payload(value: Value) -> Payload {
    payload_from_value(value).unwrap()
}

#[parameterized(
    local_to_syncing = { SyncStatus::Local, SyncStatus::Syncing },
    syncing_to_synced = { SyncStatus::Syncing, SyncStatus::Synced },
    syncing_to_error = { SyncStatus::Syncing, SyncStatus::Error },
    error_to_syncing = { SyncStatus::Error, SyncStatus::Syncing },
    synced_to_syncing = { SyncStatus::Synced, SyncStatus::Syncing },
    syncing_to_conflict = { SyncStatus::Syncing, SyncStatus::Conflict },
    conflict_to_synced = { SyncStatus::Conflict, SyncStatus::Synced },
    synced_to_local = { SyncStatus::Synced, SyncStatus::Local },
    error_discarded = { SyncStatus::Error, SyncStatus::Synced },
)]
fn legal_transitions(from: SyncStatus, to: SyncStatus) {
    assert!(from.can_transition_to(to), "{from} -> {to} should be legal");
}

#[parameterized(
    local_to_synced = { SyncStatus::Local, SyncStatus::Synced },
    local_to_error = { SyncStatus::Local, SyncStatus::Error },
    synced_to_error = { SyncStatus::Synced, SyncStatus::Error },
    synced_to_conflict = { SyncStatus::Synced, SyncStatus::Conflict },
    conflict_to_error = { SyncStatus::Conflict, SyncStatus::Error },
    error_to_error = { SyncStatus::Error, SyncStatus::Error },
)]
fn illegal_transitions(from: SyncStatus, to: SyncStatus) {
    assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
}

#[test]
fn dirty_statuses() {
    assert!(SyncStatus::Local.is_dirty());
    assert!(SyncStatus::Error.is_dirty());
    assert!(!SyncStatus::Synced.is_dirty());
    assert!(!SyncStatus::Syncing.is_dirty());
    assert!(!SyncStatus::Conflict.is_dirty());
}

#[parameterized(
    character = { "character", EntityKind::Character },
    token = { "token", EntityKind::Token },
    session = { "session", EntityKind::Session },
)]
fn entity_kind_parses(s: &str, expected: EntityKind) {
    assert_eq!(s.parse::<EntityKind>().unwrap(), expected);
    assert_eq!(expected.to_string(), s);
}

#[test]
fn entity_kind_rejects_unknown() {
    assert!("dragon".parse::<EntityKind>().is_err());
}

#[test]
fn new_local_entity_starts_unconfirmed() {
    let e = Entity::new_local("char-1", EntityKind::Character, payload(json!({"name": "Thorin"})));
    assert_eq!(e.version, 0);
    assert_eq!(e.sync_status, SyncStatus::Local);
    assert!(e.base.is_none());
    assert_eq!(e.last_op, Some(OperationKind::Create));
}

#[test]
fn authoritative_entity_keeps_base() {
    let p = payload(json!({"hp": 45}));
    let e = Entity::authoritative("char-1", EntityKind::Character, p.clone(), 4, 1_000);
    assert_eq!(e.sync_status, SyncStatus::Synced);
    assert_eq!(e.base, Some(p));
    assert_eq!(e.version, 4);
}

#[test]
fn apply_patch_sets_and_removes_fields() {
    let mut e = Entity::new_local(
        "char-1",
        EntityKind::Character,
        payload(json!({"name": "Thorin", "hp": 45, "notes": "grumpy"})),
    );
    e.apply_patch(&payload(json!({"hp": 30, "notes": null, "ac": 16})));

    assert_eq!(e.field("hp"), Some(&json!(30)));
    assert_eq!(e.field("ac"), Some(&json!(16)));
    assert_eq!(e.field("name"), Some(&json!("Thorin")));
    assert!(e.field("notes").is_none());
}

#[test]
fn adopt_authoritative_never_lowers_version() {
    let mut e = Entity::authoritative("t-1", EntityKind::Token, Payload::new(), 9, 500);
    e.adopt_authoritative(payload(json!({"x": 1})), 3, 100);
    assert_eq!(e.version, 9);
    assert_eq!(e.updated_at, 500);
    assert_eq!(e.field("x"), Some(&json!(1)));
}

#[test]
fn payload_from_value_rejects_non_objects() {
    assert!(payload_from_value(json!([1, 2])).is_err());
    assert!(payload_from_value(json!("hp")).is_err());
    assert!(payload_from_value(Value::Null).unwrap().is_empty());
}

#[test]
fn entity_serializes_camel_case() {
    let e = Entity::authoritative("c", EntityKind::Character, Payload::new(), 1, 2);
    let json = serde_json::to_string(&e).unwrap();
    assert!(json.contains("\"syncStatus\":\"synced\""));
    assert!(json.contains("\"updatedAt\":2"));
}
