// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    entity_not_found = { Error::EntityNotFound("char-1".into()), "char-1" },
    entity_exists = { Error::EntityExists("tok-9".into()), "already exists" },
    unknown_type = { Error::UnknownMessageType("teleport".into()), "teleport" },
    bad_kind = { Error::InvalidEntityKind("dragon".into()), "character, token, session" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_invalid_status_transition_display() {
    let err = Error::InvalidStatusTransition {
        entity_id: "char-1".into(),
        from: SyncStatus::Synced,
        to: SyncStatus::Error,
    };
    let msg = err.to_string();
    assert!(msg.contains("synced"));
    assert!(msg.contains("error"));
    assert!(msg.contains("char-1"));
}

#[test]
fn error_version_regression_display() {
    let err = Error::VersionRegression {
        entity_id: "tok-1".into(),
        current: 7,
        proposed: 3,
    };
    assert!(err.to_string().contains("7 -> 3"));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
