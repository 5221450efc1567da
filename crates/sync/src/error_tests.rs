// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    conflict = { SyncError::EntityInConflict("char-1".into()), "resolve it" },
    no_conflict = { SyncError::NoConflict("char-1".into()), "char-1" },
    not_connected = { SyncError::NotConnected(ConnectionState::Offline), "offline" },
    no_url = { SyncError::NoServerUrl, "ws://" },
)]
fn error_display_contains(err: SyncError, expected: &str) {
    assert!(
        err.to_string().contains(expected),
        "{err} should contain {expected}"
    );
}

#[test]
fn invalid_transition_lists_targets() {
    let err = SyncError::InvalidTransition {
        from: ConnectionState::Offline,
        to: ConnectionState::Connected,
        valid_targets: "connecting, disconnected".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("offline"));
    assert!(msg.contains("connected"));
    assert!(msg.contains("connecting, disconnected"));
}

#[test]
fn core_errors_pass_through() {
    let err: SyncError = mesa_core::Error::EntityNotFound("tok-1".into()).into();
    assert_eq!(err.to_string(), "entity not found: tok-1");
}

#[test]
fn retry_error_names_status() {
    let err = SyncError::NothingToRetry {
        entity_id: "char-1".into(),
        status: SyncStatus::Synced,
    };
    assert!(err.to_string().contains("synced"));
}
