// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for mesa-core operations.

use thiserror::Error;

use crate::entity::SyncStatus;

/// All possible errors that can occur in mesa-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("entity already exists: {0}\n  hint: use an update to change an existing entity")]
    EntityExists(String),

    #[error("invalid sync status transition for {entity_id}: cannot go from {from} to {to}")]
    InvalidStatusTransition {
        entity_id: String,
        from: SyncStatus,
        to: SyncStatus,
    },

    #[error("version regression for {entity_id}: {current} -> {proposed}\n  hint: versions only move forward")]
    VersionRegression {
        entity_id: String,
        current: u64,
        proposed: u64,
    },

    #[error("invalid payload: {0}\n  hint: payloads must be JSON objects")]
    InvalidPayload(String),

    #[error("unknown message type: '{0}'")]
    UnknownMessageType(String),

    #[error("malformed message '{kind}': {reason}")]
    MalformedMessage { kind: String, reason: String },

    #[error("invalid entity kind: '{0}'\n  hint: valid kinds are: character, token, session")]
    InvalidEntityKind(String),

    #[error("invalid operation kind: '{0}'\n  hint: valid operations are: create, update, delete")]
    InvalidOperationKind(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for mesa-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
