// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared session entities and their sync status.
//!
//! An entity is a character, a map token, or the session metadata record.
//! The payload is an open JSON object; the engine only cares about which
//! fields changed, never what they mean.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::op::OperationKind;

/// Opaque entity identifier.
pub type EntityId = String;

/// Domain payload of an entity: named fields with JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// What an entity represents in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Token,
    Session,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Token => "token",
            EntityKind::Session => "session",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "character" => Ok(EntityKind::Character),
            "token" => Ok(EntityKind::Token),
            "session" => Ok(EntityKind::Session),
            _ => Err(Error::InvalidEntityKind(s.to_string())),
        }
    }
}

/// Where an entity stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Changed locally, not submitted (offline, or never connected).
    Local,
    /// Submitted and awaiting confirmation.
    Syncing,
    /// Matches the server's confirmed state.
    Synced,
    /// A concurrent remote edit disagrees; needs a user decision.
    Conflict,
    /// Submission failed or timed out; retry or discard.
    Error,
}

impl SyncStatus {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        use SyncStatus::*;
        matches!(
            (self, next),
            (Local, Syncing | Local | Conflict)
                | (Syncing, Synced | Error | Syncing | Conflict | Local)
                | (Synced, Syncing | Synced | Local)
                | (Error, Syncing | Synced | Local | Conflict)
                | (Conflict, Synced | Syncing | Local)
        )
    }

    /// Returns true if the entity carries edits the server has not accepted.
    pub fn is_dirty(self) -> bool {
        matches!(self, SyncStatus::Local | SyncStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Local => "local",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared entity as held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Last version assigned by the server. Never decreases.
    pub version: u64,
    pub sync_status: SyncStatus,
    pub payload: Payload,
    /// Last payload the server confirmed; the merge base for conflicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Payload>,
    /// Kind of the most recent local mutation, kept so a failed
    /// submission can be retried from the entity alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_op: Option<OperationKind>,
    /// Timestamp (ms) of the last authoritative update.
    #[serde(default)]
    pub updated_at: u64,
}

impl Entity {
    /// Creates an entity that exists only locally.
    pub fn new_local(id: impl Into<EntityId>, kind: EntityKind, payload: Payload) -> Self {
        Entity {
            id: id.into(),
            kind,
            version: 0,
            sync_status: SyncStatus::Local,
            payload,
            base: None,
            last_op: Some(OperationKind::Create),
            updated_at: 0,
        }
    }

    /// Creates an entity exactly as the server reported it.
    pub fn authoritative(
        id: impl Into<EntityId>,
        kind: EntityKind,
        payload: Payload,
        version: u64,
        updated_at: u64,
    ) -> Self {
        Entity {
            id: id.into(),
            kind,
            version,
            sync_status: SyncStatus::Synced,
            base: Some(payload.clone()),
            payload,
            last_op: None,
            updated_at,
        }
    }

    /// Returns a field of the payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Merges a partial payload into this entity.
    ///
    /// A `null` value removes the field.
    pub fn apply_patch(&mut self, patch: &Payload) {
        for (key, value) in patch {
            if value.is_null() {
                self.payload.remove(key);
            } else {
                self.payload.insert(key.clone(), value.clone());
            }
        }
    }

    /// Adopts an authoritative payload and version from the server.
    pub fn adopt_authoritative(&mut self, payload: Payload, version: u64, updated_at: u64) {
        self.base = Some(payload.clone());
        self.payload = payload;
        self.version = self.version.max(version);
        self.updated_at = self.updated_at.max(updated_at);
        self.last_op = None;
    }
}

/// Converts a JSON value into a payload, rejecting non-objects.
pub fn payload_from_value(value: Value) -> Result<Payload> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Payload::new()),
        other => Err(Error::InvalidPayload(format!("expected object, got {other}"))),
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
