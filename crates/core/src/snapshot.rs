// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session state shapes: the server's authoritative game state and the
//! client's persisted snapshot.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId, EntityKind, Payload};

/// Position in the initiative order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub round: u32,
    pub turn: u32,
}

impl TurnState {
    pub fn new(round: u32, turn: u32) -> Self {
        TurnState { round, turn }
    }
}

/// An entity as the server describes it in a `save_state` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub updated_at: u64,
}

impl EntityRecord {
    /// Converts the record into a synced local entity.
    pub fn into_entity(self) -> Entity {
        Entity::authoritative(self.id, self.kind, self.payload, self.version, self.updated_at)
    }
}

impl From<&Entity> for EntityRecord {
    fn from(entity: &Entity) -> Self {
        EntityRecord {
            id: entity.id.clone(),
            kind: entity.kind,
            version: entity.version,
            payload: entity.payload.clone(),
            updated_at: entity.updated_at,
        }
    }
}

/// Authoritative game state carried by `save_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnState>,
}

/// Local state written to disk when the connection drops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Wall time (ms) the snapshot was taken.
    pub saved_at: u64,
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnState>,
}

impl SessionSnapshot {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Serializes the snapshot to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a snapshot from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
