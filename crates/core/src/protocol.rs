// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Message envelope exchanged with the session server.
//!
//! Every message on the wire is a JSON envelope:
//!
//! ```text
//! { "type": "...", "payload": {...}, "timestamp": 0, "entityId"?: "...", "version"?: 0 }
//! ```
//!
//! Outbound mutations carry `op`, `operationId` and `author` inside the
//! payload next to the entity's changed fields. The server confirms a
//! mutation with an `ack` naming the operation id and the new version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::{payload_from_value, EntityId, EntityKind, Payload};
use crate::error::{Error, Result};
use crate::op::{OperationId, OperationKind};
use crate::snapshot::GameState;

/// Recognized envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    CreateSession,
    JoinSession,
    /// Handshake acknowledgement from the server.
    SessionJoined,
    JoinError,
    TokenMove,
    CharacterUpdate,
    SessionUpdate,
    EditConflict,
    SaveState,
    Heartbeat,
    /// Confirmation of a submitted operation.
    Ack,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::CreateSession => "create_session",
            MessageType::JoinSession => "join_session",
            MessageType::SessionJoined => "session_joined",
            MessageType::JoinError => "join_error",
            MessageType::TokenMove => "token_move",
            MessageType::CharacterUpdate => "character_update",
            MessageType::SessionUpdate => "session_update",
            MessageType::EditConflict => "edit_conflict",
            MessageType::SaveState => "save_state",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Ack => "ack",
        }
    }

    /// The message type that carries mutations of the given entity kind.
    pub fn for_entity_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Character => MessageType::CharacterUpdate,
            EntityKind::Token => MessageType::TokenMove,
            EntityKind::Session => MessageType::SessionUpdate,
        }
    }

    /// Payload key naming the entity for mutation messages.
    fn id_key(&self) -> Option<&'static str> {
        match self {
            MessageType::CharacterUpdate => Some("characterId"),
            MessageType::TokenMove => Some("tokenId"),
            MessageType::SessionUpdate => Some("sessionId"),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "create_session" => MessageType::CreateSession,
            "join_session" => MessageType::JoinSession,
            "session_joined" => MessageType::SessionJoined,
            "join_error" => MessageType::JoinError,
            "token_move" => MessageType::TokenMove,
            "character_update" => MessageType::CharacterUpdate,
            "session_update" => MessageType::SessionUpdate,
            "edit_conflict" => MessageType::EditConflict,
            "save_state" => MessageType::SaveState,
            "heartbeat" => MessageType::Heartbeat,
            "ack" => MessageType::Ack,
            other => return Err(Error::UnknownMessageType(other.to_string())),
        })
    }
}

/// Transport-agnostic message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Envelope {
    /// Creates an envelope with an empty payload.
    pub fn new(message_type: MessageType, timestamp: u64) -> Self {
        Envelope {
            message_type: message_type.as_str().to_string(),
            payload: Payload::new(),
            timestamp,
            entity_id: None,
            version: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    /// Returns the parsed message type.
    pub fn kind(&self) -> Result<MessageType> {
        self.message_type.parse()
    }

    /// Creates a Heartbeat message.
    pub fn heartbeat(timestamp: u64) -> Self {
        Envelope::new(MessageType::Heartbeat, timestamp)
    }

    /// Creates a CreateSession message.
    pub fn create_session(name: &str, host: &str, timestamp: u64) -> Self {
        Envelope::new(MessageType::CreateSession, timestamp)
            .with_field("name", json!(name))
            .with_field("host", json!(host))
    }

    /// Creates a JoinSession message.
    pub fn join_session(session_id: &str, user: &str, timestamp: u64) -> Self {
        Envelope::new(MessageType::JoinSession, timestamp)
            .with_field("sessionId", json!(session_id))
            .with_field("user", json!(user))
    }

    /// Creates a SaveState message carrying the full game state.
    pub fn save_state(state: &GameState, timestamp: u64) -> Result<Self> {
        let value = serde_json::to_value(state)?;
        Ok(Envelope::new(MessageType::SaveState, timestamp).with_field("gameState", value))
    }

    /// Creates a mutation message for one entity.
    ///
    /// `version` is the last server version the change was based on.
    pub fn mutation(mutation: Mutation<'_>, timestamp: u64) -> Self {
        let message_type = MessageType::for_entity_kind(mutation.kind);
        let mut payload = mutation.fields.clone();
        if let Some(key) = message_type.id_key() {
            payload.insert(key.to_string(), json!(mutation.entity_id));
        }
        payload.insert("op".to_string(), json!(mutation.op.as_str()));
        payload.insert("operationId".to_string(), json!(mutation.operation_id));
        payload.insert("author".to_string(), json!(mutation.author));
        payload.insert("kind".to_string(), json!(mutation.kind.as_str()));
        if message_type == MessageType::TokenMove {
            payload.insert("timestamp".to_string(), json!(timestamp));
        }

        Envelope::new(message_type, timestamp)
            .with_payload(payload)
            .with_entity(mutation.entity_id)
            .with_version(mutation.version)
    }

    /// Creates an Ack message (sent by servers; used by tests and tools).
    pub fn ack(entity_id: &str, operation_id: &str, version: u64, timestamp: u64) -> Self {
        Envelope::new(MessageType::Ack, timestamp)
            .with_field("operationId", json!(operation_id))
            .with_entity(entity_id)
            .with_version(version)
    }

    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes an envelope from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedMessage {
            kind: self.message_type.clone(),
            reason: reason.into(),
        }
    }
}

/// A local mutation about to be put on the wire.
#[derive(Debug, Clone, Copy)]
pub struct Mutation<'a> {
    pub entity_id: &'a str,
    pub kind: EntityKind,
    pub op: OperationKind,
    pub operation_id: &'a str,
    pub author: &'a str,
    pub fields: &'a Payload,
    pub version: u64,
}

/// A remote-originated change to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUpdate {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub op: OperationKind,
    /// Changed fields, with protocol bookkeeping keys removed.
    pub fields: Payload,
    pub version: Option<u64>,
    pub author: Option<String>,
    pub timestamp: u64,
    /// Present when the update echoes a submitted operation.
    pub operation_id: Option<OperationId>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SessionJoined {
        session_id: Option<String>,
    },
    JoinError {
        error: String,
    },
    Ack {
        entity_id: EntityId,
        operation_id: OperationId,
        version: Option<u64>,
    },
    Update(RemoteUpdate),
    EditConflict {
        entity_id: EntityId,
        conflicting_user: String,
        last_modified: u64,
    },
    SaveState {
        game_state: GameState,
    },
    Heartbeat,
    /// Session setup echoes with no client-side effect.
    SessionControl(MessageType),
}

const BOOKKEEPING_KEYS: &[&str] = &["op", "operationId", "author", "kind"];

impl InboundMessage {
    /// Decodes an envelope into a typed message.
    pub fn parse(envelope: &Envelope) -> Result<Self> {
        let message_type = envelope.kind()?;
        match message_type {
            MessageType::SessionJoined => Ok(InboundMessage::SessionJoined {
                session_id: envelope.str_field("sessionId").map(str::to_string),
            }),
            MessageType::JoinError => Ok(InboundMessage::JoinError {
                error: envelope
                    .str_field("error")
                    .unwrap_or("join rejected")
                    .to_string(),
            }),
            MessageType::Ack => {
                let entity_id = envelope
                    .entity_id
                    .clone()
                    .ok_or_else(|| envelope.malformed("missing entityId"))?;
                let operation_id = envelope
                    .str_field("operationId")
                    .ok_or_else(|| envelope.malformed("missing operationId"))?
                    .to_string();
                Ok(InboundMessage::Ack {
                    entity_id,
                    operation_id,
                    version: envelope.version,
                })
            }
            MessageType::CharacterUpdate | MessageType::TokenMove | MessageType::SessionUpdate => {
                parse_update(envelope, message_type).map(InboundMessage::Update)
            }
            MessageType::EditConflict => {
                let entity_id = envelope
                    .str_field("entityId")
                    .map(str::to_string)
                    .or_else(|| envelope.entity_id.clone())
                    .ok_or_else(|| envelope.malformed("missing entityId"))?;
                Ok(InboundMessage::EditConflict {
                    entity_id,
                    conflicting_user: envelope
                        .str_field("conflictingUser")
                        .unwrap_or("unknown")
                        .to_string(),
                    last_modified: envelope
                        .payload
                        .get("lastModified")
                        .and_then(Value::as_u64)
                        .unwrap_or(envelope.timestamp),
                })
            }
            MessageType::SaveState => {
                let value = envelope
                    .payload
                    .get("gameState")
                    .cloned()
                    .ok_or_else(|| envelope.malformed("missing gameState"))?;
                let game_state: GameState = serde_json::from_value(value)?;
                Ok(InboundMessage::SaveState { game_state })
            }
            MessageType::Heartbeat => Ok(InboundMessage::Heartbeat),
            MessageType::CreateSession | MessageType::JoinSession => {
                Ok(InboundMessage::SessionControl(message_type))
            }
        }
    }
}

fn parse_update(envelope: &Envelope, message_type: MessageType) -> Result<RemoteUpdate> {
    let id_key = message_type.id_key().unwrap_or("entityId");
    let entity_id = envelope
        .str_field(id_key)
        .map(str::to_string)
        .or_else(|| envelope.entity_id.clone())
        .ok_or_else(|| envelope.malformed(format!("missing {id_key}")))?;

    let kind = match envelope.str_field("kind") {
        Some(k) => k.parse()?,
        None => match message_type {
            MessageType::TokenMove => EntityKind::Token,
            MessageType::SessionUpdate => EntityKind::Session,
            _ => EntityKind::Character,
        },
    };
    let op = match envelope.str_field("op") {
        Some(op) => op.parse()?,
        None => OperationKind::Update,
    };

    let mut fields = envelope.payload.clone();
    fields.remove(id_key);
    for key in BOOKKEEPING_KEYS {
        fields.remove(*key);
    }
    let mut timestamp = envelope.timestamp;
    if message_type == MessageType::TokenMove {
        if let Some(ts) = fields.remove("timestamp").and_then(|v| v.as_u64()) {
            timestamp = ts;
        }
    }

    Ok(RemoteUpdate {
        entity_id,
        kind,
        op,
        fields: payload_from_value(Value::Object(fields))?,
        version: envelope.version,
        author: envelope.str_field("author").map(str::to_string),
        timestamp,
        operation_id: envelope.str_field("operationId").map(str::to_string),
    })
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
