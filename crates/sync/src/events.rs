// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! UI-facing events.
//!
//! The engine never calls back into the UI. Events go onto an unbounded
//! channel and the UI drains it on its own schedule, so a callback can
//! never run inside the call that caused it.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use mesa_core::{EntityId, SyncStatus, TurnState};

use crate::conflict::ConflictRecord;
use crate::connection::ConnectionState;

/// Something the UI should render.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A user-facing error message.
    Error(String),
    ConnectionChanged {
        state: ConnectionState,
        error: Option<String>,
    },
    /// A reconnect attempt was scheduled.
    RetryProgress(RetryProgress),
    /// Retries ran out; the UI should offer to continue offline.
    OfflineOffered,
    EntityStatus {
        entity_id: EntityId,
        status: SyncStatus,
    },
    EntityRemoved {
        entity_id: EntityId,
    },
    Conflict(ConflictRecord),
    ConflictResolved {
        entity_id: EntityId,
    },
    SessionJoined {
        session_id: Option<String>,
    },
    /// The server sent its authoritative state; a restore is possible.
    ServerState {
        entities: usize,
        turn: Option<TurnState>,
    },
    SnapshotSaved {
        entities: usize,
        turn: Option<TurnState>,
    },
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Error(message) => write!(f, "error: {message}"),
            SyncEvent::ConnectionChanged { state, error: None } => write!(f, "connection {state}"),
            SyncEvent::ConnectionChanged {
                state,
                error: Some(error),
            } => write!(f, "connection {state} ({error})"),
            SyncEvent::RetryProgress(p) => {
                write!(f, "reconnecting, {} in {}ms", p.message(), p.delay_ms)
            }
            SyncEvent::OfflineOffered => write!(f, "server unreachable, offline mode available"),
            SyncEvent::EntityStatus { entity_id, status } => write!(f, "{entity_id}: {status}"),
            SyncEvent::EntityRemoved { entity_id } => write!(f, "{entity_id}: removed"),
            SyncEvent::Conflict(record) => write!(
                f,
                "{}: conflicting edit by {} (v{} vs v{})",
                record.entity_id, record.remote_author, record.local_version, record.remote_version
            ),
            SyncEvent::ConflictResolved { entity_id } => write!(f, "{entity_id}: conflict resolved"),
            SyncEvent::SessionJoined {
                session_id: Some(id),
            } => write!(f, "joined session {id}"),
            SyncEvent::SessionJoined { session_id: None } => write!(f, "joined session"),
            SyncEvent::ServerState { entities, turn } => {
                write!(f, "server state: {entities} entities")?;
                write_turn(f, *turn)
            }
            SyncEvent::SnapshotSaved { entities, turn } => {
                write!(f, "snapshot saved: {entities} entities")?;
                write_turn(f, *turn)
            }
        }
    }
}

fn write_turn(f: &mut fmt::Formatter<'_>, turn: Option<TurnState>) -> fmt::Result {
    match turn {
        Some(t) => write!(f, ", round {} turn {}", t.round, t.turn),
        None => Ok(()),
    }
}

/// One scheduled reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProgress {
    pub attempt: u32,
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl RetryProgress {
    /// Human-readable progress, e.g. "attempt 2 of 3".
    pub fn message(&self) -> String {
        format!("attempt {} of {}", self.attempt, self.max_retries)
    }
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl EventSink {
    /// Creates a sink and the receiver the UI drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx }, rx)
    }

    /// Queues an event. Dropped silently once the UI is gone.
    pub fn emit(&self, event: SyncEvent) {
        trace!(?event, "emit");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
