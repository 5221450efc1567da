// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mesa-core: Shared data model for the mesa session client
//!
//! This crate provides the entity model, the local entity store, session
//! snapshots, and the message envelope exchanged with the session server.
//! It performs no I/O; the sync engine in `mesa-sync` drives it.

pub mod clock;
pub mod entity;
pub mod error;
pub mod op;
pub mod protocol;
pub mod snapshot;
pub mod store;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use entity::{Entity, EntityId, EntityKind, Payload, SyncStatus};
pub use error::{Error, Result};
pub use op::{OperationId, OperationKind};
pub use protocol::{Envelope, InboundMessage, MessageType, RemoteUpdate};
pub use snapshot::{EntityRecord, GameState, SessionSnapshot, TurnState};
pub use store::EntityStore;
