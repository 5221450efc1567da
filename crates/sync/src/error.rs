// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use mesa_core::SyncStatus;

use crate::config::ConfigError;
use crate::connection::ConnectionState;
use crate::persistence::PersistenceError;
use crate::transport::TransportError;

/// Errors returned by the sync engine for API misuse.
///
/// Timeouts, lost links and conflicts are not errors here: they become
/// connection states, entity statuses and conflict records.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid connection transition: cannot go from {from} to {to}\n  hint: from '{from}' you can go to: {valid_targets}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
        valid_targets: String,
    },

    #[error("entity {0} has an unresolved conflict\n  hint: resolve it with overwrite or merge first")]
    EntityInConflict(String),

    #[error("no conflict recorded for {0}")]
    NoConflict(String),

    #[error("nothing to retry for {entity_id}: status is {status}\n  hint: only errored or local entities can be retried")]
    NothingToRetry {
        entity_id: String,
        status: SyncStatus,
    },

    #[error("cannot discard {entity_id}: status is {status}\n  hint: only errored entities can be discarded")]
    CannotDiscard {
        entity_id: String,
        status: SyncStatus,
    },

    #[error("not connected (state: {0})\n  hint: use resync to reconnect")]
    NotConnected(ConnectionState),

    #[error("not offline (state: {0})")]
    NotOffline(ConnectionState),

    #[error("no server url configured\n  hint: call connect with a ws:// or wss:// url first")]
    NoServerUrl,

    #[error("no saved session to restore")]
    NoSnapshot,

    #[error("sync runner has stopped")]
    RunnerStopped,

    #[error(transparent)]
    Core(#[from] mesa_core::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
