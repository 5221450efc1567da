// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mesa_sync - client-side state sync for shared tabletop sessions.
//!
//! The crate keeps a local copy of the session's entities in step with the
//! session server over a WebSocket, and survives flaky links without losing
//! edits.
//!
//! # Main Components
//!
//! - [`StateSynchronizer`] - sans-IO engine: connection lifecycle, optimistic
//!   mutations, acks, conflicts and snapshots
//! - [`Runner`] - async driver pairing the engine with a [`Transport`]
//! - [`ClientConfig`] - TOML configuration with sensible defaults
//! - [`SyncEvent`] - everything the UI needs to render, delivered over a channel
//!
//! ```rust,ignore
//! use mesa_sync::{ClientConfig, EventSink, FileSnapshotStore, PersistenceGateway,
//!     Runner, StateSynchronizer, WebSocketTransport};
//!
//! let config = ClientConfig::default();
//! let (sink, mut events) = EventSink::channel();
//! let gateway = PersistenceGateway::new(FileSnapshotStore::new(config.snapshot_path()?));
//! let engine = StateSynchronizer::new(&config, SystemClock, gateway, sink);
//! let (runner, handle) = Runner::new(engine, WebSocketTransport::new());
//! tokio::spawn(runner.run());
//! handle.connect("wss://table.example/ws").await?;
//! ```

mod cli;
mod commands;

pub mod config;
pub mod conflict;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod ledger;
pub mod persistence;
pub mod retry;
pub mod runner;
pub mod synchronizer;
pub mod timers;
pub mod transport;

pub use cli::{Cli, Command, ConfigCommand, SnapshotCommand};
pub use config::ClientConfig;
pub use conflict::{ConflictDiff, ConflictRecord, ConflictResolver, Resolution};
pub use connection::{ConnectionController, ConnectionState};
pub use error::{SyncError, SyncResult};
pub use events::{EventSink, RetryProgress, SyncEvent};
pub use heartbeat::HeartbeatMonitor;
pub use ledger::PendingOperationLedger;
pub use persistence::{
    BoardHandle, FileSnapshotStore, MemorySnapshotStore, PersistenceGateway, SnapshotStore,
};
pub use retry::RetryScheduler;
pub use runner::{Runner, RunnerHandle};
pub use synchronizer::{Change, Directive, RestoreSummary, StateSynchronizer};
pub use transport::{Transport, TransportError, WebSocketTransport};

/// Execute a CLI command.
pub async fn run(command: Command) -> SyncResult<()> {
    match command {
        Command::Connect {
            url,
            config,
            user,
            session,
        } => commands::connect::run(url, config, user, session).await,
        Command::Snapshot { command } => commands::snapshot::run(command),
        Command::Config { command } => commands::config::run(command),
    }
}
