// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use mesa_core::SystemClock;

use crate::config::validate_url;
use crate::connection::ConnectionState;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::persistence::{FileSnapshotStore, PersistenceGateway};
use crate::runner::{Runner, RunnerHandle};
use crate::synchronizer::StateSynchronizer;
use crate::transport::{TransportError, WebSocketTransport};

use super::load_config;

/// Connect and print sync events until interrupted or the link gives up.
pub async fn run(
    url: Option<String>,
    config: Option<PathBuf>,
    user: Option<String>,
    session: Option<String>,
) -> SyncResult<()> {
    let mut config = load_config(config.as_deref())?;
    if let Some(user) = user {
        config.user = user;
    }
    if session.is_some() {
        config.session_id = session;
    }
    let url = url.or_else(|| config.url.clone()).ok_or(SyncError::NoServerUrl)?;
    validate_url(&url)?;

    let snapshot_path = config.snapshot_path()?;
    info!(%url, snapshot = %snapshot_path.display(), "connecting");

    let (sink, mut events) = EventSink::channel();
    let engine = StateSynchronizer::new(
        &config,
        SystemClock,
        PersistenceGateway::new(FileSnapshotStore::new(snapshot_path)),
        sink,
    );
    let (runner, handle) = Runner::new(engine, WebSocketTransport::new());
    let task = tokio::spawn(runner.run());

    let outcome = match handle.connect(&url).await {
        Ok(()) => watch(&handle, &mut events).await,
        Err(e) => Err(e),
    };

    handle.shutdown();
    if let Err(e) = task.await {
        warn!(error = %e, "sync runner task failed");
    }
    while let Ok(event) = events.try_recv() {
        println!("{event}");
    }
    outcome
}

async fn watch(handle: &RunnerHandle, events: &mut UnboundedReceiver<SyncEvent>) -> SyncResult<()> {
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => return Ok(()),
            },
        };
        println!("{event}");

        match event {
            SyncEvent::ConnectionChanged {
                state: ConnectionState::Errored,
                error,
            } => {
                let message = error.unwrap_or_else(|| "connection failed".to_string());
                return Err(TransportError::ConnectionFailed(message).into());
            }
            SyncEvent::ServerState { .. } => match handle.restore_session_state().await {
                Ok(summary) => println!(
                    "restored {} saved entities ({} local)",
                    summary.entities, summary.local
                ),
                Err(SyncError::NoSnapshot) => {}
                Err(e) => warn!(error = %e, "restore failed"),
            },
            SyncEvent::OfflineOffered => {
                handle.continue_offline().await?;
                println!("continuing offline; local changes stay in the snapshot");
                return Ok(());
            }
            _ => {}
        }
    }
}
