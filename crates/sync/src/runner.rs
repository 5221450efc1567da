// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Async driver for the sync engine.
//!
//! The runner owns a [`StateSynchronizer`] and a [`Transport`] and drives
//! both from a single `select!` loop: inbound frames, the next timer
//! deadline, commands from a [`RunnerHandle`], and a shutdown token.
//! Directives the engine emits are executed in order after every step.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mesa_core::{ClockSource, Entity, EntityId, Envelope, SyncStatus, SystemClock, TurnState};

use crate::conflict::Resolution;
use crate::connection::ConnectionState;
use crate::error::{SyncError, SyncResult};
use crate::synchronizer::{Change, Directive, RestoreSummary, StateSynchronizer};
use crate::transport::{Transport, TransportError, TransportResult};

type Reply<T> = oneshot::Sender<SyncResult<T>>;

/// A request from the UI side to the runner.
#[derive(Debug)]
pub enum Command {
    Connect {
        url: String,
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Mutate {
        entity_id: EntityId,
        change: Change,
        reply: Reply<SyncStatus>,
    },
    Retry {
        entity_id: EntityId,
        reply: Reply<SyncStatus>,
    },
    Discard {
        entity_id: EntityId,
        reply: Reply<()>,
    },
    Resolve {
        entity_id: EntityId,
        resolution: Resolution,
        reply: Reply<SyncStatus>,
    },
    ContinueOffline {
        reply: Reply<()>,
    },
    Resync {
        reply: Reply<()>,
    },
    RestoreSession {
        reply: Reply<RestoreSummary>,
    },
    SaveState {
        reply: Reply<()>,
    },
    SetTurn(TurnState),
    Entity {
        entity_id: EntityId,
        reply: oneshot::Sender<Option<Entity>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
}

/// Cloneable handle for talking to a running [`Runner`].
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl RunnerHandle {
    async fn request<R>(&self, command: impl FnOnce(Reply<R>) -> Command) -> SyncResult<R> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| SyncError::RunnerStopped)?;
        rx.await.map_err(|_| SyncError::RunnerStopped)?
    }

    pub async fn connect(&self, url: &str) -> SyncResult<()> {
        let url = url.to_string();
        self.request(|reply| Command::Connect { url, reply }).await
    }

    pub async fn disconnect(&self) -> SyncResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn mutate(&self, entity_id: &str, change: Change) -> SyncResult<SyncStatus> {
        let entity_id = entity_id.to_string();
        self.request(|reply| Command::Mutate {
            entity_id,
            change,
            reply,
        })
        .await
    }

    pub async fn retry(&self, entity_id: &str) -> SyncResult<SyncStatus> {
        let entity_id = entity_id.to_string();
        self.request(|reply| Command::Retry { entity_id, reply })
            .await
    }

    pub async fn discard(&self, entity_id: &str) -> SyncResult<()> {
        let entity_id = entity_id.to_string();
        self.request(|reply| Command::Discard { entity_id, reply })
            .await
    }

    pub async fn resolve_conflict(
        &self,
        entity_id: &str,
        resolution: Resolution,
    ) -> SyncResult<SyncStatus> {
        let entity_id = entity_id.to_string();
        self.request(|reply| Command::Resolve {
            entity_id,
            resolution,
            reply,
        })
        .await
    }

    pub async fn continue_offline(&self) -> SyncResult<()> {
        self.request(|reply| Command::ContinueOffline { reply })
            .await
    }

    pub async fn resync(&self) -> SyncResult<()> {
        self.request(|reply| Command::Resync { reply }).await
    }

    pub async fn restore_session_state(&self) -> SyncResult<RestoreSummary> {
        self.request(|reply| Command::RestoreSession { reply })
            .await
    }

    pub async fn save_state(&self) -> SyncResult<()> {
        self.request(|reply| Command::SaveState { reply }).await
    }

    pub fn set_turn(&self, turn: TurnState) -> SyncResult<()> {
        self.commands
            .send(Command::SetTurn(turn))
            .map_err(|_| SyncError::RunnerStopped)
    }

    pub async fn entity(&self, entity_id: &str) -> SyncResult<Option<Entity>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Entity {
                entity_id: entity_id.to_string(),
                reply,
            })
            .map_err(|_| SyncError::RunnerStopped)?;
        rx.await.map_err(|_| SyncError::RunnerStopped)
    }

    pub async fn connection_state(&self) -> SyncResult<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::State { reply })
            .map_err(|_| SyncError::RunnerStopped)?;
        rx.await.map_err(|_| SyncError::RunnerStopped)
    }

    /// Asks the runner to disconnect and stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Owns the engine and the transport for the lifetime of a session.
pub struct Runner<T, C = SystemClock> {
    engine: StateSynchronizer<C>,
    transport: T,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
}

impl<T: Transport, C: ClockSource> Runner<T, C> {
    pub fn new(engine: StateSynchronizer<C>, transport: T) -> (Self, RunnerHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = RunnerHandle {
            commands: tx,
            shutdown: shutdown.clone(),
        };
        let runner = Runner {
            engine,
            transport,
            commands,
            shutdown,
        };
        (runner, handle)
    }

    /// Runs until shutdown is requested, then disconnects and returns the
    /// engine.
    pub async fn run(mut self) -> StateSynchronizer<C> {
        info!("sync runner started");
        loop {
            self.flush().await;
            if self.shutdown.is_cancelled() {
                break;
            }

            let linked = self.transport.is_connected();
            let wait = self.engine.time_to_next_deadline();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                received = self.transport.recv(), if linked => self.on_received(received),

                Some(command) = self.commands.recv() => self.handle(command),

                _ = tokio::time::sleep(Duration::from_millis(wait.unwrap_or_default())), if wait.is_some() => {
                    self.engine.tick();
                }
            }
        }

        if let Err(e) = self.engine.disconnect() {
            warn!(error = %e, "disconnect on shutdown failed");
        }
        self.flush().await;
        info!("sync runner stopped");
        self.engine
    }

    fn on_received(&mut self, received: TransportResult<Option<Envelope>>) {
        match received {
            Ok(Some(envelope)) => {
                if let Err(e) = self.engine.on_inbound_message(envelope) {
                    warn!(error = %e, "inbound message rejected");
                }
            }
            Ok(None) => self.engine.on_transport_closed(None),
            Err(e) if !e.is_fatal() => warn!(error = %e, "skipping unreadable frame"),
            Err(e) => self.engine.on_transport_error(&e.to_string()),
        }
    }

    fn handle(&mut self, command: Command) {
        let engine = &mut self.engine;
        match command {
            Command::Connect { url, reply } => {
                let _ = reply.send(engine.connect(&url));
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(engine.disconnect());
            }
            Command::Mutate {
                entity_id,
                change,
                reply,
            } => {
                let _ = reply.send(engine.mutate(&entity_id, change));
            }
            Command::Retry { entity_id, reply } => {
                let _ = reply.send(engine.retry(&entity_id));
            }
            Command::Discard { entity_id, reply } => {
                let _ = reply.send(engine.discard(&entity_id));
            }
            Command::Resolve {
                entity_id,
                resolution,
                reply,
            } => {
                let _ = reply.send(engine.resolve_conflict(&entity_id, resolution));
            }
            Command::ContinueOffline { reply } => {
                let _ = reply.send(engine.continue_offline());
            }
            Command::Resync { reply } => {
                let _ = reply.send(engine.resync());
            }
            Command::RestoreSession { reply } => {
                let _ = reply.send(engine.restore_session_state());
            }
            Command::SaveState { reply } => {
                let _ = reply.send(engine.save_state());
            }
            Command::SetTurn(turn) => engine.set_turn(turn),
            Command::Entity { entity_id, reply } => {
                let _ = reply.send(engine.entity(&entity_id).cloned());
            }
            Command::State { reply } => {
                let _ = reply.send(engine.connection_state());
            }
        }
    }

    /// Executes pending directives until the engine has nothing left.
    async fn flush(&mut self) {
        loop {
            let directives = self.engine.drain_outbox();
            if directives.is_empty() {
                return;
            }
            for directive in directives {
                match directive {
                    Directive::Open { url } => self.open(&url).await,
                    Directive::Send(envelope) => {
                        if !self.transport.is_connected() {
                            debug!(kind = %envelope.message_type, "link down, dropping send");
                            continue;
                        }
                        if let Err(e) = self.transport.send(envelope).await {
                            self.engine.on_transport_error(&e.to_string());
                        }
                    }
                    Directive::Close => {
                        if let Err(e) = self.transport.disconnect().await {
                            debug!(error = %e, "close failed");
                        }
                    }
                }
            }
        }
    }

    async fn open(&mut self, url: &str) {
        debug!(%url, "opening transport");
        let limit = match self.engine.connect_timeout_ms() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let connect = self.transport.connect(url);
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = async {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, connect)
                        .await
                        .unwrap_or_else(|_| {
                            Err(TransportError::ConnectionFailed(format!(
                                "timed out after {}ms",
                                limit.as_millis()
                            )))
                        }),
                    None => connect.await,
                }
            } => result,
        };

        match result {
            Ok(()) => self.engine.on_transport_opened(),
            Err(e) => self.engine.on_transport_error(&e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
