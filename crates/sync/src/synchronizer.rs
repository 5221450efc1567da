// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sync engine.
//!
//! [`StateSynchronizer`] wires the connection controller, heartbeat monitor,
//! retry scheduler, pending-operation ledger, conflict resolver and
//! persistence gateway around the local entity store. It is synchronous and
//! does no I/O: transport work is emitted as [`Directive`]s for the runner,
//! and UI notifications go out as events.
//!
//! Mutations apply to the store before `mutate` returns. While a link is up
//! or being established they are tracked by the ledger and submitted; once
//! the connection is at rest they stay Local until a resync.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};
use uuid::Uuid;

use mesa_core::protocol::Mutation;
use mesa_core::{
    ClockSource, Entity, EntityId, EntityKind, EntityRecord, EntityStore, Envelope, GameState,
    InboundMessage, OperationKind, Payload, RemoteUpdate, SyncStatus, SystemClock, TurnState,
};

use crate::config::ClientConfig;
use crate::conflict::{
    is_stale, ConflictDiff, ConflictRecord, ConflictResolver, RemoteEdit, Resolution, Resolved,
};
use crate::connection::{connection_failed, ConnectionController, ConnectionState};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::ledger::{rollback, PendingOperation, PendingOperationLedger};
use crate::persistence::{merge_snapshots, PersistenceGateway};
use crate::retry::RetryScheduler;

/// Transport work requested by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Open { url: String },
    Send(Envelope),
    Close,
}

/// A local change to one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Create { kind: EntityKind, payload: Payload },
    /// Changed fields only. A null value removes the field.
    Update(Payload),
    Delete,
}

impl Change {
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            Change::Create { .. } => OperationKind::Create,
            Change::Update(_) => OperationKind::Update,
            Change::Delete => OperationKind::Delete,
        }
    }
}

/// Outcome of [`StateSynchronizer::restore_session_state`].
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSummary {
    pub entities: usize,
    /// Entities left with local changes the server has not seen.
    pub local: usize,
    pub turn: Option<TurnState>,
}

pub struct StateSynchronizer<C = SystemClock> {
    clock: C,
    user: String,
    session_id: Option<String>,
    session_name: String,
    store: EntityStore,
    turn: Option<TurnState>,
    connection: ConnectionController,
    heartbeat: HeartbeatMonitor,
    retry: RetryScheduler,
    ledger: PendingOperationLedger,
    conflicts: ConflictResolver,
    persistence: PersistenceGateway,
    events: EventSink,
    outbox: Vec<Directive>,
    /// Non-mutation messages held while the link is being re-established.
    queue: VecDeque<Envelope>,
    /// Deletes made while at rest, submitted on resync.
    local_deletes: BTreeMap<EntityId, Entity>,
    server_state: Option<GameState>,
    resync_pending: bool,
    offline_continued: bool,
}

impl<C: ClockSource> StateSynchronizer<C> {
    pub fn new(
        config: &ClientConfig,
        clock: C,
        persistence: PersistenceGateway,
        events: EventSink,
    ) -> Self {
        StateSynchronizer {
            clock,
            user: config.user.clone(),
            session_id: config.session_id.clone(),
            session_name: config.session_name.clone(),
            store: EntityStore::new(),
            turn: None,
            connection: ConnectionController::new(config.connect_timeout_ms, events.clone()),
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            retry: RetryScheduler::new(
                config.max_retries,
                config.retry_initial_delay_ms,
                config.retry_max_delay_ms,
            ),
            ledger: PendingOperationLedger::new(config.operation_deadline_ms),
            conflicts: ConflictResolver::new(),
            persistence,
            events,
            outbox: Vec::new(),
            queue: VecDeque::new(),
            local_deletes: BTreeMap::new(),
            server_state: None,
            resync_pending: false,
            offline_continued: false,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.store.get(id)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.connection.connect_timeout_ms()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.connection.last_error()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn turn(&self) -> Option<TurnState> {
        self.turn
    }

    pub fn pending(&self, entity_id: &str) -> Option<&PendingOperation> {
        self.ledger.get(entity_id)
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn conflict(&self, entity_id: &str) -> Option<&ConflictRecord> {
        self.conflicts.get(entity_id)
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    /// Field-level preview of a conflict for the UI.
    pub fn diff(&self, entity_id: &str) -> SyncResult<ConflictDiff> {
        self.conflicts.diff(&self.store, entity_id)
    }

    pub fn server_state(&self) -> Option<&GameState> {
        self.server_state.as_ref()
    }

    /// Reconnect progress, e.g. "attempt 2 of 3".
    pub fn retry_progress(&self) -> String {
        self.retry.progress()
    }

    pub fn is_offline_continued(&self) -> bool {
        self.offline_continued
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Takes the transport work accumulated since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.outbox)
    }

    /// Milliseconds until the next timer is due, zero if one is overdue.
    pub fn time_to_next_deadline(&self) -> Option<u64> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(self.now()))
    }

    /// Earliest timer deadline across all components.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.connection.next_deadline(),
            self.heartbeat.next_deadline(),
            self.retry.next_deadline(),
            self.ledger.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // Connection lifecycle

    /// Starts connecting to the session server.
    pub fn connect(&mut self, url: &str) -> SyncResult<()> {
        let now = self.now();
        self.connection.connect(url, now)?;
        self.retry.reset();
        self.outbox.push(Directive::Open {
            url: url.to_string(),
        });
        Ok(())
    }

    /// Hangs up. Cancels every timer and pending operation, then saves a
    /// snapshot.
    pub fn disconnect(&mut self) -> SyncResult<()> {
        self.cancel_timers();
        self.release_pending();
        self.queue.clear();
        if self.connection.disconnect()? {
            self.outbox.push(Directive::Close);
            self.persist_snapshot();
        }
        Ok(())
    }

    /// Cancels every timer and pending operation without saving. Called
    /// when the engine is dropped by its owner.
    pub fn teardown(&mut self) {
        self.cancel_timers();
        self.release_pending();
        self.queue.clear();
        self.outbox.clear();
        if let Ok(true) = self.connection.disconnect() {
            self.outbox.push(Directive::Close);
        }
    }

    /// Leaves Offline (or any resting state), reconnects, and submits every
    /// local change once connected.
    pub fn resync(&mut self) -> SyncResult<()> {
        let url = self
            .connection
            .url()
            .map(str::to_string)
            .ok_or(SyncError::NoServerUrl)?;
        self.connect(&url)?;
        self.resync_pending = true;
        self.offline_continued = false;
        Ok(())
    }

    /// Accepts working offline after retries ran out. Pending operations
    /// are dropped and their entities become Local.
    pub fn continue_offline(&mut self) -> SyncResult<()> {
        let state = self.connection.state();
        if state != ConnectionState::Offline {
            return Err(SyncError::NotOffline(state));
        }
        self.retry.reset();
        self.release_pending();
        self.offline_continued = true;
        info!("continuing offline");
        Ok(())
    }

    /// The transport finished opening; start the handshake.
    pub fn on_transport_opened(&mut self) {
        match self.connection.state() {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                let now = self.now();
                let handshake = match self.session_id {
                    Some(ref id) => Envelope::join_session(id, &self.user, now),
                    None => Envelope::create_session(&self.session_name, &self.user, now),
                };
                debug!(kind = %handshake.message_type, "transport open, sending handshake");
                self.outbox.push(Directive::Send(handshake));
            }
            state => debug!(%state, "transport opened in unexpected state"),
        }
    }

    /// The peer closed the link.
    pub fn on_transport_closed(&mut self, reason: Option<&str>) {
        let detail = reason.unwrap_or("connection closed");
        match self.connection.state() {
            ConnectionState::Connected => self.link_lost(Some(connection_failed(detail))),
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.attempt_failed(detail)
            }
            state => debug!(%state, "transport closed while at rest"),
        }
    }

    /// Opening, sending or receiving failed.
    pub fn on_transport_error(&mut self, detail: &str) {
        match self.connection.state() {
            ConnectionState::Connected => {
                let message = self.connection.report_failure(detail);
                self.link_lost(Some(message));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.attempt_failed(detail)
            }
            _ => {
                self.connection.report_failure(detail);
            }
        }
    }

    fn enter(&mut self, next: ConnectionState, error: Option<String>) -> SyncResult<()> {
        self.connection.transition(next, error)?;
        if next != ConnectionState::Connected {
            self.heartbeat.stop();
        }
        if next.is_linked() && next != ConnectionState::Connected {
            self.ledger.hold_all();
        }
        if next == ConnectionState::Connected {
            self.on_connected();
        } else if next.is_resting() {
            self.persist_snapshot();
        }
        Ok(())
    }

    fn on_connected(&mut self) {
        let now = self.now();
        self.retry.reset();
        self.heartbeat.start(now);

        while let Some(envelope) = self.queue.pop_front() {
            self.outbox.push(Directive::Send(envelope));
        }

        self.ledger.rearm_all(now);
        let resubmit: Vec<Envelope> = self
            .ledger
            .pending()
            .into_iter()
            .map(|op| op.message.clone())
            .collect();
        if !resubmit.is_empty() {
            info!(count = resubmit.len(), "resubmitting unconfirmed operations");
        }
        self.outbox
            .extend(resubmit.into_iter().map(Directive::Send));

        if self.resync_pending {
            self.resync_pending = false;
            self.submit_local_changes();
        }
    }

    fn link_lost(&mut self, error: Option<String>) {
        self.outbox.push(Directive::Close);
        let result = if self.retry.max_retries() > 0 {
            self.enter(ConnectionState::Reconnecting, error)
                .map(|()| self.schedule_reconnect())
        } else {
            let error = error.or_else(|| Some(connection_failed("connection lost")));
            self.enter(ConnectionState::Errored, error)
        };
        if let Err(e) = result {
            warn!(error = %e, "could not handle lost link");
        }
    }

    fn attempt_failed(&mut self, detail: &str) {
        self.connection.disarm_attempt();
        let message = self.connection.report_failure(detail);
        self.outbox.push(Directive::Close);
        match self.connection.state() {
            ConnectionState::Connecting => {
                if let Err(e) = self.enter(ConnectionState::Errored, Some(message)) {
                    warn!(error = %e, "could not enter errored state");
                }
            }
            ConnectionState::Reconnecting => self.schedule_reconnect(),
            _ => {}
        }
    }

    fn schedule_reconnect(&mut self) {
        let now = self.now();
        match self.retry.schedule(now) {
            Some(progress) => {
                info!(progress = %progress.message(), delay_ms = progress.delay_ms, "reconnecting");
                self.events.emit(SyncEvent::RetryProgress(progress));
            }
            None => {
                let reason = format!(
                    "gave up after {} attempts",
                    self.retry.max_retries()
                );
                warn!(%reason, "going offline");
                if let Err(e) = self.enter(ConnectionState::Offline, Some(reason)) {
                    warn!(error = %e, "could not go offline");
                }
                self.events.emit(SyncEvent::OfflineOffered);
            }
        }
    }

    fn cancel_timers(&mut self) {
        self.heartbeat.stop();
        self.retry.reset();
        self.connection.disarm_attempt();
    }

    /// Drops every pending operation without rollback. Entities waiting on
    /// them become Local; deletes are kept for a later resync.
    fn release_pending(&mut self) {
        for op in self.ledger.cancel_all() {
            if op.kind == OperationKind::Delete {
                if let Some(snapshot) = op.original_snapshot {
                    self.local_deletes.insert(op.entity_id.clone(), snapshot);
                }
                continue;
            }
            let is_syncing = self
                .store
                .get(&op.entity_id)
                .is_some_and(|e| e.sync_status == SyncStatus::Syncing);
            if is_syncing && self.set_status(&op.entity_id, SyncStatus::Local).is_ok() {
                debug!(entity = %op.entity_id, "pending operation released");
            }
        }
    }

    // Mutations

    /// Applies a local change and submits it.
    ///
    /// Returns the entity's resulting status: Syncing while a link is up or
    /// being established, Local otherwise. Deletes report the status the
    /// removed entity would have had.
    pub fn mutate(&mut self, entity_id: &str, change: Change) -> SyncResult<SyncStatus> {
        if let Some(entity) = self.store.get(entity_id) {
            if entity.sync_status == SyncStatus::Conflict {
                return Err(SyncError::EntityInConflict(entity_id.to_string()));
            }
        }
        let linked = self.connection.state().is_linked();

        match change {
            Change::Create { kind, payload } => {
                self.store
                    .insert(Entity::new_local(entity_id, kind, payload.clone()))?;
                self.local_deletes.remove(entity_id);
                debug!(entity = %entity_id, %kind, "created locally");
                if linked {
                    let entity = self.require(entity_id)?.clone();
                    self.submit(&entity, OperationKind::Create, None, payload)?;
                    return Ok(SyncStatus::Syncing);
                }
            }
            Change::Update(patch) => {
                let before = self.require(entity_id)?.clone();
                let op_kind = if before.base.is_none() {
                    // The server has never confirmed this entity.
                    OperationKind::Create
                } else {
                    OperationKind::Update
                };
                let entity = self.store.entity_mut(entity_id)?;
                entity.apply_patch(&patch);
                entity.last_op = Some(op_kind);
                let after = entity.clone();
                if linked {
                    let fields = match op_kind {
                        OperationKind::Create => after.payload.clone(),
                        _ => patch,
                    };
                    let snapshot = (op_kind == OperationKind::Update).then_some(before);
                    self.submit(&after, op_kind, snapshot, fields)?;
                    return Ok(SyncStatus::Syncing);
                }
            }
            Change::Delete => {
                let removed = self
                    .store
                    .remove(entity_id)
                    .ok_or_else(|| mesa_core::Error::EntityNotFound(entity_id.to_string()))?;
                self.conflicts.forget(entity_id);
                self.events.emit(SyncEvent::EntityRemoved {
                    entity_id: entity_id.to_string(),
                });
                if removed.base.is_none() && !self.ledger.contains(entity_id) {
                    // Never reached the server; nothing to tell it.
                    return Ok(SyncStatus::Synced);
                }
                if linked {
                    self.submit(
                        &removed,
                        OperationKind::Delete,
                        Some(removed.clone()),
                        Payload::new(),
                    )?;
                    return Ok(SyncStatus::Syncing);
                }
                self.ledger.cancel(entity_id);
                self.local_deletes.insert(entity_id.to_string(), removed);
                return Ok(SyncStatus::Local);
            }
        }

        // At rest: keep the change local.
        self.ledger.cancel(entity_id);
        self.set_status(entity_id, SyncStatus::Local)?;
        Ok(SyncStatus::Local)
    }

    /// Registers and sends one operation.
    fn submit(
        &mut self,
        entity: &Entity,
        op: OperationKind,
        snapshot: Option<Entity>,
        fields: Payload,
    ) -> SyncResult<()> {
        let now = self.now();
        let operation_id = Uuid::new_v4().to_string();
        let envelope = Envelope::mutation(
            Mutation {
                entity_id: &entity.id,
                kind: entity.kind,
                op,
                operation_id: &operation_id,
                author: &self.user,
                fields: &fields,
                version: entity.version,
            },
            now,
        );

        if self.store.contains(&entity.id) {
            self.set_status(&entity.id, SyncStatus::Syncing)?;
        }
        let pending = PendingOperation::new(
            operation_id.clone(),
            entity.id.clone(),
            op,
            snapshot,
            envelope.clone(),
        );
        debug!(entity = %entity.id, %op, %operation_id, "operation submitted");

        if self.connection.state() == ConnectionState::Connected {
            self.ledger.register(pending, now);
            self.outbox.push(Directive::Send(envelope));
        } else {
            // Deadline starts once the link is back.
            self.ledger.hold(pending, now);
        }
        Ok(())
    }

    fn submit_local_changes(&mut self) {
        let local = self.store.ids_with_status(SyncStatus::Local);
        let deletes = std::mem::take(&mut self.local_deletes);
        info!(
            entities = local.len(),
            deletes = deletes.len(),
            "submitting local changes"
        );

        for id in local {
            let Some(entity) = self.store.get(&id).cloned() else {
                continue;
            };
            let op = match entity.last_op {
                Some(OperationKind::Create) => OperationKind::Create,
                _ if entity.base.is_none() => OperationKind::Create,
                _ => OperationKind::Update,
            };
            let snapshot = (op == OperationKind::Update).then(|| entity.clone());
            if let Err(e) = self.submit(&entity, op, snapshot, entity.payload.clone()) {
                warn!(entity = %id, error = %e, "could not submit local change");
            }
        }
        for (id, removed) in deletes {
            if let Err(e) = self.submit(
                &removed,
                OperationKind::Delete,
                Some(removed.clone()),
                Payload::new(),
            ) {
                warn!(entity = %id, error = %e, "could not submit local delete");
            }
        }
    }

    /// Resubmits an errored or local entity from its own retained state.
    pub fn retry(&mut self, entity_id: &str) -> SyncResult<SyncStatus> {
        let entity = self.require(entity_id)?.clone();
        if !matches!(entity.sync_status, SyncStatus::Error | SyncStatus::Local) {
            return Err(SyncError::NothingToRetry {
                entity_id: entity_id.to_string(),
                status: entity.sync_status,
            });
        }
        let state = self.connection.state();
        if !state.is_linked() {
            return Err(SyncError::NotConnected(state));
        }

        let op = match entity.last_op {
            Some(op) => op,
            None if entity.base.is_none() => OperationKind::Create,
            None => OperationKind::Update,
        };
        info!(entity = %entity_id, %op, "retrying");
        match op {
            OperationKind::Create => {
                self.submit(&entity, op, None, entity.payload.clone())?;
            }
            OperationKind::Update => {
                self.submit(&entity, op, Some(entity.clone()), entity.payload.clone())?;
            }
            OperationKind::Delete => {
                self.store.remove(entity_id);
                self.events.emit(SyncEvent::EntityRemoved {
                    entity_id: entity_id.to_string(),
                });
                self.submit(&entity, op, Some(entity.clone()), Payload::new())?;
            }
        }
        Ok(SyncStatus::Syncing)
    }

    /// Gives up on an errored entity: an unconfirmed create is dropped,
    /// anything else reverts to its last authoritative payload.
    pub fn discard(&mut self, entity_id: &str) -> SyncResult<()> {
        let entity = self.require(entity_id)?.clone();
        if entity.sync_status != SyncStatus::Error {
            return Err(SyncError::CannotDiscard {
                entity_id: entity_id.to_string(),
                status: entity.sync_status,
            });
        }
        self.ledger.cancel(entity_id);

        match entity.base {
            None => {
                self.store.remove(entity_id);
                info!(entity = %entity_id, "discarded unconfirmed create");
                self.events.emit(SyncEvent::EntityRemoved {
                    entity_id: entity_id.to_string(),
                });
            }
            Some(base) => {
                let stored = self.store.entity_mut(entity_id)?;
                stored.payload = base;
                stored.last_op = None;
                self.set_status(entity_id, SyncStatus::Synced)?;
                info!(entity = %entity_id, "discarded local edit");
            }
        }
        Ok(())
    }

    /// Settles a conflict the way the user chose.
    pub fn resolve_conflict(
        &mut self,
        entity_id: &str,
        resolution: Resolution,
    ) -> SyncResult<SyncStatus> {
        let outcome = self
            .conflicts
            .resolve(&mut self.store, entity_id, resolution)?;
        self.events.emit(SyncEvent::ConflictResolved {
            entity_id: entity_id.to_string(),
        });

        match outcome {
            Resolved::Adopted => {
                self.emit_status(entity_id);
                Ok(SyncStatus::Synced)
            }
            Resolved::Merged(payload) => {
                if self.connection.state().is_linked() {
                    let entity = self.require(entity_id)?.clone();
                    self.submit(
                        &entity,
                        OperationKind::Update,
                        Some(entity.clone()),
                        payload,
                    )?;
                    Ok(SyncStatus::Syncing)
                } else {
                    if let Ok(entity) = self.store.entity_mut(entity_id) {
                        entity.last_op = Some(OperationKind::Update);
                    }
                    self.set_status(entity_id, SyncStatus::Local)?;
                    Ok(SyncStatus::Local)
                }
            }
        }
    }

    // Session helpers

    pub fn set_turn(&mut self, turn: TurnState) {
        debug!(round = turn.round, turn = turn.turn, "turn advanced");
        self.turn = Some(turn);
    }

    /// Creates a new session. Sent now if connected, otherwise used as the
    /// handshake on the next connect.
    pub fn create_session(&mut self, name: &str) -> SyncResult<()> {
        self.session_name = name.to_string();
        self.session_id = None;
        if self.connection.state() == ConnectionState::Connected {
            let envelope = Envelope::create_session(name, &self.user, self.now());
            self.outbox.push(Directive::Send(envelope));
        }
        Ok(())
    }

    /// Joins an existing session. Sent now if connected, otherwise used as
    /// the handshake on the next connect.
    pub fn join_session(&mut self, session_id: &str) -> SyncResult<()> {
        self.session_id = Some(session_id.to_string());
        if self.connection.state() == ConnectionState::Connected {
            let envelope = Envelope::join_session(session_id, &self.user, self.now());
            self.outbox.push(Directive::Send(envelope));
        }
        Ok(())
    }

    /// Sends the full local state to the server for safekeeping.
    pub fn save_state(&mut self) -> SyncResult<()> {
        let state = GameState {
            entities: self.store.iter().map(EntityRecord::from).collect(),
            turn: self.turn,
        };
        let envelope = Envelope::save_state(&state, self.now())?;
        self.send_or_queue(envelope)
    }

    fn send_or_queue(&mut self, envelope: Envelope) -> SyncResult<()> {
        match self.connection.state() {
            ConnectionState::Connected => {
                self.outbox.push(Directive::Send(envelope));
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.queue.push_back(envelope);
                Ok(())
            }
            state => Err(SyncError::NotConnected(state)),
        }
    }

    // Persistence

    fn persist_snapshot(&mut self) {
        let now = self.now();
        match self
            .persistence
            .persist(&self.store, self.session_id.as_deref(), self.turn, now)
        {
            Ok(snapshot) => self.events.emit(SyncEvent::SnapshotSaved {
                entities: snapshot.entities.len(),
                turn: snapshot.turn,
            }),
            Err(e) => {
                warn!(error = %e, "could not save session snapshot");
                self.events
                    .emit(SyncEvent::Error(format!("could not save session: {e}")));
            }
        }
    }

    /// Merges the saved snapshot with the server's latest `save_state` and
    /// the live store.
    ///
    /// The server wins on every overlapping field and on the turn. Live
    /// entities with pending operations or unsent edits are kept as they
    /// are, as are entities only the live store knows. Entities left with
    /// local changes are submitted right away when connected.
    pub fn restore_session_state(&mut self) -> SyncResult<RestoreSummary> {
        let snapshot = self.persistence.load()?.ok_or(SyncError::NoSnapshot)?;
        let server = self.server_state.clone().unwrap_or_default();
        let merged = merge_snapshots(&snapshot, &server);

        for saved in merged.entities {
            if self.ledger.contains(&saved.id) || self.local_deletes.contains_key(&saved.id) {
                continue;
            }
            let keep_live = self.store.get(&saved.id).is_some_and(|live| {
                live.sync_status != SyncStatus::Synced
                    || (saved.sync_status == SyncStatus::Synced && live.version >= saved.version)
            });
            if !keep_live {
                self.store.restore(saved);
            }
        }
        self.turn = server.turn.or(self.turn).or(snapshot.turn);
        if self.session_id.is_none() {
            self.session_id = snapshot.session_id;
        }

        let local = self.store.ids_with_status(SyncStatus::Local);
        let summary = RestoreSummary {
            entities: self.store.len(),
            local: local.len(),
            turn: self.turn,
        };
        info!(
            entities = summary.entities,
            local = summary.local,
            round = summary.turn.map(|t| t.round),
            "session state restored"
        );
        for id in &local {
            self.emit_status(id);
        }
        if self.connection.state() == ConnectionState::Connected {
            self.submit_local_changes();
        }
        Ok(summary)
    }

    // Inbound

    /// Handles one inbound envelope. Envelopes must be passed in arrival
    /// order; each is fully applied before this returns.
    pub fn on_inbound_message(&mut self, envelope: Envelope) -> SyncResult<()> {
        let now = self.now();
        if self.connection.state() == ConnectionState::Connected {
            self.heartbeat.record_activity(now);
        }

        let message = match InboundMessage::parse(&envelope) {
            Ok(message) => message,
            Err(e) => {
                warn!(kind = %envelope.message_type, error = %e, "dropping inbound message");
                return Err(e.into());
            }
        };

        match message {
            InboundMessage::SessionJoined { session_id } => {
                if session_id.is_some() {
                    self.session_id = session_id.clone();
                }
                if matches!(
                    self.connection.state(),
                    ConnectionState::Connecting | ConnectionState::Reconnecting
                ) {
                    self.enter(ConnectionState::Connected, None)?;
                }
                self.events.emit(SyncEvent::SessionJoined { session_id });
            }
            InboundMessage::JoinError { error } => {
                warn!(%error, "join rejected");
                self.events.emit(SyncEvent::Error(error.clone()));
                self.connection.disarm_attempt();
                self.retry.reset();
                self.outbox.push(Directive::Close);
                if self.connection.state().is_linked() {
                    self.enter(ConnectionState::Errored, Some(error))?;
                }
            }
            InboundMessage::Ack {
                entity_id,
                operation_id,
                version,
            } => self.handle_ack(&entity_id, &operation_id, version, envelope.timestamp)?,
            InboundMessage::Update(update) => self.handle_remote_update(update)?,
            InboundMessage::EditConflict {
                entity_id,
                conflicting_user,
                last_modified,
            } => self.handle_edit_conflict(
                &entity_id,
                RemoteEdit {
                    version: envelope.version,
                    author: conflicting_user,
                    timestamp: last_modified,
                    fields: None,
                },
            )?,
            InboundMessage::SaveState { game_state } => self.handle_save_state(game_state)?,
            InboundMessage::Heartbeat => {}
            InboundMessage::SessionControl(kind) => debug!(%kind, "ignoring session control echo"),
        }
        Ok(())
    }

    fn handle_ack(
        &mut self,
        entity_id: &str,
        operation_id: &str,
        version: Option<u64>,
        timestamp: u64,
    ) -> SyncResult<()> {
        let Some(op) = self.ledger.confirm_operation(operation_id) else {
            // Superseded or unknown: record the version, keep the status.
            if let (Some(v), Some(entity)) = (version, self.store.get(entity_id)) {
                if v > entity.version {
                    self.store.set_version(entity_id, v)?;
                }
            }
            debug!(entity = %entity_id, %operation_id, "ack for superseded operation");
            return Ok(());
        };

        if op.kind == OperationKind::Delete {
            self.local_deletes.remove(entity_id);
            debug!(entity = %entity_id, "delete confirmed");
            return Ok(());
        }
        let Ok(entity) = self.store.entity_mut(entity_id) else {
            return Ok(());
        };
        entity.version = entity.version.max(version.unwrap_or(entity.version));
        entity.updated_at = entity.updated_at.max(timestamp);
        entity.base = Some(entity.payload.clone());
        entity.last_op = None;
        self.set_status(entity_id, SyncStatus::Synced)?;
        debug!(entity = %entity_id, %operation_id, "operation confirmed");
        Ok(())
    }

    fn handle_remote_update(&mut self, update: RemoteUpdate) -> SyncResult<()> {
        // Our own operation echoed back counts as its ack.
        if let Some(ref operation_id) = update.operation_id {
            if self.ledger.find_operation(operation_id).is_some() {
                return self.handle_ack(
                    &update.entity_id,
                    operation_id,
                    update.version,
                    update.timestamp,
                );
            }
        }

        let id = update.entity_id.clone();
        let has_pending = self.ledger.contains(&id);
        let Some(entity) = self.store.get(&id).cloned() else {
            return self.apply_remote_to_missing(update, has_pending);
        };

        if ConflictResolver::should_conflict(&entity, has_pending, &update) {
            return self.raise_conflict(&id, RemoteEdit::from(&update));
        }
        if is_stale(&entity, update.version, update.timestamp) {
            debug!(entity = %id, version = ?update.version, "ignoring stale update");
            return Ok(());
        }
        if entity.sync_status.is_dirty() {
            debug!(entity = %id, "keeping local edit over same-version update");
            return Ok(());
        }

        if update.op == OperationKind::Delete {
            self.store.remove(&id);
            self.conflicts.forget(&id);
            debug!(entity = %id, author = ?update.author, "removed remotely");
            self.events.emit(SyncEvent::EntityRemoved { entity_id: id });
            return Ok(());
        }

        let stored = self.store.entity_mut(&id)?;
        stored.apply_patch(&update.fields);
        stored.base = Some(stored.payload.clone());
        stored.version = stored.version.max(update.version.unwrap_or(stored.version));
        stored.updated_at = stored.updated_at.max(update.timestamp);
        self.set_status(&id, SyncStatus::Synced)?;
        debug!(entity = %id, author = ?update.author, "applied remote update");
        Ok(())
    }

    fn apply_remote_to_missing(&mut self, update: RemoteUpdate, has_pending: bool) -> SyncResult<()> {
        let id = update.entity_id.clone();
        if has_pending {
            // A pending local delete raced a remote edit: bring the entity
            // back so the user can decide.
            if let Some(snapshot) = self.ledger.cancel(&id).and_then(|op| op.original_snapshot) {
                let mut restored = snapshot;
                restored.sync_status = SyncStatus::Syncing;
                restored.last_op = Some(OperationKind::Delete);
                self.store.restore(restored);
                return self.raise_conflict(&id, RemoteEdit::from(&update));
            }
        }
        if update.op == OperationKind::Delete {
            return Ok(());
        }
        if self.local_deletes.contains_key(&id) {
            debug!(entity = %id, "ignoring update for locally deleted entity");
            return Ok(());
        }

        self.store.insert(Entity::authoritative(
            id.clone(),
            update.kind,
            update.fields,
            update.version.unwrap_or(0),
            update.timestamp,
        ))?;
        debug!(entity = %id, author = ?update.author, "created remotely");
        self.emit_status(&id);
        Ok(())
    }

    fn handle_edit_conflict(&mut self, entity_id: &str, remote: RemoteEdit) -> SyncResult<()> {
        let Some(entity) = self.store.get(entity_id) else {
            debug!(entity = %entity_id, "edit conflict for unknown entity");
            return Ok(());
        };
        let defended = self.ledger.contains(entity_id)
            || entity.sync_status.is_dirty()
            || entity.sync_status == SyncStatus::Conflict;
        if !defended {
            debug!(entity = %entity_id, "edit conflict with no local edit, ignoring");
            return Ok(());
        }
        self.raise_conflict(entity_id, remote)
    }

    fn raise_conflict(&mut self, entity_id: &str, remote: RemoteEdit) -> SyncResult<()> {
        if let Some(op) = self.ledger.cancel(entity_id) {
            debug!(entity = %entity_id, operation_id = %op.operation_id, "pending operation cancelled by conflict");
        }
        let entity = self.require(entity_id)?.clone();
        let record = self.conflicts.record(&entity, remote);
        if entity.sync_status != SyncStatus::Conflict {
            self.set_status(entity_id, SyncStatus::Conflict)?;
        }
        self.events.emit(SyncEvent::Conflict(record));
        Ok(())
    }

    fn handle_save_state(&mut self, game_state: GameState) -> SyncResult<()> {
        if game_state.turn.is_some() {
            self.turn = game_state.turn;
        }
        for record in &game_state.entities {
            let adopt = match self.store.get(&record.id) {
                None => !self.local_deletes.contains_key(&record.id),
                // Local edits stay put; restore_session_state merges them.
                Some(entity) => {
                    entity.sync_status == SyncStatus::Synced && record.version >= entity.version
                }
            };
            if !adopt {
                continue;
            }
            if self.store.contains(&record.id) {
                self.store.entity_mut(&record.id)?.adopt_authoritative(
                    record.payload.clone(),
                    record.version,
                    record.updated_at,
                );
            } else {
                self.store.insert(record.clone().into_entity())?;
            }
        }
        info!(
            entities = game_state.entities.len(),
            round = game_state.turn.map(|t| t.round),
            "server state received"
        );
        self.events.emit(SyncEvent::ServerState {
            entities: game_state.entities.len(),
            turn: game_state.turn,
        });
        self.server_state = Some(game_state);
        Ok(())
    }

    // Timers

    /// Fires every timer that is due.
    pub fn tick(&mut self) {
        let now = self.now();

        if self.connection.attempt_timed_out(now) {
            let detail = format!("timed out after {}ms", self.connection.connect_timeout_ms());
            self.attempt_failed(&detail);
        }

        for action in self.heartbeat.poll(now) {
            match action {
                HeartbeatAction::SendHeartbeat => {
                    if self.connection.state() == ConnectionState::Connected {
                        self.outbox.push(Directive::Send(Envelope::heartbeat(now)));
                    }
                }
                HeartbeatAction::LinkDead { silent_for_ms } => {
                    warn!(silent_for_ms, "no heartbeat ack, link is dead");
                    self.link_lost(Some(format!("no heartbeat for {silent_for_ms}ms")));
                }
            }
        }

        if let Some(attempt) = self.retry.poll(now) {
            if self.connection.state() == ConnectionState::Reconnecting {
                if let Some(url) = self.connection.url().map(str::to_string) {
                    info!(attempt, %url, "reconnect attempt");
                    self.connection.arm_attempt(now);
                    self.outbox.push(Directive::Open { url });
                }
            }
        }

        for op in self.ledger.expire(now) {
            if let Err(e) = rollback(&mut self.store, &op) {
                warn!(entity = %op.entity_id, error = %e, "rollback failed");
                continue;
            }
            if op.kind == OperationKind::Delete {
                self.local_deletes.remove(&op.entity_id);
            }
            self.emit_status(&op.entity_id);
        }
    }

    // Helpers

    fn require(&self, entity_id: &str) -> SyncResult<&Entity> {
        self.store
            .get(entity_id)
            .ok_or_else(|| mesa_core::Error::EntityNotFound(entity_id.to_string()).into())
    }

    fn set_status(&mut self, entity_id: &str, status: SyncStatus) -> SyncResult<()> {
        if let Err(e) = self.store.set_status(entity_id, status) {
            warn!(entity = %entity_id, error = %e, "rejected status change");
            return Err(e.into());
        }
        self.emit_status(entity_id);
        Ok(())
    }

    fn emit_status(&self, entity_id: &str) {
        if let Some(entity) = self.store.get(entity_id) {
            self.events.emit(SyncEvent::EntityStatus {
                entity_id: entity_id.to_string(),
                status: entity.sync_status,
            });
        }
    }
}

#[cfg(test)]
#[path = "synchronizer_tests.rs"]
mod tests;
