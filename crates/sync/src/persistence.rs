// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot and restore of local session state across disconnects.
//!
//! When the connection comes to rest (disconnected, errored or offline)
//! the whole local store is written to durable storage. After a rejoin the
//! user can merge that snapshot with the server's authoritative state. The
//! server wins on every overlapping field and on the turn order, because
//! after a full reconnect there is no live edit left to defend.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use mesa_core::{
    Entity, EntityId, EntityKind, EntityStore, GameState, OperationKind, SessionSnapshot,
    SyncStatus, TurnState,
};

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Durable storage for one session snapshot.
pub trait SnapshotStore: Send {
    fn save(&mut self, snapshot: &SessionSnapshot) -> PersistenceResult<()>;

    /// Returns None when nothing has been saved.
    fn load(&self) -> PersistenceResult<Option<SessionSnapshot>>;

    fn clear(&mut self) -> PersistenceResult<()>;
}

/// The game board, consulted only for which tokens it currently shows.
pub trait BoardHandle: Send {
    fn entity_ids(&self) -> Vec<EntityId>;
}

/// Snapshot stored as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target, fsync, then rename over it.
        let temp = self.temp_path();
        let json = snapshot.to_json()?;
        let mut file = File::create(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), "snapshot written");
        Ok(())
    }

    fn load(&self) -> PersistenceResult<Option<SessionSnapshot>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(SessionSnapshot::from_json(&text)?))
    }

    fn clear(&mut self) -> PersistenceResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory snapshot store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<SessionSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&mut self, snapshot: &SessionSnapshot) -> PersistenceResult<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> PersistenceResult<Option<SessionSnapshot>> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        Ok(slot.clone())
    }

    fn clear(&mut self) -> PersistenceResult<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Board handle over a fixed list of ids.
#[derive(Debug, Clone, Default)]
pub struct StaticBoard(pub Vec<EntityId>);

impl BoardHandle for StaticBoard {
    fn entity_ids(&self) -> Vec<EntityId> {
        self.0.clone()
    }
}

/// Writes and reads session snapshots.
pub struct PersistenceGateway {
    store: Box<dyn SnapshotStore>,
    board: Option<Box<dyn BoardHandle>>,
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("store", &"<snapshot store>")
            .field("board", &self.board.is_some())
            .finish()
    }
}

impl PersistenceGateway {
    pub fn new(store: impl SnapshotStore + 'static) -> Self {
        PersistenceGateway {
            store: Box::new(store),
            board: None,
        }
    }

    /// Only tokens the board reports are kept in snapshots.
    pub fn with_board(mut self, board: impl BoardHandle + 'static) -> Self {
        self.board = Some(Box::new(board));
        self
    }

    /// Builds a snapshot of the local store.
    ///
    /// Characters and session metadata are always included. Tokens are
    /// filtered through the board handle when one is attached.
    pub fn capture(
        &self,
        store: &EntityStore,
        session_id: Option<&str>,
        turn: Option<TurnState>,
        now: u64,
    ) -> SessionSnapshot {
        let on_board = self.board.as_ref().map(|b| b.entity_ids());
        let entities = store
            .iter()
            .filter(|e| match (e.kind, &on_board) {
                (EntityKind::Token, Some(ids)) => ids.contains(&e.id),
                _ => true,
            })
            .cloned()
            .collect();

        SessionSnapshot {
            session_id: session_id.map(str::to_string),
            saved_at: now,
            entities,
            turn,
        }
    }

    /// Captures and saves the local store.
    pub fn persist(
        &mut self,
        store: &EntityStore,
        session_id: Option<&str>,
        turn: Option<TurnState>,
        now: u64,
    ) -> PersistenceResult<SessionSnapshot> {
        let snapshot = self.capture(store, session_id, turn, now);
        self.store.save(&snapshot)?;
        info!(
            entities = snapshot.entities.len(),
            round = snapshot.turn.map(|t| t.round),
            "session snapshot saved"
        );
        Ok(snapshot)
    }

    pub fn load(&self) -> PersistenceResult<Option<SessionSnapshot>> {
        self.store.load()
    }

    pub fn clear(&mut self) -> PersistenceResult<()> {
        self.store.clear()
    }
}

/// Result of merging a saved snapshot with the server's state.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedState {
    pub entities: Vec<Entity>,
    pub turn: Option<TurnState>,
}

impl MergedState {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }
}

/// Merges a restored snapshot with the server's authoritative state.
///
/// - Entities the server knows start from the server's copy. Fields only
///   the snapshot has are kept; when that leaves the payload different from
///   the server's, the entity is Local so it gets resubmitted.
/// - Entities only in the snapshot that the server never confirmed stay
///   Local as creates. Confirmed ones keep their base and stay Synced
///   unless they carry unsent edits, which makes them Local updates.
/// - The server's turn wins when it sent one.
pub fn merge_snapshots(snapshot: &SessionSnapshot, server: &GameState) -> MergedState {
    let mut merged = Vec::with_capacity(server.entities.len() + snapshot.entities.len());

    for record in &server.entities {
        let mut entity = record.clone().into_entity();
        if let Some(saved) = snapshot.entity(&record.id) {
            let mut payload = saved.payload.clone();
            payload.extend(record.payload.clone());
            if payload != record.payload {
                entity.payload = payload;
                entity.sync_status = SyncStatus::Local;
                entity.last_op = Some(OperationKind::Update);
            }
            entity.version = entity.version.max(saved.version);
        }
        merged.push(entity);
    }

    for saved in &snapshot.entities {
        if server.entities.iter().any(|r| r.id == saved.id) {
            continue;
        }
        let mut entity = saved.clone();
        match entity.base {
            None => {
                entity.sync_status = SyncStatus::Local;
                entity.last_op = Some(OperationKind::Create);
            }
            Some(ref base) => {
                let dirty = entity.sync_status != SyncStatus::Synced || &entity.payload != base;
                if dirty {
                    entity.sync_status = SyncStatus::Local;
                    entity.last_op = Some(OperationKind::Update);
                }
            }
        }
        merged.push(entity);
    }

    MergedState {
        entities: merged,
        turn: server.turn.or(snapshot.turn),
    }
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
