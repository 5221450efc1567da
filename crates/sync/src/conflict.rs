// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Detection and resolution of concurrent edits.
//!
//! A conflict is recorded when an authoritative update arrives for an
//! entity that has a pending operation, or that carries unsaved local edits
//! and the remote side is newer. The entity is frozen in Conflict until the
//! user picks Overwrite or Merge. Nothing is resolved automatically.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{info, warn};

use mesa_core::{Entity, EntityId, EntityStore, Payload, RemoteUpdate, SyncStatus};

use crate::error::{SyncError, SyncResult};

/// A recorded disagreement between local and remote state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord {
    pub entity_id: EntityId,
    pub local_version: u64,
    pub remote_version: u64,
    pub remote_author: String,
    pub remote_timestamp: u64,
    /// Fields the remote side changed, when the trigger carried them.
    pub remote_fields: Option<Payload>,
    /// Last payload both sides agreed on.
    pub base: Payload,
}

/// The remote half of a conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEdit {
    pub version: Option<u64>,
    pub author: String,
    pub timestamp: u64,
    pub fields: Option<Payload>,
}

impl From<&RemoteUpdate> for RemoteEdit {
    fn from(update: &RemoteUpdate) -> Self {
        RemoteEdit {
            version: update.version,
            author: update.author.clone().unwrap_or_else(|| "unknown".to_string()),
            timestamp: update.timestamp,
            fields: Some(update.fields.clone()),
        }
    }
}

/// One field both sides changed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub field: String,
    pub base: Option<Value>,
    pub local: Option<Value>,
    pub remote: Option<Value>,
}

/// Field-level merge preview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictDiff {
    pub local_only: Vec<String>,
    pub remote_only: Vec<String>,
    pub both: Vec<FieldConflict>,
}

/// How the user chose to settle a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Discard local edits and take the remote state verbatim.
    Overwrite,
    /// Union disjoint fields. Fields both sides touched take the remote
    /// value unless listed in `keep_local`.
    Merge { keep_local: BTreeSet<String> },
}

impl Resolution {
    pub fn merge() -> Self {
        Resolution::Merge {
            keep_local: BTreeSet::new(),
        }
    }
}

/// What a resolution left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Entity now matches the server.
    Adopted,
    /// Entity holds a merged payload that must be resubmitted.
    Merged(Payload),
}

/// Remote update is newer than what the entity last confirmed.
pub fn is_newer(entity: &Entity, version: Option<u64>, timestamp: u64) -> bool {
    match version {
        Some(v) => v > entity.version,
        None => timestamp > entity.updated_at,
    }
}

/// Remote update is older than what the entity last confirmed.
pub fn is_stale(entity: &Entity, version: Option<u64>, timestamp: u64) -> bool {
    match version {
        Some(v) => v < entity.version,
        None => timestamp < entity.updated_at,
    }
}

#[derive(Debug, Default)]
pub struct ConflictResolver {
    records: BTreeMap<EntityId, ConflictRecord>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether an inbound update conflicts with local state.
    pub fn should_conflict(entity: &Entity, has_pending: bool, update: &RemoteUpdate) -> bool {
        if entity.sync_status == SyncStatus::Conflict {
            return true;
        }
        if is_stale(entity, update.version, update.timestamp) {
            return false;
        }
        has_pending
            || (entity.sync_status.is_dirty()
                && is_newer(entity, update.version, update.timestamp))
    }

    pub fn get(&self, entity_id: &str) -> Option<&ConflictRecord> {
        self.records.get(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.records.contains_key(entity_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records a conflict and returns the new record.
    ///
    /// A newer conflict on the same entity supersedes the older one. Remote
    /// fields accumulate across superseded records so no remote change is
    /// lost from the preview.
    pub fn record(&mut self, entity: &Entity, remote: RemoteEdit) -> ConflictRecord {
        let previous = self.records.remove(&entity.id);
        let base = previous
            .as_ref()
            .map(|p| p.base.clone())
            .or_else(|| entity.base.clone())
            .unwrap_or_default();
        let remote_fields = match (previous.and_then(|p| p.remote_fields), remote.fields) {
            (Some(mut old), Some(new)) => {
                old.extend(new);
                Some(old)
            }
            (old, new) => new.or(old),
        };

        let record = ConflictRecord {
            entity_id: entity.id.clone(),
            local_version: entity.version,
            remote_version: remote.version.unwrap_or(entity.version).max(entity.version),
            remote_author: remote.author,
            remote_timestamp: remote.timestamp,
            remote_fields,
            base,
        };
        warn!(
            entity = %record.entity_id,
            author = %record.remote_author,
            local_version = record.local_version,
            remote_version = record.remote_version,
            "conflicting edit"
        );
        self.records.insert(entity.id.clone(), record.clone());
        record
    }

    /// Drops a record without resolving it (entity removed or reset).
    pub fn forget(&mut self, entity_id: &str) -> Option<ConflictRecord> {
        self.records.remove(entity_id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Field-level preview of what each side changed since the base.
    pub fn diff(&self, store: &EntityStore, entity_id: &str) -> SyncResult<ConflictDiff> {
        let record = self
            .records
            .get(entity_id)
            .ok_or_else(|| SyncError::NoConflict(entity_id.to_string()))?;
        let entity = store
            .get(entity_id)
            .ok_or_else(|| mesa_core::Error::EntityNotFound(entity_id.to_string()))?;
        Ok(diff_fields(
            &record.base,
            &entity.payload,
            record.remote_fields.as_ref(),
        ))
    }

    /// Applies the user's choice to the store.
    ///
    /// Overwrite leaves the entity Synced. Merge leaves it in Conflict with
    /// the merged payload; the caller resubmits it.
    pub fn resolve(
        &mut self,
        store: &mut EntityStore,
        entity_id: &str,
        resolution: Resolution,
    ) -> SyncResult<Resolved> {
        let record = self
            .records
            .get(entity_id)
            .cloned()
            .ok_or_else(|| SyncError::NoConflict(entity_id.to_string()))?;
        let entity = store.entity_mut(entity_id)?;

        let mut remote_state = record.base.clone();
        if let Some(ref fields) = record.remote_fields {
            apply_fields(&mut remote_state, fields);
        }

        let resolved = match resolution {
            Resolution::Overwrite => {
                entity.adopt_authoritative(
                    remote_state,
                    record.remote_version,
                    record.remote_timestamp,
                );
                store.set_status(entity_id, SyncStatus::Synced)?;
                Resolved::Adopted
            }
            Resolution::Merge { keep_local } => {
                let diff = diff_fields(&record.base, &entity.payload, record.remote_fields.as_ref());
                let mut merged = entity.payload.clone();
                let remote_wins = diff
                    .remote_only
                    .iter()
                    .chain(
                        diff.both
                            .iter()
                            .map(|c| &c.field)
                            .filter(|f| !keep_local.contains(*f)),
                    );
                for field in remote_wins {
                    match remote_state.get(field) {
                        Some(value) => merged.insert(field.clone(), value.clone()),
                        None => merged.remove(field),
                    };
                }
                entity.payload = merged.clone();
                entity.base = Some(remote_state);
                entity.version = entity.version.max(record.remote_version);
                entity.updated_at = entity.updated_at.max(record.remote_timestamp);
                Resolved::Merged(merged)
            }
        };

        self.records.remove(entity_id);
        info!(entity = %entity_id, outcome = ?resolved, "conflict resolved");
        Ok(resolved)
    }
}

fn apply_fields(target: &mut Payload, fields: &Payload) {
    for (key, value) in fields {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Compares local and remote changes against a common base.
pub fn diff_fields(base: &Payload, local: &Payload, remote: Option<&Payload>) -> ConflictDiff {
    let local_changed: BTreeSet<&String> = base
        .keys()
        .chain(local.keys())
        .filter(|k| base.get(*k) != local.get(*k))
        .collect();

    let remote_changed: BTreeSet<&String> = remote
        .map(|fields| {
            fields
                .iter()
                .filter(|(k, v)| {
                    let incoming = if v.is_null() { None } else { Some(*v) };
                    base.get(*k) != incoming
                })
                .map(|(k, _)| k)
                .collect()
        })
        .unwrap_or_default();

    let remote_value = |key: &str| -> Option<Value> {
        remote
            .and_then(|fields| fields.get(key))
            .filter(|v| !v.is_null())
            .cloned()
    };

    ConflictDiff {
        local_only: local_changed
            .difference(&remote_changed)
            .map(|k| k.to_string())
            .collect(),
        remote_only: remote_changed
            .difference(&local_changed)
            .map(|k| k.to_string())
            .collect(),
        both: local_changed
            .intersection(&remote_changed)
            .map(|k| FieldConflict {
                field: k.to_string(),
                base: base.get(*k).cloned(),
                local: local.get(*k).cloned(),
                remote: remote_value(k.as_str()),
            })
            .collect(),
    }
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
