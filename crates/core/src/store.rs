// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local entity store.
//!
//! Holds every entity the client knows about. All writes go through methods
//! that enforce the two store invariants: versions never decrease, and sync
//! status only moves along the transitions in [`SyncStatus::can_transition_to`].

use std::collections::BTreeMap;

use crate::entity::{Entity, EntityId, EntityKind, Payload, SyncStatus};
use crate::error::{Error, Result};

/// In-memory map of entity id to entity, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Returns all entities of the given kind.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    /// Returns the ids of entities currently in `status`.
    pub fn ids_with_status(&self, status: SyncStatus) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.sync_status == status)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Inserts a new entity. Fails if the id is already taken.
    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(Error::EntityExists(entity.id));
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Puts an entity back exactly as captured, keeping the higher version
    /// if the stored copy has moved on since the capture.
    pub fn restore(&mut self, mut entity: Entity) {
        if let Some(current) = self.entities.get(&entity.id) {
            entity.version = entity.version.max(current.version);
            entity.updated_at = entity.updated_at.max(current.updated_at);
        }
        self.entities.insert(entity.id.clone(), entity);
    }

    /// Removes an entity, returning it.
    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        self.entities.remove(id)
    }

    /// Merges a partial payload into an existing entity.
    pub fn patch(&mut self, id: &str, patch: &Payload) -> Result<&Entity> {
        let entity = self.entity_mut(id)?;
        entity.apply_patch(patch);
        Ok(&*entity)
    }

    /// Replaces the payload of an existing entity.
    pub fn replace_payload(&mut self, id: &str, payload: Payload) -> Result<()> {
        self.entity_mut(id)?.payload = payload;
        Ok(())
    }

    /// Moves an entity to a new sync status.
    pub fn set_status(&mut self, id: &str, status: SyncStatus) -> Result<()> {
        let entity = self.entity_mut(id)?;
        if !entity.sync_status.can_transition_to(status) {
            return Err(Error::InvalidStatusTransition {
                entity_id: id.to_string(),
                from: entity.sync_status,
                to: status,
            });
        }
        entity.sync_status = status;
        Ok(())
    }

    /// Records a server-assigned version.
    pub fn set_version(&mut self, id: &str, version: u64) -> Result<()> {
        let entity = self.entity_mut(id)?;
        if version < entity.version {
            return Err(Error::VersionRegression {
                entity_id: id.to_string(),
                current: entity.version,
                proposed: version,
            });
        }
        entity.version = version;
        Ok(())
    }

    /// Mutable access for engine code that must update several fields at
    /// once. Callers are responsible for the version and status invariants.
    pub fn entity_mut(&mut self, id: &str) -> Result<&mut Entity> {
        self.entities
            .get_mut(id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))
    }

    /// Drops every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Returns a copy of every entity, ordered by id.
    pub fn to_vec(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }
}

impl FromIterator<Entity> for EntityStore {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        EntityStore {
            entities: iter.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
