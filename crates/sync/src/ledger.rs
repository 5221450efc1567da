// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bookkeeping for outstanding optimistic mutations.
//!
//! At most one operation is pending per entity: registering a new one
//! cancels the old entry and its timer without rolling anything back.
//! Confirmation only clears bookkeeping; marking an entity Synced is the
//! synchronizer's job.

use std::collections::HashMap;

use tracing::{debug, warn};

use mesa_core::{Entity, EntityId, EntityStore, Envelope, OperationId, OperationKind, SyncStatus};

use crate::error::SyncResult;
use crate::timers::{TimerHandle, Timers};

/// An optimistic mutation awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub operation_id: OperationId,
    pub entity_id: EntityId,
    pub kind: OperationKind,
    /// Entity as it was before the mutation. None for a create.
    pub original_snapshot: Option<Entity>,
    pub submitted_at: u64,
    pub deadline: u64,
    /// Message that carried the mutation, kept for resubmission.
    pub message: Envelope,
    timer: Option<TimerHandle>,
}

impl PendingOperation {
    pub fn new(
        operation_id: impl Into<OperationId>,
        entity_id: impl Into<EntityId>,
        kind: OperationKind,
        original_snapshot: Option<Entity>,
        message: Envelope,
    ) -> Self {
        PendingOperation {
            operation_id: operation_id.into(),
            entity_id: entity_id.into(),
            kind,
            original_snapshot,
            submitted_at: 0,
            deadline: 0,
            message,
            timer: None,
        }
    }
}

#[derive(Debug)]
pub struct PendingOperationLedger {
    deadline_ms: u64,
    ops: HashMap<EntityId, PendingOperation>,
    timers: Timers<EntityId>,
}

impl PendingOperationLedger {
    pub fn new(deadline_ms: u64) -> Self {
        PendingOperationLedger {
            deadline_ms,
            ops: HashMap::new(),
            timers: Timers::new(),
        }
    }

    /// Tracks `op` with a deadline of `now + deadline_ms`.
    ///
    /// Returns the entry it replaced, whose timer is already cancelled.
    pub fn register(&mut self, op: PendingOperation, now: u64) -> Option<PendingOperation> {
        let deadline_ms = self.deadline_ms;
        self.register_with_deadline(op, now, deadline_ms)
    }

    pub fn register_with_deadline(
        &mut self,
        mut op: PendingOperation,
        now: u64,
        deadline_ms: u64,
    ) -> Option<PendingOperation> {
        let replaced = self.cancel(&op.entity_id);
        if let Some(ref old) = replaced {
            debug!(entity = %op.entity_id, superseded = %old.operation_id, by = %op.operation_id, "pending operation superseded");
        }
        op.submitted_at = now;
        op.deadline = now + deadline_ms;
        op.timer = Some(self.timers.schedule(op.entity_id.clone(), op.deadline));
        self.ops.insert(op.entity_id.clone(), op);
        replaced
    }

    /// Tracks `op` with no running deadline. Its clock starts at the next
    /// `rearm_all`.
    pub fn hold(&mut self, mut op: PendingOperation, now: u64) -> Option<PendingOperation> {
        let replaced = self.cancel(&op.entity_id);
        op.submitted_at = now;
        op.deadline = now + self.deadline_ms;
        op.timer = None;
        self.ops.insert(op.entity_id.clone(), op);
        replaced
    }

    /// Stops every deadline while keeping the entries. Used while the link
    /// is being re-established so nothing rolls back before resubmission.
    pub fn hold_all(&mut self) {
        self.timers.cancel_all();
        for op in self.ops.values_mut() {
            op.timer = None;
        }
    }

    /// True when the entry for `entity_id` has a running deadline.
    pub fn is_armed(&self, entity_id: &str) -> bool {
        self.ops.get(entity_id).is_some_and(|op| op.timer.is_some())
    }

    pub fn get(&self, entity_id: &str) -> Option<&PendingOperation> {
        self.ops.get(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.ops.contains_key(entity_id)
    }

    /// Finds the entry carrying `operation_id`.
    pub fn find_operation(&self, operation_id: &str) -> Option<&PendingOperation> {
        self.ops.values().find(|op| op.operation_id == operation_id)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Entries ordered by submission time.
    pub fn pending(&self) -> Vec<&PendingOperation> {
        let mut ops: Vec<_> = self.ops.values().collect();
        ops.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        ops
    }

    /// Clears the entry for an entity and cancels its timer.
    pub fn confirm(&mut self, entity_id: &str) -> Option<PendingOperation> {
        self.cancel(entity_id)
    }

    /// Clears the entry carrying `operation_id`. An id that was superseded
    /// matches nothing.
    pub fn confirm_operation(&mut self, operation_id: &str) -> Option<PendingOperation> {
        let entity_id = self.find_operation(operation_id)?.entity_id.clone();
        self.cancel(&entity_id)
    }

    /// Drops the entry without rollback.
    pub fn cancel(&mut self, entity_id: &str) -> Option<PendingOperation> {
        let op = self.ops.remove(entity_id)?;
        if let Some(handle) = op.timer {
            self.timers.cancel(handle);
        }
        Some(op)
    }

    /// Drops every entry without rollback.
    pub fn cancel_all(&mut self) -> Vec<PendingOperation> {
        self.timers.cancel_all();
        let mut ops: Vec<_> = self.ops.drain().map(|(_, op)| op).collect();
        ops.sort_by_key(|op| op.submitted_at);
        ops
    }

    /// Restarts every deadline from `now`. Used when a link comes back and
    /// the entries are resubmitted.
    pub fn rearm_all(&mut self, now: u64) {
        self.timers.cancel_all();
        for op in self.ops.values_mut() {
            op.submitted_at = now;
            op.deadline = now + self.deadline_ms;
            op.timer = Some(self.timers.schedule(op.entity_id.clone(), op.deadline));
        }
    }

    /// Removes and returns entries whose deadline has passed, earliest first.
    pub fn expire(&mut self, now: u64) -> Vec<PendingOperation> {
        self.timers
            .take_expired(now)
            .into_iter()
            .filter_map(|(handle, entity_id)| {
                let current = self.ops.get(&entity_id)?;
                if current.timer != Some(handle) {
                    return None;
                }
                self.ops.remove(&entity_id)
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}

/// Undoes a timed-out operation and marks the entity Error.
///
/// Create keeps the entity so the user's work survives. Update restores
/// the original snapshot field for field. Delete reinserts the entity.
pub fn rollback(store: &mut EntityStore, op: &PendingOperation) -> SyncResult<()> {
    warn!(entity = %op.entity_id, op = %op.kind, operation_id = %op.operation_id, "operation timed out, rolling back");
    match op.kind {
        OperationKind::Create => {
            if store.contains(&op.entity_id) {
                store.set_status(&op.entity_id, SyncStatus::Error)?;
            }
        }
        OperationKind::Update | OperationKind::Delete => {
            if let Some(snapshot) = op.original_snapshot.clone() {
                let mut restored = snapshot;
                restored.sync_status = SyncStatus::Error;
                restored.last_op = Some(op.kind);
                store.restore(restored);
            } else if store.contains(&op.entity_id) {
                store.set_status(&op.entity_id, SyncStatus::Error)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
