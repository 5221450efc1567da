// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Arena of cancelable deadlines.
//!
//! Every deferred action in the engine is a timer in an arena owned by the
//! component that scheduled it. Nothing fires on its own: the owner calls
//! [`Timers::take_expired`] from its tick and acts on what comes back. A
//! cancelled handle is removed from the arena, so it can never be returned
//! by a later `take_expired`.

use std::collections::BTreeMap;

/// Opaque handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Deadlines keyed by `K`, fired in deadline order.
#[derive(Debug, Clone)]
pub struct Timers<K> {
    next_id: u64,
    entries: BTreeMap<u64, (u64, K)>,
}

impl<K> Default for Timers<K> {
    fn default() -> Self {
        Timers {
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }
}

impl<K> Timers<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to fire once `now >= deadline`.
    pub fn schedule(&mut self, key: K, deadline: u64) -> TimerHandle {
        self.next_id += 1;
        self.entries.insert(self.next_id, (deadline, key));
        TimerHandle(self.next_id)
    }

    /// Cancels a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.entries.remove(&handle.0).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle.0)
    }

    /// Deadline of a live timer.
    pub fn deadline(&self, handle: TimerHandle) -> Option<u64> {
        self.entries.get(&handle.0).map(|(deadline, _)| *deadline)
    }

    /// Earliest deadline among live timers.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|(deadline, _)| *deadline).min()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    ///
    /// Timers sharing a deadline come back in scheduling order.
    pub fn take_expired(&mut self, now: u64) -> Vec<(TimerHandle, K)> {
        let mut due: Vec<(u64, u64)> = self
            .entries
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(id, (deadline, _))| (*deadline, *id))
            .collect();
        due.sort_unstable();

        due.into_iter()
            .filter_map(|(_, id)| {
                self.entries
                    .remove(&id)
                    .map(|(_, key)| (TimerHandle(id), key))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
