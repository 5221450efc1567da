// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded reconnect policy with exponential backoff.

use tracing::debug;

use crate::events::RetryProgress;
use crate::timers::{TimerHandle, Timers};

#[derive(Debug)]
pub struct RetryScheduler {
    max_retries: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    attempt: u32,
    timers: Timers<u32>,
    pending: Option<TimerHandle>,
}

impl RetryScheduler {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        RetryScheduler {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            attempt: 0,
            timers: Timers::new(),
            pending: None,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Backoff before the given attempt (1-based): doubles from the
    /// initial delay, capped at the maximum.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(32);
        self.initial_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms)
    }

    /// Schedules the next attempt. Returns None once retries are exhausted.
    pub fn schedule(&mut self, now: u64) -> Option<RetryProgress> {
        if self.is_exhausted() {
            debug!(attempts = self.attempt, "retries exhausted");
            return None;
        }
        self.cancel();
        self.attempt += 1;
        let delay_ms = self.delay_for(self.attempt);
        self.pending = Some(self.timers.schedule(self.attempt, now + delay_ms));
        debug!(attempt = self.attempt, delay_ms, "reconnect scheduled");
        Some(RetryProgress {
            attempt: self.attempt,
            max_retries: self.max_retries,
            delay_ms,
        })
    }

    /// Returns the attempt number if its backoff has elapsed.
    pub fn poll(&mut self, now: u64) -> Option<u32> {
        let (_, attempt) = self.timers.take_expired(now).pop()?;
        self.pending = None;
        Some(attempt)
    }

    /// Cancels a scheduled attempt without resetting the count.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
        }
    }

    /// Cancels and forgets all attempts. Called once a link is up again
    /// or the user starts over.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempt = 0;
    }

    /// Progress text for the current attempt, e.g. "attempt 1 of 3".
    pub fn progress(&self) -> String {
        format!("attempt {} of {}", self.attempt, self.max_retries)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
