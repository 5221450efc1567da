// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Keepalive and silent-death detection.
//!
//! While connected, a `heartbeat` goes out every interval. Any inbound
//! message counts as proof of life. If nothing arrives within the timeout,
//! the link is declared dead even if the transport still reports open.

use tracing::debug;

use crate::timers::{TimerHandle, Timers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Beat {
    Send,
    Silence,
}

/// What the monitor wants done after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    SendHeartbeat,
    LinkDead { silent_for_ms: u64 },
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval_ms: u64,
    timeout_ms: u64,
    timers: Timers<Beat>,
    send: Option<TimerHandle>,
    silence: Option<TimerHandle>,
    last_ack: Option<u64>,
}

impl HeartbeatMonitor {
    /// An `interval_ms` of zero disables the monitor.
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        HeartbeatMonitor {
            interval_ms,
            timeout_ms,
            timers: Timers::new(),
            send: None,
            silence: None,
            last_ack: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.send.is_some() || self.silence.is_some()
    }

    /// Time of the last inbound activity seen while running.
    pub fn last_ack(&self) -> Option<u64> {
        self.last_ack
    }

    /// Starts both timers. Called on entering Connected.
    pub fn start(&mut self, now: u64) {
        self.stop();
        if self.interval_ms == 0 {
            return;
        }
        self.last_ack = Some(now);
        self.send = Some(self.timers.schedule(Beat::Send, now + self.interval_ms));
        self.silence = Some(self.timers.schedule(Beat::Silence, now + self.timeout_ms));
    }

    /// Cancels both timers. Called on leaving Connected.
    pub fn stop(&mut self) {
        self.timers.cancel_all();
        self.send = None;
        self.silence = None;
    }

    /// Records proof of life and pushes the silence deadline out.
    pub fn record_activity(&mut self, now: u64) {
        let Some(handle) = self.silence.take() else {
            return;
        };
        self.timers.cancel(handle);
        self.last_ack = Some(now);
        self.silence = Some(self.timers.schedule(Beat::Silence, now + self.timeout_ms));
    }

    /// Fires due timers.
    pub fn poll(&mut self, now: u64) -> Vec<HeartbeatAction> {
        let mut actions = Vec::new();
        for (_, beat) in self.timers.take_expired(now) {
            match beat {
                Beat::Send => {
                    self.send = Some(self.timers.schedule(Beat::Send, now + self.interval_ms));
                    actions.push(HeartbeatAction::SendHeartbeat);
                }
                Beat::Silence => {
                    let silent_for_ms = now.saturating_sub(self.last_ack.unwrap_or(now));
                    debug!(silent_for_ms, "heartbeat silence, link dead");
                    self.stop();
                    actions.push(HeartbeatAction::LinkDead { silent_for_ms });
                    break;
                }
            }
        }
        actions
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
