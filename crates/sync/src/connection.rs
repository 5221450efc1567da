// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle state machine.
//!
//! [`ConnectionController`] is the only owner of [`ConnectionState`]. It
//! does no I/O: the synchronizer asks it for a transition, and the runner
//! turns the resulting directives into transport calls.

use std::fmt;

use tracing::{debug, info};

use crate::config::validate_url;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, SyncEvent};
use crate::timers::{TimerHandle, Timers};

/// Where the client stands with the session server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Link lost; retrying with backoff. Sends are queued.
    Reconnecting,
    Errored,
    /// Retries exhausted. Left only through a manual resync.
    Offline,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Errored => "errored",
            ConnectionState::Offline => "offline",
        }
    }

    /// States reachable from `self`.
    pub fn valid_targets(self) -> &'static [ConnectionState] {
        use ConnectionState::*;
        match self {
            Disconnected => &[Connecting],
            Connecting => &[Connected, Errored, Disconnected],
            Connected => &[Reconnecting, Errored, Disconnected],
            Reconnecting => &[Connected, Offline, Errored, Disconnected],
            Errored => &[Connecting, Disconnected],
            Offline => &[Connecting, Disconnected],
        }
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        self.valid_targets().contains(&next)
    }

    /// True while a link is up or being established. Mutations made in
    /// these states are tracked by the ledger and submitted.
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// True for the states that trigger a local snapshot on entry.
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Errored | ConnectionState::Offline
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a transport failure the way the UI shows it.
pub fn connection_failed(detail: &str) -> String {
    format!("Connection failed: {detail}")
}

/// Owns the connection state and the connect-attempt timeout.
#[derive(Debug)]
pub struct ConnectionController {
    state: ConnectionState,
    url: Option<String>,
    last_error: Option<String>,
    connect_timeout_ms: u64,
    timers: Timers<()>,
    attempt: Option<TimerHandle>,
    events: EventSink,
}

impl ConnectionController {
    pub fn new(connect_timeout_ms: u64, events: EventSink) -> Self {
        ConnectionController {
            state: ConnectionState::Disconnected,
            url: None,
            last_error: None,
            connect_timeout_ms,
            timers: Timers::new(),
            attempt: None,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Starts connecting to `url`.
    pub fn connect(&mut self, url: &str, now: u64) -> SyncResult<()> {
        validate_url(url)?;
        self.transition(ConnectionState::Connecting, None)?;
        self.url = Some(url.to_string());
        self.arm_attempt(now);
        Ok(())
    }

    /// Moves to Disconnected. Returns false if already there.
    pub fn disconnect(&mut self) -> SyncResult<bool> {
        self.disarm_attempt();
        if self.state == ConnectionState::Disconnected {
            return Ok(false);
        }
        self.transition(ConnectionState::Disconnected, None)?;
        Ok(true)
    }

    /// Moves to `next`, emitting a connection-change event.
    ///
    /// Returns the previous state. Illegal requests leave the state as is.
    pub fn transition(
        &mut self,
        next: ConnectionState,
        error: Option<String>,
    ) -> SyncResult<ConnectionState> {
        let from = self.state;
        if !from.can_transition_to(next) {
            debug!(%from, to = %next, "rejected connection transition");
            return Err(SyncError::InvalidTransition {
                from,
                to: next,
                valid_targets: from
                    .valid_targets()
                    .iter()
                    .map(ConnectionState::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        self.state = next;
        if next == ConnectionState::Connected {
            self.last_error = None;
            self.disarm_attempt();
        }
        if let Some(ref err) = error {
            self.last_error = Some(err.clone());
        }
        info!(%from, to = %next, "connection state changed");
        self.events.emit(SyncEvent::ConnectionChanged { state: next, error });
        Ok(from)
    }

    /// Reports a transport failure and returns the user-facing message.
    pub fn report_failure(&mut self, detail: &str) -> String {
        let message = connection_failed(detail);
        self.last_error = Some(message.clone());
        self.events.emit(SyncEvent::Error(message.clone()));
        message
    }

    /// Starts the timeout for one connect attempt.
    pub fn arm_attempt(&mut self, now: u64) {
        self.disarm_attempt();
        if self.connect_timeout_ms > 0 {
            self.attempt = Some(self.timers.schedule((), now + self.connect_timeout_ms));
        }
    }

    pub fn disarm_attempt(&mut self) {
        if let Some(handle) = self.attempt.take() {
            self.timers.cancel(handle);
        }
    }

    /// Returns true once if the current attempt has run out of time.
    pub fn attempt_timed_out(&mut self, now: u64) -> bool {
        let fired = !self.timers.take_expired(now).is_empty();
        if fired {
            self.attempt = None;
        }
        fired
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
