//! Idle/screensaver session timer
//!
//! Tracks user inactivity. When the idle deadline passes with no qualifying
//! activity the session transitions to Idle exactly once; any activity while
//! Idle wakes it and starts a new idle window.

use crate::domain::types::SessionState;
use anyhow::bail;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a qualifying activity event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Session was Idle and is now Active; the caller should hide the
    /// screensaver
    Woke,
    /// Session stays Active; the idle window restarted
    Restarted,
}

/// Two-state idle machine with a single pending deadline
pub struct SessionTimer {
    timeout: Duration,
    state: SessionState,
    /// Pending idle expiration; every `note_activity` overwrites it, so at
    /// most one deadline exists and a cancelled one can never fire
    deadline: Option<Instant>,
}

impl SessionTimer {
    /// Create a timer. `start_idle` selects the initial state (a kiosk
    /// normally boots showing the attract screen).
    pub fn new(timeout: Duration, start_idle: bool, now: Instant) -> anyhow::Result<Self> {
        if timeout.is_zero() {
            bail!("idle timeout must be positive");
        }
        let (state, deadline) = if start_idle {
            (SessionState::Idle, None)
        } else {
            (SessionState::Active, Some(now + timeout))
        };
        Ok(Self { timeout, state, deadline })
    }

    /// Register qualifying activity: resets the idle window, waking the
    /// session if it was Idle. Cheap and callable at arbitrary frequency.
    pub fn note_activity(&mut self, now: Instant) -> ActivityOutcome {
        let was_idle = self.state == SessionState::Idle;
        self.state = SessionState::Active;
        self.deadline = Some(now + self.timeout);

        if was_idle {
            debug!("session_woke");
            ActivityOutcome::Woke
        } else {
            ActivityOutcome::Restarted
        }
    }

    /// Fire the idle transition if the deadline has passed.
    ///
    /// Returns true exactly once per expiry; the session then stays Idle
    /// until the next `note_activity`. Driven from the controller tick.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.state = SessionState::Idle;
                self.deadline = None;
                debug!(timeout_secs = %self.timeout.as_secs(), "session_idle");
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }
}
