//! Deterministic book lifecycle state machine
//!
//! Each state has explicit transitions with single causes. The store drives
//! the machine; invalid transitions are programming errors surfaced as
//! `StateError`.
//!
//! ## State Diagram
//!
//! ```text
//! UNINITIALIZED ──subscribe()──▶ SYNCING ──snapshot──▶ LIVE ◀──────────┐
//!       ▲                                               │              │
//!       │                                     stream error/timeout  snapshot
//!       │                                               ▼              │
//!       └───────────reset()────────────────────────── STALE ──reconnect──▶ RESYNCING
//!                                                       ▲                    │
//!                                                       └───resync failed────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Book lifecycle states
///
/// Transitions are deterministic; each state has defined exit conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookStatus {
    /// No subscription; no state held
    ///
    /// Transitions:
    /// - `subscribe()` → SYNCING
    Uninitialized,

    /// Waiting for the first snapshot
    ///
    /// Transitions:
    /// - snapshot applied → LIVE
    Syncing,

    /// Snapshot applied, deltas trusted
    ///
    /// Transitions:
    /// - re-polled snapshot → LIVE
    /// - stream error / idle timeout / malformed threshold → STALE
    Live,

    /// Delta stream no longer trusted without a fresh snapshot
    ///
    /// Transitions:
    /// - reconnect attempt → RESYNCING
    Stale,

    /// Reconnected, waiting for the fresh snapshot
    ///
    /// Transitions:
    /// - snapshot applied (full replace) → LIVE
    /// - fetch failed → STALE
    Resyncing,
}

impl Default for BookStatus {
    fn default() -> Self {
        BookStatus::Uninitialized
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookStatus::Uninitialized => write!(f, "UNINITIALIZED"),
            BookStatus::Syncing => write!(f, "SYNCING"),
            BookStatus::Live => write!(f, "LIVE"),
            BookStatus::Stale => write!(f, "STALE"),
            BookStatus::Resyncing => write!(f, "RESYNCING"),
        }
    }
}

/// What triggered a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTrigger {
    /// Caller subscribed to an instrument
    Subscribe,
    /// Snapshot applied (initial, re-polled, or resync)
    SnapshotApplied,
    /// Delta stream failed
    StreamLost(String),
    /// Reconnect attempt started
    ReconnectAttempt(u32),
    /// Resync snapshot fetch failed
    ResyncFailed(String),
    /// Unsubscribe or instrument change
    Reset,
}

/// State transition event
///
/// Emitted on every transition; used for logging and diagnostics.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: BookStatus,
    pub to: BookStatus,
    pub trigger: TransitionTrigger,
    pub timestamp: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(from: BookStatus, to: BookStatus, trigger: TransitionTrigger) -> Self {
        Self {
            from,
            to,
            trigger,
            timestamp: Utc::now(),
        }
    }
}

/// Book lifecycle state machine
#[derive(Debug)]
pub struct StatusMachine {
    status: BookStatus,
    transition_history: Vec<StateTransition>,
    max_history: usize,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            status: BookStatus::Uninitialized,
            transition_history: Vec::new(),
            max_history: 100,
        }
    }

    /// Get current status
    pub fn status(&self) -> BookStatus {
        self.status
    }

    /// Check whether deltas are currently trusted
    pub fn is_live(&self) -> bool {
        matches!(self.status, BookStatus::Live)
    }

    /// Get transition history
    pub fn history(&self) -> &[StateTransition] {
        &self.transition_history
    }

    /// Transition to a new status
    fn transition(&mut self, to: BookStatus, trigger: TransitionTrigger) -> StateTransition {
        let from = std::mem::replace(&mut self.status, to);
        let transition = StateTransition::new(from, to, trigger);

        // Keep history bounded
        if self.transition_history.len() >= self.max_history {
            self.transition_history.remove(0);
        }
        self.transition_history.push(transition.clone());

        tracing::info!(
            "Book status transition: {} -> {} ({:?})",
            transition.from,
            transition.to,
            transition.trigger
        );

        transition
    }

    /// Caller subscribed
    pub fn subscribe(&mut self) -> Result<StateTransition, StateError> {
        match self.status {
            BookStatus::Uninitialized => {
                Ok(self.transition(BookStatus::Syncing, TransitionTrigger::Subscribe))
            }
            _ => Err(StateError::InvalidTransition {
                from: self.status,
                action: "subscribe".to_string(),
            }),
        }
    }

    /// Snapshot applied: initial sync, periodic re-poll, or resync replace
    pub fn snapshot_applied(&mut self) -> Result<StateTransition, StateError> {
        match self.status {
            BookStatus::Syncing | BookStatus::Resyncing | BookStatus::Live => {
                Ok(self.transition(BookStatus::Live, TransitionTrigger::SnapshotApplied))
            }
            _ => Err(StateError::InvalidTransition {
                from: self.status,
                action: "snapshot_applied".to_string(),
            }),
        }
    }

    /// Delta stream failed; stop trusting deltas until a fresh snapshot
    pub fn stream_lost(&mut self, reason: String) -> Result<StateTransition, StateError> {
        match self.status {
            BookStatus::Live => {
                Ok(self.transition(BookStatus::Stale, TransitionTrigger::StreamLost(reason)))
            }
            _ => Err(StateError::InvalidTransition {
                from: self.status,
                action: "stream_lost".to_string(),
            }),
        }
    }

    /// Reconnect attempt started
    pub fn resync_started(&mut self, attempt: u32) -> Result<StateTransition, StateError> {
        match self.status {
            BookStatus::Stale => Ok(self.transition(
                BookStatus::Resyncing,
                TransitionTrigger::ReconnectAttempt(attempt),
            )),
            _ => Err(StateError::InvalidTransition {
                from: self.status,
                action: "resync_started".to_string(),
            }),
        }
    }

    /// Resync snapshot fetch failed; back to stale for the next attempt
    pub fn resync_failed(&mut self, reason: String) -> Result<StateTransition, StateError> {
        match self.status {
            BookStatus::Resyncing => {
                Ok(self.transition(BookStatus::Stale, TransitionTrigger::ResyncFailed(reason)))
            }
            _ => Err(StateError::InvalidTransition {
                from: self.status,
                action: "resync_failed".to_string(),
            }),
        }
    }

    /// Unsubscribe or instrument change: hard reset from any state
    pub fn reset(&mut self) -> StateTransition {
        self.transition(BookStatus::Uninitialized, TransitionTrigger::Reset)
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// State machine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Invalid state transition attempted
    InvalidTransition { from: BookStatus, action: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::InvalidTransition { from, action } => {
                write!(f, "Invalid transition: cannot {} from state {}", action, from)
            }
        }
    }
}

impl std::error::Error for StateError {}
