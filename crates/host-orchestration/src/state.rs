//! Run-level state machine
//!
//! `Init → ConfigResolved → PlatformDetected → Phases → [Deployed →
//! Validated] → Terminal`. Dry runs never leave `Phases`; any fatal phase
//! failure or failed validation transitions directly to a terminal failure
//! state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminalState {
    /// Every phase completed or was already satisfied
    Success,
    /// A fatal failure occurred and service artifacts were rolled back
    FailedRolledBack,
    /// A fatal failure occurred and rollback was suppressed or not applicable
    FailedNoRollback,
}

/// Run-level states, in order of progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Nothing resolved yet
    Init,
    /// Configuration snapshot built and validated
    ConfigResolved,
    /// Platform profile detected and cached
    PlatformDetected,
    /// Phases executing
    Phases,
    /// Service artifacts materialized
    Deployed,
    /// Health validation passed
    Validated,
    /// Run finished
    Terminal(TerminalState),
}

/// Tracks and logs state transitions for one run
#[derive(Debug)]
pub struct StateTracker {
    current: RunState,
    history: Vec<(RunState, DateTime<Utc>)>,
}

impl StateTracker {
    /// Start a tracker in `Init`
    pub fn new() -> Self {
        StateTracker {
            current: RunState::Init,
            history: vec![(RunState::Init, Utc::now())],
        }
    }

    /// Current state
    pub fn current(&self) -> RunState {
        self.current
    }

    /// Every state entered so far, with timestamps
    pub fn history(&self) -> &[(RunState, DateTime<Utc>)] {
        &self.history
    }

    /// Move to a new state
    pub fn transition(&mut self, to: RunState) {
        info!(from = ?self.current, to = ?to, "state transition");
        self.current = to;
        self.history.push((to, Utc::now()));
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
