//! Phase model
//!
//! A phase is one named, idempotent step of the provisioning pipeline.
//! Phases are static, declared once in `phases::standard_phases`, and run
//! strictly in declaration order; a phase is only ever skipped when its
//! idempotency predicate already holds, and that skip is reported, never
//! silent.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::context::RunContext;
use crate::state::RunState;
use crate::Result;

/// What a phase failure means for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Criticality {
    /// Failure aborts the run and triggers rollback
    Fatal,
    /// Failure is recorded and the run continues
    Warn,
}

/// Bounded retry for inherently network-dependent phases
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before the failure escalates
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// The policy attached to package index/upgrade phases
    pub fn network() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Outcome of one phase, reported in the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PhaseOutcome {
    /// Forward action ran to completion
    Completed,
    /// Idempotency predicate already held; nothing was run
    AlreadySatisfied,
    /// Failed, but the phase is non-fatal
    Warned(String),
    /// Failed fatally; the run stopped here
    Failed(String),
}

/// One step of the pipeline
#[async_trait]
pub trait Phase: Send + Sync {
    /// Stable name used in progress lines and the summary
    fn name(&self) -> &'static str;

    /// What a failure of this phase means
    fn criticality(&self) -> Criticality {
        Criticality::Fatal
    }

    /// Bounded retry, for network-dependent phases only
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// Run-level state reached when this phase completes
    fn milestone(&self) -> Option<RunState> {
        None
    }

    /// Idempotency predicate: true when the desired state already holds
    async fn is_satisfied(&self, _ctx: &RunContext) -> Result<bool> {
        Ok(false)
    }

    /// The forward action
    async fn run(&self, ctx: &RunContext) -> Result<()>;
}
