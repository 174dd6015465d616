//! Phase executor
//!
//! Runs the declared phases strictly in order, evaluating each idempotency
//! predicate first, reporting progress as `completed/total` after every
//! phase regardless of outcome, and invoking rollback on fatal failure
//! unless it is suppressed.

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::{ExecutionRecord, RunContext};
use crate::phase::{Criticality, Phase, PhaseOutcome};
use crate::rollback;
use crate::state::{RunState, StateTracker, TerminalState};
use crate::{Error, Result};

/// Outcome of one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    /// Phase name
    pub name: &'static str,
    /// What happened
    pub outcome: PhaseOutcome,
}

/// Everything the operator sees at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Identifier stamped into the transcript
    pub run_id: Uuid,
    /// How the run ended
    pub terminal: TerminalState,
    /// Per-phase outcomes, in execution order
    pub phases: Vec<PhaseReport>,
    /// Accumulated failures and warnings
    pub records: Vec<ExecutionRecord>,
}

impl RunReport {
    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        match self.terminal {
            TerminalState::Success => 0,
            _ => 1,
        }
    }
}

/// Drives the fixed phase pipeline
pub struct PhaseExecutor;

impl PhaseExecutor {
    /// Execute the phases against the given context
    pub async fn run(phases: &[Box<dyn Phase>], ctx: &RunContext) -> RunReport {
        let mut tracker = StateTracker::new();
        tracker.transition(RunState::ConfigResolved);
        tracker.transition(RunState::PlatformDetected);
        tracker.transition(RunState::Phases);
        Self::run_tracked(phases, ctx, &mut tracker).await
    }

    /// Execute the phases, recording state transitions in `tracker`
    pub async fn run_tracked(
        phases: &[Box<dyn Phase>],
        ctx: &RunContext,
        tracker: &mut StateTracker,
    ) -> RunReport {
        let total = phases.len();
        let mut reports = Vec::with_capacity(total);
        let mut failure: Option<TerminalState> = None;

        for (index, phase) in phases.iter().enumerate() {
            let name = phase.name();

            let satisfied = match phase.is_satisfied(ctx).await {
                Ok(satisfied) => satisfied,
                Err(e) => {
                    warn!(phase = name, error = %e, "idempotency predicate failed; running phase");
                    false
                }
            };

            let outcome = if satisfied {
                info!(phase = name, "already satisfied; skipping");
                PhaseOutcome::AlreadySatisfied
            } else {
                match execute_with_retry(phase.as_ref(), ctx).await {
                    Ok(()) => {
                        // Milestones only apply to real runs: dry runs never
                        // leave the Phases state.
                        if !ctx.dry_run() {
                            if let Some(state) = phase.milestone() {
                                tracker.transition(state);
                            }
                        }
                        PhaseOutcome::Completed
                    }
                    Err(err) => match classify_failure(phase.as_ref(), &err) {
                        FailureAction::Continue => {
                            warn!(phase = name, error = %err, "phase failed; continuing");
                            PhaseOutcome::Warned(err.to_string())
                        }
                        FailureAction::AbortNoRollback => {
                            error!(phase = name, error = %err, "phase failed; aborting");
                            failure = Some(TerminalState::FailedNoRollback);
                            PhaseOutcome::Failed(err.to_string())
                        }
                        FailureAction::AbortWithRollback => {
                            error!(phase = name, error = %err, "phase failed; rolling back");
                            let terminal = if ctx.config.no_rollback {
                                info!("rollback suppressed by configuration");
                                TerminalState::FailedNoRollback
                            } else {
                                rollback::run(ctx).await;
                                TerminalState::FailedRolledBack
                            };
                            failure = Some(terminal);
                            PhaseOutcome::Failed(err.to_string())
                        }
                    },
                }
            };

            // Progress after every phase regardless of outcome, so operators
            // can estimate remaining work even under failure.
            info!(
                "[{}/{}] {}: {}",
                index + 1,
                total,
                name,
                outcome_label(&outcome)
            );
            reports.push(PhaseReport { name, outcome });

            if failure.is_some() {
                break;
            }
        }

        let terminal = failure.unwrap_or(TerminalState::Success);
        tracker.transition(RunState::Terminal(terminal));

        RunReport {
            run_id: ctx.run_id,
            terminal,
            phases: reports,
            records: ctx.error_log.records(),
        }
    }
}

enum FailureAction {
    Continue,
    AbortNoRollback,
    AbortWithRollback,
}

fn classify_failure(phase: &dyn Phase, err: &Error) -> FailureAction {
    // Disk exhaustion aborts immediately and performs no rollback: the
    // check ran before this phase mutated anything, and tearing down a
    // previously healthy deployment because the disk filled would leave
    // the host worse off.
    if matches!(err, Error::DiskExhausted { .. }) {
        return FailureAction::AbortNoRollback;
    }
    match phase.criticality() {
        Criticality::Warn => FailureAction::Continue,
        Criticality::Fatal => FailureAction::AbortWithRollback,
    }
}

async fn execute_with_retry(phase: &dyn Phase, ctx: &RunContext) -> Result<()> {
    let Some(policy) = phase.retry_policy() else {
        return phase.run(ctx).await;
    };

    let mut attempt = 1u32;
    loop {
        match phase.run(ctx).await {
            Ok(()) => return Ok(()),
            // A missing capability will not appear between attempts
            Err(err @ Error::CapabilityMissing(_)) => return Err(err),
            Err(err) if attempt < policy.max_attempts => {
                warn!(
                    phase = phase.name(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "attempt failed; backing off"
                );
                async_io::Timer::after(policy.backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn outcome_label(outcome: &PhaseOutcome) -> &'static str {
    match outcome {
        PhaseOutcome::Completed => "completed",
        PhaseOutcome::AlreadySatisfied => "already satisfied",
        PhaseOutcome::Warned(_) => "failed (warning)",
        PhaseOutcome::Failed(_) => "failed (fatal)",
    }
}
