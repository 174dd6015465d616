//! Dry-run-aware command runner
//!
//! Wraps a [`command_runner::Runner`] backend with the two execution modes
//! the orchestrator distinguishes: read-only *queries* (platform probes,
//! idempotency predicates, health checks) which always execute and are never
//! recorded, and mutating *applies* (forward actions) which honor dry-run
//! and append every non-zero exit to the error log.

use command_runner::{Command, CommandOutput, Error as ExecError, ExitStatus, Runner};
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::{ErrorLog, ExecutionRecord};
use crate::{Error, Result};

/// Executes commands on behalf of phases
#[derive(Clone)]
pub struct CommandRunner {
    backend: Arc<dyn Runner>,
    dry_run: bool,
    log: ErrorLog,
}

impl CommandRunner {
    /// Create a runner over the given backend
    pub fn new(backend: Arc<dyn Runner>, dry_run: bool, log: ErrorLog) -> Self {
        CommandRunner {
            backend,
            dry_run,
            log,
        }
    }

    /// True when forward actions are recorded instead of executed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute a read-only probe
    ///
    /// Probes run even in dry-run mode; they never mutate the host and their
    /// failures are interpreted by the caller, not recorded.
    pub async fn query(&self, command: &Command) -> Result<CommandOutput> {
        Ok(self.backend.run(command).await?)
    }

    /// Execute a read-only probe, reduced to "did it exit zero"
    ///
    /// An absent binary reads as `false`, so capability probes degrade
    /// instead of erroring on partially-equipped hosts.
    pub async fn query_ok(&self, command: &Command) -> Result<bool> {
        match self.backend.run(command).await {
            Ok(output) => Ok(output.success()),
            Err(ExecError::CommandNotFound { command }) => {
                debug!(command, "probe target not present");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Execute a mutating forward action
    ///
    /// In dry-run mode the command descriptor is recorded and nothing is
    /// spawned. Otherwise the command runs to completion; a non-zero exit is
    /// appended to the error log and returned to the caller for criticality
    /// handling.
    pub async fn apply(&self, command: &Command) -> Result<CommandOutput> {
        if self.dry_run {
            info!(command = %command, "dry-run: would execute");
            return Ok(CommandOutput {
                status: synthetic_success(),
                output: String::new(),
            });
        }

        let output = match self.backend.run(command).await {
            Ok(output) => output,
            Err(e) => {
                self.log.note(&command.descriptor(), e.to_string());
                return Err(e.into());
            }
        };

        if !output.success() {
            self.log.append(ExecutionRecord {
                command: command.descriptor(),
                exit_code: output.status.code,
                output: output.output.clone(),
                timestamp: chrono::Utc::now(),
            });
        }

        Ok(output)
    }

    /// Execute a forward action and escalate a non-zero exit to an error
    pub async fn apply_checked(&self, command: &Command) -> Result<()> {
        let output = self.apply(command).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::CommandFailure {
                command: command.descriptor(),
                code: output.status.code,
            })
        }
    }

    /// Execute a forward action with inherited stdio
    ///
    /// For tools that must talk to the operator directly (credential
    /// prompts). Honors dry-run like any other apply.
    pub async fn apply_interactive(&self, command: &Command) -> Result<ExitStatus> {
        if self.dry_run {
            info!(command = %command, "dry-run: would execute interactively");
            return Ok(synthetic_success());
        }

        let status = self.backend.run_interactive(command).await?;
        if !status.success() {
            self.log.append(ExecutionRecord {
                command: command.descriptor(),
                exit_code: status.code,
                output: String::new(),
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(status)
    }
}

fn synthetic_success() -> ExitStatus {
    ExitStatus {
        code: Some(0),
        #[cfg(unix)]
        signal: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_runner::LocalRunner;

    fn runner(dry_run: bool) -> (CommandRunner, ErrorLog) {
        let log = ErrorLog::default();
        (
            CommandRunner::new(Arc::new(LocalRunner::new()), dry_run, log.clone()),
            log,
        )
    }

    #[test]
    fn test_dry_run_apply_does_not_execute() {
        smol::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("marker");
            let (runner, log) = runner(true);

            let cmd = Command::builder("touch").arg(&marker).build();
            let output = runner.apply(&cmd).await.unwrap();

            assert!(output.success());
            assert!(!marker.exists());
            assert!(log.is_empty());
        });
    }

    #[test]
    fn test_apply_records_failures() {
        smol::block_on(async {
            let (runner, log) = runner(false);

            let output = runner.apply(&Command::new("false")).await.unwrap();
            assert!(!output.success());
            assert_eq!(log.len(), 1);
            assert_eq!(log.records()[0].exit_code, Some(1));
        });
    }

    #[test]
    fn test_apply_checked_escalates() {
        smol::block_on(async {
            let (runner, _log) = runner(false);

            let err = runner.apply_checked(&Command::new("false")).await.unwrap_err();
            assert!(matches!(err, Error::CommandFailure { code: Some(1), .. }));
        });
    }

    #[test]
    fn test_query_is_not_recorded() {
        smol::block_on(async {
            let (runner, log) = runner(false);

            let output = runner.query(&Command::new("false")).await.unwrap();
            assert!(!output.success());
            assert!(log.is_empty());
        });
    }

    #[test]
    fn test_query_ok_tolerates_missing_binary() {
        smol::block_on(async {
            let (runner, log) = runner(false);

            let cmd = Command::new("definitely-not-a-real-command-12345");
            assert!(!runner.query_ok(&cmd).await.unwrap());
            assert!(log.is_empty());
        });
    }
}
