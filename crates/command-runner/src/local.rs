//! Local process execution backend

use async_process::Stdio;
use async_trait::async_trait;
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::output::{CommandOutput, ExitStatus};
use crate::runner::Runner;

/// Runner that executes commands as local child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a new local runner
    pub fn new() -> Self {
        LocalRunner
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn run(&self, command: &Command) -> Result<CommandOutput> {
        debug!(command = %command, "executing");

        let mut cmd = command.prepare();
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let output = cmd.output().await.map_err(|e| spawn_error(command, e))?;

        // Combined capture: stdout first, then stderr. The consumers of
        // these records only ever read the transcript as one blob.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(CommandOutput {
            status: output.status.into(),
            output: combined,
        })
    }

    async fn run_interactive(&self, command: &Command) -> Result<ExitStatus> {
        debug!(command = %command, "executing interactively");

        let mut cmd = command.prepare();
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd.stdin(Stdio::inherit());

        let status = cmd.status().await.map_err(|e| spawn_error(command, e))?;
        Ok(status.into())
    }
}

fn spawn_error(command: &Command, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound {
            command: command.get_program().to_string_lossy().into_owned(),
        }
    } else {
        Error::spawn_failed(format!("{}: {}", command, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        smol::block_on(async {
            let runner = LocalRunner::new();
            let cmd = Command::builder("echo").arg("hello").build();

            let result = runner.run(&cmd).await.unwrap();
            assert!(result.success());
            assert_eq!(result.output.trim(), "hello");
        });
    }

    #[test]
    fn test_run_nonzero_exit() {
        smol::block_on(async {
            let runner = LocalRunner::new();
            let cmd = Command::new("false");

            let result = runner.run(&cmd).await.unwrap();
            assert!(!result.success());
            assert_eq!(result.status.code, Some(1));
        });
    }

    #[test]
    fn test_run_command_not_found() {
        smol::block_on(async {
            let runner = LocalRunner::new();
            let cmd = Command::new("definitely-not-a-real-command-12345");

            match runner.run(&cmd).await {
                Err(Error::CommandNotFound { command }) => {
                    assert_eq!(command, "definitely-not-a-real-command-12345");
                }
                other => panic!("expected CommandNotFound, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_run_combines_stderr() {
        smol::block_on(async {
            let runner = LocalRunner::new();
            let cmd = Command::builder("sh")
                .arg("-c")
                .arg("echo out; echo err >&2")
                .build();

            let result = runner.run(&cmd).await.unwrap();
            assert!(result.success());
            assert!(result.output.contains("out"));
            assert!(result.output.contains("err"));
        });
    }
}
