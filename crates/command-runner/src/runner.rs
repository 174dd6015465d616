//! Runner trait for command execution backends

use async_trait::async_trait;

use crate::command::Command;
use crate::error::Result;
use crate::output::{CommandOutput, ExitStatus};

/// A backend that can execute commands
///
/// Implementations decide where and how the process runs; callers only see
/// the captured outcome. The orchestrator holds a `Runner` behind a trait
/// object so tests can substitute a scripted backend.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Execute a command to completion, capturing combined output
    async fn run(&self, command: &Command) -> Result<CommandOutput>;

    /// Execute a command with inherited stdio
    ///
    /// Used for tools that must interact with the operator directly, such
    /// as credential prompts. Nothing is captured beyond the exit status.
    async fn run_interactive(&self, command: &Command) -> Result<ExitStatus>;
}
