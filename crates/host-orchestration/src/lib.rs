//! # Host Orchestration
//!
//! The provisioning core: platform detection, phase sequencing with
//! idempotency and dry-run support, service identity lifecycle, deployment,
//! health validation, and rollback.
//!
//! Execution is single-threaded and strictly sequential; phases mutate
//! shared host state (package database, filesystem, firewall rules) through
//! external tools that offer no isolation, so there is deliberately no
//! parallel phase execution.
//!
//! ## Example
//!
//! ```no_run
//! use host_orchestration::{platform, phases, CommandRunner, ErrorLog, PhaseExecutor, RunContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = provis_config::resolver::resolve("/etc/provis.conf", &[])?;
//! let backend: Arc<dyn command_runner::Runner> = Arc::new(command_runner::LocalRunner::new());
//!
//! let probe = CommandRunner::new(backend.clone(), false, ErrorLog::default());
//! let profile = platform::detect(&probe).await;
//!
//! let ctx = RunContext::with_backend(config, profile, backend);
//! let report = PhaseExecutor::run(&phases::standard_phases(), &ctx).await;
//! std::process::exit(report.exit_code());
//! # }
//! ```

#![warn(missing_docs)]

pub mod capabilities;
pub mod context;
pub mod deploy;
pub mod executor;
pub mod health;
pub mod identity;
pub mod phase;
pub mod phases;
pub mod platform;
pub mod render;
pub mod rollback;
pub mod runner;
pub mod state;

pub use context::{ErrorLog, ExecutionRecord, RunContext};
pub use deploy::ServiceDescriptor;
pub use executor::{PhaseExecutor, PhaseReport, RunReport};
pub use health::HealthReport;
pub use phase::{Criticality, Phase, PhaseOutcome, RetryPolicy};
pub use platform::{DistroFamily, FirewallKind, PlatformProfile};
pub use runner::CommandRunner;
pub use state::{RunState, StateTracker, TerminalState};

use std::path::PathBuf;

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] provis_config::ConfigError),

    /// Invalid or disallowed service identity
    #[error("identity error: {0}")]
    Identity(String),

    /// Command execution errors
    #[error("command execution error: {0}")]
    CommandRunner(#[from] command_runner::Error),

    /// An invoked tool exited non-zero on a checked action
    #[error("command failed: {command} (exit {code:?})")]
    CommandFailure {
        /// Descriptor of the failed command
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
    },

    /// An expected host subsystem is absent
    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    /// Post-deploy health validation failed
    #[error("health validation failed: {0}")]
    Validation(String),

    /// Insufficient free disk space at a checkpoint
    #[error("insufficient disk space at {path}: {needed_mb} MiB required, {available_mb} MiB available")]
    DiskExhausted {
        /// Filesystem that was checked
        path: PathBuf,
        /// Configured minimum, in MiB
        needed_mb: u64,
        /// What statvfs reported, in MiB
        available_mb: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
