//! Shared run context and the append-only error log
//!
//! Per the run model there is no ambient global state: every component
//! receives the [`RunContext`] explicitly. The context carries the immutable
//! configuration and platform profile, the dry-run-aware command runner, the
//! capability objects, and the error log.

use chrono::{DateTime, Utc};
use command_runner::{LocalRunner, Runner};
use provis_config::Configuration;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::capabilities::{self, FirewallBackend, MacLabeler, PackageManager};
use crate::health::HealthReport;
use crate::platform::PlatformProfile;
use crate::runner::CommandRunner;
use crate::{Error, Result};

/// One entry of the error log
///
/// Appended whenever an invoked tool exits non-zero, and for recorded
/// degradation warnings (missing capabilities, skipped steps). The log is
/// surfaced in the end-of-run summary and is the sole input to rollback
/// decisions.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Descriptor of the command, or the component that recorded the note
    pub command: String,
    /// Exit code, if a process ran and exited normally
    pub exit_code: Option<i32>,
    /// Captured combined output, or the warning detail
    pub output: String,
    /// When the record was appended
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of failures and warnings, single writer per run
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl ErrorLog {
    /// Append a record
    pub fn append(&self, record: ExecutionRecord) {
        self.records.write().unwrap().push(record);
    }

    /// Record a degradation warning that did not come from a process exit
    pub fn note(&self, source: &str, detail: impl Into<String>) {
        self.append(ExecutionRecord {
            command: source.to_string(),
            exit_code: None,
            output: detail.into(),
            timestamp: Utc::now(),
        });
    }

    /// Snapshot of all records so far
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().unwrap().clone()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }
}

/// Everything a phase needs to act on the host
///
/// Built once per run, after configuration resolution and platform
/// detection; read-only from then on except for the error log and the
/// health report slot.
pub struct RunContext {
    /// The immutable configuration snapshot
    pub config: Arc<Configuration>,
    /// The detected platform profile
    pub profile: Arc<PlatformProfile>,
    /// Dry-run-aware command runner
    pub runner: CommandRunner,
    /// Append-only failure/warning log
    pub error_log: ErrorLog,
    /// Package manager capability (no-op when the host has none)
    pub package_manager: Arc<dyn PackageManager>,
    /// Firewall capability (no-op when the host has none)
    pub firewall: Arc<dyn FirewallBackend>,
    /// Mandatory-access-control labeler (no-op unless enforcing)
    pub labeler: Arc<dyn MacLabeler>,
    /// Identifier stamped into the run transcript
    pub run_id: Uuid,
    /// Filled by health validation when it runs
    pub health: Arc<RwLock<Option<HealthReport>>>,
}

impl RunContext {
    /// Create a context that executes on the local host
    pub fn new(config: Configuration, profile: PlatformProfile) -> Self {
        Self::with_backend(config, profile, Arc::new(LocalRunner::new()))
    }

    /// Create a context over an explicit execution backend
    pub fn with_backend(
        config: Configuration,
        profile: PlatformProfile,
        backend: Arc<dyn Runner>,
    ) -> Self {
        let error_log = ErrorLog::default();
        let runner = CommandRunner::new(backend, config.dry_run, error_log.clone());
        let (package_manager, firewall, labeler) = capabilities::for_profile(&profile);

        RunContext {
            config: Arc::new(config),
            profile: Arc::new(profile),
            runner,
            error_log,
            package_manager,
            firewall,
            labeler,
            run_id: Uuid::new_v4(),
            health: Arc::new(RwLock::new(None)),
        }
    }

    /// True when this run must not mutate the host
    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Write a file, honoring dry-run
    pub fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if self.dry_run() {
            info!(path = %path.display(), "dry-run: would write file");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!(path = %path.display(), "wrote file");
        Ok(())
    }

    /// Create a directory tree, honoring dry-run
    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        if self.dry_run() {
            info!(path = %path.display(), "dry-run: would create directory");
            return Ok(());
        }
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    /// Remove a file if it exists, honoring dry-run
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        if self.dry_run() {
            info!(path = %path.display(), "dry-run: would remove file");
            return Ok(());
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "removed file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Remove a directory tree if it exists, honoring dry-run
    pub fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if self.dry_run() {
            info!(path = %path.display(), "dry-run: would remove directory");
            return Ok(());
        }
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                info!(path = %path.display(), "removed directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Copy a file, honoring dry-run
    pub fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        if self.dry_run() {
            info!(from = %from.display(), to = %to.display(), "dry-run: would copy file");
            return Ok(());
        }
        if !from.exists() {
            warn!(path = %from.display(), "copy source does not exist");
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("copy source {} does not exist", from.display()),
            )));
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
        Ok(())
    }
}
