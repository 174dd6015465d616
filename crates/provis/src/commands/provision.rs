use anyhow::{Context, Result};
use command_runner::LocalRunner;
use host_orchestration::{identity, phases, platform, CommandRunner, ErrorLog, PhaseExecutor, RunContext};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::{logging, summary};

pub async fn run(
    config_path: &Path,
    force: bool,
    quiet: bool,
    no_rollback: bool,
    dry_run: bool,
    extra: Vec<String>,
) -> Result<()> {
    // Everything funnels through the resolver's flag overlay so precedence
    // lives in one place; unrecognized extras are ignored there.
    let mut argv = extra;
    if force {
        argv.push("--force".to_string());
    }
    if quiet {
        argv.push("--quiet".to_string());
    }
    if no_rollback {
        argv.push("--no-rollback".to_string());
    }
    if dry_run {
        argv.push("--dry-run".to_string());
    }

    let config = provis_config::resolver::resolve(config_path, &argv)
        .context("configuration resolution failed")?;

    // The identity invariants hold before any phase executes.
    identity::validate_service_user(&config.service_user)
        .context("service identity validation failed")?;

    let _guard = logging::init(&config)?;
    info!(config = %serde_json::to_string(&config)?, "starting provisioning run");

    let backend: Arc<dyn command_runner::Runner> = Arc::new(LocalRunner::new());
    let probe = CommandRunner::new(backend.clone(), false, ErrorLog::default());
    let profile = platform::detect(&probe).await;

    let ctx = RunContext::with_backend(config, profile, backend);
    let report = PhaseExecutor::run(&phases::standard_phases(), &ctx).await;

    summary::print(&report, &ctx);

    if report.exit_code() != 0 {
        std::process::exit(report.exit_code());
    }
    Ok(())
}
