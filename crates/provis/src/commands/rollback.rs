use anyhow::{Context, Result};
use command_runner::LocalRunner;
use host_orchestration::{platform, rollback, CommandRunner, ErrorLog, RunContext};
use provis_config::defaults::default_configuration;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::logging;

/// Manually reverse the deployed service artifacts.
pub async fn run(config_path: &Path, dry_run: bool) -> Result<()> {
    let mut config = default_configuration();
    if config_path.exists() {
        provis_config::parser::apply_file(&mut config, config_path)
            .context("failed to parse configuration")?;
    }
    config.dry_run = dry_run || config.dry_run;
    config.validate().context("configuration invalid")?;

    let _guard = logging::init(&config)?;
    info!(dry_run = config.dry_run, "manual rollback requested");

    let backend: Arc<dyn command_runner::Runner> = Arc::new(LocalRunner::new());
    let probe = CommandRunner::new(backend.clone(), false, ErrorLog::default());
    let profile = platform::detect(&probe).await;

    let ctx = RunContext::with_backend(config, profile, backend);
    rollback::run(&ctx).await;

    let records = ctx.error_log.records();
    if records.is_empty() {
        println!("Rollback finished cleanly.");
    } else {
        println!("Rollback finished with {} issue(s):", records.len());
        for record in records {
            println!("  {} (exit {:?}): {}", record.command, record.exit_code, record.output.trim());
        }
    }
    Ok(())
}
