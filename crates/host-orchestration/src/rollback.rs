//! Rollback of service artifacts
//!
//! Best-effort, idempotent reversal after a fatal failure: stop and disable
//! the deployed unit, remove the unit file and the logrotate policy, reload
//! the unit cache. Accounts and their data are never touched here; account
//! removal is exclusively the identity module's concern, and only at the
//! operator's request.

use command_runner::Command;
use std::path::Path;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::deploy::{LOGROTATE_PATH, SERVICE_NAME, UNIT_PATH};

/// Reverse service-related changes
///
/// Every step tolerates absence so the sequence can run against any
/// partially deployed state, any number of times.
pub async fn run(ctx: &RunContext) {
    info!(service = SERVICE_NAME, "rolling back service artifacts");

    let mut stop = Command::new("systemctl");
    stop.arg("stop").arg(SERVICE_NAME);
    let _ = ctx.runner.apply(&stop).await;

    let mut disable = Command::new("systemctl");
    disable.arg("disable").arg(SERVICE_NAME);
    let _ = ctx.runner.apply(&disable).await;

    if let Err(e) = ctx.remove_file(Path::new(UNIT_PATH)) {
        warn!(error = %e, "could not remove unit file");
    }
    if let Err(e) = ctx.remove_file(Path::new(LOGROTATE_PATH)) {
        warn!(error = %e, "could not remove logrotate policy");
    }

    let mut reload = Command::new("systemctl");
    reload.arg("daemon-reload");
    let _ = ctx.runner.apply(&reload).await;

    info!("rollback finished");
}
