//! Post-deployment health validation
//!
//! Runs only when the service was actually started. Checks process
//! activity, the listening state of every configured port, and one HTTP
//! liveness probe. An inactive process or a failed probe is fatal and
//! triggers rollback; a port that is not listening is a recorded warning
//! only, because the liveness probe is the authoritative health signal.

use async_io::Timer;
use async_net::TcpStream;
use command_runner::Command;
use futures_lite::future;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::deploy::SERVICE_NAME;
use crate::{Error, Result};

/// Fixed settle interval before the first check
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Connection timeout per port probe
const PORT_TIMEOUT: Duration = Duration::from_secs(2);

/// What the validator observed
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// systemd reports the unit active
    pub process_active: bool,
    /// Configured ports found listening
    pub listening_ports: Vec<u16>,
    /// Configured ports not listening (recorded warnings)
    pub unreachable_ports: Vec<u16>,
    /// The liveness endpoint answered 2xx
    pub probe_ok: bool,
}

/// Validate the deployed service after start
pub async fn validate(ctx: &RunContext) -> Result<HealthReport> {
    validate_with_settle(ctx, SETTLE_INTERVAL).await
}

/// Validation body with an explicit settle interval (tests use zero)
pub async fn validate_with_settle(ctx: &RunContext, settle: Duration) -> Result<HealthReport> {
    Timer::after(settle).await;

    let mut is_active = Command::new("systemctl");
    is_active.arg("is-active").arg("--quiet").arg(SERVICE_NAME);
    let process_active = ctx.runner.query_ok(&is_active).await?;

    if !process_active {
        ctx.error_log
            .note("health", format!("{} is not active after start", SERVICE_NAME));
        store(ctx, HealthReport {
            process_active: false,
            listening_ports: Vec::new(),
            unreachable_ports: ctx.config.ports.iter().copied().collect(),
            probe_ok: false,
        });
        return Err(Error::Validation(format!(
            "{} is not active after start",
            SERVICE_NAME
        )));
    }

    let mut listening_ports = Vec::new();
    let mut unreachable_ports = Vec::new();
    for &port in &ctx.config.ports {
        if port_listening(port, PORT_TIMEOUT).await {
            listening_ports.push(port);
        } else {
            warn!(port, "configured port is not listening");
            ctx.error_log
                .note("health", format!("port {} is not listening", port));
            unreachable_ports.push(port);
        }
    }

    let url = ctx.config.health_check_url.clone();
    let mut probe = Command::new("curl");
    probe.arg("-fsS").arg("--max-time").arg("10").arg(&url);
    let probe_ok = match ctx.runner.query(&probe).await {
        Ok(output) if output.success() => true,
        Ok(output) => {
            ctx.error_log.append(crate::context::ExecutionRecord {
                command: probe.descriptor(),
                exit_code: output.status.code,
                output: output.output,
                timestamp: chrono::Utc::now(),
            });
            false
        }
        Err(e) => {
            ctx.error_log.note("health", format!("liveness probe unavailable: {}", e));
            false
        }
    };

    let report = HealthReport {
        process_active,
        listening_ports,
        unreachable_ports,
        probe_ok,
    };
    store(ctx, report.clone());

    if !probe_ok {
        return Err(Error::Validation(format!(
            "liveness probe against {} failed",
            url
        )));
    }

    info!(
        listening = ?report.listening_ports,
        "service is healthy"
    );
    Ok(report)
}

/// Whether something accepts TCP connections on 127.0.0.1:port
pub async fn port_listening(port: u16, timeout: Duration) -> bool {
    let connect = async {
        TcpStream::connect(("127.0.0.1", port)).await.is_ok()
    };
    let deadline = async {
        Timer::after(timeout).await;
        false
    };
    future::or(connect, deadline).await
}

fn store(ctx: &RunContext, report: HealthReport) {
    *ctx.health.write().unwrap() = Some(report);
}
