//! The fixed provisioning phase catalog
//!
//! Declared once, executed strictly in this order. Each phase implements
//! its own idempotency predicate; package phases degrade to recorded
//! warnings on hosts without a package manager, and firewall openings are
//! skipped when no backend is confirmed active.

use async_trait::async_trait;
use command_runner::Command;
use std::path::Path;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::deploy::{self, SERVICE_NAME};
use crate::health;
use crate::identity;
use crate::phase::{Criticality, Phase, RetryPolicy};
use crate::state::RunState;
use crate::Result;

/// Packages every deployment needs regardless of the service
const BASE_PACKAGES: &[&str] = &["curl", "logrotate", "ca-certificates"];

/// Persistent journal storage location
const JOURNAL_DIR: &str = "/var/log/journal";

/// The pipeline, in declaration order
pub fn standard_phases() -> Vec<Box<dyn Phase>> {
    vec![
        Box::new(DiskPreflight),
        Box::new(ServiceIdentity),
        Box::new(PackageIndexRefresh),
        Box::new(SystemUpgrade),
        Box::new(BaseTools),
        Box::new(PersistentJournal),
        Box::new(ServiceDeploy),
        Box::new(FirewallOpenings),
        Box::new(PackageCleanup),
        Box::new(ServiceStart),
        Box::new(HealthValidation),
    ]
}

/// Global free-space check before anything else runs
struct DiskPreflight;

#[async_trait]
impl Phase for DiskPreflight {
    fn name(&self) -> &'static str {
        "disk-preflight"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        deploy::ensure_free_space(ctx, Path::new("/"))
    }
}

/// Settle the host on the configured service identity
struct ServiceIdentity;

#[async_trait]
impl Phase for ServiceIdentity {
    fn name(&self) -> &'static str {
        "service-identity"
    }

    async fn is_satisfied(&self, ctx: &RunContext) -> Result<bool> {
        identity::is_settled(ctx).await
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let outcome = identity::ensure_identity(ctx).await?;
        info!(
            user = %outcome.user,
            created = outcome.created,
            cleaned_previous = ?outcome.cleaned_previous,
            "service identity settled"
        );
        Ok(())
    }
}

/// Refresh the package index; network-dependent, bounded retry
struct PackageIndexRefresh;

#[async_trait]
impl Phase for PackageIndexRefresh {
    fn name(&self) -> &'static str {
        "package-index-refresh"
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(RetryPolicy::network())
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.package_manager.available() {
            degrade_no_package_manager(ctx, self.name());
            return Ok(());
        }
        ctx.package_manager.refresh_index(&ctx.runner).await
    }
}

/// Upgrade installed packages; network-dependent, bounded retry
struct SystemUpgrade;

#[async_trait]
impl Phase for SystemUpgrade {
    fn name(&self) -> &'static str {
        "system-upgrade"
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(RetryPolicy::network())
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.package_manager.available() {
            degrade_no_package_manager(ctx, self.name());
            return Ok(());
        }
        ctx.package_manager.upgrade_all(&ctx.runner).await
    }
}

/// Install the tools later phases rely on
struct BaseTools;

#[async_trait]
impl Phase for BaseTools {
    fn name(&self) -> &'static str {
        "base-tools"
    }

    fn criticality(&self) -> Criticality {
        Criticality::Warn
    }

    async fn is_satisfied(&self, ctx: &RunContext) -> Result<bool> {
        if !ctx.package_manager.available() {
            return Ok(false);
        }
        for package in BASE_PACKAGES {
            if !ctx.package_manager.is_installed(&ctx.runner, package).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.package_manager.available() {
            degrade_no_package_manager(ctx, self.name());
            return Ok(());
        }
        ctx.package_manager.install(&ctx.runner, BASE_PACKAGES).await
    }
}

/// Make journald storage persistent across reboots
struct PersistentJournal;

#[async_trait]
impl Phase for PersistentJournal {
    fn name(&self) -> &'static str {
        "persistent-journal"
    }

    fn criticality(&self) -> Criticality {
        Criticality::Warn
    }

    async fn is_satisfied(&self, _ctx: &RunContext) -> Result<bool> {
        Ok(Path::new(JOURNAL_DIR).is_dir())
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        ctx.create_dir_all(Path::new(JOURNAL_DIR))?;
        let mut restart = Command::new("systemctl");
        restart.arg("restart").arg("systemd-journald");
        ctx.runner.apply_checked(&restart).await
    }
}

/// Materialize the service's runtime artifacts
struct ServiceDeploy;

#[async_trait]
impl Phase for ServiceDeploy {
    fn name(&self) -> &'static str {
        "service-deploy"
    }

    fn milestone(&self) -> Option<RunState> {
        Some(RunState::Deployed)
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        deploy::deploy(ctx).await.map(|_| ())
    }
}

/// Open the configured ports on the active firewall backend
struct FirewallOpenings;

#[async_trait]
impl Phase for FirewallOpenings {
    fn name(&self) -> &'static str {
        "firewall-openings"
    }

    fn criticality(&self) -> Criticality {
        Criticality::Warn
    }

    async fn is_satisfied(&self, ctx: &RunContext) -> Result<bool> {
        if !ctx.firewall.available() || !ctx.firewall.is_active(&ctx.runner).await? {
            return Ok(false);
        }
        for &port in &ctx.config.ports {
            if !ctx.firewall.port_allowed(&ctx.runner, port).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.firewall.available() {
            warn!("no firewall backend detected; leaving ports unmanaged");
            ctx.error_log
                .note(self.name(), "no firewall backend detected; skipped");
            return Ok(());
        }
        if !ctx.firewall.is_active(&ctx.runner).await? {
            info!(
                backend = ctx.firewall.name(),
                "firewall installed but not active; leaving it untouched"
            );
            ctx.error_log.note(
                self.name(),
                format!("{} installed but inactive; skipped", ctx.firewall.name()),
            );
            return Ok(());
        }

        for &port in &ctx.config.ports {
            if !ctx.firewall.port_allowed(&ctx.runner, port).await? {
                ctx.firewall.allow_port(&ctx.runner, port).await?;
            }
        }
        ctx.firewall.reload(&ctx.runner).await
    }
}

/// Drop unneeded packages and caches left behind by the upgrade
struct PackageCleanup;

#[async_trait]
impl Phase for PackageCleanup {
    fn name(&self) -> &'static str {
        "package-cleanup"
    }

    fn criticality(&self) -> Criticality {
        Criticality::Warn
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        if !ctx.package_manager.available() {
            degrade_no_package_manager(ctx, self.name());
            return Ok(());
        }
        ctx.package_manager.clean(&ctx.runner).await
    }
}

/// Enable and (re)start the deployed unit
struct ServiceStart;

#[async_trait]
impl Phase for ServiceStart {
    fn name(&self) -> &'static str {
        "service-start"
    }

    async fn is_satisfied(&self, ctx: &RunContext) -> Result<bool> {
        // Nothing to start when the operator disabled it; restart is
        // otherwise always wanted so a redeploy takes effect.
        Ok(!ctx.config.start_service)
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        let mut enable = Command::new("systemctl");
        enable.arg("enable").arg(SERVICE_NAME);
        ctx.runner.apply_checked(&enable).await?;

        let mut restart = Command::new("systemctl");
        restart.arg("restart").arg(SERVICE_NAME);
        ctx.runner.apply_checked(&restart).await
    }
}

/// Probe the started service
struct HealthValidation;

#[async_trait]
impl Phase for HealthValidation {
    fn name(&self) -> &'static str {
        "health-validation"
    }

    fn milestone(&self) -> Option<RunState> {
        Some(RunState::Validated)
    }

    async fn is_satisfied(&self, ctx: &RunContext) -> Result<bool> {
        // Only meaningful when the service was actually started; dry runs
        // never start anything.
        Ok(!ctx.config.start_service || ctx.dry_run())
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        health::validate(ctx).await.map(|_| ())
    }
}

fn degrade_no_package_manager(ctx: &RunContext, phase: &str) {
    warn!(phase, "no package manager on this host; skipping");
    ctx.error_log
        .note(phase, "no package manager on this host; skipped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_is_fixed() {
        let names: Vec<&str> = standard_phases().iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "disk-preflight",
                "service-identity",
                "package-index-refresh",
                "system-upgrade",
                "base-tools",
                "persistent-journal",
                "service-deploy",
                "firewall-openings",
                "package-cleanup",
                "service-start",
                "health-validation",
            ]
        );
    }

    #[test]
    fn test_only_network_phases_retry() {
        for phase in standard_phases() {
            let retries = phase.retry_policy().is_some();
            let expected = matches!(phase.name(), "package-index-refresh" | "system-upgrade");
            assert_eq!(retries, expected, "{}", phase.name());
        }
    }

    #[test]
    fn test_criticality_split() {
        for phase in standard_phases() {
            let warn = matches!(phase.criticality(), Criticality::Warn);
            let expected = matches!(
                phase.name(),
                "base-tools" | "persistent-journal" | "firewall-openings" | "package-cleanup"
            );
            assert_eq!(warn, expected, "{}", phase.name());
        }
    }
}
