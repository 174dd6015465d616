//! Service deployment
//!
//! Materializes the runtime artifacts of the managed service: install
//! directory under the target identity's home, runtime packages, the
//! application package and entrypoint, the systemd unit, and the logrotate
//! policy. Ownership is (re)applied whenever the identity changes, and
//! mandatory-access-control labels are restored on every artifact when
//! enforcement is active.

use command_runner::Command;
use provis_config::AppSource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::identity::{self, parse_unit_user};
use crate::render;
use crate::{Error, Result};

/// Name of the deployed service and its unit
pub const SERVICE_NAME: &str = "media-server";
/// Fixed path of the deployed unit file
pub const UNIT_PATH: &str = "/etc/systemd/system/media-server.service";
/// Fixed path of the logrotate policy
pub const LOGROTATE_PATH: &str = "/etc/logrotate.d/media-server";
/// npm package deployed into the install directory
pub const APP_PACKAGE: &str = "node-media-server";
/// Runtime packages provisioned through the platform's package manager
pub const RUNTIME_PACKAGES: &[&str] = &["nodejs", "npm"];
/// Install directory name under the target identity's home
pub const INSTALL_DIR_NAME: &str = "media-server";
/// Runtime environment directory name under the identity's home
pub const RUNTIME_ENV_DIR_NAME: &str = ".npm";

/// Restart behavior rendered into the unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestartPolicy {
    /// systemd Restart= value
    pub restart: &'static str,
    /// systemd RestartSec= value
    pub backoff_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy {
            restart: "always",
            backoff_secs: 10,
        }
    }
}

/// Everything needed to render and manage the deployed service
///
/// Derived from the configuration; replaced whenever the service identity
/// changes across runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    /// Identity the service runs as
    pub target_user: String,
    /// Install directory under the identity's home
    pub install_dir: PathBuf,
    /// Application entrypoint inside the install directory
    pub entrypoint: PathBuf,
    /// Log target for the unit and scope of the logrotate policy
    pub log_path: PathBuf,
    /// Ports the service listens on
    pub ports: Vec<u16>,
    /// Always-restart policy with fixed backoff
    pub restart_policy: RestartPolicy,
}

impl ServiceDescriptor {
    /// Build the descriptor for the configured deployment
    pub fn from_config(config: &provis_config::Configuration) -> Self {
        let home = identity::home_of(&config.service_user);
        let install_dir = home.join(INSTALL_DIR_NAME);
        ServiceDescriptor {
            target_user: config.service_user.clone(),
            install_dir: install_dir.clone(),
            entrypoint: install_dir.join("app.js"),
            log_path: config.log_file.clone(),
            ports: config.ports.iter().copied().collect(),
            restart_policy: RestartPolicy::default(),
        }
    }
}

/// Free space in MiB on the filesystem containing `path`
///
/// Walks up to the deepest existing ancestor so pre-creation paths (dry
/// runs) still resolve to a filesystem.
pub fn free_space_mb(path: &Path) -> Result<u64> {
    let mut probe = path;
    let stat = loop {
        match nix::sys::statvfs::statvfs(probe) {
            Ok(stat) => break stat,
            Err(_) => match probe.parent() {
                Some(parent) => probe = parent,
                None => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no filesystem found for {}", path.display()),
                    )))
                }
            },
        }
    };
    Ok((stat.blocks_available() as u64 * stat.fragment_size() as u64) / (1024 * 1024))
}

/// Abort with `DiskExhausted` when free space is below the configured floor
pub fn ensure_free_space(ctx: &RunContext, path: &Path) -> Result<()> {
    let needed_mb = ctx.config.min_disk_space_mb;
    let available_mb = free_space_mb(path)?;
    if available_mb < needed_mb {
        return Err(Error::DiskExhausted {
            path: path.to_path_buf(),
            needed_mb,
            available_mb,
        });
    }
    debug!(path = %path.display(), available_mb, needed_mb, "disk space ok");
    Ok(())
}

/// Materialize the service's runtime artifacts
pub async fn deploy(ctx: &RunContext) -> Result<ServiceDescriptor> {
    let descriptor = ServiceDescriptor::from_config(&ctx.config);
    let user = descriptor.target_user.as_str();

    // Install directory under the identity's home, owned by the identity.
    ctx.create_dir_all(&descriptor.install_dir)?;
    chown_recursive(ctx, user, &descriptor.install_dir).await?;

    install_runtime(ctx).await?;

    // Earlier phases may have consumed space; check again immediately
    // before the primary artifact fetch.
    ensure_free_space(ctx, &descriptor.install_dir)?;

    install_app_package(ctx, &descriptor).await?;
    fetch_entrypoint(ctx, &descriptor).await?;

    // Fetched artifacts were written by this (root) process.
    chown_recursive(ctx, user, &descriptor.install_dir).await?;

    write_unit(ctx, &descriptor).await?;
    write_logrotate(ctx, &descriptor).await?;
    apply_labels(ctx, &descriptor).await;

    info!(service = SERVICE_NAME, user = %user, "service deployed");
    Ok(descriptor)
}

/// Ensure the Node.js runtime is present and log a drift warning when its
/// major version differs from the configured expectation
async fn install_runtime(ctx: &RunContext) -> Result<()> {
    let mut version_probe = Command::new("node");
    version_probe.arg("--version");

    let installed = match ctx.runner.query(&version_probe).await {
        Ok(output) if output.success() => Some(output.output.trim().to_string()),
        _ => None,
    };

    if installed.is_none() {
        if !ctx.package_manager.available() {
            warn!("no package manager; cannot install the runtime");
            ctx.error_log.note(
                "deploy",
                "runtime installation skipped: no package manager on this host",
            );
            return Ok(());
        }
        ctx.package_manager
            .install(&ctx.runner, RUNTIME_PACKAGES)
            .await?;
        return Ok(());
    }

    let expected = &ctx.config.runtime_version;
    if let Some(version) = installed {
        let major = version.trim_start_matches('v').split('.').next().unwrap_or("");
        if major != expected.as_str() {
            warn!(installed = %version, expected = %expected, "runtime major version differs");
            ctx.error_log.note(
                "deploy",
                format!(
                    "runtime version drift: installed {} but {} configured",
                    version, expected
                ),
            );
        }
    }
    Ok(())
}

/// Install the pinned application package into the install directory, as
/// the target identity
async fn install_app_package(ctx: &RunContext, descriptor: &ServiceDescriptor) -> Result<()> {
    let spec = format!("{}@{}", APP_PACKAGE, ctx.config.package_version);
    let mut npm = Command::new("runuser");
    npm.arg("-u")
        .arg(&descriptor.target_user)
        .arg("--")
        .arg("npm")
        .arg("install")
        .arg("--prefix")
        .arg(&descriptor.install_dir)
        .arg(&spec);
    ctx.runner.apply_checked(&npm).await
}

/// Fetch or copy the application entrypoint
async fn fetch_entrypoint(ctx: &RunContext, descriptor: &ServiceDescriptor) -> Result<()> {
    match &ctx.config.app_source {
        AppSource::Remote(url) => {
            let mut curl = Command::new("curl");
            curl.arg("-fsSL")
                .arg("-o")
                .arg(&descriptor.entrypoint)
                .arg(url.as_str());
            ctx.runner.apply_checked(&curl).await
        }
        AppSource::Local(path) => ctx.copy_file(path, &descriptor.entrypoint),
    }
}

async fn chown_recursive(ctx: &RunContext, user: &str, path: &Path) -> Result<()> {
    let mut chown = Command::new("chown");
    chown
        .arg("-R")
        .arg(format!("{}:{}", user, user))
        .arg(path);
    ctx.runner.apply_checked(&chown).await
}

/// Render and install the unit, stopping a previously deployed unit first
/// when it belongs to a different identity
async fn write_unit(ctx: &RunContext, descriptor: &ServiceDescriptor) -> Result<()> {
    if let Ok(existing) = std::fs::read_to_string(UNIT_PATH) {
        if let Some(owner) = parse_unit_user(&existing) {
            if owner != descriptor.target_user {
                info!(owner = %owner, "stopping previously deployed unit before overwrite");
                let mut stop = Command::new("systemctl");
                stop.arg("stop").arg(SERVICE_NAME);
                let _ = ctx.runner.apply(&stop).await;
            }
        }
    }

    ctx.write_file(Path::new(UNIT_PATH), &render::unit(descriptor))?;

    let mut reload = Command::new("systemctl");
    reload.arg("daemon-reload");
    ctx.runner.apply_checked(&reload).await
}

/// Render and install the logrotate policy, then verify it parses
async fn write_logrotate(ctx: &RunContext, descriptor: &ServiceDescriptor) -> Result<()> {
    ctx.write_file(Path::new(LOGROTATE_PATH), &render::logrotate(descriptor))?;

    if ctx.dry_run() {
        return Ok(());
    }

    let mut verify = Command::new("logrotate");
    verify.arg("--debug").arg(LOGROTATE_PATH);
    match ctx.runner.query(&verify).await {
        Ok(output) if output.success() => {}
        Ok(output) => {
            warn!("logrotate rejected the rendered policy");
            ctx.error_log.note(
                "deploy",
                format!("logrotate verification failed: {}", output.output.trim()),
            );
        }
        Err(e) => {
            warn!(error = %e, "logrotate not available for verification");
            ctx.error_log
                .note("deploy", format!("logrotate verification unavailable: {}", e));
        }
    }
    Ok(())
}

/// Restore MAC labels on every artifact; failures are warnings, not fatal
async fn apply_labels(ctx: &RunContext, descriptor: &ServiceDescriptor) {
    if !ctx.labeler.enforcing() {
        return;
    }
    for path in [
        descriptor.install_dir.as_path(),
        Path::new(UNIT_PATH),
        Path::new(LOGROTATE_PATH),
        descriptor.log_path.as_path(),
    ] {
        if let Err(e) = ctx.labeler.relabel(&ctx.runner, path).await {
            warn!(path = %path.display(), error = %e, "label restoration failed");
            ctx.error_log.note(
                "deploy",
                format!("label restoration failed for {}: {}", path.display(), e),
            );
        }
    }
}
