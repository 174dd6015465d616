//! Service identity lifecycle
//!
//! Validates the target service account, detects a previous installation
//! owned by a different identity, and performs the confirmed cleanup and
//! account creation. Identity validation runs before any host mutation;
//! the root account is refused unconditionally as either source or target
//! of cleanup.

use command_runner::Command;
use nix::unistd::{Uid, User};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::deploy::{INSTALL_DIR_NAME, LOGROTATE_PATH, RUNTIME_ENV_DIR_NAME, SERVICE_NAME, UNIT_PATH};
use crate::{Error, Result};

/// What `ensure_identity` did
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityOutcome {
    /// The settled service account
    pub user: String,
    /// Whether the account was created by this run
    pub created: bool,
    /// The prior identity that was cleaned up, if any
    pub cleaned_previous: Option<String>,
}

/// Validate the service account name
///
/// Enforces the username grammar and the root-exclusion invariant. Called
/// before any mutating phase; the same check also runs during configuration
/// validation, so a bad identity can never reach the pipeline.
pub fn validate_service_user(name: &str) -> Result<()> {
    let grammar = regex::Regex::new(r"^[a-z_][a-z0-9_-]*$").unwrap();
    if !grammar.is_match(name) {
        return Err(Error::Identity(format!(
            "'{}' does not match ^[a-z_][a-z0-9_-]*$",
            name
        )));
    }
    if name == "root" {
        return Err(Error::Identity(
            "the root account cannot own the service".to_string(),
        ));
    }
    Ok(())
}

/// Whether an account exists on the host
pub fn user_exists(name: &str) -> bool {
    matches!(User::from_name(name), Ok(Some(_)))
}

/// Home directory of an account, with a conventional fallback for accounts
/// that do not exist yet (dry runs, pre-creation paths)
pub fn home_of(name: &str) -> PathBuf {
    match User::from_name(name) {
        Ok(Some(user)) => user.dir,
        _ => PathBuf::from(format!("/home/{}", name)),
    }
}

/// True when the identity phase has nothing left to do
pub async fn is_settled(ctx: &RunContext) -> Result<bool> {
    let target = &ctx.config.service_user;
    if !user_exists(target) {
        return Ok(false);
    }
    if !ctx.config.cleanup_previous {
        return Ok(true);
    }
    Ok(match detect_previous_owner(ctx)? {
        None => true,
        Some(owner) => owner == *target,
    })
}

/// Validate the target identity and settle the host on it
///
/// Runs the full lifecycle: grammar/root validation, prior-installation
/// detection and confirmed cleanup, then account creation if the target
/// does not exist.
pub async fn ensure_identity(ctx: &RunContext) -> Result<IdentityOutcome> {
    let target = ctx.config.service_user.clone();
    validate_service_user(&target)?;

    let mut cleaned_previous = None;
    if ctx.config.cleanup_previous {
        if let Some(owner) = detect_previous_owner(ctx)? {
            guard_cleanup_owner(&owner)?;
            if owner != target {
                info!(owner = %owner, "previous installation found under a different identity");
                if confirm_cleanup(ctx, &owner) {
                    cleanup_previous(ctx, &owner).await?;
                    cleaned_previous = Some(owner);
                } else {
                    warn!(owner = %owner, "cleanup declined; previous installation left in place");
                    ctx.error_log.note(
                        "identity",
                        format!("cleanup of previous installation under '{}' declined", owner),
                    );
                }
            }
        }
    }

    let created = if user_exists(&target) {
        false
    } else {
        create_user(ctx, &target).await?;
        true
    };

    Ok(IdentityOutcome {
        user: target,
        created,
        cleaned_previous,
    })
}

/// Detect the identity owning a previous installation
///
/// Ladder, first hit wins, at most one identity: the deployed unit's
/// `User=` line, then ownership of the install directory under the target's
/// home, then a host-wide scan of /home for the install directory name.
pub fn detect_previous_owner(ctx: &RunContext) -> Result<Option<String>> {
    if let Ok(content) = std::fs::read_to_string(UNIT_PATH) {
        if let Some(user) = parse_unit_user(&content) {
            return Ok(Some(user));
        }
    }

    let target_install = home_of(&ctx.config.service_user).join(INSTALL_DIR_NAME);
    if target_install.exists() {
        if let Some(owner) = owner_of(&target_install) {
            return Ok(Some(owner));
        }
    }

    if let Ok(entries) = std::fs::read_dir("/home") {
        for entry in entries.flatten() {
            let candidate = entry.path().join(INSTALL_DIR_NAME);
            if candidate.exists() {
                let owner = owner_of(&candidate)
                    .or_else(|| entry.file_name().to_str().map(str::to_string));
                if let Some(owner) = owner {
                    return Ok(Some(owner));
                }
            }
        }
    }

    Ok(None)
}

/// Refuse cleanup of the root account, regardless of flags
///
/// A hard invariant, not a configurable option: root is never a valid
/// source or target of cleanup.
pub fn guard_cleanup_owner(owner: &str) -> Result<()> {
    if owner == "root" {
        return Err(Error::Identity(
            "previous installation is owned by root; refusing to clean it up".to_string(),
        ));
    }
    Ok(())
}

/// Extract the `User=` value from unit file text
pub(crate) fn parse_unit_user(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("User="))
        .map(str::to_string)
}

fn owner_of(path: &Path) -> Option<String> {
    let stat = nix::sys::stat::stat(path).ok()?;
    let user = User::from_uid(Uid::from_raw(stat.st_uid)).ok()??;
    Some(user.name)
}

/// Decide the cleanup confirmation without prompting, when possible
///
/// `force_cleanup` auto-affirms; quiet mode without force auto-declines
/// (never silently destructive); dry runs proceed as if confirmed because
/// their forward actions are recorded, not executed. `None` means ask.
fn auto_decision(force_cleanup: bool, quiet: bool, dry_run: bool) -> Option<bool> {
    if force_cleanup {
        Some(true)
    } else if quiet {
        Some(false)
    } else if dry_run {
        Some(true)
    } else {
        None
    }
}

fn confirm_cleanup(ctx: &RunContext, owner: &str) -> bool {
    let home = home_of(owner);
    if !ctx.config.quiet {
        println!("A previous installation owned by '{}' was found. Cleanup will remove:", owner);
        println!("  - the '{}' account and its home directory {}", owner, home.display());
        println!("  - {}", home.join(INSTALL_DIR_NAME).display());
        println!("  - the deployed unit {}", UNIT_PATH);
        println!("  - the log rotation policy {}", LOGROTATE_PATH);
    }

    if let Some(decision) = auto_decision(
        ctx.config.force_cleanup,
        ctx.config.quiet,
        ctx.dry_run(),
    ) {
        info!(decision, "cleanup confirmation decided without prompting");
        return decision;
    }

    print!("Proceed? [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Remove the prior deployment and its owning account
async fn cleanup_previous(ctx: &RunContext, owner: &str) -> Result<()> {
    info!(owner = %owner, "removing previous installation");
    let home = home_of(owner);

    // Service registration first, then files, then the account.
    let mut stop = Command::new("systemctl");
    stop.arg("stop").arg(SERVICE_NAME);
    let _ = ctx.runner.apply(&stop).await;

    let mut disable = Command::new("systemctl");
    disable.arg("disable").arg(SERVICE_NAME);
    let _ = ctx.runner.apply(&disable).await;

    ctx.remove_file(Path::new(UNIT_PATH))?;

    let mut reload = Command::new("systemctl");
    reload.arg("daemon-reload");
    let _ = ctx.runner.apply(&reload).await;

    ctx.remove_file(Path::new(LOGROTATE_PATH))?;
    ctx.remove_dir_all(&home.join(INSTALL_DIR_NAME))?;
    ctx.remove_dir_all(&home.join(RUNTIME_ENV_DIR_NAME))?;

    let mut userdel = Command::new("userdel");
    userdel.arg("-r").arg(owner);
    ctx.runner.apply_checked(&userdel).await?;

    Ok(())
}

/// Create the target account with a home directory
async fn create_user(ctx: &RunContext, name: &str) -> Result<()> {
    info!(user = %name, "creating service account");
    let mut useradd = Command::new("useradd");
    useradd.arg("-m").arg(name);
    ctx.runner.apply_checked(&useradd).await?;

    if ctx.dry_run() {
        info!(user = %name, "dry-run: would assign credentials interactively");
        return Ok(());
    }
    if ctx.config.quiet {
        warn!(user = %name, "skipping interactive credential assignment");
        ctx.error_log.note(
            "identity",
            format!("credential assignment for '{}' skipped; set a password manually", name),
        );
        return Ok(());
    }

    let mut passwd = Command::new("passwd");
    passwd.arg(name);
    let status = ctx.runner.apply_interactive(&passwd).await?;
    if !status.success() {
        warn!(user = %name, "credential assignment failed; account left without a password");
    }
    Ok(())
}
