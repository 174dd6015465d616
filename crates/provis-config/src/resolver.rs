//! Layered configuration resolution

use crate::defaults::{default_configuration, render_defaults};
use crate::{parser, Configuration, Result};
use std::path::Path;
use tracing::{info, warn};

/// Resolve the configuration for one run
///
/// Layers, later wins: built-in defaults, the persisted file at
/// `config_path`, then the invocation flags in `argv`. When the file is
/// absent and the process runs as root, a fully commented defaults file is
/// written first so subsequent runs are reproducible; that write is part of
/// the contract. The returned snapshot has passed validation and is never
/// mutated afterwards.
pub fn resolve(config_path: impl AsRef<Path>, argv: &[String]) -> Result<Configuration> {
    resolve_from(default_configuration(), config_path, argv)
}

/// Resolve starting from an explicit defaults snapshot (for tests)
pub fn resolve_from(
    defaults: Configuration,
    config_path: impl AsRef<Path>,
    argv: &[String],
) -> Result<Configuration> {
    let config_path = config_path.as_ref();
    let mut config = defaults;

    if config_path.exists() {
        parser::apply_file(&mut config, config_path)?;
    } else if nix::unistd::Uid::effective().is_root() {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, render_defaults())?;
        info!(path = %config_path.display(), "wrote default configuration file");
    } else {
        warn!(
            path = %config_path.display(),
            "config file absent and not running as root; using built-in defaults"
        );
    }

    apply_flags(&mut config, argv);
    config.validate()?;
    Ok(config)
}

/// Overlay recognized invocation flags; unrecognized flags are ignored
fn apply_flags(config: &mut Configuration, argv: &[String]) {
    for flag in argv {
        match flag.as_str() {
            "--force" => config.force_cleanup = true,
            "--quiet" => config.quiet = true,
            "--no-rollback" => config.no_rollback = true,
            "--dry-run" => config.dry_run = true,
            other => {
                warn!(flag = other, "ignoring unrecognized flag");
            }
        }
    }
}
