//! Parser for the persisted key=value configuration record

use crate::{AppSource, ConfigError, Configuration, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Overlay a persisted configuration file onto `config`
pub fn apply_file(config: &mut Configuration, path: impl AsRef<Path>) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    apply_str(config, &content)
}

/// Overlay key=value text onto `config`
///
/// Unknown keys are ignored with a warning so old records survive upgrades;
/// malformed lines and unparseable values are errors.
pub fn apply_str(config: &mut Configuration, content: &str) -> Result<()> {
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or(ConfigError::Parse {
            line: idx + 1,
            reason: format!("expected key=value, got '{}'", line),
        })?;
        let key = key.trim();
        let value = value.trim();

        apply_key(config, key, value).map_err(|reason| ConfigError::Parse {
            line: idx + 1,
            reason,
        })?;
    }
    Ok(())
}

fn apply_key(config: &mut Configuration, key: &str, value: &str) -> std::result::Result<(), String> {
    match key {
        "dry_run" => config.dry_run = parse_bool(key, value)?,
        "min_disk_space_mb" => {
            config.min_disk_space_mb = value
                .parse()
                .map_err(|_| format!("{}: '{}' is not a non-negative integer", key, value))?;
        }
        "runtime_version" => config.runtime_version = value.to_string(),
        "service_user" => config.service_user = value.to_string(),
        "cleanup_previous" => config.cleanup_previous = parse_bool(key, value)?,
        "log_file" => config.log_file = PathBuf::from(value),
        "start_service" => config.start_service = parse_bool(key, value)?,
        "health_check_url" => config.health_check_url = value.to_string(),
        "ports" => config.ports = parse_ports(value)?,
        "app_source" => {
            config.app_source =
                AppSource::try_from(value.to_string()).map_err(|e| e.to_string())?;
        }
        "package_version" => config.package_version = value.to_string(),
        "quiet" => config.quiet = parse_bool(key, value)?,
        "force_cleanup" => config.force_cleanup = parse_bool(key, value)?,
        "no_rollback" => config.no_rollback = parse_bool(key, value)?,
        unknown => {
            warn!(key = unknown, "ignoring unknown configuration key");
        }
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(format!("{}: '{}' is not a boolean", key, other)),
    }
}

fn parse_ports(value: &str) -> std::result::Result<indexmap::IndexSet<u16>, String> {
    let mut ports = indexmap::IndexSet::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let port: u16 = part
            .parse()
            .map_err(|_| format!("ports: '{}' is not a port number", part))?;
        ports.insert(port);
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_configuration;

    #[test]
    fn test_apply_overrides_defaults() {
        let mut config = default_configuration();
        apply_str(
            &mut config,
            "service_user=svc1\nports=1935, 8000, 8443\ndry_run=yes\n",
        )
        .unwrap();

        assert_eq!(config.service_user, "svc1");
        assert!(config.dry_run);
        assert_eq!(
            config.ports.iter().copied().collect::<Vec<_>>(),
            vec![1935, 8000, 8443]
        );
    }

    #[test]
    fn test_comments_and_blanks_are_skipped() {
        let mut config = default_configuration();
        apply_str(&mut config, "# a comment\n\n   \nquiet=true\n").unwrap();
        assert!(config.quiet);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let mut config = default_configuration();
        apply_str(&mut config, "some_future_key=whatever\n").unwrap();
        assert_eq!(config, default_configuration());
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let mut config = default_configuration();
        let err = apply_str(&mut config, "service_user\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_bad_port_is_an_error() {
        let mut config = default_configuration();
        assert!(apply_str(&mut config, "ports=1935,eight").is_err());
        assert!(apply_str(&mut config, "ports=123456").is_err());
    }

    #[test]
    fn test_bad_bool_is_an_error() {
        let mut config = default_configuration();
        assert!(apply_str(&mut config, "dry_run=maybe").is_err());
    }

    #[test]
    fn test_negative_disk_threshold_is_an_error() {
        let mut config = default_configuration();
        assert!(apply_str(&mut config, "min_disk_space_mb=-5").is_err());
    }
}
