//! # Provis Configuration
//!
//! Configuration resolution for the provis host provisioner.
//!
//! A run's configuration is built exactly once, from three layers: built-in
//! defaults, the persisted key=value record, and invocation flags (later
//! layers win). After [`resolver::resolve`] returns, the snapshot is
//! immutable for the rest of the run.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub mod defaults;
pub mod parser;
pub mod resolver;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// A line in the persisted record could not be parsed
    #[error("config line {line}: {reason}")]
    Parse {
        /// 1-based line number in the persisted file
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// A resolved field failed validation
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Where the application entrypoint comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AppSource {
    /// Fetched over the network
    Remote(Url),
    /// Copied from a path on the host
    Local(PathBuf),
}

impl AppSource {
    /// Returns true for network sources
    pub fn is_remote(&self) -> bool {
        matches!(self, AppSource::Remote(_))
    }
}

impl TryFrom<String> for AppSource {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self> {
        if value.contains("://") {
            let url = Url::parse(&value)
                .map_err(|e| ConfigError::Validation(format!("app_source: {}", e)))?;
            match url.scheme() {
                "http" | "https" => Ok(AppSource::Remote(url)),
                other => Err(ConfigError::Validation(format!(
                    "app_source: unsupported scheme '{}'",
                    other
                ))),
            }
        } else if value.is_empty() {
            Err(ConfigError::Validation(
                "app_source must not be empty".to_string(),
            ))
        } else {
            Ok(AppSource::Local(PathBuf::from(value)))
        }
    }
}

impl From<AppSource> for String {
    fn from(source: AppSource) -> String {
        source.to_string()
    }
}

impl fmt::Display for AppSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppSource::Remote(url) => f.write_str(url.as_str()),
            AppSource::Local(path) => f.write_str(&path.to_string_lossy()),
        }
    }
}

/// The immutable configuration snapshot for one run
///
/// Built by [`resolver::resolve`]; shared read-only by every other
/// component for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Log actions without executing them
    pub dry_run: bool,
    /// Minimum free disk space required at each checkpoint, in MiB
    pub min_disk_space_mb: u64,
    /// Expected major version of the managed service's runtime
    pub runtime_version: String,
    /// Account the service runs as; never root
    pub service_user: String,
    /// Detect and offer to remove a previous installation
    pub cleanup_previous: bool,
    /// Append-only run transcript; also the deployed service's log target
    pub log_file: PathBuf,
    /// Start the service after deployment
    pub start_service: bool,
    /// Liveness endpoint probed after start
    pub health_check_url: String,
    /// Ports the service listens on, in declaration order
    pub ports: IndexSet<u16>,
    /// Where the application entrypoint comes from
    pub app_source: AppSource,
    /// Pinned version of the application package
    pub package_version: String,
    /// Suppress interactive prompts and non-essential output
    pub quiet: bool,
    /// Auto-affirm the previous-installation cleanup confirmation
    pub force_cleanup: bool,
    /// Disable automatic rollback on failure
    pub no_rollback: bool,
}

impl Configuration {
    /// Validate every field, as the last step of resolution
    ///
    /// Must pass before any phase executes; a failure here aborts the run
    /// with no host mutation.
    pub fn validate(&self) -> Result<()> {
        let username = regex::Regex::new(r"^[a-z_][a-z0-9_-]*$").unwrap();
        if !username.is_match(&self.service_user) {
            return Err(ConfigError::Validation(format!(
                "service_user '{}' does not match ^[a-z_][a-z0-9_-]*$",
                self.service_user
            )));
        }
        if self.service_user == "root" {
            return Err(ConfigError::Validation(
                "service_user must not be root".to_string(),
            ));
        }
        if self.ports.is_empty() {
            return Err(ConfigError::Validation(
                "ports must not be empty".to_string(),
            ));
        }
        if self.ports.contains(&0) {
            return Err(ConfigError::Validation(
                "ports must be in 1..=65535".to_string(),
            ));
        }
        if !self.log_file.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "log_file '{}' must be an absolute path",
                self.log_file.display()
            )));
        }
        Url::parse(&self.health_check_url)
            .map_err(|e| ConfigError::Validation(format!("health_check_url: {}", e)))?;
        if self.runtime_version.is_empty() {
            return Err(ConfigError::Validation(
                "runtime_version must not be empty".to_string(),
            ));
        }
        if self.package_version.is_empty() {
            return Err(ConfigError::Validation(
                "package_version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        defaults::default_configuration().validate().unwrap();
    }

    #[test]
    fn test_root_service_user_is_rejected() {
        let mut config = defaults::default_configuration();
        config.service_user = "root".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_username_grammar_is_rejected() {
        let mut config = defaults::default_configuration();
        for bad in ["1media", "Media", "me dia", "-media", ""] {
            config.service_user = bad.to_string();
            assert!(config.validate().is_err(), "{:?} should be rejected", bad);
        }
        for good in ["media", "_svc", "svc1", "a-b_c"] {
            config.service_user = good.to_string();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_empty_ports_are_rejected() {
        let mut config = defaults::default_configuration();
        config.ports.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_url_is_rejected() {
        let mut config = defaults::default_configuration();
        config.health_check_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_source_parsing() {
        let remote: AppSource = "https://example.com/app.js".to_string().try_into().unwrap();
        assert!(remote.is_remote());

        let local: AppSource = "/opt/app.js".to_string().try_into().unwrap();
        assert_eq!(local, AppSource::Local(PathBuf::from("/opt/app.js")));

        let bad: std::result::Result<AppSource, _> =
            AppSource::try_from("ftp://example.com/app.js".to_string());
        assert!(bad.is_err());
    }
}
