//! Built-in defaults and the rendered defaults file

use crate::{AppSource, Configuration};
use indexmap::IndexSet;
use std::path::PathBuf;
use url::Url;

/// Fixed path of the persisted configuration record
pub const DEFAULT_CONFIG_PATH: &str = "/etc/provis.conf";

/// Every default value, in one place
pub fn default_configuration() -> Configuration {
    Configuration {
        dry_run: false,
        min_disk_space_mb: 1024,
        runtime_version: "18".to_string(),
        service_user: "media".to_string(),
        cleanup_previous: true,
        log_file: PathBuf::from("/var/log/provis.log"),
        start_service: true,
        health_check_url: "http://localhost:8000/api/server".to_string(),
        ports: [1935, 8000].into_iter().collect::<IndexSet<u16>>(),
        app_source: AppSource::Remote(
            Url::parse("https://raw.githubusercontent.com/illuspas/Node-Media-Server/master/app.js")
                .unwrap(),
        ),
        package_version: "2.6.2".to_string(),
        quiet: false,
        force_cleanup: false,
        no_rollback: false,
    }
}

/// Render the defaults as the key=value text written on auto-creation
///
/// Parsing this text back yields `default_configuration()` exactly; the
/// round trip is unit-tested.
pub fn render_defaults() -> String {
    let defaults = default_configuration();
    let ports = defaults
        .ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "\
# provis configuration
#
# key=value, one per line. Unknown keys are ignored; later invocation
# flags (--force, --quiet, --no-rollback, --dry-run) override these values.

# Log actions without executing them.
dry_run={dry_run}

# Minimum free disk space (MiB) required before provisioning and again
# before the application fetch.
min_disk_space_mb={min_disk_space_mb}

# Expected Node.js major version for the managed service.
runtime_version={runtime_version}

# Account the service runs as. Must match ^[a-z_][a-z0-9_-]*$ and must
# not be root.
service_user={service_user}

# Detect a previous installation under another account and offer to
# remove it.
cleanup_previous={cleanup_previous}

# Append-only transcript of each run; also the deployed service's log
# target and the logrotate scope.
log_file={log_file}

# Start the service after deployment and validate its health.
start_service={start_service}

# Liveness endpoint probed after start.
health_check_url={health_check_url}

# Ports the service listens on, comma separated.
ports={ports}

# Application entrypoint: an http(s) URL to fetch or a path to copy.
app_source={app_source}

# Pinned version of the application package.
package_version={package_version}

# Suppress prompts and non-essential output; the log file becomes the
# sole sink.
quiet={quiet}

# Auto-affirm the cleanup confirmation.
force_cleanup={force_cleanup}

# Disable automatic rollback on failure.
no_rollback={no_rollback}
",
        dry_run = defaults.dry_run,
        min_disk_space_mb = defaults.min_disk_space_mb,
        runtime_version = defaults.runtime_version,
        service_user = defaults.service_user,
        cleanup_previous = defaults.cleanup_previous,
        log_file = defaults.log_file.display(),
        start_service = defaults.start_service,
        health_check_url = defaults.health_check_url,
        ports = ports,
        app_source = defaults.app_source,
        package_version = defaults.package_version,
        quiet = defaults.quiet,
        force_cleanup = defaults.force_cleanup,
        no_rollback = defaults.no_rollback,
    )
}
