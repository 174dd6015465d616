//! Tracing initialization
//!
//! Two layers: a stdout layer (silenced down to warnings in quiet mode) and
//! an append-only file layer writing the run transcript. The transcript is
//! created with mode 0o660 so it stays owner/group read-write.

use anyhow::Result;
use provis_config::Configuration;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Keeps the non-blocking file writer alive for the duration of the run
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize logging for one run
///
/// A transcript file that cannot be created (unprivileged runs) degrades to
/// stdout-only logging with a notice, never an abort.
pub fn init(config: &Configuration) -> Result<LogGuard> {
    let file_guard = match open_transcript(config) {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_filter(LevelFilter::INFO);

            let stdout_level = if config.quiet {
                LevelFilter::WARN
            } else {
                LevelFilter::INFO
            };
            let stdout_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(stdout_level);

            tracing_subscriber::registry()
                .with(file_layer)
                .with(stdout_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            let stdout_level = if config.quiet {
                LevelFilter::WARN
            } else {
                LevelFilter::INFO
            };
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(stdout_level))
                .init();
            tracing::warn!(
                path = %config.log_file.display(),
                error = %e,
                "cannot open transcript file; logging to stdout only"
            );
            None
        }
    };

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn open_transcript(config: &Configuration) -> std::io::Result<std::fs::File> {
    if let Some(parent) = config.log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o660)
        .open(&config.log_file)?;
    // The open mode is subject to the umask; pin the final bits explicitly.
    let permissions = std::fs::Permissions::from_mode(0o660);
    std::fs::set_permissions(&config.log_file, permissions)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_config::defaults::default_configuration;

    #[test]
    fn test_transcript_created_with_restricted_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = default_configuration();
        config.log_file = dir.path().join("logs").join("provis.log");

        open_transcript(&config).unwrap();

        let mode = std::fs::metadata(&config.log_file)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o660);
    }
}
