//! Typed rendering of deployment artifacts
//!
//! The unit and logrotate files are rendered from the [`ServiceDescriptor`]
//! record by pure functions. No shell-level string interpolation happens
//! anywhere near these artifacts, and both renderings are covered by golden
//! tests.

use crate::deploy::ServiceDescriptor;

/// Render the systemd unit for the deployed service
pub fn unit(descriptor: &ServiceDescriptor) -> String {
    format!(
        "\
[Unit]
Description=Node media streaming service
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
User={user}
Group={user}
WorkingDirectory={install_dir}
ExecStart=/usr/bin/node {entrypoint}
Restart={restart}
RestartSec={backoff}
StandardOutput=append:{log}
StandardError=append:{log}

[Install]
WantedBy=multi-user.target
",
        user = descriptor.target_user,
        install_dir = descriptor.install_dir.display(),
        entrypoint = descriptor.entrypoint.display(),
        restart = descriptor.restart_policy.restart,
        backoff = descriptor.restart_policy.backoff_secs,
        log = descriptor.log_path.display(),
    )
}

/// Render the logrotate policy for the service's log path
pub fn logrotate(descriptor: &ServiceDescriptor) -> String {
    format!(
        "\
{log} {{
    size 50M
    rotate 7
    weekly
    missingok
    notifempty
    compress
    delaycompress
    copytruncate
    su {user} {user}
    create 0640 {user} {user}
}}
",
        log = descriptor.log_path.display(),
        user = descriptor.target_user,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::RestartPolicy;
    use std::path::PathBuf;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            target_user: "media".to_string(),
            install_dir: PathBuf::from("/home/media/media-server"),
            entrypoint: PathBuf::from("/home/media/media-server/app.js"),
            log_path: PathBuf::from("/var/log/provis.log"),
            ports: vec![1935, 8000],
            restart_policy: RestartPolicy::default(),
        }
    }

    #[test]
    fn test_unit_golden() {
        let rendered = unit(&descriptor());
        let expected = "\
[Unit]
Description=Node media streaming service
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
User=media
Group=media
WorkingDirectory=/home/media/media-server
ExecStart=/usr/bin/node /home/media/media-server/app.js
Restart=always
RestartSec=10
StandardOutput=append:/var/log/provis.log
StandardError=append:/var/log/provis.log

[Install]
WantedBy=multi-user.target
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_logrotate_golden() {
        let rendered = logrotate(&descriptor());
        let expected = "\
/var/log/provis.log {
    size 50M
    rotate 7
    weekly
    missingok
    notifempty
    compress
    delaycompress
    copytruncate
    su media media
    create 0640 media media
}
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_unit_binds_identity_everywhere() {
        let mut desc = descriptor();
        desc.target_user = "svc1".to_string();
        let rendered = unit(&desc);
        assert!(rendered.contains("User=svc1"));
        assert!(rendered.contains("Group=svc1"));
        assert!(!rendered.contains("User=media"));
    }
}
