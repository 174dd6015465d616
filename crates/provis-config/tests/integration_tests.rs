//! Integration tests for configuration resolution

use provis_config::defaults::{default_configuration, render_defaults};
use provis_config::{parser, resolver, AppSource};

#[test]
fn test_resolution_layers_defaults_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provis.conf");
    std::fs::write(
        &path,
        "service_user=svc1\nports=1935,8000\nhealth_check_url=http://localhost:8000/api/server\n",
    )
    .unwrap();

    let config = resolver::resolve_from(
        default_configuration(),
        &path,
        &["--dry-run".to_string()],
    )
    .unwrap();

    // file layer
    assert_eq!(config.service_user, "svc1");
    // flag layer
    assert!(config.dry_run);
    // default layer
    assert_eq!(config.package_version, default_configuration().package_version);
}

#[test]
fn test_missing_file_without_root_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.conf");

    let config = resolver::resolve_from(default_configuration(), &path, &[]).unwrap();
    assert_eq!(config, default_configuration());

    // The write only happens with elevated privilege; as an unprivileged
    // test we must not have created it.
    if !nix::unistd::Uid::effective().is_root() {
        assert!(!path.exists());
    }
}

#[test]
fn test_rendered_defaults_parse_back() {
    let mut config = default_configuration();
    parser::apply_str(&mut config, &render_defaults()).unwrap();
    assert_eq!(config, default_configuration());
    config.validate().unwrap();
}

#[test]
fn test_local_app_source_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provis.conf");
    std::fs::write(&path, "app_source=/opt/media/app.js\n").unwrap();

    let config = resolver::resolve_from(default_configuration(), &path, &[]).unwrap();
    assert_eq!(
        config.app_source,
        AppSource::Local(std::path::PathBuf::from("/opt/media/app.js"))
    );
    assert!(!config.app_source.is_remote());
}

#[test]
fn test_root_user_in_file_fails_before_any_phase() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provis.conf");
    std::fs::write(&path, "service_user=root\n").unwrap();

    let err = resolver::resolve_from(default_configuration(), &path, &[]).unwrap_err();
    assert!(err.to_string().contains("root"));
}
