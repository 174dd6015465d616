use anyhow::{Context, Result};
use command_runner::LocalRunner;
use host_orchestration::{platform, CommandRunner, ErrorLog};
use provis_config::defaults::default_configuration;
use std::path::Path;
use std::sync::Arc;

/// Resolve and validate the configuration, then show what detection sees.
/// Nothing on the host is mutated; an absent config file is reported, not
/// auto-created.
pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating {}...", config_path.display());

    let mut config = default_configuration();
    if config_path.exists() {
        provis_config::parser::apply_file(&mut config, config_path)
            .context("failed to parse configuration")?;
    } else {
        println!("  (config file absent; validating built-in defaults)");
    }
    config.validate().context("configuration invalid")?;

    println!("✓ Configuration valid");
    println!("  Service user: {}", config.service_user);
    println!(
        "  Ports: {}",
        config
            .ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  App source: {}", config.app_source);
    println!("  Health check: {}", config.health_check_url);

    let backend: Arc<dyn command_runner::Runner> = Arc::new(LocalRunner::new());
    let probe = CommandRunner::new(backend, false, ErrorLog::default());
    let profile = platform::detect(&probe).await;

    println!("✓ Platform detected");
    println!("  Distribution: {} ({:?})", profile.distro_id, profile.family);
    match &profile.package_manager {
        Some(pm) => println!("  Package manager: {}", pm.tool),
        None => println!("  ⚠ No package manager; package phases will degrade to warnings"),
    }
    println!("  Firewall backend: {:?}", profile.firewall_backend);
    println!("  SELinux enforcing: {}", profile.selinux_enforcing);

    Ok(())
}
