//! Capability seams over host subsystems
//!
//! The phase executor never branches on tool identity: it talks to these
//! traits, and detection picks one concrete implementation per present tool
//! plus a no-op implementation for "absent". Every method routes through the
//! [`CommandRunner`] so dry-run and failure recording hold uniformly.

use async_trait::async_trait;
use command_runner::Command;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::platform::{FirewallKind, PackageManagerCommands, PlatformProfile};
use crate::runner::CommandRunner;
use crate::{Error, Result};

/// Build the capability objects for a detected profile
pub fn for_profile(
    profile: &PlatformProfile,
) -> (
    Arc<dyn PackageManager>,
    Arc<dyn FirewallBackend>,
    Arc<dyn MacLabeler>,
) {
    let package_manager: Arc<dyn PackageManager> = match &profile.package_manager {
        Some(commands) => Arc::new(SystemPackageManager::new(commands.clone())),
        None => Arc::new(NoOpPackageManager),
    };

    let firewall: Arc<dyn FirewallBackend> = match profile.firewall_backend {
        FirewallKind::Ufw => Arc::new(UfwBackend),
        FirewallKind::Firewalld => Arc::new(FirewalldBackend),
        FirewallKind::Iptables => Arc::new(IptablesBackend),
        FirewallKind::None => Arc::new(NoOpFirewall),
    };

    let labeler: Arc<dyn MacLabeler> = if profile.selinux_enforcing {
        Arc::new(SelinuxLabeler)
    } else {
        Arc::new(NoOpLabeler)
    };

    (package_manager, firewall, labeler)
}

fn argv_command(argv: &[&str]) -> Command {
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);
    cmd
}

/// Package manager operations
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Tool name for logs
    fn name(&self) -> &str;

    /// False for the no-op implementation on unequipped hosts
    fn available(&self) -> bool {
        true
    }

    /// Refresh the package index
    async fn refresh_index(&self, runner: &CommandRunner) -> Result<()>;

    /// Upgrade all installed packages
    async fn upgrade_all(&self, runner: &CommandRunner) -> Result<()>;

    /// Install packages by name
    async fn install(&self, runner: &CommandRunner, packages: &[&str]) -> Result<()>;

    /// Remove unneeded packages and clean caches
    async fn clean(&self, runner: &CommandRunner) -> Result<()>;

    /// Whether a package is already installed
    async fn is_installed(&self, runner: &CommandRunner, package: &str) -> Result<bool>;
}

/// Package manager driven by the detected command set
pub struct SystemPackageManager {
    commands: PackageManagerCommands,
}

impl SystemPackageManager {
    /// Create a package manager over the detected command set
    pub fn new(commands: PackageManagerCommands) -> Self {
        SystemPackageManager { commands }
    }
}

#[async_trait]
impl PackageManager for SystemPackageManager {
    fn name(&self) -> &str {
        self.commands.tool
    }

    async fn refresh_index(&self, runner: &CommandRunner) -> Result<()> {
        runner.apply_checked(&argv_command(self.commands.refresh)).await
    }

    async fn upgrade_all(&self, runner: &CommandRunner) -> Result<()> {
        runner.apply_checked(&argv_command(self.commands.upgrade)).await
    }

    async fn install(&self, runner: &CommandRunner, packages: &[&str]) -> Result<()> {
        let mut cmd = argv_command(self.commands.install);
        cmd.args(packages);
        runner.apply_checked(&cmd).await
    }

    async fn clean(&self, runner: &CommandRunner) -> Result<()> {
        runner.apply_checked(&argv_command(self.commands.clean)).await
    }

    async fn is_installed(&self, runner: &CommandRunner, package: &str) -> Result<bool> {
        let mut cmd = argv_command(self.commands.query);
        cmd.arg(package);
        runner.query_ok(&cmd).await
    }
}

/// Stand-in for hosts with no recognized package manager
pub struct NoOpPackageManager;

#[async_trait]
impl PackageManager for NoOpPackageManager {
    fn name(&self) -> &str {
        "none"
    }

    fn available(&self) -> bool {
        false
    }

    async fn refresh_index(&self, _runner: &CommandRunner) -> Result<()> {
        Err(Error::CapabilityMissing("package manager".to_string()))
    }

    async fn upgrade_all(&self, _runner: &CommandRunner) -> Result<()> {
        Err(Error::CapabilityMissing("package manager".to_string()))
    }

    async fn install(&self, _runner: &CommandRunner, _packages: &[&str]) -> Result<()> {
        Err(Error::CapabilityMissing("package manager".to_string()))
    }

    async fn clean(&self, _runner: &CommandRunner) -> Result<()> {
        Err(Error::CapabilityMissing("package manager".to_string()))
    }

    async fn is_installed(&self, _runner: &CommandRunner, _package: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Firewall operations
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// False for the no-op implementation
    fn available(&self) -> bool {
        true
    }

    /// Whether the backend is actually active (installed-but-inactive
    /// backends must be left untouched)
    async fn is_active(&self, runner: &CommandRunner) -> Result<bool>;

    /// Whether a port rule is already present
    async fn port_allowed(&self, runner: &CommandRunner, port: u16) -> Result<bool>;

    /// Permanently allow a TCP port
    async fn allow_port(&self, runner: &CommandRunner, port: u16) -> Result<()>;

    /// Reload rules after changes
    async fn reload(&self, runner: &CommandRunner) -> Result<()>;
}

/// Uncomplicated Firewall backend
pub struct UfwBackend;

#[async_trait]
impl FirewallBackend for UfwBackend {
    fn name(&self) -> &str {
        "ufw"
    }

    async fn is_active(&self, runner: &CommandRunner) -> Result<bool> {
        let output = runner.query(&argv_command(&["ufw", "status"])).await?;
        Ok(output.success() && output.output.contains("Status: active"))
    }

    async fn port_allowed(&self, runner: &CommandRunner, port: u16) -> Result<bool> {
        let output = runner.query(&argv_command(&["ufw", "status"])).await?;
        Ok(output.success() && output.output.contains(&format!("{}/tcp", port)))
    }

    async fn allow_port(&self, runner: &CommandRunner, port: u16) -> Result<()> {
        runner
            .apply_checked(&argv_command(&["ufw", "allow", &format!("{}/tcp", port)]))
            .await
    }

    async fn reload(&self, runner: &CommandRunner) -> Result<()> {
        runner.apply_checked(&argv_command(&["ufw", "reload"])).await
    }
}

/// firewalld backend
pub struct FirewalldBackend;

#[async_trait]
impl FirewallBackend for FirewalldBackend {
    fn name(&self) -> &str {
        "firewalld"
    }

    async fn is_active(&self, runner: &CommandRunner) -> Result<bool> {
        let output = runner.query(&argv_command(&["firewall-cmd", "--state"])).await?;
        Ok(output.success() && output.output.trim() == "running")
    }

    async fn port_allowed(&self, runner: &CommandRunner, port: u16) -> Result<bool> {
        runner
            .query_ok(&argv_command(&[
                "firewall-cmd",
                &format!("--query-port={}/tcp", port),
            ]))
            .await
    }

    async fn allow_port(&self, runner: &CommandRunner, port: u16) -> Result<()> {
        runner
            .apply_checked(&argv_command(&[
                "firewall-cmd",
                "--permanent",
                &format!("--add-port={}/tcp", port),
            ]))
            .await
    }

    async fn reload(&self, runner: &CommandRunner) -> Result<()> {
        runner
            .apply_checked(&argv_command(&["firewall-cmd", "--reload"]))
            .await
    }
}

/// Plain iptables backend
pub struct IptablesBackend;

#[async_trait]
impl FirewallBackend for IptablesBackend {
    fn name(&self) -> &str {
        "iptables"
    }

    async fn is_active(&self, _runner: &CommandRunner) -> Result<bool> {
        // iptables has no daemon; rules apply as soon as they are added
        Ok(true)
    }

    async fn port_allowed(&self, runner: &CommandRunner, port: u16) -> Result<bool> {
        runner
            .query_ok(&argv_command(&[
                "iptables",
                "-C",
                "INPUT",
                "-p",
                "tcp",
                "--dport",
                &port.to_string(),
                "-j",
                "ACCEPT",
            ]))
            .await
    }

    async fn allow_port(&self, runner: &CommandRunner, port: u16) -> Result<()> {
        runner
            .apply_checked(&argv_command(&[
                "iptables",
                "-A",
                "INPUT",
                "-p",
                "tcp",
                "--dport",
                &port.to_string(),
                "-j",
                "ACCEPT",
            ]))
            .await
    }

    async fn reload(&self, _runner: &CommandRunner) -> Result<()> {
        debug!("iptables rules take effect immediately; nothing to reload");
        Ok(())
    }
}

/// Stand-in for hosts with no firewall backend
pub struct NoOpFirewall;

#[async_trait]
impl FirewallBackend for NoOpFirewall {
    fn name(&self) -> &str {
        "none"
    }

    fn available(&self) -> bool {
        false
    }

    async fn is_active(&self, _runner: &CommandRunner) -> Result<bool> {
        Ok(false)
    }

    async fn port_allowed(&self, _runner: &CommandRunner, _port: u16) -> Result<bool> {
        Ok(false)
    }

    async fn allow_port(&self, _runner: &CommandRunner, _port: u16) -> Result<()> {
        Err(Error::CapabilityMissing("firewall backend".to_string()))
    }

    async fn reload(&self, _runner: &CommandRunner) -> Result<()> {
        Ok(())
    }
}

/// Mandatory-access-control labeling
#[async_trait]
pub trait MacLabeler: Send + Sync {
    /// Labeler name for logs
    fn name(&self) -> &str;

    /// Whether enforcement is active on this host
    fn enforcing(&self) -> bool;

    /// Restore the default label on an artifact
    async fn relabel(&self, runner: &CommandRunner, path: &Path) -> Result<()>;
}

/// SELinux labeler (restorecon)
pub struct SelinuxLabeler;

#[async_trait]
impl MacLabeler for SelinuxLabeler {
    fn name(&self) -> &str {
        "selinux"
    }

    fn enforcing(&self) -> bool {
        true
    }

    async fn relabel(&self, runner: &CommandRunner, path: &Path) -> Result<()> {
        let mut cmd = Command::new("restorecon");
        cmd.arg("-R").arg(path);
        runner.apply_checked(&cmd).await
    }
}

/// Stand-in when no MAC system is enforcing
pub struct NoOpLabeler;

#[async_trait]
impl MacLabeler for NoOpLabeler {
    fn name(&self) -> &str {
        "none"
    }

    fn enforcing(&self) -> bool {
        false
    }

    async fn relabel(&self, _runner: &CommandRunner, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DistroFamily;

    #[test]
    fn test_for_profile_wires_noops_on_generic_host() {
        let profile = PlatformProfile::generic();
        let (pm, fw, labeler) = for_profile(&profile);

        assert!(!pm.available());
        assert!(!fw.available());
        assert!(!labeler.enforcing());
    }

    #[test]
    fn test_for_profile_wires_detected_tools() {
        let profile = PlatformProfile {
            distro_id: "ubuntu".to_string(),
            family: DistroFamily::Debian,
            package_manager: Some(PackageManagerCommands {
                tool: "apt-get",
                refresh: &["apt-get", "update"],
                upgrade: &["apt-get", "upgrade", "-y"],
                install: &["apt-get", "install", "-y"],
                clean: &["apt-get", "autoremove", "-y"],
                query: &["dpkg", "-s"],
            }),
            firewall_backend: FirewallKind::Ufw,
            selinux_enforcing: true,
        };

        let (pm, fw, labeler) = for_profile(&profile);
        assert_eq!(pm.name(), "apt-get");
        assert_eq!(fw.name(), "ufw");
        assert_eq!(labeler.name(), "selinux");
    }
}
