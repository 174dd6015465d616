//! Platform detection
//!
//! Maps the host's distribution family to a package-manager command set and
//! probes for a firewall backend and mandatory-access-control enforcement.
//! Detection never fails: an unknown family yields a minimal generic profile
//! and the dependent phases degrade to recorded warnings.

use command_runner::Command;
use serde::Serialize;
use tracing::{debug, info};

use crate::runner::CommandRunner;

/// Known distribution families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistroFamily {
    /// Debian, Ubuntu, Raspbian (apt-get)
    Debian,
    /// Fedora, RHEL, CentOS, Rocky, Alma (dnf)
    Rhel,
    /// Arch, Manjaro (pacman)
    Arch,
    /// openSUSE, SLES (zypper)
    Suse,
    /// Anything else; no package manager commands
    Unknown,
}

/// Concrete argv for each package-manager operation
#[derive(Debug, Clone, Serialize)]
pub struct PackageManagerCommands {
    /// The binary the command set is built around
    pub tool: &'static str,
    /// Refresh the package index
    pub refresh: &'static [&'static str],
    /// Upgrade all installed packages
    pub upgrade: &'static [&'static str],
    /// Install packages by name (names appended)
    pub install: &'static [&'static str],
    /// Remove unneeded packages / clean caches
    pub clean: &'static [&'static str],
    /// Query whether a package is installed (name appended)
    pub query: &'static [&'static str],
}

/// Firewall backends, in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FirewallKind {
    /// Uncomplicated Firewall
    Ufw,
    /// firewalld (firewall-cmd)
    Firewalld,
    /// Plain iptables
    Iptables,
    /// No backend present
    None,
}

/// Detected capability set for the current host
///
/// Created once after distro detection and cached for the run; read-only
/// everywhere else.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformProfile {
    /// `ID=` from /etc/os-release, or "unknown"
    pub distro_id: String,
    /// Mapped distribution family
    pub family: DistroFamily,
    /// Package manager command set, absent on unknown families
    pub package_manager: Option<PackageManagerCommands>,
    /// Detected firewall backend
    pub firewall_backend: FirewallKind,
    /// Whether mandatory access control is enforcing
    pub selinux_enforcing: bool,
}

impl PlatformProfile {
    /// Minimal profile for hosts nothing could be detected on
    pub fn generic() -> Self {
        PlatformProfile {
            distro_id: "unknown".to_string(),
            family: DistroFamily::Unknown,
            package_manager: None,
            firewall_backend: FirewallKind::None,
            selinux_enforcing: false,
        }
    }
}

/// Detect the platform profile for this host
///
/// Only read-only probes are issued; this is safe in dry-run mode and never
/// fails. Missing pieces degrade to `None`/`false` and the phases that need
/// them record warnings instead of aborting.
pub async fn detect(runner: &CommandRunner) -> PlatformProfile {
    let os_release = std::fs::read_to_string("/etc/os-release").unwrap_or_default();
    let (distro_id, id_like) = parse_os_release(&os_release);
    let family = family_for(&distro_id, &id_like);

    let package_manager = match commands_for(family) {
        Some(commands) => {
            if binary_present(runner, commands.tool).await {
                Some(commands)
            } else {
                debug!(tool = commands.tool, "expected package manager not present");
                None
            }
        }
        None => None,
    };

    let firewall_backend = detect_firewall(runner).await;
    let selinux_enforcing = detect_selinux(runner, family).await;

    let profile = PlatformProfile {
        distro_id,
        family,
        package_manager,
        firewall_backend,
        selinux_enforcing,
    };
    info!(
        distro = %profile.distro_id,
        family = ?profile.family,
        firewall = ?profile.firewall_backend,
        selinux = profile.selinux_enforcing,
        "platform detected"
    );
    profile
}

/// Extract ID= and ID_LIKE= from os-release text
fn parse_os_release(content: &str) -> (String, String) {
    let mut id = String::from("unknown");
    let mut id_like = String::new();

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("ID=") {
            id = value.trim_matches('"').to_string();
        } else if let Some(value) = line.strip_prefix("ID_LIKE=") {
            id_like = value.trim_matches('"').to_string();
        }
    }
    (id, id_like)
}

/// Map distro identifiers to a family
fn family_for(id: &str, id_like: &str) -> DistroFamily {
    let matches_any = |needles: &[&str]| {
        needles
            .iter()
            .any(|n| id == *n || id_like.split_whitespace().any(|l| l == *n))
    };

    if matches_any(&["debian", "ubuntu", "raspbian"]) {
        DistroFamily::Debian
    } else if matches_any(&["fedora", "rhel", "centos", "rocky", "almalinux"]) {
        DistroFamily::Rhel
    } else if matches_any(&["arch", "manjaro"]) {
        DistroFamily::Arch
    } else if matches_any(&["opensuse", "opensuse-leap", "opensuse-tumbleweed", "sles", "suse"]) {
        DistroFamily::Suse
    } else {
        DistroFamily::Unknown
    }
}

fn commands_for(family: DistroFamily) -> Option<PackageManagerCommands> {
    match family {
        DistroFamily::Debian => Some(PackageManagerCommands {
            tool: "apt-get",
            refresh: &["apt-get", "update"],
            upgrade: &["apt-get", "upgrade", "-y"],
            install: &["apt-get", "install", "-y"],
            clean: &["apt-get", "autoremove", "-y"],
            query: &["dpkg", "-s"],
        }),
        DistroFamily::Rhel => Some(PackageManagerCommands {
            tool: "dnf",
            refresh: &["dnf", "makecache"],
            upgrade: &["dnf", "upgrade", "-y"],
            install: &["dnf", "install", "-y"],
            clean: &["dnf", "autoremove", "-y"],
            query: &["rpm", "-q"],
        }),
        DistroFamily::Arch => Some(PackageManagerCommands {
            tool: "pacman",
            refresh: &["pacman", "-Sy", "--noconfirm"],
            upgrade: &["pacman", "-Su", "--noconfirm"],
            install: &["pacman", "-S", "--noconfirm", "--needed"],
            clean: &["pacman", "-Sc", "--noconfirm"],
            query: &["pacman", "-Qi"],
        }),
        DistroFamily::Suse => Some(PackageManagerCommands {
            tool: "zypper",
            refresh: &["zypper", "refresh"],
            upgrade: &["zypper", "update", "-y"],
            install: &["zypper", "install", "-y"],
            clean: &["zypper", "clean"],
            query: &["rpm", "-q"],
        }),
        DistroFamily::Unknown => None,
    }
}

/// Probe for the first present firewall backend, in fixed priority order
async fn detect_firewall(runner: &CommandRunner) -> FirewallKind {
    if binary_present(runner, "ufw").await {
        FirewallKind::Ufw
    } else if binary_present(runner, "firewall-cmd").await {
        FirewallKind::Firewalld
    } else if binary_present(runner, "iptables").await {
        FirewallKind::Iptables
    } else {
        FirewallKind::None
    }
}

/// SELinux enforcement check for families known to use it, plus a generic
/// fallback when getenforce happens to be present
async fn detect_selinux(runner: &CommandRunner, family: DistroFamily) -> bool {
    let should_check = family == DistroFamily::Rhel || binary_present(runner, "getenforce").await;
    if !should_check {
        return false;
    }

    match runner.query(&Command::new("getenforce")).await {
        Ok(output) if output.success() => output.output.trim() == "Enforcing",
        _ => false,
    }
}

/// Whether a binary resolves on PATH
pub(crate) async fn binary_present(runner: &CommandRunner, name: &str) -> bool {
    let cmd = Command::builder("sh")
        .arg("-c")
        .arg(format!("command -v {}", name))
        .build();
    runner.query_ok(&cmd).await.unwrap_or(false)
}
