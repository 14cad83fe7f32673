// file: src/distro/mod.rs
// version: 1.0.0
// guid: f47a1e20-6c93-4d58-8b07-e2a94d60c135

//! Distribution detection and package-manager dispatch
//!
//! The distro family is detected once at startup from `/etc/os-release`,
//! normalizing legacy vendor identifiers to a canonical family, and selects
//! one of three [`PackageDriver`] implementations. An unrecognized distro is
//! a fatal abort before any mutating action.

use crate::{process, BootstrapError, Result};
use async_trait::async_trait;
use tracing::info;

/// Canonical distribution families the stack installs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    EnterpriseLinux,
    Mageia,
}

impl DistroFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistroFamily::Debian => "debian",
            DistroFamily::EnterpriseLinux => "enterprise-linux",
            DistroFamily::Mageia => "mageia",
        }
    }

    /// Detect the running distribution
    pub async fn detect() -> Result<Self> {
        let contents = tokio::fs::read_to_string("/etc/os-release")
            .await
            .map_err(|e| {
                BootstrapError::prerequisite(format!("cannot read /etc/os-release: {}", e))
            })?;
        Self::from_os_release(&contents)
    }

    /// Classify an os-release body, normalizing legacy identifiers
    pub fn from_os_release(contents: &str) -> Result<Self> {
        let field = |key: &str| -> Option<String> {
            contents
                .lines()
                .find_map(|line| line.strip_prefix(key))
                .map(|v| v.trim_matches('"').to_ascii_lowercase())
        };

        let id = field("ID=").unwrap_or_default();
        let id_like = field("ID_LIKE=").unwrap_or_default();

        let candidates = std::iter::once(id.as_str()).chain(id_like.split_whitespace());
        for name in candidates {
            match name {
                "debian" | "ubuntu" => return Ok(DistroFamily::Debian),
                // "redhat" is the legacy identifier still emitted by older
                // derivatives; normalize it with the current ones.
                "rhel" | "redhat" | "centos" | "rocky" | "almalinux" | "fedora" => {
                    return Ok(DistroFamily::EnterpriseLinux)
                }
                "mageia" => return Ok(DistroFamily::Mageia),
                _ => {}
            }
        }

        Err(BootstrapError::UnsupportedDistro(if id.is_empty() {
            "unknown".to_string()
        } else {
            id
        }))
    }

    /// Package driver for this family, chosen once at startup
    pub fn package_driver(&self) -> Box<dyn PackageDriver> {
        match self {
            DistroFamily::Debian => Box::new(AptDriver),
            DistroFamily::EnterpriseLinux => Box::new(DnfDriver),
            DistroFamily::Mageia => Box::new(UrpmiDriver),
        }
    }
}

/// Update/install primitives, one implementation per family
#[async_trait]
pub trait PackageDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Refresh the package index and apply pending upgrades
    async fn update(&self) -> Result<()>;

    /// Install the named packages
    async fn install(&self, packages: &[&str]) -> Result<()>;
}

pub struct AptDriver;

#[async_trait]
impl PackageDriver for AptDriver {
    fn name(&self) -> &'static str {
        "apt-get"
    }

    async fn update(&self) -> Result<()> {
        info!("Updating packages with apt-get");
        process::run_checked("apt-get", &["update", "-q"]).await?;
        process::run_checked("apt-get", &["dist-upgrade", "-y", "-q"]).await?;
        Ok(())
    }

    async fn install(&self, packages: &[&str]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Installing packages: {}", packages.join(" "));
        let mut args = vec!["install", "-y", "-q"];
        args.extend_from_slice(packages);
        process::run_checked("apt-get", &args).await?;
        Ok(())
    }
}

pub struct DnfDriver;

#[async_trait]
impl PackageDriver for DnfDriver {
    fn name(&self) -> &'static str {
        "dnf"
    }

    async fn update(&self) -> Result<()> {
        info!("Updating packages with dnf");
        process::run_checked("dnf", &["upgrade", "-y", "-q"]).await?;
        Ok(())
    }

    async fn install(&self, packages: &[&str]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Installing packages: {}", packages.join(" "));
        let mut args = vec!["install", "-y", "-q"];
        args.extend_from_slice(packages);
        process::run_checked("dnf", &args).await?;
        Ok(())
    }
}

pub struct UrpmiDriver;

#[async_trait]
impl PackageDriver for UrpmiDriver {
    fn name(&self) -> &'static str {
        "urpmi"
    }

    async fn update(&self) -> Result<()> {
        info!("Updating packages with urpmi");
        process::run_checked("urpmi.update", &["-a"]).await?;
        process::run_checked("urpmi", &["--auto-update", "--auto"]).await?;
        Ok(())
    }

    async fn install(&self, packages: &[&str]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        info!("Installing packages: {}", packages.join(" "));
        let mut args = vec!["--auto"];
        args.extend_from_slice(packages);
        process::run_checked("urpmi", &args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debian_family() {
        let body = "ID=debian\nVERSION_ID=\"12\"\n";
        assert_eq!(
            DistroFamily::from_os_release(body).unwrap(),
            DistroFamily::Debian
        );
        let ubuntu = "ID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(
            DistroFamily::from_os_release(ubuntu).unwrap(),
            DistroFamily::Debian
        );
    }

    #[test]
    fn test_legacy_redhat_identifier_normalized() {
        let body = "ID=\"redhat\"\n";
        assert_eq!(
            DistroFamily::from_os_release(body).unwrap(),
            DistroFamily::EnterpriseLinux
        );
    }

    #[test]
    fn test_el_derivatives_via_id_like() {
        let rocky = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n";
        assert_eq!(
            DistroFamily::from_os_release(rocky).unwrap(),
            DistroFamily::EnterpriseLinux
        );
    }

    #[test]
    fn test_mageia() {
        assert_eq!(
            DistroFamily::from_os_release("ID=mageia\n").unwrap(),
            DistroFamily::Mageia
        );
    }

    #[test]
    fn test_unknown_distro_is_fatal() {
        match DistroFamily::from_os_release("ID=gentoo\n") {
            Err(BootstrapError::UnsupportedDistro(id)) => assert_eq!(id, "gentoo"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_driver_dispatch() {
        assert_eq!(DistroFamily::Debian.package_driver().name(), "apt-get");
        assert_eq!(DistroFamily::EnterpriseLinux.package_driver().name(), "dnf");
        assert_eq!(DistroFamily::Mageia.package_driver().name(), "urpmi");
    }
}
