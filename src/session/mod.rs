// file: src/session/mod.rs
// version: 1.0.0
// guid: 4b8f2d60-9e57-4c13-8a2b-f61d03e79c45

//! Installation session state
//!
//! One `InstallSession` is the unit of a provisioning run. It is created once
//! from defaults and CLI flags, then threaded mutably through every stage
//! (discovered facts and wizard answers land here) instead of living in
//! ambient globals. It is never persisted beyond the rendered inventory and
//! the on-disk vault-password file.

use crate::cli::Cli;
use crate::distro::DistroFamily;
use crate::facts::NetworkFacts;
use std::path::{Path, PathBuf};

/// State of one provisioning run, threaded through every stage
#[derive(Debug, Clone)]
pub struct InstallSession {
    /// Timezone applied to the target system
    pub timezone: String,
    /// Interface carrying the static address; discovered unless forced by flag
    pub interface: Option<String>,
    /// Public IP; omitted from the inventory entirely when absent
    pub public_ip: Option<String>,
    /// FQDN of the server being provisioned
    pub server_fqdn: Option<String>,
    /// Medulla console root password; generated during vault init when unset
    pub root_password: Option<String>,
    /// Working directory for playbooks and rendered artifacts
    pub workdir: PathBuf,
    /// Archive URL the playbooks are fetched from
    pub playbook_url: String,
    /// When false, the playbook fetch stage is skipped
    pub standalone: bool,
    /// Wizard prompts enabled
    pub interactive: bool,
    /// Create a VirtualBox VM and install inside it
    pub vm_mode: bool,

    /// Network facts, filled by the fact-defaulting stage
    pub facts: Option<NetworkFacts>,
    /// Distro family, filled by the distro-check stage
    pub distro: Option<DistroFamily>,
}

impl InstallSession {
    /// Build a session from parsed CLI flags; flags override discovered
    /// defaults, the wizard later overrides both when enabled
    pub fn from_cli(cli: &Cli) -> Self {
        let workdir = shellexpand::tilde(&cli.workdir).into_owned();

        Self {
            timezone: cli.timezone.clone(),
            interface: cli.interface.clone(),
            public_ip: cli.public_ip.clone(),
            server_fqdn: cli.server_fqdn.clone(),
            root_password: cli.medulla_root_pw.clone(),
            workdir: PathBuf::from(workdir),
            playbook_url: cli.playbook_url.clone(),
            standalone: !cli.nostandalone,
            interactive: cli.interactive,
            vm_mode: cli.vm && !cli.novm,
            facts: None,
            distro: None,
        }
    }

    /// Path of the session vault-password file
    pub fn vault_password_file(&self) -> PathBuf {
        self.workdir.join("vault_password")
    }

    /// Path of the rendered inventory document
    pub fn inventory_path(&self) -> PathBuf {
        self.workdir.join("inventory.yml")
    }

    /// Directory the playbooks are unpacked into
    pub fn playbook_dir(&self) -> PathBuf {
        self.workdir.join("playbooks")
    }

    /// FQDN, once required by a stage that cannot proceed without it
    pub fn require_fqdn(&self) -> crate::Result<&str> {
        self.server_fqdn
            .as_deref()
            .ok_or_else(|| crate::BootstrapError::config("server FQDN is not set"))
    }

    /// Selected interface, once required by a stage
    pub fn require_interface(&self) -> crate::Result<&str> {
        self.interface
            .as_deref()
            .ok_or_else(|| crate::BootstrapError::config("network interface is not set"))
    }

    /// Fill identity fields left unset by flags from collected facts
    pub fn default_from_facts(&mut self, facts: NetworkFacts) {
        if self.interface.is_none() {
            self.interface = Some(facts.interface.clone());
        }
        if self.public_ip.is_none() {
            self.public_ip = facts.public_ip.map(|ip| ip.to_string());
        }
        if self.server_fqdn.is_none() {
            self.server_fqdn = Some(facts.fqdn.clone());
        }
        self.facts = Some(facts);
    }
}

/// Display a summary of the chosen identity before the mutating stages run
pub fn summary_lines(session: &InstallSession) -> Vec<(String, String)> {
    let mut lines = vec![
        ("Timezone".to_string(), session.timezone.clone()),
        (
            "Interface".to_string(),
            session.interface.clone().unwrap_or_else(|| "-".into()),
        ),
        (
            "Server FQDN".to_string(),
            session.server_fqdn.clone().unwrap_or_else(|| "-".into()),
        ),
        (
            "Working directory".to_string(),
            session.workdir.display().to_string(),
        ),
    ];
    if let Some(ip) = &session.public_ip {
        lines.push(("Public IP".to_string(), ip.clone()));
    }
    lines
}

/// Expand and normalize a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl AsRef<Path> for InstallSession {
    fn as_ref(&self) -> &Path {
        &self.workdir
    }
}
