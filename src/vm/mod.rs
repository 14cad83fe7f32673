// file: src/vm/mod.rs
// version: 1.0.0
// guid: 90f4b8a2-1d67-4e35-bc09-72e5a0d8c316

//! VirtualBox VM provisioning
//!
//! Creates a VM, attaches an unattended OS installation, polls until the
//! guest reports a usable IP, rewrites the guest network from DHCP to the
//! values chosen by the fact collector, and hands the bootstrap off into the
//! guest. The orchestrator never deletes a VM it created; teardown is
//! explicit operator action.

pub mod answerfile;
pub mod guest;

use crate::facts::{lease, NetworkFacts};
use crate::remote::SshTransport;
use crate::session::InstallSession;
use crate::{process, BootstrapError, Result};
use answerfile::AnswerFileGuard;
use guest::{GuestQuery, PollConfig, PollOutcome, VBoxGuestQuery};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Sizing and media choices for the VM being created
#[derive(Debug, Clone)]
pub struct VmSettings {
    pub name: String,
    pub os_type: String,
    pub iso_path: PathBuf,
    pub iso_checksum: Option<String>,
    pub cpus: u32,
    pub memory_mb: u32,
    pub disk_mb: u64,
    pub bridged_interface: String,
    pub guest_root_password: String,
    pub answer_template: PathBuf,
}

impl VmSettings {
    /// Conventional sizing for a Medulla server guest
    pub fn defaults(bridged_interface: impl Into<String>, root_password: impl Into<String>) -> Self {
        Self {
            name: "medulla-server".to_string(),
            os_type: "Debian_64".to_string(),
            iso_path: PathBuf::from("/var/tmp/medulla-bootstrap/debian-install.iso"),
            iso_checksum: None,
            cpus: 2,
            memory_mb: 4096,
            disk_mb: 40_960,
            bridged_interface: bridged_interface.into(),
            guest_root_password: root_password.into(),
            answer_template: PathBuf::from("/var/tmp/medulla-bootstrap/preseed.cfg"),
        }
    }
}

/// Identity of a created VM; deregistration is explicit operator cleanup
#[derive(Debug, Clone)]
pub struct VmDescriptor {
    pub uuid: uuid::Uuid,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Drives the VM-creation path of the bootstrap
pub struct VmProvisioner {
    settings: VmSettings,
    poll: PollConfig,
}

impl VmProvisioner {
    pub fn new(settings: VmSettings) -> Self {
        Self {
            settings,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Run the full VM provisioning state machine
    ///
    /// The answer-file template mutated before creation is restored on every
    /// exit path by the guard, including early error returns.
    pub async fn provision(&self, session: &InstallSession) -> Result<()> {
        let facts = session.facts.as_ref().ok_or_else(|| {
            BootstrapError::vm("network facts must be collected before VM creation")
        })?;
        let fqdn = session.require_fqdn()?;

        // Keypair must exist before the VM does; its public half goes into
        // the answer file so the guest authorizes the provisioner
        let transport = SshTransport::with_provisioning_key("root").await?;
        let pubkey = tokio::fs::read_to_string(transport.public_key_path()).await?;

        self.verify_iso().await?;

        let guard = AnswerFileGuard::capture(&self.settings.answer_template)?;
        self.fill_answer_file(fqdn, pubkey.trim()).await?;

        let descriptor = self.create().await?;
        info!("Created VM {} ({})", descriptor.name, descriptor.uuid);

        self.attach_media(&descriptor).await?;
        self.start_unattended_install(&descriptor).await?;

        let query = VBoxGuestQuery::new(descriptor.uuid.to_string());
        let leased_ip = match self.poll_until_ready(&query).await? {
            Some(ip) => ip,
            None => {
                // Soft failure: the VM stays registered for the operator.
                self.print_cleanup_advice(&descriptor);
                guard.restore()?;
                return Ok(());
            }
        };

        self.reconfigure_network(&transport, leased_ip, facts).await?;
        self.handoff_install(&transport, session, facts).await?;
        self.print_cleanup_advice(&descriptor);

        guard.restore()?;
        Ok(())
    }

    /// Compare the installation ISO against its expected SHA-256, when one
    /// was configured
    async fn verify_iso(&self) -> Result<()> {
        use sha2::{Digest, Sha256};

        let Some(expected) = &self.settings.iso_checksum else {
            return Ok(());
        };
        let bytes = tokio::fs::read(&self.settings.iso_path).await?;
        let actual: String = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(BootstrapError::vm(format!(
                "ISO checksum mismatch for {}: expected {}, got {}",
                self.settings.iso_path.display(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    async fn fill_answer_file(&self, fqdn: &str, ssh_pubkey: &str) -> Result<()> {
        let template = tokio::fs::read_to_string(&self.settings.answer_template).await?;
        let (hostname, domain) = fqdn.split_once('.').unwrap_or((fqdn, ""));
        let filled = answerfile::fill_template(
            &template,
            hostname,
            domain,
            &self.settings.guest_root_password,
            ssh_pubkey,
        );
        tokio::fs::write(&self.settings.answer_template, filled).await?;
        Ok(())
    }

    /// `Create`: register the VM and size it
    async fn create(&self) -> Result<VmDescriptor> {
        let output = process::run_checked(
            "VBoxManage",
            &[
                "createvm",
                "--name",
                &self.settings.name,
                "--ostype",
                &self.settings.os_type,
                "--register",
            ],
        )
        .await?;

        let uuid = parse_created_uuid(&output).ok_or_else(|| {
            BootstrapError::vm("createvm output did not contain a UUID")
        })?;

        let memory = self.settings.memory_mb.to_string();
        let cpus = self.settings.cpus.to_string();
        process::run_checked(
            "VBoxManage",
            &[
                "modifyvm",
                &self.settings.name,
                "--memory",
                &memory,
                "--cpus",
                &cpus,
                "--nic1",
                "bridged",
                "--bridgeadapter1",
                &self.settings.bridged_interface,
            ],
        )
        .await?;

        Ok(VmDescriptor {
            uuid,
            name: self.settings.name.clone(),
            created_at: chrono::Utc::now(),
        })
    }

    /// `AttachMedia`: disk plus installation ISO
    async fn attach_media(&self, vm: &VmDescriptor) -> Result<()> {
        let disk_path = format!("{}.vdi", vm.name);
        let disk_size = self.settings.disk_mb.to_string();

        process::run_checked(
            "VBoxManage",
            &[
                "createmedium",
                "disk",
                "--filename",
                &disk_path,
                "--size",
                &disk_size,
            ],
        )
        .await?;

        process::run_checked(
            "VBoxManage",
            &[
                "storagectl",
                &vm.name,
                "--name",
                "SATA",
                "--add",
                "sata",
                "--controller",
                "IntelAhci",
            ],
        )
        .await?;

        process::run_checked(
            "VBoxManage",
            &[
                "storageattach",
                &vm.name,
                "--storagectl",
                "SATA",
                "--port",
                "0",
                "--device",
                "0",
                "--type",
                "hdd",
                "--medium",
                &disk_path,
            ],
        )
        .await?;

        Ok(())
    }

    /// `StartUnattendedInstall`
    async fn start_unattended_install(&self, vm: &VmDescriptor) -> Result<()> {
        let iso = self.settings.iso_path.display().to_string();
        let template = self.settings.answer_template.display().to_string();
        let uuid = vm.uuid.to_string();

        process::run_checked(
            "VBoxManage",
            &[
                "unattended",
                "install",
                &uuid,
                "--iso",
                &iso,
                "--user",
                "root",
                "--password",
                &self.settings.guest_root_password,
                "--script-template",
                &template,
                "--start-vm=headless",
            ],
        )
        .await?;

        info!("Unattended install started for {}", vm.name);
        Ok(())
    }

    /// `PollGuestIP`: bounded retries, soft exhaustion
    async fn poll_until_ready(&self, query: &dyn GuestQuery) -> Result<Option<Ipv4Addr>> {
        match guest::poll_guest_ip(query, &self.poll).await? {
            PollOutcome::Ready(ip) => Ok(Some(ip)),
            PollOutcome::Exhausted { attempts } => {
                warn!(
                    "Max retries reached ({} attempts): the guest did not report an IP; \
                     check the VM console and rerun once the install has finished",
                    attempts
                );
                Ok(None)
            }
        }
    }

    /// `ReconfigureNetwork` + `RestartNetworking`: rewrite the DHCP stanza to
    /// the static values chosen pre-creation, then bounce networking
    async fn reconfigure_network(
        &self,
        transport: &SshTransport,
        leased_ip: Ipv4Addr,
        facts: &NetworkFacts,
    ) -> Result<()> {
        let host = leased_ip.to_string();

        let lease_body = transport
            .exec(&host, "cat /var/lib/dhcp/dhclient.leases 2>/dev/null || true")
            .await?;
        let lease_info = lease::parse_lease_file(&lease_body);
        let guest_iface = lease_info.interface.as_deref().unwrap_or("enp0s3");

        let stanza = render_interfaces_stanza(
            guest_iface,
            facts.address,
            facts.netmask,
            facts.gateway.or(lease_info.gateway),
            if facts.dns_servers.is_empty() {
                &lease_info.dns_servers
            } else {
                &facts.dns_servers
            },
        );

        let write_cmd = format!(
            "cat > /etc/network/interfaces <<'EOF'\n{}\nEOF",
            stanza.trim_end()
        );
        transport.exec(&host, &write_cmd).await?;

        info!("Guest network rewritten to static; restarting networking");
        // The connection drops as the address changes; a non-zero exit from
        // the dying session is expected.
        let _ = transport
            .exec(&host, "nohup systemctl restart networking >/dev/null 2>&1 &")
            .await;

        Ok(())
    }

    /// `HandoffInstall`: copy the bootstrap into the guest and run it with
    /// VM nesting disabled
    async fn handoff_install(
        &self,
        transport: &SshTransport,
        session: &InstallSession,
        facts: &NetworkFacts,
    ) -> Result<()> {
        let host = facts.address.to_string();
        let entry = std::env::current_exe()?;

        transport
            .upload(&host, &entry, "/usr/local/sbin/medulla-bootstrap")
            .await?;
        transport
            .exec(&host, "chmod 0755 /usr/local/sbin/medulla-bootstrap")
            .await?;

        let mut command = format!(
            "/usr/local/sbin/medulla-bootstrap --novm --timezone {} --server-fqdn {}",
            sh_quote(&session.timezone),
            sh_quote(session.require_fqdn()?),
        );
        if let Some(ip) = &session.public_ip {
            command.push_str(&format!(" --public-ip {}", sh_quote(ip)));
        }
        if let Some(password) = &session.root_password {
            command.push_str(&format!(" --medulla-root-pw {}", sh_quote(password)));
        }

        info!("Handing the install off into the guest");
        transport.exec(&host, &command).await?;
        Ok(())
    }

    fn print_cleanup_advice(&self, vm: &VmDescriptor) {
        info!(
            "VM {} ({}) stays registered; remove it later with: \
             VBoxManage unregistervm {} --delete",
            vm.name, vm.uuid, vm.name
        );
    }
}

/// Single-quote a value for a remote `sh` command line
///
/// Embedded single quotes become `'\''` so operator-chosen values (notably
/// `--medulla-root-pw`) cannot break out of their argument.
pub fn sh_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// UUID from `VBoxManage createvm` output
pub fn parse_created_uuid(output: &str) -> Option<uuid::Uuid> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("UUID:")
            .and_then(|rest| uuid::Uuid::parse_str(rest.trim()).ok())
    })
}

/// Static /etc/network/interfaces stanza for the guest
pub fn render_interfaces_stanza(
    iface: &str,
    address: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Option<Ipv4Addr>,
    dns_servers: &[Ipv4Addr],
) -> String {
    let mut stanza = format!(
        "auto lo\niface lo inet loopback\n\nauto {iface}\niface {iface} inet static\n    address {address}\n    netmask {netmask}\n"
    );
    if let Some(gw) = gateway {
        stanza.push_str(&format!("    gateway {gw}\n"));
    }
    if !dns_servers.is_empty() {
        let servers: Vec<String> = dns_servers.iter().map(|s| s.to_string()).collect();
        stanza.push_str(&format!("    dns-nameservers {}\n", servers.join(" ")));
    }
    stanza
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_created_uuid() {
        let output = "Virtual machine 'medulla' is created and registered.\n\
                      UUID: 9f5c2c2e-8b0d-4f3a-9e61-0a1b2c3d4e5f\n\
                      Settings file: '/root/VirtualBox VMs/medulla/medulla.vbox'\n";
        assert_eq!(
            parse_created_uuid(output).map(|u| u.to_string()).as_deref(),
            Some("9f5c2c2e-8b0d-4f3a-9e61-0a1b2c3d4e5f")
        );
        assert_eq!(parse_created_uuid("no uuid here"), None);
        assert_eq!(parse_created_uuid("UUID: not-a-uuid"), None);
    }

    #[test]
    fn test_sh_quote_plain_and_hostile_values() {
        assert_eq!(sh_quote("Europe/Paris"), "'Europe/Paris'");
        assert_eq!(sh_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(sh_quote("pw'; reboot #"), r#"'pw'\''; reboot #'"#);
        assert_eq!(sh_quote(""), "''");
    }

    #[test]
    fn test_render_interfaces_stanza_full() {
        let stanza = render_interfaces_stanza(
            "enp0s3",
            "192.168.56.10".parse().unwrap(),
            "255.255.255.0".parse().unwrap(),
            Some("192.168.56.1".parse().unwrap()),
            &["9.9.9.9".parse().unwrap(), "1.1.1.1".parse().unwrap()],
        );
        assert!(stanza.contains("iface enp0s3 inet static"));
        assert!(stanza.contains("address 192.168.56.10"));
        assert!(stanza.contains("netmask 255.255.255.0"));
        assert!(stanza.contains("gateway 192.168.56.1"));
        assert!(stanza.contains("dns-nameservers 9.9.9.9 1.1.1.1"));
        assert!(!stanza.contains("dhcp"));
    }

    #[test]
    fn test_render_interfaces_stanza_minimal() {
        let stanza = render_interfaces_stanza(
            "eth0",
            "10.1.1.5".parse().unwrap(),
            "255.0.0.0".parse().unwrap(),
            None,
            &[],
        );
        assert!(!stanza.contains("gateway"));
        assert!(!stanza.contains("dns-nameservers"));
    }
}
