// file: src/bootstrap/stages.rs
// version: 1.0.0
// guid: e1c2a9d4-58bf-47e0-b316-0f9a7d24c853

//! The concrete stages of the host bootstrap, in their running order

use super::{BootstrapContext, RetryPolicy, Stage, StageOutcome};
use crate::distro::{DistroFamily, PackageDriver};
use crate::engine::Engine;
use crate::secrets::{SecretSet, Vault};
use crate::{facts, inventory, process, remote, report, session, wizard};
use crate::{BootstrapError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Tools the later stages shell out to
const SCRIPT_DEPENDENCIES: &[&str] = &["curl", "tar", "openssh-client", "python3"];

/// Build the standard stage list, in order
pub fn standard_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(DistroCheck),
        Box::new(ConnectivityCheck),
        Box::new(OsUpdate),
        Box::new(ScriptDependencies),
        Box::new(FactCollection),
        Box::new(ArgumentMerge),
        Box::new(InteractiveWizard),
        Box::new(Summary),
        Box::new(ResolutionCheck),
        Box::new(DhcpCheck),
        Box::new(Timezone),
        Box::new(EngineInstall),
        Box::new(PlaybookFetch),
        Box::new(PriorCleanup),
        Box::new(VaultInit),
        Box::new(SshKeyProvision),
        Box::new(InventoryRender),
        Box::new(EngineApply),
        Box::new(FinalReport),
    ]
}

fn package_driver(context: &BootstrapContext) -> Result<Box<dyn PackageDriver>> {
    let distro = context
        .session
        .distro
        .ok_or_else(|| BootstrapError::config("distribution has not been detected"))?;
    Ok(distro.package_driver())
}

/// Refuse to run on a distribution without a package driver
pub struct DistroCheck;

#[async_trait]
impl Stage for DistroCheck {
    fn name(&self) -> &'static str {
        "distro-check"
    }

    fn description(&self) -> &'static str {
        "Detecting the host distribution"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let distro = DistroFamily::detect().await?;
        info!("Detected distribution family: {:?}", distro);
        context.session.distro = Some(distro);
        Ok(StageOutcome::Completed)
    }
}

/// Package downloads need a route out
pub struct ConnectivityCheck;

#[async_trait]
impl Stage for ConnectivityCheck {
    fn name(&self) -> &'static str {
        "connectivity-check"
    }

    fn description(&self) -> &'static str {
        "Checking outbound connectivity"
    }

    async fn run(&self, _context: &mut BootstrapContext) -> Result<StageOutcome> {
        let reachable = process::check_silent("ping", &["-c", "1", "-W", "2", "deb.debian.org"])
            .await
            .unwrap_or(false);
        if !reachable {
            return Err(BootstrapError::network(
                "no outbound connectivity (deb.debian.org is unreachable)",
            ));
        }
        Ok(StageOutcome::Completed)
    }
}

pub struct OsUpdate;

#[async_trait]
impl Stage for OsUpdate {
    fn name(&self) -> &'static str {
        "os-update"
    }

    fn description(&self) -> &'static str {
        "Bringing the operating system up to date"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        package_driver(context)?.update().await?;
        Ok(StageOutcome::Completed)
    }
}

pub struct ScriptDependencies;

#[async_trait]
impl Stage for ScriptDependencies {
    fn name(&self) -> &'static str {
        "script-dependencies"
    }

    fn description(&self) -> &'static str {
        "Installing the tools the bootstrap shells out to"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        package_driver(context)?.install(SCRIPT_DEPENDENCIES).await?;
        Ok(StageOutcome::Completed)
    }
}

/// Collect interface, addressing and resolution facts
pub struct FactCollection;

#[async_trait]
impl Stage for FactCollection {
    fn name(&self) -> &'static str {
        "fact-collection"
    }

    fn description(&self) -> &'static str {
        "Collecting network facts"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let fqdn = match &context.session.server_fqdn {
            Some(fqdn) => fqdn.clone(),
            None => process::run_checked("hostname", &["--fqdn"])
                .await?
                .trim()
                .to_string(),
        };

        // A named interface bypasses automatic selection entirely, so an
        // ambiguous (or empty) candidate table can be rescued by flag or
        // wizard; resolution and dhcp checks still validate the choice.
        let collected = match &context.session.interface {
            Some(interface) => facts::collect_named(interface, &fqdn).await,
            None => facts::collect(&fqdn).await,
        };

        match collected {
            Ok(facts) => {
                context.session.default_from_facts(facts);
                Ok(StageOutcome::Completed)
            }
            Err(e) if context.session.interactive => {
                warn!("Fact collection incomplete ({}); the wizard will ask", e);
                Ok(StageOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}

/// Flags win over facts; whatever remains unset here is an error
pub struct ArgumentMerge;

#[async_trait]
impl Stage for ArgumentMerge {
    fn name(&self) -> &'static str {
        "argument-merge"
    }

    fn description(&self) -> &'static str {
        "Merging flags with collected facts"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        if context.session.interactive {
            // The wizard runs next and refuses empty answers
            return Ok(StageOutcome::Skipped);
        }
        context.session.require_interface()?;
        context.session.require_fqdn()?;
        Ok(StageOutcome::Completed)
    }
}

/// Prompt for every parameter; runs only with --interactive
pub struct InteractiveWizard;

#[async_trait]
impl Stage for InteractiveWizard {
    fn name(&self) -> &'static str {
        "wizard"
    }

    fn description(&self) -> &'static str {
        "Reviewing the parameters interactively"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        if !context.session.interactive {
            return Ok(StageOutcome::Skipped);
        }
        wizard::run(&mut context.session)?;
        Ok(StageOutcome::Completed)
    }
}

pub struct Summary;

#[async_trait]
impl Stage for Summary {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn description(&self) -> &'static str {
        "Printing the installation parameters"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        for (label, value) in session::summary_lines(&context.session) {
            println!("  {label:<20} {value}");
        }
        Ok(StageOutcome::Completed)
    }
}

/// The FQDN must resolve locally before anything is written
pub struct ResolutionCheck;

#[async_trait]
impl Stage for ResolutionCheck {
    fn name(&self) -> &'static str {
        "resolution-check"
    }

    fn description(&self) -> &'static str {
        "Validating local resolution of the server FQDN"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let fqdn = context.session.require_fqdn()?.to_string();
        facts::validate_fqdn(&fqdn).await?;
        Ok(StageOutcome::Completed)
    }
}

/// A DHCP-managed address would drift out from under the rendered inventory
pub struct DhcpCheck;

#[async_trait]
impl Stage for DhcpCheck {
    fn name(&self) -> &'static str {
        "dhcp-check"
    }

    fn description(&self) -> &'static str {
        "Refusing DHCP-managed interfaces"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let interface = context.session.require_interface()?.to_string();
        facts::ensure_not_dhcp(&interface).await?;
        Ok(StageOutcome::Completed)
    }
}

pub struct Timezone;

#[async_trait]
impl Stage for Timezone {
    fn name(&self) -> &'static str {
        "timezone"
    }

    fn description(&self) -> &'static str {
        "Applying the system timezone"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let timezone = context.session.timezone.clone();
        process::run_checked("timedatectl", &["set-timezone", &timezone]).await?;
        Ok(StageOutcome::Completed)
    }
}

pub struct EngineInstall;

#[async_trait]
impl Stage for EngineInstall {
    fn name(&self) -> &'static str {
        "engine-install"
    }

    fn description(&self) -> &'static str {
        "Installing the configuration engine"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let driver = package_driver(context)?;
        Engine::install(driver.as_ref()).await?;
        Ok(StageOutcome::Completed)
    }
}

/// Download and unpack the playbooks; skipped with --nostandalone
pub struct PlaybookFetch;

#[async_trait]
impl Stage for PlaybookFetch {
    fn name(&self) -> &'static str {
        "playbook-fetch"
    }

    fn description(&self) -> &'static str {
        "Fetching the playbooks"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        if !context.session.standalone {
            return Ok(StageOutcome::Skipped);
        }

        let workdir = context.session.workdir.clone();
        let playbook_dir = context.session.playbook_dir();
        tokio::fs::create_dir_all(&playbook_dir).await?;

        let archive_path = workdir.join("playbooks.tar.gz");
        let url = context.session.playbook_url.clone();
        info!("Downloading playbooks from {}", url);

        let response = reqwest::get(&url).await?.error_for_status()?;
        let mut file = tokio::fs::File::create(&archive_path).await?;
        let body = response.bytes().await?;
        file.write_all(&body).await?;
        file.flush().await?;

        let archive = archive_path.display().to_string();
        let target = playbook_dir.display().to_string();
        process::run_checked(
            "tar",
            &["xzf", &archive, "-C", &target, "--strip-components", "1"],
        )
        .await?;

        debug!("Playbooks unpacked into {}", target);
        Ok(StageOutcome::Completed)
    }
}

/// Undo a previous half-finished run before re-provisioning
pub struct PriorCleanup;

#[async_trait]
impl Stage for PriorCleanup {
    fn name(&self) -> &'static str {
        "prior-cleanup"
    }

    fn description(&self) -> &'static str {
        "Cleaning up a previous installation attempt"
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::BestEffort
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let vault_file = context.session.vault_password_file();
        if !Vault::stale_key_present(&vault_file) {
            return Ok(StageOutcome::Skipped);
        }

        info!("Stale vault key found; running cleanup against the previous install");
        let engine = Engine::new(context.session.playbook_dir());
        let inventory = context.session.inventory_path();
        let fqdn = context.session.require_fqdn()?.to_string();
        engine
            .cleanup_best_effort(&inventory, &vault_file, &fqdn)
            .await;
        Ok(StageOutcome::Completed)
    }
}

/// Generate a fresh vault passphrase; an old one is never reused
pub struct VaultInit;

#[async_trait]
impl Stage for VaultInit {
    fn name(&self) -> &'static str {
        "vault-init"
    }

    fn description(&self) -> &'static str {
        "Initializing the secret vault"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        tokio::fs::create_dir_all(&context.session.workdir).await?;
        let vault = Vault::initialize(&context.session.vault_password_file()).await?;
        context.vault = Some(vault);
        Ok(StageOutcome::Completed)
    }
}

/// The engine connects to localhost over SSH like any other host
pub struct SshKeyProvision;

#[async_trait]
impl Stage for SshKeyProvision {
    fn name(&self) -> &'static str {
        "ssh-key-provision"
    }

    fn description(&self) -> &'static str {
        "Provisioning the local SSH key"
    }

    async fn run(&self, _context: &mut BootstrapContext) -> Result<StageOutcome> {
        let transport = remote::SshTransport::with_provisioning_key("root").await?;
        transport.authorize_locally().await?;
        Ok(StageOutcome::Completed)
    }
}

/// Generate the credential set and render the inventory document
pub struct InventoryRender;

#[async_trait]
impl Stage for InventoryRender {
    fn name(&self) -> &'static str {
        "inventory-render"
    }

    fn description(&self) -> &'static str {
        "Rendering the configuration inventory"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let secrets = {
            let vault = context.require_vault()?;
            SecretSet::generate_default(vault, context.session.root_password.as_deref())?
        };
        let document = inventory::render(&context.session, &secrets)?;
        document.render_to(&context.session.inventory_path()).await?;
        context.secrets = Some(secrets);
        Ok(StageOutcome::Completed)
    }
}

/// Apply the playbooks; transient engine failures get a few more tries
pub struct EngineApply;

#[async_trait]
impl Stage for EngineApply {
    fn name(&self) -> &'static str {
        "engine-apply"
    }

    fn description(&self) -> &'static str {
        "Applying the configuration"
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Retry {
            attempts: 3,
            delay: Duration::from_secs(30),
        }
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        let engine = Engine::new(context.session.playbook_dir());
        let inventory = context.session.inventory_path();
        let vault_file = context.session.vault_password_file();
        let fqdn = context.session.require_fqdn()?.to_string();
        engine.apply(&inventory, &vault_file, &fqdn).await?;
        Ok(StageOutcome::Completed)
    }
}

pub struct FinalReport;

#[async_trait]
impl Stage for FinalReport {
    fn name(&self) -> &'static str {
        "report"
    }

    fn description(&self) -> &'static str {
        "Printing the closing report"
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome> {
        context.require_secrets()?;
        report::print_success(&context.session);
        Ok(StageOutcome::Completed)
    }
}
