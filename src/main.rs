// file: src/main.rs
// version: 1.0.0
// guid: 2d8b5f01-c4a7-4e92-b6d3-19f0e8a67c25

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use medulla_bootstrap::bootstrap::{BootstrapContext, BootstrapDriver};
use medulla_bootstrap::cli::Cli;
use medulla_bootstrap::session::InstallSession;
use medulla_bootstrap::vm::{VmProvisioner, VmSettings};
use medulla_bootstrap::{facts, logging, report, secrets, Result};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.kind() == ErrorKind::UnknownArgument => {
            // An unrecognized flag prints usage without failing the caller
            let _ = Cli::command().print_help();
            std::process::exit(0);
        }
        Err(err) => err.exit(),
    };

    if let Err(e) = logging::init_logger(cli.verbose, cli.quiet) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let session = InstallSession::from_cli(&cli);
    info!("medulla-bootstrap {}", medulla_bootstrap::VERSION);

    let exit_code = if session.vm_mode {
        run_vm(session).await
    } else {
        run_host(session).await
    };
    std::process::exit(exit_code);
}

/// Bootstrap the machine we are running on
async fn run_host(session: InstallSession) -> i32 {
    let mut context = BootstrapContext::new(session);
    match BootstrapDriver::standard().run(&mut context).await {
        Ok(()) => 0,
        Err(failure) => {
            report::print_failure(failure.stage, &failure.error);
            1
        }
    }
}

/// Create a VM and bootstrap inside it
async fn run_vm(session: InstallSession) -> i32 {
    match provision_vm(session).await {
        Ok(()) => 0,
        Err(e) => {
            error!("VM provisioning failed: {e}");
            report::print_failure("vm-provision", &e);
            1
        }
    }
}

async fn provision_vm(mut session: InstallSession) -> Result<()> {
    let fqdn = session.require_fqdn()?.to_string();
    let network_facts = facts::collect(&fqdn).await?;
    session.default_from_facts(network_facts);

    let root_password = session
        .root_password
        .clone()
        .unwrap_or_else(secrets::generator::generate_default);
    session.root_password = Some(root_password.clone());

    let bridged = session.require_interface()?.to_string();
    let settings = VmSettings::defaults(bridged, root_password);
    VmProvisioner::new(settings).provision(&session).await
}
