// file: src/cli/args.rs
// version: 1.0.0
// guid: c94d7e82-1b35-4f60-a8d4-3762e0c5f918

//! Command line argument definitions

use clap::Parser;

/// Default URL the installation playbooks are fetched from
pub const DEFAULT_PLAYBOOK_URL: &str =
    "https://github.com/medulla-tech/integration/archive/refs/heads/master.tar.gz";

/// Default working directory for fetched playbooks and rendered artifacts
pub const DEFAULT_WORKDIR: &str = "/var/tmp/medulla-bootstrap";

#[derive(Parser, Debug, Clone)]
#[command(name = "medulla-bootstrap")]
#[command(about = "Bootstrap a fresh server or VirtualBox VM with a Medulla stack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Skip the remote playbook fetch and use the working directory as-is
    #[arg(long)]
    pub nostandalone: bool,

    /// Ask for machine identity and credentials interactively
    #[arg(long)]
    pub interactive: bool,

    /// Timezone applied to the target system
    #[arg(long, default_value = "Europe/Paris")]
    pub timezone: String,

    /// Archive URL the installation playbooks are fetched from
    #[arg(long, default_value = DEFAULT_PLAYBOOK_URL)]
    pub playbook_url: String,

    /// Root password for the Medulla console (generated when omitted)
    #[arg(long, value_name = "PW")]
    pub medulla_root_pw: Option<String>,

    /// Public IP of the server, when reachable from outside the LAN
    #[arg(long, value_name = "IP")]
    pub public_ip: Option<String>,

    /// Network interface carrying the static address
    #[arg(long, value_name = "NAME")]
    pub interface: Option<String>,

    /// Fully qualified domain name of the server
    #[arg(long, value_name = "FQDN")]
    pub server_fqdn: Option<String>,

    /// Create a VirtualBox VM and install the stack inside it
    #[arg(long, conflicts_with = "novm")]
    pub vm: bool,

    /// Never create a VM, even inside a handed-off guest install
    #[arg(long)]
    pub novm: bool,

    /// Working directory for playbooks and rendered artifacts
    #[arg(long, default_value = DEFAULT_WORKDIR, value_name = "DIR")]
    pub workdir: String,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}
