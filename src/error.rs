// file: src/error.rs
// version: 1.0.0
// guid: 9d2b6e14-07c3-48f5-a1d9-6b3e82f4c905

use thiserror::Error;

/// Result type alias for the bootstrap orchestrator
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Error types for the Medulla bootstrap orchestrator
///
/// The taxonomy mirrors the failure policy of the stage machine: prerequisite
/// and external-command failures are fatal, poll exhaustion and prior-session
/// cleanup are surfaced by the caller without aborting.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported distribution: {0}")]
    UnsupportedDistro(String),

    #[error("prerequisite not met: {0}")]
    Prerequisite(String),

    #[error("command `{command}` failed{}: {stderr}",
            exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Process {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("no static (non-DHCP) interface found; rerun with --interface or --interactive")]
    NoStaticInterface,

    #[error("more than one static interface found ({0}); rerun with --interface")]
    AmbiguousInterface(String),

    #[error("FQDN `{0}` does not resolve locally: {1}")]
    Unresolvable(String, String),

    #[error("interface `{0}` is DHCP-managed; a static address is required")]
    DhcpManagedInterface(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("inventory render error: {0}")]
    Render(String),

    #[error("SSH transport error: {0}")]
    Ssh(String),

    #[error("VM provisioning error: {0}")]
    Vm(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BootstrapError {
    /// Fatal external-command failure, keeping the command line for diagnosis
    pub fn process(command: impl Into<String>, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn prerequisite(msg: impl Into<String>) -> Self {
        Self::Prerequisite(msg.into())
    }

    pub fn vault(msg: impl Into<String>) -> Self {
        Self::Vault(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn ssh(msg: impl Into<String>) -> Self {
        Self::Ssh(msg.into())
    }

    pub fn vm(msg: impl Into<String>) -> Self {
        Self::Vm(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}
