// file: src/remote/mod.rs
// version: 1.0.0
// guid: 7d63b0f8-2a15-4e94-8c07-d51f9e2a6b48

//! Remote execution over SSH
//!
//! Thin wrapper around the `ssh`/`scp` binaries using a dedicated
//! provisioning keypair. Remote stdout is returned verbatim; only the
//! lease-file path parses it further.

use crate::{process, BootstrapError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the dedicated provisioning key under ~/.ssh
const PROVISIONING_KEY: &str = "id_medulla_provision";

/// SSH transport bound to one keypair and remote user
pub struct SshTransport {
    key_path: PathBuf,
    user: String,
}

impl SshTransport {
    pub fn new(key_path: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            user: user.into(),
        }
    }

    /// Transport over the dedicated provisioning keypair, generating it
    /// first when absent
    pub async fn with_provisioning_key(user: &str) -> Result<Self> {
        let key_path = default_key_path()?;
        ensure_keypair(&key_path).await?;
        Ok(Self::new(key_path, user))
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn public_key_path(&self) -> PathBuf {
        let mut name = self
            .key_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".pub");
        self.key_path.with_file_name(name)
    }

    /// Execute a command on the target, returning its stdout
    pub async fn exec(&self, host: &str, command: &str) -> Result<String> {
        debug!("ssh {}@{}: {}", self.user, host, command);
        let key = self.key_path.display().to_string();
        let target = format!("{}@{}", self.user, host);
        process::run_checked(
            "ssh",
            &[
                "-i",
                &key,
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "ConnectTimeout=10",
                &target,
                command,
            ],
        )
        .await
    }

    /// Copy a local file onto the target
    pub async fn upload(&self, host: &str, local: &Path, remote: &str) -> Result<()> {
        info!("scp {} -> {}:{}", local.display(), host, remote);
        let key = self.key_path.display().to_string();
        let local_str = local.display().to_string();
        let target = format!("{}@{}:{}", self.user, host, remote);
        process::run_checked(
            "scp",
            &[
                "-i",
                &key,
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                &local_str,
                &target,
            ],
        )
        .await?;
        Ok(())
    }

    /// Append the provisioning public key to the local authorized_keys so
    /// the engine can reach localhost over SSH
    pub async fn authorize_locally(&self) -> Result<()> {
        let pubkey = tokio::fs::read_to_string(self.public_key_path()).await?;
        let pubkey = pubkey.trim();

        let ssh_dir = home_ssh_dir()?;
        tokio::fs::create_dir_all(&ssh_dir).await?;
        let authorized = ssh_dir.join("authorized_keys");

        let existing = tokio::fs::read_to_string(&authorized)
            .await
            .unwrap_or_default();
        if existing.lines().any(|line| line.trim() == pubkey) {
            debug!("Provisioning key already authorized locally");
            return Ok(());
        }

        let mut body = existing;
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(pubkey);
        body.push('\n');
        tokio::fs::write(&authorized, body).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&authorized).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&authorized, perms).await?;
        }

        info!("Provisioning key authorized for local SSH");
        Ok(())
    }
}

/// Generate the keypair when absent; never regenerates an existing one
pub async fn ensure_keypair(key_path: &Path) -> Result<()> {
    if key_path.exists() {
        debug!("Provisioning keypair already present");
        return Ok(());
    }
    if let Some(parent) = key_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("Generating provisioning keypair at {}", key_path.display());
    let path_str = key_path.display().to_string();
    process::run_checked(
        "ssh-keygen",
        &[
            "-t",
            "ed25519",
            "-N",
            "",
            "-C",
            "medulla-bootstrap provisioning",
            "-f",
            &path_str,
        ],
    )
    .await?;
    Ok(())
}

fn default_key_path() -> Result<PathBuf> {
    Ok(home_ssh_dir()?.join(PROVISIONING_KEY))
}

fn home_ssh_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".ssh"))
        .ok_or_else(|| BootstrapError::config("cannot determine home directory"))
}
