// file: src/vm/answerfile.rs
// version: 1.0.0
// guid: 5e91d2c7-36b8-480f-9a14-c7052fe8b3d6

//! Unattended-install answer file handling
//!
//! The answer-file template is mutated in place before VM creation and must
//! be restored byte-for-byte on every exit path, success or failure. The
//! guard captures the original content on creation and restores it on drop,
//! so an early `?` return or a panic still restores the template.

use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Restores a mutated template on drop
pub struct AnswerFileGuard {
    path: PathBuf,
    original: Vec<u8>,
    restored: bool,
}

impl AnswerFileGuard {
    /// Capture the template's pre-mutation content
    pub fn capture(path: &Path) -> Result<Self> {
        let original = std::fs::read(path)?;
        debug!(
            "Captured {} bytes of answer-file template {}",
            original.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            original,
            restored: false,
        })
    }

    /// Restore explicitly, surfacing any write failure
    pub fn restore(mut self) -> Result<()> {
        std::fs::write(&self.path, &self.original)?;
        self.restored = true;
        debug!("Answer-file template restored: {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AnswerFileGuard {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = std::fs::write(&self.path, &self.original) {
                warn!(
                    "Failed to restore answer-file template {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Fill the answer-file template with the values chosen for this install
///
/// `@SSH_PUBKEY@` is what lets the provisioner back into the guest: the
/// template's late command writes it to root's authorized_keys, so the
/// first keyed `ssh` after the install succeeds.
pub fn fill_template(
    template: &str,
    hostname: &str,
    domain: &str,
    root_password: &str,
    ssh_pubkey: &str,
) -> String {
    template
        .replace("@HOSTNAME@", hostname)
        .replace("@DOMAIN@", domain)
        .replace("@ROOT_PASSWORD@", root_password)
        .replace("@SSH_PUBKEY@", ssh_pubkey)
}
