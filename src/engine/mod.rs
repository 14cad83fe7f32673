// file: src/engine/mod.rs
// version: 1.0.0
// guid: 1a9e5d72-4f80-4c36-b1d5-7e03c8a62f94

//! Configuration-management engine contract
//!
//! The engine is an opaque executable (`ansible-playbook`) invoked with a
//! vault-password file and an inventory file, scoped to a named host-group
//! limit. It exposes two entry points: `apply` (the main install) and
//! `cleanup` (teardown of a previous session's remote state).

use crate::distro::PackageDriver;
use crate::{process, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Playbook file names the engine entry points map to
const APPLY_PLAYBOOK: &str = "install.yml";
const CLEANUP_PLAYBOOK: &str = "cleanup.yml";

/// Handle on the engine, bound to an unpacked playbook directory
pub struct Engine {
    playbook_dir: PathBuf,
}

impl Engine {
    pub fn new(playbook_dir: impl Into<PathBuf>) -> Self {
        Self {
            playbook_dir: playbook_dir.into(),
        }
    }

    /// Install the engine itself through the distro's package driver
    pub async fn install(driver: &dyn PackageDriver) -> Result<()> {
        if process::command_exists("ansible-playbook") {
            info!("Engine already installed");
            return Ok(());
        }
        driver.install(&["ansible"]).await
    }

    /// Main install entry point; failure is fatal for the run
    pub async fn apply(&self, inventory: &Path, vault_file: &Path, limit: &str) -> Result<()> {
        info!("Running engine apply (limit: {})", limit);
        self.invoke(APPLY_PLAYBOOK, inventory, vault_file, limit)
            .await
    }

    /// Teardown entry point for a previous session; callers treat failure as
    /// best-effort
    pub async fn cleanup(&self, inventory: &Path, vault_file: &Path, limit: &str) -> Result<()> {
        info!("Running engine cleanup (limit: {})", limit);
        self.invoke(CLEANUP_PLAYBOOK, inventory, vault_file, limit)
            .await
    }

    /// Best-effort cleanup wrapper: surfaces the failure in the log without
    /// blocking continuation
    pub async fn cleanup_best_effort(&self, inventory: &Path, vault_file: &Path, limit: &str) {
        if let Err(e) = self.cleanup(inventory, vault_file, limit).await {
            warn!("Prior-session cleanup failed (continuing): {}", e);
        }
    }

    async fn invoke(
        &self,
        playbook: &str,
        inventory: &Path,
        vault_file: &Path,
        limit: &str,
    ) -> Result<()> {
        let playbook_path = self.playbook_dir.join(playbook);
        let playbook_str = playbook_path.display().to_string();
        let inventory_str = inventory.display().to_string();
        let vault_str = vault_file.display().to_string();

        // The engine may run for an extended, unbounded duration; it is
        // awaited to completion with no internal timeout.
        process::run_checked(
            "ansible-playbook",
            &[
                "-i",
                &inventory_str,
                "--vault-password-file",
                &vault_str,
                "--limit",
                limit,
                &playbook_str,
            ],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playbook_paths() {
        let engine = Engine::new("/var/tmp/mb/playbooks");
        assert_eq!(
            engine.playbook_dir.join(APPLY_PLAYBOOK),
            PathBuf::from("/var/tmp/mb/playbooks/install.yml")
        );
        assert_eq!(
            engine.playbook_dir.join(CLEANUP_PLAYBOOK),
            PathBuf::from("/var/tmp/mb/playbooks/cleanup.yml")
        );
    }

    #[tokio::test]
    async fn test_cleanup_best_effort_swallows_failure() {
        // ansible-playbook is absent in the test environment, so the spawn
        // fails; best-effort must not propagate it.
        let engine = Engine::new("/nonexistent");
        engine
            .cleanup_best_effort(
                Path::new("/nonexistent/inventory.yml"),
                Path::new("/nonexistent/vault_password"),
                "medulla",
            )
            .await;
    }
}
