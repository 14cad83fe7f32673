// file: src/secrets/mod.rs
// version: 1.0.0
// guid: 2c7e4a58-91d6-4f03-b8e2-56a0d3f17c94

//! Credential generation and vaulting

pub mod generator;
pub mod vault;

pub use vault::{CipherText, Vault};

use crate::{BootstrapError, Result};

/// Logical credential names the default Medulla profile requires
///
/// Every name listed here must be present in the [`SecretSet`] before the
/// inventory is rendered.
pub const DEFAULT_CREDENTIALS: &[&str] = &[
    "ROOT_PASSWORD",
    "MASTER_TOKEN",
    "MARIADB_ROOT_PASSWORD",
    "MMC_DB_PASSWORD",
    "XMPP_ADMIN_PASSWORD",
    "GLPI_DB_PASSWORD",
    "ITSM_DB_PASSWORD",
    "GRAFANA_DB_PASSWORD",
    "URBACKUP_DB_PASSWORD",
    "GUACAMOLE_DB_PASSWORD",
    "REVERSE_SSH_PASSWORD",
];

/// Clear-text value and its vaulted token for one credential
#[derive(Debug, Clone)]
pub struct SecretEntry {
    clear: String,
    vaulted: CipherText,
}

/// Mapping from logical credential name to generated secret
///
/// Each clear-text value is generated independently, exactly once per
/// session; there is no derivation between secrets.
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    entries: Vec<(String, SecretEntry)>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and vault every default credential
    ///
    /// `root_password` overrides generation for `ROOT_PASSWORD` when the
    /// operator chose one via flag or wizard.
    pub fn generate_default(vault: &Vault, root_password: Option<&str>) -> Result<Self> {
        let mut set = Self::new();
        for name in DEFAULT_CREDENTIALS {
            let clear = match (*name, root_password) {
                ("ROOT_PASSWORD", Some(pw)) => pw.to_string(),
                _ => generator::generate_default(),
            };
            set.insert(name, clear, vault)?;
        }
        Ok(set)
    }

    /// Generate (or accept) and vault one credential; rejects duplicates so a
    /// credential can never be generated twice in a session
    pub fn insert(&mut self, name: &str, clear: String, vault: &Vault) -> Result<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(BootstrapError::vault(format!(
                "credential `{}` generated twice in one session",
                name
            )));
        }
        let vaulted = vault.encrypt(&clear)?;
        self.entries
            .push((name.to_string(), SecretEntry { clear, vaulted }));
        Ok(())
    }

    /// Vaulted token for a credential
    pub fn cipher(&self, name: &str) -> Option<&CipherText> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| &e.vaulted)
    }

    /// Clear-text value; used only for the operator report, never rendered
    pub fn clear_text(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.clear.as_str())
    }

    /// Credential names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Whether every default credential is present
    pub fn is_complete(&self) -> bool {
        DEFAULT_CREDENTIALS
            .iter()
            .all(|name| self.entries.iter().any(|(n, _)| n == name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_complete() {
        let vault = Vault::from_passphrase("test");
        let set = SecretSet::generate_default(&vault, None).unwrap();
        assert!(set.is_complete());
        assert_eq!(set.len(), DEFAULT_CREDENTIALS.len());
        assert!(set.len() >= 10);
    }

    #[test]
    fn test_root_password_override() {
        let vault = Vault::from_passphrase("test");
        let set = SecretSet::generate_default(&vault, Some("chosen-pw")).unwrap();
        assert_eq!(set.clear_text("ROOT_PASSWORD"), Some("chosen-pw"));
        let token = set.cipher("ROOT_PASSWORD").unwrap();
        assert_eq!(vault.decrypt(token).unwrap(), "chosen-pw");
    }

    #[test]
    fn test_secrets_are_independent() {
        let vault = Vault::from_passphrase("test");
        let set = SecretSet::generate_default(&vault, None).unwrap();
        let values: Vec<&str> = DEFAULT_CREDENTIALS
            .iter()
            .map(|n| set.clear_text(n).unwrap())
            .collect();
        for (i, a) in values.iter().enumerate() {
            for b in &values[i + 1..] {
                assert_ne!(a, b, "two credentials share a value");
            }
        }
    }

    #[test]
    fn test_double_generation_rejected() {
        let vault = Vault::from_passphrase("test");
        let mut set = SecretSet::new();
        set.insert("MASTER_TOKEN", "a".into(), &vault).unwrap();
        assert!(set.insert("MASTER_TOKEN", "b".into(), &vault).is_err());
    }
}
