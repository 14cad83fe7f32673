// file: src/inventory/mod.rs
// version: 1.0.0
// guid: 83b0c6f2-d514-4a7e-9d30-1c86e5a24f09

//! Inventory rendering
//!
//! Merges collected facts and vaulted secrets into the structured
//! groups → hosts → vars document consumed by the configuration-management
//! engine. Secret-valued variables only accept [`CipherText`], so clear text
//! structurally cannot reach the serialized output. Optional variables are
//! omitted entirely when unset; downstream treats presence of `PUBLIC_IP` as
//! "reachable from outside the LAN".

use crate::secrets::{CipherText, SecretSet};
use crate::session::InstallSession;
use crate::{BootstrapError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::info;

/// One host group with its variables
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    hosts: Vec<String>,
    vars: Vec<(String, VarValue)>,
}

#[derive(Debug, Clone)]
enum VarValue {
    Plain(String),
    Secret(CipherText),
}

/// Ordered groups → hosts → vars document
#[derive(Debug, Clone, Default)]
pub struct ConfigurationDocument {
    groups: Vec<Group>,
}

impl ConfigurationDocument {
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder {
            doc: Self::default(),
        }
    }

    /// Serialize preserving group and variable insertion order
    pub fn to_yaml(&self) -> Value {
        let mut root = Mapping::new();
        for group in &self.groups {
            let mut hosts = Mapping::new();
            for host in &group.hosts {
                hosts.insert(Value::String(host.clone()), Value::Null);
            }

            let mut vars = Mapping::new();
            for (name, value) in &group.vars {
                let rendered = match value {
                    VarValue::Plain(v) => v.clone(),
                    VarValue::Secret(c) => c.as_str().to_string(),
                };
                vars.insert(Value::String(name.clone()), Value::String(rendered));
            }

            let mut body = Mapping::new();
            body.insert(Value::String("hosts".into()), Value::Mapping(hosts));
            body.insert(Value::String("vars".into()), Value::Mapping(vars));
            root.insert(Value::String(group.name.clone()), Value::Mapping(body));
        }
        Value::Mapping(root)
    }

    pub fn render_to_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_yaml())?)
    }

    /// Write the document, aborting loudly when the file cannot be written
    pub async fn render_to(&self, path: &Path) -> Result<()> {
        let body = self.render_to_string()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BootstrapError::render(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(path, body).await.map_err(|e| {
            BootstrapError::render(format!("cannot write {}: {}", path.display(), e))
        })?;
        info!("Inventory rendered to {}", path.display());
        Ok(())
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }
}

/// Builder enforcing the ciphertext-only invariant for secrets
pub struct DocumentBuilder {
    doc: ConfigurationDocument,
}

impl DocumentBuilder {
    /// Start a new group; subsequent host/var calls apply to it
    pub fn group(mut self, name: &str) -> Self {
        self.doc.groups.push(Group {
            name: name.to_string(),
            hosts: Vec::new(),
            vars: Vec::new(),
        });
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        if let Some(group) = self.doc.groups.last_mut() {
            group.hosts.push(host.to_string());
        }
        self
    }

    pub fn var(mut self, name: &str, value: &str) -> Self {
        if let Some(group) = self.doc.groups.last_mut() {
            group
                .vars
                .push((name.to_string(), VarValue::Plain(value.to_string())));
        }
        self
    }

    /// Add the variable only when a value is present; absent optionals are
    /// omitted, never emitted blank
    pub fn optional_var(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.var(name, v),
            None => self,
        }
    }

    /// Secret-valued variable; accepts only vaulted ciphertext
    pub fn secret(mut self, name: &str, value: &CipherText) -> Self {
        if let Some(group) = self.doc.groups.last_mut() {
            group
                .vars
                .push((name.to_string(), VarValue::Secret(value.clone())));
        }
        self
    }

    pub fn build(self) -> ConfigurationDocument {
        self.doc
    }
}

/// Build the default Medulla inventory from session facts and vaulted secrets
///
/// Deterministic given identical inputs except for the generated secrets.
pub fn render(session: &InstallSession, secrets: &SecretSet) -> Result<ConfigurationDocument> {
    if !secrets.is_complete() {
        return Err(BootstrapError::render(
            "secret set is missing required credentials",
        ));
    }

    let fqdn = session.require_fqdn()?;
    let interface = session.require_interface()?;

    let mut builder = ConfigurationDocument::builder()
        .group("medulla")
        .host(fqdn)
        .var("TIMEZONE", &session.timezone)
        .var("NETWORK_INTERFACE", interface)
        .var("SERVER_FQDN", fqdn)
        .optional_var("PUBLIC_IP", session.public_ip.as_deref());

    for name in secrets.names() {
        // names() preserves generation order, so rendering is stable
        if let Some(cipher) = secrets.cipher(name) {
            builder = builder.secret(name, cipher);
        }
    }

    let cipher = |name: &str| -> Result<&CipherText> {
        secrets
            .cipher(name)
            .ok_or_else(|| BootstrapError::render(format!("missing credential `{}`", name)))
    };

    let doc = builder
        .group("mmc")
        .host(fqdn)
        .secret("MMC_DB_PASSWORD", cipher("MMC_DB_PASSWORD")?)
        .secret("MARIADB_ROOT_PASSWORD", cipher("MARIADB_ROOT_PASSWORD")?)
        .build();

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::Vault;

    fn test_session(public_ip: Option<&str>) -> InstallSession {
        use clap::Parser;
        let mut session = InstallSession::from_cli(&crate::cli::Cli::parse_from([
            "medulla-bootstrap",
            "--interface",
            "eth1",
            "--server-fqdn",
            "medulla.example.com",
        ]));
        session.public_ip = public_ip.map(String::from);
        session
    }

    #[test]
    fn test_public_ip_omitted_when_unset() {
        let vault = Vault::from_passphrase("t");
        let secrets = SecretSet::generate_default(&vault, None).unwrap();
        let doc = render(&test_session(None), &secrets).unwrap();
        let yaml = doc.render_to_string().unwrap();
        assert!(!yaml.contains("PUBLIC_IP"));
    }

    #[test]
    fn test_public_ip_present_when_set() {
        let vault = Vault::from_passphrase("t");
        let secrets = SecretSet::generate_default(&vault, None).unwrap();
        let doc = render(&test_session(Some("203.0.113.10")), &secrets).unwrap();
        let yaml = doc.render_to_string().unwrap();
        assert!(yaml.contains("PUBLIC_IP: 203.0.113.10"));
    }

    #[test]
    fn test_groups_hosts_and_vaulted_root_password() {
        let vault = Vault::from_passphrase("t");
        let secrets = SecretSet::generate_default(&vault, Some("fixed-root-pw")).unwrap();
        let doc = render(&test_session(None), &secrets).unwrap();

        let names: Vec<&str> = doc.group_names().collect();
        assert_eq!(names, vec!["medulla", "mmc"]);

        let yaml = doc.to_yaml();
        for group in ["medulla", "mmc"] {
            let hosts = &yaml[group]["hosts"];
            assert!(
                hosts.get("medulla.example.com").is_some(),
                "host missing under {group}"
            );
        }

        let root_pw = yaml["medulla"]["vars"]["ROOT_PASSWORD"].as_str().unwrap();
        assert!(root_pw.starts_with("$MEDULLA_VAULT;"));
        assert!(!root_pw.contains("fixed-root-pw"));
        assert_eq!(
            vault
                .decrypt(secrets.cipher("ROOT_PASSWORD").unwrap())
                .unwrap(),
            "fixed-root-pw"
        );
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let vault = Vault::from_passphrase("t");
        let secrets = SecretSet::generate_default(&vault, None).unwrap();
        let session = test_session(None);
        let a = render(&session, &secrets).unwrap().render_to_string().unwrap();
        let b = render(&session, &secrets).unwrap().render_to_string().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_incomplete_secret_set_rejected() {
        let secrets = SecretSet::new();
        assert!(render(&test_session(None), &secrets).is_err());
    }

    #[tokio::test]
    async fn test_render_to_unwritable_path_fails() {
        let vault = Vault::from_passphrase("t");
        let secrets = SecretSet::generate_default(&vault, None).unwrap();
        let doc = render(&test_session(None), &secrets).unwrap();
        let err = doc
            .render_to(Path::new("/proc/definitely/not/writable/inventory.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Render(_)));
    }
}
