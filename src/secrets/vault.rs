// file: src/secrets/vault.rs
// version: 1.0.0
// guid: d05f8c16-3e74-4b29-a6c0-91b5d2e84f37

//! Session secret vault
//!
//! Encrypts every generated credential under a single session vault key so
//! only opaque ciphertext tokens reach the rendered inventory. The passphrase
//! is persisted to an owner-read-only file and handed to the
//! configuration-management engine at apply time.
//!
//! Token format: `$MEDULLA_VAULT;1.0;PBKDF2-XCHACHA20;<base64>` where the
//! base64 payload is `salt(16) || nonce(24) || ciphertext+tag`. Key
//! derivation is PBKDF2-HMAC-SHA256.

use crate::{secrets::generator, BootstrapError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, OsRng},
    AeadCore, KeyInit, XChaCha20Poly1305, XNonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;
use tracing::{debug, info};

const TOKEN_HEADER: &str = "$MEDULLA_VAULT;1.0;PBKDF2-XCHACHA20";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 10_000;

/// An opaque vaulted token, safe to embed in the inventory
///
/// The inventory builder only accepts this type for secret-valued variables,
/// so clear text structurally cannot reach the serialized output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherText(String);

impl CipherText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Session vault bound to one passphrase
pub struct Vault {
    passphrase: String,
}

impl Vault {
    /// Generate a fresh vault passphrase and persist it owner-read-only
    ///
    /// A stale key file from an earlier run is overwritten here; the driver
    /// guarantees the prior-cleanup stage has already torn down remote state
    /// encrypted under the old key before this runs.
    pub async fn initialize(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let passphrase = generator::generate(generator::VAULT_PASSPHRASE_LEN);
        tokio::fs::write(path, format!("{}\n", passphrase)).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(path, perms).await?;
        }

        info!("Vault password file written to {}", path.display());
        Ok(Self { passphrase })
    }

    /// Open a vault over an existing passphrase (tests, guest handoff)
    pub fn from_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    /// Whether a key file from an earlier run is present
    pub fn stale_key_present(path: &Path) -> bool {
        path.exists()
    }

    /// Encrypt one clear-text secret into an inline token
    ///
    /// A fresh salt and nonce are drawn per call, so encrypting the same
    /// clear text twice yields different bytes; both decrypt to the input.
    pub fn encrypt(&self, clear_text: &str) -> Result<CipherText> {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt);
        let aead = XChaCha20Poly1305::new((&key).into());
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = aead
            .encrypt(&nonce, clear_text.as_bytes())
            .map_err(|_| BootstrapError::vault("encryption failed"))?;

        let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&salt);
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        debug!("Vaulted a {}-char secret", clear_text.len());
        Ok(CipherText(format!("{};{}", TOKEN_HEADER, BASE64.encode(payload))))
    }

    /// Decrypt a token produced by [`Vault::encrypt`]
    pub fn decrypt(&self, token: &CipherText) -> Result<String> {
        let encoded = token
            .0
            .strip_prefix(TOKEN_HEADER)
            .and_then(|rest| rest.strip_prefix(';'))
            .ok_or_else(|| BootstrapError::vault("unrecognized vault token header"))?;

        let payload = BASE64
            .decode(encoded)
            .map_err(|e| BootstrapError::vault(format!("token is not valid base64: {}", e)))?;

        if payload.len() < SALT_LEN + NONCE_LEN + 16 {
            return Err(BootstrapError::vault("vault token payload too short"));
        }

        let (salt, rest) = payload.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = self.derive_key(salt);
        let aead = XChaCha20Poly1305::new((&key).into());

        let clear = aead
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| BootstrapError::vault("decryption failed (wrong key or corrupt token)"))?;

        String::from_utf8(clear)
            .map_err(|_| BootstrapError::vault("decrypted payload is not valid UTF-8"))
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(self.passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let vault = Vault::from_passphrase("test-passphrase");
        let token = vault.encrypt("s3cret-value").unwrap();
        assert_eq!(vault.decrypt(&token).unwrap(), "s3cret-value");
    }

    #[test]
    fn test_same_clear_text_encrypts_differently() {
        let vault = Vault::from_passphrase("test-passphrase");
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), "same");
        assert_eq!(vault.decrypt(&b).unwrap(), "same");
    }

    #[test]
    fn test_token_never_contains_clear_text() {
        let vault = Vault::from_passphrase("test-passphrase");
        let token = vault.encrypt("VisiblePassword42").unwrap();
        assert!(token.as_str().starts_with(TOKEN_HEADER));
        assert!(!token.as_str().contains("VisiblePassword42"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let vault = Vault::from_passphrase("right");
        let other = Vault::from_passphrase("wrong");
        let token = vault.encrypt("secret").unwrap();
        assert!(other.decrypt(&token).is_err());
    }

    #[test]
    fn test_mangled_token_fails() {
        let vault = Vault::from_passphrase("k");
        assert!(vault
            .decrypt(&CipherText("not-a-vault-token".to_string()))
            .is_err());
        assert!(vault
            .decrypt(&CipherText(format!("{};AAAA", TOKEN_HEADER)))
            .is_err());
    }

    #[tokio::test]
    async fn test_initialize_writes_private_key_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault_password");
        let vault = Vault::initialize(&path).await.unwrap();

        let stored = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            stored.trim().len(),
            crate::secrets::generator::VAULT_PASSPHRASE_LEN
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        // The persisted passphrase decrypts what the session vault encrypts
        let reopened = Vault::from_passphrase(stored.trim());
        let token = vault.encrypt("roundtrip").unwrap();
        assert_eq!(reopened.decrypt(&token).unwrap(), "roundtrip");
    }
}
