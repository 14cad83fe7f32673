// file: src/secrets/generator.rs
// version: 1.0.0
// guid: 6b2d9e47-8a05-4c31-bd68-f94e07a25c81

//! High-entropy secret generation

use rand::Rng;

/// Fixed length of every generated credential
pub const SECRET_LEN: usize = 20;

/// Length of the session vault passphrase
pub const VAULT_PASSPHRASE_LEN: usize = 32;

/// Alphanumeric charset with visually ambiguous glyphs removed
/// (no `0`, `O`, `1`, `l`, `I`)
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// Generate one secret of exactly `length` characters
///
/// Each call draws independently from the OS random source; no two
/// credentials share entropy state.
pub fn generate(length: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate a secret of the default credential length
pub fn generate_default() -> String {
    generate(SECRET_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exact_length() {
        for len in [1, 8, SECRET_LEN, VAULT_PASSPHRASE_LEN, 64] {
            assert_eq!(generate(len).len(), len);
        }
    }

    #[test]
    fn test_charset_excludes_ambiguous_glyphs() {
        let secret = generate(2048);
        for c in secret.chars() {
            assert!(c.is_ascii_alphanumeric(), "non-alphanumeric char {c}");
            assert!(!"0O1lI".contains(c), "ambiguous char {c}");
        }
    }

    #[test]
    fn test_no_collisions_over_many_draws() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate(SECRET_LEN)), "collision observed");
        }
    }
}
