//! API key hashing and constant-time verification (spec §4.2).
//!
//! Plaintext secrets are never stored; only a salted SHA-256 hash and a
//! short prefix for lookup. Verification compares digests in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const PREFIX_LEN: usize = 8;

pub fn prefix_of(secret: &str) -> String {
    secret.chars().take(PREFIX_LEN).collect()
}

pub fn hash_secret(secret: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of a candidate secret's hash against the stored
/// hash; both sides are always hashed and compared full-length regardless of
/// where they first differ.
pub fn verify(secret: &str, salt: &str, stored_hash: &str) -> bool {
    let candidate = hash_secret(secret, salt);
    if candidate.len() != stored_hash.len() {
        return false;
    }
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_secret() {
        let hash = hash_secret("s3cr3t", "salt1");
        assert!(verify("s3cr3t", "salt1", &hash));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let hash = hash_secret("s3cr3t", "salt1");
        assert!(!verify("wrong", "salt1", &hash));
    }

    #[test]
    fn prefix_is_stable_lookup_key() {
        assert_eq!(prefix_of("nx_abcdef1234567890"), "nx_abcde");
    }
}
