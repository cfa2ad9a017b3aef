//! KMS abstraction: wraps/unwraps per-tenant data encryption keys.
//!
//! Production deployments plug in a real provider (AWS KMS, GCP KMS); the
//! `Local` implementation here wraps under a process master key so the
//! platform runs without an external dependency in dev/test, the same way
//! `adk_mistralrs` keeps a `MockProvider` alongside its network-backed ones.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use nexus_core::{NexusError, Result};
use rand::RngCore;

#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Wraps a raw 32-byte DEK, returning an opaque blob safe to persist.
    async fn wrap(&self, dek: &[u8; 32]) -> Result<Vec<u8>>;
    /// Unwraps a blob previously returned by `wrap`.
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<[u8; 32]>;
}

/// Wraps DEKs under a fixed master key held in process memory. The nonce is
/// prepended to the ciphertext so `wrap`'s output is self-contained.
pub struct LocalKms {
    master: Aes256Gcm,
}

impl LocalKms {
    pub fn new(master_key: &[u8; 32]) -> Self {
        Self { master: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key)) }
    }

    pub fn from_env() -> Result<Self> {
        use base64::Engine;
        let encoded = std::env::var("NEXUS_KMS_MASTER_KEY_BASE64")
            .map_err(|_| NexusError::KmsUnavailable)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| NexusError::KmsUnavailable)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| NexusError::KmsUnavailable)?;
        Ok(Self::new(&key))
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn wrap(&self, dek: &[u8; 32]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.master.encrypt(nonce, dek.as_slice()).map_err(|_| NexusError::KmsUnavailable)?;
        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(out)
    }

    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<[u8; 32]> {
        if wrapped.len() < 12 {
            return Err(NexusError::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = wrapped.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.master.decrypt(nonce, ciphertext).map_err(|_| NexusError::DecryptionFailed)?;
        plaintext.try_into().map_err(|_| NexusError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_then_unwrap_round_trips() {
        let kms = LocalKms::new(&[7u8; 32]);
        let dek = [9u8; 32];
        let wrapped = kms.wrap(&dek).await.unwrap();
        let unwrapped = kms.unwrap_key(&wrapped).await.unwrap();
        assert_eq!(dek, unwrapped);
    }

    #[tokio::test]
    async fn corrupted_blob_fails_decryption() {
        let kms = LocalKms::new(&[7u8; 32]);
        let mut wrapped = kms.wrap(&[1u8; 32]).await.unwrap();
        let last = wrapped.len() - 1;
        wrapped[last] ^= 0xff;
        assert!(kms.unwrap_key(&wrapped).await.is_err());
    }
}
