//! Envelope encryption: per-record AES-256-GCM DEK wrapped under the
//! tenant's active KEK version (spec §4.12).

use crate::kms::KmsClient;
use crate::registry::KeyRegistry;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use nexus_core::ids::TenantId;
use nexus_core::{NexusError, Result};
use rand::RngCore;

/// Ciphertext plus the key version needed to decrypt it later.
#[derive(Debug, Clone)]
pub struct SealedRecord {
    pub key_version: i32,
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

pub async fn seal(
    registry: &dyn KeyRegistry,
    kms: &dyn KmsClient,
    tenant_id: &TenantId,
    plaintext: &[u8],
) -> Result<SealedRecord> {
    let key = registry.active_key(tenant_id).await?;
    let dek = kms.unwrap_key(&key.wrapped_dek).await?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|_| NexusError::EncryptionRequired)?;
    Ok(SealedRecord { key_version: key.version, nonce: nonce_bytes, ciphertext })
}

pub async fn open(
    registry: &dyn KeyRegistry,
    kms: &dyn KmsClient,
    tenant_id: &TenantId,
    sealed: &SealedRecord,
) -> Result<Vec<u8>> {
    let key = registry.get_version(tenant_id, sealed.key_version).await?;
    let dek = kms.unwrap_key(&key.wrapped_dek).await?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&dek));
    let nonce = Nonce::from_slice(&sealed.nonce);
    cipher.decrypt(nonce, sealed.ciphertext.as_slice()).map_err(|_| NexusError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::LocalKms;
    use crate::registry::InMemoryKeyRegistry;

    #[tokio::test]
    async fn seal_then_open_round_trips() {
        let kms = LocalKms::new(&[3u8; 32]);
        let registry = InMemoryKeyRegistry::new();
        let tenant = TenantId::new("t1");
        let wrapped = kms.wrap(&[5u8; 32]).await.unwrap();
        registry.rotate(&tenant, "alias-1".into(), wrapped).await.unwrap();

        let sealed = seal(&registry, &kms, &tenant, b"hello world").await.unwrap();
        let plaintext = open(&registry, &kms, &tenant, &sealed).await.unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[tokio::test]
    async fn open_after_rotation_still_reads_old_version() {
        let kms = LocalKms::new(&[3u8; 32]);
        let registry = InMemoryKeyRegistry::new();
        let tenant = TenantId::new("t1");
        registry.rotate(&tenant, "alias-1".into(), kms.wrap(&[5u8; 32]).await.unwrap()).await.unwrap();
        let sealed = seal(&registry, &kms, &tenant, b"v1 data").await.unwrap();

        registry.rotate(&tenant, "alias-2".into(), kms.wrap(&[9u8; 32]).await.unwrap()).await.unwrap();

        let plaintext = open(&registry, &kms, &tenant, &sealed).await.unwrap();
        assert_eq!(plaintext, b"v1 data");
    }

    #[tokio::test]
    async fn seal_without_active_key_fails() {
        let kms = LocalKms::new(&[3u8; 32]);
        let registry = InMemoryKeyRegistry::new();
        let err = seal(&registry, &kms, &TenantId::new("t1"), b"x").await.unwrap_err();
        assert_eq!(err.code(), "KEY_NOT_ACTIVE");
    }
}
