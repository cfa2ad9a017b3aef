//! Per-tenant key registry (spec §3, §4.12): one active key version per
//! tenant, prior versions retired on rotation, never deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::ids::TenantId;
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Active,
    Retired,
}

impl KeyState {
    fn as_str(self) -> &'static str {
        match self {
            KeyState::Active => "active",
            KeyState::Retired => "retired",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(KeyState::Active),
            "retired" => Ok(KeyState::Retired),
            other => Err(NexusError::Internal(format!("corrupt key state {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CryptoKey {
    pub tenant_id: TenantId,
    pub version: i32,
    pub alias: String,
    pub state: KeyState,
    pub wrapped_dek: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait KeyRegistry: Send + Sync {
    async fn active_key(&self, tenant_id: &TenantId) -> Result<CryptoKey>;
    async fn get_version(&self, tenant_id: &TenantId, version: i32) -> Result<CryptoKey>;
    /// Inserts a new active key version and retires the previous active one
    /// in the same transaction. Fails with `KEY_ROTATION_IN_PROGRESS` if a
    /// rotation job is already running for this tenant (enforced by caller
    /// via `rotation::RotationStore`).
    async fn rotate(&self, tenant_id: &TenantId, alias: String, wrapped_dek: Vec<u8>) -> Result<CryptoKey>;
}

pub struct PgKeyRegistry {
    pool: PgPool,
}

impl PgKeyRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    tenant_id: String,
    version: i32,
    alias: String,
    state: String,
    wrapped_dek: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl KeyRow {
    fn into_key(self) -> Result<CryptoKey> {
        Ok(CryptoKey {
            tenant_id: TenantId::new(self.tenant_id),
            version: self.version,
            alias: self.alias,
            state: KeyState::parse(&self.state)?,
            wrapped_dek: self.wrapped_dek,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl KeyRegistry for PgKeyRegistry {
    async fn active_key(&self, tenant_id: &TenantId) -> Result<CryptoKey> {
        let row: KeyRow = sqlx::query_as("select * from crypto_keys where tenant_id = $1 and state = 'active'")
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or(NexusError::KeyNotActive)?;
        row.into_key()
    }

    async fn get_version(&self, tenant_id: &TenantId, version: i32) -> Result<CryptoKey> {
        let row: KeyRow = sqlx::query_as("select * from crypto_keys where tenant_id = $1 and version = $2")
            .bind(tenant_id.as_str())
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "crypto_key".into(), resource_id: format!("{tenant_id}:{version}") })?;
        row.into_key()
    }

    async fn rotate(&self, tenant_id: &TenantId, alias: String, wrapped_dek: Vec<u8>) -> Result<CryptoKey> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let next_version: (Option<i32>,) = sqlx::query_as("select max(version) from crypto_keys where tenant_id = $1")
            .bind(tenant_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        let version = next_version.0.unwrap_or(0) + 1;
        sqlx::query("update crypto_keys set state = 'retired' where tenant_id = $1 and state = 'active'")
            .bind(tenant_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        let created_at = Utc::now();
        sqlx::query("insert into crypto_keys (tenant_id, version, alias, state, wrapped_dek, created_at) values ($1,$2,$3,'active',$4,$5)")
            .bind(tenant_id.as_str())
            .bind(version)
            .bind(&alias)
            .bind(&wrapped_dek)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(CryptoKey { tenant_id: tenant_id.clone(), version, alias, state: KeyState::Active, wrapped_dek, created_at })
    }
}

#[derive(Default)]
pub struct InMemoryKeyRegistry {
    keys: RwLock<HashMap<(String, i32), CryptoKey>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRegistry for InMemoryKeyRegistry {
    async fn active_key(&self, tenant_id: &TenantId) -> Result<CryptoKey> {
        self.keys
            .read()
            .unwrap()
            .values()
            .find(|k| &k.tenant_id == tenant_id && k.state == KeyState::Active)
            .cloned()
            .ok_or(NexusError::KeyNotActive)
    }

    async fn get_version(&self, tenant_id: &TenantId, version: i32) -> Result<CryptoKey> {
        self.keys
            .read()
            .unwrap()
            .get(&(tenant_id.as_str().to_string(), version))
            .cloned()
            .ok_or_else(|| NexusError::NotFound { resource_type: "crypto_key".into(), resource_id: format!("{tenant_id}:{version}") })
    }

    async fn rotate(&self, tenant_id: &TenantId, alias: String, wrapped_dek: Vec<u8>) -> Result<CryptoKey> {
        let mut keys = self.keys.write().unwrap();
        let next_version = keys.keys().filter(|(t, _)| t == tenant_id.as_str()).map(|(_, v)| *v).max().unwrap_or(0) + 1;
        for key in keys.values_mut() {
            if &key.tenant_id == tenant_id && key.state == KeyState::Active {
                key.state = KeyState::Retired;
            }
        }
        let key = CryptoKey { tenant_id: tenant_id.clone(), version: next_version, alias, state: KeyState::Active, wrapped_dek, created_at: Utc::now() };
        keys.insert((tenant_id.as_str().to_string(), next_version), key.clone());
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rotate_retires_previous_active_key() {
        let registry = InMemoryKeyRegistry::new();
        let tenant = TenantId::new("t1");
        let first = registry.rotate(&tenant, "alias-1".into(), vec![1]).await.unwrap();
        let second = registry.rotate(&tenant, "alias-2".into(), vec![2]).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        let retired = registry.get_version(&tenant, 1).await.unwrap();
        assert_eq!(retired.state, KeyState::Retired);
        let active = registry.active_key(&tenant).await.unwrap();
        assert_eq!(active.version, 2);
    }

    #[tokio::test]
    async fn active_key_errors_when_none_exists() {
        let registry = InMemoryKeyRegistry::new();
        let err = registry.active_key(&TenantId::new("t1")).await.unwrap_err();
        assert_eq!(err.code(), "KEY_NOT_ACTIVE");
    }
}
