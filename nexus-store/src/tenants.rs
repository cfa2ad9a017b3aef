//! Tenant and API key repositories (spec §3).

use async_trait::async_trait;
use chrono::Utc;
use nexus_core::ids::{ApiKeyId, PlanId, TenantId};
use nexus_core::model::{ApiKey, Role, Tenant};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn get(&self, id: &TenantId) -> Result<Tenant>;
    async fn insert(&self, tenant: Tenant) -> Result<Tenant>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn insert(&self, key: ApiKey) -> Result<ApiKey>;
    async fn get(&self, key_id: &ApiKeyId) -> Result<ApiKey>;
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>>;
    async fn revoke(&self, key_id: &ApiKeyId) -> Result<()>;
    async fn touch_last_used(&self, key_id: &ApiKeyId) -> Result<()>;
}

fn role_str(r: Role) -> &'static str {
    r.as_str()
}

fn parse_role(s: &str) -> Result<Role> {
    match s {
        "reader" => Ok(Role::Reader),
        "editor" => Ok(Role::Editor),
        "admin" => Ok(Role::Admin),
        other => Err(NexusError::Internal(format!("corrupt role {other}"))),
    }
}

pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn get(&self, id: &TenantId) -> Result<Tenant> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            plan_id: String,
            overrides: serde_json::Value,
            created_at: chrono::DateTime<Utc>,
        }
        let row: Row = sqlx::query_as("select * from tenants where id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "tenant".into(), resource_id: id.as_str().to_string() })?;
        let overrides: Vec<String> = serde_json::from_value(row.overrides).map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(Tenant { id: TenantId::new(row.id), plan_id: PlanId::new(row.plan_id), overrides: overrides.into_iter().collect(), created_at: row.created_at })
    }

    async fn insert(&self, tenant: Tenant) -> Result<Tenant> {
        let overrides: Vec<&String> = tenant.overrides.iter().collect();
        let overrides_json = serde_json::to_value(&overrides).map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query("insert into tenants (id, plan_id, overrides, created_at) values ($1,$2,$3,$4)")
            .bind(tenant.id.as_str())
            .bind(tenant.plan_id.as_str())
            .bind(overrides_json)
            .bind(tenant.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(tenant)
    }
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn get(&self, id: &TenantId) -> Result<Tenant> {
        self.tenants.read().unwrap().get(id.as_str()).cloned().ok_or_else(|| NexusError::NotFound {
            resource_type: "tenant".into(),
            resource_id: id.as_str().to_string(),
        })
    }

    async fn insert(&self, tenant: Tenant) -> Result<Tenant> {
        self.tenants.write().unwrap().insert(tenant.id.as_str().to_string(), tenant.clone());
        Ok(tenant)
    }
}

pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    key_id: String,
    tenant_id: String,
    role: String,
    hash: String,
    prefix: String,
    created_at: chrono::DateTime<Utc>,
    last_used_at: Option<chrono::DateTime<Utc>>,
    revoked_at: Option<chrono::DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_key(self) -> Result<ApiKey> {
        Ok(ApiKey {
            key_id: ApiKeyId::new(self.key_id),
            tenant_id: TenantId::new(self.tenant_id),
            role: parse_role(&self.role)?,
            hash: self.hash,
            prefix: self.prefix,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            revoked_at: self.revoked_at,
        })
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn insert(&self, key: ApiKey) -> Result<ApiKey> {
        sqlx::query(
            "insert into api_keys (key_id, tenant_id, role, hash, prefix, created_at, last_used_at, revoked_at) values ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(key.key_id.as_str())
        .bind(key.tenant_id.as_str())
        .bind(role_str(key.role))
        .bind(&key.hash)
        .bind(&key.prefix)
        .bind(key.created_at)
        .bind(key.last_used_at)
        .bind(key.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(key)
    }

    async fn get(&self, key_id: &ApiKeyId) -> Result<ApiKey> {
        let row: ApiKeyRow = sqlx::query_as("select * from api_keys where key_id = $1")
            .bind(key_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "api_key".into(), resource_id: key_id.as_str().to_string() })?;
        row.into_key()
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let rows: Vec<ApiKeyRow> = sqlx::query_as("select * from api_keys where prefix = $1")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(ApiKeyRow::into_key).collect()
    }

    async fn revoke(&self, key_id: &ApiKeyId) -> Result<()> {
        sqlx::query("update api_keys set revoked_at = coalesce(revoked_at, now()) where key_id = $1")
            .bind(key_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn touch_last_used(&self, key_id: &ApiKeyId) -> Result<()> {
        sqlx::query("update api_keys set last_used_at = now() where key_id = $1")
            .bind(key_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApiKeyRepository {
    keys: RwLock<HashMap<String, ApiKey>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn insert(&self, key: ApiKey) -> Result<ApiKey> {
        self.keys.write().unwrap().insert(key.key_id.as_str().to_string(), key.clone());
        Ok(key)
    }

    async fn get(&self, key_id: &ApiKeyId) -> Result<ApiKey> {
        self.keys.read().unwrap().get(key_id.as_str()).cloned().ok_or_else(|| NexusError::NotFound {
            resource_type: "api_key".into(),
            resource_id: key_id.as_str().to_string(),
        })
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        Ok(self.keys.read().unwrap().values().filter(|k| k.prefix == prefix).cloned().collect())
    }

    async fn revoke(&self, key_id: &ApiKeyId) -> Result<()> {
        if let Some(key) = self.keys.write().unwrap().get_mut(key_id.as_str()) {
            if key.revoked_at.is_none() {
                key.revoked_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn touch_last_used(&self, key_id: &ApiKeyId) -> Result<()> {
        if let Some(key) = self.keys.write().unwrap().get_mut(key_id.as_str()) {
            key.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// `HashSet` re-exported so callers constructing a `Tenant` don't need to
/// depend on `std::collections` directly just for this one field.
pub fn overrides(items: impl IntoIterator<Item = String>) -> HashSet<String> {
    items.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let repo = InMemoryApiKeyRepository::new();
        let key = ApiKey {
            key_id: ApiKeyId::new("k1"),
            tenant_id: TenantId::new("t1"),
            role: Role::Editor,
            hash: "h".into(),
            prefix: "nx_".into(),
            created_at: Utc::now(),
            last_used_at: None,
            revoked_at: None,
        };
        repo.insert(key.clone()).await.unwrap();
        repo.revoke(&key.key_id).await.unwrap();
        let first = repo.get(&key.key_id).await.unwrap().revoked_at.unwrap();
        repo.revoke(&key.key_id).await.unwrap();
        let second = repo.get(&key.key_id).await.unwrap().revoked_at.unwrap();
        assert_eq!(first, second);
    }
}
