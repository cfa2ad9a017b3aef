//! Legal hold (spec §4.14): an active hold blocks retention deletion, backup
//! prune, and destructive DSAR requests within its scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::ids::{LegalHoldId, TenantId};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LegalHold {
    pub id: LegalHoldId,
    pub tenant_id: TenantId,
    pub resource_type: String,
    /// `None` holds the entire `resource_type` within the tenant.
    pub resource_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LegalHold {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    fn covers(&self, resource_type: &str, resource_id: &str) -> bool {
        self.is_active() && self.resource_type == resource_type && self.resource_id.as_deref().is_none_or(|id| id == resource_id)
    }
}

#[async_trait]
pub trait LegalHoldStore: Send + Sync {
    async fn set(&self, hold: LegalHold) -> Result<LegalHold>;
    async fn release(&self, tenant_id: &TenantId, id: &LegalHoldId) -> Result<LegalHold>;
    async fn list_active(&self, tenant_id: &TenantId) -> Result<Vec<LegalHold>>;
    async fn is_covered(&self, tenant_id: &TenantId, resource_type: &str, resource_id: &str) -> Result<bool> {
        Ok(self.list_active(tenant_id).await?.iter().any(|h| h.covers(resource_type, resource_id)))
    }
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    id: String,
    tenant_id: String,
    resource_type: String,
    resource_id: Option<String>,
    reason: String,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl From<HoldRow> for LegalHold {
    fn from(row: HoldRow) -> Self {
        LegalHold {
            id: LegalHoldId::new(row.id),
            tenant_id: TenantId::new(row.tenant_id),
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            reason: row.reason,
            created_at: row.created_at,
            released_at: row.released_at,
        }
    }
}

pub struct PgLegalHoldStore {
    pool: PgPool,
}

impl PgLegalHoldStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LegalHoldStore for PgLegalHoldStore {
    async fn set(&self, hold: LegalHold) -> Result<LegalHold> {
        sqlx::query(
            "insert into legal_holds (id, tenant_id, resource_type, resource_id, reason, created_at) \
             values ($1,$2,$3,$4,$5,$6)",
        )
        .bind(hold.id.as_str())
        .bind(hold.tenant_id.as_str())
        .bind(&hold.resource_type)
        .bind(&hold.resource_id)
        .bind(&hold.reason)
        .bind(hold.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(hold)
    }

    async fn release(&self, tenant_id: &TenantId, id: &LegalHoldId) -> Result<LegalHold> {
        let row: HoldRow = sqlx::query_as(
            "update legal_holds set released_at = now() where tenant_id = $1 and id = $2 returning *",
        )
        .bind(tenant_id.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?
        .ok_or_else(|| NexusError::NotFound { resource_type: "legal_hold".into(), resource_id: id.as_str().to_string() })?;
        Ok(row.into())
    }

    async fn list_active(&self, tenant_id: &TenantId) -> Result<Vec<LegalHold>> {
        let rows: Vec<HoldRow> = sqlx::query_as("select * from legal_holds where tenant_id = $1 and released_at is null")
            .bind(tenant_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Default)]
pub struct InMemoryLegalHoldStore {
    holds: RwLock<Vec<LegalHold>>,
}

impl InMemoryLegalHoldStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LegalHoldStore for InMemoryLegalHoldStore {
    async fn set(&self, hold: LegalHold) -> Result<LegalHold> {
        self.holds.write().unwrap().push(hold.clone());
        Ok(hold)
    }

    async fn release(&self, tenant_id: &TenantId, id: &LegalHoldId) -> Result<LegalHold> {
        let mut holds = self.holds.write().unwrap();
        let hold = holds
            .iter_mut()
            .find(|h| &h.tenant_id == tenant_id && &h.id == id)
            .ok_or_else(|| NexusError::NotFound { resource_type: "legal_hold".into(), resource_id: id.as_str().to_string() })?;
        hold.released_at = Some(Utc::now());
        Ok(hold.clone())
    }

    async fn list_active(&self, tenant_id: &TenantId) -> Result<Vec<LegalHold>> {
        Ok(self.holds.read().unwrap().iter().filter(|h| &h.tenant_id == tenant_id && h.is_active()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(resource_id: Option<&str>) -> LegalHold {
        LegalHold {
            id: LegalHoldId::generate(),
            tenant_id: TenantId::new("t1"),
            resource_type: "document".into(),
            resource_id: resource_id.map(String::from),
            reason: "litigation hold".into(),
            created_at: Utc::now(),
            released_at: None,
        }
    }

    #[tokio::test]
    async fn scoped_hold_covers_only_its_resource() {
        let store = InMemoryLegalHoldStore::new();
        store.set(hold(Some("d1"))).await.unwrap();
        let tenant = TenantId::new("t1");
        assert!(store.is_covered(&tenant, "document", "d1").await.unwrap());
        assert!(!store.is_covered(&tenant, "document", "d2").await.unwrap());
    }

    #[tokio::test]
    async fn tenant_wide_hold_covers_every_resource_of_its_type() {
        let store = InMemoryLegalHoldStore::new();
        store.set(hold(None)).await.unwrap();
        let tenant = TenantId::new("t1");
        assert!(store.is_covered(&tenant, "document", "d1").await.unwrap());
        assert!(store.is_covered(&tenant, "document", "anything").await.unwrap());
    }

    #[tokio::test]
    async fn released_hold_no_longer_covers() {
        let store = InMemoryLegalHoldStore::new();
        let created = store.set(hold(Some("d1"))).await.unwrap();
        let tenant = TenantId::new("t1");
        store.release(&tenant, &created.id).await.unwrap();
        assert!(!store.is_covered(&tenant, "document", "d1").await.unwrap());
    }
}
