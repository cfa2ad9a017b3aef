//! Key rotation jobs: one in-flight rotation per tenant (spec §4.12).
//! Re-encryption is resumable: `queued -> running -> completed|failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::ids::{JobId, TenantId};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RotationStatus {
    fn as_str(self) -> &'static str {
        match self {
            RotationStatus::Queued => "queued",
            RotationStatus::Running => "running",
            RotationStatus::Completed => "completed",
            RotationStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(RotationStatus::Queued),
            "running" => Ok(RotationStatus::Running),
            "completed" => Ok(RotationStatus::Completed),
            "failed" => Ok(RotationStatus::Failed),
            other => Err(NexusError::Internal(format!("corrupt rotation status {other}"))),
        }
    }

    fn is_in_flight(self) -> bool {
        matches!(self, RotationStatus::Queued | RotationStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct RotationJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub from_version: i32,
    pub to_version: i32,
    pub status: RotationStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait RotationStore: Send + Sync {
    /// Fails with `KEY_ROTATION_IN_PROGRESS` if a rotation is already
    /// queued/running for this tenant.
    async fn start(&self, tenant_id: &TenantId, from_version: i32, to_version: i32) -> Result<RotationJob>;
    async fn transition(&self, job_id: &JobId, status: RotationStatus, failure_reason: Option<String>) -> Result<RotationJob>;
    async fn get(&self, job_id: &JobId) -> Result<RotationJob>;
}

pub struct PgRotationStore {
    pool: PgPool,
}

impl PgRotationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    tenant_id: String,
    from_version: i32,
    to_version: i32,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<RotationJob> {
        Ok(RotationJob {
            id: JobId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            from_version: self.from_version,
            to_version: self.to_version,
            status: RotationStatus::parse(&self.status)?,
            failure_reason: self.failure_reason,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
impl RotationStore for PgRotationStore {
    async fn start(&self, tenant_id: &TenantId, from_version: i32, to_version: i32) -> Result<RotationJob> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let in_flight: Option<(String,)> = sqlx::query_as(
            "select id from key_rotation_jobs where tenant_id = $1 and status in ('queued','running')",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        if in_flight.is_some() {
            return Err(NexusError::KeyRotationInProgress);
        }
        let job = RotationJob {
            id: JobId::generate(),
            tenant_id: tenant_id.clone(),
            from_version,
            to_version,
            status: RotationStatus::Queued,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        sqlx::query(
            "insert into key_rotation_jobs (id, tenant_id, from_version, to_version, status, created_at) values ($1,$2,$3,$4,$5,$6)",
        )
        .bind(job.id.as_str())
        .bind(job.tenant_id.as_str())
        .bind(job.from_version)
        .bind(job.to_version)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(job)
    }

    async fn transition(&self, job_id: &JobId, status: RotationStatus, failure_reason: Option<String>) -> Result<RotationJob> {
        let completed_at = matches!(status, RotationStatus::Completed | RotationStatus::Failed).then(Utc::now);
        sqlx::query("update key_rotation_jobs set status = $2, failure_reason = $3, completed_at = coalesce($4, completed_at) where id = $1")
            .bind(job_id.as_str())
            .bind(status.as_str())
            .bind(&failure_reason)
            .bind(completed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        self.get(job_id).await
    }

    async fn get(&self, job_id: &JobId) -> Result<RotationJob> {
        let row: JobRow = sqlx::query_as("select * from key_rotation_jobs where id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "rotation_job".into(), resource_id: job_id.as_str().to_string() })?;
        row.into_job()
    }
}

#[derive(Default)]
pub struct InMemoryRotationStore {
    jobs: RwLock<HashMap<String, RotationJob>>,
}

impl InMemoryRotationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RotationStore for InMemoryRotationStore {
    async fn start(&self, tenant_id: &TenantId, from_version: i32, to_version: i32) -> Result<RotationJob> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.values().any(|j| &j.tenant_id == tenant_id && j.status.is_in_flight()) {
            return Err(NexusError::KeyRotationInProgress);
        }
        let job = RotationJob {
            id: JobId::generate(),
            tenant_id: tenant_id.clone(),
            from_version,
            to_version,
            status: RotationStatus::Queued,
            failure_reason: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        jobs.insert(job.id.as_str().to_string(), job.clone());
        Ok(job)
    }

    async fn transition(&self, job_id: &JobId, status: RotationStatus, failure_reason: Option<String>) -> Result<RotationJob> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(job_id.as_str()).ok_or_else(|| NexusError::NotFound { resource_type: "rotation_job".into(), resource_id: job_id.as_str().to_string() })?;
        job.status = status;
        job.failure_reason = failure_reason;
        if matches!(status, RotationStatus::Completed | RotationStatus::Failed) {
            job.completed_at = Some(Utc::now());
        }
        Ok(job.clone())
    }

    async fn get(&self, job_id: &JobId) -> Result<RotationJob> {
        self.jobs.read().unwrap().get(job_id.as_str()).cloned().ok_or_else(|| NexusError::NotFound {
            resource_type: "rotation_job".into(),
            resource_id: job_id.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_rotation_while_in_flight_is_rejected() {
        let store = InMemoryRotationStore::new();
        let tenant = TenantId::new("t1");
        store.start(&tenant, 1, 2).await.unwrap();
        let err = store.start(&tenant, 1, 2).await.unwrap_err();
        assert_eq!(err.code(), "KEY_ROTATION_IN_PROGRESS");
    }

    #[tokio::test]
    async fn completed_job_frees_tenant_for_next_rotation() {
        let store = InMemoryRotationStore::new();
        let tenant = TenantId::new("t1");
        let job = store.start(&tenant, 1, 2).await.unwrap();
        store.transition(&job.id, RotationStatus::Completed, None).await.unwrap();
        assert!(store.start(&tenant, 2, 3).await.is_ok());
    }
}
