//! Durable job queue (spec §4.10, §5): poll -> lease -> process -> ack/fail,
//! with a heartbeat timer joined against the processing future.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nexus_core::ids::{JobId, TenantId};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_LEASE_SECONDS: i64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Leased,
    Succeeded,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Leased => "leased",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "leased" => JobStatus::Leased,
            "succeeded" => JobStatus::Succeeded,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Queued,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A leased job plus the lease token required to ack/fail it.
#[derive(Debug, Clone)]
pub struct Lease {
    pub job: Job,
    pub worker_id: String,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, tenant_id: &TenantId, job_type: &str, payload: serde_json::Value) -> Result<JobId>;
    /// Leases the oldest available job of `job_type`, if any.
    async fn lease(&self, job_type: &str, worker_id: &str, lease_seconds: i64) -> Result<Option<Lease>>;
    async fn ack(&self, job_id: &JobId) -> Result<()>;
    /// Marks the job failed; re-queues it if attempts remain, else terminal `failed`.
    async fn fail(&self, job_id: &JobId, error: &str) -> Result<()>;
    async fn heartbeat(&self, worker_id: &str, job_type: &str) -> Result<()>;
    async fn queue_depth(&self, job_type: &str) -> Result<i64>;
}

pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, tenant_id: &TenantId, job_type: &str, payload: serde_json::Value) -> Result<JobId> {
        let id = JobId::generate();
        sqlx::query(
            "insert into jobs (id, tenant_id, job_type, payload, status, max_attempts) values ($1, $2, $3, $4, 'queued', $5)",
        )
        .bind(id.as_str())
        .bind(tenant_id.as_str())
        .bind(job_type)
        .bind(&payload)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(id)
    }

    async fn lease(&self, job_type: &str, worker_id: &str, lease_seconds: i64) -> Result<Option<Lease>> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let now = Utc::now();
        let row: Option<(String, String, String, serde_json::Value, i32, i32, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            "select id, tenant_id, job_type, payload, attempts, max_attempts, last_error, created_at
             from jobs
             where job_type = $1 and status = 'queued' and available_at <= $2
             order by available_at asc
             limit 1
             for update skip locked",
        )
        .bind(job_type)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;

        let Some((id, tenant_id, job_type, payload, attempts, max_attempts, last_error, created_at)) = row else {
            tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
            return Ok(None);
        };

        let leased_until = now + Duration::seconds(lease_seconds);
        sqlx::query("update jobs set status = 'leased', leased_by = $1, leased_until = $2, attempts = attempts + 1 where id = $3")
            .bind(worker_id)
            .bind(leased_until)
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;

        Ok(Some(Lease {
            job: Job {
                id: JobId::new(id),
                tenant_id: TenantId::new(tenant_id),
                job_type,
                payload,
                status: JobStatus::Leased,
                attempts: attempts + 1,
                max_attempts,
                last_error,
                created_at,
            },
            worker_id: worker_id.to_string(),
        }))
    }

    async fn ack(&self, job_id: &JobId) -> Result<()> {
        sqlx::query("update jobs set status = 'succeeded', completed_at = now() where id = $1")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn fail(&self, job_id: &JobId, error: &str) -> Result<()> {
        let row: Option<(i32, i32)> = sqlx::query_as("select attempts, max_attempts from jobs where id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        let Some((attempts, max_attempts)) = row else {
            return Err(NexusError::NotFound { resource_type: "job".into(), resource_id: job_id.as_str().into() });
        };
        if attempts >= max_attempts {
            sqlx::query("update jobs set status = 'failed', last_error = $1, completed_at = now() where id = $2")
                .bind(error)
                .bind(job_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| NexusError::Internal(e.to_string()))?;
        } else {
            sqlx::query("update jobs set status = 'queued', last_error = $1, available_at = now() where id = $2")
                .bind(error)
                .bind(job_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| NexusError::Internal(e.to_string()))?;
        }
        Ok(())
    }

    async fn heartbeat(&self, worker_id: &str, job_type: &str) -> Result<()> {
        sqlx::query(
            "insert into worker_heartbeats (worker_id, job_type, last_beat_at) values ($1, $2, now())
             on conflict (worker_id) do update set last_beat_at = now(), job_type = excluded.job_type",
        )
        .bind(worker_id)
        .bind(job_type)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn queue_depth(&self, job_type: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("select count(*) from jobs where job_type = $1 and status = 'queued'")
            .bind(job_type)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(row.0)
    }
}

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<String, Job>>,
    heartbeats: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, tenant_id: &TenantId, job_type: &str, payload: serde_json::Value) -> Result<JobId> {
        let id = JobId::generate();
        let job = Job {
            id: id.clone(),
            tenant_id: tenant_id.clone(),
            job_type: job_type.to_string(),
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            last_error: None,
            created_at: Utc::now(),
        };
        self.jobs.lock().unwrap().insert(id.as_str().to_string(), job);
        Ok(id)
    }

    async fn lease(&self, job_type: &str, worker_id: &str, _lease_seconds: i64) -> Result<Option<Lease>> {
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .values_mut()
            .filter(|j| j.job_type == job_type && j.status == JobStatus::Queued)
            .min_by_key(|j| j.created_at);
        let Some(job) = next else { return Ok(None) };
        job.status = JobStatus::Leased;
        job.attempts += 1;
        Ok(Some(Lease { job: job.clone(), worker_id: worker_id.to_string() }))
    }

    async fn ack(&self, job_id: &JobId) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(job_id.as_str()) {
            job.status = JobStatus::Succeeded;
        }
        Ok(())
    }

    async fn fail(&self, job_id: &JobId, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(job_id.as_str()) else {
            return Err(NexusError::NotFound { resource_type: "job".into(), resource_id: job_id.as_str().into() });
        };
        job.last_error = Some(error.to_string());
        job.status = if job.attempts >= job.max_attempts { JobStatus::Failed } else { JobStatus::Queued };
        Ok(())
    }

    async fn heartbeat(&self, worker_id: &str, _job_type: &str) -> Result<()> {
        self.heartbeats.lock().unwrap().insert(worker_id.to_string(), Utc::now());
        Ok(())
    }

    async fn queue_depth(&self, job_type: &str) -> Result<i64> {
        Ok(self.jobs.lock().unwrap().values().filter(|j| j.job_type == job_type && j.status == JobStatus::Queued).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn lease_returns_oldest_queued_job_first() {
        let queue = InMemoryJobQueue::new();
        let tenant = TenantId::new("t1");
        let first = queue.enqueue(&tenant, "ingest", json!({"n": 1})).await.unwrap();
        let _second = queue.enqueue(&tenant, "ingest", json!({"n": 2})).await.unwrap();

        let leased = queue.lease("ingest", "worker-1", DEFAULT_LEASE_SECONDS).await.unwrap().unwrap();
        assert_eq!(leased.job.id, first);
        assert_eq!(leased.job.attempts, 1);
    }

    #[tokio::test]
    async fn failed_job_requeues_until_max_attempts_then_terminal() {
        let queue = InMemoryJobQueue::new();
        let tenant = TenantId::new("t1");
        let id = queue.enqueue(&tenant, "ingest", json!({})).await.unwrap();

        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            let leased = queue.lease("ingest", "w", DEFAULT_LEASE_SECONDS).await.unwrap().unwrap();
            assert_eq!(leased.job.id, id);
            queue.fail(&id, "boom").await.unwrap();
        }
        assert!(queue.lease("ingest", "w", DEFAULT_LEASE_SECONDS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_removes_job_from_queue_depth() {
        let queue = InMemoryJobQueue::new();
        let tenant = TenantId::new("t1");
        let id = queue.enqueue(&tenant, "ingest", json!({})).await.unwrap();
        assert_eq!(queue.queue_depth("ingest").await.unwrap(), 1);
        queue.lease("ingest", "w", DEFAULT_LEASE_SECONDS).await.unwrap();
        queue.ack(&id).await.unwrap();
        assert_eq!(queue.queue_depth("ingest").await.unwrap(), 0);
    }
}
