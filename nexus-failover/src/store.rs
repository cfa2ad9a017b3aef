//! Failover run persistence (spec §4.13): single in-flight run, row-locked
//! transitions, and an enforced cooldown between them.

use crate::state::FailoverState;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nexus_core::ids::RegionId;
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FailoverRun {
    pub id: String,
    pub region_id: RegionId,
    pub state: FailoverState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const TRANSITION_COOLDOWN: Duration = Duration::seconds(30);

#[async_trait]
pub trait FailoverStore: Send + Sync {
    /// Starts a new run for `region_id`. Fails with `409 Conflict` if any
    /// run anywhere is already in flight (the single-in-flight invariant).
    async fn start(&self, region_id: &RegionId, now: DateTime<Utc>) -> Result<FailoverRun>;
    async fn active(&self) -> Result<Option<FailoverRun>>;
    /// Advances `run_id` from its current state to `next`, enforcing both
    /// the state machine's legality and the cooldown since `updated_at`.
    async fn transition(&self, run_id: &str, next: FailoverState, now: DateTime<Utc>) -> Result<FailoverRun>;
}

pub struct PgFailoverStore {
    pool: PgPool,
}

impl PgFailoverStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    region_id: String,
    state: String,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for FailoverRun {
    type Error = NexusError;

    fn try_from(row: RunRow) -> Result<Self> {
        Ok(FailoverRun {
            id: row.id,
            region_id: RegionId::new(row.region_id),
            state: FailoverState::parse(&row.state).ok_or_else(|| NexusError::Internal(format!("corrupt failover state {}", row.state)))?,
            started_at: row.started_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl FailoverStore for PgFailoverStore {
    async fn start(&self, region_id: &RegionId, now: DateTime<Utc>) -> Result<FailoverRun> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let existing: Option<(i64,)> = sqlx::query_as(
            "select 1 from failover_runs where state not in ('completed', 'rolled_back') for update",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        if existing.is_some() {
            return Err(NexusError::Conflict { reason: "a failover run is already in flight".into() });
        }

        let row: RunRow = sqlx::query_as(
            "insert into failover_runs (id, region_id, state, started_at, updated_at) values ($1,$2,$3,$4,$4) returning *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(region_id.as_str())
        .bind(FailoverState::FreezeWrites.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        row.try_into()
    }

    async fn active(&self) -> Result<Option<FailoverRun>> {
        let row: Option<RunRow> = sqlx::query_as("select * from failover_runs where state not in ('completed', 'rolled_back') order by started_at desc limit 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        row.map(TryFrom::try_from).transpose()
    }

    async fn transition(&self, run_id: &str, next: FailoverState, now: DateTime<Utc>) -> Result<FailoverRun> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let row: RunRow = sqlx::query_as("select * from failover_runs where id = $1 for update")
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "failover_run".into(), resource_id: run_id.into() })?;
        let run: FailoverRun = row.try_into()?;
        apply_transition(&run, next, now)?;

        let row: RunRow = sqlx::query_as("update failover_runs set state = $2, updated_at = $3 where id = $1 returning *")
            .bind(run_id)
            .bind(next.as_str())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        row.try_into()
    }
}

fn apply_transition(run: &FailoverRun, next: FailoverState, now: DateTime<Utc>) -> Result<()> {
    if !run.state.can_transition_to(next) {
        return Err(NexusError::Conflict { reason: format!("cannot transition failover run from {:?} to {:?}", run.state, next) });
    }
    if now - run.updated_at < TRANSITION_COOLDOWN {
        return Err(NexusError::Conflict { reason: "failover transition cooldown has not elapsed".into() });
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryFailoverStore {
    runs: Mutex<Vec<FailoverRun>>,
}

impl InMemoryFailoverStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailoverStore for InMemoryFailoverStore {
    async fn start(&self, region_id: &RegionId, now: DateTime<Utc>) -> Result<FailoverRun> {
        let mut runs = self.runs.lock().unwrap();
        if runs.iter().any(|r| !r.state.is_terminal()) {
            return Err(NexusError::Conflict { reason: "a failover run is already in flight".into() });
        }
        let run = FailoverRun { id: Uuid::new_v4().to_string(), region_id: region_id.clone(), state: FailoverState::FreezeWrites, started_at: now, updated_at: now };
        runs.push(run.clone());
        Ok(run)
    }

    async fn active(&self) -> Result<Option<FailoverRun>> {
        Ok(self.runs.lock().unwrap().iter().find(|r| !r.state.is_terminal()).cloned())
    }

    async fn transition(&self, run_id: &str, next: FailoverState, now: DateTime<Utc>) -> Result<FailoverRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.iter_mut().find(|r| r.id == run_id).ok_or_else(|| NexusError::NotFound { resource_type: "failover_run".into(), resource_id: run_id.into() })?;
        apply_transition(run, next, now)?;
        run.state = next;
        run.updated_at = now;
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_start_while_one_is_in_flight_is_a_conflict() {
        let store = InMemoryFailoverStore::new();
        let now = Utc::now();
        store.start(&RegionId::new("us-east-1"), now).await.unwrap();
        let err = store.start(&RegionId::new("us-west-2"), now).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn transition_before_cooldown_elapses_is_rejected() {
        let store = InMemoryFailoverStore::new();
        let now = Utc::now();
        let run = store.start(&RegionId::new("us-east-1"), now).await.unwrap();
        let err = store.transition(&run.id, FailoverState::Precheck, now + Duration::seconds(1)).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn transition_after_cooldown_succeeds() {
        let store = InMemoryFailoverStore::new();
        let now = Utc::now();
        let run = store.start(&RegionId::new("us-east-1"), now).await.unwrap();
        let later = now + TRANSITION_COOLDOWN + Duration::seconds(1);
        let updated = store.transition(&run.id, FailoverState::Precheck, later).await.unwrap();
        assert_eq!(updated.state, FailoverState::Precheck);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_even_after_cooldown() {
        let store = InMemoryFailoverStore::new();
        let now = Utc::now();
        let run = store.start(&RegionId::new("us-east-1"), now).await.unwrap();
        let later = now + TRANSITION_COOLDOWN + Duration::seconds(1);
        let err = store.transition(&run.id, FailoverState::Completed, later).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn completed_run_frees_the_single_in_flight_slot() {
        let store = InMemoryFailoverStore::new();
        let now = Utc::now();
        let run = store.start(&RegionId::new("us-east-1"), now).await.unwrap();
        let mut t = now;
        for next in [FailoverState::Precheck, FailoverState::Promoting, FailoverState::Verification, FailoverState::Completed] {
            t += TRANSITION_COOLDOWN + Duration::seconds(1);
            store.transition(&run.id, next, t).await.unwrap();
        }
        assert!(store.active().await.unwrap().is_none());
        store.start(&RegionId::new("us-west-2"), t).await.unwrap();
    }
}
