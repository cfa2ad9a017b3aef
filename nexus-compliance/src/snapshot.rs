//! Snapshot persistence: records the result of one control-catalog
//! evaluation plus where its signed bundle lives, so `/ops/compliance/*`
//! can list history without re-reading every ZIP from blob storage.

use crate::catalog::{ControlResult, ControlStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub overall_status: ControlStatus,
    pub controls: Vec<ControlResult>,
    pub signature: String,
    pub bundle_uri: String,
}

impl SnapshotRecord {
    pub fn new(controls: Vec<ControlResult>, signature: String, bundle_uri: String, now: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4().to_string(), generated_at: now, overall_status: crate::catalog::overall_status(&controls), controls, signature, bundle_uri }
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn insert(&self, snapshot: SnapshotRecord) -> Result<SnapshotRecord>;
    async fn get(&self, id: &str) -> Result<SnapshotRecord>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<SnapshotRecord>>;
}

fn status_str(status: ControlStatus) -> &'static str {
    match status {
        ControlStatus::Pass => "pass",
        ControlStatus::Degraded => "degraded",
        ControlStatus::Fail => "fail",
    }
}

fn parse_status(s: &str) -> Result<ControlStatus> {
    match s {
        "pass" => Ok(ControlStatus::Pass),
        "degraded" => Ok(ControlStatus::Degraded),
        "fail" => Ok(ControlStatus::Fail),
        other => Err(NexusError::Internal(format!("unknown control status {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    generated_at: DateTime<Utc>,
    overall_status: String,
    controls: serde_json::Value,
    signature: String,
    bundle_uri: String,
}

impl TryFrom<SnapshotRow> for SnapshotRecord {
    type Error = NexusError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(SnapshotRecord {
            id: row.id,
            generated_at: row.generated_at,
            overall_status: parse_status(&row.overall_status)?,
            controls: serde_json::from_value(row.controls).map_err(|e| NexusError::Internal(e.to_string()))?,
            signature: row.signature,
            bundle_uri: row.bundle_uri,
        })
    }
}

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn insert(&self, snapshot: SnapshotRecord) -> Result<SnapshotRecord> {
        let controls = serde_json::to_value(&snapshot.controls).map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query("insert into compliance_snapshots (id, generated_at, overall_status, controls, signature, bundle_uri) values ($1,$2,$3,$4,$5,$6)")
            .bind(&snapshot.id)
            .bind(snapshot.generated_at)
            .bind(status_str(snapshot.overall_status))
            .bind(&controls)
            .bind(&snapshot.signature)
            .bind(&snapshot.bundle_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(snapshot)
    }

    async fn get(&self, id: &str) -> Result<SnapshotRecord> {
        let row: SnapshotRow = sqlx::query_as("select * from compliance_snapshots where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or_else(|| NexusError::NotFound { resource_type: "compliance_snapshot".into(), resource_id: id.into() })?;
        row.try_into()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SnapshotRecord>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as("select * from compliance_snapshots order by generated_at desc limit $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(SnapshotRecord::try_from).collect()
    }
}

#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<Vec<SnapshotRecord>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn insert(&self, snapshot: SnapshotRecord) -> Result<SnapshotRecord> {
        self.snapshots.write().unwrap().push(snapshot.clone());
        Ok(snapshot)
    }

    async fn get(&self, id: &str) -> Result<SnapshotRecord> {
        self.snapshots
            .read()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| NexusError::NotFound { resource_type: "compliance_snapshot".into(), resource_id: id.into() })
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SnapshotRecord>> {
        let mut snapshots = self.snapshots.read().unwrap().clone();
        snapshots.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(snapshots.into_iter().take(limit as usize).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ControlResult;

    fn record(status: ControlStatus) -> SnapshotRecord {
        let control = ControlResult { control_id: "CC6.1".into(), status, evidence_ref: "controls.json#CC6.1".into(), detail: None };
        SnapshotRecord::new(vec![control], "sig".into(), "s3://bucket/snap.zip".into(), Utc::now())
    }

    #[tokio::test]
    async fn overall_status_is_derived_from_controls_at_construction() {
        let snapshot = record(ControlStatus::Fail);
        assert_eq!(snapshot.overall_status, ControlStatus::Fail);
    }

    #[tokio::test]
    async fn list_recent_orders_newest_first() {
        let store = InMemorySnapshotStore::new();
        let first = store.insert(record(ControlStatus::Pass)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.insert(record(ControlStatus::Pass)).await.unwrap();
        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent[0].id, second.id);
        assert_eq!(recent[1].id, first.id);
    }
}
