//! Data subject access requests (spec §4.14): create -> optionally requires
//! approval -> run -> artifact. State transitions are themselves audit
//! events, emitted by the caller (this module returns the new state; it
//! does not hold an `AuditStore` itself, matching how `nexus-crypto::rotation`
//! keeps persistence and audit as separate concerns).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::ids::{DsarId, SubjectId, TenantId};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsarKind {
    Export,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsarStatus {
    PendingApproval,
    Approved,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DsarRequest {
    pub id: DsarId,
    pub tenant_id: TenantId,
    pub subject_id: SubjectId,
    pub kind: DsarKind,
    pub status: DsarStatus,
    pub requires_approval: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DsarRequest {
    pub fn new(tenant_id: TenantId, subject_id: SubjectId, kind: DsarKind, requires_approval: bool) -> Self {
        Self {
            id: DsarId::generate(),
            tenant_id,
            subject_id,
            kind,
            status: if requires_approval { DsarStatus::PendingApproval } else { DsarStatus::Approved },
            requires_approval,
            approved_at: None,
            approved_by: None,
            completed_at: None,
            artifact_uri: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DsarStore: Send + Sync {
    async fn insert(&self, request: DsarRequest) -> Result<DsarRequest>;
    async fn get(&self, tenant_id: &TenantId, id: &DsarId) -> Result<DsarRequest>;
    async fn update(&self, request: DsarRequest) -> Result<DsarRequest>;
    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<DsarRequest>>;
}

/// Approves a pending-approval request. Returns `409 DSAR_REQUIRES_APPROVAL`
/// if called on a request that doesn't need it (nothing to approve) and is
/// already past that state, and `404 DSAR_NOT_FOUND` is the store's to raise
/// via `get`.
pub async fn approve(store: &dyn DsarStore, tenant_id: &TenantId, id: &DsarId, approved_by: impl Into<String>) -> Result<DsarRequest> {
    let mut request = store.get(tenant_id, id).await?;
    if request.status != DsarStatus::PendingApproval {
        return Err(NexusError::Conflict { reason: "dsar request is not pending approval".into() });
    }
    request.status = DsarStatus::Approved;
    request.approved_at = Some(Utc::now());
    request.approved_by = Some(approved_by.into());
    store.update(request).await
}

/// Runs an approved request, producing an artifact for `export` kinds.
/// Rejects anything not yet approved with `409 DSAR_REQUIRES_APPROVAL`.
pub async fn run(store: &dyn DsarStore, tenant_id: &TenantId, id: &DsarId, artifact_uri_for_export: impl Into<String>) -> Result<DsarRequest> {
    let mut request = store.get(tenant_id, id).await?;
    if request.status != DsarStatus::Approved {
        return Err(NexusError::DsarRequiresApproval);
    }
    request.status = DsarStatus::Running;
    request = store.update(request).await?;

    request.status = DsarStatus::Completed;
    request.completed_at = Some(Utc::now());
    if request.kind == DsarKind::Export {
        request.artifact_uri = Some(artifact_uri_for_export.into());
    }
    store.update(request).await
}

fn kind_str(kind: DsarKind) -> &'static str {
    match kind {
        DsarKind::Export => "export",
        DsarKind::Delete => "delete",
    }
}

fn parse_kind(s: &str) -> Result<DsarKind> {
    match s {
        "export" => Ok(DsarKind::Export),
        "delete" => Ok(DsarKind::Delete),
        other => Err(NexusError::Internal(format!("unknown dsar kind {other}"))),
    }
}

fn status_str(status: DsarStatus) -> &'static str {
    match status {
        DsarStatus::PendingApproval => "pending_approval",
        DsarStatus::Approved => "approved",
        DsarStatus::Running => "running",
        DsarStatus::Completed => "completed",
        DsarStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<DsarStatus> {
    match s {
        "pending_approval" => Ok(DsarStatus::PendingApproval),
        "approved" => Ok(DsarStatus::Approved),
        "running" => Ok(DsarStatus::Running),
        "completed" => Ok(DsarStatus::Completed),
        "failed" => Ok(DsarStatus::Failed),
        other => Err(NexusError::Internal(format!("unknown dsar status {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct DsarRow {
    id: String,
    tenant_id: String,
    subject_id: String,
    kind: String,
    status: String,
    requires_approval: bool,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    artifact_uri: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DsarRow> for DsarRequest {
    type Error = NexusError;

    fn try_from(row: DsarRow) -> Result<Self> {
        Ok(DsarRequest {
            id: DsarId::new(row.id),
            tenant_id: TenantId::new(row.tenant_id),
            subject_id: SubjectId::new(row.subject_id),
            kind: parse_kind(&row.kind)?,
            status: parse_status(&row.status)?,
            requires_approval: row.requires_approval,
            approved_at: row.approved_at,
            approved_by: row.approved_by,
            completed_at: row.completed_at,
            artifact_uri: row.artifact_uri,
            created_at: row.created_at,
        })
    }
}

pub struct PgDsarStore {
    pool: PgPool,
}

impl PgDsarStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DsarStore for PgDsarStore {
    async fn insert(&self, request: DsarRequest) -> Result<DsarRequest> {
        sqlx::query(
            "insert into dsar_requests (id, tenant_id, subject_id, kind, status, requires_approval, created_at) \
             values ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(request.id.as_str())
        .bind(request.tenant_id.as_str())
        .bind(request.subject_id.as_str())
        .bind(kind_str(request.kind))
        .bind(status_str(request.status))
        .bind(request.requires_approval)
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(request)
    }

    async fn get(&self, tenant_id: &TenantId, id: &DsarId) -> Result<DsarRequest> {
        let row: DsarRow = sqlx::query_as("select * from dsar_requests where tenant_id = $1 and id = $2")
            .bind(tenant_id.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?
            .ok_or(NexusError::DsarNotFound)?;
        row.try_into()
    }

    async fn update(&self, request: DsarRequest) -> Result<DsarRequest> {
        sqlx::query(
            "update dsar_requests set status = $3, approved_at = $4, approved_by = $5, completed_at = $6, artifact_uri = $7 \
             where tenant_id = $1 and id = $2",
        )
        .bind(request.tenant_id.as_str())
        .bind(request.id.as_str())
        .bind(status_str(request.status))
        .bind(request.approved_at)
        .bind(&request.approved_by)
        .bind(request.completed_at)
        .bind(&request.artifact_uri)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(request)
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<DsarRequest>> {
        let rows: Vec<DsarRow> = sqlx::query_as("select * from dsar_requests where tenant_id = $1 order by created_at desc")
            .bind(tenant_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(DsarRequest::try_from).collect()
    }
}

#[derive(Default)]
pub struct InMemoryDsarStore {
    requests: RwLock<Vec<DsarRequest>>,
}

impl InMemoryDsarStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DsarStore for InMemoryDsarStore {
    async fn insert(&self, request: DsarRequest) -> Result<DsarRequest> {
        self.requests.write().unwrap().push(request.clone());
        Ok(request)
    }

    async fn get(&self, tenant_id: &TenantId, id: &DsarId) -> Result<DsarRequest> {
        self.requests
            .read()
            .unwrap()
            .iter()
            .find(|r| &r.tenant_id == tenant_id && &r.id == id)
            .cloned()
            .ok_or(NexusError::DsarNotFound)
    }

    async fn update(&self, request: DsarRequest) -> Result<DsarRequest> {
        let mut requests = self.requests.write().unwrap();
        let existing = requests
            .iter_mut()
            .find(|r| r.tenant_id == request.tenant_id && r.id == request.id)
            .ok_or(NexusError::DsarNotFound)?;
        *existing = request.clone();
        Ok(request)
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<DsarRequest>> {
        Ok(self.requests.read().unwrap().iter().filter(|r| &r.tenant_id == tenant_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_requiring_approval_cannot_run_before_approval() {
        let store = InMemoryDsarStore::new();
        let tenant = TenantId::new("t1");
        let request = store.insert(DsarRequest::new(tenant.clone(), SubjectId::new("s1"), DsarKind::Export, true)).await.unwrap();
        let err = run(&store, &tenant, &request.id, "s3://bucket/artifact").await.unwrap_err();
        assert_eq!(err.code(), "DSAR_REQUIRES_APPROVAL");
    }

    #[tokio::test]
    async fn approve_then_run_produces_an_artifact_for_export() {
        let store = InMemoryDsarStore::new();
        let tenant = TenantId::new("t1");
        let request = store.insert(DsarRequest::new(tenant.clone(), SubjectId::new("s1"), DsarKind::Export, true)).await.unwrap();
        approve(&store, &tenant, &request.id, "admin-1").await.unwrap();
        let completed = run(&store, &tenant, &request.id, "s3://bucket/artifact").await.unwrap();
        assert_eq!(completed.status, DsarStatus::Completed);
        assert_eq!(completed.artifact_uri.as_deref(), Some("s3://bucket/artifact"));
    }

    #[tokio::test]
    async fn request_not_requiring_approval_starts_approved() {
        let request = DsarRequest::new(TenantId::new("t1"), SubjectId::new("s1"), DsarKind::Delete, false);
        assert_eq!(request.status, DsarStatus::Approved);
    }

    #[tokio::test]
    async fn unknown_request_id_is_dsar_not_found() {
        let store = InMemoryDsarStore::new();
        let tenant = TenantId::new("t1");
        let err = store.get(&tenant, &DsarId::generate()).await.unwrap_err();
        assert_eq!(err.code(), "DSAR_NOT_FOUND");
    }
}
