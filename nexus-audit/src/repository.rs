//! Central audit writer and the admin query surface (spec §4.11).
//!
//! `PgAuditStore` and `InMemoryAuditStore` share one contract, the same
//! dual-impl shape every other `nexus-store` repository uses.

use crate::event::{ActorType, AuditEvent, NewAuditEvent, Outcome};
use async_trait::async_trait;
use chrono::Utc;
use nexus_core::ids::TenantId;
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::sync::Mutex;

/// Admin-query filter (spec §4.11: "tenant-scoped, paginated, filterable").
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: Option<Outcome>,
}

pub const MAX_PAGE_LIMIT: u32 = 200;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent>;
    async fn list(&self, tenant_id: &TenantId, filter: &AuditFilter, offset: u32, limit: u32) -> Result<Vec<AuditEvent>>;
}

fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_LIMIT)
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    occurred_at: chrono::DateTime<Utc>,
    tenant_id: String,
    actor_type: String,
    actor_id: String,
    actor_role: Option<String>,
    event_type: String,
    outcome: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    request_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    error_code: Option<String>,
}

fn actor_type_str(actor_type: ActorType) -> &'static str {
    match actor_type {
        ActorType::ApiKey => "api_key",
        ActorType::User => "user",
        ActorType::System => "system",
    }
}

fn parse_actor_type(value: &str) -> Result<ActorType> {
    match value {
        "api_key" => Ok(ActorType::ApiKey),
        "user" => Ok(ActorType::User),
        "system" => Ok(ActorType::System),
        other => Err(NexusError::Internal(format!("unknown actor_type: {other}"))),
    }
}

fn outcome_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "success",
        Outcome::Denied => "denied",
        Outcome::Error => "error",
    }
}

fn parse_outcome(value: &str) -> Result<Outcome> {
    match value {
        "success" => Ok(Outcome::Success),
        "denied" => Ok(Outcome::Denied),
        "error" => Ok(Outcome::Error),
        other => Err(NexusError::Internal(format!("unknown outcome: {other}"))),
    }
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = NexusError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEvent {
            id: row.id,
            occurred_at: row.occurred_at,
            tenant_id: TenantId::new(row.tenant_id),
            actor_type: parse_actor_type(&row.actor_type)?,
            actor_id: row.actor_id,
            actor_role: row.actor_role,
            event_type: row.event_type,
            outcome: parse_outcome(&row.outcome)?,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            request_id: row.request_id.map(nexus_core::ids::RequestId::new),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            metadata: row.metadata,
            error_code: row.error_code,
        })
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        let row: AuditRow = sqlx::query_as(
            "insert into audit_events \
             (tenant_id, actor_type, actor_id, actor_role, event_type, outcome, resource_type, resource_id, request_id, ip_address, user_agent, metadata, error_code) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) \
             returning id, occurred_at, tenant_id, actor_type, actor_id, actor_role, event_type, outcome, resource_type, resource_id, request_id, ip_address, user_agent, metadata, error_code",
        )
        .bind(event.tenant_id.as_str())
        .bind(actor_type_str(event.actor_type))
        .bind(&event.actor_id)
        .bind(&event.actor_role)
        .bind(&event.event_type)
        .bind(outcome_str(event.outcome))
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.request_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .bind(&event.error_code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        row.try_into()
    }

    async fn list(&self, tenant_id: &TenantId, filter: &AuditFilter, offset: u32, limit: u32) -> Result<Vec<AuditEvent>> {
        let limit = clamp_limit(limit);
        let rows: Vec<AuditRow> = sqlx::query_as(
            "select id, occurred_at, tenant_id, actor_type, actor_id, actor_role, event_type, outcome, resource_type, resource_id, request_id, ip_address, user_agent, metadata, error_code \
             from audit_events \
             where tenant_id = $1 \
               and ($2::text is null or event_type = $2) \
               and ($3::text is null or resource_type = $3) \
               and ($4::text is null or resource_id = $4) \
               and ($5::text is null or outcome = $5) \
             order by id desc \
             offset $6 limit $7",
        )
        .bind(tenant_id.as_str())
        .bind(&filter.event_type)
        .bind(&filter.resource_type)
        .bind(&filter.resource_id)
        .bind(filter.outcome.map(outcome_str))
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(AuditEvent::try_from).collect()
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    events: Mutex<Vec<AuditEvent>>,
    next_id: Mutex<i64>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let stored = AuditEvent {
            id: *next_id,
            occurred_at: Utc::now(),
            tenant_id: event.tenant_id,
            actor_type: event.actor_type,
            actor_id: event.actor_id,
            actor_role: event.actor_role,
            event_type: event.event_type,
            outcome: event.outcome,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            request_id: event.request_id,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            metadata: event.metadata,
            error_code: event.error_code,
        };
        self.events.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, tenant_id: &TenantId, filter: &AuditFilter, offset: u32, limit: u32) -> Result<Vec<AuditEvent>> {
        let limit = clamp_limit(limit);
        let events = self.events.lock().unwrap();
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| &e.tenant_id == tenant_id)
            .filter(|e| filter.event_type.as_ref().is_none_or(|want| &e.event_type == want))
            .filter(|e| filter.resource_type.as_ref().is_none_or(|want| e.resource_type.as_ref() == Some(want)))
            .filter(|e| filter.resource_id.as_ref().is_none_or(|want| e.resource_id.as_ref() == Some(want)))
            .filter(|e| filter.outcome.is_none_or(|want| e.outcome == want))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matched.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ActorType;
    use serde_json::json;

    fn new_event(tenant: &TenantId, event_type: &str) -> NewAuditEvent {
        NewAuditEvent {
            tenant_id: tenant.clone(),
            actor_type: ActorType::ApiKey,
            actor_id: "k1".into(),
            actor_role: Some("editor".into()),
            event_type: event_type.into(),
            outcome: Outcome::Success,
            resource_type: Some("document".into()),
            resource_id: Some("d1".into()),
            request_id: None,
            ip_address: None,
            user_agent: None,
            metadata: json!({}),
            error_code: None,
        }
    }

    #[tokio::test]
    async fn records_are_assigned_monotonically_increasing_ids() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new("t1");
        let first = store.record(new_event(&tenant, "data.document.ingested")).await.unwrap();
        let second = store.record(new_event(&tenant, "data.document.deleted")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn list_is_tenant_scoped_and_newest_first() {
        let store = InMemoryAuditStore::new();
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");
        store.record(new_event(&t1, "data.document.ingested")).await.unwrap();
        store.record(new_event(&t2, "data.document.ingested")).await.unwrap();
        store.record(new_event(&t1, "data.document.deleted")).await.unwrap();

        let page = store.list(&t1, &AuditFilter::default(), 0, 50).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].event_type, "data.document.deleted");
    }

    #[tokio::test]
    async fn limit_is_clamped_to_max_page_size() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new("t1");
        for _ in 0..5 {
            store.record(new_event(&tenant, "data.document.ingested")).await.unwrap();
        }
        let page = store.list(&tenant, &AuditFilter::default(), 0, 10_000).await.unwrap();
        assert_eq!(page.len(), 5);
    }

    #[tokio::test]
    async fn filter_by_event_type_narrows_results() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new("t1");
        store.record(new_event(&tenant, "data.document.ingested")).await.unwrap();
        store.record(new_event(&tenant, "data.document.deleted")).await.unwrap();
        let filter = AuditFilter { event_type: Some("data.document.deleted".into()), ..Default::default() };
        let page = store.list(&tenant, &filter, 0, 50).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].event_type, "data.document.deleted");
    }
}
