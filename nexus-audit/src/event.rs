//! Audit event model and the central taxonomy (spec §4.11).
//!
//! Every writer goes through [`AuditEvent::new`] so that metadata redaction
//! is never optional — there is no constructor that skips it.

use chrono::{DateTime, Utc};
use nexus_core::ids::{RequestId, TenantId};
use nexus_core::redact::redact;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse category an `event_type` belongs to. Not persisted as its own
/// column — folded into `event_type`'s dotted prefix (`auth.login`,
/// `quota.overage_observed`) — but kept here as the one place the full
/// taxonomy is enumerated so a caller can't typo a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Auth,
    DataOps,
    Security,
    System,
    Quota,
    Billing,
    SelfServe,
    Plan,
    Governance,
    Compliance,
    Identity,
    Failover,
}

impl EventCategory {
    pub fn prefix(self) -> &'static str {
        match self {
            EventCategory::Auth => "auth",
            EventCategory::DataOps => "data",
            EventCategory::Security => "security",
            EventCategory::System => "system",
            EventCategory::Quota => "quota",
            EventCategory::Billing => "billing",
            EventCategory::SelfServe => "self_serve",
            EventCategory::Plan => "plan",
            EventCategory::Governance => "governance",
            EventCategory::Compliance => "compliance",
            EventCategory::Identity => "identity",
            EventCategory::Failover => "failover",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    ApiKey,
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Denied,
    Error,
}

/// A single stored audit record. Field list matches spec §4.11 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub tenant_id: TenantId,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub actor_role: Option<String>,
    pub event_type: String,
    pub outcome: Outcome,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub request_id: Option<RequestId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Value,
    pub error_code: Option<String>,
}

/// Fields needed to record an event; `id` and `occurred_at` are assigned by
/// the store.
pub struct NewAuditEvent {
    pub tenant_id: TenantId,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub actor_role: Option<String>,
    pub event_type: String,
    pub outcome: Outcome,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub request_id: Option<RequestId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Value,
    pub error_code: Option<String>,
}

impl NewAuditEvent {
    /// Applies metadata redaction. Call this, not a struct literal, whenever
    /// metadata may carry tenant content (document text, secrets, tokens).
    pub fn redacted_metadata(mut self) -> Self {
        self.metadata = redact(&self.metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacted_metadata_strips_sensitive_keys() {
        let event = NewAuditEvent {
            tenant_id: TenantId::new("t1"),
            actor_type: ActorType::ApiKey,
            actor_id: "k1".into(),
            actor_role: Some("editor".into()),
            event_type: "data.document.ingested".into(),
            outcome: Outcome::Success,
            resource_type: Some("document".into()),
            resource_id: Some("d1".into()),
            request_id: None,
            ip_address: None,
            user_agent: None,
            metadata: json!({"text": "the quick brown fox", "bytes": 42}),
            error_code: None,
        }
        .redacted_metadata();
        assert_eq!(event.metadata["text"], json!("[REDACTED]"));
        assert_eq!(event.metadata["bytes"], json!(42));
    }
}
