//! `GET /v1/audit/events` (spec §4.11): admin-only, tenant-scoped, paginated.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use nexus_audit::{AuditEvent, AuditFilter, Outcome, MAX_PAGE_LIMIT};
use nexus_authz::RouteScope;
use nexus_core::ids::RequestId;
use serde::Deserialize;

use crate::envelope::{ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/audit/events", get(list_events))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub event_type: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: Option<String>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    MAX_PAGE_LIMIT
}

fn parse_outcome(s: &str) -> Option<Outcome> {
    match s {
        "success" => Some(Outcome::Success),
        "denied" => Some(Outcome::Denied),
        "error" => Some(Outcome::Error),
        _ => None,
    }
}

async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Envelope<Vec<AuditEvent>>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::Audit).map_err(bind.clone())?;

    let filter = AuditFilter {
        event_type: query.event_type,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
        outcome: query.outcome.as_deref().and_then(parse_outcome),
    };
    let events = state
        .audit
        .list(&identity.principal.tenant_id, &filter, query.offset, query.limit.min(MAX_PAGE_LIMIT))
        .await
        .map_err(bind)?;
    Ok(ok(identity.request_id, events))
}
