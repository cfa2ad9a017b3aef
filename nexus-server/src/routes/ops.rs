//! `/v1/ops/*` (spec §6): always `200`, surfacing a `degraded` flag instead
//! of propagating an error envelope, so a dashboard can poll these without
//! its own error handling for partial outages.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use nexus_authz::RouteScope;
use nexus_core::ids::RequestId;
use nexus_failover::evaluate_readiness;
use serde_json::{json, Value};
use std::time::Duration;

use crate::envelope::{ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ops/health", get(health))
        .route("/ops/metrics", get(metrics))
        .route("/ops/ingestion", get(ingestion))
        .route("/ops/slo", get(slo))
        .route("/ops/dr/readiness", get(dr_readiness))
        .route("/ops/failover/status", get(failover_status))
        .route("/ops/governance/legal-holds", get(legal_holds))
        .route("/ops/compliance/snapshots", get(compliance_snapshots))
}

async fn admitted(state: &AppState, headers: &HeaderMap) -> Result<RequestId, ApiError> {
    let identity = authenticate(state, headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    require_scope(&identity.principal, RouteScope::Ops).map_err(crate::envelope::bind(identity.request_id.clone()))?;
    Ok(identity.request_id)
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    Ok(ok(request_id, json!({ "status": "ok", "degraded": false, "service": state.config.service_name })))
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    let queue_depth = state.job_queue.queue_depth(nexus_ingest::JOB_TYPE).await.unwrap_or(-1);
    Ok(ok(request_id, json!({ "degraded": queue_depth < 0, "ingest_queue_depth": queue_depth })))
}

async fn ingestion(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    match state.job_queue.queue_depth(nexus_ingest::JOB_TYPE).await {
        Ok(depth) => Ok(ok(request_id, json!({ "degraded": false, "queue_depth": depth }))),
        Err(e) => Ok(ok(request_id, json!({ "degraded": true, "error": e.to_string() }))),
    }
}

async fn slo(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    Ok(ok(
        request_id,
        json!({
            "degraded": false,
            "targets": {
                "run_p99_ms": 2000,
                "ingest_completion_p95_minutes": 15,
            }
        }),
    ))
}

async fn dr_readiness(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    let active = state.failover_store.active().await.unwrap_or(None);
    let readiness = evaluate_readiness(Duration::from_secs(0), Duration::from_secs(30), false, active.is_some());
    Ok(ok(request_id, json!({ "degraded": active.is_some(), "readiness": readiness })))
}

async fn failover_status(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    match state.failover_store.active().await {
        Ok(Some(run)) => Ok(ok(request_id, json!({ "degraded": true, "state": run.state.as_str(), "region_id": run.region_id }))),
        Ok(None) => Ok(ok(request_id, json!({ "degraded": false, "state": "idle" }))),
        Err(e) => Ok(ok(request_id, json!({ "degraded": true, "error": e.to_string() }))),
    }
}

async fn legal_holds(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    require_scope(&identity.principal, RouteScope::Ops).map_err(crate::envelope::bind(identity.request_id.clone()))?;
    match state.legal_holds.list_active(&identity.principal.tenant_id).await {
        Ok(holds) => Ok(ok(identity.request_id, json!({ "degraded": false, "holds": holds }))),
        Err(e) => Ok(ok(identity.request_id, json!({ "degraded": true, "error": e.to_string() }))),
    }
}

async fn compliance_snapshots(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let request_id = admitted(&state, &headers).await?;
    match state.compliance_snapshots.list_recent(10).await {
        Ok(snapshots) => Ok(ok(request_id, json!({ "degraded": false, "snapshots": snapshots.into_iter().map(|s| json!({
            "id": s.id,
            "generated_at": s.generated_at,
            "overall_status": s.overall_status,
            "bundle_uri": s.bundle_uri,
        })).collect::<Vec<_>>() }))),
        Err(e) => Ok(ok(request_id, json!({ "degraded": true, "error": e.to_string() }))),
    }
}
