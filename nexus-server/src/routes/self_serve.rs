//! `/v1/self-serve/*` (spec §6): tenant-scoped API key lifecycle, usage, and
//! plan lookup. Every route is tenant-admin only and is pinned to the
//! caller's own tenant — there is no cross-tenant variant here, unlike
//! `routes::admin`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use nexus_authz::{api_key, RouteScope};
use nexus_core::ids::{ApiKeyId, RequestId};
use nexus_core::model::{ApiKey, QuotaPeriod, Role};
use nexus_core::NexusError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::{ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/self-serve/api-keys", post(create_api_key))
        .route("/self-serve/api-keys/{id}/revoke", post(revoke_api_key))
        .route("/self-serve/usage", get(usage))
        .route("/self-serve/plan", get(plan))
}

async fn tenant_admin(state: &AppState, headers: &HeaderMap) -> Result<(nexus_core::context::Principal, RequestId), ApiError> {
    let identity = authenticate(state, headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    require_scope(&identity.principal, RouteScope::Admin).map_err(crate::envelope::bind(identity.request_id.clone()))?;
    Ok((identity.principal, identity.request_id))
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyBody {
    pub role: RoleBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleBody {
    Reader,
    Editor,
    Admin,
}

/// Mints a new key and returns the plaintext secret exactly once; only the
/// hash and prefix are persisted.
async fn create_api_key(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateApiKeyBody>) -> Result<Json<Envelope<Value>>, ApiError> {
    let (principal, request_id) = tenant_admin(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());
    let role = match body.role {
        RoleBody::Reader => Role::Reader,
        RoleBody::Editor => Role::Editor,
        RoleBody::Admin => Role::Admin,
    };
    let key_id = ApiKeyId::generate();
    let secret = format!("nx_{}", uuid::Uuid::new_v4().simple());
    let hash = api_key::hash_secret(&secret, key_id.as_str());
    let key = ApiKey {
        key_id: key_id.clone(),
        tenant_id: principal.tenant_id.clone(),
        role,
        hash,
        prefix: api_key::prefix_of(&secret),
        created_at: Utc::now(),
        last_used_at: None,
        revoked_at: None,
    };
    state.api_keys.insert(key).await.map_err(bind)?;
    Ok(ok(request_id, json!({ "key_id": key_id, "secret": secret })))
}

async fn revoke_api_key(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<Envelope<Value>>, ApiError> {
    let (principal, request_id) = tenant_admin(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());
    let key_id = ApiKeyId::new(id);
    let key = state.api_keys.get(&key_id).await.map_err(bind.clone())?;
    if key.tenant_id != principal.tenant_id {
        return Err(ApiError::new(request_id, NexusError::TenantMismatch));
    }
    state.api_keys.revoke(&key_id).await.map_err(bind)?;
    Ok(ok(request_id, json!({ "key_id": key_id, "revoked": true })))
}

async fn usage(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let (principal, request_id) = tenant_admin(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());
    let now = Utc::now();
    let day = state.quota.get(&principal.tenant_id, QuotaPeriod::Day, now).await.map_err(bind.clone())?;
    let month = state.quota.get(&principal.tenant_id, QuotaPeriod::Month, now).await.map_err(bind)?;
    Ok(ok(
        request_id,
        json!({
            "day": { "used_requests": day.used_requests, "used_tokens": day.used_tokens },
            "month": { "used_requests": month.used_requests, "used_tokens": month.used_tokens },
        }),
    ))
}

async fn plan(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Value>>, ApiError> {
    let (principal, request_id) = tenant_admin(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());
    let tenant = state.tenants.get(&principal.tenant_id).await.map_err(bind.clone())?;
    let plan = state.plans.get(&tenant.plan_id).map_err(bind)?;
    Ok(ok(request_id, json!({ "plan": plan, "overrides": tenant.overrides })))
}
