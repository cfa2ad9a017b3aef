//! `/scim/v2/Users` (spec §6): minimal SCIM 2.0 user provisioning.
//!
//! Nothing in the data model owns a standalone "user" concept — tenants
//! authenticate via API keys scoped to a role — so a SCIM `User` here maps
//! onto one API key: provisioning a user mints a key, deactivating one
//! revokes it. A directory doing just-in-time provisioning (Okta, Azure AD)
//! only needs exactly this surface.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use nexus_authz::RouteScope;
use nexus_core::ids::{ApiKeyId, RequestId};
use nexus_core::model::{ApiKey, Role};
use nexus_core::NexusError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::ApiError;
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scim/v2/Users", post(create_user))
        .route("/scim/v2/Users/{id}", get(get_user).patch(patch_user).delete(deactivate_user))
}

async fn scim_identity(state: &AppState, headers: &HeaderMap) -> Result<nexus_core::context::Principal, ApiError> {
    let identity = authenticate(state, headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    require_scope(&identity.principal, RouteScope::Admin).map_err(crate::envelope::bind(identity.request_id))?;
    Ok(identity.principal)
}

fn scim_role(value: &str) -> Role {
    match value {
        "admin" => Role::Admin,
        "editor" => Role::Editor,
        _ => Role::Reader,
    }
}

fn scim_user_resource(key: &ApiKey) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": key.key_id.as_str(),
        "userName": key.key_id.as_str(),
        "active": key.revoked_at.is_none(),
        "nexusRole": key.role.as_str(),
        "meta": { "resourceType": "User", "created": key.created_at.to_rfc3339() },
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    #[serde(default)]
    pub nexus_role: Option<String>,
}

async fn create_user(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateUserBody>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let principal = scim_identity(&state, &headers).await?;
    let request_id = RequestId::generate();
    let bind = crate::envelope::bind(request_id);
    let key_id = ApiKeyId::generate();
    let secret = format!("nx_{}", uuid::Uuid::new_v4().simple());
    let hash = nexus_authz::api_key::hash_secret(&secret, key_id.as_str());
    let key = ApiKey {
        key_id: key_id.clone(),
        tenant_id: principal.tenant_id,
        role: scim_role(body.nexus_role.as_deref().unwrap_or("reader")),
        hash,
        prefix: nexus_authz::api_key::prefix_of(&secret),
        created_at: Utc::now(),
        last_used_at: None,
        revoked_at: None,
    };
    let key = state.api_keys.insert(key).await.map_err(bind)?;
    let mut resource = scim_user_resource(&key);
    resource["secret"] = json!(secret);
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn get_user(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let principal = scim_identity(&state, &headers).await?;
    let request_id = RequestId::generate();
    let key = state.api_keys.get(&ApiKeyId::new(id)).await.map_err(crate::envelope::bind(request_id.clone()))?;
    if key.tenant_id != principal.tenant_id {
        return Err(ApiError::new(request_id, NexusError::TenantMismatch));
    }
    Ok(Json(scim_user_resource(&key)))
}

#[derive(Debug, Deserialize)]
pub struct PatchUserBody {
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub nexus_role: Option<String>,
}

async fn patch_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PatchUserBody>,
) -> Result<Json<Value>, ApiError> {
    let principal = scim_identity(&state, &headers).await?;
    let request_id = RequestId::generate();
    let bind = crate::envelope::bind(request_id.clone());
    let key_id = ApiKeyId::new(id);
    let key = state.api_keys.get(&key_id).await.map_err(bind.clone())?;
    if key.tenant_id != principal.tenant_id {
        return Err(ApiError::new(request_id, NexusError::TenantMismatch));
    }
    if body.nexus_role.is_some() {
        return Err(ApiError::new(request_id, NexusError::InvalidRequest { reason: "role changes require re-provisioning a new user".into() }));
    }
    if body.active == Some(false) {
        state.api_keys.revoke(&key_id).await.map_err(bind.clone())?;
    }
    let key = state.api_keys.get(&key_id).await.map_err(bind)?;
    Ok(Json(scim_user_resource(&key)))
}

async fn deactivate_user(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let principal = scim_identity(&state, &headers).await?;
    let request_id = RequestId::generate();
    let bind = crate::envelope::bind(request_id.clone());
    let key_id = ApiKeyId::new(id);
    let key = state.api_keys.get(&key_id).await.map_err(bind.clone())?;
    if key.tenant_id != principal.tenant_id {
        return Err(ApiError::new(request_id, NexusError::TenantMismatch));
    }
    state.api_keys.revoke(&key_id).await.map_err(bind)?;
    Ok(StatusCode::NO_CONTENT)
}
