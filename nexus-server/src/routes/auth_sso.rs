//! `/auth/sso/oidc/{provider_id}/*` (spec §6): browser-redirect OIDC login.
//! Unauthenticated by design — the whole point is to mint a principal.

use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use nexus_core::ids::RequestId;
use nexus_core::NexusError;
use serde::Deserialize;
use serde_json::json;

use crate::envelope::{ok, ApiError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/sso/oidc/{provider_id}/start", get(start))
        .route("/auth/sso/oidc/{provider_id}/callback", get(callback))
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    #[serde(default = "default_return_to")]
    pub return_to: String,
}

fn default_return_to() -> String {
    "/".to_string()
}

async fn start(State(state): State<AppState>, Path(provider_id): Path<String>, Query(query): Query<StartQuery>) -> Result<Redirect, ApiError> {
    let request_id = RequestId::generate();
    let provider = state
        .sso
        .providers
        .get(&provider_id)
        .ok_or_else(|| NexusError::NotFound { resource_type: "sso_provider".into(), resource_id: provider_id.clone() })
        .map_err(crate::envelope::bind(request_id.clone()))?;
    let login = nexus_authz::start_login(&state.sso.nonces, provider, &query.return_to, Utc::now());
    let redirect_url = format!("{}?state={}&redirect_uri=/auth/sso/oidc/{}/callback", provider.issuer, login.state, provider_id);
    Ok(Redirect::temporary(&redirect_url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    pub id_token: String,
}

async fn callback(
    State(state): State<AppState>,
    Path(provider_id): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request_id = RequestId::generate();
    let bind = crate::envelope::bind(request_id.clone());
    let provider = state
        .sso
        .providers
        .get(&provider_id)
        .ok_or_else(|| NexusError::NotFound { resource_type: "sso_provider".into(), resource_id: provider_id.clone() })
        .map_err(bind.clone())?;

    let outcome = nexus_authz::handle_callback(&state.sso.nonces, provider, &query.state, &query.id_token, Utc::now()).map_err(bind.clone())?;

    let key_id = nexus_core::ids::ApiKeyId::generate();
    let secret = format!("nx_{}", uuid::Uuid::new_v4().simple());
    let hash = nexus_authz::api_key::hash_secret(&secret, key_id.as_str());
    let key = nexus_core::model::ApiKey {
        key_id: key_id.clone(),
        tenant_id: outcome.tenant_id,
        role: outcome.role,
        hash,
        prefix: nexus_authz::api_key::prefix_of(&secret),
        created_at: Utc::now(),
        last_used_at: None,
        revoked_at: None,
    };
    state.api_keys.insert(key).await.map_err(bind)?;

    Ok(Json(json!({
        "subject": outcome.subject,
        "api_key_id": key_id,
        "api_key_secret": secret,
        "return_to": outcome.return_to,
    })))
}
