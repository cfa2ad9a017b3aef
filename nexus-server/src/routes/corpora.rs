//! `/v1/corpora` (spec §3).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use nexus_authz::RouteScope;
use nexus_core::ids::{CorpusId, RequestId};
use nexus_core::model::{Corpus, ProviderConfig};
use serde::Deserialize;

use crate::envelope::{ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/corpora", get(list_corpora).post(create_corpus))
        .route("/corpora/{id}", get(get_corpus).patch(patch_corpus))
}

async fn list_corpora(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Vec<Corpus>>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::CorporaRead).map_err(bind.clone())?;

    let corpora = state.corpora.list(&identity.principal.tenant_id).await.map_err(bind)?;
    Ok(ok(identity.request_id, corpora))
}

async fn get_corpus(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<Envelope<Corpus>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::CorporaRead).map_err(bind.clone())?;

    let corpus = state.corpora.get(&identity.principal.tenant_id, &CorpusId::new(id)).await.map_err(bind)?;
    Ok(ok(identity.request_id, corpus))
}

#[derive(Debug, Deserialize)]
pub struct CreateCorpusBody {
    pub name: String,
    #[serde(default)]
    pub provider_config: Option<ProviderConfig>,
}

async fn create_corpus(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCorpusBody>,
) -> Result<Json<Envelope<Corpus>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::CorporaWrite).map_err(bind.clone())?;

    let corpus = Corpus {
        id: CorpusId::generate(),
        tenant_id: identity.principal.tenant_id.clone(),
        name: body.name,
        provider_config: nexus_store::corpora::normalize_provider_config(body.provider_config),
        created_at: Utc::now(),
    };
    let corpus = state.corpora.upsert(corpus).await.map_err(bind)?;
    Ok(ok(identity.request_id, corpus))
}

#[derive(Debug, Deserialize)]
pub struct PatchCorpusBody {
    pub provider_config: ProviderConfig,
}

async fn patch_corpus(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PatchCorpusBody>,
) -> Result<Json<Envelope<Corpus>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::CorporaWrite).map_err(bind.clone())?;

    let corpus = state
        .corpora
        .patch_provider_config(&identity.principal.tenant_id, &CorpusId::new(id), body.provider_config)
        .await
        .map_err(bind)?;
    Ok(ok(identity.request_id, corpus))
}
