//! `POST /v1/run` (spec §4.9): the only SSE route. Runs the full admission
//! chain, then hands off to `nexus_run::RunEngine` and frames its output.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::Event;
use axum::response::Sse;
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use nexus_authz::RouteScope;
use nexus_core::context::RouteClass;
use nexus_core::ids::{CorpusId, RequestId, SessionId};
use nexus_gate::rate_limit::Scope as RateScope;
use nexus_run::RunRequest;
use serde::Deserialize;
use std::convert::Infallible;

use crate::admission;
use crate::envelope::ApiError;
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/run", post(run))
}

#[derive(Debug, Deserialize)]
pub struct RunBody {
    pub session_id: String,
    pub corpus_id: String,
    pub query: String,
    #[serde(default)]
    pub top_k: u32,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub want_audio: bool,
}

pub async fn run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RunBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    let request_id = identity.request_id.clone();
    let bind = crate::envelope::bind(request_id.clone());

    require_scope(&identity.principal, RouteScope::Run).map_err(bind.clone())?;

    let tenant_id = identity.principal.tenant_id.clone();
    let (tenant, plan) = admission::tenant_and_plan(&state, &tenant_id).await.map_err(bind.clone())?;

    let corpus = state.corpora.get(&tenant_id, &CorpusId::new(body.corpus_id.clone())).await.map_err(bind.clone())?;
    admission::require_feature(&plan, &tenant, corpus.provider_config.feature_key()).map_err(bind.clone())?;
    admission::require_switch_enabled(&state, "run").map_err(bind.clone())?;
    admission::require_unfrozen(&state, &tenant_id).map_err(bind.clone())?;

    let limits = admission::default_bucket_limits(RouteClass::Run);
    admission::admit_rate_limit(&state, RateScope::ApiKey, RouteClass::Run, identity.principal.api_key_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_rate_limit(&state, RateScope::Tenant, RouteClass::Run, tenant_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_quota(&state, &tenant_id, &plan, 3, 0).await.map_err(bind.clone())?;
    let _permit = admission::admit_bulkhead(&state.run_bulkhead).map_err(bind.clone())?;

    let request = RunRequest {
        request_id: request_id.clone(),
        tenant_id,
        session_id: SessionId::new(body.session_id),
        corpus_id: corpus.id.clone(),
        provider_config: corpus.provider_config.clone(),
        query: body.query,
        top_k: body.top_k,
        debug_enabled: body.debug,
        want_audio: body.want_audio,
    };

    let (receiver, cancel_handle) = state.run_engine.execute(request).await.map_err(bind)?;
    Ok(crate::sse::stream_run(receiver, cancel_handle))
}
