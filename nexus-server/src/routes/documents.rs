//! `/v1/documents` (spec §4.10, §4.13 ingest surface).

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nexus_authz::RouteScope;
use nexus_core::context::RouteClass;
use nexus_core::ids::{CorpusId, DocumentId, JobId};
use nexus_core::model::{ContentType, Document, DocumentStatus};
use nexus_core::NexusError;
use nexus_gate::rate_limit::Scope as RateScope;
use serde::{Deserialize, Serialize};

use crate::admission;
use crate::envelope::{accepted, ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

/// Body returned by the three ingest-mutation routes (spec §4.10, §6):
/// enqueuing work never returns the full document, only enough to poll it.
#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub job_id: Option<JobId>,
    pub status_url: String,
}

impl From<Document> for IngestAccepted {
    fn from(document: Document) -> Self {
        let status_url = format!("/v1/documents/{}", document.id.as_str());
        IngestAccepted { document_id: document.id, status: document.status, job_id: document.last_job_id, status_url }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents).post(upload_document))
        .route("/documents/text", post(ingest_text))
        .route("/documents/{id}", delete(delete_document))
        .route("/documents/{id}/reindex", post(reindex_document))
}

fn content_type_from(value: &str) -> Result<ContentType, NexusError> {
    match value {
        "text/plain" => Ok(ContentType::TextPlain),
        "text/markdown" => Ok(ContentType::TextMarkdown),
        "application/json-text" => Ok(ContentType::ApplicationJsonText),
        other => Err(NexusError::InvalidRequest { reason: format!("unsupported content_type {other}") }),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub corpus_id: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(nexus_core::ids::RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::DocumentsRead).map_err(bind.clone())?;

    let corpus_id = query.corpus_id.map(CorpusId::new);
    let documents = state.documents.list(&identity.principal.tenant_id, corpus_id.as_ref()).await.map_err(bind)?;
    Ok(ok(identity.request_id, documents))
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentBody {
    pub corpus_id: String,
    pub filename: String,
    pub content_type: String,
    /// Base64-encoded raw bytes; decoded then normalized to text by the
    /// ingest worker's chunker.
    pub content_base64: String,
}

pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UploadDocumentBody>,
) -> Result<(StatusCode, Json<Envelope<IngestAccepted>>), ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(nexus_core::ids::RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::DocumentsWrite).map_err(bind.clone())?;

    let tenant_id = identity.principal.tenant_id.clone();
    admission::require_unfrozen(&state, &tenant_id).map_err(bind.clone())?;
    let (_tenant, plan) = admission::tenant_and_plan(&state, &tenant_id).await.map_err(bind.clone())?;

    let limits = admission::default_bucket_limits(RouteClass::Mutation);
    admission::admit_rate_limit(&state, RateScope::ApiKey, RouteClass::Mutation, identity.principal.api_key_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_rate_limit(&state, RateScope::Tenant, RouteClass::Mutation, tenant_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_quota(&state, &tenant_id, &plan, 1, 0).await.map_err(bind.clone())?;

    let content_type = content_type_from(&body.content_type).map_err(bind.clone())?;
    let bytes = BASE64
        .decode(body.content_base64.as_bytes())
        .map_err(|e| NexusError::InvalidRequest { reason: format!("invalid base64: {e}") })
        .map_err(bind.clone())?;
    let raw_text = String::from_utf8(bytes).map_err(|e| NexusError::InvalidRequest { reason: e.to_string() }).map_err(bind.clone())?;

    let corpus_id = CorpusId::new(body.corpus_id);
    let document = state
        .ingest_pipeline
        .enqueue_upload(&tenant_id, &corpus_id, &body.filename, content_type, raw_text)
        .await
        .map_err(bind)?;
    Ok(accepted(identity.request_id, IngestAccepted::from(document)))
}

#[derive(Debug, Deserialize)]
pub struct IngestTextBody {
    pub corpus_id: String,
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub overwrite: bool,
}

pub async fn ingest_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<IngestTextBody>,
) -> Result<(StatusCode, Json<Envelope<IngestAccepted>>), ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(nexus_core::ids::RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::DocumentsWrite).map_err(bind.clone())?;

    let tenant_id = identity.principal.tenant_id.clone();
    admission::require_unfrozen(&state, &tenant_id).map_err(bind.clone())?;
    let (_tenant, plan) = admission::tenant_and_plan(&state, &tenant_id).await.map_err(bind.clone())?;
    let limits = admission::default_bucket_limits(RouteClass::Mutation);
    admission::admit_rate_limit(&state, RateScope::ApiKey, RouteClass::Mutation, identity.principal.api_key_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_rate_limit(&state, RateScope::Tenant, RouteClass::Mutation, tenant_id.as_str(), limits).await.map_err(bind.clone())?;
    admission::admit_quota(&state, &tenant_id, &plan, 1, 0).await.map_err(bind.clone())?;

    let document = state
        .ingest_pipeline
        .enqueue_text(&tenant_id, &CorpusId::new(body.corpus_id), &DocumentId::new(body.document_id), body.text, body.overwrite)
        .await
        .map_err(bind)?;
    Ok(accepted(identity.request_id, IngestAccepted::from(document)))
}

pub async fn reindex_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReindexBody>,
) -> Result<(StatusCode, Json<Envelope<IngestAccepted>>), ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(nexus_core::ids::RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::DocumentsWrite).map_err(bind.clone())?;

    let tenant_id = identity.principal.tenant_id.clone();
    admission::require_unfrozen(&state, &tenant_id).map_err(bind.clone())?;

    let document = state.ingest_pipeline.enqueue_reindex(&tenant_id, &DocumentId::new(id), body.text).await.map_err(bind)?;
    Ok(accepted(identity.request_id, IngestAccepted::from(document)))
}

#[derive(Debug, Deserialize)]
pub struct ReindexBody {
    pub text: String,
}

pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Envelope<serde_json::Value>>, ApiError> {
    let identity = authenticate(&state, &headers).await.map_err(|e| ApiError::new(nexus_core::ids::RequestId::generate(), e))?;
    let bind = crate::envelope::bind(identity.request_id.clone());
    require_scope(&identity.principal, RouteScope::DocumentsWrite).map_err(bind.clone())?;

    let tenant_id = identity.principal.tenant_id.clone();
    admission::require_unfrozen(&state, &tenant_id).map_err(bind.clone())?;

    let document_id = DocumentId::new(id);
    let document = state.documents.get(&tenant_id, &document_id).await.map_err(bind.clone())?;
    if state.legal_holds.is_covered(&tenant_id, "document", document.id.as_str()).await.map_err(bind.clone())? {
        return Err(bind(NexusError::LegalHoldActive));
    }
    state.ingest_pipeline.delete(&tenant_id, &document_id).await.map_err(bind)?;
    Ok(ok(identity.request_id, serde_json::json!({ "deleted": true })))
}
