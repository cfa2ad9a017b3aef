//! Success/error response envelopes (spec §4.1, §6): every versioned JSON
//! response carries `{data, meta}` or `{error, meta}`; SSE responses are
//! framed separately in `sse.rs` and never wrapped here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nexus_core::ids::RequestId;
use nexus_core::NexusError;
use serde::Serialize;
use std::collections::HashMap;

pub const API_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub request_id: RequestId,
    pub api_version: &'static str,
}

impl Meta {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id, api_version: API_VERSION }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub data: T,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    pub meta: Meta,
}

/// Wraps a handler's success value with the request's `meta`; pairs with
/// `ApiError` to give every route the same `Result<Json<Envelope<T>>, ApiError>`
/// shape the run-engine and ingestion handlers return.
pub fn ok<T: Serialize>(request_id: RequestId, data: T) -> Json<Envelope<T>> {
    Json(Envelope { data, meta: Meta::new(request_id) })
}

/// Same envelope shape as `ok`, wrapped in `202 Accepted` for routes that
/// enqueue work instead of completing it synchronously (spec §4.10, §6).
pub fn accepted<T: Serialize>(request_id: RequestId, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::ACCEPTED, ok(request_id, data))
}

/// An error already bound to its HTTP status and request id, ready to be
/// returned directly from a handler via `?`/`From<NexusError>`.
pub struct ApiError {
    pub status: StatusCode,
    pub request_id: RequestId,
    pub error: NexusError,
}

impl ApiError {
    pub fn new(request_id: RequestId, error: NexusError) -> Self {
        Self { status: status_for(&error), request_id, error }
    }
}

fn status_for(error: &NexusError) -> StatusCode {
    match error {
        NexusError::Unauthorized => StatusCode::UNAUTHORIZED,
        NexusError::Forbidden { .. } | NexusError::AuthzDenied | NexusError::PolicyDenied { .. } | NexusError::FeatureNotEnabled { .. } => {
            StatusCode::FORBIDDEN
        }
        NexusError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        NexusError::RateLimitUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        NexusError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        NexusError::IdempotencyKeyConflict => StatusCode::CONFLICT,
        NexusError::InvalidCursor | NexusError::InvalidRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        NexusError::ServiceBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        NexusError::ServiceDisabled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        NexusError::WriteFrozen => StatusCode::SERVICE_UNAVAILABLE,
        NexusError::TenantMismatch => StatusCode::CONFLICT,
        NexusError::LegalHoldActive => StatusCode::CONFLICT,
        NexusError::DsarRequiresApproval => StatusCode::CONFLICT,
        NexusError::DsarNotFound => StatusCode::NOT_FOUND,
        NexusError::IntegrationUnavailable { .. } | NexusError::KmsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        NexusError::RetrievalProvider { .. } | NexusError::TtsError { .. } => StatusCode::BAD_GATEWAY,
        NexusError::EncryptionRequired | NexusError::KeyNotActive | NexusError::DecryptionFailed | NexusError::CryptoPolicyDenied { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        NexusError::KeyRotationInProgress => StatusCode::CONFLICT,
        NexusError::KeyRotationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        NexusError::Compliance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        NexusError::NotFound { .. } => StatusCode::NOT_FOUND,
        NexusError::Conflict { .. } => StatusCode::CONFLICT,
        NexusError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ErrorEnvelope {
                error: ErrorBody { code: self.error.code(), message: self.error.to_string(), details: self.error.details() },
                meta: Meta::new(self.request_id.clone()),
            }),
        )
            .into_response();

        if let NexusError::RateLimited { scope, route_class, retry_after_ms } = &self.error {
            let headers = response.headers_mut();
            insert_header(headers, "Retry-After", &(retry_after_ms / 1000).max(1).to_string());
            insert_header(headers, "X-RateLimit-Scope", scope);
            insert_header(headers, "X-RateLimit-Route-Class", route_class);
            insert_header(headers, "X-RateLimit-Retry-After-Ms", &retry_after_ms.to_string());
        }
        response.headers_mut().insert("X-Request-Id", self.request_id.as_str().parse().unwrap_or_else(|_| "invalid".parse().unwrap()));
        response
    }
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = value.parse() {
        headers.insert(name, v);
    }
}

/// Binds a bare `NexusError` to a request id; used at call sites that don't
/// already have an `ApiError` constructed, e.g. `store.get(..).map_err(bind(request_id))?`.
pub fn bind(request_id: RequestId) -> impl Fn(NexusError) -> ApiError + Clone {
    move |error| ApiError::new(request_id.clone(), error)
}
