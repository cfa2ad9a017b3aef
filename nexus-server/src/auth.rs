//! Resolves an inbound request into a `Principal`: either a verified API key
//! or, when `AUTH_DEV_BYPASS` is set, the header-declared dev identity.

use axum::http::HeaderMap;
use nexus_authz::api_key::{prefix_of, verify};
use nexus_authz::dev_bypass_principal;
use nexus_core::context::Principal;
use nexus_core::ids::SubjectId;
use nexus_core::{NexusError, Result};

use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

pub async fn resolve_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal> {
    if state.config.auth_dev_bypass {
        if let Some(principal) = dev_bypass_principal(true, header_str(headers, "x-tenant-id"), header_str(headers, "x-role")) {
            return Ok(principal);
        }
    }

    let token = bearer_token(headers).ok_or(NexusError::Unauthorized)?;
    let prefix = prefix_of(token);
    let candidates = state.api_keys.list_by_prefix(&prefix).await?;
    let key = candidates
        .into_iter()
        .find(|candidate| !candidate.is_revoked() && verify(token, candidate.key_id.as_str(), &candidate.hash))
        .ok_or(NexusError::Unauthorized)?;

    state.api_keys.touch_last_used(&key.key_id).await.ok();

    Ok(Principal {
        tenant_id: key.tenant_id,
        role: key.role,
        api_key_id: key.key_id.clone(),
        subject_id: SubjectId::new(key.key_id.as_str()),
    })
}
