//! Shared request-entry helpers: authenticate, assign a request id, and
//! check the RBAC/ABAC scope gate every handler needs before its own logic.

use axum::http::HeaderMap;
use chrono::Utc;
use nexus_authz::{authorize, RouteScope};
use nexus_core::context::Principal;
use nexus_core::ids::{RequestId, TenantId};
use nexus_core::Result;

use crate::auth::resolve_principal;
use crate::state::AppState;

pub struct Identity {
    pub principal: Principal,
    pub request_id: RequestId,
}

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity> {
    let principal = resolve_principal(state, headers).await?;
    Ok(Identity { principal, request_id: RequestId::generate() })
}

/// Authorizes a request against its own tenant's resources with no
/// document ACL or ABAC policy attached; used by routes that don't guard
/// an individual document.
pub fn require_scope(principal: &Principal, scope: RouteScope) -> Result<()> {
    let tenant = principal.tenant_id.clone();
    authorize(principal, &tenant, scope, None, None, Utc::now())
}

/// Authorizes against a resource that belongs to a possibly different
/// tenant (defensive: every lookup is still scoped by `tenant_id` at the
/// repository layer, this only double-checks the boundary once more).
pub fn require_scope_for_tenant(principal: &Principal, resource_tenant: &TenantId, scope: RouteScope) -> Result<()> {
    authorize(principal, resource_tenant, scope, None, None, Utc::now())
}
