//! Explicit request context passed through the middleware chain.
//!
//! Mirrors `adk_core::context::ReadonlyContext`: a single capsule of
//! identity, threaded by value rather than recovered from a global.

use crate::ids::{ApiKeyId, RequestId, SubjectId, TenantId};
use crate::model::Role;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Run,
    Mutation,
    Read,
    Ops,
}

impl RouteClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteClass::Run => "run",
            RouteClass::Mutation => "mutation",
            RouteClass::Read => "read",
            RouteClass::Ops => "ops",
        }
    }
}

/// The authenticated principal for a request (spec §4.2).
#[derive(Debug, Clone)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub role: Role,
    pub api_key_id: ApiKeyId,
    pub subject_id: SubjectId,
}

/// Per-request context threaded through admission, handlers, and audit.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub principal: Principal,
    pub route_class: RouteClass,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    pub fn tenant_id(&self) -> &TenantId {
        &self.principal.tenant_id
    }
}
