//! Authorization decision order (spec §4.2, strict):
//! 1. tenant boundary, 2. kill-switch/maintenance gate (caller-side, `nexus-gate`),
//! 3. RBAC role gate, 4. document ACL, 5. ABAC policy evaluation.

use crate::abac::{evaluate, Env, Policy};
use crate::acl::{effective_permission, satisfies};
use crate::rbac::{role_allows, RouteScope};
use chrono::{DateTime, Utc};
use nexus_core::ids::SubjectId;
use nexus_core::model::{AclPermission, DocumentAcl};
use nexus_core::{NexusError, Result};
use nexus_core::context::Principal;

pub struct DocumentAuthzInput<'a> {
    pub subject_id: &'a SubjectId,
    pub creator_id: Option<&'a SubjectId>,
    pub grants: &'a [DocumentAcl],
    pub required: AclPermission,
}

pub struct AbacInput<'a> {
    pub policies: &'a [Policy],
    pub resource_type: &'a str,
    pub action: &'a str,
    pub env: &'a Env,
    pub default_deny: bool,
}

/// Runs steps 1, 3, 4, 5 of the decision order (step 2, the kill-switch
/// gate, is evaluated earlier in the admission chain by `nexus-gate`).
pub fn authorize(
    principal: &Principal,
    resource_tenant: &nexus_core::ids::TenantId,
    scope: RouteScope,
    document: Option<DocumentAuthzInput<'_>>,
    abac: Option<AbacInput<'_>>,
    now: DateTime<Utc>,
) -> Result<()> {
    if &principal.tenant_id != resource_tenant {
        return Err(NexusError::TenantMismatch);
    }
    if !role_allows(principal.role, scope) {
        return Err(NexusError::AuthzDenied);
    }
    if let Some(doc) = document {
        let held = effective_permission(doc.grants, doc.subject_id, doc.creator_id, now);
        if !satisfies(held, doc.required) {
            return Err(NexusError::AuthzDenied);
        }
    }
    if let Some(abac) = abac {
        if !evaluate(abac.policies, abac.resource_type, abac.action, abac.env, abac.default_deny) {
            return Err(NexusError::AuthzDenied);
        }
    }
    Ok(())
}

/// Development bypass (spec §4.2): only active when `AUTH_DEV_BYPASS=true`.
pub fn dev_bypass_principal(
    dev_bypass_enabled: bool,
    tenant_header: Option<&str>,
    role_header: Option<&str>,
) -> Option<Principal> {
    if !dev_bypass_enabled {
        return None;
    }
    let tenant_id = nexus_core::ids::TenantId::new(tenant_header?);
    let role = match role_header.unwrap_or("reader") {
        "editor" => nexus_core::model::Role::Editor,
        "admin" => nexus_core::model::Role::Admin,
        _ => nexus_core::model::Role::Reader,
    };
    Some(Principal {
        tenant_id,
        role,
        api_key_id: nexus_core::ids::ApiKeyId::new("dev-bypass"),
        subject_id: SubjectId::new("dev-bypass"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ids::{ApiKeyId, TenantId};
    use nexus_core::model::Role;

    fn principal(role: Role, tenant: &str) -> Principal {
        Principal { tenant_id: TenantId::new(tenant), role, api_key_id: ApiKeyId::new("k1"), subject_id: SubjectId::new("s1") }
    }

    #[test]
    fn cross_tenant_access_is_rejected_before_rbac() {
        let p = principal(Role::Admin, "t1");
        let err = authorize(&p, &TenantId::new("t2"), RouteScope::Admin, None, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");
    }

    #[test]
    fn reader_denied_document_write_scope() {
        let p = principal(Role::Reader, "t1");
        let err = authorize(&p, &TenantId::new("t1"), RouteScope::DocumentsWrite, None, None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "AUTHZ_DENIED");
    }

    #[test]
    fn admin_without_acl_grant_is_still_denied_document_read() {
        let p = principal(Role::Admin, "t1");
        let doc = DocumentAuthzInput { subject_id: &p.subject_id, creator_id: None, grants: &[], required: AclPermission::Read };
        let err = authorize(&p, &TenantId::new("t1"), RouteScope::DocumentsRead, Some(doc), None, Utc::now()).unwrap_err();
        assert_eq!(err.code(), "AUTHZ_DENIED");
    }

    #[test]
    fn dev_bypass_requires_flag_and_tenant_header() {
        assert!(dev_bypass_principal(false, Some("t1"), None).is_none());
        assert!(dev_bypass_principal(true, None, None).is_none());
        let principal = dev_bypass_principal(true, Some("t1"), Some("editor")).unwrap();
        assert_eq!(principal.role, Role::Editor);
    }
}
