//! RBAC role gate (spec §6 role matrix): `reader` reads, `editor` mutates
//! documents/corpora, `admin` reaches ops/audit/admin surfaces. `admin` does
//! not implicitly bypass document ACLs.

use nexus_core::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    Run,
    DocumentsRead,
    DocumentsWrite,
    CorporaRead,
    CorporaWrite,
    Ops,
    Audit,
    Admin,
}

pub fn role_allows(role: Role, scope: RouteScope) -> bool {
    use Role::*;
    use RouteScope::*;
    match (role, scope) {
        (_, Run) => true,
        (_, DocumentsRead) | (_, CorporaRead) => true,
        (Editor, DocumentsWrite) | (Admin, DocumentsWrite) => true,
        (Editor, CorporaWrite) | (Admin, CorporaWrite) => true,
        (Admin, Ops) | (Admin, Audit) | (Admin, Admin) => true,
        (Reader, _) => false,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_cannot_mutate_documents() {
        assert!(!role_allows(Role::Reader, RouteScope::DocumentsWrite));
    }

    #[test]
    fn editor_can_mutate_documents_but_not_admin_surface() {
        assert!(role_allows(Role::Editor, RouteScope::DocumentsWrite));
        assert!(!role_allows(Role::Editor, RouteScope::Admin));
    }

    #[test]
    fn admin_reaches_ops_and_audit() {
        assert!(role_allows(Role::Admin, RouteScope::Ops));
        assert!(role_allows(Role::Admin, RouteScope::Audit));
    }

    #[test]
    fn everyone_can_read() {
        assert!(role_allows(Role::Reader, RouteScope::DocumentsRead));
        assert!(role_allows(Role::Reader, RouteScope::Run));
    }
}
