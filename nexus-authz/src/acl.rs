//! Document ACL evaluation (spec §4.2, §6): creators receive an implicit
//! `owner` grant; expired grants are ignored; permissions are ordered
//! `read < write < owner`.

use chrono::{DateTime, Utc};
use nexus_core::ids::SubjectId;
use nexus_core::model::{AclPermission, AclPrincipalType, DocumentAcl};

/// Highest active permission a subject holds over a document, or `None` if
/// no active grant exists and the subject isn't the creator.
pub fn effective_permission(
    grants: &[DocumentAcl],
    subject_id: &SubjectId,
    creator_id: Option<&SubjectId>,
    now: DateTime<Utc>,
) -> Option<AclPermission> {
    let mut best: Option<AclPermission> = if creator_id == Some(subject_id) { Some(AclPermission::Owner) } else { None };
    for grant in grants {
        if !grant.is_active(now) {
            continue;
        }
        let matches = match grant.principal_type {
            AclPrincipalType::ApiKey | AclPrincipalType::Role | AclPrincipalType::Tenant => grant.principal_id == subject_id.as_str(),
        };
        if matches && best.map(|b| grant.permission > b).unwrap_or(true) {
            best = Some(grant.permission);
        }
    }
    best
}

pub fn satisfies(held: Option<AclPermission>, required: AclPermission) -> bool {
    held.map(|h| h >= required).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ids::DocumentId;

    fn grant(principal: &str, permission: AclPermission, expires_at: Option<DateTime<Utc>>) -> DocumentAcl {
        DocumentAcl { document_id: DocumentId::new("d1"), principal_type: AclPrincipalType::ApiKey, principal_id: principal.into(), permission, expires_at }
    }

    #[test]
    fn creator_gets_implicit_owner_grant() {
        let subject = SubjectId::new("s1");
        let perm = effective_permission(&[], &subject, Some(&subject), Utc::now());
        assert_eq!(perm, Some(AclPermission::Owner));
    }

    #[test]
    fn expired_grant_is_ignored() {
        let subject = SubjectId::new("s1");
        let expired = grant("s1", AclPermission::Write, Some(Utc::now() - chrono::Duration::hours(1)));
        let perm = effective_permission(&[expired], &subject, None, Utc::now());
        assert_eq!(perm, None);
    }

    #[test]
    fn read_does_not_satisfy_write_requirement() {
        assert!(!satisfies(Some(AclPermission::Read), AclPermission::Write));
        assert!(satisfies(Some(AclPermission::Owner), AclPermission::Write));
    }
}
