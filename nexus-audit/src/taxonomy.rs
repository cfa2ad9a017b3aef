//! Stable `event_type` strings referenced from outside this crate (spec
//! §4.11, §8.3 rate-limit fail-mode, §8.4 quota overage). Keeping them as
//! constants here, rather than letting each caller spell the string, is
//! what keeps `GET /audit/events?event_type=` filters from drifting from
//! what writers actually emit.

pub const AUTH_LOGIN_SUCCEEDED: &str = "auth.login.succeeded";
pub const AUTH_LOGIN_DENIED: &str = "auth.login.denied";
pub const AUTH_API_KEY_REVOKED: &str = "auth.api_key.revoked";

pub const DATA_DOCUMENT_INGESTED: &str = "data.document.ingested";
pub const DATA_DOCUMENT_DELETED: &str = "data.document.deleted";
pub const DATA_CORPUS_CREATED: &str = "data.corpus.created";

pub const SECURITY_AUTHZ_DENIED: &str = "security.authz.denied";
pub const SECURITY_POLICY_DENIED: &str = "security.policy.denied";

/// Emitted when the Redis-backed limiter is unreachable and the gate fails
/// open, degrading to the in-process limiter.
pub const SYSTEM_RATE_LIMIT_DEGRADED: &str = "system.rate_limit.degraded";
pub const SYSTEM_KILL_SWITCH_TOGGLED: &str = "system.kill_switch.toggled";

/// Emitted once a tenant crosses its soft cap, independent of whether the
/// hard cap is enforcing or merely observing.
pub const QUOTA_OVERAGE_OBSERVED: &str = "quota.overage_observed";
pub const QUOTA_HARD_CAP_BLOCKED: &str = "quota.hard_cap_blocked";

pub const BILLING_PLAN_CHANGED: &str = "billing.plan_changed";

pub const SELF_SERVE_API_KEY_CREATED: &str = "self_serve.api_key.created";
pub const SELF_SERVE_API_KEY_REVOKED: &str = "self_serve.api_key.revoked";

pub const PLAN_FEATURE_OVERRIDE_SET: &str = "plan.feature_override.set";

pub const GOVERNANCE_RETENTION_RUN_COMPLETED: &str = "governance.retention_run.completed";
pub const GOVERNANCE_LEGAL_HOLD_SET: &str = "governance.legal_hold.set";
pub const GOVERNANCE_LEGAL_HOLD_RELEASED: &str = "governance.legal_hold.released";
pub const GOVERNANCE_DSAR_CREATED: &str = "governance.dsar.created";
pub const GOVERNANCE_DSAR_APPROVED: &str = "governance.dsar.approved";
pub const GOVERNANCE_DSAR_COMPLETED: &str = "governance.dsar.completed";

pub const COMPLIANCE_EVIDENCE_BUNDLE_GENERATED: &str = "compliance.evidence_bundle.generated";

pub const IDENTITY_SCIM_USER_PROVISIONED: &str = "identity.scim.user_provisioned";
pub const IDENTITY_SSO_LOGIN: &str = "identity.sso.login";

pub const FAILOVER_TRANSITION: &str = "failover.transition";
pub const FAILOVER_PROMOTED: &str = "failover.promoted";
