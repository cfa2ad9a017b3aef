//! Retention, legal hold, and DSAR lifecycle (spec §4.14, C14).

pub mod dsar;
pub mod legal_hold;
pub mod retention;
pub mod targets;

pub use dsar::{approve, run, DsarKind, DsarRequest, DsarStatus, DsarStore, InMemoryDsarStore, PgDsarStore};
pub use legal_hold::{InMemoryLegalHoldStore, LegalHold, LegalHoldStore, PgLegalHoldStore};
pub use retention::{select_policy, RetentionAction, RetentionCounters, RetentionPolicy, RetentionRunner, RetentionTarget};
pub use targets::DocumentRetentionTarget;

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_governance", include_str!("../migrations/0001_governance.sql"))];
