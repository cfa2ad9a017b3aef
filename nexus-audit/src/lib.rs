//! Central audit writer and admin query surface (spec §4.11, C9).
//!
//! Every crate that performs a tenant-visible action records one
//! [`event::NewAuditEvent`] through an `Arc<dyn repository::AuditStore>`.
//! Metadata redaction lives in `nexus_core::redact` and is applied by
//! [`event::NewAuditEvent::redacted_metadata`] before the event ever reaches
//! a writer, so there is no path where unredacted content is persisted.

pub mod event;
pub mod repository;
pub mod taxonomy;

pub use event::{ActorType, AuditEvent, EventCategory, NewAuditEvent, Outcome};
pub use repository::{AuditFilter, AuditStore, InMemoryAuditStore, PgAuditStore, MAX_PAGE_LIMIT};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_audit_events", include_str!("../migrations/0001_audit_events.sql"))];
