//! Control catalog evaluation and signed evidence bundles (spec §4.15, C16).

pub mod bundle;
pub mod catalog;
pub mod snapshot;

pub use bundle::{build_bundle, verify_bundle, BundleInputs, EvidenceBundle, Manifest};
pub use catalog::{evaluate_catalog, overall_status, ControlResult, ControlSignal, ControlStatus, CONTROL_IDS};
pub use snapshot::{InMemorySnapshotStore, PgSnapshotStore, SnapshotRecord, SnapshotStore};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_compliance_snapshots", include_str!("../migrations/0001_compliance_snapshots.sql"))];
