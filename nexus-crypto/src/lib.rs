//! Envelope encryption, key registry, and rotation jobs (spec §4.12, C3).

pub mod envelope;
pub mod kms;
pub mod registry;
pub mod rotation;

pub use envelope::{open, seal, SealedRecord};
pub use kms::{KmsClient, LocalKms};
pub use registry::{CryptoKey, InMemoryKeyRegistry, KeyRegistry, KeyState, PgKeyRegistry};
pub use rotation::{InMemoryRotationStore, PgRotationStore, RotationJob, RotationStatus, RotationStore};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_crypto_keys", include_str!("../migrations/0001_crypto_keys.sql"))];
