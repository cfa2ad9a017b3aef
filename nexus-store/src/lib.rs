//! Tenant-scoped relational persistence and vector index (spec §3, §C1).
//!
//! Every repository trait here follows the same shape: a `Pg*` implementation
//! backed by a runtime-checked `sqlx` query, and an `InMemory*` reference
//! implementation with an identical contract, used directly in unit tests
//! across the workspace — the pattern `adk_session::inmemory` establishes for
//! session storage.

pub mod chunks;
pub mod corpora;
pub mod documents;
pub mod idempotency;
pub mod pool;
pub mod quota;
pub mod sessions;
pub mod tenants;

pub use chunks::{ChunkRepository, InMemoryChunkRepository, PgChunkRepository};
pub use corpora::{CorpusRepository, InMemoryCorpusRepository, PgCorpusRepository};
pub use documents::{DocumentRepository, InMemoryDocumentRepository, PgDocumentRepository};
pub use idempotency::{IdempotencyLease, IdempotencyStore, InMemoryIdempotencyStore, PgIdempotencyStore};
pub use pool::connect_and_migrate;
pub use quota::{InMemoryQuotaStore, PgQuotaStore, QuotaStore};
pub use sessions::{InMemorySessionRepository, PgSessionRepository, SessionRepository};
pub use tenants::{ApiKeyRepository, InMemoryApiKeyRepository, InMemoryTenantRepository, PgApiKeyRepository, PgTenantRepository, TenantRepository};
