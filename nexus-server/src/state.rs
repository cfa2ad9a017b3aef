//! Application state: every repository, gate, and engine the route handlers
//! reach through. Built once in `main.rs` and cloned cheaply into every
//! request (every field is an `Arc`).

use nexus_audit::AuditStore;
use nexus_authz::{NonceStore, OidcProvider, Policy};
use nexus_compliance::SnapshotStore;
use nexus_core::config::NexusConfig;
use nexus_crypto::{KeyRegistry, KmsClient, RotationStore};
use nexus_failover::{FailoverStore, TokenStore};
use nexus_gate::idempotency_gate::IdempotencyGate;
use nexus_gate::kill_switch::{KillSwitches, WriteFreeze};
use nexus_gate::quota_gate::SoftCapAnnouncer;
use nexus_gate::rate_limit::RateLimiter;
use nexus_governance::{DsarStore, LegalHoldStore, RetentionRunner};
use nexus_ingest::IngestPipeline;
use nexus_queue::{Bulkhead, JobQueue};
use nexus_retrieval::RetrievalRouter;
use nexus_run::RunEngine;
use nexus_store::corpora::CorpusRepository;
use nexus_store::documents::DocumentRepository;
use nexus_store::idempotency::IdempotencyStore;
use nexus_store::quota::QuotaStore;
use nexus_store::sessions::SessionRepository;
use nexus_store::tenants::{ApiKeyRepository, TenantRepository};
use std::sync::Arc;
use std::sync::RwLock;

use crate::plans::PlanStore;

/// Percentage-canary registry for feature keys that aren't a plain on/off
/// switch; indexed as `feature_key -> rollout_pct`.
#[derive(Default)]
pub struct CanaryRegistry {
    pub percentages: RwLock<std::collections::HashMap<String, u8>>,
}

impl CanaryRegistry {
    pub fn percentages_snapshot(&self) -> std::collections::HashMap<String, u8> {
        self.percentages.read().unwrap().clone()
    }
}

/// In-memory ABAC policy registry; `/admin/authz/policies` mutates this,
/// `authorize()` reads a snapshot of it per request.
#[derive(Default)]
pub struct PolicyRegistry {
    pub policies: RwLock<Vec<Policy>>,
}

impl PolicyRegistry {
    pub fn snapshot(&self) -> Vec<Policy> {
        self.policies.read().unwrap().clone()
    }
}

/// Configured OIDC providers keyed by the `{provider_id}` path segment,
/// plus the shared short-TTL state-nonce store for the login round trip.
#[derive(Default)]
pub struct SsoRegistry {
    pub providers: std::collections::HashMap<String, OidcProvider>,
    pub nonces: NonceStore,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NexusConfig>,

    pub tenants: Arc<dyn TenantRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub corpora: Arc<dyn CorpusRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub quota: Arc<dyn QuotaStore>,
    pub idempotency_store: Arc<dyn IdempotencyStore>,
    pub plans: Arc<PlanStore>,

    pub rate_limiter: Arc<dyn RateLimiter>,
    pub idempotency_gate: Arc<IdempotencyGate>,
    pub soft_cap_announcer: Arc<SoftCapAnnouncer>,
    pub kill_switches: Arc<KillSwitches>,
    pub write_freeze: Arc<WriteFreeze>,
    pub canary: Arc<CanaryRegistry>,
    pub policies: Arc<PolicyRegistry>,

    pub retrieval_router: Arc<RetrievalRouter>,
    pub run_engine: Arc<RunEngine>,
    pub ingest_pipeline: Arc<IngestPipeline>,
    pub job_queue: Arc<dyn JobQueue>,
    pub run_bulkhead: Arc<Bulkhead>,
    pub ingest_bulkhead: Arc<Bulkhead>,

    pub audit: Arc<dyn AuditStore>,
    pub legal_holds: Arc<dyn LegalHoldStore>,
    pub retention_runner: Arc<RetentionRunner>,
    pub dsar: Arc<dyn DsarStore>,

    pub failover_store: Arc<dyn FailoverStore>,
    pub failover_tokens: Arc<dyn TokenStore>,

    pub compliance_snapshots: Arc<dyn SnapshotStore>,

    pub crypto_registry: Arc<dyn KeyRegistry>,
    pub crypto_kms: Arc<dyn KmsClient>,
    pub rotation_store: Arc<dyn RotationStore>,

    pub sso: Arc<SsoRegistry>,
}
