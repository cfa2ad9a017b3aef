use nexus_audit::{AuditStore, InMemoryAuditStore, PgAuditStore};
use nexus_compliance::{InMemorySnapshotStore, PgSnapshotStore, SnapshotStore};
use nexus_core::config::NexusConfig;
use nexus_crypto::{InMemoryKeyRegistry, InMemoryRotationStore, KeyRegistry, KmsClient, LocalKms, PgKeyRegistry, PgRotationStore, RotationStore};
use nexus_failover::{FailoverStore, InMemoryFailoverStore, InMemoryTokenStore, PgFailoverStore, TokenStore};
use nexus_gate::idempotency_gate::IdempotencyGate;
use nexus_gate::kill_switch::{KillSwitches, WriteFreeze};
use nexus_gate::quota_gate::SoftCapAnnouncer;
use nexus_gate::rate_limit::{InMemoryRateLimiter, RateLimiter, RedisRateLimiter};
use nexus_governance::{DocumentRetentionTarget, DsarStore, InMemoryDsarStore, InMemoryLegalHoldStore, LegalHoldStore, PgDsarStore, PgLegalHoldStore, RetentionRunner};
use nexus_ingest::IngestPipeline;
use nexus_queue::{Bulkhead, InMemoryJobQueue, JobQueue, PgJobQueue};
use nexus_retrieval::{DeterministicEmbedder, RetrievalRouter};
use nexus_run::{FakeLlmClient, LlmClient, NoopTtsClient, RunEngine};
use nexus_server::plans::PlanStore;
use nexus_server::state::{AppState, CanaryRegistry, PolicyRegistry, SsoRegistry};
use nexus_store::{
    InMemoryApiKeyRepository, InMemoryCorpusRepository, InMemoryDocumentRepository, InMemoryIdempotencyStore, InMemoryQuotaStore, InMemorySessionRepository,
    InMemoryTenantRepository, PgApiKeyRepository, PgCorpusRepository, PgDocumentRepository, PgIdempotencyStore, PgQuotaStore, PgSessionRepository, PgTenantRepository,
};
use sqlx::postgres::PgPool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Applies every non-`nexus-store` crate's migration set against the shared
/// pool, using the same `_nexus_migrations` bookkeeping table `nexus-store`
/// itself writes to, so every crate's schema lands in one ledger.
async fn apply_crate_migrations(pool: &PgPool, crate_migrations: &[(&str, &[(&str, &str)])]) -> Result<(), sqlx::Error> {
    for (crate_name, migrations) in crate_migrations {
        for (name, sql) in *migrations {
            let qualified = format!("{crate_name}::{name}");
            let applied: Option<(String,)> = sqlx::query_as("select name from _nexus_migrations where name = $1").bind(&qualified).fetch_optional(pool).await?;
            if applied.is_some() {
                continue;
            }
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("insert into _nexus_migrations(name) values ($1)").bind(&qualified).execute(&mut *tx).await?;
            tx.commit().await?;
            tracing::info!(migration = %qualified, "applied migration");
        }
    }
    Ok(())
}

/// Builds every Postgres-backed store and wires `AppState` against them, or
/// falls back to the in-memory reference implementations when no database
/// is reachable — the same graceful-degradation shape `nexus-gate`'s rate
/// limiter already applies to a down Redis.
async fn build_state(config: NexusConfig) -> AppState {
    let config = Arc::new(config);

    let pool = match nexus_store::connect_and_migrate(&config.database_url).await {
        Ok(pool) => {
            if let Err(e) = apply_crate_migrations(
                &pool,
                &[
                    ("nexus_crypto", nexus_crypto::MIGRATIONS),
                    ("nexus_queue", nexus_queue::MIGRATIONS),
                    ("nexus_audit", nexus_audit::MIGRATIONS),
                    ("nexus_governance", nexus_governance::MIGRATIONS),
                    ("nexus_failover", nexus_failover::MIGRATIONS),
                    ("nexus_compliance", nexus_compliance::MIGRATIONS),
                ],
            )
            .await
            {
                tracing::error!(error = %e, "failed applying crate migrations, falling back to in-memory stores");
                None
            } else {
                Some(pool)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "database unreachable, falling back to in-memory stores");
            None
        }
    };

    let tenants: Arc<dyn nexus_store::TenantRepository> =
        if let Some(pool) = &pool { Arc::new(PgTenantRepository::new(pool.clone())) } else { Arc::new(InMemoryTenantRepository::new()) };
    let api_keys: Arc<dyn nexus_store::ApiKeyRepository> =
        if let Some(pool) = &pool { Arc::new(PgApiKeyRepository::new(pool.clone())) } else { Arc::new(InMemoryApiKeyRepository::new()) };
    let corpora: Arc<dyn nexus_store::CorpusRepository> =
        if let Some(pool) = &pool { Arc::new(PgCorpusRepository::new(pool.clone())) } else { Arc::new(InMemoryCorpusRepository::new()) };
    let documents: Arc<dyn nexus_store::DocumentRepository> =
        if let Some(pool) = &pool { Arc::new(PgDocumentRepository::new(pool.clone())) } else { Arc::new(InMemoryDocumentRepository::new()) };
    let sessions: Arc<dyn nexus_store::SessionRepository> =
        if let Some(pool) = &pool { Arc::new(PgSessionRepository::new(pool.clone())) } else { Arc::new(InMemorySessionRepository::new()) };
    let quota: Arc<dyn nexus_store::QuotaStore> = if let Some(pool) = &pool { Arc::new(PgQuotaStore::new(pool.clone())) } else { Arc::new(InMemoryQuotaStore::new()) };
    let idempotency_store: Arc<dyn nexus_store::IdempotencyStore> =
        if let Some(pool) = &pool { Arc::new(PgIdempotencyStore::new(pool.clone())) } else { Arc::new(InMemoryIdempotencyStore::new()) };
    let job_queue: Arc<dyn JobQueue> = if let Some(pool) = &pool { Arc::new(PgJobQueue::new(pool.clone())) } else { Arc::new(InMemoryJobQueue::new()) };
    let audit: Arc<dyn AuditStore> = if let Some(pool) = &pool { Arc::new(PgAuditStore::new(pool.clone())) } else { Arc::new(InMemoryAuditStore::new()) };
    let legal_holds: Arc<dyn LegalHoldStore> = if let Some(pool) = &pool { Arc::new(PgLegalHoldStore::new(pool.clone())) } else { Arc::new(InMemoryLegalHoldStore::new()) };
    let dsar: Arc<dyn DsarStore> = if let Some(pool) = &pool { Arc::new(PgDsarStore::new(pool.clone())) } else { Arc::new(InMemoryDsarStore::new()) };
    let failover_store: Arc<dyn FailoverStore> = if let Some(pool) = &pool { Arc::new(PgFailoverStore::new(pool.clone())) } else { Arc::new(InMemoryFailoverStore::new()) };
    let failover_tokens: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    let compliance_snapshots: Arc<dyn SnapshotStore> =
        if let Some(pool) = &pool { Arc::new(PgSnapshotStore::new(pool.clone())) } else { Arc::new(InMemorySnapshotStore::new()) };
    let crypto_registry: Arc<dyn KeyRegistry> = if let Some(pool) = &pool { Arc::new(PgKeyRegistry::new(pool.clone())) } else { Arc::new(InMemoryKeyRegistry::new()) };
    let rotation_store: Arc<dyn RotationStore> = if let Some(pool) = &pool { Arc::new(PgRotationStore::new(pool.clone())) } else { Arc::new(InMemoryRotationStore::new()) };

    let crypto_kms: Arc<dyn KmsClient> = match LocalKms::from_env() {
        Ok(kms) => Arc::new(kms),
        Err(_) => {
            tracing::warn!("NEXUS_KMS_MASTER_KEY_BASE64 not set, using a fixed development master key");
            Arc::new(LocalKms::new(&[0x5au8; 32]))
        }
    };

    let rate_limiter: Arc<dyn RateLimiter> = match RedisRateLimiter::connect(&config.redis_url, config.rl_fail_mode).await {
        Ok(limiter) => Arc::new(limiter),
        Err(e) => {
            tracing::warn!(error = %e, "redis unreachable, falling back to in-memory rate limiter");
            Arc::new(InMemoryRateLimiter::new())
        }
    };

    let chunk_repository: Arc<dyn nexus_store::chunks::ChunkRepository> =
        if let Some(pool) = &pool { Arc::new(nexus_store::chunks::PgChunkRepository::new(pool.clone())) } else { Arc::new(nexus_store::chunks::InMemoryChunkRepository::new()) };

    let embedder: Arc<dyn nexus_retrieval::Embedder> = Arc::new(DeterministicEmbedder::new());
    let retrieval_router = Arc::new(RetrievalRouter::new(chunk_repository.clone(), embedder.clone(), false, false));

    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient);
    let run_engine = Arc::new(RunEngine::new(sessions.clone(), retrieval_router.clone(), llm, Some(Arc::new(NoopTtsClient))));

    let ingest_pipeline = Arc::new(IngestPipeline::new(documents.clone(), chunk_repository, embedder, job_queue.clone()));

    let retention_runner = Arc::new(RetentionRunner::new(vec![Arc::new(DocumentRetentionTarget::new(documents.clone()))], legal_holds.clone()));

    AppState {
        config: config.clone(),
        tenants,
        api_keys,
        corpora,
        documents,
        sessions,
        quota,
        idempotency_store,
        plans: Arc::new(PlanStore::seeded()),
        rate_limiter,
        idempotency_gate: Arc::new(IdempotencyGate::new()),
        soft_cap_announcer: Arc::new(SoftCapAnnouncer::new()),
        kill_switches: Arc::new(KillSwitches::new()),
        write_freeze: Arc::new(WriteFreeze::new()),
        canary: Arc::new(CanaryRegistry::default()),
        policies: Arc::new(PolicyRegistry::default()),
        retrieval_router,
        run_engine,
        ingest_pipeline,
        job_queue,
        run_bulkhead: Arc::new(Bulkhead::new(nexus_core::context::RouteClass::Run, config.run_max_concurrency)),
        ingest_bulkhead: Arc::new(Bulkhead::new(nexus_core::context::RouteClass::Mutation, config.ingest_max_concurrency)),
        audit,
        legal_holds,
        retention_runner,
        dsar,
        failover_store,
        failover_tokens,
        compliance_snapshots,
        crypto_registry,
        crypto_kms,
        rotation_store,
        sso: Arc::new(SsoRegistry::default()),
    }
}

fn cors_layer() -> CorsLayer {
    let allowed: Vec<String> = std::env::var("CORS_ALLOWED_ORIGINS").map(|v| v.split(',').map(|s| s.trim().to_string()).collect()).unwrap_or_default();

    if allowed.is_empty() {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            allowed.iter().any(|host| origin_str == host)
        }))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NexusConfig::from_env();
    let service_name = config.service_name.clone();
    let state = build_state(config).await;

    let worker = nexus_ingest::Worker::new("nexusrag-ingest-0", state.ingest_pipeline.clone(), state.job_queue.clone());
    tokio::spawn(async move { worker.run_forever().await });

    let app = nexus_server::app_router().layer(TraceLayer::new_for_http()).layer(cors_layer()).with_state(state);

    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(service = %service_name, %addr, "nexusrag-server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
