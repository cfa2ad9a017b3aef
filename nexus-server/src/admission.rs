//! Composable admission-chain steps shared by every route handler. Each
//! route calls the subset and order it needs (spec §2 dataflow): `/run`
//! runs all of them, plain reads run none beyond authz.

use nexus_core::context::RouteClass;
use nexus_core::ids::TenantId;
use nexus_core::model::{HardCapMode, Plan, Tenant};
use nexus_core::Result;
use nexus_gate::idempotency_gate::Outcome as IdempotencyOutcome;
use nexus_gate::quota_gate::{enforce_and_charge, QuotaHeaders, QuotaLimits};
use nexus_gate::rate_limit::{Admission, BucketLimits, Scope};
use nexus_gate::{entitlements, kill_switch};
use nexus_queue::{Bulkhead, BulkheadPermit};

use crate::state::AppState;

pub async fn tenant_and_plan(state: &AppState, tenant_id: &TenantId) -> Result<(Tenant, Plan)> {
    let tenant = state.tenants.get(tenant_id).await?;
    let plan = state.plans.get(&tenant.plan_id)?;
    Ok((tenant, plan))
}

pub fn require_feature(plan: &Plan, tenant: &Tenant, feature_key: &str) -> Result<()> {
    entitlements::require_enabled(plan, tenant, feature_key)
}

pub fn require_switch_enabled(state: &AppState, switch: &str) -> Result<()> {
    state.kill_switches.require_enabled(switch)
}

pub fn require_unfrozen(state: &AppState, tenant_id: &TenantId) -> Result<()> {
    state.write_freeze.require_unfrozen(tenant_id)
}

pub async fn admit_rate_limit(state: &AppState, scope: Scope, route_class: RouteClass, id: &str, limits: BucketLimits) -> Result<bool> {
    match state.rate_limiter.try_acquire(scope, route_class, id, limits).await {
        Admission::Allowed => Ok(false),
        Admission::AllowedDegraded => Ok(true),
        Admission::Denied { retry_after_ms } => Err(nexus_core::NexusError::RateLimited {
            scope: scope.as_str().to_string(),
            route_class: route_class.as_str().to_string(),
            retry_after_ms,
        }),
    }
}

/// Default per-route-class bucket shape; a tenant's own rate limit overrides
/// would live on `Plan`/`Tenant` in a fuller billing model, but no such
/// field exists anywhere in the data model today, so every tenant shares
/// these class-wide buckets.
pub fn default_bucket_limits(route_class: RouteClass) -> BucketLimits {
    match route_class {
        RouteClass::Run => BucketLimits { rps: 5.0, capacity: 20.0 },
        RouteClass::Mutation => BucketLimits { rps: 10.0, capacity: 40.0 },
        RouteClass::Read => BucketLimits { rps: 50.0, capacity: 200.0 },
        RouteClass::Ops => BucketLimits { rps: 20.0, capacity: 80.0 },
    }
}

pub async fn admit_quota(state: &AppState, tenant_id: &TenantId, plan: &Plan, cost_requests: i64, cost_tokens: i64) -> Result<QuotaHeaders> {
    let limits = QuotaLimits {
        daily_request_limit: plan.daily_request_limit,
        monthly_request_limit: plan.monthly_request_limit,
        soft_cap_ratio: plan.soft_cap_ratio,
        hard_cap_mode: HardCapMode::Enforce,
    };
    enforce_and_charge(state.quota.as_ref(), &state.soft_cap_announcer, tenant_id, &limits, cost_requests, cost_tokens, chrono::Utc::now()).await
}

pub async fn admit_idempotency(state: &AppState, tenant_id: &TenantId, key: &str, body: &serde_json::Value) -> Result<IdempotencyOutcome> {
    state.idempotency_gate.begin(state.idempotency_store.as_ref(), tenant_id, key, body).await
}

pub async fn complete_idempotency(
    state: &AppState,
    tenant_id: &TenantId,
    key: &str,
    payload_hash: &str,
    status: u16,
    response_blob: serde_json::Value,
) -> Result<()> {
    state.idempotency_gate.complete(state.idempotency_store.as_ref(), tenant_id, key, payload_hash, status, response_blob).await
}

pub fn is_in_canary(state: &AppState, tenant_id: &TenantId, feature: &str, default_pct: u8) -> bool {
    let pcts = state.canary.percentages_snapshot();
    kill_switch::in_canary(tenant_id, feature, default_pct, &pcts)
}

/// Holds a route-class concurrency permit for the lifetime of a request;
/// dropping it releases the slot back to the bulkhead.
pub fn admit_bulkhead(bulkhead: &Bulkhead) -> Result<BulkheadPermit> {
    bulkhead.try_admit()
}
