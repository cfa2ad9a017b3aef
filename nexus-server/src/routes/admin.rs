//! `/v1/admin/*` (spec §6): plan, quota, rollout, authz, governance, crypto,
//! and compliance administration. Every route requires `RouteScope::Admin`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use nexus_authz::{Condition, Effect, Policy, RouteScope};
use nexus_compliance::catalog::{evaluate_catalog, overall_status, ControlSignal};
use nexus_compliance::snapshot::SnapshotRecord;
use nexus_compliance::bundle::{build_bundle, BundleInputs};
use nexus_core::ids::{PlanId, PolicyId, RequestId, TenantId};
use nexus_core::model::Plan;
use nexus_core::NexusError;
use nexus_governance::{DsarKind, DsarRequest, LegalHold};
use nexus_core::ids::{DsarId, LegalHoldId};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::envelope::{ok, ApiError, Envelope};
use crate::routes::common::{authenticate, require_scope};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/plans", get(list_plans).post(upsert_plan))
        .route("/admin/authz/policies", get(list_policies).post(upsert_policy))
        .route("/admin/rollouts/{feature}", post(set_canary))
        .route("/admin/kill-switches/{switch}", post(set_kill_switch))
        .route("/admin/write-freeze", post(set_write_freeze))
        .route("/admin/crypto/rotate/{tenant_id}", post(rotate_key))
        .route("/admin/compliance/snapshot", post(generate_snapshot))
        .route("/admin/governance/legal-holds", post(set_legal_hold))
        .route("/admin/governance/legal-holds/{id}/release", post(release_legal_hold))
        .route("/admin/governance/dsar", post(create_dsar))
        .route("/admin/governance/dsar/{id}/approve", post(approve_dsar))
        .route("/admin/governance/dsar/{id}/run", post(run_dsar))
}

async fn admin_identity(state: &AppState, headers: &HeaderMap) -> Result<(nexus_core::context::Principal, RequestId), ApiError> {
    let identity = authenticate(state, headers).await.map_err(|e| ApiError::new(RequestId::generate(), e))?;
    require_scope(&identity.principal, RouteScope::Admin).map_err(crate::envelope::bind(identity.request_id.clone()))?;
    Ok((identity.principal, identity.request_id))
}

async fn list_plans(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Vec<Plan>>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    Ok(ok(request_id, state.plans.list()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertPlanBody {
    pub id: String,
    pub name: String,
    pub daily_request_limit: i64,
    pub monthly_request_limit: i64,
    pub soft_cap_ratio: f64,
}

async fn upsert_plan(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<UpsertPlanBody>) -> Result<Json<Envelope<Plan>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let plan = Plan {
        id: PlanId::new(body.id),
        name: body.name,
        features: Default::default(),
        daily_request_limit: body.daily_request_limit,
        monthly_request_limit: body.monthly_request_limit,
        soft_cap_ratio: body.soft_cap_ratio,
    };
    Ok(ok(request_id, state.plans.upsert(plan)))
}

async fn list_policies(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<Vec<Policy>>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    Ok(ok(request_id, state.policies.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertPolicyBody {
    pub id: String,
    pub priority: i32,
    pub enabled: bool,
    pub effect: Effect,
    pub resource_type: String,
    pub action: String,
    pub condition: Condition,
}

async fn upsert_policy(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<UpsertPolicyBody>) -> Result<Json<Envelope<Policy>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let policy = Policy {
        id: PolicyId::new(body.id),
        priority: body.priority,
        enabled: body.enabled,
        effect: body.effect,
        resource_type: body.resource_type,
        action: body.action,
        condition: body.condition,
    };
    let mut policies = state.policies.policies.write().unwrap();
    match policies.iter_mut().find(|p| p.id == policy.id) {
        Some(existing) => *existing = policy.clone(),
        None => policies.push(policy.clone()),
    }
    drop(policies);
    Ok(ok(request_id, policy))
}

#[derive(Debug, Deserialize)]
pub struct CanaryBody {
    pub pct: u8,
}

async fn set_canary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(feature): Path<String>,
    Json(body): Json<CanaryBody>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    state.canary.percentages.write().unwrap().insert(feature.clone(), body.pct);
    Ok(ok(request_id, json!({ "feature": feature, "pct": body.pct })))
}

#[derive(Debug, Deserialize)]
pub struct KillSwitchBody {
    pub disabled: bool,
}

async fn set_kill_switch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(switch): Path<String>,
    Json(body): Json<KillSwitchBody>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    state.kill_switches.set(&switch, body.disabled);
    Ok(ok(request_id, json!({ "switch": switch, "disabled": body.disabled })))
}

#[derive(Debug, Deserialize)]
pub struct WriteFreezeBody {
    pub tenant_id: Option<String>,
    pub frozen: bool,
}

async fn set_write_freeze(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<WriteFreezeBody>) -> Result<Json<Envelope<Value>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    match &body.tenant_id {
        Some(tenant_id) => state.write_freeze.set_tenant(&TenantId::new(tenant_id.clone()), body.frozen),
        None => state.write_freeze.set_global(body.frozen),
    }
    Ok(ok(request_id, json!({ "frozen": body.frozen, "tenant_id": body.tenant_id })))
}

async fn rotate_key(State(state): State<AppState>, headers: HeaderMap, Path(tenant_id): Path<String>) -> Result<Json<Envelope<Value>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());
    let tenant_id = TenantId::new(tenant_id);

    let current = state.crypto_registry.active_key(&tenant_id).await.map_err(bind.clone())?;
    let job = state.rotation_store.start(&tenant_id, current.version, current.version + 1).await.map_err(bind.clone())?;

    let dek = rand_dek();
    let wrapped = state.crypto_kms.wrap(&dek).await.map_err(bind.clone())?;
    match state.crypto_registry.rotate(&tenant_id, current.alias.clone(), wrapped).await {
        Ok(rotated) => {
            state
                .rotation_store
                .transition(&job.id, nexus_crypto::RotationStatus::Completed, None)
                .await
                .map_err(bind)?;
            Ok(ok(request_id, json!({ "tenant_id": tenant_id, "version": rotated.version })))
        }
        Err(e) => {
            state
                .rotation_store
                .transition(&job.id, nexus_crypto::RotationStatus::Failed, Some(e.to_string()))
                .await
                .ok();
            Err(ApiError::new(request_id, e))
        }
    }
}

fn rand_dek() -> [u8; 32] {
    use rand::RngCore;
    let mut dek = [0u8; 32];
    rand::rng().fill_bytes(&mut dek);
    dek
}

async fn generate_snapshot(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Envelope<SnapshotRecord>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let bind = crate::envelope::bind(request_id.clone());

    let kms_ok = state.crypto_kms.wrap(&[0u8; 32]).await.is_ok();
    let write_frozen = state.write_freeze.require_unfrozen(&TenantId::new("__control_probe__")).is_ok();
    let controls = evaluate_catalog(
        |control_id| match control_id {
            "SYSTEM.ENCRYPTION_AT_REST" if !kms_ok => ControlSignal::degraded(),
            "CC7.3" if !write_frozen => ControlSignal::degraded(),
            _ => ControlSignal::pass(),
        },
        |control_id| format!("controls.json#{control_id}"),
        |_| None,
    );
    let status = overall_status(&controls);

    let inputs = BundleInputs {
        snapshot: serde_json::to_vec(&controls).map_err(|e| NexusError::Internal(e.to_string())).map_err(bind.clone())?,
        controls: serde_json::to_vec(&controls).map_err(|e| NexusError::Internal(e.to_string())).map_err(bind.clone())?,
        config_sanitized: b"{}".to_vec(),
        runbooks_index: b"[]".to_vec(),
        changelog_excerpt: b"".to_vec(),
        capacity_model_excerpt: b"{}".to_vec(),
        perf_gates_excerpt: b"{}".to_vec(),
        perf_report_summary: b"{}".to_vec(),
        ops_metrics_24h_summary: b"{}".to_vec(),
    };
    let hmac_key = compliance_hmac_key();
    let bundle = build_bundle(&inputs, &hmac_key).map_err(bind.clone())?;

    let bundle_uri = format!("memory://compliance-bundles/{}.zip", uuid::Uuid::new_v4());
    let snapshot = SnapshotRecord::new(controls, bundle.signature, bundle_uri, Utc::now());
    let snapshot = state.compliance_snapshots.insert(snapshot).await.map_err(bind)?;
    tracing::info!(status = ?status, snapshot_id = %snapshot.id, "generated compliance snapshot");
    Ok(ok(request_id, snapshot))
}

fn compliance_hmac_key() -> Vec<u8> {
    std::env::var("COMPLIANCE_HMAC_KEY_BASE64")
        .ok()
        .and_then(|v| base64::Engine::decode(&base64::engine::general_purpose::STANDARD, v).ok())
        .unwrap_or_else(|| b"nexusrag-dev-compliance-hmac-key".to_vec())
}

#[derive(Debug, Deserialize)]
pub struct SetLegalHoldBody {
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub reason: String,
}

async fn set_legal_hold(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<SetLegalHoldBody>) -> Result<Json<Envelope<LegalHold>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let hold = LegalHold {
        id: LegalHoldId::generate(),
        tenant_id: TenantId::new(body.tenant_id),
        resource_type: body.resource_type,
        resource_id: body.resource_id,
        reason: body.reason,
        created_at: Utc::now(),
        released_at: None,
    };
    let hold = state.legal_holds.set(hold).await.map_err(crate::envelope::bind(request_id.clone()))?;
    Ok(ok(request_id, hold))
}

#[derive(Debug, Deserialize)]
pub struct TenantScopedPath {
    pub tenant_id: String,
}

async fn release_legal_hold(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TenantScopedPath>,
) -> Result<Json<Envelope<LegalHold>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let hold = state
        .legal_holds
        .release(&TenantId::new(body.tenant_id), &LegalHoldId::new(id))
        .await
        .map_err(crate::envelope::bind(request_id.clone()))?;
    Ok(ok(request_id, hold))
}

#[derive(Debug, Deserialize)]
pub struct CreateDsarBody {
    pub tenant_id: String,
    pub subject_id: String,
    pub kind: DsarKindBody,
    #[serde(default)]
    pub requires_approval: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsarKindBody {
    Export,
    Delete,
}

async fn create_dsar(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<CreateDsarBody>) -> Result<Json<Envelope<DsarRequest>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let kind = match body.kind {
        DsarKindBody::Export => DsarKind::Export,
        DsarKindBody::Delete => DsarKind::Delete,
    };
    let request = DsarRequest::new(TenantId::new(body.tenant_id), nexus_core::ids::SubjectId::new(body.subject_id), kind, body.requires_approval);
    let request = state.dsar.insert(request).await.map_err(crate::envelope::bind(request_id.clone()))?;
    Ok(ok(request_id, request))
}

async fn approve_dsar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TenantScopedPath>,
) -> Result<Json<Envelope<DsarRequest>>, ApiError> {
    let (principal, request_id) = admin_identity(&state, &headers).await?;
    let request = nexus_governance::approve(state.dsar.as_ref(), &TenantId::new(body.tenant_id), &DsarId::new(id), principal.subject_id.as_str())
        .await
        .map_err(crate::envelope::bind(request_id.clone()))?;
    Ok(ok(request_id, request))
}

#[derive(Debug, Deserialize)]
pub struct RunDsarBody {
    pub tenant_id: String,
    pub artifact_uri: String,
}

async fn run_dsar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RunDsarBody>,
) -> Result<Json<Envelope<DsarRequest>>, ApiError> {
    let (_principal, request_id) = admin_identity(&state, &headers).await?;
    let request = nexus_governance::run(state.dsar.as_ref(), &TenantId::new(body.tenant_id), &DsarId::new(id), body.artifact_uri)
        .await
        .map_err(crate::envelope::bind(request_id.clone()))?;
    Ok(ok(request_id, request))
}
