//! Retention runs (spec §4.14): policy TTLs per category, applied in tenant
//! scope, always skipping records covered by an active legal hold.

use crate::legal_hold::LegalHoldStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nexus_core::ids::{PolicyId, TenantId};
use nexus_core::Result;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    Delete,
    Anonymize,
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub id: PolicyId,
    /// `None` is the tenant-wide default; a tenant-specific policy for the
    /// same category takes precedence via `priority`.
    pub tenant_id: Option<TenantId>,
    pub category: String,
    pub ttl_days: i64,
    pub priority: i32,
    pub enabled: bool,
    pub action: RetentionAction,
}

/// Picks the policy that applies to `tenant_id`/`category`: highest
/// `priority` wins, ties broken by `id` ascending — the same ordering rule
/// `nexus-authz`'s ABAC engine uses for overlapping policies.
pub fn select_policy<'a>(policies: &'a [RetentionPolicy], tenant_id: &TenantId, category: &str) -> Option<&'a RetentionPolicy> {
    let mut matching: Vec<&RetentionPolicy> = policies
        .iter()
        .filter(|p| p.enabled && p.category == category)
        .filter(|p| p.tenant_id.as_ref().is_none_or(|t| t == tenant_id))
        .collect();
    matching.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.as_str().cmp(b.id.as_str())));
    matching.into_iter().next()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionCounters {
    pub deleted: u64,
    pub anonymized: u64,
    pub skipped_hold: u64,
}

impl RetentionCounters {
    fn merge(&mut self, other: RetentionCounters) {
        self.deleted += other.deleted;
        self.anonymized += other.anonymized;
        self.skipped_hold += other.skipped_hold;
    }
}

/// One data category a retention run can sweep. `nexus-governance` stays
/// storage-agnostic: callers wire in one `RetentionTarget` per repository
/// they want retention to reach (documents, chat sessions, audit events...).
#[async_trait]
pub trait RetentionTarget: Send + Sync {
    fn category(&self) -> &'static str;
    /// Applies `action` to every resource in `tenant_id` older than
    /// `cutoff`, except those covered by an active legal hold, which count
    /// toward `skipped_hold` instead.
    async fn expire(&self, tenant_id: &TenantId, cutoff: DateTime<Utc>, action: RetentionAction, holds: &dyn LegalHoldStore) -> Result<RetentionCounters>;
}

pub struct RetentionRunner {
    targets: Vec<Arc<dyn RetentionTarget>>,
    holds: Arc<dyn LegalHoldStore>,
}

impl RetentionRunner {
    pub fn new(targets: Vec<Arc<dyn RetentionTarget>>, holds: Arc<dyn LegalHoldStore>) -> Self {
        Self { targets, holds }
    }

    /// Runs every configured target against its selected policy, returning
    /// per-category counters. A category with no matching enabled policy is
    /// skipped entirely (not swept).
    pub async fn run(&self, tenant_id: &TenantId, policies: &[RetentionPolicy], now: DateTime<Utc>) -> Result<HashMap<String, RetentionCounters>> {
        let mut totals = HashMap::new();
        for target in &self.targets {
            let Some(policy) = select_policy(policies, tenant_id, target.category()) else { continue };
            let cutoff = now - Duration::days(policy.ttl_days);
            let counters = target.expire(tenant_id, cutoff, policy.action, self.holds.as_ref()).await?;
            totals.entry(target.category().to_string()).or_insert_with(RetentionCounters::default).merge(counters);
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal_hold::InMemoryLegalHoldStore;
    use std::sync::Mutex;

    struct FakeTarget {
        records: Mutex<Vec<(String, DateTime<Utc>)>>,
    }

    #[async_trait]
    impl RetentionTarget for FakeTarget {
        fn category(&self) -> &'static str {
            "documents"
        }

        async fn expire(&self, tenant_id: &TenantId, cutoff: DateTime<Utc>, _action: RetentionAction, holds: &dyn LegalHoldStore) -> Result<RetentionCounters> {
            let mut counters = RetentionCounters::default();
            let expired: Vec<String> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, created_at)| *created_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect();

            let mut kept = Vec::new();
            for id in expired {
                if holds.is_covered(tenant_id, "document", &id).await? {
                    counters.skipped_hold += 1;
                    kept.push(id);
                } else {
                    counters.deleted += 1;
                }
            }
            self.records.lock().unwrap().retain(|(id, created_at)| *created_at >= cutoff || kept.contains(id));
            Ok(counters)
        }
    }

    #[tokio::test]
    async fn select_policy_prefers_tenant_specific_over_global_default() {
        let tenant = TenantId::new("t1");
        let global = RetentionPolicy { id: PolicyId::new("p-global"), tenant_id: None, category: "documents".into(), ttl_days: 30, priority: 0, enabled: true, action: RetentionAction::Delete };
        let specific = RetentionPolicy { id: PolicyId::new("p-specific"), tenant_id: Some(tenant.clone()), category: "documents".into(), ttl_days: 90, priority: 10, enabled: true, action: RetentionAction::Anonymize };
        let picked = select_policy(&[global, specific], &tenant, "documents").unwrap();
        assert_eq!(picked.id.as_str(), "p-specific");
    }

    #[tokio::test]
    async fn run_skips_legal_held_records_and_counts_them() {
        let tenant = TenantId::new("t1");
        let now = Utc::now();
        let target = Arc::new(FakeTarget {
            records: Mutex::new(vec![("held".into(), now - Duration::days(100)), ("expired".into(), now - Duration::days(100)), ("fresh".into(), now)]),
        });
        let holds = Arc::new(InMemoryLegalHoldStore::new());
        holds.set(crate::legal_hold::LegalHold {
            id: nexus_core::ids::LegalHoldId::generate(),
            tenant_id: tenant.clone(),
            resource_type: "document".into(),
            resource_id: Some("held".into()),
            reason: "litigation".into(),
            created_at: now,
            released_at: None,
        }).await.unwrap();

        let runner = RetentionRunner::new(vec![target], holds);
        let policy = RetentionPolicy { id: PolicyId::new("p1"), tenant_id: None, category: "documents".into(), ttl_days: 30, priority: 0, enabled: true, action: RetentionAction::Delete };
        let result = runner.run(&tenant, &[policy], now).await.unwrap();
        let counters = &result["documents"];
        assert_eq!(counters.deleted, 1);
        assert_eq!(counters.skipped_hold, 1);
    }
}
