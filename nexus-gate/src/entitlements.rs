//! Feature entitlement gate (spec §4.6): plan enables a feature key AND no
//! per-tenant override disables it; an override can also force-enable.

use nexus_core::model::{Plan, Tenant};
use nexus_core::{NexusError, Result};

/// A disabling override is written `!feature.key`; an enabling override is
/// the bare key.
pub fn is_enabled(plan: &Plan, tenant: &Tenant, feature_key: &str) -> bool {
    let disabled_override = format!("!{feature_key}");
    if tenant.overrides.contains(&disabled_override) {
        return false;
    }
    if tenant.overrides.contains(feature_key) {
        return true;
    }
    plan.features.get(feature_key).map(|f| f.enabled).unwrap_or(false)
}

pub fn require_enabled(plan: &Plan, tenant: &Tenant, feature_key: &str) -> Result<()> {
    if is_enabled(plan, tenant, feature_key) {
        Ok(())
    } else {
        Err(NexusError::FeatureNotEnabled { feature_key: feature_key.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::ids::{PlanId, TenantId};
    use nexus_core::model::PlanFeature;
    use std::collections::{HashMap, HashSet};

    fn plan_with(feature: &str, enabled: bool) -> Plan {
        let mut features = HashMap::new();
        features.insert(feature.to_string(), PlanFeature { enabled, config: serde_json::json!({}) });
        Plan { id: PlanId::new("p1"), name: "plan".into(), features, daily_request_limit: 1000, monthly_request_limit: 30000, soft_cap_ratio: 0.8 }
    }

    fn tenant_with_overrides(overrides: HashSet<String>) -> Tenant {
        Tenant { id: TenantId::new("t1"), plan_id: PlanId::new("p1"), overrides, created_at: Utc::now() }
    }

    #[test]
    fn plan_enabled_feature_is_enabled_without_override() {
        let plan = plan_with("feature.tts", true);
        let tenant = tenant_with_overrides(HashSet::new());
        assert!(is_enabled(&plan, &tenant, "feature.tts"));
    }

    #[test]
    fn override_disables_plan_enabled_feature() {
        let plan = plan_with("feature.tts", true);
        let tenant = tenant_with_overrides(HashSet::from(["!feature.tts".to_string()]));
        assert!(!is_enabled(&plan, &tenant, "feature.tts"));
    }

    #[test]
    fn override_force_enables_plan_disabled_feature() {
        let plan = plan_with("feature.tts", false);
        let tenant = tenant_with_overrides(HashSet::from(["feature.tts".to_string()]));
        assert!(is_enabled(&plan, &tenant, "feature.tts"));
    }
}
