//! Plan persistence. `nexus-core::model::Plan` is a pure data shape with no
//! repository of its own anywhere in the workspace, so the admin surface
//! (`/admin/plans`) and entitlement checks own a small in-memory store here
//! rather than borrowing one that doesn't exist.

use nexus_core::ids::PlanId;
use nexus_core::model::Plan;
use nexus_core::{NexusError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<String, Plan>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the built-in `free`/`pro` plans a fresh deployment ships with.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.upsert(Plan {
            id: PlanId::new("free"),
            name: "Free".into(),
            features: HashMap::new(),
            daily_request_limit: 200,
            monthly_request_limit: 4_000,
            soft_cap_ratio: 0.8,
        });
        store.upsert(Plan {
            id: PlanId::new("pro"),
            name: "Pro".into(),
            features: HashMap::new(),
            daily_request_limit: 20_000,
            monthly_request_limit: 400_000,
            soft_cap_ratio: 0.9,
        });
        store
    }

    pub fn upsert(&self, plan: Plan) -> Plan {
        self.plans.write().unwrap().insert(plan.id.as_str().to_string(), plan.clone());
        plan
    }

    pub fn get(&self, id: &PlanId) -> Result<Plan> {
        self.plans
            .read()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| NexusError::NotFound { resource_type: "plan".into(), resource_id: id.as_str().to_string() })
    }

    pub fn list(&self) -> Vec<Plan> {
        self.plans.read().unwrap().values().cloned().collect()
    }
}
