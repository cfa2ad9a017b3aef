//! Quota enforcement (spec §4.4): wraps `nexus_store::QuotaStore` with
//! soft/hard cap decisions and the response headers the envelope needs.

use chrono::{DateTime, Utc};
use nexus_core::ids::TenantId;
use nexus_core::model::{HardCapMode, QuotaCounter};
use nexus_core::{NexusError, Result};
use nexus_store::QuotaStore;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct QuotaLimits {
    pub daily_request_limit: i64,
    pub monthly_request_limit: i64,
    pub soft_cap_ratio: f64,
    pub hard_cap_mode: HardCapMode,
}

pub struct QuotaHeaders {
    pub day: QuotaCounter,
    pub month: QuotaCounter,
    pub day_limit: i64,
    pub month_limit: i64,
    pub soft_cap_reached: bool,
    pub hard_cap_mode: HardCapMode,
}

impl QuotaHeaders {
    pub fn as_header_map(&self) -> HashMap<&'static str, String> {
        let mut headers = HashMap::new();
        headers.insert("X-Quota-Day-Limit", self.day_limit.to_string());
        headers.insert("X-Quota-Day-Used", self.day.used_requests.to_string());
        headers.insert("X-Quota-Day-Remaining", (self.day_limit - self.day.used_requests).max(0).to_string());
        headers.insert("X-Quota-Month-Limit", self.month_limit.to_string());
        headers.insert("X-Quota-Month-Used", self.month.used_requests.to_string());
        headers.insert("X-Quota-Month-Remaining", (self.month_limit - self.month.used_requests).max(0).to_string());
        headers.insert("X-Quota-HardCap-Mode", if self.hard_cap_mode == HardCapMode::Enforce { "enforce" } else { "observe" }.to_string());
        if self.soft_cap_reached {
            headers.insert("X-Quota-SoftCap-Reached", "true".to_string());
        }
        headers
    }
}

/// Per-tenant "soft cap already announced this period" de-dup, so
/// `quota.soft_cap_reached` fires once per period rather than per request.
#[derive(Default)]
pub struct SoftCapAnnouncer {
    announced: Mutex<HashMap<(String, &'static str), DateTime<Utc>>>,
}

impl SoftCapAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a period's soft cap is crossed.
    pub fn announce_once(&self, tenant_id: &TenantId, period: &'static str, bucket_start: DateTime<Utc>) -> bool {
        let mut announced = self.announced.lock().unwrap();
        let key = (tenant_id.as_str().to_string(), period);
        if announced.get(&key) == Some(&bucket_start) {
            return false;
        }
        announced.insert(key, bucket_start);
        true
    }
}

/// Charges the cost against day+month counters and evaluates caps. On hard
/// breach in `enforce` mode returns `402 QUOTA_EXCEEDED` without having
/// incremented past the limit's intent (the increment already landed;
/// callers must not have persisted side effects yet when calling this).
pub async fn enforce_and_charge(
    store: &dyn QuotaStore,
    announcer: &SoftCapAnnouncer,
    tenant_id: &TenantId,
    limits: &QuotaLimits,
    cost_requests: i64,
    cost_tokens: i64,
    now: DateTime<Utc>,
) -> Result<QuotaHeaders> {
    let (day, month) = store.increment_both(tenant_id, now, cost_requests, cost_tokens).await?;

    let day_start = nexus_store::quota::bucket_start(nexus_core::model::QuotaPeriod::Day, now);
    let month_start = nexus_store::quota::bucket_start(nexus_core::model::QuotaPeriod::Month, now);

    let day_ratio = day.used_requests as f64 / limits.daily_request_limit.max(1) as f64;
    let month_ratio = month.used_requests as f64 / limits.monthly_request_limit.max(1) as f64;
    let soft_cap_crossed = day_ratio >= limits.soft_cap_ratio || month_ratio >= limits.soft_cap_ratio;
    let soft_cap_reached = soft_cap_crossed
        && (announcer.announce_once(tenant_id, "day", day_start) | announcer.announce_once(tenant_id, "month", month_start));

    let hard_breach = day.used_requests > limits.daily_request_limit || month.used_requests > limits.monthly_request_limit;
    if hard_breach && limits.hard_cap_mode == HardCapMode::Enforce {
        let (period, limit, used) = if month.used_requests > limits.monthly_request_limit {
            ("month", limits.monthly_request_limit, month.used_requests)
        } else {
            ("day", limits.daily_request_limit, day.used_requests)
        };
        return Err(NexusError::QuotaExceeded { period: period.into(), limit, used, remaining: (limit - used).max(0) });
    }

    Ok(QuotaHeaders {
        day,
        month,
        day_limit: limits.daily_request_limit,
        month_limit: limits.monthly_request_limit,
        soft_cap_reached,
        hard_cap_mode: limits.hard_cap_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_store::InMemoryQuotaStore;

    fn limits(mode: HardCapMode) -> QuotaLimits {
        QuotaLimits { daily_request_limit: 10, monthly_request_limit: 100, soft_cap_ratio: 0.8, hard_cap_mode: mode }
    }

    #[tokio::test]
    async fn enforce_mode_rejects_past_daily_limit() {
        let store = InMemoryQuotaStore::new();
        let announcer = SoftCapAnnouncer::new();
        let tenant = TenantId::new("t1");
        let now = Utc::now();
        for _ in 0..3 {
            enforce_and_charge(&store, &announcer, &tenant, &limits(HardCapMode::Enforce), 3, 0, now).await.unwrap();
        }
        let err = enforce_and_charge(&store, &announcer, &tenant, &limits(HardCapMode::Enforce), 3, 0, now).await.unwrap_err();
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
    }

    #[tokio::test]
    async fn observe_mode_allows_overage() {
        let store = InMemoryQuotaStore::new();
        let announcer = SoftCapAnnouncer::new();
        let tenant = TenantId::new("t1");
        let now = Utc::now();
        for _ in 0..5 {
            let headers = enforce_and_charge(&store, &announcer, &tenant, &limits(HardCapMode::Observe), 3, 0, now).await.unwrap();
            let _ = headers;
        }
    }

    #[tokio::test]
    async fn soft_cap_announced_only_once_per_period() {
        let store = InMemoryQuotaStore::new();
        let announcer = SoftCapAnnouncer::new();
        let tenant = TenantId::new("t1");
        let now = Utc::now();
        let first = enforce_and_charge(&store, &announcer, &tenant, &limits(HardCapMode::Observe), 9, 0, now).await.unwrap();
        assert!(first.soft_cap_reached);
        let second = enforce_and_charge(&store, &announcer, &tenant, &limits(HardCapMode::Observe), 0, 0, now).await.unwrap();
        assert!(!second.soft_cap_reached);
    }
}
