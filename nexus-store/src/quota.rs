//! Quota counters (spec §3, §4.4, §8.4): day/month buckets, atomic
//! increment of both counters together.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use nexus_core::ids::TenantId;
use nexus_core::model::{QuotaCounter, QuotaPeriod};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn bucket_start(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period {
        QuotaPeriod::Day => now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        QuotaPeriod::Month => now.date_naive().with_day(1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc(),
    }
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get(&self, tenant_id: &TenantId, period: QuotaPeriod, now: DateTime<Utc>) -> Result<QuotaCounter>;
    /// Atomically increments both the day and month counters by the same
    /// amounts (spec §8.4: `used_day <= used_month` always holds because
    /// `/run` adds to both in the same transaction).
    async fn increment_both(&self, tenant_id: &TenantId, now: DateTime<Utc>, requests: i64, tokens: i64) -> Result<(QuotaCounter, QuotaCounter)>;
}

pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn get(&self, tenant_id: &TenantId, period: QuotaPeriod, now: DateTime<Utc>) -> Result<QuotaCounter> {
        let start = bucket_start(period, now);
        let row: Option<(i64, i64)> = sqlx::query_as(
            "select used_requests, used_tokens from quota_counters where tenant_id = $1 and period = $2 and bucket_start = $3",
        )
        .bind(tenant_id.as_str())
        .bind(period.as_str())
        .bind(start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(row.map(|(r, t)| QuotaCounter { used_requests: r, used_tokens: t }).unwrap_or_default())
    }

    async fn increment_both(&self, tenant_id: &TenantId, now: DateTime<Utc>, requests: i64, tokens: i64) -> Result<(QuotaCounter, QuotaCounter)> {
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        let day_start = bucket_start(QuotaPeriod::Day, now);
        let month_start = bucket_start(QuotaPeriod::Month, now);

        async fn upsert(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, tenant_id: &str, period: &str, start: DateTime<Utc>, requests: i64, tokens: i64) -> Result<QuotaCounter> {
            let row: (i64, i64) = sqlx::query_as(
                "insert into quota_counters (tenant_id, period, bucket_start, used_requests, used_tokens) values ($1,$2,$3,$4,$5) \
                 on conflict (tenant_id, period, bucket_start) do update set \
                 used_requests = quota_counters.used_requests + excluded.used_requests, \
                 used_tokens = quota_counters.used_tokens + excluded.used_tokens \
                 returning used_requests, used_tokens",
            )
            .bind(tenant_id)
            .bind(period)
            .bind(start)
            .bind(requests)
            .bind(tokens)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
            Ok(QuotaCounter { used_requests: row.0, used_tokens: row.1 })
        }

        let day = upsert(&mut tx, tenant_id.as_str(), QuotaPeriod::Day.as_str(), day_start, requests, tokens).await?;
        let month = upsert(&mut tx, tenant_id.as_str(), QuotaPeriod::Month.as_str(), month_start, requests, tokens).await?;
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok((day, month))
    }
}

#[derive(Default)]
pub struct InMemoryQuotaStore {
    counters: Mutex<HashMap<(String, &'static str, DateTime<Utc>), QuotaCounter>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, tenant_id: &TenantId, period: QuotaPeriod, now: DateTime<Utc>) -> Result<QuotaCounter> {
        let start = bucket_start(period, now);
        Ok(self.counters.lock().unwrap().get(&(tenant_id.as_str().to_string(), period.as_str(), start)).cloned().unwrap_or_default())
    }

    async fn increment_both(&self, tenant_id: &TenantId, now: DateTime<Utc>, requests: i64, tokens: i64) -> Result<(QuotaCounter, QuotaCounter)> {
        let mut counters = self.counters.lock().unwrap();
        let day_start = bucket_start(QuotaPeriod::Day, now);
        let month_start = bucket_start(QuotaPeriod::Month, now);

        let day_entry = counters.entry((tenant_id.as_str().to_string(), QuotaPeriod::Day.as_str(), day_start)).or_default();
        day_entry.used_requests += requests;
        day_entry.used_tokens += tokens;
        let day = day_entry.clone();

        let month_entry = counters.entry((tenant_id.as_str().to_string(), QuotaPeriod::Month.as_str(), month_start)).or_default();
        month_entry.used_requests += requests;
        month_entry.used_tokens += tokens;
        let month = month_entry.clone();

        Ok((day, month))
    }
}

/// Helper retained for callers needing a stable "now minus duration" bucket
/// boundary in tests.
pub fn days_ago(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn used_day_never_exceeds_used_month() {
        let store = InMemoryQuotaStore::new();
        let tenant = TenantId::new("t1");
        let now = Utc::now();
        for _ in 0..5 {
            store.increment_both(&tenant, now, 3, 0).await.unwrap();
        }
        let day = store.get(&tenant, QuotaPeriod::Day, now).await.unwrap();
        let month = store.get(&tenant, QuotaPeriod::Month, now).await.unwrap();
        assert!(day.used_requests <= month.used_requests);
        assert_eq!(day.used_requests, 15);
        assert_eq!(month.used_requests, 15);
    }
}
