//! Redis token-bucket rate limiter (spec §4.3): per `(scope, route_class,
//! id)` bucket, continuous refill by elapsed wall time, no negative balances.

use async_trait::async_trait;
use fred::prelude::*;
use nexus_core::config::RateLimitFailMode;
use nexus_core::context::RouteClass;
use nexus_core::{NexusError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ApiKey,
    Tenant,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::ApiKey => "key",
            Scope::Tenant => "tenant",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BucketLimits {
    pub rps: f64,
    pub capacity: f64,
}

#[derive(Debug)]
pub enum Admission {
    Allowed,
    AllowedDegraded,
    Denied { retry_after_ms: u64 },
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn try_acquire(&self, scope: Scope, route_class: RouteClass, id: &str, limits: BucketLimits) -> Admission;
}

/// Lua script implementing an atomic refill-then-consume token bucket.
/// `KEYS[1]` is the bucket key; `ARGV` carries `rps, capacity, now_ms, cost`.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local tokens_key = KEYS[1] .. ":tokens"
local ts_key = KEYS[1] .. ":ts"
local rps = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local cost = tonumber(ARGV[4])

local tokens = tonumber(redis.call("GET", tokens_key))
local last_ts = tonumber(redis.call("GET", ts_key))
if tokens == nil then tokens = capacity end
if last_ts == nil then last_ts = now_ms end

local elapsed_s = math.max(0, now_ms - last_ts) / 1000.0
tokens = math.min(capacity, tokens + elapsed_s * rps)

local allowed = 0
if tokens >= cost then
    tokens = tokens - cost
    allowed = 1
end

redis.call("SET", tokens_key, tokens, "EX", 3600)
redis.call("SET", ts_key, now_ms, "EX", 3600)
return {allowed, tokens}
"#;

pub struct RedisRateLimiter {
    client: RedisClient,
    fail_mode: RateLimitFailMode,
}

impl RedisRateLimiter {
    pub async fn connect(redis_url: &str, fail_mode: RateLimitFailMode) -> Result<Self> {
        let config = RedisConfig::from_url(redis_url).map_err(|_| NexusError::RateLimitUnavailable)?;
        let client = RedisClient::new(config, None, None, None);
        client.connect();
        client.wait_for_connect().await.map_err(|_| NexusError::RateLimitUnavailable)?;
        Ok(Self { client, fail_mode })
    }

    fn bucket_key(scope: Scope, route_class: RouteClass, id: &str) -> String {
        format!("nexusrag:rl:{}:{}:{}", scope.as_str(), route_class.as_str(), id)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn try_acquire(&self, scope: Scope, route_class: RouteClass, id: &str, limits: BucketLimits) -> Admission {
        let key = Self::bucket_key(scope, route_class, id);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let result: Result<(i64, f64), _> = self
            .client
            .eval(TOKEN_BUCKET_SCRIPT, vec![key], vec![limits.rps.to_string(), limits.capacity.to_string(), now_ms.to_string(), "1".to_string()])
            .await;
        match result {
            Ok((1, remaining)) => {
                let _ = remaining;
                Admission::Allowed
            }
            Ok((_, remaining)) => {
                let deficit = (1.0 - remaining).max(0.0);
                let retry_after_ms = ((deficit / limits.rps.max(0.001)) * 1000.0) as u64;
                Admission::Denied { retry_after_ms }
            }
            Err(_) => match self.fail_mode {
                RateLimitFailMode::Open => Admission::AllowedDegraded,
                RateLimitFailMode::Closed => Admission::Denied { retry_after_ms: 0 },
            },
        }
    }
}

/// In-process reference bucket used in tests and as a dev fallback when no
/// Redis is configured; same refill math as the Lua script.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct InMemoryRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn try_acquire(&self, scope: Scope, route_class: RouteClass, id: &str, limits: BucketLimits) -> Admission {
        let key = format!("{}:{}:{}", scope.as_str(), route_class.as_str(), id);
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let bucket = buckets.entry(key).or_insert_with(|| Bucket { tokens: limits.capacity, last_refill: now });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * limits.rps).min(limits.capacity);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission::Allowed
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_ms = ((deficit / limits.rps.max(0.001)) * 1000.0) as u64;
            Admission::Denied { retry_after_ms }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_within_capacity_is_allowed() {
        let limiter = InMemoryRateLimiter::new();
        let limits = BucketLimits { rps: 1.0, capacity: 3.0 };
        for _ in 0..3 {
            assert!(matches!(limiter.try_acquire(Scope::ApiKey, RouteClass::Run, "k1", limits).await, Admission::Allowed));
        }
        assert!(matches!(limiter.try_acquire(Scope::ApiKey, RouteClass::Run, "k1", limits).await, Admission::Denied { .. }));
    }

    #[tokio::test]
    async fn refill_is_continuous_by_elapsed_time() {
        let limiter = InMemoryRateLimiter::new();
        let limits = BucketLimits { rps: 100.0, capacity: 1.0 };
        assert!(matches!(limiter.try_acquire(Scope::Tenant, RouteClass::Read, "t1", limits).await, Admission::Allowed));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(limiter.try_acquire(Scope::Tenant, RouteClass::Read, "t1", limits).await, Admission::Allowed));
    }
}
