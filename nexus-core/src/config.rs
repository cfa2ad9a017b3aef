//! Typed configuration loaded once at startup (spec §6, §9).
//!
//! Follows the `TelemetryConfig::from_env` idiom from the teacher's
//! telemetry crate: read each variable once, fall back to a documented
//! default, never re-read at runtime (no hot reload).

use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v == "true" || v == "1").unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitFailMode {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct NexusConfig {
    pub auth_dev_bypass: bool,
    pub authz_default_deny: bool,
    pub authz_abac_enabled: bool,
    pub authz_allow_wildcards: bool,
    pub rl_fail_mode: RateLimitFailMode,
    pub ext_call_timeout_ms: u64,
    pub run_max_concurrency: usize,
    pub ingest_max_concurrency: usize,
    pub database_url: String,
    pub redis_url: String,
    pub service_name: String,
}

impl NexusConfig {
    pub fn from_env() -> Self {
        let fail_mode = match env_string("RL_FAIL_MODE", "open").as_str() {
            "closed" => RateLimitFailMode::Closed,
            _ => RateLimitFailMode::Open,
        };
        Self {
            auth_dev_bypass: env_bool("AUTH_DEV_BYPASS", false),
            authz_default_deny: env_bool("AUTHZ_DEFAULT_DENY", true),
            authz_abac_enabled: env_bool("AUTHZ_ABAC_ENABLED", true),
            authz_allow_wildcards: env_bool("AUTHZ_ALLOW_WILDCARDS", false),
            rl_fail_mode: fail_mode,
            ext_call_timeout_ms: env_u64("EXT_CALL_TIMEOUT_MS", 10_000),
            run_max_concurrency: env_u64("RUN_MAX_CONCURRENCY", 64) as usize,
            ingest_max_concurrency: env_u64("INGEST_MAX_CONCURRENCY", 16) as usize,
            database_url: env_string("DATABASE_URL", "postgres://localhost/nexusrag"),
            redis_url: env_string("REDIS_URL", "redis://localhost:6379"),
            service_name: env_string("SERVICE_NAME", "nexusrag"),
        }
    }

    pub fn ext_call_timeout(&self) -> Duration {
        Duration::from_millis(self.ext_call_timeout_ms)
    }
}

impl Default for NexusConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
