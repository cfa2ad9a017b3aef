//! Cross-cutting admission control: rate limiting, entitlements, quota,
//! idempotency, and kill switches (spec §4.3-§4.7).

pub mod entitlements;
pub mod idempotency_gate;
pub mod kill_switch;
pub mod quota_gate;
pub mod rate_limit;

pub use entitlements::{is_enabled, require_enabled};
pub use idempotency_gate::{IdempotencyGate, Outcome as IdempotencyOutcome};
pub use kill_switch::{canary_bucket, in_canary, KillSwitches, WriteFreeze};
pub use quota_gate::{enforce_and_charge, QuotaHeaders, QuotaLimits, SoftCapAnnouncer};
pub use rate_limit::{Admission, BucketLimits, InMemoryRateLimiter, RateLimiter, RedisRateLimiter, Scope};
