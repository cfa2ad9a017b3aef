//! One-time promote/rollback tokens (spec §4.13): minted by a separate
//! endpoint, consumed atomically by the transition they authorize. A token
//! that has already been consumed, or has expired, authorizes nothing.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use nexus_core::ids::RegionId;
use nexus_core::{NexusError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Promote,
    Rollback,
}

#[derive(Debug, Clone)]
pub struct FailoverToken {
    pub token: String,
    pub region_id: RegionId,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

pub const TOKEN_TTL: Duration = Duration::seconds(60);

/// Mints and consumes one-time tokens. `consume` must be atomic with
/// respect to concurrent callers racing the same token — exactly one wins.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn mint(&self, region_id: &RegionId, purpose: TokenPurpose, now: DateTime<Utc>) -> Result<FailoverToken>;
    async fn consume(&self, token: &str, region_id: &RegionId, purpose: TokenPurpose, now: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, FailoverToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn mint(&self, region_id: &RegionId, purpose: TokenPurpose, now: DateTime<Utc>) -> Result<FailoverToken> {
        let token = FailoverToken { token: Uuid::new_v4().to_string(), region_id: region_id.clone(), purpose, expires_at: now + TOKEN_TTL, consumed_at: None };
        self.tokens.lock().unwrap().insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn consume(&self, token: &str, region_id: &RegionId, purpose: TokenPurpose, now: DateTime<Utc>) -> Result<()> {
        let mut tokens = self.tokens.lock().unwrap();
        let entry = tokens.get_mut(token).ok_or_else(|| NexusError::InvalidRequest { reason: "unknown failover token".into() })?;
        if entry.consumed_at.is_some() {
            return Err(NexusError::Conflict { reason: "failover token already consumed".into() });
        }
        if entry.expires_at < now {
            return Err(NexusError::InvalidRequest { reason: "failover token expired".into() });
        }
        if &entry.region_id != region_id || entry.purpose != purpose {
            return Err(NexusError::InvalidRequest { reason: "failover token does not match this region/purpose".into() });
        }
        entry.consumed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_can_only_be_consumed_once() {
        let store = InMemoryTokenStore::new();
        let region = RegionId::new("us-east-1");
        let now = Utc::now();
        let token = store.mint(&region, TokenPurpose::Promote, now).await.unwrap();
        store.consume(&token.token, &region, TokenPurpose::Promote, now).await.unwrap();
        let err = store.consume(&token.token, &region, TokenPurpose::Promote, now).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let store = InMemoryTokenStore::new();
        let region = RegionId::new("us-east-1");
        let now = Utc::now();
        let token = store.mint(&region, TokenPurpose::Promote, now).await.unwrap();
        let err = store.consume(&token.token, &region, TokenPurpose::Promote, now + TOKEN_TTL + Duration::seconds(1)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn token_minted_for_promote_cannot_authorize_rollback() {
        let store = InMemoryTokenStore::new();
        let region = RegionId::new("us-east-1");
        let now = Utc::now();
        let token = store.mint(&region, TokenPurpose::Promote, now).await.unwrap();
        let err = store.consume(&token.token, &region, TokenPurpose::Rollback, now).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
