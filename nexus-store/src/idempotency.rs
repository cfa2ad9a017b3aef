//! Idempotency store (spec §4.5, §8.2): `(tenant_id, key)` -> cached
//! response, 24h TTL, conflict detection on mismatched payload hash.
//! Concurrent first-writes are serialized by a short-lived advisory lock
//! keyed on `(tenant_id, key)`.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use nexus_core::ids::TenantId;
use nexus_core::model::IdempotencyRecord;
use nexus_core::{NexusError, Result};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

pub const IDEMPOTENCY_TTL_HOURS: i64 = 24;
pub const MAX_KEY_LEN: usize = 128;

pub fn canonical_hash(body: &serde_json::Value) -> Result<String> {
    let canonical = serde_json::to_string(body).map_err(|e| NexusError::Internal(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Outcome of attempting to become the producer of an idempotent response.
pub enum IdempotencyLease {
    /// No prior record; caller must compute the response and call `complete`.
    Lead,
    /// A matching record already exists; caller should replay it.
    Replay(IdempotencyRecord),
    /// A record exists with a different payload hash.
    Conflict,
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn acquire(&self, tenant_id: &TenantId, key: &str, payload_hash: &str) -> Result<IdempotencyLease>;
    async fn complete(&self, tenant_id: &TenantId, key: &str, payload_hash: &str, status: u16, response_blob: serde_json::Value) -> Result<()>;
}

pub struct PgIdempotencyStore {
    pool: PgPool,
    /// In-process guard against concurrent first-writes racing the DB
    /// upsert — the DB unique constraint is the source of truth, this is the
    /// "short-lived advisory lock" the spec calls for, scoped per process.
    locks: Mutex<HashMap<String, ()>>,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, locks: Mutex::new(HashMap::new()) }
    }

    fn lock_key(tenant_id: &TenantId, key: &str) -> String {
        format!("{}:{}", tenant_id.as_str(), key)
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn acquire(&self, tenant_id: &TenantId, key: &str, payload_hash: &str) -> Result<IdempotencyLease> {
        if key.len() > MAX_KEY_LEN {
            return Err(NexusError::InvalidRequest { reason: "idempotency key too long".into() });
        }
        #[derive(sqlx::FromRow)]
        struct Row {
            payload_hash: String,
            status: i32,
            response_blob: serde_json::Value,
            expires_at: chrono::DateTime<Utc>,
        }
        let existing: Option<Row> = sqlx::query_as(
            "select payload_hash, status, response_blob, expires_at from idempotency_records \
             where tenant_id = $1 and key = $2 and expires_at > now()",
        )
        .bind(tenant_id.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;

        if let Some(row) = existing {
            if row.payload_hash == payload_hash {
                return Ok(IdempotencyLease::Replay(IdempotencyRecord {
                    tenant_id: tenant_id.clone(),
                    key: key.to_string(),
                    payload_hash: row.payload_hash,
                    status: row.status as u16,
                    response_blob: row.response_blob,
                    expires_at: row.expires_at,
                }));
            }
            return Ok(IdempotencyLease::Conflict);
        }

        let lock_key = Self::lock_key(tenant_id, key);
        let mut locks = self.locks.lock().unwrap();
        if locks.contains_key(&lock_key) {
            return Ok(IdempotencyLease::Conflict);
        }
        locks.insert(lock_key, ());
        Ok(IdempotencyLease::Lead)
    }

    async fn complete(&self, tenant_id: &TenantId, key: &str, payload_hash: &str, status: u16, response_blob: serde_json::Value) -> Result<()> {
        let expires_at = Utc::now() + Duration::hours(IDEMPOTENCY_TTL_HOURS);
        sqlx::query(
            "insert into idempotency_records (tenant_id, key, payload_hash, status, response_blob, expires_at) \
             values ($1,$2,$3,$4,$5,$6) \
             on conflict (tenant_id, key) do update set payload_hash = excluded.payload_hash, status = excluded.status, \
             response_blob = excluded.response_blob, expires_at = excluded.expires_at",
        )
        .bind(tenant_id.as_str())
        .bind(key)
        .bind(payload_hash)
        .bind(status as i32)
        .bind(response_blob)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        self.locks.lock().unwrap().remove(&Self::lock_key(tenant_id, key));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<(String, String), IdempotencyRecord>>,
    locks: Mutex<HashMap<(String, String), ()>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn acquire(&self, tenant_id: &TenantId, key: &str, payload_hash: &str) -> Result<IdempotencyLease> {
        if key.len() > MAX_KEY_LEN {
            return Err(NexusError::InvalidRequest { reason: "idempotency key too long".into() });
        }
        let map_key = (tenant_id.as_str().to_string(), key.to_string());
        let now = Utc::now();
        {
            let records = self.records.lock().unwrap();
            if let Some(record) = records.get(&map_key) {
                if record.expires_at > now {
                    if record.payload_hash == payload_hash {
                        return Ok(IdempotencyLease::Replay(record.clone()));
                    }
                    return Ok(IdempotencyLease::Conflict);
                }
            }
        }
        let mut locks = self.locks.lock().unwrap();
        if locks.contains_key(&map_key) {
            return Ok(IdempotencyLease::Conflict);
        }
        locks.insert(map_key, ());
        Ok(IdempotencyLease::Lead)
    }

    async fn complete(&self, tenant_id: &TenantId, key: &str, payload_hash: &str, status: u16, response_blob: serde_json::Value) -> Result<()> {
        let map_key = (tenant_id.as_str().to_string(), key.to_string());
        let record = IdempotencyRecord {
            tenant_id: tenant_id.clone(),
            key: key.to_string(),
            payload_hash: payload_hash.to_string(),
            status,
            response_blob,
            expires_at: Utc::now() + Duration::hours(IDEMPOTENCY_TTL_HOURS),
        };
        self.records.lock().unwrap().insert(map_key.clone(), record);
        self.locks.lock().unwrap().remove(&map_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn matching_hash_replays_byte_identical_response() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = TenantId::new("t1");
        let hash = canonical_hash(&json!({"a": 1})).unwrap();

        matches!(store.acquire(&tenant, "k1", &hash).await.unwrap(), IdempotencyLease::Lead);
        store.complete(&tenant, "k1", &hash, 200, json!({"data": {"ok": true}})).await.unwrap();

        match store.acquire(&tenant, "k1", &hash).await.unwrap() {
            IdempotencyLease::Replay(rec) => assert_eq!(rec.response_blob, json!({"data": {"ok": true}})),
            _ => panic!("expected replay"),
        }
    }

    #[tokio::test]
    async fn mismatched_hash_is_conflict() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = TenantId::new("t1");
        let hash_a = canonical_hash(&json!({"a": 1})).unwrap();
        let hash_b = canonical_hash(&json!({"a": 2})).unwrap();

        store.complete(&tenant, "k1", &hash_a, 200, json!({})).await.unwrap();
        let lease = store.acquire(&tenant, "k1", &hash_b).await.unwrap();
        assert!(matches!(lease, IdempotencyLease::Conflict));
    }
}
