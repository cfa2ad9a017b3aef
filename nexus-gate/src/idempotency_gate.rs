//! Admission-layer wrapper around `nexus_store::idempotency` (spec §4.5):
//! computes the payload hash, serializes concurrent first-writes for the
//! same `(tenant_id, key)` with an in-process lock, and classifies the
//! outcome for the handler.

use nexus_core::ids::TenantId;
use nexus_core::{NexusError, Result};
use nexus_store::idempotency::{canonical_hash, IdempotencyLease, IdempotencyStore, MAX_KEY_LEN};
use std::collections::HashSet;
use std::sync::Mutex;

/// What the caller should do with an idempotency key on this request.
pub enum Outcome {
    /// No prior record; caller computes the response then calls `complete`.
    Proceed { payload_hash: String },
    /// A prior response with a matching payload exists; replay it verbatim.
    Replay(serde_json::Value, u16),
}

/// Tracks `(tenant_id, key)` pairs currently being produced in this process,
/// so two concurrent requests racing on the same key don't both proceed to
/// `Lead` before either has persisted a record.
#[derive(Default)]
pub struct IdempotencyGate {
    in_flight: Mutex<HashSet<(String, String)>>,
}

impl IdempotencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(
        &self,
        store: &dyn IdempotencyStore,
        tenant_id: &TenantId,
        key: &str,
        body: &serde_json::Value,
    ) -> Result<Outcome> {
        if key.len() > MAX_KEY_LEN {
            return Err(NexusError::InvalidRequest { reason: format!("idempotency key exceeds {MAX_KEY_LEN} bytes") });
        }
        let payload_hash = canonical_hash(body)?;
        let lock_key = (tenant_id.as_str().to_string(), key.to_string());

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if in_flight.contains(&lock_key) {
                return Err(NexusError::IdempotencyKeyConflict);
            }
            in_flight.insert(lock_key.clone());
        }

        let lease = store.acquire(tenant_id, key, &payload_hash).await;
        match lease {
            Ok(IdempotencyLease::Lead) => Ok(Outcome::Proceed { payload_hash }),
            Ok(IdempotencyLease::Replay(record)) => {
                self.release(&lock_key);
                Ok(Outcome::Replay(record.response_blob, record.status))
            }
            Ok(IdempotencyLease::Conflict) => {
                self.release(&lock_key);
                Err(NexusError::IdempotencyKeyConflict)
            }
            Err(e) => {
                self.release(&lock_key);
                Err(e)
            }
        }
    }

    pub async fn complete(
        &self,
        store: &dyn IdempotencyStore,
        tenant_id: &TenantId,
        key: &str,
        payload_hash: &str,
        status: u16,
        response_blob: serde_json::Value,
    ) -> Result<()> {
        let result = store.complete(tenant_id, key, payload_hash, status, response_blob).await;
        self.release(&(tenant_id.as_str().to_string(), key.to_string()));
        result
    }

    fn release(&self, lock_key: &(String, String)) {
        self.in_flight.lock().unwrap().remove(lock_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_store::idempotency::InMemoryIdempotencyStore;
    use serde_json::json;

    #[tokio::test]
    async fn first_caller_leads_second_concurrent_caller_conflicts() {
        let store = InMemoryIdempotencyStore::new();
        let gate = IdempotencyGate::new();
        let tenant = TenantId::new("t1");
        let body = json!({"a": 1});

        let first = gate.begin(&store, &tenant, "key-1", &body).await.unwrap();
        assert!(matches!(first, Outcome::Proceed { .. }));

        let second = gate.begin(&store, &tenant, "key-1", &body).await;
        assert_eq!(second.unwrap_err().code(), "IDEMPOTENCY_KEY_CONFLICT");
    }

    #[tokio::test]
    async fn completed_lead_replays_for_later_callers() {
        let store = InMemoryIdempotencyStore::new();
        let gate = IdempotencyGate::new();
        let tenant = TenantId::new("t1");
        let body = json!({"a": 1});

        let outcome = gate.begin(&store, &tenant, "key-1", &body).await.unwrap();
        let payload_hash = match outcome {
            Outcome::Proceed { payload_hash } => payload_hash,
            _ => panic!("expected Proceed"),
        };
        gate.complete(&store, &tenant, "key-1", &payload_hash, 200, json!({"ok": true})).await.unwrap();

        let replay = gate.begin(&store, &tenant, "key-1", &body).await.unwrap();
        match replay {
            Outcome::Replay(blob, status) => {
                assert_eq!(status, 200);
                assert_eq!(blob, json!({"ok": true}));
            }
            _ => panic!("expected Replay"),
        }
    }

    #[tokio::test]
    async fn mismatched_payload_is_a_conflict() {
        let store = InMemoryIdempotencyStore::new();
        let gate = IdempotencyGate::new();
        let tenant = TenantId::new("t1");

        let outcome = gate.begin(&store, &tenant, "key-1", &json!({"a": 1})).await.unwrap();
        let payload_hash = match outcome {
            Outcome::Proceed { payload_hash } => payload_hash,
            _ => panic!("expected Proceed"),
        };
        gate.complete(&store, &tenant, "key-1", &payload_hash, 200, json!({"ok": true})).await.unwrap();

        let conflict = gate.begin(&store, &tenant, "key-1", &json!({"a": 2})).await;
        assert_eq!(conflict.unwrap_err().code(), "IDEMPOTENCY_KEY_CONFLICT");
    }
}
