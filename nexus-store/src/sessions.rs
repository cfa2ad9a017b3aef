//! Session / message / checkpoint repository (spec §3, §4.9).
//!
//! Upserts are race-safe on `(tenant_id, session_id)`: a second caller
//! racing to create the same session either sees the first caller's row or
//! inserts its own, never a torn mix. Tenant mismatch against an existing
//! session id is a hard error, never silently rebound.

use async_trait::async_trait;
use chrono::Utc;
use nexus_core::ids::{CorpusId, SessionId, TenantId};
use nexus_core::model::{ChatSession, Checkpoint, Message, MessageRole};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Race-safe get-or-create keyed by `(tenant_id, session_id)`.
    /// Returns `TENANT_MISMATCH` if the session id already belongs to a
    /// different tenant.
    async fn get_or_create(&self, tenant_id: &TenantId, session_id: &SessionId, corpus_id: &CorpusId) -> Result<ChatSession>;
    async fn append_message(&self, tenant_id: &TenantId, session_id: &SessionId, role: MessageRole, text: &str) -> Result<Message>;
    async fn messages(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Vec<Message>>;
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn load_checkpoint(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Option<Checkpoint>>;
}

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

fn parse_role(s: &str) -> Result<MessageRole> {
    match s {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        "system" => Ok(MessageRole::System),
        other => Err(NexusError::Internal(format!("corrupt message role {other}"))),
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn get_or_create(&self, tenant_id: &TenantId, session_id: &SessionId, corpus_id: &CorpusId) -> Result<ChatSession> {
        let now = Utc::now();
        let row: (String, String, chrono::DateTime<Utc>, chrono::DateTime<Utc>) = sqlx::query_as(
            "insert into sessions (tenant_id, session_id, corpus_id, created_at, updated_at) \
             values ($1,$2,$3,$4,$4) \
             on conflict (tenant_id, session_id) do update set updated_at = sessions.updated_at \
             returning tenant_id, corpus_id, created_at, updated_at",
        )
        .bind(tenant_id.as_str())
        .bind(session_id.as_str())
        .bind(corpus_id.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;

        if row.0 != tenant_id.as_str() {
            return Err(NexusError::TenantMismatch);
        }
        Ok(ChatSession {
            tenant_id: tenant_id.clone(),
            session_id: session_id.clone(),
            corpus_id: CorpusId::new(row.1),
            created_at: row.2,
            updated_at: row.3,
        })
    }

    async fn append_message(&self, tenant_id: &TenantId, session_id: &SessionId, role: MessageRole, text: &str) -> Result<Message> {
        let now = Utc::now();
        let seq: (i64,) = sqlx::query_as(
            "insert into messages (tenant_id, session_id, seq, role, text, created_at) \
             select $1, $2, coalesce(max(seq), 0) + 1, $3, $4, $5 from messages where tenant_id = $1 and session_id = $2 \
             returning seq",
        )
        .bind(tenant_id.as_str())
        .bind(session_id.as_str())
        .bind(role_str(role))
        .bind(text)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;

        Ok(Message { tenant_id: tenant_id.clone(), session_id: session_id.clone(), seq: seq.0, role, text: text.to_string(), created_at: now })
    }

    async fn messages(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Vec<Message>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            seq: i64,
            role: String,
            text: String,
            created_at: chrono::DateTime<Utc>,
        }
        let rows: Vec<Row> = sqlx::query_as("select seq, role, text, created_at from messages where tenant_id = $1 and session_id = $2 order by seq asc")
            .bind(tenant_id.as_str())
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter()
            .map(|r| {
                Ok(Message {
                    tenant_id: tenant_id.clone(),
                    session_id: session_id.clone(),
                    seq: r.seq,
                    role: parse_role(&r.role)?,
                    text: r.text,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let state = serde_json::to_value(&checkpoint.state).map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query(
            "insert into checkpoints (tenant_id, session_id, last_message_seq, state) values ($1,$2,$3,$4) \
             on conflict (tenant_id, session_id) do update set last_message_seq = excluded.last_message_seq, state = excluded.state",
        )
        .bind(checkpoint.tenant_id.as_str())
        .bind(checkpoint.session_id.as_str())
        .bind(checkpoint.last_message_seq)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn load_checkpoint(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Option<Checkpoint>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            last_message_seq: i64,
            state: serde_json::Value,
        }
        let row: Option<Row> = sqlx::query_as("select last_message_seq, state from checkpoints where tenant_id = $1 and session_id = $2")
            .bind(tenant_id.as_str())
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        row.map(|r| {
            Ok(Checkpoint {
                tenant_id: tenant_id.clone(),
                session_id: session_id.clone(),
                last_message_seq: r.last_message_seq,
                state: serde_json::from_value(r.state).map_err(|e| NexusError::Internal(e.to_string()))?,
            })
        })
        .transpose()
    }
}

/// In-memory reference implementation, identical contract to `PgSessionRepository`.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, ChatSession>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &TenantId, session_id: &SessionId) -> String {
        format!("{}:{}", tenant_id.as_str(), session_id.as_str())
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get_or_create(&self, tenant_id: &TenantId, session_id: &SessionId, corpus_id: &CorpusId) -> Result<ChatSession> {
        let key = Self::key(tenant_id, session_id);
        let mut sessions = self.sessions.write().unwrap();
        if let Some(existing) = sessions.get(&key) {
            if &existing.tenant_id != tenant_id {
                return Err(NexusError::TenantMismatch);
            }
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let session = ChatSession {
            tenant_id: tenant_id.clone(),
            session_id: session_id.clone(),
            corpus_id: corpus_id.clone(),
            created_at: now,
            updated_at: now,
        };
        sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn append_message(&self, tenant_id: &TenantId, session_id: &SessionId, role: MessageRole, text: &str) -> Result<Message> {
        let key = Self::key(tenant_id, session_id);
        let mut messages = self.messages.write().unwrap();
        let list = messages.entry(key).or_default();
        let seq = list.last().map(|m| m.seq + 1).unwrap_or(1);
        let msg = Message { tenant_id: tenant_id.clone(), session_id: session_id.clone(), seq, role, text: text.to_string(), created_at: Utc::now() };
        list.push(msg.clone());
        Ok(msg)
    }

    async fn messages(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Vec<Message>> {
        Ok(self.messages.read().unwrap().get(&Self::key(tenant_id, session_id)).cloned().unwrap_or_default())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<()> {
        let key = Self::key(&checkpoint.tenant_id, &checkpoint.session_id);
        self.checkpoints.write().unwrap().insert(key, checkpoint);
        Ok(())
    }

    async fn load_checkpoint(&self, tenant_id: &TenantId, session_id: &SessionId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().unwrap().get(&Self::key(tenant_id, session_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent_for_same_tenant() {
        let repo = InMemorySessionRepository::new();
        let tenant = TenantId::new("t1");
        let session = SessionId::new("s1");
        let corpus = CorpusId::new("c1");
        let a = repo.get_or_create(&tenant, &session, &corpus).await.unwrap();
        let b = repo.get_or_create(&tenant, &session, &corpus).await.unwrap();
        assert_eq!(a.created_at, b.created_at);
    }

    #[tokio::test]
    async fn tenant_mismatch_is_hard_error() {
        let repo = InMemorySessionRepository::new();
        let session = SessionId::new("s1");
        let corpus = CorpusId::new("c1");
        repo.get_or_create(&TenantId::new("t1"), &session, &corpus).await.unwrap();
        let err = repo.get_or_create(&TenantId::new("t2"), &session, &corpus).await.unwrap_err();
        assert_eq!(err.code(), "TENANT_MISMATCH");
    }

    #[tokio::test]
    async fn message_seq_is_monotonic() {
        let repo = InMemorySessionRepository::new();
        let tenant = TenantId::new("t1");
        let session = SessionId::new("s1");
        let m1 = repo.append_message(&tenant, &session, MessageRole::User, "hi").await.unwrap();
        let m2 = repo.append_message(&tenant, &session, MessageRole::Assistant, "hello").await.unwrap();
        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);
    }
}
