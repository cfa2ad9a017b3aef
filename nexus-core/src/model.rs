//! The tenant-scoped relational data model (spec §3).
//!
//! These are plain data structs; persistence lives in `nexus-store`.
//! Keeping the types here (rather than behind `sqlx`) lets every crate
//! depend on the shapes without pulling in a database driver, the same
//! separation `adk-core::types` keeps from `adk-session`'s storage backends.

use crate::ids::{ApiKeyId, ChunkId, CorpusId, DocumentId, JobId, PlanId, SessionId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub plan_id: PlanId,
    pub overrides: HashSet<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reader,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: ApiKeyId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub hash: String,
    pub prefix: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Tagged union over retrieval providers (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    LocalPgvector { top_k_default: u32 },
    AwsBedrockKb { knowledge_base_id: String, region: String, top_k_default: u32 },
    GcpVertex { data_store_id: String, location: String, top_k_default: u32 },
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::LocalPgvector { top_k_default: 5 }
    }
}

impl ProviderConfig {
    pub fn top_k_default(&self) -> u32 {
        match self {
            ProviderConfig::LocalPgvector { top_k_default }
            | ProviderConfig::AwsBedrockKb { top_k_default, .. }
            | ProviderConfig::GcpVertex { top_k_default, .. } => *top_k_default,
        }
    }

    pub fn feature_key(&self) -> &'static str {
        match self {
            ProviderConfig::LocalPgvector { .. } => "feature.retrieval.local_pgvector",
            ProviderConfig::AwsBedrockKb { .. } => "feature.retrieval.aws_bedrock_kb",
            ProviderConfig::GcpVertex { .. } => "feature.retrieval.gcp_vertex",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub id: CorpusId,
    pub tenant_id: TenantId,
    pub name: String,
    pub provider_config: ProviderConfig,
    pub created_at: DateTime<Utc>,
}

pub const EMBEDDING_DIMENSION: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub corpus_id: CorpusId,
    pub document_uri: String,
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn validate_dimension(&self) -> Result<(), String> {
        if self.embedding.len() != EMBEDDING_DIMENSION {
            return Err(format!(
                "embedding dimension mismatch: expected {}, got {}",
                EMBEDDING_DIMENSION,
                self.embedding.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl DocumentStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, DocumentStatus::Queued | DocumentStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    #[serde(rename = "text/plain")]
    TextPlain,
    #[serde(rename = "text/markdown")]
    TextMarkdown,
    #[serde(rename = "application/json-text")]
    ApplicationJsonText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub corpus_id: CorpusId,
    pub filename: String,
    pub content_type: ContentType,
    pub status: DocumentStatus,
    pub failure_reason: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_reindexed_at: Option<DateTime<Utc>>,
    pub last_job_id: Option<JobId>,
    pub ingest_source: IngestSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    Upload,
    Text,
    Reindex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub corpus_id: CorpusId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub seq: i64,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub last_message_seq: i64,
    pub state: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub tenant_id: TenantId,
    pub key: String,
    pub payload_hash: String,
    pub status: u16,
    pub response_blob: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Day,
    Month,
}

impl QuotaPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaPeriod::Day => "day",
            QuotaPeriod::Month => "month",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub used_requests: i64,
    pub used_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFeature {
    pub enabled: bool,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub features: HashMap<String, PlanFeature>,
    pub daily_request_limit: i64,
    pub monthly_request_limit: i64,
    pub soft_cap_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardCapMode {
    Enforce,
    Observe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclPrincipalType {
    ApiKey,
    Role,
    Tenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclPermission {
    Read,
    Write,
    Owner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAcl {
    pub document_id: DocumentId,
    pub principal_type: AclPrincipalType,
    pub principal_id: String,
    pub permission: AclPermission,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DocumentAcl {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}
