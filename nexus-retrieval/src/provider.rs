//! Uniform retrieval provider contract (spec §4.8).

use async_trait::async_trait;
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Returns results ordered score desc, then `chunk_id` asc, length <= `top_k`.
    async fn retrieve(&self, query: &str, top_k: u32, tenant_id: &TenantId, corpus_id: &CorpusId) -> Result<Vec<RetrievedChunk>>;
}
