//! `gcp_vertex` adapter stub (spec §4.8): same treatment as the Bedrock
//! adapter, GCP credential resolution and wire protocol out of scope.

use crate::provider::{RetrievalProvider, RetrievedChunk};
use async_trait::async_trait;
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::{NexusError, Result};

pub struct GcpVertexProvider {
    pub data_store_id: String,
    pub location: String,
    credentials_configured: bool,
}

impl GcpVertexProvider {
    pub fn new(data_store_id: String, location: String, credentials_configured: bool) -> Self {
        Self { data_store_id, location, credentials_configured }
    }
}

#[async_trait]
impl RetrievalProvider for GcpVertexProvider {
    async fn retrieve(&self, _query: &str, _top_k: u32, _tenant_id: &TenantId, _corpus_id: &CorpusId) -> Result<Vec<RetrievedChunk>> {
        if self.data_store_id.is_empty() || self.location.is_empty() {
            return Err(NexusError::RetrievalProvider {
                code: "VERTEX_RETRIEVAL_CONFIG_MISSING".into(),
                message: "data_store_id and location are required".into(),
            });
        }
        if !self.credentials_configured {
            return Err(NexusError::RetrievalProvider {
                code: "VERTEX_RETRIEVAL_AUTH_ERROR".into(),
                message: "no GCP credentials resolved".into(),
            });
        }
        Err(NexusError::RetrievalProvider {
            code: "VERTEX_RETRIEVAL_ERROR".into(),
            message: "vertex search client is not wired in this deployment".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_is_config_missing_error() {
        let provider = GcpVertexProvider::new(String::new(), String::new(), true);
        let err = provider.retrieve("q", 5, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap_err();
        assert_eq!(err.code(), "VERTEX_RETRIEVAL_CONFIG_MISSING");
    }

    #[tokio::test]
    async fn missing_credentials_is_auth_error() {
        let provider = GcpVertexProvider::new("ds-1".into(), "us-central1".into(), false);
        let err = provider.retrieve("q", 5, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap_err();
        assert_eq!(err.code(), "VERTEX_RETRIEVAL_AUTH_ERROR");
    }
}
