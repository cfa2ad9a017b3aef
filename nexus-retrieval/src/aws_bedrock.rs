//! `aws_bedrock_kb` adapter stub (spec §4.8): AWS credential resolution and
//! the Bedrock Knowledge Base wire protocol are treated as a pluggable
//! back-end; this crate owns corpus routing and the stable error taxonomy.

use crate::provider::{RetrievalProvider, RetrievedChunk};
use async_trait::async_trait;
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::{NexusError, Result};

pub struct AwsBedrockKbProvider {
    pub knowledge_base_id: String,
    pub region: String,
    credentials_configured: bool,
}

impl AwsBedrockKbProvider {
    pub fn new(knowledge_base_id: String, region: String, credentials_configured: bool) -> Self {
        Self { knowledge_base_id, region, credentials_configured }
    }
}

#[async_trait]
impl RetrievalProvider for AwsBedrockKbProvider {
    async fn retrieve(&self, _query: &str, _top_k: u32, _tenant_id: &TenantId, _corpus_id: &CorpusId) -> Result<Vec<RetrievedChunk>> {
        if self.knowledge_base_id.is_empty() || self.region.is_empty() {
            return Err(NexusError::RetrievalProvider {
                code: "AWS_CONFIG_MISSING".into(),
                message: "knowledge_base_id and region are required".into(),
            });
        }
        if !self.credentials_configured {
            return Err(NexusError::RetrievalProvider { code: "AWS_AUTH_ERROR".into(), message: "no AWS credentials resolved".into() });
        }
        Err(NexusError::RetrievalProvider {
            code: "AWS_RETRIEVAL_ERROR".into(),
            message: "bedrock knowledge base client is not wired in this deployment".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_is_config_missing_error() {
        let provider = AwsBedrockKbProvider::new(String::new(), String::new(), true);
        let err = provider.retrieve("q", 5, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap_err();
        assert_eq!(err.code(), "AWS_CONFIG_MISSING");
    }

    #[tokio::test]
    async fn missing_credentials_is_auth_error() {
        let provider = AwsBedrockKbProvider::new("kb-1".into(), "us-east-1".into(), false);
        let err = provider.retrieve("q", 5, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap_err();
        assert_eq!(err.code(), "AWS_AUTH_ERROR");
    }
}
