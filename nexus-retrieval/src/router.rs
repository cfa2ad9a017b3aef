//! Corpus-config-driven provider dispatch (spec §4.8).

use crate::aws_bedrock::AwsBedrockKbProvider;
use crate::embed::Embedder;
use crate::gcp_vertex::GcpVertexProvider;
use crate::local::LocalPgvectorProvider;
use crate::provider::{RetrievalProvider, RetrievedChunk};
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::model::ProviderConfig;
use nexus_core::Result;
use nexus_store::chunks::ChunkRepository;
use std::sync::Arc;

/// Picks the adapter named by a corpus's `provider_config` and calls it.
pub struct RetrievalRouter {
    chunk_repository: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn Embedder>,
    aws_credentials_configured: bool,
    gcp_credentials_configured: bool,
}

impl RetrievalRouter {
    pub fn new(
        chunk_repository: Arc<dyn ChunkRepository>,
        embedder: Arc<dyn Embedder>,
        aws_credentials_configured: bool,
        gcp_credentials_configured: bool,
    ) -> Self {
        Self { chunk_repository, embedder, aws_credentials_configured, gcp_credentials_configured }
    }

    fn adapter_for(&self, config: &ProviderConfig) -> Box<dyn RetrievalProvider> {
        match config {
            ProviderConfig::LocalPgvector { .. } => {
                Box::new(LocalPgvectorProvider::new(self.chunk_repository.clone(), self.embedder.clone()))
            }
            ProviderConfig::AwsBedrockKb { knowledge_base_id, region, .. } => Box::new(AwsBedrockKbProvider::new(
                knowledge_base_id.clone(),
                region.clone(),
                self.aws_credentials_configured,
            )),
            ProviderConfig::GcpVertex { data_store_id, location, .. } => {
                Box::new(GcpVertexProvider::new(data_store_id.clone(), location.clone(), self.gcp_credentials_configured))
            }
        }
    }
}

impl RetrievalRouter {
    pub async fn retrieve_for(
        &self,
        config: &ProviderConfig,
        query: &str,
        top_k: u32,
        tenant_id: &TenantId,
        corpus_id: &CorpusId,
    ) -> Result<Vec<RetrievedChunk>> {
        let top_k = if top_k == 0 { config.top_k_default() } else { top_k };
        self.adapter_for(config).retrieve(query, top_k, tenant_id, corpus_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::DeterministicEmbedder;
    use nexus_store::chunks::InMemoryChunkRepository;

    #[tokio::test]
    async fn router_dispatches_to_local_adapter_for_local_config() {
        let router = RetrievalRouter::new(Arc::new(InMemoryChunkRepository::new()), Arc::new(DeterministicEmbedder::new()), false, false);
        let config = ProviderConfig::LocalPgvector { top_k_default: 5 };
        let results = router.retrieve_for(&config, "hello", 0, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn router_surfaces_aws_config_missing_for_unconfigured_bedrock() {
        let router = RetrievalRouter::new(Arc::new(InMemoryChunkRepository::new()), Arc::new(DeterministicEmbedder::new()), false, false);
        let config = ProviderConfig::AwsBedrockKb { knowledge_base_id: String::new(), region: String::new(), top_k_default: 5 };
        let err = router.retrieve_for(&config, "hello", 0, &TenantId::new("t1"), &CorpusId::new("c1")).await.unwrap_err();
        assert_eq!(err.code(), "AWS_CONFIG_MISSING");
    }
}
