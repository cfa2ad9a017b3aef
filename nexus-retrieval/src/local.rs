//! `local_pgvector` adapter: wraps `nexus_store::chunks` cosine search.

use crate::embed::Embedder;
use crate::provider::{RetrievalProvider, RetrievedChunk};
use async_trait::async_trait;
use nexus_core::ids::{CorpusId, TenantId};
use nexus_core::Result;
use nexus_store::chunks::ChunkRepository;
use std::sync::Arc;

pub struct LocalPgvectorProvider {
    repository: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn Embedder>,
}

impl LocalPgvectorProvider {
    pub fn new(repository: Arc<dyn ChunkRepository>, embedder: Arc<dyn Embedder>) -> Self {
        Self { repository, embedder }
    }
}

#[async_trait]
impl RetrievalProvider for LocalPgvectorProvider {
    async fn retrieve(&self, query: &str, top_k: u32, _tenant_id: &TenantId, corpus_id: &CorpusId) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed(query);
        let results = self.repository.search(corpus_id, &embedding, top_k).await?;
        Ok(results
            .into_iter()
            .map(|(chunk, score)| RetrievedChunk {
                chunk_id: chunk.id.as_str().to_string(),
                text: chunk.text,
                score,
                metadata: serde_json::to_value(chunk.metadata).unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::DeterministicEmbedder;
    use nexus_core::model::{Chunk, EMBEDDING_DIMENSION};
    use nexus_store::chunks::InMemoryChunkRepository;
    use std::collections::HashMap;

    #[tokio::test]
    async fn retrieve_ranks_by_score_and_respects_top_k() {
        let repo = Arc::new(InMemoryChunkRepository::new());
        let embedder = Arc::new(DeterministicEmbedder::new());
        let corpus_id = CorpusId::new("c1");

        for (id, text) in [("a", "cats and dogs"), ("b", "rockets and spaceships"), ("c", "cats are great pets")] {
            let embedding = embedder.embed(text);
            assert_eq!(embedding.len(), EMBEDDING_DIMENSION);
            repo.insert_batch(vec![Chunk {
                id: nexus_core::ids::ChunkId::new(id),
                corpus_id: corpus_id.clone(),
                document_uri: "doc".into(),
                chunk_index: 0,
                text: text.into(),
                embedding,
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
        }

        let provider = LocalPgvectorProvider::new(repo, embedder);
        let tenant = TenantId::new("t1");
        let results = provider.retrieve("cats", 2, &tenant, &corpus_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }
}
