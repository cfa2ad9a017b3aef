//! Chunk repository backing the `local_pgvector` retrieval provider
//! (spec §4.8): cosine similarity over the embedding column.

use async_trait::async_trait;
use nexus_core::ids::{ChunkId, CorpusId};
use nexus_core::model::{Chunk, EMBEDDING_DIMENSION};
use nexus_core::{NexusError, Result};
use pgvector::Vector;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<()>;
    /// Replaces all chunks for a document atomically (reindex, spec §4.10).
    async fn replace_for_document(&self, corpus_id: &CorpusId, document_uri: &str, chunks: Vec<Chunk>) -> Result<()>;
    async fn delete_for_document(&self, corpus_id: &CorpusId, document_uri: &str) -> Result<()>;
    /// Cosine-similarity search, ordered score desc then chunk_id asc, capped at `top_k`.
    async fn search(&self, corpus_id: &CorpusId, query_embedding: &[f32], top_k: u32) -> Result<Vec<(Chunk, f32)>>;
}

pub struct PgChunkRepository {
    pool: PgPool,
}

impl PgChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn validate(chunks: &[Chunk]) -> Result<()> {
    for chunk in chunks {
        chunk.validate_dimension().map_err(|reason| NexusError::InvalidRequest { reason })?;
    }
    Ok(())
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<()> {
        validate(&chunks)?;
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        for chunk in &chunks {
            let metadata = serde_json::to_value(&chunk.metadata).map_err(|e| NexusError::Internal(e.to_string()))?;
            sqlx::query("insert into chunks (id, corpus_id, document_uri, chunk_index, text, embedding, metadata) values ($1,$2,$3,$4,$5,$6,$7)")
                .bind(chunk.id.as_str())
                .bind(chunk.corpus_id.as_str())
                .bind(&chunk.document_uri)
                .bind(chunk.chunk_index as i32)
                .bind(&chunk.text)
                .bind(Vector::from(chunk.embedding.clone()))
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| NexusError::Internal(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn replace_for_document(&self, corpus_id: &CorpusId, document_uri: &str, chunks: Vec<Chunk>) -> Result<()> {
        validate(&chunks)?;
        let mut tx = self.pool.begin().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        sqlx::query("delete from chunks where corpus_id = $1 and document_uri = $2")
            .bind(corpus_id.as_str())
            .bind(document_uri)
            .execute(&mut *tx)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        for chunk in &chunks {
            let metadata = serde_json::to_value(&chunk.metadata).map_err(|e| NexusError::Internal(e.to_string()))?;
            sqlx::query("insert into chunks (id, corpus_id, document_uri, chunk_index, text, embedding, metadata) values ($1,$2,$3,$4,$5,$6,$7)")
                .bind(chunk.id.as_str())
                .bind(chunk.corpus_id.as_str())
                .bind(&chunk.document_uri)
                .bind(chunk.chunk_index as i32)
                .bind(&chunk.text)
                .bind(Vector::from(chunk.embedding.clone()))
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| NexusError::Internal(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn delete_for_document(&self, corpus_id: &CorpusId, document_uri: &str) -> Result<()> {
        sqlx::query("delete from chunks where corpus_id = $1 and document_uri = $2")
            .bind(corpus_id.as_str())
            .bind(document_uri)
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, corpus_id: &CorpusId, query_embedding: &[f32], top_k: u32) -> Result<Vec<(Chunk, f32)>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            corpus_id: String,
            document_uri: String,
            chunk_index: i32,
            text: String,
            embedding: Vector,
            metadata: serde_json::Value,
            score: f64,
        }
        let rows: Vec<Row> = sqlx::query_as(
            "select id, corpus_id, document_uri, chunk_index, text, embedding, metadata, \
             1 - (embedding <=> $2) as score from chunks where corpus_id = $1 \
             order by score desc, id asc limit $3",
        )
        .bind(corpus_id.as_str())
        .bind(Vector::from(query_embedding.to_vec()))
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let metadata: HashMap<String, serde_json::Value> =
                    serde_json::from_value(r.metadata).map_err(|e| NexusError::Internal(e.to_string()))?;
                Ok((
                    Chunk {
                        id: ChunkId::new(r.id),
                        corpus_id: CorpusId::new(r.corpus_id),
                        document_uri: r.document_uri,
                        chunk_index: r.chunk_index as u32,
                        text: r.text,
                        embedding: r.embedding.to_vec(),
                        metadata,
                    },
                    r.score as f32,
                ))
            })
            .collect()
    }
}

/// In-memory reference implementation: brute-force cosine similarity, same
/// ordering contract (score desc, then chunk_id asc).
#[derive(Default)]
pub struct InMemoryChunkRepository {
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn insert_batch(&self, chunks: Vec<Chunk>) -> Result<()> {
        validate(&chunks)?;
        self.chunks.write().unwrap().extend(chunks);
        Ok(())
    }

    async fn replace_for_document(&self, corpus_id: &CorpusId, document_uri: &str, chunks: Vec<Chunk>) -> Result<()> {
        validate(&chunks)?;
        let mut store = self.chunks.write().unwrap();
        store.retain(|c| !(&c.corpus_id == corpus_id && c.document_uri == document_uri));
        store.extend(chunks);
        Ok(())
    }

    async fn delete_for_document(&self, corpus_id: &CorpusId, document_uri: &str) -> Result<()> {
        self.chunks.write().unwrap().retain(|c| !(&c.corpus_id == corpus_id && c.document_uri == document_uri));
        Ok(())
    }

    async fn search(&self, corpus_id: &CorpusId, query_embedding: &[f32], top_k: u32) -> Result<Vec<(Chunk, f32)>> {
        if query_embedding.len() != EMBEDDING_DIMENSION {
            return Err(NexusError::InvalidRequest { reason: "query embedding dimension mismatch".into() });
        }
        let store = self.chunks.read().unwrap();
        let mut scored: Vec<(Chunk, f32)> = store
            .iter()
            .filter(|c| &c.corpus_id == corpus_id)
            .map(|c| (c.clone(), cosine_similarity(&c.embedding, query_embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.id.as_str().cmp(b.0.id.as_str())));
        scored.truncate(top_k as usize);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn chunk(id: &str, corpus: &str, embedding: Vec<f32>) -> Chunk {
        Chunk { id: ChunkId::new(id), corpus_id: CorpusId::new(corpus), document_uri: "doc".into(), chunk_index: 0, text: "t".into(), embedding, metadata: HashMap::new() }
    }

    fn vec256(seed: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
        v[0] = seed;
        v
    }

    #[tokio::test]
    async fn search_orders_by_score_desc_then_id_asc() {
        let repo = InMemoryChunkRepository::new();
        repo.insert_batch(vec![chunk("b", "c1", vec256(1.0)), chunk("a", "c1", vec256(1.0)), chunk("z", "c1", vec256(0.1))])
            .await
            .unwrap();
        let results = repo.search(&CorpusId::new("c1"), &vec256(1.0), 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0.id.as_str(), "a");
        assert_eq!(results[1].0.id.as_str(), "b");
        assert_eq!(results[2].0.id.as_str(), "z");
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let repo = InMemoryChunkRepository::new();
        for i in 0..10 {
            repo.insert_batch(vec![chunk(&format!("c{i}"), "c1", vec256(i as f32))]).await.unwrap();
        }
        let results = repo.search(&CorpusId::new("c1"), &vec256(9.0), 3).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
