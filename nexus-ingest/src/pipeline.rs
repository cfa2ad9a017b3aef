//! Enqueue + worker pipeline (spec §4.10): upload/text/reindex enqueue,
//! `sniff -> normalize -> chunk -> embed -> write` on the worker side,
//! at-most-one-active-job-per-document via the document status lifecycle.

use crate::chunker::{chunk_text, normalize_to_text, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
use chrono::Utc;
use nexus_core::ids::{ChunkId, CorpusId, DocumentId, TenantId};
use nexus_core::model::{Chunk, ContentType, Document, DocumentStatus, IngestSource};
use nexus_core::{NexusError, Result};
use nexus_queue::job::{Job, JobQueue};
use nexus_retrieval::Embedder;
use nexus_store::chunks::ChunkRepository;
use nexus_store::documents::DocumentRepository;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const JOB_TYPE: &str = "ingest";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IngestJobPayload {
    tenant_id: String,
    document_id: String,
    corpus_id: String,
    content_type: String,
    raw_text: String,
}

fn content_type_str(ct: ContentType) -> &'static str {
    match ct {
        ContentType::TextPlain => "text/plain",
        ContentType::TextMarkdown => "text/markdown",
        ContentType::ApplicationJsonText => "application/json-text",
    }
}

fn parse_content_type(s: &str) -> Result<ContentType> {
    match s {
        "text/plain" => Ok(ContentType::TextPlain),
        "text/markdown" => Ok(ContentType::TextMarkdown),
        "application/json-text" => Ok(ContentType::ApplicationJsonText),
        other => Err(NexusError::InvalidRequest { reason: format!("unknown content_type {other}") }),
    }
}

pub struct IngestPipeline {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn Embedder>,
    queue: Arc<dyn JobQueue>,
}

impl IngestPipeline {
    pub fn new(documents: Arc<dyn DocumentRepository>, chunks: Arc<dyn ChunkRepository>, embedder: Arc<dyn Embedder>, queue: Arc<dyn JobQueue>) -> Self {
        Self { documents, chunks, embedder, queue }
    }

    pub async fn enqueue_upload(
        &self,
        tenant_id: &TenantId,
        corpus_id: &CorpusId,
        filename: &str,
        content_type: ContentType,
        raw_text: String,
    ) -> Result<Document> {
        let document = Document {
            id: DocumentId::generate(),
            tenant_id: tenant_id.clone(),
            corpus_id: corpus_id.clone(),
            filename: filename.to_string(),
            content_type,
            status: DocumentStatus::Queued,
            failure_reason: None,
            queued_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            last_reindexed_at: None,
            last_job_id: None,
            ingest_source: IngestSource::Upload,
        };
        let document = self.documents.insert(document).await?;
        self.enqueue_job(&document, raw_text).await
    }

    /// Idempotent on `document_id`: a repeat call with the same id and an
    /// unfinished job returns a conflict; a repeat call against a terminal
    /// document only re-queues when `overwrite` is set.
    pub async fn enqueue_text(
        &self,
        tenant_id: &TenantId,
        corpus_id: &CorpusId,
        document_id: &DocumentId,
        raw_text: String,
        overwrite: bool,
    ) -> Result<Document> {
        match self.documents.get(tenant_id, document_id).await {
            Ok(existing) => {
                if existing.status.is_in_flight() {
                    return Ok(existing);
                }
                if !overwrite {
                    return Ok(existing);
                }
                let updated = self
                    .documents
                    .set_status(tenant_id, document_id, DocumentStatus::Queued, None, None)
                    .await?;
                self.enqueue_job(&updated, raw_text).await
            }
            Err(NexusError::NotFound { .. }) => {
                let document = Document {
                    id: document_id.clone(),
                    tenant_id: tenant_id.clone(),
                    corpus_id: corpus_id.clone(),
                    filename: document_id.as_str().to_string(),
                    content_type: ContentType::TextPlain,
                    status: DocumentStatus::Queued,
                    failure_reason: None,
                    queued_at: Utc::now(),
                    processing_started_at: None,
                    completed_at: None,
                    last_reindexed_at: None,
                    last_job_id: None,
                    ingest_source: IngestSource::Text,
                };
                let document = self.documents.insert(document).await?;
                self.enqueue_job(&document, raw_text).await
            }
            Err(e) => Err(e),
        }
    }

    /// Re-runs chunking + embedding for an existing terminal document,
    /// replacing its chunks atomically once the worker finishes.
    pub async fn enqueue_reindex(&self, tenant_id: &TenantId, document_id: &DocumentId, raw_text: String) -> Result<Document> {
        let existing = self.documents.get(tenant_id, document_id).await?;
        if existing.status.is_in_flight() {
            return Err(NexusError::Conflict { reason: "document has an in-flight ingest job".into() });
        }
        let updated = self.documents.set_status(tenant_id, document_id, DocumentStatus::Queued, None, None).await?;
        let payload = IngestJobPayload {
            tenant_id: tenant_id.as_str().to_string(),
            document_id: document_id.as_str().to_string(),
            corpus_id: updated.corpus_id.as_str().to_string(),
            content_type: content_type_str(updated.content_type).to_string(),
            raw_text,
        };
        let job_id = self
            .queue
            .enqueue(tenant_id, JOB_TYPE, serde_json::to_value(payload).map_err(|e| NexusError::Internal(e.to_string()))?)
            .await?;
        self.documents.set_status(tenant_id, document_id, DocumentStatus::Queued, None, Some(job_id)).await
    }

    pub async fn delete(&self, tenant_id: &TenantId, document_id: &DocumentId) -> Result<()> {
        let document = self.documents.get(tenant_id, document_id).await?;
        self.documents.delete(tenant_id, document_id).await?;
        self.chunks.delete_for_document(&document.corpus_id, document_id.as_str()).await?;
        Ok(())
    }

    async fn enqueue_job(&self, document: &Document, raw_text: String) -> Result<Document> {
        let payload = IngestJobPayload {
            tenant_id: document.tenant_id.as_str().to_string(),
            document_id: document.id.as_str().to_string(),
            corpus_id: document.corpus_id.as_str().to_string(),
            content_type: content_type_str(document.content_type).to_string(),
            raw_text,
        };
        let job_id = self
            .queue
            .enqueue(&document.tenant_id, JOB_TYPE, serde_json::to_value(payload).map_err(|e| NexusError::Internal(e.to_string()))?)
            .await?;
        self.documents
            .set_status(&document.tenant_id, &document.id, DocumentStatus::Queued, None, Some(job_id))
            .await
    }

    /// Runs the full worker-side pipeline for a leased job: sniff/normalize
    /// was already folded into the stored `raw_text`; this does
    /// chunk -> embed -> atomic write -> terminal status.
    pub async fn process_job(&self, job: &Job) -> Result<()> {
        let payload: IngestJobPayload =
            serde_json::from_value(job.payload.clone()).map_err(|e| NexusError::Internal(e.to_string()))?;
        let tenant_id = TenantId::new(payload.tenant_id);
        let document_id = DocumentId::new(payload.document_id);
        let corpus_id = CorpusId::new(payload.corpus_id);
        let content_type = parse_content_type(&payload.content_type)?;

        self.documents.set_status(&tenant_id, &document_id, DocumentStatus::Processing, None, Some(job.id.clone())).await?;

        let result = self.run_pipeline(&tenant_id, &corpus_id, &document_id, content_type, &payload.raw_text).await;
        match result {
            Ok(()) => {
                self.documents.set_status(&tenant_id, &document_id, DocumentStatus::Succeeded, None, Some(job.id.clone())).await?;
                Ok(())
            }
            Err(e) => {
                self.documents
                    .set_status(&tenant_id, &document_id, DocumentStatus::Failed, Some(e.to_string()), Some(job.id.clone()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        _tenant_id: &TenantId,
        corpus_id: &CorpusId,
        document_id: &DocumentId,
        content_type: ContentType,
        raw_text: &str,
    ) -> Result<()> {
        let normalized = normalize_to_text(content_type, raw_text.as_bytes())?;
        let pieces = chunk_text(&normalized, CHUNK_SIZE_CHARS, CHUNK_OVERLAP_CHARS);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let embedding = self.embedder.embed(&text);
                Chunk {
                    id: ChunkId::generate(),
                    corpus_id: corpus_id.clone(),
                    document_uri: document_id.as_str().to_string(),
                    chunk_index: index as u32,
                    text,
                    embedding,
                    metadata: HashMap::new(),
                }
            })
            .collect();
        self.chunks.replace_for_document(corpus_id, document_id.as_str(), chunks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_queue::job::InMemoryJobQueue;
    use nexus_retrieval::DeterministicEmbedder;
    use nexus_store::chunks::InMemoryChunkRepository;
    use nexus_store::documents::InMemoryDocumentRepository;

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(InMemoryChunkRepository::new()),
            Arc::new(DeterministicEmbedder::new()),
            Arc::new(InMemoryJobQueue::new()),
        )
    }

    #[tokio::test]
    async fn upload_then_worker_pass_marks_document_succeeded_with_chunks() {
        let pipeline = pipeline();
        let tenant = TenantId::new("t1");
        let corpus = CorpusId::new("c1");
        let doc = pipeline.enqueue_upload(&tenant, &corpus, "a.txt", ContentType::TextPlain, "hello world, this is a test document".into()).await.unwrap();

        let lease = pipeline.queue.lease(JOB_TYPE, "w1", 60).await.unwrap().unwrap();
        pipeline.process_job(&lease.job).await.unwrap();

        let updated = pipeline.documents.get(&tenant, &doc.id).await.unwrap();
        assert_eq!(updated.status, DocumentStatus::Succeeded);
    }

    #[tokio::test]
    async fn text_ingest_with_same_document_id_is_idempotent() {
        let pipeline = pipeline();
        let tenant = TenantId::new("t1");
        let corpus = CorpusId::new("c1");
        let doc_id = DocumentId::new("doc-1");

        let first = pipeline.enqueue_text(&tenant, &corpus, &doc_id, "version one".into(), false).await.unwrap();
        let lease = pipeline.queue.lease(JOB_TYPE, "w1", 60).await.unwrap().unwrap();
        pipeline.process_job(&lease.job).await.unwrap();

        let second = pipeline.enqueue_text(&tenant, &corpus, &doc_id, "version two".into(), false).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, DocumentStatus::Succeeded);
        assert!(pipeline.queue.lease(JOB_TYPE, "w1", 60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_true_requeues_a_terminal_document() {
        let pipeline = pipeline();
        let tenant = TenantId::new("t1");
        let corpus = CorpusId::new("c1");
        let doc_id = DocumentId::new("doc-1");

        pipeline.enqueue_text(&tenant, &corpus, &doc_id, "version one".into(), false).await.unwrap();
        let lease = pipeline.queue.lease(JOB_TYPE, "w1", 60).await.unwrap().unwrap();
        pipeline.process_job(&lease.job).await.unwrap();

        let requeued = pipeline.enqueue_text(&tenant, &corpus, &doc_id, "version two".into(), true).await.unwrap();
        assert_eq!(requeued.status, DocumentStatus::Queued);
        assert!(pipeline.queue.lease(JOB_TYPE, "w1", 60).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_refuses_in_flight_document() {
        let pipeline = pipeline();
        let tenant = TenantId::new("t1");
        let corpus = CorpusId::new("c1");
        let doc = pipeline.enqueue_upload(&tenant, &corpus, "a.txt", ContentType::TextPlain, "text".into()).await.unwrap();
        let err = pipeline.delete(&tenant, &doc.id).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }
}
