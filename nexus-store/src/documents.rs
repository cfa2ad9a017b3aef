//! Document repository (spec §3, §4.10): status lifecycle and the
//! "in-flight documents can't be deleted" invariant (spec §8.5).

use async_trait::async_trait;
use chrono::Utc;
use nexus_core::ids::{CorpusId, DocumentId, JobId, TenantId};
use nexus_core::model::{ContentType, Document, DocumentStatus, IngestSource};
use nexus_core::{NexusError, Result};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, doc: Document) -> Result<Document>;
    async fn get(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<Document>;
    async fn list(&self, tenant_id: &TenantId, corpus_id: Option<&CorpusId>) -> Result<Vec<Document>>;
    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
        status: DocumentStatus,
        failure_reason: Option<String>,
        job_id: Option<JobId>,
    ) -> Result<Document>;
    /// Returns `409 Conflict` if the document is `queued`/`processing`.
    async fn delete(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<()>;
}

fn row_to_content_type(s: &str) -> Result<ContentType> {
    match s {
        "text/plain" => Ok(ContentType::TextPlain),
        "text/markdown" => Ok(ContentType::TextMarkdown),
        "application/json-text" => Ok(ContentType::ApplicationJsonText),
        other => Err(NexusError::InvalidRequest { reason: format!("unknown content_type {other}") }),
    }
}

pub fn content_type_str(ct: ContentType) -> &'static str {
    match ct {
        ContentType::TextPlain => "text/plain",
        ContentType::TextMarkdown => "text/markdown",
        ContentType::ApplicationJsonText => "application/json-text",
    }
}

fn status_str(s: DocumentStatus) -> &'static str {
    match s {
        DocumentStatus::Queued => "queued",
        DocumentStatus::Processing => "processing",
        DocumentStatus::Succeeded => "succeeded",
        DocumentStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> Result<DocumentStatus> {
    match s {
        "queued" => Ok(DocumentStatus::Queued),
        "processing" => Ok(DocumentStatus::Processing),
        "succeeded" => Ok(DocumentStatus::Succeeded),
        "failed" => Ok(DocumentStatus::Failed),
        other => Err(NexusError::Internal(format!("corrupt document status {other}"))),
    }
}

fn source_str(s: IngestSource) -> &'static str {
    match s {
        IngestSource::Upload => "upload",
        IngestSource::Text => "text",
        IngestSource::Reindex => "reindex",
    }
}

fn parse_source(s: &str) -> Result<IngestSource> {
    match s {
        "upload" => Ok(IngestSource::Upload),
        "text" => Ok(IngestSource::Text),
        "reindex" => Ok(IngestSource::Reindex),
        other => Err(NexusError::Internal(format!("corrupt ingest_source {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    tenant_id: String,
    corpus_id: String,
    filename: String,
    content_type: String,
    status: String,
    failure_reason: Option<String>,
    queued_at: chrono::DateTime<Utc>,
    processing_started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    last_reindexed_at: Option<chrono::DateTime<Utc>>,
    last_job_id: Option<String>,
    ingest_source: String,
}

impl DocumentRow {
    fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: DocumentId::new(self.id),
            tenant_id: TenantId::new(self.tenant_id),
            corpus_id: CorpusId::new(self.corpus_id),
            filename: self.filename,
            content_type: row_to_content_type(&self.content_type)?,
            status: parse_status(&self.status)?,
            failure_reason: self.failure_reason,
            queued_at: self.queued_at,
            processing_started_at: self.processing_started_at,
            completed_at: self.completed_at,
            last_reindexed_at: self.last_reindexed_at,
            last_job_id: self.last_job_id.map(JobId::new),
            ingest_source: parse_source(&self.ingest_source)?,
        })
    }
}

pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn insert(&self, doc: Document) -> Result<Document> {
        sqlx::query(
            "insert into documents (id, tenant_id, corpus_id, filename, content_type, status, \
             failure_reason, queued_at, processing_started_at, completed_at, last_reindexed_at, \
             last_job_id, ingest_source) values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(doc.id.as_str())
        .bind(doc.tenant_id.as_str())
        .bind(doc.corpus_id.as_str())
        .bind(&doc.filename)
        .bind(content_type_str(doc.content_type))
        .bind(status_str(doc.status))
        .bind(&doc.failure_reason)
        .bind(doc.queued_at)
        .bind(doc.processing_started_at)
        .bind(doc.completed_at)
        .bind(doc.last_reindexed_at)
        .bind(doc.last_job_id.as_ref().map(|j| j.as_str()))
        .bind(source_str(doc.ingest_source))
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(doc)
    }

    async fn get(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<Document> {
        let row: DocumentRow =
            sqlx::query_as("select * from documents where tenant_id = $1 and id = $2")
                .bind(tenant_id.as_str())
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| NexusError::Internal(e.to_string()))?
                .ok_or_else(|| NexusError::NotFound {
                    resource_type: "document".into(),
                    resource_id: id.as_str().to_string(),
                })?;
        row.into_document()
    }

    async fn list(&self, tenant_id: &TenantId, corpus_id: Option<&CorpusId>) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = if let Some(corpus_id) = corpus_id {
            sqlx::query_as("select * from documents where tenant_id = $1 and corpus_id = $2 order by queued_at desc")
                .bind(tenant_id.as_str())
                .bind(corpus_id.as_str())
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query_as("select * from documents where tenant_id = $1 order by queued_at desc")
                .bind(tenant_id.as_str())
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        rows.into_iter().map(DocumentRow::into_document).collect()
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
        status: DocumentStatus,
        failure_reason: Option<String>,
        job_id: Option<JobId>,
    ) -> Result<Document> {
        let now = Utc::now();
        let (processing_started_at, completed_at) = match status {
            DocumentStatus::Processing => (Some(now), None),
            DocumentStatus::Succeeded | DocumentStatus::Failed => (None, Some(now)),
            DocumentStatus::Queued => (None, None),
        };
        sqlx::query(
            "update documents set status = $3, failure_reason = $4, last_job_id = coalesce($5, last_job_id), \
             processing_started_at = coalesce($6, processing_started_at), completed_at = coalesce($7, completed_at) \
             where tenant_id = $1 and id = $2",
        )
        .bind(tenant_id.as_str())
        .bind(id.as_str())
        .bind(status_str(status))
        .bind(&failure_reason)
        .bind(job_id.as_ref().map(|j| j.as_str()))
        .bind(processing_started_at)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| NexusError::Internal(e.to_string()))?;
        self.get(tenant_id, id).await
    }

    async fn delete(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<()> {
        let doc = self.get(tenant_id, id).await?;
        if doc.status.is_in_flight() {
            return Err(NexusError::Conflict { reason: "document is queued or processing".into() });
        }
        sqlx::query("delete from documents where tenant_id = $1 and id = $2")
            .bind(tenant_id.as_str())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        Ok(())
    }
}

/// Reference in-memory implementation used across the workspace's test
/// suites — same contract as `PgDocumentRepository`, exercised identically.
#[derive(Default)]
pub struct InMemoryDocumentRepository {
    docs: RwLock<HashMap<(String, String), Document>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &TenantId, id: &DocumentId) -> (String, String) {
        (tenant_id.as_str().to_string(), id.as_str().to_string())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, doc: Document) -> Result<Document> {
        let key = Self::key(&doc.tenant_id, &doc.id);
        self.docs.write().unwrap().insert(key, doc.clone());
        Ok(doc)
    }

    async fn get(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<Document> {
        self.docs
            .read()
            .unwrap()
            .get(&Self::key(tenant_id, id))
            .cloned()
            .ok_or_else(|| NexusError::NotFound {
                resource_type: "document".into(),
                resource_id: id.as_str().to_string(),
            })
    }

    async fn list(&self, tenant_id: &TenantId, corpus_id: Option<&CorpusId>) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .values()
            .filter(|d| &d.tenant_id == tenant_id && corpus_id.map(|c| &d.corpus_id == c).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        tenant_id: &TenantId,
        id: &DocumentId,
        status: DocumentStatus,
        failure_reason: Option<String>,
        job_id: Option<JobId>,
    ) -> Result<Document> {
        let mut docs = self.docs.write().unwrap();
        let doc = docs.get_mut(&Self::key(tenant_id, id)).ok_or_else(|| NexusError::NotFound {
            resource_type: "document".into(),
            resource_id: id.as_str().to_string(),
        })?;
        doc.status = status;
        doc.failure_reason = failure_reason;
        if let Some(job_id) = job_id {
            doc.last_job_id = Some(job_id);
        }
        let now = Utc::now();
        match status {
            DocumentStatus::Processing => doc.processing_started_at = Some(now),
            DocumentStatus::Succeeded | DocumentStatus::Failed => doc.completed_at = Some(now),
            DocumentStatus::Queued => {}
        }
        Ok(doc.clone())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &DocumentId) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        let key = Self::key(tenant_id, id);
        let doc = docs.get(&key).ok_or_else(|| NexusError::NotFound {
            resource_type: "document".into(),
            resource_id: id.as_str().to_string(),
        })?;
        if doc.status.is_in_flight() {
            return Err(NexusError::Conflict { reason: "document is queued or processing".into() });
        }
        docs.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ids::CorpusId;

    fn doc(status: DocumentStatus) -> Document {
        Document {
            id: DocumentId::generate(),
            tenant_id: TenantId::new("t1"),
            corpus_id: CorpusId::new("c1"),
            filename: "f.txt".into(),
            content_type: ContentType::TextPlain,
            status,
            failure_reason: None,
            queued_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
            last_reindexed_at: None,
            last_job_id: None,
            ingest_source: IngestSource::Text,
        }
    }

    #[tokio::test]
    async fn delete_rejects_in_flight_documents() {
        let repo = InMemoryDocumentRepository::new();
        let d = repo.insert(doc(DocumentStatus::Processing)).await.unwrap();
        let err = repo.delete(&d.tenant_id, &d.id).await.unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn delete_allows_terminal_documents() {
        let repo = InMemoryDocumentRepository::new();
        let d = repo.insert(doc(DocumentStatus::Succeeded)).await.unwrap();
        repo.delete(&d.tenant_id, &d.id).await.unwrap();
        assert!(repo.get(&d.tenant_id, &d.id).await.is_err());
    }
}
