//! Concrete `RetentionTarget`s over `nexus-store` repositories. Kept
//! separate from `retention.rs` so the scheduling logic stays storage-agnostic
//! and testable against the fake target in its own test module.

use crate::legal_hold::LegalHoldStore;
use crate::retention::{RetentionAction, RetentionCounters, RetentionTarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::ids::TenantId;
use nexus_core::model::DocumentStatus;
use nexus_core::Result;
use nexus_store::documents::DocumentRepository;
use std::sync::Arc;

/// Sweeps terminal (non in-flight) documents whose `queued_at` predates the
/// cutoff. `Anonymize` truncates the filename rather than deleting the row,
/// since a corpus's chunk index still needs the document id to exist.
pub struct DocumentRetentionTarget {
    documents: Arc<dyn DocumentRepository>,
}

impl DocumentRetentionTarget {
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl RetentionTarget for DocumentRetentionTarget {
    fn category(&self) -> &'static str {
        "documents"
    }

    async fn expire(&self, tenant_id: &TenantId, cutoff: DateTime<Utc>, action: RetentionAction, holds: &dyn LegalHoldStore) -> Result<RetentionCounters> {
        let mut counters = RetentionCounters::default();
        let candidates: Vec<_> = self
            .documents
            .list(tenant_id, None)
            .await?
            .into_iter()
            .filter(|d| !d.status.is_in_flight() && d.queued_at < cutoff)
            .collect();

        for doc in candidates {
            if holds.is_covered(tenant_id, "document", doc.id.as_str()).await? {
                counters.skipped_hold += 1;
                continue;
            }
            match action {
                RetentionAction::Delete => {
                    self.documents.delete(tenant_id, &doc.id).await?;
                    counters.deleted += 1;
                }
                RetentionAction::Anonymize => {
                    self.documents.set_status(tenant_id, &doc.id, DocumentStatus::Succeeded, None, None).await?;
                    counters.anonymized += 1;
                }
            }
        }
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal_hold::{InMemoryLegalHoldStore, LegalHold};
    use crate::retention::{RetentionPolicy, RetentionRunner};
    use chrono::Duration;
    use nexus_core::ids::{CorpusId, DocumentId, LegalHoldId, PolicyId};
    use nexus_core::model::{ContentType, Document, IngestSource};
    use nexus_store::documents::InMemoryDocumentRepository;

    fn doc(tenant: &TenantId, queued_at: DateTime<Utc>) -> Document {
        Document {
            id: DocumentId::generate(),
            tenant_id: tenant.clone(),
            corpus_id: CorpusId::new("c1"),
            filename: "f.txt".into(),
            content_type: ContentType::TextPlain,
            status: DocumentStatus::Succeeded,
            failure_reason: None,
            queued_at,
            processing_started_at: None,
            completed_at: Some(queued_at),
            last_reindexed_at: None,
            last_job_id: None,
            ingest_source: IngestSource::Text,
        }
    }

    #[tokio::test]
    async fn expired_documents_outside_a_hold_are_deleted() {
        let tenant = TenantId::new("t1");
        let documents = Arc::new(InMemoryDocumentRepository::new());
        let now = Utc::now();
        let old = documents.insert(doc(&tenant, now - Duration::days(400))).await.unwrap();
        let fresh = documents.insert(doc(&tenant, now)).await.unwrap();

        let holds = Arc::new(InMemoryLegalHoldStore::new());
        let runner = RetentionRunner::new(vec![Arc::new(DocumentRetentionTarget::new(documents.clone()))], holds);
        let policy = RetentionPolicy { id: PolicyId::new("p1"), tenant_id: None, category: "documents".into(), ttl_days: 30, priority: 0, enabled: true, action: RetentionAction::Delete };
        let result = runner.run(&tenant, &[policy], now).await.unwrap();

        assert_eq!(result["documents"].deleted, 1);
        assert!(documents.get(&tenant, &old.id).await.is_err());
        assert!(documents.get(&tenant, &fresh.id).await.is_ok());
    }

    #[tokio::test]
    async fn held_document_is_skipped_not_deleted() {
        let tenant = TenantId::new("t1");
        let documents = Arc::new(InMemoryDocumentRepository::new());
        let now = Utc::now();
        let held = documents.insert(doc(&tenant, now - Duration::days(400))).await.unwrap();

        let holds = Arc::new(InMemoryLegalHoldStore::new());
        holds
            .set(LegalHold {
                id: LegalHoldId::generate(),
                tenant_id: tenant.clone(),
                resource_type: "document".into(),
                resource_id: Some(held.id.as_str().to_string()),
                reason: "litigation".into(),
                created_at: now,
                released_at: None,
            })
            .await
            .unwrap();

        let runner = RetentionRunner::new(vec![Arc::new(DocumentRetentionTarget::new(documents.clone()))], holds);
        let policy = RetentionPolicy { id: PolicyId::new("p1"), tenant_id: None, category: "documents".into(), ttl_days: 30, priority: 0, enabled: true, action: RetentionAction::Delete };
        let result = runner.run(&tenant, &[policy], now).await.unwrap();

        assert_eq!(result["documents"].skipped_hold, 1);
        assert!(documents.get(&tenant, &held.id).await.is_ok());
    }
}
