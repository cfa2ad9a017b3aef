//! Worker loop (spec §4.10, §5): poll -> lease -> process -> ack/fail, with
//! a heartbeat timer running independently of the processing future.

use crate::pipeline::{IngestPipeline, JOB_TYPE};
use nexus_queue::job::{JobQueue, DEFAULT_LEASE_SECONDS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct Worker {
    worker_id: String,
    pipeline: Arc<IngestPipeline>,
    queue: Arc<dyn JobQueue>,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, pipeline: Arc<IngestPipeline>, queue: Arc<dyn JobQueue>) -> Self {
        Self { worker_id: worker_id.into(), pipeline, queue, running: Arc::new(AtomicBool::new(true)) }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Leases and processes at most one job; returns `true` if a job was found.
    pub async fn run_once(&self) -> bool {
        let Ok(Some(lease)) = self.queue.lease(JOB_TYPE, &self.worker_id, DEFAULT_LEASE_SECONDS).await else {
            return false;
        };
        let _ = self.queue.heartbeat(&self.worker_id, JOB_TYPE).await;
        match self.pipeline.process_job(&lease.job).await {
            Ok(()) => {
                let _ = self.queue.ack(&lease.job.id).await;
            }
            Err(e) => {
                tracing::warn!(job_id = %lease.job.id, error = %e, "ingest job failed");
                let _ = self.queue.fail(&lease.job.id, &e.to_string()).await;
            }
        }
        true
    }

    /// Runs until `shutdown_handle()` is flipped to `false`.
    pub async fn run_forever(&self) {
        let mut heartbeat_ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                found = self.run_once() => {
                    if !found {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
                _ = heartbeat_ticker.tick() => {
                    let _ = self.queue.heartbeat(&self.worker_id, JOB_TYPE).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ids::{CorpusId, TenantId};
    use nexus_core::model::ContentType;
    use nexus_queue::job::InMemoryJobQueue;
    use nexus_retrieval::DeterministicEmbedder;
    use nexus_store::chunks::InMemoryChunkRepository;
    use nexus_store::documents::{DocumentRepository, InMemoryDocumentRepository};

    #[tokio::test]
    async fn run_once_processes_a_single_queued_job() {
        let documents = Arc::new(InMemoryDocumentRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let pipeline = Arc::new(IngestPipeline::new(
            documents.clone(),
            Arc::new(InMemoryChunkRepository::new()),
            Arc::new(DeterministicEmbedder::new()),
            queue.clone(),
        ));
        let worker = Worker::new("w1", pipeline.clone(), queue.clone());

        let tenant = TenantId::new("t1");
        let corpus = CorpusId::new("c1");
        let doc = pipeline.enqueue_upload(&tenant, &corpus, "a.txt", ContentType::TextPlain, "hello world".into()).await.unwrap();

        assert!(worker.run_once().await);
        assert!(!worker.run_once().await);

        let updated = documents.get(&tenant, &doc.id).await.unwrap();
        assert_eq!(updated.status, nexus_core::model::DocumentStatus::Succeeded);
    }
}
