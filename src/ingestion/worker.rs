//! Background worker that drains the ingestion queue
//!
//! Upload routes hand jobs to a bounded channel and return immediately;
//! a semaphore caps how many documents are ingested at once.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use super::IngestPipeline;
use crate::error::{Error, Result};

/// One queued upload, owned by the worker once submitted
#[derive(Debug)]
pub struct IngestJob {
    pub document_id: Uuid,
    pub owner_id: String,
    pub data: Vec<u8>,
}

/// Submission side of the ingestion queue
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    /// Create the queue and the receiver the worker will drain
    pub fn new(depth: usize) -> (Self, mpsc::Receiver<IngestJob>) {
        let (sender, receiver) = mpsc::channel(depth.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a document for ingestion without waiting.
    ///
    /// Fails when the queue is full (workers have fallen behind) or the
    /// worker is gone; the caller decides whether that is retryable.
    pub fn submit(&self, job: IngestJob) -> Result<()> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Busy("ingestion queue is full, retry later".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Internal("ingestion worker is not running".to_string())
            }
        })
    }
}

/// Pulls jobs off the queue and runs them through the pipeline, a bounded
/// number at a time
pub struct IngestWorker {
    pipeline: Arc<IngestPipeline>,
    limiter: Arc<Semaphore>,
    slots: usize,
}

impl IngestWorker {
    pub fn new(pipeline: Arc<IngestPipeline>, worker_count: usize) -> Self {
        let slots = worker_count.max(1);
        Self {
            pipeline,
            limiter: Arc::new(Semaphore::new(slots)),
            slots,
        }
    }

    /// Drain the queue until every sender is dropped.
    ///
    /// Each job runs on its own task; a permit is taken before spawning so
    /// the channel stays the only backlog.
    pub async fn run(self, mut receiver: mpsc::Receiver<IngestJob>) {
        tracing::info!("Ingestion worker started: {} concurrent jobs", self.slots);

        while let Some(job) = receiver.recv().await {
            let permit = match self.limiter.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                let _permit = permit;
                tracing::info!(
                    "Ingesting document {} ({} bytes) for {}",
                    job.document_id,
                    job.data.len(),
                    job.owner_id
                );
                let status = pipeline
                    .ingest(job.document_id, &job.owner_id, job.data)
                    .await;
                tracing::info!(
                    "Document {} finished with status {}",
                    job.document_id,
                    status.as_str()
                );
            });
        }

        tracing::info!("Ingestion worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::time::Duration;

    use crate::config::{EmbeddingConfig, PlanConfig};
    use crate::index::InMemoryIndex;
    use crate::loader::DocumentLoader;
    use crate::providers::{ConfigSubscriptions, LogNotifier};
    use crate::storage::{ChatDb, DocumentRegistry};
    use crate::types::{Chunk, Document, DocumentStatus};

    struct TwoPageLoader;

    #[async_trait]
    impl DocumentLoader for TwoPageLoader {
        async fn load(&self, document_id: Uuid, _data: Vec<u8>) -> Result<Vec<Chunk>> {
            Ok(vec![
                Chunk::new(document_id, 1, "first page"),
                Chunk::new(document_id, 2, "second page"),
            ])
        }
    }

    struct FlatEmbedder;

    #[async_trait]
    impl crate::providers::EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5, 0.5])
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "flat"
        }
    }

    fn test_pipeline(db: Arc<ChatDb>) -> Arc<IngestPipeline> {
        Arc::new(IngestPipeline::new(
            Arc::new(TwoPageLoader),
            db,
            Arc::new(ConfigSubscriptions::from_config(&PlanConfig::default()).unwrap()),
            Arc::new(FlatEmbedder),
            Arc::new(InMemoryIndex::new(2)),
            Arc::new(LogNotifier),
            &EmbeddingConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_worker_processes_queued_jobs() {
        let db = Arc::new(ChatDb::in_memory().unwrap());
        let mut ids = Vec::new();
        for i in 0..3 {
            let document = Document::new("tester", format!("doc-{}.pdf", i), format!("hash-{}", i), 100);
            db.create(&document).await.unwrap();
            ids.push(document.id);
        }

        let (queue, receiver) = IngestQueue::new(10);
        let worker = IngestWorker::new(test_pipeline(db.clone()), 2);
        tokio::spawn(worker.run(receiver));

        for id in &ids {
            queue
                .submit(IngestJob {
                    document_id: *id,
                    owner_id: "tester".to_string(),
                    data: b"%PDF".to_vec(),
                })
                .unwrap();
        }

        // Poll until every document reaches a terminal state.
        let mut settled = false;
        for _ in 0..200 {
            let mut all_terminal = true;
            for id in &ids {
                let document = db.get(*id).await.unwrap().unwrap();
                if !document.status.is_terminal() {
                    all_terminal = false;
                }
            }
            if all_terminal {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(settled, "jobs did not finish in time");

        for id in &ids {
            assert_eq!(
                db.get(*id).await.unwrap().unwrap().status,
                DocumentStatus::Success
            );
        }
    }

    #[tokio::test]
    async fn test_submit_fails_when_queue_full() {
        // No worker draining, so the second submit hits the depth limit.
        let (queue, _receiver) = IngestQueue::new(1);

        let job = |n: u32| IngestJob {
            document_id: Uuid::new_v4(),
            owner_id: format!("user-{}", n),
            data: Vec::new(),
        };

        queue.submit(job(1)).unwrap();
        let err = queue.submit(job(2)).unwrap_err();
        assert!(matches!(err, Error::Busy(_)));
    }

    #[tokio::test]
    async fn test_submit_fails_after_worker_stopped() {
        let (queue, receiver) = IngestQueue::new(4);
        drop(receiver);

        let err = queue
            .submit(IngestJob {
                document_id: Uuid::new_v4(),
                owner_id: "tester".to_string(),
                data: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
