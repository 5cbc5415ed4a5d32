//! Ingestion pipeline: extraction, quota enforcement, embedding, indexing
//!
//! One invocation takes a document from uploaded bytes to either SUCCESS
//! (every page embedded and indexed) or FAILED. The terminal status is
//! written exactly once per invocation, and a quota violation is decided
//! before the first embedding call so an oversized document costs nothing
//! upstream.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::index::{VectorIndex, VectorRecord};
use crate::loader::DocumentLoader;
use crate::providers::{EmbeddingProvider, SubscriptionResolver, UploadNotifier};
use crate::storage::DocumentRegistry;
use crate::types::{Chunk, DocumentStatus};

/// Drives one document through load, quota check, embedding, and indexing
pub struct IngestPipeline {
    loader: Arc<dyn DocumentLoader>,
    registry: Arc<dyn DocumentRegistry>,
    subscriptions: Arc<dyn SubscriptionResolver>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    notifier: Arc<dyn UploadNotifier>,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        registry: Arc<dyn DocumentRegistry>,
        subscriptions: Arc<dyn SubscriptionResolver>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        notifier: Arc<dyn UploadNotifier>,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            loader,
            registry,
            subscriptions,
            embedder,
            index,
            notifier,
            batch_size: embedding.batch_size.max(1),
        }
    }

    /// Ingest one uploaded document and record its terminal status.
    ///
    /// Never returns an error: failures become the FAILED status plus a
    /// tracing record, since nothing upstream is waiting on this call.
    pub async fn ingest(
        &self,
        document_id: Uuid,
        owner_id: &str,
        data: Vec<u8>,
    ) -> DocumentStatus {
        let started = Instant::now();

        let status = match self.process(document_id, owner_id, data).await {
            Ok(pages) => {
                tracing::info!(
                    "Document {} ingested: {} pages indexed in {:.1}s",
                    document_id,
                    pages,
                    started.elapsed().as_secs_f64()
                );
                DocumentStatus::Success
            }
            Err(e) => {
                tracing::warn!("Document {} ingestion failed: {}", document_id, e);
                DocumentStatus::Failed
            }
        };

        // The only terminal transition for this document.
        if let Err(e) = self.registry.set_status(document_id, status).await {
            tracing::error!(
                "Failed to record terminal status for document {}: {}",
                document_id,
                e
            );
        }
        self.notifier.document_processed(document_id, status).await;

        status
    }

    async fn process(&self, document_id: Uuid, owner_id: &str, data: Vec<u8>) -> Result<usize> {
        // Re-assert PROCESSING; the upload route set it when the job was
        // queued, but a requeued job goes through here again.
        self.registry
            .set_status(document_id, DocumentStatus::Processing)
            .await?;

        let chunks = self.loader.load(document_id, data).await?;
        let unit_count = chunks.len();

        // Quota gate. Runs before any embedding call; a page count equal
        // to the limit is allowed, one over is not.
        let tier = self.subscriptions.tier_for(owner_id).await?;
        if unit_count > tier.max_units {
            return Err(Error::QuotaExceeded {
                unit_count,
                max_units: tier.max_units,
            });
        }

        let embeddings = self.embed_chunks(&chunks).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord {
                embedding,
                text: chunk.text.clone(),
                position: chunk.position,
            })
            .collect();

        // Clear before upsert so re-ingesting an id fully replaces its
        // namespace instead of accumulating stale records.
        let namespace = document_id.to_string();
        self.index.delete_namespace(&namespace).await?;
        self.index.upsert(&namespace, records).await?;

        Ok(unit_count)
    }

    /// Embed every chunk text in configured sub-batches, order-preserving
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let mut embeddings = Vec::with_capacity(texts.len());
        for group in texts.chunks(self.batch_size) {
            let mut batch = self.embedder.embed_batch(group).await?;
            embeddings.append(&mut batch);
        }

        Ok(embeddings)
    }
}
