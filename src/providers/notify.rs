//! Terminal-state notifications for processed uploads

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::DocumentStatus;

/// Notified once per document when ingestion reaches a terminal state.
///
/// Notification failures never affect the recorded status, so the trait
/// is infallible by construction.
#[async_trait]
pub trait UploadNotifier: Send + Sync {
    async fn document_processed(&self, document_id: Uuid, status: DocumentStatus);
}

/// Default notifier that only logs the outcome
pub struct LogNotifier;

#[async_trait]
impl UploadNotifier for LogNotifier {
    async fn document_processed(&self, document_id: Uuid, status: DocumentStatus) {
        tracing::info!("Document {} processed: {}", document_id, status.as_str());
    }
}
