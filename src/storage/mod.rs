//! Persistence: document registry and per-document conversation history

mod database;

pub use database::ChatDb;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Document, DocumentStatus, Message};

/// Registry of uploaded documents and their processing status
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn create(&self, document: &Document) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    /// Fetch a document only if it belongs to the given owner
    async fn get_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<Document>>;

    /// All documents for an owner, newest first
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Document>>;

    /// Look up an owner's document by content hash, for duplicate detection
    async fn find_by_hash(&self, owner_id: &str, content_hash: &str)
        -> Result<Option<Document>>;

    async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<()>;
}

/// Append-only conversation log, one thread per document
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, message: &Message) -> Result<()>;

    /// The last `limit` messages in chronological order
    async fn recent(&self, document_id: Uuid, limit: usize) -> Result<Vec<Message>>;

    /// The full thread in chronological order
    async fn list(&self, document_id: Uuid) -> Result<Vec<Message>>;
}
