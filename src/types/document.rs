//! Document and chunk types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Created, ingestion not yet started
    Pending,
    /// Ingestion in progress
    Processing,
    /// Every page embedded and indexed
    Success,
    /// Load failure, quota violation, or upstream error during ingestion
    Failed,
}

impl DocumentStatus {
    /// Stable string form used in storage and API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the storage string form
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "SUCCESS" => Self::Success,
            _ => Self::Failed,
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// An uploaded document and its processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID (also the vector namespace name)
    pub id: Uuid,
    /// Resolved owner identity
    pub owner_id: String,
    /// Original filename
    pub filename: String,
    /// Where the raw upload was written
    pub storage_path: Option<String>,
    /// SHA-256 of the uploaded bytes (hex)
    pub content_hash: String,
    /// Upload size in bytes
    pub file_size: u64,
    /// Page count recorded at upload time; the quota check recounts from
    /// the loader output
    pub page_count: Option<u32>,
    /// Processing status
    pub status: DocumentStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document in PENDING state
    pub fn new(
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        content_hash: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            storage_path: None,
            content_hash: content_hash.into(),
            file_size,
            page_count: None,
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Namespace under which this document's vectors live
    pub fn namespace(&self) -> String {
        self.id.to_string()
    }
}

/// One page worth of extracted text, prior to embedding.
///
/// Transient: produced by the loader, consumed by the ingestion pipeline.
/// The durable form is the vector record in the document's namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Source document
    pub document_id: Uuid,
    /// 1-based page position
    pub position: u32,
    /// Extracted text (may be empty for pages with no extractable text)
    pub text: String,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(document_id: Uuid, position: u32, text: impl Into<String>) -> Self {
        Self {
            document_id,
            position,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Success,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(DocumentStatus::Success.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_namespace_matches_id() {
        let doc = Document::new("user-1", "report.pdf", "abc123", 1024);
        assert_eq!(doc.namespace(), doc.id.to_string());
    }
}
