//! Core data types

pub mod document;
pub mod message;

pub use document::{Chunk, Document, DocumentStatus};
pub use message::{Message, MessageRole};

/// Subscription tier resolved for a user; read-only to the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Plan name (e.g. "free", "pro")
    pub plan: String,
    /// Maximum pages per ingested document
    pub max_units: usize,
}
