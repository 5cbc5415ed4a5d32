//! docchat-rag: chat with your PDFs over a retrieval-augmented pipeline
//!
//! Uploaded documents are split into pages, embedded, and indexed under a
//! per-document vector namespace. Questions retrieve the closest pages and
//! stream a grounded answer while the conversation is persisted alongside
//! the document. Embeddings and generation run on Ollama or the Gemini API.

pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod loader;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use types::{Chunk, Document, DocumentStatus, Message, MessageRole, Tier};
