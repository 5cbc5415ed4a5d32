//! Query-time retrieval: embed the query, search one document's namespace

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::{SearchHit, VectorIndex};
use crate::providers::EmbeddingProvider;

/// Retrieval output, ordered most similar first
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub hits: Vec<SearchHit>,
}

impl RetrievedContext {
    /// Chunk texts joined by blank lines, preserving similarity order
    pub fn context_text(&self) -> String {
        self.hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Embeds query text and searches the document's namespace.
///
/// Any failure here is a retrieval failure to callers, whether the
/// query embedding or the index lookup broke.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub async fn retrieve(
        &self,
        namespace: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<RetrievedContext> {
        let embedding = self
            .embedder
            .embed(query_text)
            .await
            .map_err(|e| Error::Retrieval(format!("Query embedding failed: {}", e)))?;

        let hits = self
            .index
            .search(namespace, &embedding, top_k)
            .await
            .map_err(|e| Error::Retrieval(format!("Namespace search failed: {}", e)))?;

        tracing::debug!(
            "Retrieved {} chunks from namespace {} for query of {} chars",
            hits.len(),
            namespace,
            query_text.len()
        );

        Ok(RetrievedContext { hits })
    }
}
