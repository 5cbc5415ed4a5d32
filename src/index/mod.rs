//! Vector index: one logical index, one namespace per document

mod memory;

pub use memory::InMemoryIndex;

use async_trait::async_trait;

use crate::error::Result;

/// A stored embedding together with the text it was computed from
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub embedding: Vec<f32>,
    pub text: String,
    pub position: u32,
}

/// A retrieval result, scored against the query embedding
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub position: u32,
    pub similarity: f32,
}

/// Backend-agnostic vector index.
///
/// Namespaces partition the index so a search never crosses document
/// boundaries. Upserting appends to a namespace; callers that want
/// replace semantics delete the namespace first.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Top-k nearest records by cosine similarity, ties broken by
    /// ascending position
    async fn search(&self, namespace: &str, query: &[f32], top_k: usize)
        -> Result<Vec<SearchHit>>;

    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    async fn count(&self, namespace: &str) -> Result<usize>;
}

/// Cosine similarity with a zero-norm guard
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
