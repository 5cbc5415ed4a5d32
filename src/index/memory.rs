//! In-process vector index backed by a concurrent map

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::index::{cosine_similarity, SearchHit, VectorIndex, VectorRecord};

/// Exact-scan index keyed by namespace.
///
/// Every search scores the full namespace, which is the right trade for
/// per-document namespaces that top out at a few dozen pages.
pub struct InMemoryIndex {
    dimensions: usize,
    namespaces: DashMap<String, Vec<VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            namespaces: DashMap::new(),
        }
    }

    fn check_dimensions(&self, len: usize, what: &str) -> Result<()> {
        if len != self.dimensions {
            return Err(Error::Index(format!(
                "{} has {} dimensions, index expects {}",
                what, len, self.dimensions
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<()> {
        for record in &records {
            self.check_dimensions(record.embedding.len(), "record embedding")?;
        }
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .extend(records);
        Ok(())
    }

    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_dimensions(query.len(), "query embedding")?;

        let Some(records) = self.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = records
            .iter()
            .map(|r| SearchHit {
                text: r.text.clone(),
                position: r.position,
                similarity: cosine_similarity(query, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.remove(namespace);
        Ok(())
    }

    async fn count(&self, namespace: &str) -> Result<usize> {
        Ok(self.namespaces.get(namespace).map_or(0, |r| r.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(embedding: Vec<f32>, text: &str, position: u32) -> VectorRecord {
        VectorRecord {
            embedding,
            text: text.to_string(),
            position,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(
                "doc",
                vec![
                    record(vec![0.0, 1.0], "orthogonal", 1),
                    record(vec![1.0, 0.1], "close", 2),
                    record(vec![1.0, 0.0], "exact", 3),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("doc", &[1.0, 0.0], 3).await.unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "exact");
        assert_eq!(hits[1].text, "close");
        assert_eq!(hits[2].text, "orthogonal");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_ties_break_by_ascending_position() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(
                "doc",
                vec![
                    record(vec![1.0, 0.0], "later page", 7),
                    record(vec![2.0, 0.0], "earlier page", 2),
                    record(vec![0.5, 0.0], "middle page", 4),
                ],
            )
            .await
            .unwrap();

        // All three are colinear with the query, so every similarity ties
        let hits = index.search("doc", &[1.0, 0.0], 3).await.unwrap();

        assert_eq!(hits[0].position, 2);
        assert_eq!(hits[1].position, 4);
        assert_eq!(hits[2].position, 7);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let index = InMemoryIndex::new(3);
        index
            .upsert(
                "doc",
                vec![
                    record(vec![0.1, 0.2, 0.3], "a", 1),
                    record(vec![0.3, 0.2, 0.1], "b", 2),
                    record(vec![0.2, 0.2, 0.2], "c", 3),
                ],
            )
            .await
            .unwrap();

        let first = index.search("doc", &[0.2, 0.1, 0.4], 2).await.unwrap();
        let second = index.search("doc", &[0.2, 0.1, 0.4], 2).await.unwrap();

        let order = |hits: &[SearchHit]| hits.iter().map(|h| h.position).collect::<Vec<_>>();
        assert_eq!(order(&first), order(&second));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let index = InMemoryIndex::new(2);
        index
            .upsert("doc-a", vec![record(vec![1.0, 0.0], "from a", 1)])
            .await
            .unwrap();
        index
            .upsert("doc-b", vec![record(vec![1.0, 0.0], "from b", 1)])
            .await
            .unwrap();

        let hits = index.search("doc-a", &[1.0, 0.0], 10).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "from a");
    }

    #[tokio::test]
    async fn test_unknown_namespace_returns_empty() {
        let index = InMemoryIndex::new(2);
        let hits = index.search("missing", &[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_namespace_drops_records() {
        let index = InMemoryIndex::new(2);
        index
            .upsert("doc", vec![record(vec![1.0, 0.0], "gone soon", 1)])
            .await
            .unwrap();
        assert_eq!(index.count("doc").await.unwrap(), 1);

        index.delete_namespace("doc").await.unwrap();

        assert_eq!(index.count("doc").await.unwrap(), 0);
        assert!(index.search("doc", &[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let index = InMemoryIndex::new(3);
        let err = index
            .upsert("doc", vec![record(vec![1.0, 0.0], "too short", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Index(_)));

        let err = index.search("doc", &[1.0], 5).await.unwrap_err();
        assert!(matches!(err, Error::Index(_)));
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let index = InMemoryIndex::new(2);
        let records = (1..=10)
            .map(|i| record(vec![1.0, i as f32 * 0.01], "page", i))
            .collect();
        index.upsert("doc", records).await.unwrap();

        let hits = index.search("doc", &[1.0, 0.0], 4).await.unwrap();
        assert_eq!(hits.len(), 4);
    }
}
