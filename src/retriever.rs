//! Query embedding plus nearest-neighbour lookup against the configured index backend.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{CatalogRecord, TestType};
use crate::embedder::{normalize, Embedder};
use crate::index::FlatIndex;
use crate::vector_store::PgVectorIndex;

/// Catalog record returned by a search, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    /// Matched catalog entry.
    #[serde(flatten)]
    pub record: CatalogRecord,
    /// Cosine similarity with the query.
    pub score: f32,
}

impl RetrievedItem {
    /// Shorthand for `record.test_type`.
    pub fn test_type(&self) -> TestType {
        self.record.test_type
    }
}

/// Where vectors live.
pub enum IndexBackend {
    /// In-memory flat index loaded from JSONL.
    Flat(FlatIndex),
    /// pgvector table.
    PgVector(PgVectorIndex),
}

impl IndexBackend {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedItem>> {
        match self {
            Self::Flat(index) => Ok(index.search(embedding, k)?),
            Self::PgVector(index) => index.search(embedding, k).await,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Flat(_) => "flat",
            Self::PgVector(_) => "pgvector",
        }
    }
}

/// Embeds query text and searches the backend.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    backend: IndexBackend,
}

impl Retriever {
    /// Pairs an embedder with an index backend built from the same model.
    pub fn new(embedder: Arc<dyn Embedder>, backend: IndexBackend) -> Self {
        Self { embedder, backend }
    }

    /// Returns up to `top_k` items by descending similarity. Failures propagate.
    pub async fn retrieve(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedItem>> {
        let embedding = self.embed_query(text.to_string()).await?;
        let items = self.backend.search(&embedding, top_k).await?;
        debug!(
            backend = self.backend.label(),
            top_k,
            hits = items.len(),
            "retrieved candidates"
        );
        Ok(items)
    }

    async fn embed_query(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let mut embedding = tokio::task::spawn_blocking(move || {
            let mut embeddings = embedder.embed_batch(&[text.as_str()])?;
            embeddings
                .pop()
                .ok_or_else(|| anyhow!("embedding model returned no vector"))
        })
        .await
        .map_err(|err| anyhow!("embedding task join error: {err}"))??;
        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::tests::entry;

    /// Maps text to a fixed 3-d vector by keyword, so tests can steer search results.
    pub(crate) struct KeywordEmbedder;

    impl Embedder for KeywordEmbedder {
        fn model(&self) -> &str {
            "keyword"
        }

        fn batch_size(&self) -> usize {
            8
        }

        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let text = text.to_lowercase();
                    vec![
                        if text.contains("java") { 2.0 } else { 0.0 },
                        if text.contains("team") { 2.0 } else { 0.0 },
                        0.1,
                    ]
                })
                .collect())
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn model(&self) -> &str {
            "broken"
        }

        fn batch_size(&self) -> usize {
            1
        }

        fn embed_batch(&self, _inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service unavailable")
        }
    }

    fn small_index() -> FlatIndex {
        FlatIndex::new(vec![
            entry("Teamwork", TestType::P, vec![0.0, 1.0, 0.0]),
            entry("Java", TestType::K, vec![1.0, 0.0, 0.0]),
        ])
        .unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn retrieves_nearest_first() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), IndexBackend::Flat(small_index()));
        let hits = retriever.retrieve("Senior Java engineer", 2).await.unwrap();
        assert_eq!(hits[0].record.assessment_name, "Java");
        assert_eq!(hits[0].test_type(), TestType::K);
        assert!(hits[0].score > 0.99);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn embedding_failures_propagate() {
        let retriever = Retriever::new(Arc::new(BrokenEmbedder), IndexBackend::Flat(small_index()));
        let err = retriever.retrieve("anything", 2).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
    }
}
