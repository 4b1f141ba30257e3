//! End-to-end recommendation: intent → expanded query → retrieval → balancing.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::balancer::balance_results;
use crate::intent::{Intent, IntentExtractor};
use crate::query::build_expanded_query;
use crate::retriever::{RetrievedItem, Retriever};

/// Candidates fetched from the index before balancing.
pub const RETRIEVAL_TOP_K: usize = 30;
/// Result cap used by the HTTP endpoint and the offline tools.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// Intent extracted from the query (fallback on failure).
    pub intent: Intent,
    /// Text that was embedded.
    pub search_text: String,
    /// Balanced, truncated results.
    pub items: Vec<RetrievedItem>,
}

/// Stateless pipeline over shared, read-only client handles.
pub struct Recommender {
    extractor: Arc<IntentExtractor>,
    retriever: Retriever,
    retrieval_top_k: usize,
}

impl Recommender {
    /// Builds a recommender with the default retrieval depth.
    pub fn new(extractor: IntentExtractor, retriever: Retriever) -> Self {
        Self {
            extractor: Arc::new(extractor),
            retriever,
            retrieval_top_k: RETRIEVAL_TOP_K,
        }
    }

    /// Overrides how many candidates are fetched before balancing.
    pub fn with_retrieval_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k.max(1);
        self
    }

    /// Runs the full pipeline for `query`.
    ///
    /// Intent extraction never fails; embedding and index errors propagate. When the expanded
    /// query is empty the raw query text is embedded instead.
    pub async fn recommend(&self, query: &str, max_results: usize) -> Result<Recommendation> {
        let intent = self.extract_intent(query.to_string()).await?;
        let expanded = build_expanded_query(&intent);
        let search_text = if expanded.is_empty() {
            query.trim().to_string()
        } else {
            expanded
        };
        let retrieved = self
            .retriever
            .retrieve(&search_text, self.retrieval_top_k)
            .await?;
        let candidates = retrieved.len();
        let items = balance_results(retrieved, &intent, max_results);
        info!(
            candidates,
            returned = items.len(),
            seniority = %intent.seniority,
            "recommendation complete"
        );
        Ok(Recommendation {
            intent,
            search_text,
            items,
        })
    }

    async fn extract_intent(&self, query: String) -> Result<Intent> {
        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || extractor.extract(&query))
            .await
            .map_err(|err| anyhow!("intent task join error: {err}"))
    }
}
