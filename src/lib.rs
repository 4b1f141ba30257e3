#![warn(missing_docs)]
//! Core library for the assessment recommender: intent extraction, query expansion, vector
//! retrieval, category balancing, the HTTP surface and the offline catalog tools.

pub mod balancer;
pub mod catalog;
pub mod controls;
pub mod embedder;
pub mod eval;
pub mod index;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod retriever;
pub mod scrape;
pub mod server;
pub mod vector_store;

pub use balancer::balance_results;
pub use catalog::{CatalogRecord, RawCatalogRow, TestType};
pub use controls::{EmbedderArgs, IndexArgs, LlmArgs, RecommenderArgs};
pub use index::{FlatIndex, IndexError, IndexedAssessment};
pub use intent::{Intent, IntentExtractor, Seniority};
pub use pipeline::{Recommendation, Recommender};
pub use query::build_expanded_query;
pub use retriever::{IndexBackend, RetrievedItem, Retriever};
pub use vector_store::{PgVectorIndex, TableName};
