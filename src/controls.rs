//! Command-line argument groups shared by the assessrec binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use crate::embedder::qdrant::DEFAULT_QDRANT_MODEL;
use crate::embedder::{Embedder, OpenAiEmbedder, QdrantEmbedder};
use crate::index::FlatIndex;
use crate::intent::IntentExtractor;
use crate::llm::{
    AnthropicProvider, LlmProvider, OpenAiProvider, GITHUB_MODELS_BASE_URL, OPENAI_BASE_URL,
};
use crate::pipeline::{Recommender, RETRIEVAL_TOP_K};
use crate::retriever::{IndexBackend, Retriever};
use crate::vector_store::{PgVectorIndex, TableName};

const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

/// Hosted embedding services.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint.
    Openai,
    /// Qdrant Cloud Inference.
    Qdrant,
}

/// Embedding client settings.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Embedding service
    #[arg(
        long = "embedding-provider",
        env = "ASSESSREC_EMBEDDING_PROVIDER",
        value_enum,
        default_value_t = EmbeddingProvider::Qdrant
    )]
    pub provider: EmbeddingProvider,

    /// Embedding model (defaults to the provider's sentence model)
    #[arg(long = "embedding-model", env = "ASSESSREC_EMBEDDING_MODEL")]
    pub model: Option<String>,

    /// OpenAI API key used for embedding calls
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long = "embedding-base-url",
        env = "ASSESSREC_EMBEDDING_BASE_URL",
        default_value = OPENAI_BASE_URL
    )]
    pub openai_base_url: String,

    /// Optional dimension override when supported by the model
    #[arg(long = "embedding-dimensions", env = "ASSESSREC_EMBEDDING_DIMENSIONS")]
    pub dimensions: Option<usize>,

    /// Qdrant Cloud API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,

    /// Qdrant inference endpoint, e.g. https://<cluster>.cloud.qdrant.io/inference/text
    #[arg(long, env = "ASSESSREC_QDRANT_ENDPOINT")]
    pub qdrant_endpoint: Option<String>,

    /// Max number of texts per embedding request
    #[arg(long = "embedding-batch", env = "ASSESSREC_EMBEDDING_BATCH", default_value_t = 16)]
    pub batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(
        long = "embedding-timeout-secs",
        env = "ASSESSREC_EMBEDDING_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub timeout_secs: u64,

    /// Number of attempts for rate limits or transient errors
    #[arg(
        long = "embedding-max-retries",
        env = "ASSESSREC_EMBEDDING_MAX_RETRIES",
        default_value_t = 5
    )]
    pub max_retries: usize,
}

impl EmbedderArgs {
    /// Model name that will be sent to the provider.
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider) {
            (Some(model), _) => model.clone(),
            (None, EmbeddingProvider::Openai) => DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            (None, EmbeddingProvider::Qdrant) => DEFAULT_QDRANT_MODEL.to_string(),
        }
    }

    /// Builds the configured blocking embedding client.
    pub fn build(&self) -> Result<Arc<dyn Embedder>> {
        let timeout = Duration::from_secs(self.timeout_secs.max(1));
        let model = self.model_name();
        let embedder: Arc<dyn Embedder> = match self.provider {
            EmbeddingProvider::Openai => Arc::new(OpenAiEmbedder::new(
                required(&self.openai_api_key, "--openai-api-key / OPENAI_API_KEY")?,
                self.openai_base_url.clone(),
                model,
                self.dimensions,
                timeout,
                self.max_retries,
                self.batch_size,
            )?),
            EmbeddingProvider::Qdrant => Arc::new(QdrantEmbedder::new(
                required(&self.qdrant_api_key, "--qdrant-api-key / QDRANT_API_KEY")?,
                required(
                    &self.qdrant_endpoint,
                    "--qdrant-endpoint / ASSESSREC_QDRANT_ENDPOINT",
                )?,
                model,
                timeout,
                self.max_retries,
                self.batch_size,
            )?),
        };
        info!(provider = ?self.provider, model = embedder.model(), "embedding client ready");
        Ok(embedder)
    }
}

/// Hosted chat models used for intent extraction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmBackend {
    /// OpenAI chat completions.
    Openai,
    /// GitHub Models (OpenAI-compatible, authenticated with a GitHub token).
    Github,
    /// Anthropic messages API.
    Anthropic,
}

/// Intent-extraction model settings.
#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    /// Chat model service
    #[arg(
        id = "llm_provider",
        long = "llm-provider",
        env = "ASSESSREC_LLM_PROVIDER",
        value_enum,
        default_value_t = LlmBackend::Github
    )]
    pub provider: LlmBackend,

    /// Chat model (defaults to gpt-4o-mini, or a Haiku model for Anthropic)
    #[arg(id = "llm_model", long = "llm-model", env = "ASSESSREC_LLM_MODEL")]
    pub model: Option<String>,

    /// Override the chat completions base URL
    #[arg(long = "llm-base-url", env = "ASSESSREC_LLM_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for the chat model; falls back to the provider's usual variable
    #[arg(long = "llm-api-key", env = "ASSESSREC_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Max seconds to wait for each completion
    #[arg(id = "llm_timeout_secs", long = "llm-timeout-secs", env = "ASSESSREC_LLM_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl LlmArgs {
    /// Model name that will be sent to the provider.
    pub fn model_name(&self) -> String {
        match (&self.model, self.provider) {
            (Some(model), _) => model.clone(),
            (None, LlmBackend::Anthropic) => DEFAULT_ANTHROPIC_MODEL.to_string(),
            (None, _) => DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    /// Chat completions base URL for OpenAI-compatible providers.
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, LlmBackend::Github) => GITHUB_MODELS_BASE_URL,
            (None, _) => OPENAI_BASE_URL,
        }
    }

    fn key_var(&self) -> &'static str {
        match self.provider {
            LlmBackend::Openai => "OPENAI_API_KEY",
            LlmBackend::Github => "GITHUB_TOKEN",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|key| !key.trim().is_empty()) {
            return Ok(key.clone());
        }
        let var = self.key_var();
        std::env::var(var).map_err(|_| anyhow!("missing chat model key: set --llm-api-key or {var}"))
    }

    /// Builds the configured blocking chat client.
    pub fn build(&self) -> Result<Arc<dyn LlmProvider>> {
        let timeout = Duration::from_secs(self.timeout_secs.max(1));
        let model = self.model_name();
        let key = self.api_key()?;
        let provider: Arc<dyn LlmProvider> = match self.provider {
            LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(key, model.clone(), timeout)?),
            LlmBackend::Openai | LlmBackend::Github => Arc::new(OpenAiProvider::new(
                key,
                self.base_url(),
                model.clone(),
                timeout,
            )?),
        };
        info!(provider = ?self.provider, model = %model, "chat client ready");
        Ok(provider)
    }
}

/// Where the vector index lives.
#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Flat index JSONL, used when no database URL is given
    #[arg(long = "index", env = "ASSESSREC_INDEX", default_value = "data/catalog_index.jsonl")]
    pub index_path: PathBuf,

    /// Postgres connection string for the pgvector backend
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Schema holding the assessment table
    #[arg(long = "pg-schema", env = "ASSESSREC_PG_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Assessment table name
    #[arg(long = "pg-table", env = "ASSESSREC_PG_TABLE", default_value = "assessments")]
    pub table: String,
}

impl IndexArgs {
    /// Validated, quoted table name.
    pub fn table_name(&self) -> Result<TableName> {
        TableName::new(self.schema.clone(), self.table.clone())
    }

    /// Loads the flat index or connects to pgvector.
    pub async fn open(&self) -> Result<IndexBackend> {
        match &self.database_url {
            Some(url) => {
                let table = self.table_name()?;
                let qualified = table.qualified();
                let index = PgVectorIndex::connect(url, table).await?;
                info!(table = %qualified, "using pgvector index");
                Ok(IndexBackend::PgVector(index))
            }
            None => {
                let index = FlatIndex::load(&self.index_path).with_context(|| {
                    format!("failed to load index {}", self.index_path.display())
                })?;
                info!(
                    path = %self.index_path.display(),
                    entries = index.len(),
                    dims = index.dims(),
                    "loaded flat index"
                );
                Ok(IndexBackend::Flat(index))
            }
        }
    }
}

/// Everything needed to build a [`Recommender`].
#[derive(Args, Debug, Clone)]
pub struct RecommenderArgs {
    #[command(flatten)]
    #[allow(missing_docs)]
    pub embedder: EmbedderArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub llm: LlmArgs,

    #[command(flatten)]
    #[allow(missing_docs)]
    pub index: IndexArgs,

    /// Candidates fetched from the index before balancing
    #[arg(long, env = "ASSESSREC_RETRIEVAL_TOP_K", default_value_t = RETRIEVAL_TOP_K)]
    pub retrieval_top_k: usize,
}

impl RecommenderArgs {
    /// Builds the clients, opens the index and assembles the pipeline.
    ///
    /// Blocking reqwest clients cannot be created on a runtime thread; they are built on the
    /// blocking pool.
    pub async fn build(&self) -> Result<Recommender> {
        let (llm, embedder) = (self.llm.clone(), self.embedder.clone());
        let (provider, embedder) = tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((llm.build()?, embedder.build()?))
        })
        .await
        .context("client construction task failed")??;
        let extractor = IntentExtractor::new(provider);
        let backend = self.index.open().await?;
        Ok(Recommender::new(extractor, Retriever::new(embedder, backend))
            .with_retrieval_top_k(self.retrieval_top_k))
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_ref()
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| anyhow!("missing {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        recommender: RecommenderArgs,
    }

    fn parse(args: &[&str]) -> RecommenderArgs {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().recommender
    }

    #[test]
    fn github_provider_uses_models_endpoint() {
        let args = parse(&["--llm-provider", "github"]);
        assert_eq!(args.llm.base_url(), GITHUB_MODELS_BASE_URL);
        assert_eq!(args.llm.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn explicit_base_url_wins() {
        let args = parse(&[
            "--llm-provider",
            "openai",
            "--llm-base-url",
            "http://localhost:9999/v1",
        ]);
        assert_eq!(args.llm.base_url(), "http://localhost:9999/v1");
    }

    #[test]
    fn anthropic_gets_its_own_default_model() {
        let args = parse(&["--llm-provider", "anthropic"]);
        assert_eq!(args.llm.model_name(), DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn embedding_model_defaults_follow_provider() {
        let args = parse(&["--embedding-provider", "openai"]);
        assert_eq!(args.embedder.model_name(), DEFAULT_OPENAI_EMBEDDING_MODEL);
        let args = parse(&["--embedding-provider", "qdrant", "--embedding-model", "custom"]);
        assert_eq!(args.embedder.model_name(), "custom");
    }

    #[test]
    fn explicit_llm_key_is_used() {
        let args = parse(&["--llm-provider", "openai", "--llm-api-key", "sk-test"]);
        assert_eq!(args.llm.api_key().unwrap(), "sk-test");
    }

    #[test]
    fn qdrant_without_endpoint_is_rejected() {
        let args = parse(&[
            "--embedding-provider",
            "qdrant",
            "--qdrant-api-key",
            "key",
            "--qdrant-endpoint",
            " ",
        ]);
        let err = args.embedder.build().err().unwrap();
        assert!(err.to_string().contains("qdrant-endpoint"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn build_inside_runtime_creates_blocking_clients() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        FlatIndex::write(
            &path,
            &[crate::index::tests::entry(
                "Java 8",
                crate::catalog::TestType::K,
                vec![1.0, 0.0],
            )],
        )
        .unwrap();
        let index_path = path.to_string_lossy().into_owned();
        let args = parse(&[
            "--embedding-provider",
            "openai",
            "--openai-api-key",
            "sk-test",
            "--llm-provider",
            "openai",
            "--llm-api-key",
            "sk-test",
            "--index",
            index_path.as_str(),
        ]);
        assert!(args.build().await.is_ok());
    }

    #[test]
    fn bad_table_name_fails() {
        let args = parse(&["--pg-table", ""]);
        assert!(args.index.table_name().is_err());
    }
}
