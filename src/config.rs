//! Tuning knobs for the write and read paths, plus CLI argument groups shared
//! by the binaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};

use crate::embedder::openai::OpenAiEmbedder;
use crate::graph_store::PgGraphStore;
use crate::pg::{self, TableName};
use crate::rerank::http::HttpReranker;
use crate::vector_store::PgVectorStore;

/// Hybrid blend weight applied when a caller does not override it.
pub const DEFAULT_ALPHA: f32 = 0.25;

/// Candidates fetched ahead of reranking.
pub const DEFAULT_RERANK_CANDIDATES: usize = 10;

/// Per-collaborator deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreTimeouts {
    /// Vector upserts and hybrid queries.
    pub vector: Duration,
    /// Graph merges.
    pub graph: Duration,
    /// One reranker call.
    pub rerank: Duration,
    /// One per-candidate graph lookup during enrichment.
    pub enrich: Duration,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self {
            vector: Duration::from_secs(5),
            graph: Duration::from_secs(2),
            rerank: Duration::from_secs(3),
            enrich: Duration::from_millis(750),
        }
    }
}

/// Read-path settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryConfig {
    /// Weight of vector similarity in the hybrid blend, within `[0, 1]`.
    pub alpha: f32,
    /// Minimum candidate count requested from the vector store.
    pub rerank_candidates: usize,
    /// Concurrent graph lookups during enrichment.
    pub enrich_concurrency: usize,
    /// Deadlines.
    pub timeouts: StoreTimeouts,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            rerank_candidates: DEFAULT_RERANK_CANDIDATES,
            enrich_concurrency: 4,
            timeouts: StoreTimeouts::default(),
        }
    }
}

/// Write-path settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    /// Chunks processed concurrently.
    pub workers: usize,
    /// Deadlines.
    pub timeouts: StoreTimeouts,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            timeouts: StoreTimeouts::default(),
        }
    }
}

/// Postgres connection and table settings shared by every binary.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Schema holding the vector and graph tables
    #[arg(long, env = "MENURAG_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Table storing chunk embeddings
    #[arg(long, env = "MENURAG_VECTOR_TABLE", default_value = "menu_chunks")]
    pub vector_table: String,

    /// Base name of the graph node/edge tables
    #[arg(long, env = "MENURAG_GRAPH_TABLE", default_value = "menu_graph")]
    pub graph_table: String,

    /// Embedding dimensionality fixed for the vector table
    #[arg(long, env = "MENURAG_DIMENSIONS", default_value_t = 1536)]
    pub dimensions: usize,

    /// Create extensions, tables, and indexes when missing
    #[arg(long, env = "MENURAG_PREPARE", default_value_t = true, action = ArgAction::Set)]
    pub prepare: bool,

    /// Milliseconds before a vector store call times out
    #[arg(long, env = "MENURAG_VECTOR_TIMEOUT_MS", default_value_t = 5000)]
    pub vector_timeout_ms: u64,

    /// Milliseconds before a graph store call times out
    #[arg(long, env = "MENURAG_GRAPH_TIMEOUT_MS", default_value_t = 2000)]
    pub graph_timeout_ms: u64,
}

impl StoreArgs {
    /// Connects both stores. The vector store gets one connection; the graph
    /// store gets separate write and read connections.
    pub async fn connect(&self) -> Result<(Arc<PgVectorStore>, Arc<PgGraphStore>)> {
        let vector_table = TableName::new(self.schema.clone(), self.vector_table.clone())?;
        let graph_table = TableName::new(self.schema.clone(), self.graph_table.clone())?;
        let vector_client = pg::connect(&self.database_url).await?;
        let graph_writer = pg::connect(&self.database_url).await?;
        let graph_reader = pg::connect(&self.database_url).await?;
        let vector = PgVectorStore::new(vector_client, vector_table, self.dimensions, self.prepare)
            .await
            .context("failed to initialize vector store")?;
        let graph = PgGraphStore::new(graph_writer, graph_reader, graph_table, self.prepare)
            .await
            .context("failed to initialize graph store")?;
        Ok((Arc::new(vector), Arc::new(graph)))
    }

    /// Deadlines derived from the flags; rerank and enrichment keep defaults.
    pub fn timeouts(&self) -> StoreTimeouts {
        StoreTimeouts {
            vector: Duration::from_millis(self.vector_timeout_ms.max(1)),
            graph: Duration::from_millis(self.graph_timeout_ms.max(1)),
            ..StoreTimeouts::default()
        }
    }
}

/// OpenAI-compatible embedding endpoint settings.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// OpenAI API key used for embedding calls
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: String,

    /// Embedding model identifier (e.g. text-embedding-3-small)
    #[arg(
        long,
        env = "MENURAG_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub openai_model: String,

    /// Optional dimension override when supported by the model
    #[arg(long, env = "MENURAG_OPENAI_DIMENSIONS")]
    pub openai_dimensions: Option<usize>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "MENURAG_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Max inputs sent per embedding request
    #[arg(long, env = "MENURAG_OPENAI_BATCH", default_value_t = 32)]
    pub batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "MENURAG_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    pub openai_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "MENURAG_OPENAI_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,
}

impl EmbedderArgs {
    /// Builds the embedding client.
    pub fn build(&self) -> Result<OpenAiEmbedder> {
        OpenAiEmbedder::new(
            self.openai_api_key.clone(),
            self.openai_base_url.clone(),
            self.openai_model.clone(),
            self.openai_dimensions,
            Duration::from_secs(self.openai_timeout_secs.max(1)),
            self.max_retries.max(1),
            self.batch_size.max(1),
        )
    }
}

/// Cross-encoder endpoint settings. Reranking is skipped when no URL is set.
#[derive(Args, Debug, Clone)]
pub struct RerankerArgs {
    /// Base URL of a `/rerank` endpoint (text-embeddings-inference style)
    #[arg(long, env = "MENURAG_RERANK_URL")]
    pub rerank_url: Option<String>,

    /// Milliseconds before a rerank call is abandoned
    #[arg(long, env = "MENURAG_RERANK_TIMEOUT_MS", default_value_t = 3000)]
    pub rerank_timeout_ms: u64,

    /// Retry attempts for transient rerank errors
    #[arg(long, env = "MENURAG_RERANK_MAX_RETRIES", default_value_t = 2)]
    pub rerank_max_retries: usize,
}

impl RerankerArgs {
    /// Builds the HTTP reranker when a URL is configured.
    pub fn build(&self) -> Result<Option<HttpReranker>> {
        self.rerank_url
            .as_deref()
            .map(|url| {
                HttpReranker::new(
                    url,
                    Duration::from_millis(self.rerank_timeout_ms.max(1)),
                    self.rerank_max_retries.max(1),
                )
            })
            .transpose()
    }

    /// Deadline for one rerank call.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms.max(1))
    }
}
