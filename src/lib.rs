#![warn(missing_docs)]
//! Dual-store indexing and hybrid retrieval for restaurant menu chunks.
//!
//! The write path canonicalizes and deduplicates chunk text, embeds it, and
//! writes each chunk to a vector store and a graph store under one shared
//! `chunk_id`. The read path runs a hybrid similarity + keyword query,
//! reranks, enriches the top hits with graph context, and returns an ordered
//! list of context strings.

pub mod assemble;
pub mod canonical;
pub mod chunk;
pub mod config;
pub mod embedder;
pub mod enrich;
pub mod error;
pub mod graph_store;
pub mod ingest;
pub mod pg;
pub mod query;
pub mod reconcile;
pub mod rerank;
pub mod search;
pub mod telemetry;
pub mod vector_store;
pub mod writer;

pub use canonical::{canonicalize, Deduplicator, Fingerprint};
pub use chunk::{Chunk, ChunkDraft, ChunkId, ChunkStrategy, DishMention, IngestRecord};
pub use config::{IngestConfig, QueryConfig, StoreTimeouts};
pub use embedder::EmbeddingProvider;
pub use error::{EmbedError, IngestRecordError, QueryError, RerankError, StoreError, WriteError};
pub use graph_store::{GraphContext, GraphStore, MemoryGraphStore, PgGraphStore};
pub use ingest::{IngestReport, Ingestor};
pub use pg::TableName;
pub use query::QueryPipeline;
pub use rerank::Reranker;
pub use search::{Candidate, HybridQueryEngine};
pub use vector_store::{MemoryVectorStore, PgVectorStore, VectorStore};
pub use writer::{DualStoreWriter, WriteReceipt};
