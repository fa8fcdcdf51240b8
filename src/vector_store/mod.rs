//! Vector store clients.
//!
//! A vector store keeps one [`EmbeddingRecord`] per chunk, keyed by
//! [`ChunkId`], and answers hybrid queries that blend vector similarity with a
//! keyword score in a single request.

mod memory;
mod postgres;

pub use memory::MemoryVectorStore;
pub use postgres::PgVectorStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::Fingerprint;
use crate::chunk::{Chunk, ChunkId, ChunkStrategy, DerivedTags};
use crate::error::StoreError;

/// Properties stored next to each vector and returned with every hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkProperties {
    /// Content fingerprint of the chunk text.
    pub fingerprint: Fingerprint,
    /// Chunk text as indexed.
    pub text: String,
    /// Owning restaurant.
    #[serde(default)]
    pub restaurant_name: Option<String>,
    /// Page URL.
    pub url: String,
    /// Fetcher tag.
    pub source: String,
    /// Chunking strategy.
    #[serde(default)]
    pub chunk_type: Option<ChunkStrategy>,
    /// Fetch time.
    pub timestamp: DateTime<Utc>,
    /// Derived prices, dietary tags, and dishes.
    #[serde(default)]
    pub tags: DerivedTags,
}

/// Vector plus properties, stored 1:1 with a chunk.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Join key.
    pub chunk_id: ChunkId,
    /// Dense embedding.
    pub vector: Vec<f32>,
    /// Stored properties.
    pub properties: ChunkProperties,
}

impl EmbeddingRecord {
    /// Pairs a chunk with its embedding.
    pub fn new(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            vector,
            properties: ChunkProperties {
                fingerprint: chunk.fingerprint.clone(),
                text: chunk.text.clone(),
                restaurant_name: chunk.restaurant_name.clone(),
                url: chunk.url.to_string(),
                source: chunk.source.clone(),
                chunk_type: chunk.strategy,
                timestamp: chunk.timestamp,
                tags: chunk.derived_tags.clone(),
            },
        }
    }
}

/// One combined similarity + keyword request.
#[derive(Debug, Clone, Copy)]
pub struct HybridQuery<'a> {
    /// Raw query text for keyword scoring.
    pub text: &'a str,
    /// Query embedding for similarity scoring.
    pub vector: &'a [f32],
    /// Weight of vector similarity; `1 - alpha` weighs the keyword score.
    pub alpha: f32,
    /// Maximum hits returned.
    pub limit: usize,
}

/// A scored hit, ordered by blended score then insertion order.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Join key.
    pub chunk_id: ChunkId,
    /// Blended score.
    pub score: f64,
    /// Stored properties.
    pub properties: ChunkProperties,
}

/// Upsert and hybrid-query surface of a vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces the record stored under `record.chunk_id`.
    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), StoreError>;

    /// Returns up to `query.limit` hits by blended score descending.
    async fn hybrid_query(&self, query: &HybridQuery<'_>) -> Result<Vec<VectorHit>, StoreError>;

    /// Pages through stored chunk ids in ascending order, starting after `after`.
    async fn chunk_ids(
        &self,
        after: Option<&ChunkId>,
        limit: usize,
    ) -> Result<Vec<ChunkId>, StoreError>;
}

pub(crate) fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })
    }
}
