//! Coordinates one chunk's vector and graph writes.
//!
//! The two upserts share a `chunk_id` but are not a transaction. The vector
//! write goes first and is the only fatal one: if it fails nothing else is
//! attempted. A graph failure afterwards leaves the chunk retrievable without
//! enrichment and is reported as degraded so a reconciliation scan can find
//! it later.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkId};
use crate::config::StoreTimeouts;
use crate::error::{with_deadline, StoreError, WriteError};
use crate::graph_store::{GraphStore, GraphWrite};
use crate::vector_store::{EmbeddingRecord, VectorStore};

/// What happened to one chunk that reached the vector store.
#[derive(Debug)]
pub struct WriteReceipt {
    /// Join key of the written chunk.
    pub chunk_id: ChunkId,
    /// Graph failure, when the chunk was indexed without relational context.
    pub graph_error: Option<StoreError>,
}

impl WriteReceipt {
    /// True when the graph write failed after the vector write succeeded.
    pub fn is_degraded(&self) -> bool {
        self.graph_error.is_some()
    }
}

/// Writes chunks to both stores in vector-then-graph order.
#[derive(Clone)]
pub struct DualStoreWriter {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    timeouts: StoreTimeouts,
}

impl DualStoreWriter {
    /// Writer over explicit store handles.
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        timeouts: StoreTimeouts,
    ) -> Self {
        Self {
            vector,
            graph,
            timeouts,
        }
    }

    /// Upserts the embedding, then merges the graph entities.
    pub async fn write_chunk(
        &self,
        chunk: &Chunk,
        embedding: Vec<f32>,
    ) -> Result<WriteReceipt, WriteError> {
        let record = EmbeddingRecord::new(chunk, embedding);
        with_deadline("vector", self.timeouts.vector, self.vector.upsert(&record))
            .await
            .map_err(|source| WriteError::VectorStore {
                chunk_id: chunk.chunk_id.to_string(),
                source,
            })?;

        let write = GraphWrite::from_chunk(chunk);
        let graph_error = match with_deadline(
            "graph",
            self.timeouts.graph,
            self.graph.merge_chunk(&write),
        )
        .await
        {
            Ok(()) => {
                debug!(chunk_id = %chunk.chunk_id, "chunk written to both stores");
                None
            }
            Err(err) => {
                warn!(
                    chunk_id = %chunk.chunk_id,
                    error = %err,
                    "graph write failed; chunk indexed without enrichment"
                );
                Some(err)
            }
        };

        Ok(WriteReceipt {
            chunk_id: chunk.chunk_id.clone(),
            graph_error,
        })
    }
}
