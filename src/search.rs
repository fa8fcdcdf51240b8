//! Hybrid (vector + keyword) candidate retrieval.

use std::sync::Arc;
use std::time::Duration;

use crate::canonical::Fingerprint;
use crate::chunk::ChunkId;
use crate::error::{with_deadline, QueryError, StoreError};
use crate::vector_store::{HybridQuery, VectorStore};

/// A read-path candidate. Transient; never stored.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Join key into the graph store.
    pub chunk_id: ChunkId,
    /// Content fingerprint, used to keep the final answer distinct.
    pub fingerprint: Fingerprint,
    /// Chunk text as indexed.
    pub text: String,
    /// Blended score, replaced by the reranker score when reranking succeeds.
    pub relevance_score: f64,
}

/// Issues one combined similarity + keyword query per search.
#[derive(Clone)]
pub struct HybridQueryEngine {
    store: Arc<dyn VectorStore>,
    timeout: Duration,
}

impl HybridQueryEngine {
    /// Engine over a vector store handle.
    pub fn new(store: Arc<dyn VectorStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Returns up to `k` candidates by blended score, ties in insertion order.
    ///
    /// Fails with [`QueryError::StoreUnavailable`] when the store errors or
    /// times out; there is no empty-result fallback.
    pub async fn search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        alpha: f32,
        k: usize,
    ) -> Result<Vec<Candidate>, QueryError> {
        validate_alpha(alpha)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = HybridQuery {
            text: query_text,
            vector: query_vector,
            alpha,
            limit: k,
        };
        let hits = with_deadline("vector", self.timeout, self.store.hybrid_query(&query))
            .await
            .map_err(|err| match err {
                StoreError::DimensionMismatch { expected, actual } => QueryError::InvalidQuery(
                    format!("query vector has {actual} dimensions, index expects {expected}"),
                ),
                other => QueryError::StoreUnavailable(other),
            })?;
        Ok(hits
            .into_iter()
            .take(k)
            .map(|hit| Candidate {
                chunk_id: hit.chunk_id,
                fingerprint: hit.properties.fingerprint,
                text: hit.properties.text,
                relevance_score: hit.score,
            })
            .collect())
    }
}

/// Rejects a hybrid weight that is non-finite or outside `[0, 1]`.
pub fn validate_alpha(alpha: f32) -> Result<(), QueryError> {
    if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
        return Err(QueryError::InvalidQuery(format!(
            "alpha must be within [0, 1], got {alpha}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::MemoryVectorStore;

    #[tokio::test(flavor = "current_thread")]
    async fn rejects_out_of_range_alpha() {
        let engine = HybridQueryEngine::new(Arc::new(MemoryVectorStore::new(2)), Duration::from_secs(1));
        for alpha in [-0.1, 1.5, f32::NAN] {
            let err = engine
                .search("dal", &[1.0, 0.0], alpha, 3)
                .await
                .expect_err("invalid alpha");
            assert!(matches!(err, QueryError::InvalidQuery(_)));
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_k_is_empty_and_wrong_dimensions_are_invalid() {
        let engine = HybridQueryEngine::new(Arc::new(MemoryVectorStore::new(2)), Duration::from_secs(1));
        assert!(engine
            .search("dal", &[1.0, 0.0], 0.25, 0)
            .await
            .expect("empty")
            .is_empty());
        let err = engine
            .search("dal", &[1.0, 0.0, 0.0], 0.25, 3)
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
}
