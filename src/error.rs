//! Typed failures for the write and read paths.
//!
//! Each enum maps to one collaborator so callers can tell fatal failures
//! (vector store) from degradable ones (graph store, reranker) without string
//! matching.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by a vector or graph store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or returned a transport error.
    #[error("{store} store unavailable: {message}")]
    Unavailable {
        /// Which store failed (`vector` or `graph`).
        store: &'static str,
        /// Backend-provided detail.
        message: String,
    },
    /// The call did not finish within its deadline.
    #[error("{store} store timed out after {elapsed:?}")]
    Timeout {
        /// Which store timed out.
        store: &'static str,
        /// Configured deadline.
        elapsed: Duration,
    },
    /// A vector did not match the index dimensionality.
    #[error("vector has {actual} dimensions but the index expects {expected}")]
    DimensionMismatch {
        /// Dimensionality fixed by the index.
        expected: usize,
        /// Dimensionality of the rejected vector.
        actual: usize,
    },
}

impl StoreError {
    /// Wraps any displayable backend error as an unavailable-store failure.
    pub fn unavailable(store: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            store,
            message: err.to_string(),
        }
    }
}

/// Runs a store call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(
    store: &'static str,
    deadline: Duration,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            store,
            elapsed: deadline,
        }),
    }
}

/// Failures raised by the embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider request failed after retries.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The provider returned an unexpected number of vectors.
    #[error("embedding provider returned {returned} vectors for {expected} inputs")]
    CountMismatch {
        /// Inputs submitted.
        expected: usize,
        /// Vectors returned.
        returned: usize,
    },
}

/// Failures raised by the reranking collaborator.
#[derive(Debug, Error)]
pub enum RerankError {
    /// The reranker could not be reached or returned an error.
    #[error("reranker unavailable: {0}")]
    Unavailable(String),
    /// The reranker did not answer in time.
    #[error("reranker timed out after {0:?}")]
    Timeout(Duration),
    /// The reranker scored a different number of passages than submitted.
    #[error("reranker returned {returned} scores for {expected} passages")]
    ScoreCountMismatch {
        /// Passages submitted.
        expected: usize,
        /// Scores returned.
        returned: usize,
    },
    /// A returned score was NaN or infinite.
    #[error("reranker returned a non-finite score for passage {index}")]
    NonFiniteScore {
        /// Position of the offending passage.
        index: usize,
    },
}

/// Rejections at the ingestion boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestRecordError {
    /// Chunk text was empty after canonicalization.
    #[error("chunk text is empty")]
    EmptyText,
    /// The `url` field did not parse as an absolute URL.
    #[error("invalid chunk url {url:?}: {reason}")]
    InvalidUrl {
        /// Raw value supplied upstream.
        url: String,
        /// Parser detail.
        reason: String,
    },
    /// The `source` tag does not name a known chunking strategy.
    #[error("unknown chunking strategy {0:?}")]
    UnknownStrategy(String),
}

/// Outcome of a chunk write that did not reach the vector store.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The vector upsert failed; nothing was written for this chunk.
    #[error("vector store write failed for chunk {chunk_id}: {source}")]
    VectorStore {
        /// Chunk that was dropped.
        chunk_id: String,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// Fatal read-path failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The primary index could not answer; no meaningful result exists.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    /// The request itself was malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
