//! Cross-encoder reranking with fallback to the blended order.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::RerankError;
use crate::search::Candidate;

/// Scores query/passage pairs. Treated as an opaque relevance function.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per passage, in passage order. Higher is more relevant.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>, RerankError>;
}

/// Reordering stage of the read path.
///
/// The output is always a permutation of the input. Any reranker failure
/// keeps the incoming (blended) order.
#[derive(Clone)]
pub struct RerankStage {
    reranker: Option<Arc<dyn Reranker>>,
    timeout: Duration,
}

impl RerankStage {
    /// Stage backed by `reranker`, or a passthrough when `None`.
    pub fn new(reranker: Option<Arc<dyn Reranker>>, timeout: Duration) -> Self {
        Self { reranker, timeout }
    }

    /// Stage that never reorders.
    pub fn passthrough() -> Self {
        Self::new(None, Duration::ZERO)
    }

    /// Reorders candidates by reranker score, descending. Ties keep input order.
    pub async fn rerank(&self, query: &str, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        let Some(reranker) = &self.reranker else {
            return candidates;
        };
        if candidates.is_empty() {
            return candidates;
        }

        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = match tokio::time::timeout(self.timeout, reranker.score(query, &passages)).await
        {
            Ok(Ok(scores)) => match check_scores(&scores, candidates.len()) {
                Ok(()) => scores,
                Err(err) => {
                    warn!(error = %err, "reranker unusable; keeping blended order");
                    return candidates;
                }
            },
            Ok(Err(err)) => {
                warn!(error = %err, "reranker unavailable; keeping blended order");
                return candidates;
            }
            Err(_) => {
                let err = RerankError::Timeout(self.timeout);
                warn!(error = %err, "reranker unavailable; keeping blended order");
                return candidates;
            }
        };

        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.relevance_score = score;
        }
        candidates.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        debug!(candidates = candidates.len(), "reranked candidates");
        candidates
    }
}

fn check_scores(scores: &[f64], expected: usize) -> Result<(), RerankError> {
    if scores.len() != expected {
        return Err(RerankError::ScoreCountMismatch {
            expected,
            returned: scores.len(),
        });
    }
    match scores.iter().position(|score| !score.is_finite()) {
        Some(index) => Err(RerankError::NonFiniteScore { index }),
        None => Ok(()),
    }
}
