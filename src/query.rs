//! Read-path orchestration: hybrid search, rerank, enrich, assemble.

use std::sync::Arc;

use tracing::debug;

use crate::assemble::{assemble, distinct};
use crate::config::QueryConfig;
use crate::enrich::GraphEnricher;
use crate::error::QueryError;
use crate::graph_store::GraphStore;
use crate::rerank::{RerankStage, Reranker};
use crate::search::{validate_alpha, HybridQueryEngine};
use crate::vector_store::VectorStore;

/// End-to-end query pipeline over injected store and reranker handles.
#[derive(Clone)]
pub struct QueryPipeline {
    engine: HybridQueryEngine,
    rerank: RerankStage,
    enricher: GraphEnricher,
    config: QueryConfig,
}

impl QueryPipeline {
    /// Pipeline over explicit collaborators. A `None` graph store or reranker
    /// disables that stage.
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Option<Arc<dyn GraphStore>>,
        reranker: Option<Arc<dyn Reranker>>,
        config: QueryConfig,
    ) -> Self {
        let timeouts = config.timeouts;
        Self {
            engine: HybridQueryEngine::new(vector, timeouts.vector),
            rerank: RerankStage::new(reranker, timeouts.rerank),
            enricher: GraphEnricher::new(graph, timeouts.enrich, config.enrich_concurrency),
            config,
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Answers `text` with at most `limit` context strings, best first.
    ///
    /// Only a vector store failure or a malformed request is an error; an
    /// empty answer is a valid result.
    pub async fn query(
        &self,
        text: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<String>, QueryError> {
        self.query_with_alpha(text, embedding, limit, self.config.alpha)
            .await
    }

    /// Same as [`QueryPipeline::query`] with a caller-chosen hybrid weight.
    pub async fn query_with_alpha(
        &self,
        text: &str,
        embedding: &[f32],
        limit: usize,
        alpha: f32,
    ) -> Result<Vec<String>, QueryError> {
        validate_alpha(alpha)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let wanted = limit.max(self.config.rerank_candidates);
        let candidates = self.engine.search(text, embedding, alpha, wanted).await?;
        let fetched = candidates.len();
        let ranked = distinct(self.rerank.rerank(text, candidates).await);
        let enriched = self.enricher.enrich(ranked, limit).await;
        let answer = assemble(enriched, limit);
        debug!(fetched, returned = answer.len(), "query answered");
        Ok(answer)
    }
}
