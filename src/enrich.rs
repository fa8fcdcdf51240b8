//! Attaches graph context to the top-ranked candidates.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::graph_store::{GraphContext, GraphStore};
use crate::search::Candidate;

/// A candidate after the enrichment stage.
#[derive(Debug, Clone)]
pub struct EnrichedCandidate {
    /// The ranked candidate, untouched.
    pub candidate: Candidate,
    /// Context found in the graph, if any.
    pub context: Option<GraphContext>,
    /// Candidate text, followed by a blank line and the context summary when
    /// context was found.
    pub text: String,
}

impl EnrichedCandidate {
    fn passthrough(candidate: Candidate) -> Self {
        Self {
            text: candidate.text.clone(),
            candidate,
            context: None,
        }
    }
}

/// Graph enrichment stage. Lookups run concurrently and degrade per candidate.
#[derive(Clone)]
pub struct GraphEnricher {
    graph: Option<Arc<dyn GraphStore>>,
    timeout: Duration,
    concurrency: usize,
}

impl GraphEnricher {
    /// Enricher over `graph`; `None` passes every candidate through.
    pub fn new(graph: Option<Arc<dyn GraphStore>>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            graph,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Enriches the first `limit` candidates, preserving their order.
    pub async fn enrich(&self, ranked: Vec<Candidate>, limit: usize) -> Vec<EnrichedCandidate> {
        let top = ranked.into_iter().take(limit);
        let Some(graph) = &self.graph else {
            return top.map(EnrichedCandidate::passthrough).collect();
        };
        stream::iter(top)
            .map(|candidate| self.enrich_one(graph.as_ref(), candidate))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn enrich_one(&self, graph: &dyn GraphStore, candidate: Candidate) -> EnrichedCandidate {
        let lookup = tokio::time::timeout(self.timeout, graph.chunk_context(&candidate.chunk_id));
        let context = match lookup.await {
            Ok(Ok(Some(context))) => context,
            Ok(Ok(None)) => {
                debug!(chunk_id = %candidate.chunk_id, "chunk absent from graph");
                return EnrichedCandidate::passthrough(candidate);
            }
            Ok(Err(err)) => {
                warn!(chunk_id = %candidate.chunk_id, error = %err, "graph lookup failed; passing text through");
                return EnrichedCandidate::passthrough(candidate);
            }
            Err(_) => {
                warn!(chunk_id = %candidate.chunk_id, timeout = ?self.timeout, "graph lookup timed out; passing text through");
                return EnrichedCandidate::passthrough(candidate);
            }
        };
        let text = match render_summary(&context) {
            Some(summary) => format!("{}\n\n{}", candidate.text, summary),
            None => candidate.text.clone(),
        };
        EnrichedCandidate {
            candidate,
            context: Some(context),
            text,
        }
    }
}

/// Renders graph context as summary lines; `None` when nothing is known.
///
/// Menu items without a price are rendered as the bare dish name.
pub fn render_summary(context: &GraphContext) -> Option<String> {
    let mut lines = Vec::with_capacity(3);
    if let Some(restaurant) = &context.restaurant {
        lines.push(format!("Restaurant: {restaurant}"));
    }
    if !context.featured_dishes.is_empty() {
        lines.push(format!(
            "Featured dish(es): {}",
            context.featured_dishes.join(", ")
        ));
    }
    if !context.menu.is_empty() {
        let items: Vec<String> = context
            .menu
            .iter()
            .map(|item| match item.price {
                Some(price) => format!("{} (₹{price})", item.name),
                None => item.name.clone(),
            })
            .collect();
        lines.push(format!("Menu includes: {}", items.join(", ")));
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_store::MenuItem;

    #[test]
    fn summary_lists_each_known_field() {
        let context = GraphContext {
            restaurant: Some("Bikanervala".into()),
            featured_dishes: vec!["Butter Chicken".into(), "Dal Makhani".into()],
            menu: vec![
                MenuItem {
                    name: "Butter Chicken".into(),
                    price: Some(350),
                },
                MenuItem {
                    name: "Dal Makhani".into(),
                    price: None,
                },
            ],
        };
        assert_eq!(
            render_summary(&context).expect("summary"),
            "Restaurant: Bikanervala\n\
             Featured dish(es): Butter Chicken, Dal Makhani\n\
             Menu includes: Butter Chicken (₹350), Dal Makhani"
        );
    }

    #[test]
    fn missing_fields_are_omitted() {
        let context = GraphContext {
            featured_dishes: vec!["Samosa".into()],
            ..GraphContext::default()
        };
        assert_eq!(
            render_summary(&context).as_deref(),
            Some("Featured dish(es): Samosa")
        );
        assert!(render_summary(&GraphContext::default()).is_none());
    }
}
