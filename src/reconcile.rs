//! Scan for chunks indexed in the vector store without a graph `Chunk` node.

use serde::Serialize;
use tracing::{debug, info};

use crate::chunk::ChunkId;
use crate::error::StoreError;
use crate::graph_store::GraphStore;
use crate::vector_store::VectorStore;

/// Result of one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Vector entries inspected.
    pub scanned: usize,
    /// Entries with no `Chunk` node, in ascending id order.
    pub missing: Vec<ChunkId>,
}

/// Pages through every vector `chunk_id` and probes the graph for each.
pub async fn find_unlinked(
    vector: &dyn VectorStore,
    graph: &dyn GraphStore,
    page_size: usize,
) -> Result<ReconcileReport, StoreError> {
    let page_size = page_size.max(1);
    let mut report = ReconcileReport::default();
    let mut cursor: Option<ChunkId> = None;
    loop {
        let page = vector.chunk_ids(cursor.as_ref(), page_size).await?;
        if page.is_empty() {
            break;
        }
        for chunk_id in &page {
            report.scanned += 1;
            if !graph.has_chunk(chunk_id).await? {
                debug!(%chunk_id, "vector entry has no graph node");
                report.missing.push(chunk_id.clone());
            }
        }
        let full_page = page.len() == page_size;
        cursor = page.into_iter().last();
        if !full_page {
            break;
        }
    }
    info!(
        scanned = report.scanned,
        missing = report.missing.len(),
        "reconciliation scan finished"
    );
    Ok(report)
}
