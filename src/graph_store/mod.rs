//! Graph store clients.
//!
//! The graph holds `Restaurant`, `Dish`, and `Chunk` nodes joined by
//! `HAS_CHUNK` (restaurant or dish to chunk) and `SERVES` (restaurant to dish,
//! carrying a price). Every node is merged by key, so rewriting the same chunk
//! never duplicates anything.

mod memory;
mod postgres;

pub use memory::MemoryGraphStore;
pub use postgres::PgGraphStore;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::chunk::{Chunk, ChunkId, DishMention};
use crate::error::StoreError;

/// Node labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    /// Keyed by restaurant name.
    Restaurant,
    /// Keyed by dish name.
    Dish,
    /// Keyed by chunk id.
    Chunk,
}

impl NodeLabel {
    /// Label as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restaurant => "Restaurant",
            Self::Dish => "Dish",
            Self::Chunk => "Chunk",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything merged into the graph for one chunk, in one atomic write.
#[derive(Debug, Clone)]
pub struct GraphWrite {
    /// Key of the `Chunk` node.
    pub chunk_id: ChunkId,
    /// Text stored on the `Chunk` node.
    pub text: String,
    /// Owning restaurant, linked via `HAS_CHUNK` and `SERVES`.
    pub restaurant: Option<String>,
    /// Dishes linked to the chunk via `HAS_CHUNK`.
    pub dishes: Vec<DishMention>,
}

impl GraphWrite {
    /// Graph entities implied by a chunk.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            text: chunk.text.clone(),
            restaurant: chunk.restaurant_name.clone(),
            dishes: chunk.derived_tags.dishes.clone(),
        }
    }
}

/// A dish on a restaurant's menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    /// Dish name.
    pub name: String,
    /// Price on the `SERVES` edge, in rupees.
    pub price: Option<u32>,
}

/// Relational context reachable from one `Chunk` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphContext {
    /// Restaurant with a `HAS_CHUNK` edge to the chunk.
    pub restaurant: Option<String>,
    /// Dishes with a `HAS_CHUNK` edge to the chunk, sorted by name.
    pub featured_dishes: Vec<String>,
    /// The restaurant's `SERVES` edges, sorted by dish name.
    pub menu: Vec<MenuItem>,
}

impl GraphContext {
    /// True when the context carries nothing to render.
    pub fn is_empty(&self) -> bool {
        self.restaurant.is_none() && self.featured_dishes.is_empty() && self.menu.is_empty()
    }
}

/// Merge and traversal surface of the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merges the chunk node and its relationships. All-or-nothing.
    async fn merge_chunk(&self, write: &GraphWrite) -> Result<(), StoreError>;

    /// Context for a chunk, or `None` when no `Chunk` node exists.
    async fn chunk_context(&self, chunk_id: &ChunkId) -> Result<Option<GraphContext>, StoreError>;

    /// Whether a `Chunk` node exists for `chunk_id`.
    async fn has_chunk(&self, chunk_id: &ChunkId) -> Result<bool, StoreError>;
}
