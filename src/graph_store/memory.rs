use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};

use super::{GraphContext, GraphStore, GraphWrite, MenuItem, NodeLabel};
use crate::chunk::ChunkId;
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct GraphNode {
    label: NodeLabel,
    key: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphEdge {
    HasChunk,
    Serves { price: Option<u32> },
}

type MenuGraph = StableGraph<GraphNode, GraphEdge, Directed>;

#[derive(Default)]
struct IndexedGraph {
    graph: MenuGraph,
    node_index: HashMap<(NodeLabel, String), NodeIndex>,
}

impl IndexedGraph {
    fn merge_node(&mut self, label: NodeLabel, key: &str) -> NodeIndex {
        let lookup = (label, key.to_string());
        if let Some(&idx) = self.node_index.get(&lookup) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            label,
            key: key.to_string(),
            text: None,
        });
        self.node_index.insert(lookup, idx);
        idx
    }

    fn merge_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: GraphEdge) {
        match self.graph.find_edge(from, to) {
            Some(existing) => {
                if let (Some(GraphEdge::Serves { price }), GraphEdge::Serves { price: Some(new) }) =
                    (self.graph.edge_weight_mut(existing), edge)
                {
                    *price = Some(new);
                }
            }
            None => {
                self.graph.add_edge(from, to, edge);
            }
        }
    }

    fn neighbors(&self, idx: NodeIndex, direction: Direction, label: NodeLabel) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, direction)
            .filter(|n| self.graph[*n].label == label)
            .collect()
    }
}

/// In-process graph store backed by a petgraph `StableGraph`.
///
/// One lock guards the whole graph, so each [`GraphWrite`] lands atomically.
pub struct MemoryGraphStore {
    inner: Mutex<IndexedGraph>,
}

impl MemoryGraphStore {
    /// Empty graph.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(IndexedGraph::default()),
        }
    }

    /// Number of nodes carrying `label`.
    pub fn node_count(&self, label: NodeLabel) -> usize {
        self.lock()
            .node_index
            .keys()
            .filter(|(l, _)| *l == label)
            .count()
    }

    /// Total number of relationships.
    pub fn edge_count(&self) -> usize {
        self.lock().graph.edge_count()
    }

    fn lock(&self) -> MutexGuard<'_, IndexedGraph> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn merge_chunk(&self, write: &GraphWrite) -> Result<(), StoreError> {
        let mut graph = self.lock();
        let chunk = graph.merge_node(NodeLabel::Chunk, write.chunk_id.as_str());
        graph.graph[chunk].text = Some(write.text.clone());

        let restaurant = write
            .restaurant
            .as_deref()
            .map(|name| graph.merge_node(NodeLabel::Restaurant, name));
        if let Some(restaurant) = restaurant {
            graph.merge_edge(restaurant, chunk, GraphEdge::HasChunk);
        }
        for dish in &write.dishes {
            let dish_idx = graph.merge_node(NodeLabel::Dish, &dish.name);
            graph.merge_edge(dish_idx, chunk, GraphEdge::HasChunk);
            if let Some(restaurant) = restaurant {
                graph.merge_edge(restaurant, dish_idx, GraphEdge::Serves { price: dish.price });
            }
        }
        Ok(())
    }

    async fn chunk_context(&self, chunk_id: &ChunkId) -> Result<Option<GraphContext>, StoreError> {
        let graph = self.lock();
        let Some(&chunk) = graph
            .node_index
            .get(&(NodeLabel::Chunk, chunk_id.as_str().to_string()))
        else {
            return Ok(None);
        };

        let mut restaurants: Vec<&str> = graph
            .neighbors(chunk, Direction::Incoming, NodeLabel::Restaurant)
            .into_iter()
            .map(|idx| graph.graph[idx].key.as_str())
            .collect();
        restaurants.sort_unstable();
        let restaurant = restaurants.first().map(|name| name.to_string());

        let mut featured_dishes: Vec<String> = graph
            .neighbors(chunk, Direction::Incoming, NodeLabel::Dish)
            .into_iter()
            .map(|idx| graph.graph[idx].key.clone())
            .collect();
        featured_dishes.sort();

        let mut menu = Vec::new();
        if let Some(name) = &restaurant {
            if let Some(&idx) = graph
                .node_index
                .get(&(NodeLabel::Restaurant, name.clone()))
            {
                for edge in graph.graph.edges_directed(idx, Direction::Outgoing) {
                    if let GraphEdge::Serves { price } = *edge.weight() {
                        menu.push(MenuItem {
                            name: graph.graph[edge.target()].key.clone(),
                            price,
                        });
                    }
                }
            }
        }
        menu.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(GraphContext {
            restaurant,
            featured_dishes,
            menu,
        }))
    }

    async fn has_chunk(&self, chunk_id: &ChunkId) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .node_index
            .contains_key(&(NodeLabel::Chunk, chunk_id.as_str().to_string())))
    }
}
