use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{check_dimensions, EmbeddingRecord, HybridQuery, VectorHit, VectorStore};
use crate::chunk::ChunkId;
use crate::error::StoreError;

/// In-process vector index with brute-force hybrid scoring.
///
/// Keyword score is the share of query terms (three characters or longer)
/// found in the chunk text, so both halves of the blend stay within `[0, 1]`
/// for non-negative embeddings.
pub struct MemoryVectorStore {
    dimensions: usize,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<ChunkId, StoredEntry>,
    next_seq: u64,
}

struct StoredEntry {
    seq: u64,
    record: EmbeddingRecord,
}

impl MemoryVectorStore {
    /// Empty index accepting vectors of exactly `dimensions` values.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored record for `chunk_id`, if any.
    pub fn get(&self, chunk_id: &ChunkId) -> Option<EmbeddingRecord> {
        self.lock()
            .entries
            .get(chunk_id)
            .map(|entry| entry.record.clone())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        check_dimensions(self.dimensions, &record.vector)?;
        let mut state = self.lock();
        let seq = match state.entries.get(&record.chunk_id) {
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state.entries.insert(
            record.chunk_id.clone(),
            StoredEntry {
                seq,
                record: record.clone(),
            },
        );
        Ok(())
    }

    async fn hybrid_query(&self, query: &HybridQuery<'_>) -> Result<Vec<VectorHit>, StoreError> {
        check_dimensions(self.dimensions, query.vector)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let tokens = tokenize_query(query.text);
        let alpha = f64::from(query.alpha);
        let state = self.lock();
        let mut scored: Vec<(f64, u64, &EmbeddingRecord)> = state
            .entries
            .values()
            .map(|entry| {
                let similarity = cosine_similarity(query.vector, &entry.record.vector);
                let keyword = keyword_overlap(&tokens, &entry.record.properties.text);
                let score = alpha * similarity + (1.0 - alpha) * keyword;
                (score, entry.seq, &entry.record)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(query.limit)
            .map(|(score, _, record)| VectorHit {
                chunk_id: record.chunk_id.clone(),
                score,
                properties: record.properties.clone(),
            })
            .collect())
    }

    async fn chunk_ids(
        &self,
        after: Option<&ChunkId>,
        limit: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        let state = self.lock();
        let ordered: BTreeSet<&ChunkId> = state.entries.keys().collect();
        Ok(ordered
            .into_iter()
            .filter(|id| after.map_or(true, |cursor| *id > cursor))
            .take(limit)
            .cloned()
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn tokenize_query(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = query
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.chars().count() >= 3)
        .map(|tok| tok.to_lowercase())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn keyword_overlap(tokens: &[String], text: &str) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()))
        .count();
    hits as f64 / tokens.len() as f64
}
