//! Write-path orchestration: validate, deduplicate, embed, and write chunks.

use std::io;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::canonical::{Deduplicator, Fingerprint};
use crate::chunk::{ChunkDraft, ChunkId, IngestRecord};
use crate::config::IngestConfig;
use crate::embedder::EmbeddingProvider;
use crate::writer::DualStoreWriter;

/// Counters for one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records received.
    pub records: usize,
    /// Records rejected at the boundary.
    pub invalid: usize,
    /// Records whose fingerprint was already indexed.
    pub duplicates: usize,
    /// Chunks skipped because embedding failed.
    pub embedding_failures: usize,
    /// Chunks skipped because the vector write failed.
    pub vector_failures: usize,
    /// Chunks written to the vector store.
    pub indexed: usize,
    /// Indexed chunks whose graph write failed.
    pub degraded: Vec<ChunkId>,
}

enum Outcome {
    Invalid,
    Duplicate,
    EmbeddingFailed,
    VectorFailed,
    Indexed { chunk_id: ChunkId, degraded: bool },
}

impl IngestReport {
    /// Folds another batch's counters into this one.
    pub fn merge(&mut self, other: IngestReport) {
        self.records += other.records;
        self.invalid += other.invalid;
        self.duplicates += other.duplicates;
        self.embedding_failures += other.embedding_failures;
        self.vector_failures += other.vector_failures;
        self.indexed += other.indexed;
        self.degraded.extend(other.degraded);
    }

    fn record(&mut self, outcome: Outcome) {
        self.records += 1;
        match outcome {
            Outcome::Invalid => self.invalid += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::EmbeddingFailed => self.embedding_failures += 1,
            Outcome::VectorFailed => self.vector_failures += 1,
            Outcome::Indexed { chunk_id, degraded } => {
                self.indexed += 1;
                if degraded {
                    self.degraded.push(chunk_id);
                }
            }
        }
    }
}

/// Runs records through the write path with a bounded number of workers.
pub struct Ingestor {
    dedupe: Arc<Deduplicator>,
    embedder: Arc<dyn EmbeddingProvider>,
    writer: DualStoreWriter,
    config: IngestConfig,
}

impl Ingestor {
    /// Ingestor over explicit collaborators.
    pub fn new(
        dedupe: Arc<Deduplicator>,
        embedder: Arc<dyn EmbeddingProvider>,
        writer: DualStoreWriter,
        config: IngestConfig,
    ) -> Self {
        Self {
            dedupe,
            embedder,
            writer,
            config,
        }
    }

    /// Ingests a batch. Per-record failures are counted, never propagated.
    pub async fn ingest<I>(&self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = IngestRecord>,
    {
        let workers = self.config.workers.max(1);
        let report = stream::iter(records)
            .map(|record| self.ingest_one(record))
            .buffer_unordered(workers)
            .fold(IngestReport::default(), |mut report, outcome| async move {
                report.record(outcome);
                report
            })
            .await;
        info!(
            records = report.records,
            indexed = report.indexed,
            duplicates = report.duplicates,
            invalid = report.invalid,
            embedding_failures = report.embedding_failures,
            vector_failures = report.vector_failures,
            degraded = report.degraded.len(),
            "ingestion finished"
        );
        report
    }

    /// Forgets every indexed fingerprint so the next run rewrites everything.
    pub fn reindex(&self) -> io::Result<()> {
        self.dedupe.reset()
    }

    async fn ingest_one(&self, record: IngestRecord) -> Outcome {
        let url = record.metadata.url.clone();
        let draft = match ChunkDraft::from_record(record) {
            Ok(draft) => draft,
            Err(err) => {
                warn!(%url, error = %err, "rejected ingest record");
                return Outcome::Invalid;
            }
        };

        let fingerprint = Fingerprint::of(&draft.canonical);
        if !self.dedupe.claim(&fingerprint).await {
            debug!(%fingerprint, %url, "duplicate chunk skipped");
            return Outcome::Duplicate;
        }

        let chunk = draft.into_chunk(fingerprint.clone());
        let embedding = match self.embedder.embed(&chunk.text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(chunk_id = %chunk.chunk_id, error = %err, "embedding failed; chunk skipped");
                self.dedupe.release(&fingerprint);
                return Outcome::EmbeddingFailed;
            }
        };

        match self.writer.write_chunk(&chunk, embedding).await {
            Ok(receipt) => {
                self.dedupe.commit(&fingerprint);
                Outcome::Indexed {
                    degraded: receipt.is_degraded(),
                    chunk_id: receipt.chunk_id,
                }
            }
            Err(err) => {
                warn!(error = %err, "vector write failed; chunk skipped");
                self.dedupe.release(&fingerprint);
                Outcome::VectorFailed
            }
        }
    }
}
