use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use menurag::canonical::Fingerprint;
use menurag::chunk::IngestMetadata;
use menurag::graph_store::{GraphContext, GraphWrite, NodeLabel};
use menurag::reconcile::find_unlinked;
use menurag::vector_store::{EmbeddingRecord, HybridQuery, VectorHit};
use menurag::{
    ChunkDraft, ChunkId, Deduplicator, DualStoreWriter, EmbedError, EmbeddingProvider, GraphStore,
    IngestConfig, IngestRecord, Ingestor, MemoryGraphStore, MemoryVectorStore, QueryConfig,
    QueryError, QueryPipeline, RerankError, Reranker, StoreError, StoreTimeouts, VectorStore,
};

const DIMS: usize = 32;

/// Bag-of-words embedding hashed into a small fixed space.
struct HashEmbedder;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMS];
    for token in text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.len() >= 2)
    {
        let mut hash: u32 = 0x811c9dc5;
        for byte in token.to_lowercase().bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x01000193);
        }
        vector[hash as usize % DIMS] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(inputs.iter().map(|text| hash_embed(text)).collect())
    }
}

/// Fails the first embedding request for text containing `marker`.
struct FlakyEmbedder {
    marker: &'static str,
    tripped: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if inputs.iter().any(|text| text.contains(self.marker))
            && !self.tripped.swap(true, Ordering::SeqCst)
        {
            return Err(EmbedError::Request("503 Service Unavailable".into()));
        }
        HashEmbedder.embed_batch(inputs).await
    }
}

/// Fails its first request after a short delay, then behaves like [`HashEmbedder`].
struct SlowFailOnceEmbedder {
    tripped: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SlowFailOnceEmbedder {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Err(EmbedError::Request("502 Bad Gateway".into()));
        }
        HashEmbedder.embed_batch(inputs).await
    }
}

/// Never answers within any test deadline.
struct StallingVectorStore;

#[async_trait]
impl VectorStore for StallingVectorStore {
    async fn upsert(&self, _record: &EmbeddingRecord) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn hybrid_query(&self, _query: &HybridQuery<'_>) -> Result<Vec<VectorHit>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }

    async fn chunk_ids(
        &self,
        _after: Option<&ChunkId>,
        _limit: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

/// Memory graph whose merges never finish in time.
struct StallingMergeGraph {
    inner: MemoryGraphStore,
}

#[async_trait]
impl GraphStore for StallingMergeGraph {
    async fn merge_chunk(&self, write: &GraphWrite) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.inner.merge_chunk(write).await
    }

    async fn chunk_context(&self, chunk_id: &ChunkId) -> Result<Option<GraphContext>, StoreError> {
        self.inner.chunk_context(chunk_id).await
    }

    async fn has_chunk(&self, chunk_id: &ChunkId) -> Result<bool, StoreError> {
        self.inner.has_chunk(chunk_id).await
    }
}

struct DownVectorStore;

#[async_trait]
impl VectorStore for DownVectorStore {
    async fn upsert(&self, _record: &EmbeddingRecord) -> Result<(), StoreError> {
        Err(StoreError::unavailable("vector", "connection refused"))
    }

    async fn hybrid_query(&self, _query: &HybridQuery<'_>) -> Result<Vec<VectorHit>, StoreError> {
        Err(StoreError::unavailable("vector", "connection refused"))
    }

    async fn chunk_ids(
        &self,
        _after: Option<&ChunkId>,
        _limit: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        Err(StoreError::unavailable("vector", "connection refused"))
    }
}

/// Memory graph that rejects merges for chunk text containing `marker` and
/// can be switched to fail or stall every read.
struct FaultyGraph {
    inner: MemoryGraphStore,
    reject_marker: Option<&'static str>,
    read_fault: ReadFault,
}

#[derive(Clone, Copy)]
enum ReadFault {
    None,
    Error,
    Stall,
}

impl FaultyGraph {
    fn new(reject_marker: Option<&'static str>, read_fault: ReadFault) -> Self {
        Self {
            inner: MemoryGraphStore::new(),
            reject_marker,
            read_fault,
        }
    }
}

#[async_trait]
impl GraphStore for FaultyGraph {
    async fn merge_chunk(&self, write: &GraphWrite) -> Result<(), StoreError> {
        if let Some(marker) = self.reject_marker {
            if write.text.contains(marker) {
                return Err(StoreError::unavailable("graph", "bolt connection reset"));
            }
        }
        self.inner.merge_chunk(write).await
    }

    async fn chunk_context(&self, chunk_id: &ChunkId) -> Result<Option<GraphContext>, StoreError> {
        match self.read_fault {
            ReadFault::None => self.inner.chunk_context(chunk_id).await,
            ReadFault::Error => Err(StoreError::unavailable("graph", "bolt connection reset")),
            ReadFault::Stall => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                self.inner.chunk_context(chunk_id).await
            }
        }
    }

    async fn has_chunk(&self, chunk_id: &ChunkId) -> Result<bool, StoreError> {
        self.inner.has_chunk(chunk_id).await
    }
}

/// Scores every passage the same.
struct ConstantReranker;

#[async_trait]
impl Reranker for ConstantReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>, RerankError> {
        Ok(vec![0.5; passages.len()])
    }
}

/// Prefers passages mentioning dessert.
struct DessertReranker;

#[async_trait]
impl Reranker for DessertReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>, RerankError> {
        Ok(passages
            .iter()
            .map(|p| if p.contains("dessert") { 1.0 } else { 0.0 })
            .collect())
    }
}

/// Answers only after every test deadline, with scores that would flip the order.
struct StallingReranker;

#[async_trait]
impl Reranker for StallingReranker {
    async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>, RerankError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok((0..passages.len()).map(|idx| idx as f64).collect())
    }
}

struct DownReranker;

#[async_trait]
impl Reranker for DownReranker {
    async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f64>, RerankError> {
        Err(RerankError::Unavailable("connection refused".into()))
    }
}

fn record(text: &str, restaurant: &str, url: &str, source: &str) -> IngestRecord {
    IngestRecord {
        text: text.to_string(),
        metadata: IngestMetadata {
            restaurant_name: Some(restaurant.to_string()),
            url: url.to_string(),
            source: source.to_string(),
            timestamp: None,
            chunk_type: Some("semantic".into()),
            dishes: Vec::new(),
        },
    }
}

const BUTTER_CHICKEN: &str = "Butter Chicken ₹350, Restaurant: Bikanervala";
const PANEER_TIKKA: &str = "Paneer Tikka ₹250 - smoky grilled cottage cheese skewers";
const MASALA_DOSA: &str = "Masala Dosa ₹120 - crisp rice crepe with potato";
const GULAB_JAMUN: &str = "Gulab Jamun ₹90 - vegetarian dessert in syrup";

fn corpus() -> Vec<IngestRecord> {
    vec![
        record(
            BUTTER_CHICKEN,
            "Bikanervala",
            "https://bikanervala.example/menu",
            "crawl4ai",
        ),
        record(
            BUTTER_CHICKEN,
            "Bikanervala",
            "https://bikanervala.example/menu",
            "selenium",
        ),
        record(
            PANEER_TIKKA,
            "Bikanervala",
            "https://bikanervala.example/starters",
            "crawl4ai",
        ),
        record(
            MASALA_DOSA,
            "Saravana Bhavan",
            "https://saravana.example/menu",
            "crawl4ai",
        ),
        record(
            GULAB_JAMUN,
            "Saravana Bhavan",
            "https://saravana.example/desserts",
            "crawl4ai",
        ),
    ]
}

struct Harness {
    vector: Arc<MemoryVectorStore>,
    graph: Arc<MemoryGraphStore>,
    ingestor: Ingestor,
}

fn harness_with(embedder: Arc<dyn EmbeddingProvider>) -> Harness {
    let vector = Arc::new(MemoryVectorStore::new(DIMS));
    let graph = Arc::new(MemoryGraphStore::new());
    let writer = DualStoreWriter::new(vector.clone(), graph.clone(), StoreTimeouts::default());
    let ingestor = Ingestor::new(
        Arc::new(Deduplicator::new()),
        embedder,
        writer,
        IngestConfig::default(),
    );
    Harness {
        vector,
        graph,
        ingestor,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(HashEmbedder))
}

fn pipeline(
    vector: Arc<dyn VectorStore>,
    graph: Option<Arc<dyn GraphStore>>,
    reranker: Option<Arc<dyn Reranker>>,
) -> QueryPipeline {
    let mut config = QueryConfig::default();
    config.timeouts.enrich = Duration::from_millis(50);
    config.timeouts.rerank = Duration::from_millis(200);
    QueryPipeline::new(vector, graph, reranker, config)
}

fn with_graph<G: GraphStore + 'static>(graph: Arc<G>) -> Option<Arc<dyn GraphStore>> {
    Some(graph)
}

fn with_reranker<R: Reranker + 'static>(reranker: R) -> Option<Arc<dyn Reranker>> {
    Some(Arc::new(reranker))
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_text_from_two_sources_is_indexed_once() {
    let h = harness();
    let report = h
        .ingestor
        .ingest(vec![
            record(
                BUTTER_CHICKEN,
                "Bikanervala",
                "https://bikanervala.example/menu",
                "crawl4ai",
            ),
            record(
                &format!("<p>{BUTTER_CHICKEN}</p>"),
                "Bikanervala",
                "https://bikanervala.example/menu",
                "selenium",
            ),
        ])
        .await;

    assert_eq!(report.records, 2);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(h.vector.len(), 1);
    assert_eq!(h.graph.node_count(NodeLabel::Chunk), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn ingesting_twice_is_idempotent() {
    let h = harness();
    let first = h.ingestor.ingest(corpus()).await;
    assert_eq!(first.indexed, 4);
    assert_eq!(first.duplicates, 1);
    let nodes = (
        h.graph.node_count(NodeLabel::Chunk),
        h.graph.node_count(NodeLabel::Restaurant),
        h.graph.node_count(NodeLabel::Dish),
    );
    let edges = h.graph.edge_count();

    let second = h.ingestor.ingest(corpus()).await;
    assert_eq!(second.indexed, 0);
    assert_eq!(second.duplicates, 5);

    h.ingestor.reindex().expect("reset fingerprints");
    let rewritten = h.ingestor.ingest(corpus()).await;
    assert_eq!(rewritten.indexed, 4);

    assert_eq!(h.vector.len(), 4);
    assert_eq!(
        (
            h.graph.node_count(NodeLabel::Chunk),
            h.graph.node_count(NodeLabel::Restaurant),
            h.graph.node_count(NodeLabel::Dish),
        ),
        nodes
    );
    assert_eq!(nodes, (4, 2, 4));
    assert_eq!(h.graph.edge_count(), edges);
}

#[tokio::test(flavor = "current_thread")]
async fn spicy_paneer_tikka_returns_enriched_chunk() {
    let h = harness();
    h.ingestor.ingest(corpus()).await;
    let query = "spicy paneer tikka";
    let pipeline = pipeline(h.vector.clone(), with_graph(h.graph.clone()), None);

    let answer = pipeline
        .query(query, &hash_embed(query), 1)
        .await
        .expect("query succeeds");

    assert_eq!(answer.len(), 1);
    assert_eq!(
        answer[0],
        format!(
            "{PANEER_TIKKA}\n\n\
             Restaurant: Bikanervala\n\
             Featured dish(es): Paneer Tikka\n\
             Menu includes: Butter Chicken (₹350), Paneer Tikka (₹250)"
        )
    );
}

#[tokio::test(flavor = "current_thread")]
async fn answers_are_truncated_and_distinct() {
    let h = harness();
    h.ingestor.ingest(corpus()).await;
    let pipeline = pipeline(h.vector.clone(), with_graph(h.graph.clone()), None);
    let query = "menu";
    let vector = hash_embed("dish price menu");

    for limit in [0usize, 1, 2, 4, 20] {
        let answer = pipeline
            .query(query, &vector, limit)
            .await
            .expect("query succeeds");
        assert_eq!(answer.len(), limit.min(4));
        let unique: HashSet<_> = answer.iter().collect();
        assert_eq!(unique.len(), answer.len());
    }
}

#[tokio::test(flavor = "current_thread")]
async fn ordering_is_stable_with_and_without_reranker() {
    let h = harness();
    h.ingestor.ingest(corpus()).await;
    let query = "vegetarian dessert or dosa";
    let vector = hash_embed(query);

    let plain = pipeline(h.vector.clone(), None, None);
    let baseline = plain.query(query, &vector, 4).await.expect("baseline");
    assert_eq!(
        plain.query(query, &vector, 4).await.expect("repeat"),
        baseline
    );

    let tied = pipeline(h.vector.clone(), None, with_reranker(ConstantReranker));
    assert_eq!(tied.query(query, &vector, 4).await.expect("tied"), baseline);

    let down = pipeline(h.vector.clone(), None, with_reranker(DownReranker));
    assert_eq!(down.query(query, &vector, 4).await.expect("fallback"), baseline);

    let slow = pipeline(h.vector.clone(), None, with_reranker(StallingReranker));
    assert_eq!(slow.query(query, &vector, 4).await.expect("timed out"), baseline);

    let dessert = pipeline(h.vector.clone(), None, with_reranker(DessertReranker));
    let reranked = dessert.query(query, &vector, 4).await.expect("reranked");
    assert_eq!(reranked[0], GULAB_JAMUN);
    let mut sorted_baseline = baseline.clone();
    let mut sorted_reranked = reranked.clone();
    sorted_baseline.sort();
    sorted_reranked.sort();
    assert_eq!(sorted_baseline, sorted_reranked);
}

#[tokio::test(flavor = "current_thread")]
async fn graph_outages_degrade_to_plain_text() {
    let h = harness();
    h.ingestor.ingest(corpus()).await;
    let query = "paneer tikka";
    let vector = hash_embed(query);

    let disabled = pipeline(h.vector.clone(), None, None);
    let expected = disabled.query(query, &vector, 3).await.expect("no graph");
    assert_eq!(expected[0], PANEER_TIKKA);

    for fault in [ReadFault::Error, ReadFault::Stall] {
        let graph = Arc::new(FaultyGraph::new(None, fault));
        let degraded = pipeline(h.vector.clone(), with_graph(graph), None);
        assert_eq!(
            degraded.query(query, &vector, 3).await.expect("degraded"),
            expected
        );
    }

    let empty_graph = Arc::new(MemoryGraphStore::new());
    let absent = pipeline(h.vector.clone(), with_graph(empty_graph), None);
    assert_eq!(absent.query(query, &vector, 3).await.expect("absent"), expected);
}

#[tokio::test(flavor = "current_thread")]
async fn graph_write_failure_keeps_chunk_searchable_and_reconcilable() {
    let vector = Arc::new(MemoryVectorStore::new(DIMS));
    let graph = Arc::new(FaultyGraph::new(Some("Masala Dosa"), ReadFault::None));
    let writer = DualStoreWriter::new(vector.clone(), graph.clone(), StoreTimeouts::default());
    let ingestor = Ingestor::new(
        Arc::new(Deduplicator::new()),
        Arc::new(HashEmbedder),
        writer,
        IngestConfig::default(),
    );

    let report = ingestor.ingest(corpus()).await;
    assert_eq!(report.indexed, 4);
    assert_eq!(report.degraded.len(), 1);

    let scan = find_unlinked(vector.as_ref(), graph.as_ref(), 2)
        .await
        .expect("scan");
    assert_eq!(scan.scanned, 4);
    assert_eq!(scan.missing, report.degraded);

    let ids = vector.chunk_ids(None, 10).await.expect("ids");
    for id in ids {
        let linked = graph.has_chunk(&id).await.expect("probe");
        let context = graph.chunk_context(&id).await.expect("context");
        assert_eq!(linked, context.is_some());
        if let Some(context) = context {
            assert!(context.restaurant.is_some());
            assert!(!context.featured_dishes.is_empty());
        }
    }

    let query = "masala dosa";
    let pipeline = pipeline(vector.clone(), with_graph(graph.clone()), None);
    let answer = pipeline
        .query(query, &hash_embed(query), 1)
        .await
        .expect("query");
    assert_eq!(answer, vec![MASALA_DOSA.to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn vector_outage_skips_chunks_and_fails_queries() {
    let graph = Arc::new(MemoryGraphStore::new());
    let writer = DualStoreWriter::new(
        Arc::new(DownVectorStore),
        graph.clone(),
        StoreTimeouts::default(),
    );
    let dedupe = Arc::new(Deduplicator::new());
    let ingestor = Ingestor::new(
        dedupe.clone(),
        Arc::new(HashEmbedder),
        writer,
        IngestConfig::default(),
    );

    let report = ingestor.ingest(corpus()).await;
    assert_eq!(report.indexed, 0);
    assert_eq!(report.vector_failures + report.duplicates, 5);
    assert_eq!(graph.node_count(NodeLabel::Chunk), 0);
    assert!(dedupe.is_empty());

    let pipeline = pipeline(Arc::new(DownVectorStore), with_graph(graph), None);
    let err = pipeline
        .query("paneer", &hash_embed("paneer"), 3)
        .await
        .expect_err("vector outage is fatal");
    assert!(matches!(err, QueryError::StoreUnavailable(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn embedding_failure_skips_chunk_until_retried() {
    let h = harness_with(Arc::new(FlakyEmbedder {
        marker: "Gulab Jamun",
        tripped: AtomicBool::new(false),
    }));

    let first = h.ingestor.ingest(corpus()).await;
    assert_eq!(first.embedding_failures, 1);
    assert_eq!(first.indexed, 3);

    let retry = h
        .ingestor
        .ingest(vec![record(
            GULAB_JAMUN,
            "Saravana Bhavan",
            "https://saravana.example/desserts",
            "crawl4ai",
        )])
        .await;
    assert_eq!(retry.indexed, 1);
    assert_eq!(h.vector.len(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_records_are_counted_not_fatal() {
    let h = harness();
    let mut bad_url = record(MASALA_DOSA, "Saravana Bhavan", "not a url", "crawl4ai");
    bad_url.metadata.chunk_type = None;
    let mut bad_strategy = record(
        GULAB_JAMUN,
        "Saravana Bhavan",
        "https://saravana.example/desserts",
        "crawl4ai",
    );
    bad_strategy.metadata.chunk_type = Some("vibes".into());
    let empty = record("  **  ", "Saravana Bhavan", "https://saravana.example/", "crawl4ai");

    let report = h
        .ingestor
        .ingest(vec![
            bad_url,
            bad_strategy,
            empty,
            record(
                PANEER_TIKKA,
                "Bikanervala",
                "https://bikanervala.example/starters",
                "crawl4ai",
            ),
        ])
        .await;
    assert_eq!(report.invalid, 3);
    assert_eq!(report.indexed, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn empty_index_answers_with_empty_list() {
    let pipeline = pipeline(Arc::new(MemoryVectorStore::new(DIMS)), None, None);
    let answer = pipeline
        .query("anything", &hash_embed("anything"), 5)
        .await
        .expect("empty ok");
    assert!(answer.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn duplicate_waits_for_failed_first_copy() {
    let h = harness_with(Arc::new(SlowFailOnceEmbedder {
        tripped: AtomicBool::new(false),
    }));
    let first = record(
        BUTTER_CHICKEN,
        "Bikanervala",
        "https://bikanervala.example/menu",
        "crawl4ai",
    );
    let second = record(
        BUTTER_CHICKEN,
        "Bikanervala",
        "https://bikanervala.example/menu",
        "selenium",
    );
    let draft = ChunkDraft::from_record(second.clone()).expect("valid");
    let survivor = draft.clone().into_chunk(Fingerprint::of(&draft.canonical)).chunk_id;

    let report = h.ingestor.ingest(vec![first, second]).await;
    assert_eq!(report.embedding_failures, 1);
    assert_eq!(report.duplicates, 0);
    assert_eq!(report.indexed, 1);
    assert_eq!(h.vector.len(), 1);
    let stored = h.vector.get(&survivor).expect("second copy indexed");
    assert_eq!(stored.properties.source, "selenium");
    assert_eq!(h.graph.node_count(NodeLabel::Chunk), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn vector_search_timeout_is_fatal() {
    let mut config = QueryConfig::default();
    config.timeouts.vector = Duration::from_millis(50);
    let pipeline = QueryPipeline::new(Arc::new(StallingVectorStore), None, None, config);
    let err = pipeline
        .query("paneer", &hash_embed("paneer"), 3)
        .await
        .expect_err("timeout is fatal");
    assert!(matches!(
        err,
        QueryError::StoreUnavailable(StoreError::Timeout { store: "vector", .. })
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn graph_write_timeout_degrades_the_receipt() {
    let vector = Arc::new(MemoryVectorStore::new(DIMS));
    let graph = Arc::new(StallingMergeGraph {
        inner: MemoryGraphStore::new(),
    });
    let timeouts = StoreTimeouts {
        graph: Duration::from_millis(50),
        ..StoreTimeouts::default()
    };
    let writer = DualStoreWriter::new(vector.clone(), graph.clone(), timeouts);

    let draft = ChunkDraft::from_record(record(
        PANEER_TIKKA,
        "Bikanervala",
        "https://bikanervala.example/starters",
        "crawl4ai",
    ))
    .expect("valid");
    let chunk = draft.clone().into_chunk(Fingerprint::of(&draft.canonical));
    let receipt = writer
        .write_chunk(&chunk, hash_embed(PANEER_TIKKA))
        .await
        .expect("vector write succeeds");

    assert!(receipt.is_degraded());
    assert!(matches!(
        receipt.graph_error,
        Some(StoreError::Timeout { store: "graph", .. })
    ));
    assert_eq!(vector.len(), 1);
    assert!(!graph.has_chunk(&chunk.chunk_id).await.expect("probe"));

    let pipeline = pipeline(vector.clone(), with_graph(graph), None);
    let answer = pipeline
        .query("paneer tikka", &hash_embed("paneer tikka"), 1)
        .await
        .expect("query");
    assert_eq!(answer, vec![PANEER_TIKKA.to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn out_of_range_alpha_is_rejected_even_for_zero_limit() {
    let pipeline = pipeline(Arc::new(MemoryVectorStore::new(DIMS)), None, None);
    for alpha in [5.0, -0.1, f32::NAN] {
        let err = pipeline
            .query_with_alpha("paneer", &hash_embed("paneer"), 0, alpha)
            .await
            .expect_err("alpha is validated");
        assert!(matches!(err, QueryError::InvalidQuery(_)));
    }
    assert!(pipeline
        .query_with_alpha("paneer", &hash_embed("paneer"), 0, 0.5)
        .await
        .expect("valid alpha")
        .is_empty());
}
