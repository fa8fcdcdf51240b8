use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use lru::LruCache;
use menurag::config::{EmbedderArgs, RerankerArgs, StoreArgs, DEFAULT_RERANK_CANDIDATES};
use menurag::telemetry::init_tracing;
use menurag::{
    EmbeddingProvider, GraphStore, QueryConfig, QueryError, QueryPipeline, Reranker, VectorStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "menurag-retriever",
    about = "HTTP API answering menu questions from the vector and graph stores"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "MENURAG_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Default result count when the client does not override it.
    #[arg(long, default_value_t = 5)]
    default_limit: usize,

    /// Maximum result count allowed per request.
    #[arg(long, default_value_t = 12)]
    max_limit: usize,

    /// Weight of vector similarity in the hybrid blend.
    #[arg(long, env = "MENURAG_ALPHA", default_value_t = 0.25)]
    alpha: f32,

    /// Candidates fetched from the vector store ahead of reranking.
    #[arg(long, default_value_t = DEFAULT_RERANK_CANDIDATES)]
    rerank_candidates: usize,

    /// Concurrent graph lookups while enriching results.
    #[arg(long, default_value_t = 4)]
    enrich_concurrency: usize,

    /// Milliseconds allowed per graph enrichment lookup.
    #[arg(long, default_value_t = 750)]
    enrich_timeout_ms: u64,

    /// Serve answers without graph enrichment.
    #[arg(long, default_value_t = false)]
    disable_graph: bool,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, default_value_t = 1024)]
    embedding_cache_size: usize,

    /// Max requests per minute allowed (0 disables rate limiting).
    #[arg(long, default_value_t = 120)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, default_value_t = 12)]
    rate_limit_burst: u32,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    reranker: RerankerArgs,
}

#[derive(Clone)]
struct AppState {
    pipeline: QueryPipeline,
    embedder: Arc<dyn EmbeddingProvider>,
    default_limit: usize,
    max_limit: usize,
    embedding_cache: Option<Arc<Mutex<LruCache<String, Vec<f32>>>>>,
    rate_limiter: Option<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    alpha: Option<f32>,
    /// Precomputed query embedding; skips the embedding call when present.
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    contexts: Vec<String>,
    meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
struct ResponseMeta {
    limit: usize,
    alpha: f32,
    latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    init_tracing(cli.log_json);

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(cli.embedder.build()?);
    let (vector, graph) = cli.store.connect().await?;
    let vector: Arc<dyn VectorStore> = vector;
    let graph: Option<Arc<dyn GraphStore>> = if cli.disable_graph {
        None
    } else {
        Some(graph as Arc<dyn GraphStore>)
    };
    let reranker = cli
        .reranker
        .build()?
        .map(|reranker| Arc::new(reranker) as Arc<dyn Reranker>);

    let mut timeouts = cli.store.timeouts();
    timeouts.rerank = cli.reranker.timeout();
    timeouts.enrich = std::time::Duration::from_millis(cli.enrich_timeout_ms.max(1));
    let config = QueryConfig {
        alpha: cli.alpha,
        rerank_candidates: cli.rerank_candidates.max(1),
        enrich_concurrency: cli.enrich_concurrency.max(1),
        timeouts,
    };
    anyhow::ensure!(
        (0.0..=1.0).contains(&config.alpha),
        "alpha must be within [0, 1]"
    );

    let state = AppState {
        pipeline: QueryPipeline::new(vector, graph, reranker, config),
        embedder,
        default_limit: cli.default_limit.max(1),
        max_limit: cli.max_limit.max(1),
        embedding_cache: build_cache(cli.embedding_cache_size),
        rate_limiter: RateLimiter::new(cli.max_requests_per_minute, cli.rate_limit_burst),
    };
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/query", post(query_handler))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!(%addr, "menurag-retriever listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "query text must not be empty"));
    }
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.acquire().await {
            return Err(error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded"));
        }
    }
    let limit = request
        .limit
        .unwrap_or(state.default_limit)
        .min(state.max_limit);
    let alpha = request.alpha.unwrap_or(state.pipeline.config().alpha);
    let start = Instant::now();
    let embedding = match request.embedding {
        Some(embedding) => embedding,
        None => embed_query(&state, request.query.clone()).await?,
    };
    let contexts = state
        .pipeline
        .query_with_alpha(&request.query, &embedding, limit, alpha)
        .await
        .map_err(query_error)?;
    Ok(Json(QueryResponse {
        contexts,
        meta: ResponseMeta {
            limit,
            alpha,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
        },
    }))
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn query_error(err: QueryError) -> ApiError {
    match err {
        QueryError::InvalidQuery(_) => error(StatusCode::BAD_REQUEST, err.to_string()),
        QueryError::StoreUnavailable(_) => {
            warn!(error = %err, "query failed");
            error(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}

async fn embed_query(state: &AppState, query: String) -> Result<Vec<f32>, ApiError> {
    if let Some(cache) = &state.embedding_cache {
        if let Some(hit) = {
            let mut guard = cache.lock().await;
            guard.get(&query).cloned()
        } {
            return Ok(hit);
        }
    }

    let embedding = state.embedder.embed(&query).await.map_err(|err| {
        warn!(error = %err, "query embedding failed");
        error(StatusCode::BAD_GATEWAY, err.to_string())
    })?;

    if let Some(cache) = &state.embedding_cache {
        let mut guard = cache.lock().await;
        guard.put(query, embedding.clone());
    }
    Ok(embedding)
}

fn build_cache(size: usize) -> Option<Arc<Mutex<LruCache<String, Vec<f32>>>>> {
    NonZeroUsize::new(size).map(|capacity| Arc::new(Mutex::new(LruCache::new(capacity))))
}

#[derive(Clone)]
struct RateLimiter {
    state: Arc<Mutex<RateState>>,
    capacity: f64,
    refill_per_sec: f64,
}

struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(max_per_minute: u32, burst: u32) -> Option<Self> {
        if max_per_minute == 0 || burst == 0 {
            return None;
        }
        let capacity = burst as f64;
        Some(Self {
            state: Arc::new(Mutex::new(RateState {
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            capacity,
            refill_per_sec: max_per_minute as f64 / 60.0,
        })
    }

    async fn acquire(&self) -> bool {
        let mut guard = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
        guard.last_refill = now;
        guard.tokens = (guard.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if guard.tokens >= 1.0 {
            guard.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
