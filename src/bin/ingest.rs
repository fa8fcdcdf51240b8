use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use menurag::config::{EmbedderArgs, StoreArgs};
use menurag::telemetry::init_tracing;
use menurag::{
    Deduplicator, DualStoreWriter, EmbeddingProvider, GraphStore, IngestConfig, IngestRecord,
    IngestReport, Ingestor, VectorStore,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "menurag-ingest",
    about = "Index chunk records (JSONL) into the vector and graph stores"
)]
struct IngestCli {
    /// JSONL file of `{text, metadata}` records; `-` reads stdin
    #[arg(long, env = "MENURAG_INGEST_INPUT", default_value = "chunks.jsonl")]
    input: PathBuf,

    /// Fingerprint ledger shared across runs (one hex digest per line)
    #[arg(long, env = "MENURAG_LEDGER")]
    ledger: Option<PathBuf>,

    /// Forget previously indexed fingerprints before ingesting
    #[arg(long, default_value_t = false)]
    reindex: bool,

    /// Chunks processed concurrently
    #[arg(long, env = "MENURAG_INGEST_WORKERS", default_value_t = 8)]
    workers: usize,

    /// Records read from the input per batch
    #[arg(long, env = "MENURAG_INGEST_BATCH", default_value_t = 256)]
    batch_size: usize,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IngestCli::parse();
    init_tracing(cli.log_json);

    let dedupe = match &cli.ledger {
        Some(path) => Deduplicator::with_ledger(path)
            .with_context(|| format!("failed to open fingerprint ledger {:?}", path))?,
        None => Deduplicator::new(),
    };
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(cli.embedder.build()?);
    let (vector, graph) = cli.store.connect().await?;
    let vector: Arc<dyn VectorStore> = vector;
    let graph: Arc<dyn GraphStore> = graph;
    let config = IngestConfig {
        workers: cli.workers.max(1),
        timeouts: cli.store.timeouts(),
    };
    let writer = DualStoreWriter::new(vector, graph, config.timeouts);
    let ingestor = Ingestor::new(Arc::new(dedupe), embedder, writer, config);
    if cli.reindex {
        ingestor
            .reindex()
            .context("failed to reset fingerprint ledger")?;
        info!("fingerprints reset for full reindex");
    }

    let reader: Box<dyn BufRead> = if cli.input.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(&cli.input)
            .with_context(|| format!("failed to open ingest input {:?}", cli.input))?;
        Box::new(BufReader::new(file))
    };

    let batch_size = cli.batch_size.max(1);
    let mut report = IngestReport::default();
    let mut malformed = 0usize;
    let mut batch = Vec::with_capacity(batch_size);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IngestRecord>(&line) {
            Ok(record) => batch.push(record),
            Err(err) => {
                warn!(line = line_no + 1, error = %err, "skipping malformed ingest record");
                malformed += 1;
            }
        }
        if batch.len() >= batch_size {
            report.merge(ingestor.ingest(batch.drain(..).collect::<Vec<_>>()).await);
        }
    }
    if !batch.is_empty() {
        report.merge(ingestor.ingest(batch).await);
    }
    report.records += malformed;
    report.invalid += malformed;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render ingest report")?
    );
    Ok(())
}
