use anyhow::{Context, Result};
use clap::Parser;
use menurag::config::StoreArgs;
use menurag::reconcile::find_unlinked;
use menurag::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "menurag-reconcile",
    about = "List vector entries whose chunk_id has no graph Chunk node"
)]
struct ReconcileCli {
    /// Chunk ids fetched from the vector store per page
    #[arg(long, env = "MENURAG_RECONCILE_PAGE", default_value_t = 500)]
    page_size: usize,

    /// Exit with status 1 when unlinked entries are found
    #[arg(long, default_value_t = false)]
    fail_on_missing: bool,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,

    #[command(flatten)]
    store: StoreArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ReconcileCli::parse();
    init_tracing(cli.log_json);

    let (vector, graph) = cli.store.connect().await?;
    let report = find_unlinked(vector.as_ref(), graph.as_ref(), cli.page_size)
        .await
        .context("reconciliation scan failed")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render reconcile report")?
    );
    if cli.fail_on_missing && !report.missing.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
