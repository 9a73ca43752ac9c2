use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{SearchResults, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::RagDriver;

#[derive(Debug, Args)]
pub struct FindArgs {
    #[arg(required = true, help = "Query text")]
    pub query: String,

    #[arg(long, short = 'k', help = "Number of results to return")]
    pub top_k: Option<usize>,
}

pub async fn handle_find(
    args: FindArgs,
    config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let query = args.query.trim();
    let top_k = args.top_k.unwrap_or(config.search.default_top_k);
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Top k: {top_k}");
    }

    let driver = RagDriver::from_config(&config)
        .await
        .context("failed to initialize RAG driver")?;

    let results = driver.find_in_rag(query, top_k).await.context("query failed")?;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    if verbose {
        eprintln!("  Total: {duration_ms}ms");
    }

    let output = SearchResults {
        query,
        results: &results,
        duration_ms,
    };
    print!("{}", formatter.format_search_results(&output));

    Ok(())
}
