//! Fill command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{CancellationFlag, RagDriver};

#[derive(Debug, Args)]
pub struct FillArgs {
    /// File or directory to ingest
    #[arg(required = true)]
    pub path: PathBuf,

    /// Drop and recreate the index before filling it
    #[arg(long)]
    pub recreate: bool,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Embedding calls in flight per document
    #[arg(long)]
    pub concurrency: Option<usize>,
}

pub async fn handle_fill(
    args: FillArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationFlag,
) -> Result<()> {
    if args.recreate {
        config.ingest.recreate_index = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.ingest.concurrency = concurrency;
    }
    config.ingest.exclude_patterns.extend(args.exclude);

    let formatter = get_formatter(format);
    let driver = RagDriver::from_config(&config)
        .await
        .context("failed to initialize RAG driver")?;

    if verbose {
        eprintln!(
            "Provider: {} ({} dims), store: {}, index: {}",
            driver.provider().name(),
            driver.provider().dimension(),
            driver.store().name(),
            driver.store().index_config().name
        );
        eprintln!("Extensions: {}", driver.splitters().extensions().join(", "));
    }

    let spinner = if format == OutputFormat::Text {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("invalid progress template")?,
        );
        pb.set_message(format!("Filling from {}", args.path.display()));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let result = driver.fill_rag(&args.path, &cancel).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let summary = result.context("fill failed")?;
    print!("{}", formatter.format_ingest_summary(&summary));

    if summary.documents_failed() > 0 {
        eprintln!(
            "\n{} of {} documents had failures",
            summary.documents_failed(),
            summary.documents_processed()
        );
    }

    Ok(())
}
