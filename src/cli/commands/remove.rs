use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::RagDriver;

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Document whose chunks should be deleted
    #[arg(required = true)]
    pub path: PathBuf,
}

pub async fn handle_remove(args: RemoveArgs, config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let driver = RagDriver::from_config(&config)
        .await
        .context("failed to initialize RAG driver")?;

    driver
        .remove_source(&args.path)
        .await
        .with_context(|| format!("failed to remove {}", args.path.display()))?;

    print!(
        "{}",
        formatter.format_message(&format!("Removed chunks of {}", args.path.display()))
    );
    Ok(())
}
