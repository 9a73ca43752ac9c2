//! Index lifecycle commands.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::RagDriver;

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Create the configured index if it does not exist
    Create,

    /// Delete the configured index and every vector in it
    Delete {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },
}

pub async fn handle_index(cmd: IndexCommand, config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let name = config.vector_store.index.name.clone();

    match cmd {
        IndexCommand::Create => {
            let driver = RagDriver::from_config(&config)
                .await
                .context("failed to initialize RAG driver")?;
            driver.create_index().await.context("failed to create index")?;
            print!(
                "{}",
                formatter.format_message(&format!("Index '{}' is ready", name))
            );
        }
        IndexCommand::Delete { force } => {
            if !force && !confirm(&format!("Delete index '{}' and all its vectors?", name))? {
                print!("{}", formatter.format_message("Aborted."));
                return Ok(());
            }

            let driver = RagDriver::from_config(&config)
                .await
                .context("failed to initialize RAG driver")?;
            driver.delete_index().await.context("failed to delete index")?;
            print!(
                "{}",
                formatter.format_message(&format!("Deleted index '{}'", name))
            );
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
