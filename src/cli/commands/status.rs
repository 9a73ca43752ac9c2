use anyhow::{Context, Result};

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::services::RagDriver;

pub async fn handle_status(config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    let driver = RagDriver::from_config(&config)
        .await
        .context("failed to initialize RAG driver")?;
    let status = driver.status().await.context("failed to read index status")?;

    print!("{}", formatter.format_status(&status));

    if !status.healthy {
        eprintln!();
        match config.vector_store.driver.parse::<VectorDriver>() {
            Ok(VectorDriver::Qdrant) => {
                eprintln!(
                    "Warning: Qdrant not reachable at {}. Start with: docker run -p 6334:6334 qdrant/qdrant",
                    config.vector_store.url
                );
            }
            Ok(VectorDriver::Postgres) => {
                eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
            }
            Ok(VectorDriver::Memory) | Err(_) => {}
        }
    } else if status.points_count.is_none() {
        eprintln!("\nHint: index not created yet. Run: rags fill <path>");
    }

    if !status.provider_healthy {
        eprintln!(
            "Warning: embedding provider '{}' is not reachable. Check embedding.url.",
            status.provider
        );
    }

    Ok(())
}
