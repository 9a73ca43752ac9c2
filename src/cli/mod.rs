//! Command line interface for the rags binary.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::error::ConfigError;
use crate::models::{Config, OutputFormat};

/// Fill a vector index from local documents and query it.
#[derive(Debug, Parser)]
#[command(name = "rags")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'c', global = true, help = "Path to a config file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Split, embed and store the documents under a path
    Fill(commands::FillArgs),

    /// Retrieve the chunks most similar to a query
    Find(commands::FindArgs),

    /// Remove every stored chunk of a document
    Remove(commands::RemoveArgs),

    /// Create or delete the vector index
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Check provider and vector store status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

/// Load the config named on the command line, or the user config, then fill
/// credentials from the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_env_credentials())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fill() {
        let cli = Cli::parse_from(["rags", "fill", "./docs", "--recreate", "-f", "json"]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Fill(args) => {
                assert_eq!(args.path, PathBuf::from("./docs"));
                assert!(args.recreate);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_find() {
        let cli = Cli::parse_from(["rags", "--config", "rags.toml", "find", "how to install", "-k", "3"]);
        assert_eq!(cli.config, Some(PathBuf::from("rags.toml")));
        match cli.command {
            Commands::Find(args) => {
                assert_eq!(args.query, "how to install");
                assert_eq!(args.top_k, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rags.toml");
        std::fs::write(&path, "[vector_store]\ndriver = \"memory\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.vector_store.driver, "memory");
    }
}
