use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write the default configuration file")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
    #[command(about = "Validate the current configuration")]
    Validate,
}

pub fn handle_config(
    cmd: ConfigCommand,
    config: &Config,
    config_file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => {
            let path = Config::config_path()
                .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

            if path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            let path = Config::default()
                .save()
                .context("failed to write config")?;
            print!(
                "{}",
                formatter.format_message(&format!("Created config at: {}", path.display()))
            );
        }
        ConfigCommand::Show => {
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                if let Some(path) = config_file.map(Path::to_path_buf).or_else(Config::config_path) {
                    println!("# {}", path.display());
                }
                print!("{}", toml::to_string_pretty(config)?);
                if config.embedding.api_key.is_some() {
                    println!("# embedding api_key: ********");
                }
                if config.vector_store.api_key.is_some() {
                    println!("# vector_store api_key: ********");
                }
            }
        }
        ConfigCommand::Path => {
            let path = config_file
                .map(Path::to_path_buf)
                .or_else(Config::config_path)
                .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
            let state = if path.exists() { "" } else { " (not created)" };
            println!("{}{}", path.display(), state);
        }
        ConfigCommand::Validate => {
            config.validate().context("invalid configuration")?;
            print!("{}", formatter.format_message("Configuration is valid"));
        }
    }

    Ok(())
}
