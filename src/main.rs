use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use rags::CancellationFlag;
use rags::cli::commands::{
    handle_config, handle_fill, handle_find, handle_index, handle_remove, handle_status,
};
use rags::cli::{Cli, Commands, load_config};
use rags::models::{Config, OutputFormat};

/// Detect ONNX Runtime library path and set ORT_DYLIB_PATH if not already set.
/// Must be called before any ort code runs.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/rags/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/rags/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: Called at program start before any threads are spawned.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rags=debug" } else { "rags=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    detect_and_set_ort_path();
    dotenvy::dotenv().ok();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let format: OutputFormat = cli.format.unwrap_or(config.search.default_format);
    let verbose = cli.verbose;

    let config_file = cli.config.as_deref();
    let cancel = CancellationFlag::new();

    if matches!(cli.command, Commands::Fill(_)) {
        let watcher = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            eprintln!("\nReceived shutdown signal, finishing the current document...");
            watcher.cancel();
        });
        return run_command(cli.command, config, config_file, format, verbose, cancel).await;
    }

    tokio::select! {
        result = run_command(cli.command, config, config_file, format, verbose, cancel) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
        }
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    config: Config,
    config_file: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationFlag,
) -> Result<()> {
    match command {
        Commands::Fill(args) => handle_fill(args, config, format, verbose, cancel).await,
        Commands::Find(args) => handle_find(args, config, format, verbose).await,
        Commands::Remove(args) => handle_remove(args, config, format).await,
        Commands::Index(cmd) => handle_index(cmd, config, format).await,
        Commands::Status => handle_status(config, format).await,
        Commands::Config(cmd) => handle_config(cmd, &config, config_file, format),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
