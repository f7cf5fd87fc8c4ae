//! Headless search host speaking newline-delimited JSON over stdio.
//!
//! Reads `SearchRequest` objects from stdin and writes one response
//! envelope per request to stdout. All tracing output goes to stderr so
//! that stdout remains a clean JSON protocol channel.

use std::path::PathBuf;

use clap::Parser;
use panhub::{AppConfig, build_service, run_stdio_bridge};
use tracing_subscriber::EnvFilter;

/// panhub-host: cloud-drive resource search over stdin/stdout.
#[derive(Parser)]
#[command(name = "panhub-host", version, about)]
struct Cli {
    /// Path to TOML configuration file. Defaults to
    /// `~/.config/panhub/config.toml`; a missing file means defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(AppConfig::default_config_path);
    let config = AppConfig::load_or_default(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;

    tracing::info!(config = %path.display(), "panhub-host starting");

    let service = build_service(&config)?;
    run_stdio_bridge(&service).await.map_err(|e| {
        tracing::error!(error = %e, "panhub-host exited with error");
        anyhow::anyhow!("panhub-host failed: {e}")
    })?;

    tracing::info!("panhub-host shut down cleanly");
    Ok(())
}
