//! # Swarm Guard Runtime
//!
//! Entry point of the `swarm-guard` binary.
//!
//! ## Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load the TOML configuration (fatal if missing or invalid)
//! 3. Install logging (`RUST_LOG` wins over `--debug` / `debug = true`)
//! 4. Detect the torrent client and log in (fatal on failure)
//! 5. Poll until Ctrl+C

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swarm_guard::{Backend, GuardScheduler, SystemTimeSource, TomlConfigSource};

/// Bans misbehaving BitTorrent peers through the client's Web API.
#[derive(Parser, Debug)]
#[command(name = "swarm-guard", version)]
#[command(about = "Heuristic peer-ban guard for qBittorrent and Transmission")]
struct Args {
    /// Path to the TOML configuration file (re-read when it changes)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config_source = TomlConfigSource::new(&args.config);
    let config = config_source
        .load()
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    init_logging(args.debug || config.debug)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting swarm-guard");
    config.log_summary();

    let backend = Backend::new(&config).context("failed to create HTTP client")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = GuardScheduler::new(
        backend,
        SystemTimeSource::new(),
        config_source,
        config,
        shutdown_rx,
    );

    scheduler
        .start()
        .await
        .context("failed to authenticate against the torrent client")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested. Finishing current work...");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Guard is running. Press Ctrl+C to stop.");
    scheduler.run().await?;
    Ok(())
}

fn init_logging(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
