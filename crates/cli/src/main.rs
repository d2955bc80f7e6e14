mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magnetdb_core::{
    default_config_path, load_config, load_config_or_default, validate_config, Config,
};

#[derive(Parser)]
#[command(name = "magnetdb")]
#[command(about = "Magnet link ledger with a replicated JSON store", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: <config dir>/magnetdb/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the local database path
    #[arg(long, global = true)]
    local: Option<PathBuf>,

    /// Override the remote (replica) database path
    #[arg(long, global = true)]
    remote: Option<PathBuf>,

    /// Override the torrent label
    #[arg(long, global = true)]
    label: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a magnet link without contacting a daemon
    Record {
        /// Magnet URI
        uri: String,
        /// Put the link in the retry queue instead of `added`
        #[arg(long)]
        retry: bool,
    },
    /// Rewrite the local and remote files in the current format
    Migrate,
    /// Reconcile local and remote, then write the result to both
    Reconcile,
    /// Show counts, sequence and checksum state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the checksum of a file
    Checksum {
        path: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        error!("Fatal error: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = || resolve_config(&cli);

    match &cli.command {
        Commands::Record { uri, retry } => commands::record(&config()?, uri, *retry),
        Commands::Migrate => commands::migrate(&config()?),
        Commands::Reconcile => commands::reconcile(&config()?),
        Commands::Status { json } => commands::status(&config()?, *json),
        Commands::Checksum { path } => commands::checksum(path),
    }
}

/// Load the configuration file (explicit, or the default location if it
/// exists), then apply command line overrides.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let path = default_config_path();
            load_config_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
    };

    if let Some(local) = &cli.local {
        config.store.local_path = local.clone();
    }
    if let Some(remote) = &cli.remote {
        config.store.remote_path = Some(remote.clone());
    }
    if let Some(label) = &cli.label {
        config.ingest.label = label.clone();
    }

    validate_config(&config).context("Configuration validation failed")?;
    debug!(
        local = %config.store.local_path.display(),
        remote = ?config.store.remote_path,
        label = %config.ingest.label,
        "Configuration resolved"
    );
    Ok(config)
}
