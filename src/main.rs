//! Pool Game Server Binary

use clap::Parser;
use poolgame::{
    api::ApiServer,
    config::{generate_sample_config, ConfigLoader, StorageBackend},
    BroadcastPublisher, GameEngine, LedgerStore, MemoryLedger, OptimizedStorage, RocksLedger,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "poolgame")]
#[command(about = "Capped pool game server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Ledger backend: memory or rocksdb
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Write a default configuration file to this path and exit
    #[arg(long)]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.generate_config {
        generate_sample_config(&path)?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(backend) = args.storage {
        config.storage.backend = backend;
    }
    if let Some(db_path) = args.db_path {
        config.storage.data_directory = db_path;
    }
    loader.validate(&config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.clone())),
        )
        .init();

    let store: Arc<dyn LedgerStore> = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory ledger; games are lost on restart");
            Arc::new(MemoryLedger::new())
        }
        StorageBackend::RocksDb => {
            info!(path = %config.storage.data_directory, "Opening game ledger");
            let storage = OptimizedStorage::new_with_config(&config.storage)?;
            Arc::new(RocksLedger::new(storage))
        }
    };

    let publisher = BroadcastPublisher::new(config.broadcast.channel_capacity);
    let engine = GameEngine::spawn(store, publisher, config.games.clone()).await?;

    ApiServer::new(config, engine).run().await
}
