//! Wagering server binary

use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use wagering::{
    api::ApiServer,
    audit::{AuditSink, StoreAuditSink, TracingAuditSink, TracingRewards},
    common::config::ConfigLoader,
    config::{StorageBackend, WageringConfig},
    storage::{KvStore, MemoryStore},
    WageringService,
};

/// Casino wagering service
#[derive(Parser)]
#[command(name = "wagering-server")]
#[command(about = "Sessions, rounds and ledger for casino games")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    host: Option<String>,

    /// Listen port override
    #[arg(short, long)]
    port: Option<u16>,

    /// RocksDB data directory override
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Keep everything in memory (nothing survives a restart)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_filter.clone().into()),
        )
        .init();

    let store = open_store(&config)?;
    let audit: Arc<dyn AuditSink> = if config.monitoring.persist_audit_events {
        Arc::new(StoreAuditSink::new(store.clone()))
    } else {
        Arc::new(TracingAuditSink)
    };

    let service = WageringService::builder(config.clone(), store)
        .audit(audit)
        .rewards(Arc::new(TracingRewards))
        .build()?;

    info!(
        backend = ?config.storage.backend,
        games = service.catalog().len(),
        max_win_multiplier = %config.limits.max_win_multiplier,
        seeded = config.rng_seed.is_some(),
        "wagering service ready"
    );

    ApiServer::new(config.api.clone(), Arc::new(service))
        .run()
        .await
}

fn apply_cli_overrides(config: &mut WageringConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.api.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_directory = dir.clone();
        config.storage.backend = StorageBackend::Rocksdb;
    }
    if cli.memory {
        config.storage.backend = StorageBackend::Memory;
    }
}

fn open_store(config: &WageringConfig) -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            info!(path = %config.storage.data_directory, "opening RocksDB store");
            Ok(Arc::new(wagering::storage::RocksStore::open(
                &config.storage.data_directory,
            )?))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => Err(
            "rocksdb backend requested but the binary was built without the `rocksdb` feature; \
             use --memory or rebuild with --features rocksdb"
                .into(),
        ),
    }
}
