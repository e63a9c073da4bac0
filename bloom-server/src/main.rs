use std::sync::Arc;

use bloom_core::storage::{LocalObjectStore, ObjectStore};
use bloom_core::store::{MemoryStore, PgSessionStore, SessionStore};
use bloom_core::BloomConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use bloom_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "bloom.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Keep sessions in memory instead of PostgreSQL (lost on exit)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match BloomConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let store: Arc<dyn SessionStore> = if args.memory {
        tracing::warn!("Using in-memory session store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let pool = match bloom_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };
        bloom_core::db::ensure_schema(&pool).await?;
        Arc::new(PgSessionStore::new(pool))
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Session store ({}) connected: {}", store.name(), v),
            Err(e) => {
                println!("❌ Session store connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Bloom health check passed");
        return Ok(());
    }

    if !config.http.enabled {
        tracing::warn!("HTTP API disabled in config; nothing to serve");
        return Ok(());
    }

    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::from_config(&config.storage));
    tracing::info!(
        store = store.name(),
        media_root = %config.storage.resolved_root().display(),
        "Bloom server starting"
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        store,
        objects,
        config,
    });
    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
