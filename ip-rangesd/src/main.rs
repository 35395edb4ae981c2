mod api;
mod cache;
mod config;
mod filter;
mod gateway;
mod render;
mod upstream;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::cache::db::CacheDb;
use crate::cache::{CacheStore, MemoryStore, SqliteStore};
use crate::config::{CacheBackend, Config};
use crate::gateway::Gateway;
use crate::upstream::Fetcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ip_rangesd=info"))
        )
        .init();

    tracing::info!("Starting ip-rangesd");

    // Load config; every field has a default so the file is optional
    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };

    let fetcher = Fetcher::from_config(&config.upstream)
        .context("Failed to create upstream fetcher")?;
    tracing::info!(
        "Upstream {} (timeout {}s, {} retries)",
        config.upstream.url,
        config.upstream.timeout_secs,
        config.upstream.retries
    );

    // Open the cache backend
    let mut sqlite = None;
    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::Sqlite => {
            let db = CacheDb::open(&config.cache.db_path)?;
            tracing::info!("Opened cache database at {:?}", config.cache.db_path);
            let handle = SqliteStore::spawn(db);
            sqlite = Some(handle.clone());
            Arc::new(handle)
        }
    };

    let gateway = Gateway::new(
        store,
        Arc::new(fetcher),
        config.cache.ttl(),
        config.cache.stale_policy,
    );
    tracing::info!(
        "Cache TTL {}s, stale policy {:?}",
        config.cache.ttl_secs,
        config.cache.stale_policy
    );

    let app = api::routes::router(api::routes::AppState {
        gateway: gateway.clone(),
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    let _ = server_handle.await;

    // Let in-flight refreshes and cache writes finish
    gateway.drain().await;

    if let Some(sqlite) = sqlite {
        if let Err(e) = sqlite.shutdown().await {
            tracing::error!("Failed to shutdown cache: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
