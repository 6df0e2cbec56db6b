//! # Tally Server
//!
//! HTTP entry point for the Tally POS backend.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing (RUST_LOG, default info)                                    │
//! │  2. ServerConfig::load()            environment variables              │
//! │  3. PostgreSQL pool + migrations    required                           │
//! │  4. Redis                           optional, in-process cache if not  │
//! │  5. axum on 0.0.0.0:HTTP_PORT       graceful shutdown on SIGINT/TERM   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tally_cache::{KeyValueCache, MemoryCache, RedisCache};
use tally_db::Database;
use tally_server::config::ServerConfig;
use tally_server::{router, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Tally server...");

    let config = ServerConfig::load()?;
    info!(
        port = config.http_port,
        db_url = %config.redacted_database_url(),
        redis = config.redis_url.is_some(),
        "Configuration loaded"
    );

    let db = Database::connect(config.db_config()).await?;
    info!("Connected to PostgreSQL");

    let cache = connect_cache(&config).await;

    let state = AppState::new(
        Arc::new(db.records()),
        cache,
        &config.cache_key_prefix,
        config.cache_ttls(),
    )
    .with_database(db.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Redis when configured and reachable, otherwise the in-process cache.
async fn connect_cache(config: &ServerConfig) -> Arc<dyn KeyValueCache> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("REDIS_URL not set, using in-process cache");
        return Arc::new(MemoryCache::new());
    };

    match RedisCache::connect(url).await {
        Ok(cache) => {
            info!("Connected to Redis");
            Arc::new(cache)
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to Redis, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
