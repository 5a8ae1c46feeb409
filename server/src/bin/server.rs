//! SyncKit server binary: binds the `/sync` WebSocket endpoint and runs
//! the compaction sweep alongside it.
//!
//! Configuration is read from environment variables so deployment
//! doesn't need a config file for the common case:
//! - `SYNCKIT_BIND_ADDR` (default `0.0.0.0:8787`)
//! - `SYNCKIT_DATABASE_URL` (default `sqlite::memory:`)

use std::sync::Arc;

use synckit_server::{build_router, AppState, ServerConfig};
use synckit_storage::{SqliteStorage, StorageAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bind_addr = std::env::var("SYNCKIT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    let database_url = std::env::var("SYNCKIT_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    let storage: Arc<dyn StorageAdapter> = Arc::new(SqliteStorage::connect(&database_url).await?);
    let config = ServerConfig {
        bind_addr: bind_addr.clone(),
        ..ServerConfig::default()
    };

    let state = AppState::new(storage, config);
    let compaction_handle = state.spawn_compaction();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "synckit-server listening");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    compaction_handle.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
