//! Axum application wiring: shared [`AppState`], the `/sync` WebSocket
//! upgrade route, and a `/healthz` liveness probe.

use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use synckit_storage::StorageAdapter;

use crate::compaction;
use crate::config::ServerConfig;
use crate::connection::handle_socket;
use crate::registry::HubRegistry;

/// State shared across every connection handler: the storage backend,
/// the per-document hub registry, and the running configuration.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub registry: Arc<HubRegistry>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: ServerConfig) -> Self {
        let registry = Arc::new(HubRegistry::new(storage.clone(), config.clone()));
        Self { storage, registry, config }
    }

    /// Spawns the background compaction task (spec.md §4.6), returning
    /// its `JoinHandle` so a caller (tests, the binary's shutdown path)
    /// can abort it.
    pub fn spawn_compaction(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(compaction::run(self.storage.clone(), self.registry.clone(), self.config.clone()))
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/sync", get(ws_upgrade))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn healthz() -> &'static str {
    "ok"
}
