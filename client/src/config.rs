//! Client configuration (spec.md §6 "Client configuration").

use std::sync::Arc;
use synckit_core::ClientId;
use synckit_storage::StorageAdapter;

/// Options recognised by [`SyncKit::connect`](crate::synckit::SyncKit).
///
/// `Default` reproduces the numeric defaults named throughout spec.md;
/// `storage` and `name` have no sensible default and must be supplied.
#[derive(Clone)]
pub struct SyncConfig {
    /// Namespace under which snapshots and the offline queue are stored
    /// locally. Distinct `name`s on the same `storage` handle never see
    /// each other's documents.
    pub name: String,
    /// Backend the offline queue and document snapshots persist through.
    pub storage: Arc<dyn StorageAdapter>,
    /// Identifies this client/replica across its lifetime. Generated if
    /// not supplied.
    pub client_id: ClientId,
    /// If absent, the client runs in local-only mode: writes persist and
    /// observers fire, but nothing is replicated anywhere.
    pub server_url: Option<String>,
    /// Opaque bearer token sent in `hello`.
    pub auth_token: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub max_skew_ms: u64,
    pub queue_cap: usize,
    /// Soft timeout on the `Subscribe` RPC: if `subscribeComplete` hasn't
    /// arrived by the time this elapses, the transport is forced to
    /// reconnect (spec.md §5).
    pub subscribe_timeout_ms: u64,
}

impl SyncConfig {
    pub fn new(name: impl Into<String>, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            name: name.into(),
            storage,
            client_id: uuid::Uuid::new_v4().to_string(),
            server_url: None,
            auth_token: None,
            heartbeat_interval_ms: 15_000,
            reconnect_base_ms: 500,
            reconnect_cap_ms: 30_000,
            max_skew_ms: 5 * 60 * 1000,
            queue_cap: 10_000,
            subscribe_timeout_ms: 30_000,
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn limits(&self) -> synckit_core::Limits {
        synckit_core::Limits::default()
    }
}
