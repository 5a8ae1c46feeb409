//! Per-process registry of document-keyed hubs (spec.md §4.6 "Per-process
//! registry of document-keyed subscription sets").

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use synckit_core::DocumentId;
use synckit_storage::StorageAdapter;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::hub::{spawn_hub, HubHandle};

/// Lazily spawns and caches one [`HubHandle`] per document. A single
/// `create_lock` serialises the rare hub-creation path so two
/// connections racing to open the same never-before-seen document don't
/// spawn two competing actors; every other operation reads the
/// lock-free `DashMap` directly.
pub struct HubRegistry {
    storage: Arc<dyn StorageAdapter>,
    config: ServerConfig,
    hubs: DashMap<DocumentId, HubHandle>,
    create_lock: Mutex<()>,
}

impl HubRegistry {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: ServerConfig) -> Self {
        Self {
            storage,
            config,
            hubs: DashMap::new(),
            create_lock: Mutex::new(()),
        }
    }

    pub async fn get_or_spawn(&self, document_id: &DocumentId) -> Result<HubHandle> {
        if let Some(handle) = self.hubs.get(document_id) {
            return Ok(handle.clone());
        }

        let _guard = self.create_lock.lock().await;
        if let Some(handle) = self.hubs.get(document_id) {
            return Ok(handle.clone());
        }

        let handle = spawn_hub(document_id.clone(), self.storage.clone(), &self.config).await?;
        self.hubs.insert(document_id.clone(), handle.clone());
        Ok(handle)
    }

    /// Snapshot of every document currently hosting a live hub, for the
    /// compaction task to sweep (spec.md §4.6 "Compaction: a periodic
    /// task").
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.hubs.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<HubHandle> {
        self.hubs.get(document_id).map(|entry| entry.clone())
    }
}
