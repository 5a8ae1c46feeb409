//! In-memory [`StorageAdapter`], backed by `DashMap` for lock-free
//! concurrent access across the per-connection tasks spec.md §5 describes.
//!
//! Every [`InMemoryStorage`] is an explicit, independently constructed
//! handle — never a process-wide singleton (spec.md §9: "the in-memory
//! storage used for tests is process-wide shared state; ... it should be
//! an explicit shared handle passed to the adapter constructor, not a
//! module-level singleton, so tests can construct isolated stacks").
//! Cloning it is cheap and shares the underlying maps, same as wrapping it
//! in an `Arc` yourself.

use crate::adapter::{CleanupReport, CleanupThresholds, Session, StorageAdapter, StoredDelta, StoredDocument};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use synckit_core::{ClientId, Document, DocumentId, SessionId, SyncError, VectorClock};

#[derive(Default)]
struct Inner {
    documents: DashMap<DocumentId, StoredDocument>,
    deltas: DashMap<DocumentId, Vec<StoredDelta>>,
    sessions: DashMap<SessionId, Session>,
    next_log_id: AtomicU64,
}

/// Lock-free in-memory [`StorageAdapter`]. Data does not survive past the
/// process; used for tests and for the client's local-only mode.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn get_document(&self, id: &DocumentId) -> synckit_core::Result<Option<StoredDocument>> {
        Ok(self.inner.documents.get(id).map(|r| r.clone()))
    }

    async fn save_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument> {
        let stored = StoredDocument {
            document: state,
            version: 1,
            updated_at_millis: Self::now_millis(),
        };
        self.inner.documents.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument> {
        let version = self
            .inner
            .documents
            .get(id)
            .map(|r| r.version + 1)
            .unwrap_or(1);
        let stored = StoredDocument {
            document: state,
            version,
            updated_at_millis: Self::now_millis(),
        };
        self.inner.documents.insert(id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete_document(&self, id: &DocumentId) -> synckit_core::Result<bool> {
        Ok(self.inner.documents.remove(id).is_some())
    }

    async fn list_documents(&self, limit: usize, offset: usize) -> synckit_core::Result<Vec<StoredDocument>> {
        let mut all: Vec<StoredDocument> = self.inner.documents.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.document.id().cmp(b.document.id()));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn get_vector_clock(&self, doc_id: &DocumentId) -> synckit_core::Result<VectorClock> {
        Ok(self
            .inner
            .documents
            .get(doc_id)
            .map(|r| r.document.vector().clone())
            .unwrap_or_default())
    }

    async fn update_vector_clock(
        &self,
        doc_id: &DocumentId,
        client: &ClientId,
        seq: u64,
    ) -> synckit_core::Result<()> {
        if let Some(mut entry) = self.inner.documents.get_mut(doc_id) {
            entry.document.vector.advance(client, seq);
        }
        Ok(())
    }

    async fn merge_vector_clock(&self, doc_id: &DocumentId, clock: &VectorClock) -> synckit_core::Result<()> {
        if let Some(mut entry) = self.inner.documents.get_mut(doc_id) {
            entry.document.vector.merge(clock);
        }
        Ok(())
    }

    async fn save_delta(&self, delta: synckit_core::Delta) -> synckit_core::Result<StoredDelta> {
        let log_id = self.inner.next_log_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = StoredDelta {
            log_id,
            delta: delta.clone(),
            recorded_at_millis: Self::now_millis(),
        };
        self.inner
            .deltas
            .entry(delta.document_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_deltas(&self, doc_id: &DocumentId, limit: usize) -> synckit_core::Result<Vec<StoredDelta>> {
        Ok(self
            .inner
            .deltas
            .get(doc_id)
            .map(|log| log.iter().rev().take(limit).rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_session(&self, session: Session) -> synckit_core::Result<()> {
        self.inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn update_session(&self, session: Session) -> synckit_core::Result<()> {
        if !self.inner.sessions.contains_key(&session.id) {
            return Err(SyncError::StorageError(format!("unknown session {}", session.id)));
        }
        self.inner.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> synckit_core::Result<()> {
        self.inner.sessions.remove(id);
        Ok(())
    }

    async fn get_sessions(&self, user_id: &str) -> synckit_core::Result<Vec<Session>> {
        Ok(self
            .inner
            .sessions
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .map(|r| r.clone())
            .collect())
    }

    async fn cleanup(&self, thresholds: CleanupThresholds) -> synckit_core::Result<CleanupReport> {
        let now = Self::now_millis();
        let session_cutoff = now.saturating_sub(thresholds.old_sessions_hours * 3_600_000);
        let delta_cutoff = now.saturating_sub(thresholds.old_deltas_days * 86_400_000);

        let mut sessions_deleted = 0u64;
        self.inner.sessions.retain(|_, session| {
            let keep = session.last_seen_millis >= session_cutoff;
            if !keep {
                sessions_deleted += 1;
            }
            keep
        });

        let mut deltas_deleted = 0u64;
        for mut entry in self.inner.deltas.iter_mut() {
            let before = entry.len();
            entry.retain(|d| d.recorded_at_millis >= delta_cutoff);
            deltas_deleted += (before - entry.len()) as u64;
        }

        tracing::debug!(sessions_deleted, deltas_deleted, "storage cleanup pass completed");

        Ok(CleanupReport {
            sessions_deleted,
            deltas_deleted,
        })
    }
}
