//! The `StorageAdapter` trait (spec.md §4.7): the persistence seam the
//! core engine is built against. All operations are asynchronous and the
//! core awaits durable commit before acknowledging a write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use synckit_core::{ClientId, Delta, Document, DocumentId, SessionId};

/// A document snapshot as persisted by an adapter: the full [`Document`]
/// (fields, tombstones, and vector clock included) plus adapter-assigned
/// bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDocument {
    pub document: Document,
    pub version: u64,
    pub updated_at_millis: u64,
}

/// One entry in the append-only delta log, with an adapter-assigned log id
/// and recording timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredDelta {
    pub log_id: u64,
    pub delta: Delta,
    pub recorded_at_millis: u64,
}

/// A server-side record of one live client connection (spec.md glossary:
/// Session).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub client_id: ClientId,
    pub user_id: Option<String>,
    pub connected_at_millis: u64,
    pub last_seen_millis: u64,
}

/// Thresholds for [`StorageAdapter::cleanup`].
#[derive(Debug, Clone, Copy)]
pub struct CleanupThresholds {
    pub old_sessions_hours: u64,
    pub old_deltas_days: u64,
}

/// Counts of what a [`StorageAdapter::cleanup`] pass removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub sessions_deleted: u64,
    pub deltas_deleted: u64,
}

/// Pluggable persistence backend the core engine is built against
/// (spec.md §4.7). Implementations may be in-memory, browser key-value, or
/// relational; the core never assumes a concrete backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_document(&self, id: &DocumentId) -> synckit_core::Result<Option<StoredDocument>>;
    async fn save_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument>;
    async fn update_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument>;
    async fn delete_document(&self, id: &DocumentId) -> synckit_core::Result<bool>;
    async fn list_documents(&self, limit: usize, offset: usize) -> synckit_core::Result<Vec<StoredDocument>>;

    async fn get_vector_clock(&self, doc_id: &DocumentId) -> synckit_core::Result<synckit_core::VectorClock>;
    async fn update_vector_clock(
        &self,
        doc_id: &DocumentId,
        client: &ClientId,
        seq: u64,
    ) -> synckit_core::Result<()>;
    async fn merge_vector_clock(
        &self,
        doc_id: &DocumentId,
        clock: &synckit_core::VectorClock,
    ) -> synckit_core::Result<()>;

    async fn save_delta(&self, delta: Delta) -> synckit_core::Result<StoredDelta>;
    async fn get_deltas(&self, doc_id: &DocumentId, limit: usize) -> synckit_core::Result<Vec<StoredDelta>>;

    async fn save_session(&self, session: Session) -> synckit_core::Result<()>;
    async fn update_session(&self, session: Session) -> synckit_core::Result<()>;
    async fn delete_session(&self, id: &SessionId) -> synckit_core::Result<()>;
    async fn get_sessions(&self, user_id: &str) -> synckit_core::Result<Vec<Session>>;

    async fn cleanup(&self, thresholds: CleanupThresholds) -> synckit_core::Result<CleanupReport>;
}
