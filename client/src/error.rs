//! Client-side error type and the event channel spec.md §7 describes:
//! `storageDegraded` / `storageError` / `connectionStatus` / `queueTruncated`
//! all flow through one [`SyncEvent`] enum rather than four separate
//! callbacks, so an embedding application watches a single channel.

use crate::transport::ConnectionState;
use synckit_core::{DocumentId, FieldName};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] synckit_core::SyncError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("client is shutting down")]
    ShutDown,

    #[error("document {0} is not open")]
    DocumentNotOpen(DocumentId),

    #[error("no server configured; client is running in local-only mode")]
    LocalOnly,
}

/// Everything an embedding application can observe about a [`SyncKit`](crate::synckit::SyncKit)
/// instance besides the document diffs a [`Replica`](synckit_core::Replica)
/// already delivers through `subscribe`.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    ConnectionStatus(ConnectionState),
    /// The offline queue exceeded its configured cap and compacted down to
    /// the newest delta per field (spec.md §4.4 "Size bound").
    QueueTruncated {
        document_id: DocumentId,
        field_name: FieldName,
    },
    StorageDegraded {
        reason: String,
    },
    StorageError {
        reason: String,
    },
}
