//! SyncKit Core - replicated state layer for the local-first sync engine
//!
//! This crate implements:
//! - a [`Document`]/[`Replica`] with field-level Last-Writer-Wins conflict
//!   resolution and tombstones
//! - a [`HybridClock`] generating monotone hybrid logical timestamps
//! - a [`VectorClock`] for per-document causality tracking
//! - a [`DeltaEngine`] that stamps, applies, and filters field-level deltas
//! - the [`wire`] protocol frames shared between client and server
//!
//! # Examples
//!
//! ```rust
//! use synckit_core::{DeltaEngine, Document, Limits};
//! use serde_json::json;
//!
//! let mut doc = Document::new("doc-123".to_string());
//! let mut engine = DeltaEngine::new("client-a".to_string(), Limits::default());
//!
//! let delta = engine.stamp_set("doc-123".to_string(), "title".to_string(), json!("Hello")).unwrap();
//! engine.apply_remote(&mut doc, &delta);
//!
//! assert_eq!(doc.get("title"), Some(&json!("Hello")));
//! ```

pub mod clock;
pub mod delta;
pub mod document;
pub mod error;
pub mod ids;
pub mod limits;
pub mod vector_clock;
pub mod wire;

pub use clock::{HybridClock, HybridStamp};
pub use delta::{Delta, DeltaEngine, Op};
pub use document::{ApplyOutcome, Diff, Document, FieldRecord, Replica, Unsubscribe};
pub use error::{Result, SyncError};
pub use ids::{ClientId, DocumentId, FieldName, SessionId};
pub use limits::Limits;
pub use vector_clock::VectorClock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        // Smoke test that modules compile and re-export correctly.
        let _client_id: ClientId = "test-client".to_string();
        let _limits = Limits::default();
    }
}
