//! Pluggable persistence backends for the SyncKit sync engine.
//!
//! The [`StorageAdapter`] trait is the seam spec.md §4.7 describes: the
//! core never assumes a concrete backend. This crate ships two
//! implementations — [`InMemoryStorage`] for tests and the client's
//! local-only mode, and [`SqliteStorage`] for anything that needs to
//! survive a restart.

pub mod adapter;
pub mod memory;
pub mod sqlite;

pub use adapter::{CleanupReport, CleanupThresholds, Session, StorageAdapter, StoredDelta, StoredDocument};
pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
