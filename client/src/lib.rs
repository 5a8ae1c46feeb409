//! Client-side facade for the SyncKit local-first sync engine: the
//! Offline Queue, the reconnecting WebSocket Transport, and the
//! [`SyncKit`] entry point tying both to one or more open [`Replica`](synckit_core::Replica)s.

pub mod config;
pub mod error;
pub mod queue;
pub mod replica_handle;
pub mod synckit;
pub mod transport;

pub use config::SyncConfig;
pub use error::{ClientError, Result, SyncEvent};
pub use queue::OfflineQueue;
pub use replica_handle::ReplicaHandle;
pub use synckit::SyncKit;
pub use transport::ConnectionState;
