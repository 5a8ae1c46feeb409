//! SyncKit Server Hub: the eventually-consistent relay and durable log
//! spec.md §2 describes — "the server acting as an eventually-consistent
//! relay and durable log, not an arbiter."
//!
//! This crate implements:
//! - the [`hub`] actor, one per document, that fans out deltas, answers
//!   `Subscribe` from its ring buffer (falling back to a full log scan),
//!   and never rejects a delta on causality grounds;
//! - the [`registry`] that lazily spawns and caches hubs;
//! - [`connection`], the per-WebSocket-connection state machine
//!   (spec.md §4.6);
//! - [`session`], server-side session bookkeeping and the rate limiter
//!   backing `RATE_LIMITED`;
//! - [`compaction`], the periodic tombstone/log GC sweep;
//! - [`app`], the axum router tying it all together.

pub mod app;
pub mod compaction;
pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod registry;
pub mod session;

pub use app::{build_router, AppState};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use hub::HubHandle;
pub use registry::HubRegistry;
