//! Server configuration (spec.md §4.6, §6, §9 "Open questions").
//!
//! Every tunable the Server Hub needs is a field here rather than a bare
//! constant, matching the client's [`SyncConfig`](synckit_client equivalent)
//! approach to configuration — see DESIGN.md for the rationale shared
//! across both crates.

use std::time::Duration;

/// Tunables for one running server process. `Default` reproduces every
/// numeric default spec.md states explicitly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP/WebSocket listener to.
    pub bind_addr: String,
    /// Size limits on field names, values, and whole deltas (spec.md §6).
    pub limits: synckit_core::Limits,
    /// Per-document ring buffer size (spec.md §4.6, §9: "ring-buffer
    /// size vs. full-log-scan policy... this design picks
    /// ring-buffer-with-fallback-to-log").
    pub ring_buffer_size: usize,
    /// How often the compaction task runs (spec.md §4.6 default: 10 min).
    pub compaction_interval: Duration,
    /// Tombstone GC horizon (spec.md §4.1, §9: "treat the 7-day default
    /// as a configuration knob").
    pub tombstone_safety_window: Duration,
    /// Sessions untouched for longer than this are swept (spec.md §3
    /// Session lifecycle default: 24h).
    pub session_stale_after: Duration,
    /// A session with no frame at all for this long is closed (spec.md
    /// §4.6 per-session state machine: "heartbeat timeout (30s without
    /// any frame)").
    pub heartbeat_timeout: Duration,
    /// Token-bucket rate limit: publishes allowed per session per minute
    /// before `RATE_LIMITED` is returned (spec.md §6 names the error
    /// code; this expansion supplies the policy — see DESIGN.md).
    pub rate_limit_per_minute: u32,
    /// Upper bound on a full delta-log scan when the ring buffer can't
    /// satisfy a `Subscribe` (spec.md §4.6 fallback path).
    pub max_log_scan: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".to_string(),
            limits: synckit_core::Limits::default(),
            ring_buffer_size: 1000,
            compaction_interval: Duration::from_secs(10 * 60),
            tombstone_safety_window: Duration::from_secs(7 * 24 * 60 * 60),
            session_stale_after: Duration::from_secs(24 * 60 * 60),
            heartbeat_timeout: Duration::from_secs(30),
            rate_limit_per_minute: 200,
            max_log_scan: 100_000,
        }
    }
}
