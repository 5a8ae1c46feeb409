//! Session bookkeeping (spec.md §3 glossary "Session", §4.6 per-session
//! state machine) and the token-bucket rate limiter that backs the
//! `RATE_LIMITED` wire error code (spec.md §6 names the code; this
//! expansion supplies the policy — see DESIGN.md).

use std::time::{Duration, Instant};

use synckit_core::{ClientId, SessionId};
use synckit_storage::{Session, StorageAdapter};

use crate::error::{Result, ServerError};

/// Per-session connection state machine (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Subscribed,
    Publishing,
    Receiving,
    Closed,
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Creates and persists a [`Session`] row on handshake (spec.md §3
/// "created on WebSocket handshake").
pub async fn open_session(
    storage: &dyn StorageAdapter,
    client_id: ClientId,
    user_id: Option<String>,
) -> Result<Session> {
    let now = now_millis();
    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        client_id,
        user_id,
        connected_at_millis: now,
        last_seen_millis: now,
    };
    storage
        .save_session(session.clone())
        .await
        .map_err(|e| ServerError::Storage(e.to_string()))?;
    Ok(session)
}

/// Updates `last_seen_millis` on the session row (spec.md §3 "updated by
/// heartbeat"). Called on every inbound frame, not just heartbeat pings,
/// since any frame proves liveness.
pub async fn touch_session(storage: &dyn StorageAdapter, session: &mut Session) -> Result<()> {
    session.last_seen_millis = now_millis();
    storage
        .update_session(session.clone())
        .await
        .map_err(|e| ServerError::Storage(e.to_string()))
}

/// Removes the session row on clean disconnect (spec.md §3 "destroyed on
/// clean disconnect or staleness sweep").
pub async fn close_session(storage: &dyn StorageAdapter, session_id: &SessionId) -> Result<()> {
    storage
        .delete_session(session_id)
        .await
        .map_err(|e| ServerError::Storage(e.to_string()))
}

/// A per-session token bucket: `capacity` tokens, refilled continuously
/// at `capacity` per minute. `try_acquire` is the only operation the
/// connection loop needs — it either takes one token or reports how
/// long until the next one is available.
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    refill_per_ms: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_ms: capacity / 60_000.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        self.last_refill = Instant::now();
        self.tokens = (self.tokens + elapsed.as_millis() as f64 * self.refill_per_ms).min(self.capacity);
    }

    /// Takes one token if available; otherwise returns the wait time
    /// until one will be.
    pub fn try_acquire(&mut self) -> std::result::Result<(), Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_millis((deficit / self.refill_per_ms).ceil() as u64))
        }
    }
}
