//! Hybrid logical clock for Last-Writer-Wins timestamp generation.
//!
//! Combines wall-clock physical time with a logical counter so that
//! timestamps are monotone even across clock skew, and ties are broken
//! deterministically by client id — this is what makes LWW converge
//! regardless of delivery order (spec.md §3, §4.2, §4.3).

use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default bound on how far a remote stamp's physical time may lead the
/// local wall clock before it gets clamped (spec.md §4.2 default: 5 min).
pub const DEFAULT_MAX_SKEW_MS: u64 = 5 * 60 * 1000;

/// A monotone total-order timestamp: `(physical, logical, client_id)`.
///
/// Field declaration order matters here — the derived `Ord`/`PartialOrd`
/// compare fields in order, which gives exactly the lexicographic triple
/// ordering spec.md §3 specifies, ties broken by `client_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct HybridStamp {
    pub physical_millis: u64,
    pub logical_counter: u32,
    pub client_id: ClientId,
}

impl HybridStamp {
    pub fn new(physical_millis: u64, logical_counter: u32, client_id: ClientId) -> Self {
        Self {
            physical_millis,
            logical_counter,
            client_id,
        }
    }
}

/// Generates and merges hybrid logical timestamps for one client.
///
/// One `HybridClock` is shared by a `SyncKit` instance across all of its
/// open replicas — physical/logical ordering is a process-wide concept,
/// not a per-document one (unlike the [`VectorClock`](crate::vector_clock::VectorClock),
/// which is genuinely per-document; see DESIGN.md for the rationale).
#[derive(Debug, Clone)]
pub struct HybridClock {
    client_id: ClientId,
    last_physical: u64,
    last_logical: u32,
    max_skew_ms: u64,
}

impl HybridClock {
    pub fn new(client_id: ClientId) -> Self {
        Self::with_max_skew(client_id, DEFAULT_MAX_SKEW_MS)
    }

    pub fn with_max_skew(client_id: ClientId, max_skew_ms: u64) -> Self {
        Self {
            client_id,
            last_physical: 0,
            last_logical: 0,
            max_skew_ms,
        }
    }

    fn wall_now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Generate the next monotone stamp, using the real wall clock.
    pub fn stamp(&mut self) -> HybridStamp {
        self.stamp_at(Self::wall_now_millis())
    }

    /// Generate the next monotone stamp as if the wall clock read `now`.
    ///
    /// Exposed so tests can simulate a backward clock jump without
    /// sleeping: `physical` is clamped to `max(now, last_physical)`, so a
    /// backward jump in `now` never regresses the returned stamp.
    pub fn stamp_at(&mut self, now: u64) -> HybridStamp {
        let physical = now.max(self.last_physical);
        let logical = if physical == self.last_physical {
            self.last_logical + 1
        } else {
            0
        };

        self.last_physical = physical;
        self.last_logical = logical;

        HybridStamp::new(physical, logical, self.client_id.clone())
    }

    /// Advance local clock state after observing a remote stamp, preserving
    /// causality without letting a misbehaving peer poison the local clock.
    ///
    /// If the remote's physical time leads the local wall clock by more
    /// than `max_skew_ms`, it is clamped to `wall_now + max_skew_ms` and a
    /// warning is logged (spec.md §4.2) rather than accepted outright.
    pub fn observe(&mut self, remote: &HybridStamp) {
        self.observe_at(remote, Self::wall_now_millis());
    }

    fn observe_at(&mut self, remote: &HybridStamp, now: u64) {
        let remote_physical = if remote.physical_millis > now.saturating_add(self.max_skew_ms) {
            tracing::warn!(
                remote_client = %remote.client_id,
                remote_physical = remote.physical_millis,
                local_now = now,
                max_skew_ms = self.max_skew_ms,
                "clamped remote hybrid stamp exceeding max clock skew"
            );
            now + self.max_skew_ms
        } else {
            remote.physical_millis
        };

        let physical = self.last_physical.max(remote_physical).max(now);

        let logical = if physical == self.last_physical && physical == remote_physical {
            self.last_logical.max(remote.logical_counter) + 1
        } else if physical == self.last_physical {
            self.last_logical + 1
        } else if physical == remote_physical {
            remote.logical_counter + 1
        } else {
            0
        };

        self.last_physical = physical;
        self.last_logical = logical;
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}
