//! Vector Clock implementation for per-document causality tracking
//!
//! Used for causality queries (delta filtering on `subscribe`), not for
//! LWW conflict resolution — that's [`HybridStamp`](crate::clock::HybridStamp)'s job.
//! `VectorClock[c]` is the highest `seqAtOrigin` of any delta originating
//! at client `c` that this replica has applied.

use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Vector clock for tracking causality between operations
///
/// Serialises transparently as a plain `{clientId: seq}` JSON object so
/// the wire `subscribe` frame's `vectorClock` field doesn't need an extra
/// nesting level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    /// Map from ClientId to the highest seqAtOrigin applied for that client
    pub clocks: HashMap<ClientId, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock
    pub fn new() -> Self {
        Self {
            clocks: HashMap::new(),
        }
    }

    /// Get the clock value for a specific client (0 if unseen)
    pub fn get(&self, client_id: &str) -> u64 {
        *self.clocks.get(client_id).unwrap_or(&0)
    }

    /// Advance the clock for a client to `value`, taking the max of the
    /// current and new value (spec.md §3: "monotonically non-decreasing").
    pub fn advance(&mut self, client_id: &ClientId, value: u64) {
        let entry = self.clocks.entry(client_id.clone()).or_insert(0);
        *entry = (*entry).max(value);
    }

    /// Get all client clocks
    pub fn clocks(&self) -> &HashMap<ClientId, u64> {
        &self.clocks
    }

    /// Whether the clock has seen anything at all
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Merge with another vector clock (take max of each entry)
    pub fn merge(&mut self, other: &VectorClock) {
        for (client_id, &other_clock) in &other.clocks {
            self.advance(client_id, other_clock);
        }
    }

    /// Compare two vector clocks to determine happens-before relationship.
    ///
    /// Returns `Equal` both for identical clocks and for genuinely
    /// concurrent clocks (neither dominates); use [`is_concurrent`] to
    /// distinguish those two cases explicitly.
    pub fn compare(&self, other: &VectorClock) -> Ordering {
        let mut less = false;
        let mut greater = false;

        let all_clients: std::collections::HashSet<_> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        for client_id in all_clients {
            let self_clock = self.get(client_id);
            let other_clock = other.get(client_id);

            match self_clock.cmp(&other_clock) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }

        match (less, greater) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
            (true, true) => Ordering::Equal,
        }
    }

    /// Check if two vector clocks are concurrent (neither happened before the other)
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        let mut less = false;
        let mut greater = false;

        let all_clients: std::collections::HashSet<_> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        for client_id in all_clients {
            let self_clock = self.get(client_id);
            let other_clock = other.get(client_id);

            match self_clock.cmp(&other_clock) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }

        less && greater
    }

    /// Check if self happened before other (self < other)
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == Ordering::Less
    }
}

impl Default for VectorClock {
    fn default() -> Self {
        Self::new()
    }
}
