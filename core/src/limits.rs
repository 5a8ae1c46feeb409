//! Size limits enforced at the write boundary.
//!
//! The same [`Limits`] are used by the local write path (which must
//! reject oversize writes synchronously, before they ever reach the
//! Offline Queue) and by the server's `Publish` handler, so the check
//! only needs to live in one place: [`DeltaEngine`](crate::delta::DeltaEngine).

use serde::{Deserialize, Serialize};

/// Size caps on field names, field values, and whole deltas.
///
/// Defaults match spec.md §6: field names up to 1 KiB, values up to
/// 256 KiB, whole deltas up to 1 MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_field_name_bytes: usize,
    pub max_value_bytes: usize,
    pub max_delta_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_field_name_bytes: 1024,
            max_value_bytes: 256 * 1024,
            max_delta_bytes: 1024 * 1024,
        }
    }
}
