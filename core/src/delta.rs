//! Delta Engine: stamps, serialises, applies, and filters field-level
//! deltas (spec.md §4.3).
//!
//! A `Delta` is the unit of replication: one field-level mutation with
//! causal metadata. `seqAtOrigin` is a single monotonic counter per
//! client, shared across every document that client writes to — the
//! Offline Queue is one queue per client, not one per document, so a
//! single sequence space is what lets it dedupe replayed entries
//! regardless of which document they target (see DESIGN.md).

use crate::clock::{HybridClock, HybridStamp};
use crate::document::{apply_delta, ApplyOutcome, Diff, Document};
use crate::error::{Result, SyncError};
use crate::ids::{ClientId, DocumentId, FieldName};
use crate::limits::Limits;
use crate::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The operation a delta carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Set(JsonValue),
    Delete,
}

/// A single field-level mutation with causal metadata (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub document_id: DocumentId,
    pub field_name: FieldName,
    pub op: Op,
    pub stamp: HybridStamp,
    pub origin_client: ClientId,
    pub seq_at_origin: u64,
}

impl Delta {
    /// Serialised size in bytes, used against `Limits::max_delta_bytes`.
    pub fn wire_size(&self) -> Result<usize> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| SyncError::SerializationError(e.to_string()))
    }
}

/// Stamps local mutations, applies remote ones, and filters outbound
/// batches against a peer's vector clock.
///
/// One `DeltaEngine` per client process; it owns the [`HybridClock`] and
/// the local `seqAtOrigin` counter for every document that client
/// touches.
pub struct DeltaEngine {
    client_id: ClientId,
    clock: HybridClock,
    limits: Limits,
    local_seq: u64,
}

impl DeltaEngine {
    pub fn new(client_id: ClientId, limits: Limits) -> Self {
        Self::with_max_skew(client_id, limits, crate::clock::DEFAULT_MAX_SKEW_MS)
    }

    /// Like [`new`](DeltaEngine::new), but with a caller-supplied `maxSkew`
    /// (spec.md §4.2, configurable via `SyncConfig::max_skew_ms` on the
    /// client) instead of the clock's built-in default.
    pub fn with_max_skew(client_id: ClientId, limits: Limits, max_skew_ms: u64) -> Self {
        let clock = HybridClock::with_max_skew(client_id.clone(), max_skew_ms);
        Self {
            client_id,
            clock,
            limits,
            local_seq: 0,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Restore the local sequence counter after a restart (spec.md §8
    /// "client restart while queue has un-acked deltas"): the counter
    /// must never regress below what storage already recorded, or the
    /// dedup key `(originClient, seqAtOrigin)` could repeat.
    pub fn restore_local_seq(&mut self, seq: u64) {
        self.local_seq = self.local_seq.max(seq);
    }

    fn next_seq(&mut self) -> u64 {
        self.local_seq += 1;
        self.local_seq
    }

    fn check_limits(&self, field_name: &str, value: Option<&JsonValue>) -> Result<()> {
        if field_name.len() > self.limits.max_field_name_bytes {
            return Err(SyncError::Oversize {
                field: field_name.to_string(),
                actual: field_name.len(),
                limit: self.limits.max_field_name_bytes,
            });
        }
        if let Some(v) = value {
            let size = serde_json::to_vec(v)
                .map_err(|e| SyncError::SerializationError(e.to_string()))?
                .len();
            if size > self.limits.max_value_bytes {
                return Err(SyncError::Oversize {
                    field: field_name.to_string(),
                    actual: size,
                    limit: self.limits.max_value_bytes,
                });
            }
        }
        Ok(())
    }

    fn finish(&self, delta: Delta) -> Result<Delta> {
        let size = delta.wire_size()?;
        if size > self.limits.max_delta_bytes {
            return Err(SyncError::Oversize {
                field: delta.field_name.clone(),
                actual: size,
                limit: self.limits.max_delta_bytes,
            });
        }
        Ok(delta)
    }

    /// Stamp a local `set` write (spec.md §4.1 `set(field, value)`).
    /// Returns synchronously-checkable `SyncError::Oversize` without
    /// mutating any sequence state, so a caller can reject the write
    /// before it ever reaches the Offline Queue (spec.md §7.3).
    pub fn stamp_set(
        &mut self,
        document_id: DocumentId,
        field_name: FieldName,
        value: JsonValue,
    ) -> Result<Delta> {
        self.check_limits(&field_name, Some(&value))?;
        let stamp = self.clock.stamp();
        let seq = self.next_seq();
        self.finish(Delta {
            document_id,
            field_name,
            op: Op::Set(value),
            stamp,
            origin_client: self.client_id.clone(),
            seq_at_origin: seq,
        })
    }

    /// Stamp a local `delete` write (spec.md §4.1 `delete(field)`).
    pub fn stamp_delete(&mut self, document_id: DocumentId, field_name: FieldName) -> Result<Delta> {
        self.check_limits(&field_name, None)?;
        let stamp = self.clock.stamp();
        let seq = self.next_seq();
        self.finish(Delta {
            document_id,
            field_name,
            op: Op::Delete,
            stamp,
            origin_client: self.client_id.clone(),
            seq_at_origin: seq,
        })
    }

    /// Apply a remote delta to `doc`, first observing its stamp so the
    /// local hybrid clock stays causally consistent (spec.md §4.2).
    pub fn apply_remote(&mut self, doc: &mut Document, delta: &Delta) -> (ApplyOutcome, Diff) {
        self.clock.observe(&delta.stamp);
        let mut diff = Diff::default();
        let outcome = apply_delta(doc, delta, &mut diff);
        (outcome, diff)
    }

    /// Observe a remote stamp without applying anything, for callers that
    /// apply through a [`Replica`](crate::document::Replica) (which
    /// notifies observers) rather than through [`apply_remote`](DeltaEngine::apply_remote)
    /// directly on a [`Document`].
    pub fn observe(&mut self, stamp: &HybridStamp) {
        self.clock.observe(stamp);
    }

    /// Filter a batch of deltas down to only those `peer_vector` has not
    /// yet seen (spec.md §4.3 (d)).
    pub fn filter_for_peer<'a>(&self, deltas: &'a [Delta], peer_vector: &VectorClock) -> Vec<&'a Delta> {
        deltas
            .iter()
            .filter(|d| d.seq_at_origin > peer_vector.get(&d.origin_client))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use serde_json::json;

    #[test]
    fn stamp_set_and_delete_advance_local_seq_monotonically() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let d1 = engine
            .stamp_set("doc".to_string(), "a".to_string(), json!(1))
            .unwrap();
        let d2 = engine.stamp_delete("doc".to_string(), "a".to_string()).unwrap();
        assert_eq!(d1.seq_at_origin, 1);
        assert_eq!(d2.seq_at_origin, 2);
    }

    #[test]
    fn oversize_field_name_rejected_before_sequencing() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let huge_name = "x".repeat(2000);
        let err = engine
            .stamp_set("doc".to_string(), huge_name, json!(1))
            .unwrap_err();
        assert_eq!(err.code(), "OVERSIZE");
        // Local sequence must not have advanced on a rejected write.
        let d = engine
            .stamp_set("doc".to_string(), "ok".to_string(), json!(1))
            .unwrap();
        assert_eq!(d.seq_at_origin, 1);
    }

    #[test]
    fn oversize_value_rejected() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let huge_value = json!("x".repeat(300_000));
        let err = engine
            .stamp_set("doc".to_string(), "f".to_string(), huge_value)
            .unwrap_err();
        assert_eq!(err.code(), "OVERSIZE");
    }

    #[test]
    fn value_exactly_at_limit_is_accepted() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        // Account for JSON quoting overhead so the *value* payload lands
        // right at the 256 KiB boundary.
        let payload = "x".repeat(256 * 1024 - 2);
        let value = json!(payload);
        assert_eq!(serde_json::to_vec(&value).unwrap().len(), 256 * 1024);
        let result = engine.stamp_set("doc".to_string(), "f".to_string(), value);
        assert!(result.is_ok());
    }

    #[test]
    fn value_one_byte_over_limit_is_rejected() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let payload = "x".repeat(256 * 1024 - 1);
        let value = json!(payload);
        assert_eq!(serde_json::to_vec(&value).unwrap().len(), 256 * 1024 + 1);
        let err = engine
            .stamp_set("doc".to_string(), "f".to_string(), value)
            .unwrap_err();
        assert_eq!(err.code(), "OVERSIZE");
    }

    #[test]
    fn filter_for_peer_only_returns_unseen_deltas() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let d1 = engine
            .stamp_set("doc".to_string(), "a".to_string(), json!(1))
            .unwrap();
        let d2 = engine
            .stamp_set("doc".to_string(), "b".to_string(), json!(2))
            .unwrap();
        let all = vec![d1, d2];

        let mut peer_vector = VectorClock::new();
        peer_vector.advance(&"c1".to_string(), 1);

        let filtered = engine.filter_for_peer(&all, &peer_vector);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].seq_at_origin, 2);
    }

    #[test]
    fn apply_remote_observes_clock_and_applies() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        let mut remote_engine = DeltaEngine::new("c2".to_string(), Limits::default());
        let mut doc = Document::new("doc".to_string());

        let remote_delta = remote_engine
            .stamp_set("doc".to_string(), "x".to_string(), json!("remote"))
            .unwrap();

        let (outcome, diff) = engine.apply_remote(&mut doc, &remote_delta);
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(diff.added.get("x"), Some(&json!("remote")));
        assert_eq!(doc.get("x"), Some(&json!("remote")));
    }

    #[test]
    fn restore_local_seq_never_regresses() {
        let mut engine = DeltaEngine::new("c1".to_string(), Limits::default());
        engine.restore_local_seq(50);
        let d = engine
            .stamp_set("doc".to_string(), "a".to_string(), json!(1))
            .unwrap();
        assert_eq!(d.seq_at_origin, 51);

        // A lower restore point is a no-op.
        engine.restore_local_seq(10);
        let d2 = engine
            .stamp_set("doc".to_string(), "b".to_string(), json!(1))
            .unwrap();
        assert_eq!(d2.seq_at_origin, 52);
    }
}
