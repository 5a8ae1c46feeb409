//! Offline Queue: a durable buffer of outbound deltas awaiting
//! acknowledgement, per spec.md §4.4.
//!
//! Keyed by the local `seqAtOrigin` counter (one sequence space per
//! client, shared across every document — see [`synckit_core::delta`]).
//! Persisted through [`StorageAdapter`] rather than an ad hoc file
//! format, so a restart before acknowledgement never loses a write.

use std::collections::VecDeque;
use std::sync::Arc;
use synckit_core::{ClientId, Delta, DocumentId, FieldName};
use synckit_storage::StorageAdapter;

use crate::error::{ClientError, Result, SyncEvent};

/// Append-only buffer of this client's own un-acked outbound deltas.
pub struct OfflineQueue {
    storage: Arc<dyn StorageAdapter>,
    client_id: ClientId,
    cap: usize,
    pending: VecDeque<Delta>,
}

impl OfflineQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>, client_id: ClientId, cap: usize) -> Self {
        Self {
            storage,
            client_id,
            cap,
            pending: VecDeque::new(),
        }
    }

    /// Rebuild in-memory queue state for one document from storage after a
    /// restart (spec.md §8 "client restart while queue has un-acked
    /// deltas"). Returns the highest `seqAtOrigin` found, so the caller can
    /// fast-forward [`DeltaEngine::restore_local_seq`](synckit_core::DeltaEngine::restore_local_seq)
    /// and never reissue a sequence number storage already recorded.
    pub async fn restore(&mut self, doc_id: &DocumentId) -> Result<u64> {
        let logged = self
            .storage
            .get_deltas(doc_id, self.cap)
            .await
            .map_err(ClientError::Core)?;

        let mut max_seq = 0;
        for stored in logged {
            if stored.delta.origin_client != self.client_id {
                continue;
            }
            max_seq = max_seq.max(stored.delta.seq_at_origin);
            if !self
                .pending
                .iter()
                .any(|d| d.seq_at_origin == stored.delta.seq_at_origin)
            {
                self.pending.push_back(stored.delta);
            }
        }
        self.resort();
        Ok(max_seq)
    }

    fn resort(&mut self) {
        let mut items: Vec<Delta> = self.pending.drain(..).collect();
        items.sort_by_key(|d| d.seq_at_origin);
        self.pending = items.into();
    }

    /// Append a locally-stamped delta. Tracked in memory regardless of
    /// whether the durable write succeeds, per spec.md §7's Storage
    /// category: a write already applied in memory must still enqueue (and
    /// so remain eligible for replay) even if the backend is degraded.
    /// Returns the persist error (if any) alongside whatever
    /// [`SyncEvent::QueueTruncated`] compaction produced, so the caller can
    /// surface a `storageDegraded` event instead of failing the write.
    pub async fn enqueue(&mut self, delta: Delta) -> (Option<SyncEvent>, Option<ClientError>) {
        let persist_err = self
            .storage
            .save_delta(delta.clone())
            .await
            .err()
            .map(ClientError::Core);
        self.pending.push_back(delta);

        if self.pending.len() <= self.cap {
            return (None, persist_err);
        }
        (self.compact(), persist_err)
    }

    /// Size-bound compaction (spec.md §4.4): collapse to the newest stamp
    /// per `(document, field)`, preserving convergence for the most recent
    /// intention of each field while bounding memory.
    fn compact(&mut self) -> Option<SyncEvent> {
        let mut newest: std::collections::HashMap<(DocumentId, FieldName), Delta> =
            std::collections::HashMap::new();
        for delta in self.pending.drain(..) {
            let key = (delta.document_id.clone(), delta.field_name.clone());
            match newest.get(&key) {
                Some(existing) if existing.stamp >= delta.stamp => {}
                _ => {
                    newest.insert(key, delta);
                }
            }
        }
        let mut items: Vec<Delta> = newest.into_values().collect();
        items.sort_by_key(|d| d.seq_at_origin);
        let truncated_event = items.last().map(|d| SyncEvent::QueueTruncated {
            document_id: d.document_id.clone(),
            field_name: d.field_name.clone(),
        });
        self.pending = items.into();
        truncated_event
    }

    /// Peek the oldest `n` pending deltas, in `seqAtOrigin` order.
    pub fn peek(&self, n: usize) -> Vec<Delta> {
        self.pending.iter().take(n).cloned().collect()
    }

    /// Drop every pending delta whose `seqAtOrigin` the server has
    /// acknowledged.
    pub fn ack(&mut self, up_to_seq: u64) {
        self.pending.retain(|d| d.seq_at_origin > up_to_seq);
    }

    /// Drain everything pending, in `seqAtOrigin` order, for replay onto a
    /// freshly (re)connected transport.
    pub fn replay(&mut self) -> Vec<Delta> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
