//! The Server Hub (spec.md §4.6): one actor task per document, owning
//! that document's authoritative state, its recent-delta ring buffer,
//! and its live subscriber set. Documents never share a task or a lock —
//! each [`HubActor`] is reached only through its [`HubHandle`]'s command
//! channel (spec.md §5: "the server hub may run multiple documents in
//! parallel on separate tasks").

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use synckit_core::document::{apply_delta, Diff};
use synckit_core::wire::{AckPayload, DeltaFrame, Frame, SubscribeCompletePayload};
use synckit_core::{ClientId, Delta, Document, DocumentId, SessionId, SyncError, VectorClock};
use synckit_storage::StorageAdapter;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

enum HubCommand {
    Subscribe {
        session_id: SessionId,
        peer_vector: VectorClock,
        outbound: mpsc::Sender<Frame>,
    },
    Publish {
        origin_session: SessionId,
        delta: Delta,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        session_id: SessionId,
    },
    Compact {
        cutoff_millis: u64,
    },
}

/// Cheap, cloneable handle onto a running [`HubActor`]. Every method is
/// an async round-trip through the actor's command channel; there is no
/// lock to take because the document only ever lives inside the actor
/// task.
#[derive(Clone)]
pub struct HubHandle {
    document_id: DocumentId,
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Stream the causal gap between `peer_vector` and this document's
    /// state to `outbound`, followed by `subscribeComplete` (spec.md
    /// §4.6 "On Subscribe").
    pub async fn subscribe(
        &self,
        session_id: SessionId,
        peer_vector: VectorClock,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<()> {
        self.cmd_tx
            .send(HubCommand::Subscribe {
                session_id,
                peer_vector,
                outbound,
            })
            .await
            .map_err(|_| ServerError::HubGone(self.document_id.clone()))
    }

    /// Persist and fan out one inbound delta (spec.md §4.6 "On inbound
    /// Publish"). Never rejects on causality grounds — only the oversize
    /// check (performed by the caller before this is invoked) can refuse
    /// a publish.
    pub async fn publish(&self, origin_session: SessionId, delta: Delta) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Publish {
                origin_session,
                delta,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServerError::HubGone(self.document_id.clone()))?;
        reply_rx.await.map_err(|_| ServerError::HubGone(self.document_id.clone()))?
    }

    pub async fn unsubscribe(&self, session_id: SessionId) {
        let _ = self.cmd_tx.send(HubCommand::Unsubscribe { session_id }).await;
    }

    /// Drive one compaction pass (spec.md §4.6 "Compaction").
    pub async fn compact(&self, cutoff_millis: u64) {
        let _ = self.cmd_tx.send(HubCommand::Compact { cutoff_millis }).await;
    }
}

struct HubActor {
    document_id: DocumentId,
    storage: Arc<dyn StorageAdapter>,
    document: Document,
    ring: VecDeque<Delta>,
    ring_cap: usize,
    max_log_scan: usize,
    subscribers: HashMap<SessionId, mpsc::Sender<Frame>>,
}

/// Hydrate a document's hub from storage and spawn its actor task.
/// Lazy: only called the first time any session touches a given
/// document (spec.md §3 Replica lifecycle: "created lazily on first
/// read/write").
pub async fn spawn_hub(
    document_id: DocumentId,
    storage: Arc<dyn StorageAdapter>,
    config: &ServerConfig,
) -> Result<HubHandle> {
    let stored = storage
        .get_document(&document_id)
        .await
        .map_err(|e| ServerError::Storage(e.to_string()))?;
    let document = stored
        .map(|s| s.document)
        .unwrap_or_else(|| Document::new(document_id.clone()));

    let seed = storage
        .get_deltas(&document_id, config.ring_buffer_size)
        .await
        .map_err(|e| ServerError::Storage(e.to_string()))?;
    let ring: VecDeque<Delta> = seed.into_iter().map(|s| s.delta).collect();

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let actor = HubActor {
        document_id: document_id.clone(),
        storage,
        document,
        ring,
        ring_cap: config.ring_buffer_size,
        max_log_scan: config.max_log_scan,
        subscribers: HashMap::new(),
    };
    tokio::spawn(actor.run(cmd_rx));

    Ok(HubHandle { document_id, cmd_tx })
}

impl HubActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<HubCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                HubCommand::Subscribe {
                    session_id,
                    peer_vector,
                    outbound,
                } => self.handle_subscribe(session_id, peer_vector, outbound).await,
                HubCommand::Publish {
                    origin_session,
                    delta,
                    reply,
                } => {
                    let result = self.handle_publish(origin_session, delta).await;
                    let _ = reply.send(result);
                }
                HubCommand::Unsubscribe { session_id } => {
                    self.subscribers.remove(&session_id);
                }
                HubCommand::Compact { cutoff_millis } => self.handle_compact(cutoff_millis).await,
            }
        }
        tracing::debug!(document_id = %self.document_id, "hub actor shutting down, no handles remain");
    }

    async fn handle_subscribe(&mut self, session_id: SessionId, peer_vector: VectorClock, outbound: mpsc::Sender<Frame>) {
        tracing::debug!(document_id = %self.document_id, session_id = %session_id, "subscribe");
        self.subscribers.insert(session_id.clone(), outbound.clone());

        let missing = self.compute_missing(&peer_vector).await;
        for delta in &missing {
            if outbound.send(Frame::Delta(DeltaFrame::from(delta))).await.is_err() {
                return;
            }
        }
        let _ = outbound
            .send(Frame::SubscribeComplete(SubscribeCompletePayload {
                document_id: self.document_id.clone(),
            }))
            .await;
    }

    /// Whether the ring buffer's oldest retained delta per origin client
    /// is recent enough to serve `peer_vector` without a gap (spec.md §9
    /// "ring-buffer-with-fallback-to-log").
    fn ring_has_gap(&self, peer_vector: &VectorClock) -> bool {
        let mut oldest_seq_per_origin: HashMap<&ClientId, u64> = HashMap::new();
        for delta in &self.ring {
            oldest_seq_per_origin
                .entry(&delta.origin_client)
                .and_modify(|seq| *seq = (*seq).min(delta.seq_at_origin))
                .or_insert(delta.seq_at_origin);
        }
        oldest_seq_per_origin
            .into_iter()
            .any(|(origin, oldest_seq)| peer_vector.get(origin) < oldest_seq.saturating_sub(1))
    }

    async fn compute_missing(&self, peer_vector: &VectorClock) -> Vec<Delta> {
        if self.ring_has_gap(peer_vector) {
            tracing::debug!(document_id = %self.document_id, "ring buffer insufficient, falling back to full log scan");
            match self.storage.get_deltas(&self.document_id, self.max_log_scan).await {
                Ok(stored) => stored
                    .into_iter()
                    .map(|s| s.delta)
                    .filter(|d| d.seq_at_origin > peer_vector.get(&d.origin_client))
                    .collect(),
                Err(e) => {
                    tracing::error!(document_id = %self.document_id, error = %e, "full log scan failed");
                    Vec::new()
                }
            }
        } else {
            self.ring
                .iter()
                .filter(|d| d.seq_at_origin > peer_vector.get(&d.origin_client))
                .cloned()
                .collect()
        }
    }

    async fn handle_publish(&mut self, origin_session: SessionId, delta: Delta) -> Result<()> {
        if delta.document_id != self.document_id {
            return Err(ServerError::Core(SyncError::Protocol(format!(
                "delta for document {} published to hub for {}",
                delta.document_id, self.document_id
            ))));
        }

        // Dedup (spec.md §4.4): a delta whose seq_at_origin this hub has
        // already advanced past is a retried redelivery, not a new write —
        // skip persisting and fan-out, but still ack it so the client can
        // retire it from its offline queue.
        let already_seen = delta.seq_at_origin <= self.document.vector().get(&delta.origin_client);

        let mut diff = Diff::default();
        apply_delta(&mut self.document, &delta, &mut diff);

        if !already_seen {
            self.storage
                .save_delta(delta.clone())
                .await
                .map_err(|e| ServerError::Storage(e.to_string()))?;
            if let Err(e) = self.storage.update_document(&self.document_id, self.document.clone()).await {
                tracing::warn!(document_id = %self.document_id, error = %e, "failed to persist document snapshot after publish");
            }
            if let Err(e) = self
                .storage
                .update_vector_clock(&self.document_id, &delta.origin_client, delta.seq_at_origin)
                .await
            {
                tracing::warn!(document_id = %self.document_id, error = %e, "failed to persist vector clock after publish");
            }
            self.push_ring(delta.clone());
        }

        if let Some(sender) = self.subscribers.get(&origin_session) {
            let _ = sender
                .send(Frame::Ack(AckPayload {
                    origin_client: delta.origin_client.clone(),
                    seq_at_origin: delta.seq_at_origin,
                }))
                .await;
        }

        if !already_seen {
            for (session_id, sender) in self.subscribers.iter() {
                if session_id == &origin_session {
                    continue;
                }
                let _ = sender.send(Frame::Delta(DeltaFrame::from(&delta))).await;
            }
        }

        Ok(())
    }

    fn push_ring(&mut self, delta: Delta) {
        self.ring.push_back(delta);
        while self.ring.len() > self.ring_cap {
            self.ring.pop_front();
        }
    }

    /// Tombstone GC and ring trimming (spec.md §4.1 tombstone policy,
    /// §4.6 "coalesces snapshot rewrites"). `cutoff_millis` is computed
    /// by the compaction task from `ServerConfig::tombstone_safety_window`
    /// (see DESIGN.md for why this hub doesn't compute it itself).
    async fn handle_compact(&mut self, cutoff_millis: u64) {
        let before = self.document.fields.len();
        self.document.gc_tombstones(cutoff_millis);
        if self.document.fields.len() != before {
            match self.storage.update_document(&self.document_id, self.document.clone()).await {
                Ok(_) => tracing::debug!(
                    document_id = %self.document_id,
                    dropped = before - self.document.fields.len(),
                    "tombstone compaction pass rewrote snapshot"
                ),
                Err(e) => tracing::warn!(document_id = %self.document_id, error = %e, "compaction snapshot rewrite failed"),
            }
        }

        while self
            .ring
            .front()
            .map(|d| d.stamp.physical_millis < cutoff_millis)
            .unwrap_or(false)
        {
            self.ring.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synckit_core::{DeltaEngine, Limits};
    use synckit_storage::InMemoryStorage;

    fn config() -> ServerConfig {
        ServerConfig {
            ring_buffer_size: 3,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn subscribe_with_empty_vector_clock_gets_full_history_then_complete() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let handle = spawn_hub("doc".to_string(), storage, &config()).await.unwrap();

        let mut engine = DeltaEngine::new("A".to_string(), Limits::default());
        let d1 = engine.stamp_set("doc".to_string(), "a".to_string(), json!(1)).unwrap();
        handle.publish("s-a".to_string(), d1).await.unwrap();

        let (out_tx, mut out_rx) = mpsc::channel(16);
        handle
            .subscribe("s-b".to_string(), VectorClock::new(), out_tx)
            .await
            .unwrap();

        let first = out_rx.recv().await.unwrap();
        assert!(matches!(first, Frame::Delta(_)));
        let second = out_rx.recv().await.unwrap();
        assert!(matches!(second, Frame::SubscribeComplete(_)));
    }

    #[tokio::test]
    async fn publish_fans_out_to_other_subscribers_but_not_origin() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let handle = spawn_hub("doc".to_string(), storage, &config()).await.unwrap();

        let (a_tx, mut a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        handle.subscribe("s-a".to_string(), VectorClock::new(), a_tx).await.unwrap();
        handle.subscribe("s-b".to_string(), VectorClock::new(), b_tx).await.unwrap();
        // Drain the two SubscribeComplete frames from the empty-history subscribes.
        assert!(matches!(a_rx.recv().await.unwrap(), Frame::SubscribeComplete(_)));
        assert!(matches!(b_rx.recv().await.unwrap(), Frame::SubscribeComplete(_)));

        let mut engine = DeltaEngine::new("A".to_string(), Limits::default());
        let d1 = engine.stamp_set("doc".to_string(), "a".to_string(), json!(1)).unwrap();
        handle.publish("s-a".to_string(), d1).await.unwrap();

        // Origin gets only the Ack.
        assert!(matches!(a_rx.recv().await.unwrap(), Frame::Ack(_)));
        // The other subscriber gets the Delta, not an Ack.
        assert!(matches!(b_rx.recv().await.unwrap(), Frame::Delta(_)));
    }

    #[tokio::test]
    async fn retried_publish_is_acked_but_not_double_persisted_or_fanned_out() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let handle = spawn_hub("doc".to_string(), storage.clone(), &config()).await.unwrap();

        let (a_tx, mut a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        handle.subscribe("s-a".to_string(), VectorClock::new(), a_tx).await.unwrap();
        handle.subscribe("s-b".to_string(), VectorClock::new(), b_tx).await.unwrap();
        assert!(matches!(a_rx.recv().await.unwrap(), Frame::SubscribeComplete(_)));
        assert!(matches!(b_rx.recv().await.unwrap(), Frame::SubscribeComplete(_)));

        let mut engine = DeltaEngine::new("A".to_string(), Limits::default());
        let d1 = engine.stamp_set("doc".to_string(), "a".to_string(), json!(1)).unwrap();

        handle.publish("s-a".to_string(), d1.clone()).await.unwrap();
        assert!(matches!(a_rx.recv().await.unwrap(), Frame::Ack(_)));
        assert!(matches!(b_rx.recv().await.unwrap(), Frame::Delta(_)));

        // Client retries the same delta (e.g. its ack was lost in transit).
        handle.publish("s-a".to_string(), d1).await.unwrap();
        assert!(matches!(a_rx.recv().await.unwrap(), Frame::Ack(_)));
        assert!(b_rx.try_recv().is_err(), "duplicate publish must not be re-fanned-out");

        let logged = storage.get_deltas(&"doc".to_string(), 10).await.unwrap();
        assert_eq!(logged.len(), 1, "duplicate publish must not be logged twice");
    }

    #[tokio::test]
    async fn ring_buffer_eviction_triggers_full_log_scan_fallback() {
        // ring_buffer_size is 3, so 5 sets to different fields evict the first two.
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let handle = spawn_hub("doc".to_string(), storage, &config()).await.unwrap();

        let mut engine = DeltaEngine::new("A".to_string(), Limits::default());
        for i in 0..5 {
            let d = engine
                .stamp_set("doc".to_string(), format!("f{i}"), json!(i))
                .unwrap();
            handle.publish(format!("writer-{i}"), d).await.unwrap();
        }

        // A peer that has seen nothing needs all 5, even though only the
        // last 3 remain in the ring buffer.
        let (out_tx, mut out_rx) = mpsc::channel(16);
        handle.subscribe("late-joiner".to_string(), VectorClock::new(), out_tx).await.unwrap();

        let mut delta_count = 0;
        loop {
            match out_rx.recv().await.unwrap() {
                Frame::Delta(_) => delta_count += 1,
                Frame::SubscribeComplete(_) => break,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(delta_count, 5);
    }

    #[tokio::test]
    async fn compaction_drops_old_tombstones_but_keeps_recent_ones() {
        let storage: Arc<dyn StorageAdapter> = Arc::new(InMemoryStorage::new());
        let handle = spawn_hub("doc".to_string(), storage.clone(), &config()).await.unwrap();

        let mut engine = DeltaEngine::new("A".to_string(), Limits::default());
        let set_old = engine.stamp_set("doc".to_string(), "old".to_string(), json!("v")).unwrap();
        handle.publish("s-a".to_string(), set_old).await.unwrap();

        let del_old = synckit_core::Delta {
            document_id: "doc".to_string(),
            field_name: "old".to_string(),
            op: synckit_core::Op::Delete,
            stamp: synckit_core::HybridStamp::new(100, 0, "A".to_string()),
            origin_client: "A".to_string(),
            seq_at_origin: 2,
        };
        handle.publish("s-a".to_string(), del_old).await.unwrap();

        let set_new = engine.stamp_set("doc".to_string(), "new".to_string(), json!("v")).unwrap();
        handle.publish("s-a".to_string(), set_new).await.unwrap();
        let del_new = synckit_core::Delta {
            document_id: "doc".to_string(),
            field_name: "new".to_string(),
            op: synckit_core::Op::Delete,
            stamp: synckit_core::HybridStamp::new(10_000_000, 0, "A".to_string()),
            origin_client: "A".to_string(),
            seq_at_origin: 4,
        };
        handle.publish("s-a".to_string(), del_new).await.unwrap();

        handle.compact(5_000).await;
        // Give the actor a tick to process the compact command.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let stored = storage.get_document(&"doc".to_string()).await.unwrap().unwrap();
        assert!(!stored.document.fields.contains_key("old"));
        assert!(stored.document.fields.contains_key("new"));
    }
}
