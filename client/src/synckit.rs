//! `SyncKit`: the public entry point wiring Replica + Offline Queue +
//! Transport together per [`SyncConfig`] (spec.md §2, §5).
//!
//! Concurrency model (spec.md §5): one logical owner per `SyncKit`
//! instance for the Delta Engine and every open [`Replica`] — reached
//! here through `Arc<Mutex<..>>` shared with the background transport
//! dispatch task rather than a hand-rolled actor mailbox, since the
//! locks are only ever held for the duration of a synchronous apply/stamp
//! call, never across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use synckit_core::wire::{DeltaFrame, Frame, SubscribePayload};
use synckit_core::{ClientId, Delta, DeltaEngine, Document, DocumentId, FieldName, Replica};
use synckit_storage::StorageAdapter;

use crate::config::SyncConfig;
use crate::error::{ClientError, Result, SyncEvent};
use crate::queue::OfflineQueue;
use crate::replica_handle::ReplicaHandle;
use crate::transport::{self, ConnectionState};

/// Facade over a local-first synchronized document store. One instance
/// owns one client identity, one offline queue, and every [`Replica`]
/// the embedding application has opened.
pub struct SyncKit {
    config: SyncConfig,
    client_id: ClientId,
    engine: Arc<Mutex<DeltaEngine>>,
    replicas: Arc<Mutex<HashMap<DocumentId, Arc<Mutex<Replica>>>>>,
    queue: Arc<tokio::sync::Mutex<OfflineQueue>>,
    storage: Arc<dyn StorageAdapter>,
    outgoing: Mutex<Option<mpsc::Sender<Frame>>>,
    conn_state: Mutex<Option<tokio::sync::watch::Receiver<ConnectionState>>>,
    /// Forces the current transport connection to drop and reconnect; used
    /// by the per-document Subscribe soft timeout (spec.md §5).
    force_reconnect: Mutex<Option<mpsc::Sender<()>>>,
    pending_subscribes: Arc<Mutex<HashSet<DocumentId>>>,
    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<SyncEvent>>>,
}

impl SyncKit {
    pub fn new(config: SyncConfig) -> Self {
        let client_id = config.client_id.clone();
        let limits = config.limits();
        let engine = DeltaEngine::with_max_skew(client_id.clone(), limits, config.max_skew_ms);
        let storage = config.storage.clone();
        let queue = OfflineQueue::new(storage.clone(), client_id.clone(), config.queue_cap);
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            config,
            client_id,
            engine: Arc::new(Mutex::new(engine)),
            replicas: Arc::new(Mutex::new(HashMap::new())),
            queue: Arc::new(tokio::sync::Mutex::new(queue)),
            storage,
            outgoing: Mutex::new(None),
            conn_state: Mutex::new(None),
            force_reconnect: Mutex::new(None),
            pending_subscribes: Arc::new(Mutex::new(HashSet::new())),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Take the event receiver for `storageDegraded` / `storageError` /
    /// `connectionStatus` / `queueTruncated` notifications (spec.md §7).
    /// Callable once; later calls return `None`.
    pub fn take_events(&self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.lock().unwrap().take()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.conn_state
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Open (or fetch the already-open) replica for `document_id`,
    /// restoring its persisted snapshot and any un-acked queue entries
    /// from a prior session (spec.md §8 "restart with un-acked deltas").
    pub async fn open_document(&self, document_id: &DocumentId) -> Result<ReplicaHandle> {
        if let Some(existing) = self.replicas.lock().unwrap().get(document_id) {
            return Ok(ReplicaHandle::new(document_id.clone(), existing.clone()));
        }

        let stored = self.storage.get_document(document_id).await.map_err(ClientError::Core)?;
        let replica = match stored {
            Some(stored_doc) => Replica::from_document(stored_doc.document),
            None => Replica::new(document_id.clone()),
        };

        let max_seq = {
            let mut queue = self.queue.lock().await;
            queue.restore(document_id).await?
        };
        self.engine.lock().unwrap().restore_local_seq(max_seq);

        let vector = replica.vector().clone();
        let replica = Arc::new(Mutex::new(replica));
        self.replicas
            .lock()
            .unwrap()
            .insert(document_id.clone(), replica.clone());

        if let Some(outgoing) = self.outgoing.lock().unwrap().clone() {
            self.pending_subscribes.lock().unwrap().insert(document_id.clone());
            let frame = Frame::Subscribe(SubscribePayload {
                document_id: document_id.clone(),
                vector_clock: vector,
            });
            let _ = outgoing.send(frame).await;
            if let Some(force_reconnect) = self.force_reconnect.lock().unwrap().clone() {
                spawn_subscribe_timeout(
                    document_id.clone(),
                    self.pending_subscribes.clone(),
                    force_reconnect,
                    self.config.subscribe_timeout_ms,
                );
            }
        }

        Ok(ReplicaHandle::new(document_id.clone(), replica))
    }

    /// Stamp and apply a local `set(field, value)` (spec.md §4.1).
    pub async fn set(&self, document_id: &DocumentId, field: impl Into<FieldName>, value: JsonValue) -> Result<()> {
        self.open_document(document_id).await?;
        let delta = {
            let mut engine = self.engine.lock().unwrap();
            engine.stamp_set(document_id.clone(), field.into(), value)?
        };
        self.apply_and_dispatch(delta).await
    }

    /// Stamp and apply a local `delete(field)` (spec.md §4.1).
    pub async fn delete(&self, document_id: &DocumentId, field: impl Into<FieldName>) -> Result<()> {
        self.open_document(document_id).await?;
        let delta = {
            let mut engine = self.engine.lock().unwrap();
            engine.stamp_delete(document_id.clone(), field.into())?
        };
        self.apply_and_dispatch(delta).await
    }

    async fn apply_and_dispatch(&self, delta: Delta) -> Result<()> {
        {
            let replicas = self.replicas.lock().unwrap();
            if let Some(replica) = replicas.get(&delta.document_id) {
                replica.lock().unwrap().apply_one(&delta);
            }
        }

        let (truncated, persist_err) = {
            let mut queue = self.queue.lock().await;
            queue.enqueue(delta.clone()).await
        };
        if let Some(e) = persist_err {
            let _ = self
                .event_tx
                .send(SyncEvent::StorageDegraded { reason: e.to_string() })
                .await;
        }
        if let Some(event) = truncated {
            let _ = self.event_tx.send(event).await;
        }

        if let Err(e) = self
            .storage
            .update_document(&delta.document_id, self.document_snapshot(&delta.document_id))
            .await
        {
            let _ = self
                .event_tx
                .send(SyncEvent::StorageDegraded { reason: e.to_string() })
                .await;
        }

        let outgoing = self.outgoing.lock().unwrap().clone();
        if let Some(outgoing) = outgoing {
            let frame = Frame::Delta(DeltaFrame::from(&delta));
            let _ = outgoing.send(frame).await;
        }
        Ok(())
    }

    fn document_snapshot(&self, document_id: &DocumentId) -> Document {
        let replicas = self.replicas.lock().unwrap();
        replicas
            .get(document_id)
            .map(|r| r.lock().unwrap().document().clone())
            .unwrap_or_else(|| Document::new(document_id.clone()))
    }

    /// Connect to `config.server_url` and begin syncing (spec.md §4.5).
    /// Errors with [`ClientError::LocalOnly`] if no server URL was
    /// configured; the client still fully functions for local reads and
    /// writes in that mode.
    pub async fn connect(&self) -> Result<()> {
        let url = self.config.server_url.clone().ok_or(ClientError::LocalOnly)?;

        let handle = transport::spawn(
            url,
            self.client_id.clone(),
            self.config.auth_token.clone(),
            self.config.heartbeat_interval_ms,
            self.config.reconnect_base_ms,
            self.config.reconnect_cap_ms,
        );

        *self.outgoing.lock().unwrap() = Some(handle.outgoing.clone());
        *self.conn_state.lock().unwrap() = Some(handle.state.clone());
        *self.force_reconnect.lock().unwrap() = Some(handle.force_reconnect.clone());

        tokio::spawn(forward_connection_status(handle.state.clone(), self.event_tx.clone()));

        tokio::spawn(dispatch_incoming(
            handle.incoming,
            self.replicas.clone(),
            self.engine.clone(),
            self.queue.clone(),
            self.storage.clone(),
            self.pending_subscribes.clone(),
            handle.outgoing.clone(),
            self.event_tx.clone(),
        ));

        let open_docs: Vec<(DocumentId, synckit_core::VectorClock)> = {
            let replicas = self.replicas.lock().unwrap();
            replicas
                .iter()
                .map(|(id, r)| (id.clone(), r.lock().unwrap().vector().clone()))
                .collect()
        };
        for (doc_id, vector_clock) in open_docs {
            self.pending_subscribes.lock().unwrap().insert(doc_id.clone());
            let frame = Frame::Subscribe(SubscribePayload { document_id: doc_id.clone(), vector_clock });
            let _ = handle.outgoing.send(frame).await;
            spawn_subscribe_timeout(
                doc_id,
                self.pending_subscribes.clone(),
                handle.force_reconnect.clone(),
                self.config.subscribe_timeout_ms,
            );
        }

        Ok(())
    }
}

/// Spec.md §5: "Subscribe RPC has a soft timeout of 30s; timeout
/// transitions Transport to Reconnecting." If `document_id` is still
/// awaiting its `subscribeComplete` once `timeout_ms` elapses, force the
/// transport to drop the connection and reconnect.
fn spawn_subscribe_timeout(
    document_id: DocumentId,
    pending_subscribes: Arc<Mutex<HashSet<DocumentId>>>,
    force_reconnect: mpsc::Sender<()>,
    timeout_ms: u64,
) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        let still_pending = pending_subscribes.lock().unwrap().contains(&document_id);
        if still_pending {
            tracing::warn!(document_id = %document_id, "subscribe RPC timed out, forcing reconnect");
            let _ = force_reconnect.send(()).await;
        }
    });
}

async fn forward_connection_status(
    mut state_rx: tokio::sync::watch::Receiver<ConnectionState>,
    event_tx: mpsc::Sender<SyncEvent>,
) {
    loop {
        let current = *state_rx.borrow();
        if event_tx.send(SyncEvent::ConnectionStatus(current)).await.is_err() {
            return;
        }
        if state_rx.changed().await.is_err() {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_incoming(
    mut incoming: mpsc::Receiver<Frame>,
    replicas: Arc<Mutex<HashMap<DocumentId, Arc<Mutex<Replica>>>>>,
    engine: Arc<Mutex<DeltaEngine>>,
    queue: Arc<tokio::sync::Mutex<OfflineQueue>>,
    storage: Arc<dyn StorageAdapter>,
    pending_subscribes: Arc<Mutex<HashSet<DocumentId>>>,
    outgoing: mpsc::Sender<Frame>,
    event_tx: mpsc::Sender<SyncEvent>,
) {
    while let Some(frame) = incoming.recv().await {
        match frame {
            Frame::Delta(frame) => {
                let delta: Delta = match frame.try_into() {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed delta frame");
                        continue;
                    }
                };

                engine.lock().unwrap().observe(&delta.stamp);

                let snapshot = {
                    let replicas = replicas.lock().unwrap();
                    replicas.get(&delta.document_id).map(|r| {
                        r.lock().unwrap().apply_one(&delta);
                        r.lock().unwrap().document().clone()
                    })
                };

                if let Some(doc) = snapshot {
                    if let Err(e) = storage.save_delta(delta.clone()).await {
                        let _ = event_tx
                            .send(SyncEvent::StorageError { reason: e.to_string() })
                            .await;
                    }
                    if let Err(e) = storage.update_document(&delta.document_id, doc).await {
                        let _ = event_tx
                            .send(SyncEvent::StorageDegraded { reason: e.to_string() })
                            .await;
                    }
                }
            }
            Frame::Ack(payload) => {
                queue.lock().await.ack(payload.seq_at_origin);
            }
            Frame::SubscribeComplete(payload) => {
                let all_caught_up = {
                    let mut pending = pending_subscribes.lock().unwrap();
                    pending.remove(&payload.document_id);
                    pending.is_empty()
                };
                if all_caught_up {
                    let replay = queue.lock().await.replay();
                    for delta in replay {
                        let frame = Frame::Delta(DeltaFrame::from(&delta));
                        let _ = outgoing.send(frame).await;
                    }
                }
            }
            Frame::Error(payload) => {
                tracing::warn!(code = ?payload.code, message = %payload.message, "server reported error");
                let _ = event_tx
                    .send(SyncEvent::StorageError { reason: payload.message })
                    .await;
            }
            Frame::Welcome(_) | Frame::Pong(_) | Frame::Hello(_) | Frame::Subscribe(_) | Frame::Ping(_) => {
                // Hello/Subscribe/Ping never arrive on the client's inbound
                // side; Welcome/Pong carry no state this layer needs beyond
                // what the transport module already tracked.
            }
        }
    }
}
