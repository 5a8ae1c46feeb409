//! A handle onto one open document's [`Replica`], scoped to a single
//! [`SyncKit`](crate::synckit::SyncKit) instance.
//!
//! Wraps local reads and the reactive `subscribe` API (spec.md §4.1,
//! §9); writes go through [`SyncKit::set`](crate::synckit::SyncKit::set)
//! / [`SyncKit::delete`](crate::synckit::SyncKit::delete) instead, since
//! those also have to stamp, enqueue, and (if connected) publish the
//! resulting delta — work a read-only handle has no business doing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use synckit_core::{Diff, DocumentId, FieldName, Replica, Unsubscribe};
use serde_json::Value as JsonValue;

/// Cheap, cloneable handle onto a replica owned by a `SyncKit` instance.
#[derive(Clone)]
pub struct ReplicaHandle {
    document_id: DocumentId,
    replica: Arc<Mutex<Replica>>,
}

impl ReplicaHandle {
    pub(crate) fn new(document_id: DocumentId, replica: Arc<Mutex<Replica>>) -> Self {
        Self { document_id, replica }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn get(&self, field: &str) -> Option<JsonValue> {
        self.replica.lock().unwrap().get(field).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<FieldName, JsonValue> {
        self.replica.lock().unwrap().snapshot()
    }

    /// Register an observer, invoked once per applied batch whose diff is
    /// non-empty (spec.md §4.1 "Observable value").
    pub fn subscribe(&self, observer: impl Fn(&Diff) + Send + 'static) -> Unsubscribe {
        self.replica.lock().unwrap().subscribe(Box::new(observer))
    }
}
