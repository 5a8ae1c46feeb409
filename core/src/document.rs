//! Document structure with field-level Last-Write-Wins, and the
//! [`Replica`] wrapper that exposes the reactive observer API spec.md
//! §4.1 and §9 describe.
//!
//! Properties the apply algorithm below must hold (spec.md §8):
//! - Strong eventual consistency: replicas that applied the same delta
//!   set converge to bit-identical state.
//! - Idempotence: re-applying a delta is a no-op.
//! - LWW determinism: the greater `HybridStamp` always wins, ties
//!   broken by `client_id`.

use crate::clock::HybridStamp;
use crate::delta::{Delta, Op};
use crate::ids::{ClientId, DocumentId, FieldName};
use crate::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// A single field slot: either a live value or a tombstone, carrying the
/// stamp and origin of whichever write currently occupies it.
///
/// `value: None` is the tombstone case — it participates in LWW exactly
/// like a value (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub value: Option<JsonValue>,
    pub stamp: HybridStamp,
    pub origin_client: ClientId,
}

impl FieldRecord {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

/// A document: a mapping from field name to [`FieldRecord`], plus the
/// vector clock tracking which origins' writes this replica has applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: HashMap<FieldName, FieldRecord>,
    pub vector: VectorClock,
}

impl Document {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            fields: HashMap::new(),
            vector: VectorClock::new(),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn vector(&self) -> &VectorClock {
        &self.vector
    }

    /// Get the live value of a field. Returns `None` for absent or
    /// tombstoned fields — callers cannot distinguish "never written" from
    /// "deleted" through this API, matching spec.md's `get(field) -> Value | absent`.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field).and_then(|r| r.value.as_ref())
    }

    /// The raw record for a field, tombstone included. Used by replication
    /// and compaction code that needs to see deletes, not just values.
    pub fn record(&self, field: &str) -> Option<&FieldRecord> {
        self.fields.get(field)
    }

    /// Materialised view omitting tombstones (spec.md §4.1 "Observable value").
    pub fn snapshot(&self) -> BTreeMap<FieldName, JsonValue> {
        self.fields
            .iter()
            .filter_map(|(name, record)| record.value.clone().map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn field_count(&self) -> usize {
        self.fields.values().filter(|r| !r.is_tombstone()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// Drop tombstones whose stamp is older than `cutoff_millis`
    /// (spec.md §4.1 tombstone policy; called from the server compaction
    /// task, never from the hot apply path).
    pub fn gc_tombstones(&mut self, cutoff_millis: u64) {
        self.fields
            .retain(|_, record| !(record.is_tombstone() && record.stamp.physical_millis < cutoff_millis));
    }
}

/// Outcome of applying a single delta, for caller-side observability
/// (spec.md §4.1 step 2/3, generalized into a typed result instead of a
/// bare bool so logging can distinguish "stale, dropped" from "rejected,
/// malformed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Delta's stamp was newer; the field record was overwritten.
    Applied,
    /// Delta's stamp was not newer than the existing record; discarded.
    DroppedStale,
    /// Delta targeted a different document than `doc.id`.
    Rejected(String),
}

/// Batched observer notification: everything that changed in one
/// `apply_batch` call, so observers see one merged notification per
/// transport message rather than one per delta (spec.md §4.1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub added: BTreeMap<FieldName, JsonValue>,
    pub updated: BTreeMap<FieldName, JsonValue>,
    pub removed: BTreeSet<FieldName>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Apply one delta to `doc` per the spec.md §4.1 algorithm, recording any
/// visible change into `diff`. Idempotent: re-applying the same delta
/// always returns `DroppedStale` the second time.
pub fn apply_delta(doc: &mut Document, delta: &Delta, diff: &mut Diff) -> ApplyOutcome {
    if delta.document_id != doc.id {
        return ApplyOutcome::Rejected(format!(
            "delta for document {} applied to document {}",
            delta.document_id, doc.id
        ));
    }

    let existing = doc.fields.get(&delta.field_name);
    let should_apply = match existing {
        None => true,
        Some(r) => delta.stamp > r.stamp,
    };

    if !should_apply {
        return ApplyOutcome::DroppedStale;
    }

    let was_live = existing.map(|r| !r.is_tombstone()).unwrap_or(false);
    let old_value = existing.and_then(|r| r.value.clone());

    let new_value = match &delta.op {
        Op::Set(v) => Some(v.clone()),
        Op::Delete => None,
    };

    doc.fields.insert(
        delta.field_name.clone(),
        FieldRecord {
            value: new_value.clone(),
            stamp: delta.stamp.clone(),
            origin_client: delta.origin_client.clone(),
        },
    );
    doc.vector.advance(&delta.origin_client, delta.seq_at_origin);

    match (was_live, new_value) {
        (false, Some(v)) => {
            diff.added.insert(delta.field_name.clone(), v);
        }
        (true, Some(v)) => {
            if Some(&v) != old_value.as_ref() {
                diff.updated.insert(delta.field_name.clone(), v);
            }
        }
        (true, None) => {
            diff.removed.insert(delta.field_name.clone());
        }
        (false, None) => {} // tombstone over an already-absent/tombstoned field: no visible change
    }

    ApplyOutcome::Applied
}

type Observer = Box<dyn Fn(&Diff) + Send + 'static>;

/// Handle returned by [`Replica::subscribe`]; call [`unsubscribe`](Unsubscribe::unsubscribe)
/// to stop receiving notifications.
pub struct Unsubscribe {
    id: u64,
    registry: Arc<Mutex<HashMap<u64, Observer>>>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.registry.lock().unwrap().remove(&self.id);
    }
}

/// One client's (or the server's) materialised view of a document, plus
/// the reactive subscription API spec.md §9 asks for in
/// environment-agnostic form: `subscribe(fn) -> unsubscribeHandle`.
pub struct Replica {
    document: Document,
    observers: Arc<Mutex<HashMap<u64, Observer>>>,
    next_observer_id: u64,
}

impl Replica {
    pub fn new(id: DocumentId) -> Self {
        Self::from_document(Document::new(id))
    }

    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            observers: Arc::new(Mutex::new(HashMap::new())),
            next_observer_id: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.document.get(field)
    }

    pub fn snapshot(&self) -> BTreeMap<FieldName, JsonValue> {
        self.document.snapshot()
    }

    pub fn vector(&self) -> &VectorClock {
        self.document.vector()
    }

    /// Register an observer; it is invoked once per [`apply_batch`](Replica::apply_batch)
    /// call whose resulting diff is non-empty.
    pub fn subscribe(&mut self, observer: Observer) -> Unsubscribe {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.lock().unwrap().insert(id, observer);
        Unsubscribe {
            id,
            registry: self.observers.clone(),
        }
    }

    /// Apply a single delta and notify observers if it produced a visible
    /// change.
    pub fn apply_one(&mut self, delta: &Delta) -> ApplyOutcome {
        let mut diff = Diff::default();
        let outcome = apply_delta(&mut self.document, delta, &mut diff);
        if !diff.is_empty() {
            self.notify(&diff);
        }
        outcome
    }

    /// Apply a batch of deltas that arrived together (e.g. in one
    /// transport message) as a single atomic notification: observers see
    /// one merged diff, never one per delta (spec.md §4.1).
    pub fn apply_batch(&mut self, deltas: &[Delta]) -> Diff {
        let mut diff = Diff::default();
        for delta in deltas {
            apply_delta(&mut self.document, delta, &mut diff);
        }
        if !diff.is_empty() {
            self.notify(&diff);
        }
        diff
    }

    fn notify(&self, diff: &Diff) {
        let observers = self.observers.lock().unwrap();
        for observer in observers.values() {
            observer(diff);
        }
    }
}
