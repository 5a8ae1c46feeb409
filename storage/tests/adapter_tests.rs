//! Shared conformance suite run against every `StorageAdapter`
//! implementation, so `InMemoryStorage` and `SqliteStorage` can't silently
//! diverge in behavior.

use synckit_core::{DeltaEngine, Document, Limits};
use synckit_storage::{CleanupThresholds, InMemoryStorage, Session, SqliteStorage, StorageAdapter};

async fn document_round_trip(storage: &dyn StorageAdapter) {
    let doc_id = "doc-1".to_string();
    assert!(storage.get_document(&doc_id).await.unwrap().is_none());

    let saved = storage
        .save_document(&doc_id, Document::new(doc_id.clone()))
        .await
        .unwrap();
    assert_eq!(saved.version, 1);

    let loaded = storage.get_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(loaded.document.id(), &doc_id);

    let updated = storage
        .update_document(&doc_id, Document::new(doc_id.clone()))
        .await
        .unwrap();
    assert_eq!(updated.version, 2);

    assert!(storage.delete_document(&doc_id).await.unwrap());
    assert!(storage.get_document(&doc_id).await.unwrap().is_none());
    assert!(!storage.delete_document(&doc_id).await.unwrap());
}

async fn delta_log_accumulates_in_order(storage: &dyn StorageAdapter) {
    let doc_id = "doc-log".to_string();
    let mut engine = DeltaEngine::new("client1".to_string(), Limits::default());

    for i in 0..5 {
        let delta = engine
            .stamp_set(doc_id.clone(), format!("field{i}"), serde_json::json!(i))
            .unwrap();
        storage.save_delta(delta).await.unwrap();
    }

    let deltas = storage.get_deltas(&doc_id, 10).await.unwrap();
    assert_eq!(deltas.len(), 5);
    for (i, stored) in deltas.iter().enumerate() {
        assert_eq!(stored.delta.field_name, format!("field{i}"));
    }

    let limited = storage.get_deltas(&doc_id, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    // Limiting takes the most recent entries, still oldest-first.
    assert_eq!(limited[0].delta.field_name, "field3");
    assert_eq!(limited[1].delta.field_name, "field4");
}

async fn vector_clock_persists_across_reads(storage: &dyn StorageAdapter) {
    let doc_id = "doc-vc".to_string();
    storage
        .save_document(&doc_id, Document::new(doc_id.clone()))
        .await
        .unwrap();

    storage
        .update_vector_clock(&doc_id, &"client1".to_string(), 5)
        .await
        .unwrap();
    let vc = storage.get_vector_clock(&doc_id).await.unwrap();
    assert_eq!(vc.get("client1"), 5);

    let mut other = synckit_core::VectorClock::new();
    other.advance(&"client2".to_string(), 3);
    storage.merge_vector_clock(&doc_id, &other).await.unwrap();

    let merged = storage.get_vector_clock(&doc_id).await.unwrap();
    assert_eq!(merged.get("client1"), 5);
    assert_eq!(merged.get("client2"), 3);
}

async fn session_lifecycle(storage: &dyn StorageAdapter) {
    let session = Session {
        id: "sess-1".to_string(),
        client_id: "client1".to_string(),
        user_id: Some("user-1".to_string()),
        connected_at_millis: 1000,
        last_seen_millis: 1000,
    };
    storage.save_session(session.clone()).await.unwrap();

    let mut updated = session.clone();
    updated.last_seen_millis = 2000;
    storage.update_session(updated.clone()).await.unwrap();

    let sessions = storage.get_sessions("user-1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].last_seen_millis, 2000);

    storage.delete_session(&"sess-1".to_string()).await.unwrap();
    assert!(storage.get_sessions("user-1").await.unwrap().is_empty());
}

async fn cleanup_only_removes_stale_entries(storage: &dyn StorageAdapter) {
    storage
        .save_session(Session {
            id: "stale".to_string(),
            client_id: "c1".to_string(),
            user_id: Some("u1".to_string()),
            connected_at_millis: 0,
            last_seen_millis: 0,
        })
        .await
        .unwrap();

    let report = storage
        .cleanup(CleanupThresholds {
            old_sessions_hours: 1,
            old_deltas_days: 7,
        })
        .await
        .unwrap();

    assert_eq!(report.sessions_deleted, 1);
    assert!(storage.get_sessions("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn in_memory_storage_passes_conformance_suite() {
    let storage = InMemoryStorage::new();
    document_round_trip(&storage).await;

    let storage = InMemoryStorage::new();
    delta_log_accumulates_in_order(&storage).await;

    let storage = InMemoryStorage::new();
    vector_clock_persists_across_reads(&storage).await;

    let storage = InMemoryStorage::new();
    session_lifecycle(&storage).await;

    let storage = InMemoryStorage::new();
    cleanup_only_removes_stale_entries(&storage).await;
}

#[tokio::test]
async fn sqlite_storage_passes_conformance_suite() {
    let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
    document_round_trip(&storage).await;

    let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
    delta_log_accumulates_in_order(&storage).await;

    let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
    vector_clock_persists_across_reads(&storage).await;

    let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
    session_lifecycle(&storage).await;

    let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
    cleanup_only_removes_stale_entries(&storage).await;
}
