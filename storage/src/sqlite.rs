//! SQLite-backed [`StorageAdapter`], for the server and for clients that
//! want snapshots to survive a process restart.
//!
//! Document and delta payloads are stored as JSON text columns rather than
//! normalised into per-field rows: the adapter interface already treats
//! documents and deltas as opaque blobs (spec.md §4.7), so there is no
//! query the server needs to run against individual fields.

use crate::adapter::{CleanupReport, CleanupThresholds, Session, StorageAdapter, StoredDelta, StoredDocument};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use synckit_core::{ClientId, Delta, Document, DocumentId, SessionId, SyncError, VectorClock};

/// SQLite-backed [`StorageAdapter`] built on `sqlx`.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connect to `database_url` (e.g. `sqlite://synckit.db` or
    /// `sqlite::memory:`) and ensure the schema exists.
    pub async fn connect(database_url: &str) -> synckit_core::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> synckit_core::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at_millis INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deltas (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                body TEXT NOT NULL,
                recorded_at_millis INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_deltas_document ON deltas(document_id, log_id);

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT,
                connected_at_millis INTEGER NOT NULL,
                last_seen_millis INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;
        Ok(())
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn encode_document(doc: &Document) -> synckit_core::Result<String> {
        serde_json::to_string(doc).map_err(|e| SyncError::SerializationError(e.to_string()))
    }

    fn decode_document(body: &str) -> synckit_core::Result<Document> {
        serde_json::from_str(body).map_err(|e| SyncError::DeserializationError(e.to_string()))
    }

    async fn put_document(&self, id: &DocumentId, state: Document, version: u64) -> synckit_core::Result<StoredDocument> {
        let body = Self::encode_document(&state)?;
        let updated_at_millis = Self::now_millis();
        sqlx::query(
            "INSERT INTO documents (id, body, version, updated_at_millis) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, version = excluded.version, updated_at_millis = excluded.updated_at_millis",
        )
        .bind(id.as_str())
        .bind(&body)
        .bind(version as i64)
        .bind(updated_at_millis as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;

        Ok(StoredDocument {
            document: state,
            version,
            updated_at_millis,
        })
    }

    fn row_to_stored_document(id: DocumentId, body: String, version: i64, updated_at_millis: i64) -> synckit_core::Result<StoredDocument> {
        let mut document = Self::decode_document(&body)?;
        document.id = id;
        Ok(StoredDocument {
            document,
            version: version as u64,
            updated_at_millis: updated_at_millis as u64,
        })
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn get_document(&self, id: &DocumentId) -> synckit_core::Result<Option<StoredDocument>> {
        let row = sqlx::query("SELECT body, version, updated_at_millis FROM documents WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;

        row.map(|r| {
            Self::row_to_stored_document(id.clone(), r.get("body"), r.get("version"), r.get("updated_at_millis"))
        })
        .transpose()
    }

    async fn save_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument> {
        self.put_document(id, state, 1).await
    }

    async fn update_document(&self, id: &DocumentId, state: Document) -> synckit_core::Result<StoredDocument> {
        let next_version = self.get_document(id).await?.map(|d| d.version + 1).unwrap_or(1);
        self.put_document(id, state, next_version).await
    }

    async fn delete_document(&self, id: &DocumentId) -> synckit_core::Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self, limit: usize, offset: usize) -> synckit_core::Result<Vec<StoredDocument>> {
        let rows = sqlx::query("SELECT id, body, version, updated_at_millis FROM documents ORDER BY id LIMIT ?1 OFFSET ?2")
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;

        rows.into_iter()
            .map(|r| Self::row_to_stored_document(r.get("id"), r.get("body"), r.get("version"), r.get("updated_at_millis")))
            .collect()
    }

    async fn get_vector_clock(&self, doc_id: &DocumentId) -> synckit_core::Result<VectorClock> {
        Ok(self
            .get_document(doc_id)
            .await?
            .map(|d| d.document.vector().clone())
            .unwrap_or_default())
    }

    async fn update_vector_clock(&self, doc_id: &DocumentId, client: &ClientId, seq: u64) -> synckit_core::Result<()> {
        if let Some(mut stored) = self.get_document(doc_id).await? {
            stored.document.vector.advance(client, seq);
            self.put_document(doc_id, stored.document, stored.version).await?;
        }
        Ok(())
    }

    async fn merge_vector_clock(&self, doc_id: &DocumentId, clock: &VectorClock) -> synckit_core::Result<()> {
        if let Some(mut stored) = self.get_document(doc_id).await? {
            stored.document.vector.merge(clock);
            self.put_document(doc_id, stored.document, stored.version).await?;
        }
        Ok(())
    }

    async fn save_delta(&self, delta: Delta) -> synckit_core::Result<StoredDelta> {
        let body = serde_json::to_string(&delta).map_err(|e| SyncError::SerializationError(e.to_string()))?;
        let recorded_at_millis = Self::now_millis();

        let row = sqlx::query(
            "INSERT INTO deltas (document_id, body, recorded_at_millis) VALUES (?1, ?2, ?3) RETURNING log_id",
        )
        .bind(delta.document_id.as_str())
        .bind(&body)
        .bind(recorded_at_millis as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;

        let log_id: i64 = row.get("log_id");
        Ok(StoredDelta {
            log_id: log_id as u64,
            delta,
            recorded_at_millis,
        })
    }

    async fn get_deltas(&self, doc_id: &DocumentId, limit: usize) -> synckit_core::Result<Vec<StoredDelta>> {
        let rows = sqlx::query(
            "SELECT log_id, body, recorded_at_millis FROM deltas WHERE document_id = ?1 ORDER BY log_id DESC LIMIT ?2",
        )
        .bind(doc_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            let body: String = row.get("body");
            let delta: Delta = serde_json::from_str(&body).map_err(|e| SyncError::DeserializationError(e.to_string()))?;
            out.push(StoredDelta {
                log_id: row.get::<i64, _>("log_id") as u64,
                delta,
                recorded_at_millis: row.get::<i64, _>("recorded_at_millis") as u64,
            });
        }
        Ok(out)
    }

    async fn save_session(&self, session: Session) -> synckit_core::Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, client_id, user_id, connected_at_millis, last_seen_millis) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET client_id = excluded.client_id, user_id = excluded.user_id,
                connected_at_millis = excluded.connected_at_millis, last_seen_millis = excluded.last_seen_millis",
        )
        .bind(session.id.as_str())
        .bind(session.client_id.as_str())
        .bind(session.user_id.as_deref())
        .bind(session.connected_at_millis as i64)
        .bind(session.last_seen_millis as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn update_session(&self, session: Session) -> synckit_core::Result<()> {
        let result = sqlx::query(
            "UPDATE sessions SET client_id = ?2, user_id = ?3, connected_at_millis = ?4, last_seen_millis = ?5 WHERE id = ?1",
        )
        .bind(session.id.as_str())
        .bind(session.client_id.as_str())
        .bind(session.user_id.as_deref())
        .bind(session.connected_at_millis as i64)
        .bind(session.last_seen_millis as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::StorageError(format!("unknown session {}", session.id)));
        }
        Ok(())
    }

    async fn delete_session(&self, id: &SessionId) -> synckit_core::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_sessions(&self, user_id: &str) -> synckit_core::Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT id, client_id, user_id, connected_at_millis, last_seen_millis FROM sessions WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::StorageError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| Session {
                id: r.get("id"),
                client_id: r.get("client_id"),
                user_id: r.get("user_id"),
                connected_at_millis: r.get::<i64, _>("connected_at_millis") as u64,
                last_seen_millis: r.get::<i64, _>("last_seen_millis") as u64,
            })
            .collect())
    }

    async fn cleanup(&self, thresholds: CleanupThresholds) -> synckit_core::Result<CleanupReport> {
        let now = Self::now_millis() as i64;
        let session_cutoff = now - (thresholds.old_sessions_hours * 3_600_000) as i64;
        let delta_cutoff = now - (thresholds.old_deltas_days * 86_400_000) as i64;

        let sessions_result = sqlx::query("DELETE FROM sessions WHERE last_seen_millis < ?1")
            .bind(session_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;

        let deltas_result = sqlx::query("DELETE FROM deltas WHERE recorded_at_millis < ?1")
            .bind(delta_cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::StorageError(e.to_string()))?;

        tracing::debug!(
            sessions_deleted = sessions_result.rows_affected(),
            deltas_deleted = deltas_result.rows_affected(),
            "storage cleanup pass completed"
        );

        Ok(CleanupReport {
            sessions_deleted: sessions_result.rows_affected(),
            deltas_deleted: deltas_result.rows_affected(),
        })
    }
}
