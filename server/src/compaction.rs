//! Periodic compaction task (spec.md §4.6 "Compaction"): sweeps stale
//! sessions and old delta-log entries through the storage adapter, and
//! asks every live hub to drop tombstones and ring-buffer entries older
//! than the safety window.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use synckit_storage::{CleanupThresholds, StorageAdapter};

use crate::config::ServerConfig;
use crate::registry::HubRegistry;

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Runs one compaction pass immediately, then every `config.compaction_interval`
/// forever. Intended to be `tokio::spawn`ed once per server process.
pub async fn run(storage: Arc<dyn StorageAdapter>, registry: Arc<HubRegistry>, config: ServerConfig) {
    let mut ticker = tokio::time::interval(config.compaction_interval);
    loop {
        ticker.tick().await;
        run_once(&storage, &registry, &config).await;
    }
}

async fn run_once(storage: &Arc<dyn StorageAdapter>, registry: &HubRegistry, config: &ServerConfig) {
    let thresholds = CleanupThresholds {
        old_sessions_hours: duration_hours(config.session_stale_after),
        old_deltas_days: duration_days(config.tombstone_safety_window),
    };
    match storage.cleanup(thresholds).await {
        Ok(report) => tracing::info!(
            sessions_deleted = report.sessions_deleted,
            deltas_deleted = report.deltas_deleted,
            "storage cleanup pass completed"
        ),
        Err(e) => tracing::warn!(error = %e, "storage cleanup pass failed"),
    }

    let cutoff_millis = now_millis().saturating_sub(config.tombstone_safety_window.as_millis() as u64);
    for document_id in registry.document_ids() {
        if let Some(hub) = registry.get(&document_id) {
            hub.compact(cutoff_millis).await;
        }
    }
}

fn duration_hours(d: Duration) -> u64 {
    d.as_secs() / 3600
}

fn duration_days(d: Duration) -> u64 {
    d.as_secs() / 86_400
}
