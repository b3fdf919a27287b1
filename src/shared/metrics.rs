use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// セッション単位の同期メトリクス
#[derive(Debug, Default)]
pub struct SyncMetrics {
    speculative_installs: AtomicU64,
    confirmations: AtomicU64,
    rollbacks: AtomicU64,
    conflicts: AtomicU64,
    busy_rejections: AtomicU64,
    refreshes_started: AtomicU64,
    refresh_joins: AtomicU64,
    fetches_applied: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub speculative_installs: u64,
    pub confirmations: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
    pub busy_rejections: u64,
    pub refreshes_started: u64,
    pub refresh_joins: u64,
    pub fetches_applied: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_speculative_install(&self) {
        self.speculative_installs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_confirmation(&self) {
        self.confirmations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self, conflict: bool) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        if conflict {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_busy_rejection(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_join(&self) {
        self.refresh_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_applied(&self) {
        self.fetches_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            speculative_installs: self.speculative_installs.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            refreshes_started: self.refreshes_started.load(Ordering::Relaxed),
            refresh_joins: self.refresh_joins.load(Ordering::Relaxed),
            fetches_applied: self.fetches_applied.load(Ordering::Relaxed),
        }
    }
}
