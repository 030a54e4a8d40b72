use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Width of the sliding window used for the update rate
const RATE_WINDOW_MS: i64 = 5000;

/// Tracks metrics for the synchronizer
#[derive(Clone)]
pub struct SyncMetrics {
    /// Entity updates applied (lifetime counter)
    total_updates: Arc<AtomicU64>,

    /// Records dropped as malformed
    dropped_records: Arc<AtomicU64>,

    /// Snapshots applied
    snapshots: Arc<AtomicU64>,

    /// Channel reconnects observed
    reconnects: Arc<AtomicU64>,

    /// Update timestamps for rate calculation (sliding 5-second window)
    update_timestamps: Arc<RwLock<VecDeque<i64>>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            total_updates: Arc::new(AtomicU64::new(0)),
            dropped_records: Arc::new(AtomicU64::new(0)),
            snapshots: Arc::new(AtomicU64::new(0)),
            reconnects: Arc::new(AtomicU64::new(0)),
            update_timestamps: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Record an applied update
    pub fn record_update(&self) {
        self.total_updates.fetch_add(1, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis();
        let mut timestamps = self.update_timestamps.write().unwrap();
        timestamps.push_back(now);
        prune(&mut timestamps, now);
    }

    pub fn record_dropped(&self) {
        self.dropped_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Updates per second over the last 5 seconds
    pub fn get_update_rate(&self) -> f64 {
        let now = Utc::now().timestamp_millis();
        let mut timestamps = self.update_timestamps.write().unwrap();
        prune(&mut timestamps, now);
        timestamps.len() as f64 / (RATE_WINDOW_MS as f64 / 1000.0)
    }

    pub fn get_total_updates(&self) -> u64 {
        self.total_updates.load(Ordering::Relaxed)
    }

    pub fn get_dropped_records(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_updates: self.get_total_updates(),
            update_rate: self.get_update_rate(),
            dropped_records: self.get_dropped_records(),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(timestamps: &mut VecDeque<i64>, now: i64) {
    while let Some(&oldest) = timestamps.front() {
        if now - oldest > RATE_WINDOW_MS {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_updates: u64,
    pub update_rate: f64,
    pub dropped_records: u64,
    pub snapshots: u64,
    pub reconnects: u64,
}
