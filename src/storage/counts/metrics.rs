use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Hooks for observing a counts store.
///
/// Implementations must be cheap; they are called on the commit path.
pub trait CountsMetrics: Send + Sync {
    /// Records a diff merged into the table.
    ///
    /// # Parameters
    /// * `entries` - Number of keys the diff touched.
    /// * `in_order` - Whether the transaction extended the gap-free prefix immediately.
    fn update_applied(&self, entries: usize, in_order: bool);

    /// Records an update refused before anything was applied.
    fn update_rejected(&self);

    /// Records a snapshot copy.
    ///
    /// # Parameters
    /// * `waited` - Time spent waiting for the requested transaction.
    /// * `entries` - Number of keys in the snapshot.
    fn snapshot_taken(&self, waited: Duration, entries: usize);

    /// Records a snapshot whose wait budget ran out.
    fn snapshot_timed_out(&self);
}

/// Discards every observation.
#[derive(Default)]
pub struct NoopMetrics;

impl CountsMetrics for NoopMetrics {
    fn update_applied(&self, _entries: usize, _in_order: bool) {}
    fn update_rejected(&self) {}
    fn snapshot_taken(&self, _waited: Duration, _entries: usize) {}
    fn snapshot_timed_out(&self) {}
}

/// Atomic counters for every hook.
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Diffs merged.
    pub updates_applied: AtomicU64,

    /// Diffs whose transaction arrived ahead of a gap.
    pub updates_out_of_order: AtomicU64,

    /// Keys touched across all merged diffs.
    pub entries_merged: AtomicU64,

    /// Updates refused.
    pub updates_rejected: AtomicU64,

    /// Snapshots produced.
    pub snapshots_taken: AtomicU64,

    /// Total microseconds spent waiting inside `snapshot`.
    pub snapshot_wait_micros: AtomicU64,

    /// Snapshots that gave up waiting.
    pub snapshot_timeouts: AtomicU64,
}

impl CountsMetrics for CounterMetrics {
    fn update_applied(&self, entries: usize, in_order: bool) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        self.entries_merged
            .fetch_add(entries as u64, Ordering::Relaxed);
        if !in_order {
            self.updates_out_of_order.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn update_rejected(&self) {
        self.updates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot_taken(&self, waited: Duration, _entries: usize) {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.snapshot_wait_micros
            .fetch_add(micros, Ordering::Relaxed);
    }

    fn snapshot_timed_out(&self) {
        self.snapshot_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics implementation, [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn CountsMetrics> {
    Arc::new(NoopMetrics)
}
