use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use super::diff::CountsDiff;
use super::envelope::write_file;
use super::key::{CounterKey, IndexRef};
use super::metrics::{default_metrics, CountsMetrics};
use super::options::CountsOptions;
use super::snapshot::CountsSnapshot;
use super::table::AggregateTable;
use crate::primitives::concurrency::{OutOfOrderSequence, SequenceSnapshot};
use crate::types::{LabelId, Result, SombraError, TxId, TypeId, MAX_TX_ID};

/// Aggregate counters that advance one committed transaction at a time and can
/// be copied as of any gap-free transaction id.
///
/// Writers call [`update_all`](Self::update_all) concurrently, in any order.
/// Reads through [`get`](Self::get) are dirty; [`snapshot`](Self::snapshot)
/// returns exactly the sum of every diff at or below the returned transaction id.
///
/// # Snapshot protocol
///
/// `update_all` holds the shared side of `gate` while it merges and then offers
/// the transaction to `sequence`, so once `snapshot` holds the exclusive side
/// every merged diff has also been offered. Diffs of transactions still parked
/// ahead of a gap live on as sequence metadata; the copy subtracts them and
/// drops keys that only they created.
///
/// Lock order: `gate`, then `sequence`, then the table.
pub struct VersionedCountsStore {
    table: AggregateTable,
    sequence: OutOfOrderSequence<CountsDiff>,
    gate: RwLock<()>,
    in_flight: Mutex<FxHashSet<TxId>>,
    options: CountsOptions,
    metrics: Arc<dyn CountsMetrics>,
}

impl VersionedCountsStore {
    /// Empty store positioned at transaction 0.
    pub fn new(options: CountsOptions) -> Self {
        Self::with_metrics(options, default_metrics())
    }

    /// Empty store reporting to `metrics`.
    pub fn with_metrics(options: CountsOptions, metrics: Arc<dyn CountsMetrics>) -> Self {
        Self::build(0, AggregateTable::with_capacity(options.initial_capacity), options, metrics)
    }

    /// Store seeded with the entries of `snapshot`; the next transaction it
    /// accepts is `snapshot.tx_id() + 1`.
    ///
    /// Fails with [`SombraError::ArityMismatch`] if any value vector disagrees
    /// with its key, and with [`SombraError::Invalid`] if the transaction id is
    /// past [`MAX_TX_ID`]. Nothing is seeded in either case.
    pub fn from_snapshot(snapshot: CountsSnapshot, options: CountsOptions) -> Result<Self> {
        if snapshot.tx_id() > MAX_TX_ID {
            return Err(SombraError::Invalid("snapshot transaction id exceeds wire range"));
        }
        snapshot.validate()?;
        let table = AggregateTable::with_capacity(options.initial_capacity.max(snapshot.len()));
        table.seed(snapshot.tx_id(), snapshot.iter());
        debug!(
            tx_id = snapshot.tx_id(),
            entries = snapshot.len(),
            "counts.store.restored"
        );
        Ok(Self::build(snapshot.tx_id(), table, options, default_metrics()))
    }

    fn build(
        base: TxId,
        table: AggregateTable,
        options: CountsOptions,
        metrics: Arc<dyn CountsMetrics>,
    ) -> Self {
        Self {
            table,
            sequence: OutOfOrderSequence::new(base).with_poll_interval(options.wait_poll_interval()),
            gate: RwLock::new(()),
            in_flight: Mutex::new(FxHashSet::default()),
            options,
            metrics,
        }
    }

    /// Options the store was built with.
    pub fn options(&self) -> &CountsOptions {
        &self.options
    }

    /// Applies the diff of committed transaction `tx_id`.
    ///
    /// Nothing is applied when the call fails:
    /// - [`SombraError::ArityMismatch`] if a delta disagrees with its key's arity;
    /// - [`SombraError::Invalid`] if `tx_id` is past [`MAX_TX_ID`], at or below
    ///   the gap-free prefix, already applied, or being applied by another thread.
    ///
    /// An empty diff still marks `tx_id` as applied.
    pub fn update_all(&self, tx_id: TxId, diffs: CountsDiff) -> Result<()> {
        if tx_id > MAX_TX_ID {
            return Err(self.reject(tx_id, SombraError::Invalid("transaction id exceeds wire range")));
        }
        if let Err(err) = diffs.validate() {
            return Err(self.reject(tx_id, err));
        }
        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, tx_id) else {
            return Err(self.reject(tx_id, SombraError::Invalid("transaction already being applied")));
        };
        self.apply_claimed(tx_id, diffs)
    }

    fn apply_claimed(&self, tx_id: TxId, diffs: CountsDiff) -> Result<()> {
        if tx_id <= self.sequence.highest_gap_free() {
            return Err(self.reject(
                tx_id,
                SombraError::Invalid("transaction at or below the applied prefix"),
            ));
        }
        if self.sequence.is_applied(tx_id) {
            return Err(self.reject(tx_id, SombraError::Invalid("transaction already applied")));
        }
        let entries = diffs.len();
        let _shared = self.gate.read();
        self.table.merge_all(tx_id, &diffs);
        let in_order = self.sequence.offer(tx_id, diffs)?;
        self.metrics.update_applied(entries, in_order);
        trace!(tx_id, entries, in_order, "counts.update.applied");
        Ok(())
    }

    fn reject(&self, tx_id: TxId, err: SombraError) -> SombraError {
        self.metrics.update_rejected();
        warn!(tx_id, error = %err, "counts.update.rejected");
        err
    }

    /// Current counters for `key`. Dirty: may include transactions not yet part
    /// of the gap-free prefix.
    pub fn get(&self, key: &CounterKey) -> Option<Vec<i64>> {
        self.table.get(key)
    }

    /// Nodes carrying `label`, or all nodes for [`LabelId::ANY`]. Zero when unknown.
    pub fn node_count(&self, label: impl Into<LabelId>) -> i64 {
        self.single(&CounterKey::node(label))
    }

    /// Relationships matching `(start)-[rel_type]->(end)`; wildcards allowed.
    pub fn relationship_count(
        &self,
        start: impl Into<LabelId>,
        rel_type: impl Into<TypeId>,
        end: impl Into<LabelId>,
    ) -> i64 {
        self.single(&CounterKey::relationship(start, rel_type, end))
    }

    /// `(unique values, sample size)` of the last sample of `index`.
    pub fn index_sample(&self, index: impl Into<IndexRef>) -> Option<(i64, i64)> {
        self.pair(&CounterKey::index_sample(index))
    }

    /// `(updates since sample, index size)` of `index`.
    pub fn index_statistics(&self, index: impl Into<IndexRef>) -> Option<(i64, i64)> {
        self.pair(&CounterKey::index_statistics(index))
    }

    fn single(&self, key: &CounterKey) -> i64 {
        self.table
            .get(key)
            .and_then(|values| values.first().copied())
            .unwrap_or(0)
    }

    fn pair(&self, key: &CounterKey) -> Option<(i64, i64)> {
        match self.table.get(key)?.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }

    /// Waits until every transaction `<= tx_id` is applied, then copies the
    /// counters as of the gap-free prefix at that moment.
    ///
    /// The returned snapshot's transaction id is at least `tx_id`. Fails with
    /// [`SombraError::Timeout`] once `timeout` elapses; the store is unaffected.
    pub fn snapshot(&self, tx_id: TxId, timeout: Duration) -> Result<CountsSnapshot> {
        let started = Instant::now();
        if let Err(err) = self.sequence.wait_until(tx_id, timeout) {
            if err.is_timeout() {
                self.metrics.snapshot_timed_out();
                warn!(
                    requested = tx_id,
                    reached = self.sequence.highest_gap_free(),
                    timeout_ms = timeout.as_millis() as u64,
                    "counts.snapshot.timeout"
                );
            }
            return Err(err);
        }
        let waited = started.elapsed();
        let snapshot = self.copy_consistent();
        self.metrics.snapshot_taken(waited, snapshot.len());
        debug!(
            requested = tx_id,
            tx_id = snapshot.tx_id(),
            entries = snapshot.len(),
            waited_us = waited.as_micros() as u64,
            "counts.snapshot.taken"
        );
        Ok(snapshot)
    }

    /// [`snapshot`](Self::snapshot) bounded by the configured default timeout.
    pub fn snapshot_with_default_timeout(&self, tx_id: TxId) -> Result<CountsSnapshot> {
        self.snapshot(tx_id, self.options.default_snapshot_timeout())
    }

    /// Snapshots `tx_id` within the default timeout and writes it to `path` in
    /// the configured [`format_version`](CountsOptions::format_version).
    pub fn checkpoint(&self, path: impl AsRef<Path>, tx_id: TxId) -> Result<CountsSnapshot> {
        let snapshot = self.snapshot_with_default_timeout(tx_id)?;
        write_file(path, &snapshot, self.options.format_version)?;
        Ok(snapshot)
    }

    /// Copy as of the current gap-free prefix, without waiting.
    pub fn snapshot_latest(&self) -> CountsSnapshot {
        self.copy_consistent()
    }

    fn copy_consistent(&self) -> CountsSnapshot {
        let _exclusive = self.gate.write();
        self.sequence.with_snapshot(|base, pending| {
            let mut copy = self.table.copy_with_origin();
            for (_, diff) in pending {
                for (key, delta) in diff.iter() {
                    if let Some((_, values)) = copy.get_mut(key) {
                        for (value, d) in values.iter_mut().zip(delta) {
                            *value = value.wrapping_sub(*d);
                        }
                    }
                }
            }
            let entries = copy
                .into_iter()
                .filter(|(_, (first_tx, _))| *first_tx <= base)
                .map(|(key, (_, values))| (key, values.to_vec()))
                .collect();
            CountsSnapshot::new(base, entries)
        })
    }

    /// Highest transaction id with no gap below it.
    pub fn tx_id(&self) -> TxId {
        self.sequence.highest_gap_free()
    }

    /// Gap-free prefix plus the transactions applied ahead of a gap.
    pub fn sequence_snapshot(&self) -> SequenceSnapshot {
        self.sequence.snapshot()
    }

    /// Calls `visitor` for every key in order, including keys whose counters sum
    /// to zero. Dirty, like [`get`](Self::get). The visitor may call back into the
    /// store.
    pub fn visit_all(&self, visitor: impl FnMut(&CounterKey, &[i64])) {
        self.table.visit_sorted(visitor);
    }

    /// Number of keys touched so far.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` when no key has been touched.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for VersionedCountsStore {
    fn default() -> Self {
        Self::new(CountsOptions::default())
    }
}

impl TryFrom<CountsSnapshot> for VersionedCountsStore {
    type Error = SombraError;

    fn try_from(snapshot: CountsSnapshot) -> Result<Self> {
        Self::from_snapshot(snapshot, CountsOptions::default())
    }
}

/// Marks a transaction as being applied until dropped.
struct InFlightClaim<'a> {
    in_flight: &'a Mutex<FxHashSet<TxId>>,
    tx_id: TxId,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(in_flight: &'a Mutex<FxHashSet<TxId>>, tx_id: TxId) -> Option<Self> {
        in_flight
            .lock()
            .insert(tx_id)
            .then(|| Self { in_flight, tx_id })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.tx_id);
    }
}

impl fmt::Debug for VersionedCountsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedCountsStore")
            .field("sequence", &self.sequence)
            .field("keys", &self.table.len())
            .field("options", &self.options)
            .finish()
    }
}
