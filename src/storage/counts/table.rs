use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::diff::CountsDiff;
use super::key::{CounterKey, MAX_ARITY};
use crate::types::TxId;

/// Inline storage for one key's counters.
pub type CounterValues = SmallVec<[i64; MAX_ARITY]>;

#[derive(Clone, Debug)]
struct Slot {
    /// Lowest transaction id whose diff touched this slot.
    first_tx: TxId,
    values: CounterValues,
}

impl Slot {
    fn zeroed(arity: usize, tx_id: TxId) -> Self {
        Self {
            first_tx: tx_id,
            values: SmallVec::from_elem(0, arity),
        }
    }

    fn apply(&mut self, tx_id: TxId, delta: &[i64]) {
        self.first_tx = self.first_tx.min(tx_id);
        for (value, d) in self.values.iter_mut().zip(delta) {
            *value = value.wrapping_add(*d);
        }
    }
}

/// Concurrent key → counter-vector map with additive merges.
///
/// Merges hold the map's shared lock and touch each slot under its own mutex, so
/// merges into disjoint or overlapping keys run in parallel and no vector is ever
/// observed half-updated. Creating a slot and [`copy_snapshot`](Self::copy_snapshot)
/// take the exclusive lock.
#[derive(Debug, Default)]
pub struct AggregateTable {
    slots: RwLock<FxHashMap<CounterKey, Mutex<Slot>>>,
}

/// Slot contents plus the lowest transaction that touched it.
pub(crate) type OriginCopy = BTreeMap<CounterKey, (TxId, CounterValues)>;

impl AggregateTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = FxHashMap::default();
        slots.reserve(capacity);
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Replaces the table contents with `entries`, attributed to `tx_id`.
    pub fn seed<'a>(&self, tx_id: TxId, entries: impl IntoIterator<Item = (&'a CounterKey, &'a [i64])>) {
        let mut slots = self.slots.write();
        slots.clear();
        for (key, values) in entries {
            slots.insert(
                *key,
                Mutex::new(Slot {
                    first_tx: tx_id,
                    values: CounterValues::from_slice(values),
                }),
            );
        }
    }

    /// Adds every delta of `diffs` into the table, creating zeroed slots on demand.
    ///
    /// Deltas are assumed to match their key's arity.
    pub fn merge_all(&self, tx_id: TxId, diffs: &CountsDiff) {
        if diffs.is_empty() {
            return;
        }
        let mut missing = Vec::new();
        {
            let slots = self.slots.read();
            for (key, delta) in diffs.iter() {
                match slots.get(key) {
                    Some(slot) => slot.lock().apply(tx_id, delta),
                    None => missing.push((key, delta)),
                }
            }
        }
        if missing.is_empty() {
            return;
        }
        let mut slots = self.slots.write();
        for (key, delta) in missing {
            slots
                .entry(*key)
                .or_insert_with(|| Mutex::new(Slot::zeroed(key.arity(), tx_id)))
                .get_mut()
                .apply(tx_id, delta);
        }
    }

    /// Current counters for `key`; not tied to any transaction boundary.
    pub fn get(&self, key: &CounterKey) -> Option<Vec<i64>> {
        let slots = self.slots.read();
        slots.get(key).map(|slot| slot.lock().values.to_vec())
    }

    /// Independent copy of every entry, taken while no merge is in progress.
    pub fn copy_snapshot(&self) -> BTreeMap<CounterKey, Vec<i64>> {
        let mut slots = self.slots.write();
        slots
            .iter_mut()
            .map(|(key, slot)| (*key, slot.get_mut().values.to_vec()))
            .collect()
    }

    pub(crate) fn copy_with_origin(&self) -> OriginCopy {
        let mut slots = self.slots.write();
        slots
            .iter_mut()
            .map(|(key, slot)| {
                let slot = slot.get_mut();
                (*key, (slot.first_tx, slot.values.clone()))
            })
            .collect()
    }

    /// Calls `visitor` for every entry in key order, zero-valued entries included.
    ///
    /// Entries are copied out first, so the visitor may write to the table.
    pub fn visit_sorted(&self, mut visitor: impl FnMut(&CounterKey, &[i64])) {
        let mut entries: Vec<(CounterKey, CounterValues)> = {
            let slots = self.slots.read();
            slots
                .iter()
                .map(|(key, slot)| (*key, slot.lock().values.clone()))
                .collect()
        };
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        for (key, values) in &entries {
            visitor(key, values);
        }
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns `true` when no key has been touched yet.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
