use std::collections::BTreeMap;

use super::key::CounterKey;
use crate::types::{Result, TxId};

/// Immutable copy of every counter as of a transaction id.
///
/// Entries are exactly the sum of all diffs with id `<= tx_id`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountsSnapshot {
    tx_id: TxId,
    entries: BTreeMap<CounterKey, Vec<i64>>,
}

impl CountsSnapshot {
    /// Builds a snapshot from its parts. Arity is checked when the snapshot is
    /// encoded or used to seed a store, not here.
    pub fn new(tx_id: TxId, entries: BTreeMap<CounterKey, Vec<i64>>) -> Self {
        Self { tx_id, entries }
    }

    /// Snapshot with no entries.
    pub fn empty(tx_id: TxId) -> Self {
        Self::new(tx_id, BTreeMap::new())
    }

    /// Transaction id the snapshot is consistent with.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// All entries in key order.
    pub fn entries(&self) -> &BTreeMap<CounterKey, Vec<i64>> {
        &self.entries
    }

    /// Counters for `key`.
    pub fn get(&self, key: &CounterKey) -> Option<&[i64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&CounterKey, &[i64])> + '_ {
        self.entries.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Checks every value vector against its key's arity.
    pub fn validate(&self) -> Result<()> {
        for (key, values) in &self.entries {
            key.check_arity(values)?;
        }
        Ok(())
    }

    /// Splits the snapshot into its transaction id and entries.
    pub fn into_parts(self) -> (TxId, BTreeMap<CounterKey, Vec<i64>>) {
        (self.tx_id, self.entries)
    }
}
