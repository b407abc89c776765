use std::collections::hash_map;
use std::iter::FromIterator;

use rustc_hash::FxHashMap;

use super::key::CounterKey;
use super::table::CounterValues;
use crate::types::{LabelId, Result, TypeId};

/// Per-key deltas produced by one committed transaction.
///
/// Adding to a key that is already present accumulates element-wise, so a
/// transaction touching the same label twice yields a single entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountsDiff {
    deltas: FxHashMap<CounterKey, CounterValues>,
}

impl CountsDiff {
    /// Creates an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the pending delta for `key`.
    ///
    /// Lengths are not checked here; [`validate`](Self::validate) (run by the
    /// store before anything is applied) rejects vectors that disagree with the
    /// key's arity.
    pub fn add(&mut self, key: CounterKey, delta: &[i64]) -> &mut Self {
        match self.deltas.entry(key) {
            hash_map::Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                if current.len() < delta.len() {
                    current.resize(delta.len(), 0);
                }
                for (acc, d) in current.iter_mut().zip(delta) {
                    *acc = acc.wrapping_add(*d);
                }
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(CounterValues::from_slice(delta));
            }
        }
        self
    }

    /// Adds `delta` nodes to `label`.
    pub fn node(&mut self, label: impl Into<LabelId>, delta: i64) -> &mut Self {
        self.add(CounterKey::node(label), &[delta])
    }

    /// Adds `delta` relationships to the `(start)-[rel_type]->(end)` count.
    pub fn relationship(
        &mut self,
        start: impl Into<LabelId>,
        rel_type: impl Into<TypeId>,
        end: impl Into<LabelId>,
        delta: i64,
    ) -> &mut Self {
        self.add(CounterKey::relationship(start, rel_type, end), &[delta])
    }

    /// Delta registered for `key`, if any.
    pub fn get(&self, key: &CounterKey) -> Option<&[i64]> {
        self.deltas.get(key).map(|values| values.as_slice())
    }

    /// Number of keys touched.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Returns `true` when the diff touches no key.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Iterates over `(key, delta)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&CounterKey, &[i64])> + '_ {
        self.deltas.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Checks every delta against its key's arity.
    pub fn validate(&self) -> Result<()> {
        for (key, delta) in &self.deltas {
            key.check_arity(delta)?;
        }
        Ok(())
    }
}

impl<V: AsRef<[i64]>> FromIterator<(CounterKey, V)> for CountsDiff {
    fn from_iter<T: IntoIterator<Item = (CounterKey, V)>>(iter: T) -> Self {
        let mut diff = CountsDiff::new();
        for (key, delta) in iter {
            diff.add(key, delta.as_ref());
        }
        diff
    }
}

impl<V: AsRef<[i64]>> Extend<(CounterKey, V)> for CountsDiff {
    fn extend<T: IntoIterator<Item = (CounterKey, V)>>(&mut self, iter: T) {
        for (key, delta) in iter {
            self.add(key, delta.as_ref());
        }
    }
}
