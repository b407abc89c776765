#![forbid(unsafe_code)]
//! Coordination primitives shared by the counts store and the commit path.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::types::{Result, SombraError, TxId};

/// Default upper bound for a single park inside [`OutOfOrderSequence::wait_until`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Tracks the highest number `N` such that every number `<= N` has been offered,
/// even when numbers arrive out of order.
///
/// Numbers offered ahead of a gap are parked together with caller metadata `M`
/// until the gap closes; the metadata is dropped as soon as its number joins the
/// gap-free prefix.
pub struct OutOfOrderSequence<M = ()> {
    state: Mutex<SequenceState<M>>,
    advanced: Condvar,
    poll_interval: Duration,
}

struct SequenceState<M> {
    highest_gap_free: TxId,
    pending: BTreeMap<TxId, M>,
}

/// Point-in-time view of an [`OutOfOrderSequence`] for diagnostics and persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceSnapshot {
    /// Highest number with no gaps below it.
    pub highest_gap_free: TxId,
    /// Numbers offered ahead of a gap, ascending.
    pub out_of_order: Vec<TxId>,
}

impl<M> OutOfOrderSequence<M> {
    /// Creates a sequence whose gap-free prefix already covers `start`.
    pub fn new(start: TxId) -> Self {
        Self {
            state: Mutex::new(SequenceState {
                highest_gap_free: start,
                pending: BTreeMap::new(),
            }),
            advanced: Condvar::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the maximum time a waiter parks before re-checking its deadline.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_micros(100));
        self
    }

    /// Records that `number` is complete.
    ///
    /// Returns `true` when the gap-free prefix advanced. Numbers at or below the
    /// prefix, or already parked, are rejected.
    pub fn offer(&self, number: TxId, meta: M) -> Result<bool> {
        let mut state = self.state.lock();
        if number <= state.highest_gap_free {
            return Err(SombraError::Invalid("sequence number at or below gap-free prefix"));
        }
        if state.pending.contains_key(&number) {
            return Err(SombraError::Invalid("sequence number already offered"));
        }
        if number != state.highest_gap_free + 1 {
            state.pending.insert(number, meta);
            return Ok(false);
        }
        state.highest_gap_free = number;
        while let Some(next) = state.highest_gap_free.checked_add(1) {
            if state.pending.remove(&next).is_none() {
                break;
            }
            state.highest_gap_free = next;
        }
        drop(state);
        self.advanced.notify_all();
        Ok(true)
    }

    /// Returns the highest number with no gaps below it.
    pub fn highest_gap_free(&self) -> TxId {
        self.state.lock().highest_gap_free
    }

    /// Returns `true` if `number` has been offered, in order or not.
    pub fn is_applied(&self, number: TxId) -> bool {
        let state = self.state.lock();
        number <= state.highest_gap_free || state.pending.contains_key(&number)
    }

    /// Number of offers parked ahead of a gap.
    pub fn out_of_order_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Parks the caller until the gap-free prefix reaches `target`, returning the
    /// prefix observed on success.
    ///
    /// Each park lasts at most the poll interval. Once `timeout` has elapsed the
    /// wait is abandoned with [`SombraError::Timeout`]; the sequence itself is
    /// unaffected.
    pub fn wait_until(&self, target: TxId, timeout: Duration) -> Result<TxId> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if state.highest_gap_free >= target {
                return Ok(state.highest_gap_free);
            }
            let now = Instant::now();
            let step = match deadline {
                Some(deadline) if now >= deadline => {
                    return Err(SombraError::Timeout {
                        requested: target,
                        reached: state.highest_gap_free,
                        waited: now.saturating_duration_since(started),
                    });
                }
                Some(deadline) => self.poll_interval.min(deadline - now),
                None => self.poll_interval,
            };
            self.advanced.wait_for(&mut state, step);
        }
    }

    /// Runs `f` with the gap-free prefix and the parked offers, atomically with
    /// respect to concurrent [`offer`](Self::offer) calls.
    pub fn with_snapshot<R>(
        &self,
        f: impl FnOnce(TxId, btree_map::Iter<'_, TxId, M>) -> R,
    ) -> R {
        let state = self.state.lock();
        f(state.highest_gap_free, state.pending.iter())
    }

    /// Captures the prefix and the parked numbers.
    pub fn snapshot(&self) -> SequenceSnapshot {
        self.with_snapshot(|highest_gap_free, pending| SequenceSnapshot {
            highest_gap_free,
            out_of_order: pending.map(|(&number, _)| number).collect(),
        })
    }
}

impl<M> std::fmt::Debug for OutOfOrderSequence<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("OutOfOrderSequence")
            .field("highest_gap_free", &snapshot.highest_gap_free)
            .field("out_of_order", &snapshot.out_of_order)
            .finish()
    }
}
