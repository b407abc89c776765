//! Concurrent writers with a checkpoint-style reader.
//!
//! 900 transactions are applied by a 10-thread pool in a shuffled order while a
//! single reader takes snapshots. Every snapshot must cover at least the
//! requested transaction and equal the independently computed prefix sum.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Once};
use std::thread;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sombra_counts::storage::counts::CountsOptions;
use sombra_counts::types::{IndexId, LabelId, TypeId};
use sombra_counts::{CounterKey, CountsDiff, CountsSnapshot, VersionedCountsStore};
use tracing_subscriber::EnvFilter;

const TRANSACTIONS: usize = 900;
const WORKERS: usize = 10;
const SNAPSHOT_BUDGET: Duration = Duration::from_secs(30);

type Entries = BTreeMap<CounterKey, Vec<i64>>;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn random_diff(rng: &mut ChaCha8Rng) -> CountsDiff {
    let mut diff = CountsDiff::new();
    for _ in 0..rng.gen_range(0..5) {
        match rng.gen_range(0..4) {
            0 => {
                diff.node(LabelId(rng.gen_range(-1..6)), rng.gen_range(-3..10));
            }
            1 => {
                let start = if rng.gen_bool(0.3) { LabelId::ANY } else { LabelId(rng.gen_range(0..4)) };
                let end = if rng.gen_bool(0.3) { LabelId::ANY } else { LabelId(rng.gen_range(0..4)) };
                diff.relationship(start, TypeId(rng.gen_range(0..3)), end, rng.gen_range(-2..5));
            }
            2 => {
                diff.add(
                    CounterKey::index_statistics(IndexId(rng.gen_range(0..3))),
                    &[rng.gen_range(0i64..4), rng.gen_range(-2i64..20)],
                );
            }
            _ => {
                diff.add(
                    CounterKey::index_sample(IndexId(rng.gen_range(0..3))),
                    &[rng.gen_range(0i64..10), rng.gen_range(0i64..10)],
                );
            }
        }
    }
    diff
}

fn prefix_sums(diffs: &[CountsDiff]) -> Vec<Entries> {
    let mut sums = Vec::with_capacity(diffs.len() + 1);
    let mut running = Entries::new();
    sums.push(running.clone());
    for diff in diffs {
        for (key, delta) in diff.iter() {
            let slot = running
                .entry(*key)
                .or_insert_with(|| vec![0; key.arity()]);
            for (acc, d) in slot.iter_mut().zip(delta) {
                *acc = acc.wrapping_add(*d);
            }
        }
        sums.push(running.clone());
    }
    sums
}

fn assert_prefix(snapshot: &CountsSnapshot, requested: u64, sums: &[Entries]) {
    let tx = snapshot.tx_id();
    assert!(tx >= requested, "snapshot {tx} is behind request {requested}");
    assert_eq!(
        snapshot.entries(),
        &sums[tx as usize],
        "snapshot at {tx} differs from the sum of diffs 1..={tx}"
    );
}

#[test]
fn shuffled_pool_with_snapshot_reader() {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed_c0de);
    let diffs: Vec<CountsDiff> = (0..TRANSACTIONS).map(|_| random_diff(&mut rng)).collect();
    let sums = prefix_sums(&diffs);

    let mut order: Vec<u64> = (1..=TRANSACTIONS as u64).collect();
    order.shuffle(&mut rng);
    let order = Arc::new(order);
    let diffs = Arc::new(diffs);

    let options = CountsOptions::default().with_wait_poll_interval(Duration::from_millis(1));
    let store = Arc::new(VersionedCountsStore::new(options));
    let next = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(WORKERS + 1));

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let store = Arc::clone(&store);
            let order = Arc::clone(&order);
            let diffs = Arc::clone(&diffs);
            let next = Arc::clone(&next);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut jitter = ChaCha8Rng::seed_from_u64(worker as u64);
                start.wait();
                loop {
                    let slot = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&tx) = order.get(slot) else { break };
                    if jitter.gen_ratio(1, 8) {
                        thread::yield_now();
                    }
                    let diff = diffs[tx as usize - 1].clone();
                    store.update_all(tx, diff).expect("update accepted");
                }
            })
        })
        .collect();

    start.wait();
    let mut checked = 0;
    for requested in (1..=TRANSACTIONS as u64).step_by(53) {
        let snapshot = store
            .snapshot(requested, SNAPSHOT_BUDGET)
            .expect("snapshot within budget");
        assert_prefix(&snapshot, requested, &sums);
        checked += 1;
    }
    for handle in workers {
        handle.join().expect("worker panicked");
    }

    let last = store
        .snapshot(TRANSACTIONS as u64, SNAPSHOT_BUDGET)
        .expect("final snapshot");
    assert_eq!(last.tx_id(), TRANSACTIONS as u64);
    assert_prefix(&last, TRANSACTIONS as u64, &sums);
    assert!(checked > 10);
    assert_eq!(store.sequence_snapshot().out_of_order, Vec::<u64>::new());
}

#[test]
fn latest_snapshots_are_prefix_consistent_under_load() {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let diffs: Vec<CountsDiff> = (0..TRANSACTIONS).map(|_| random_diff(&mut rng)).collect();
    let sums = Arc::new(prefix_sums(&diffs));
    let mut order: Vec<u64> = (1..=TRANSACTIONS as u64).collect();
    order.shuffle(&mut rng);

    let store = Arc::new(VersionedCountsStore::default());
    let chunks: Vec<Vec<(u64, CountsDiff)>> = order
        .chunks(TRANSACTIONS / WORKERS)
        .map(|chunk| {
            chunk
                .iter()
                .map(|&tx| (tx, diffs[tx as usize - 1].clone()))
                .collect()
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let store = Arc::clone(&store);
            let sums = Arc::clone(&sums);
            thread::spawn(move || {
                let mut last = 0;
                while last < TRANSACTIONS as u64 {
                    let snapshot = store.snapshot_latest();
                    assert!(snapshot.tx_id() >= last, "gap-free prefix went backwards");
                    assert_prefix(&snapshot, last, &sums);
                    last = snapshot.tx_id();
                    thread::yield_now();
                }
            })
        })
        .collect();

    let writers: Vec<_> = chunks
        .into_iter()
        .map(|chunk| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for (tx, diff) in chunk {
                    store.update_all(tx, diff).expect("update accepted");
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().expect("writer panicked");
    }
    for handle in readers {
        handle.join().expect("reader panicked");
    }
    assert_eq!(store.tx_id(), TRANSACTIONS as u64);
}

#[test]
fn concurrent_snapshot_callers_each_see_a_prefix() {
    init_tracing();
    const READERS: u64 = 3;
    let mut rng = ChaCha8Rng::seed_from_u64(0xc0ffee);
    let diffs: Vec<CountsDiff> = (0..TRANSACTIONS).map(|_| random_diff(&mut rng)).collect();
    let sums = Arc::new(prefix_sums(&diffs));
    let mut order: Vec<u64> = (1..=TRANSACTIONS as u64).collect();
    order.shuffle(&mut rng);
    let order = Arc::new(order);
    let diffs = Arc::new(diffs);

    let options = CountsOptions::default().with_wait_poll_interval(Duration::from_millis(1));
    let store = Arc::new(VersionedCountsStore::new(options));
    let next = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(WORKERS + READERS as usize));

    let writers: Vec<_> = (0..WORKERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let order = Arc::clone(&order);
            let diffs = Arc::clone(&diffs);
            let next = Arc::clone(&next);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                loop {
                    let slot = next.fetch_add(1, Ordering::Relaxed);
                    let Some(&tx) = order.get(slot) else { break };
                    store
                        .update_all(tx, diffs[tx as usize - 1].clone())
                        .expect("update accepted");
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..READERS)
        .map(|reader| {
            let store = Arc::clone(&store);
            let sums = Arc::clone(&sums);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut taken = 0;
                for requested in (1 + reader * 7..=TRANSACTIONS as u64).step_by(41) {
                    let snapshot = store
                        .snapshot(requested, SNAPSHOT_BUDGET)
                        .expect("snapshot within budget");
                    assert_prefix(&snapshot, requested, &sums);
                    taken += 1;
                }
                taken
            })
        })
        .collect();

    for handle in writers {
        handle.join().expect("writer panicked");
    }
    for handle in readers {
        let taken = handle.join().expect("reader panicked");
        assert!(taken > 10);
    }
    assert_eq!(store.tx_id(), TRANSACTIONS as u64);
}
