#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sombra_counts::storage::counts::{
    open_or_rebuild, read_file, write_file, CountsOptions, EnvelopeHeader, OpenOutcome,
    RebuildReason, Rebuilder, ENVELOPE_HEADER_LEN,
};
use sombra_counts::types::{IndexId, LabelId, TxId, TypeId};
use sombra_counts::{CounterKey, CountsDiff, CountsSnapshot, FormatVersion, VersionedCountsStore};
use tempfile::TempDir;

#[test]
fn checkpoint_file_restores_store() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");

    let store = VersionedCountsStore::default();
    for tx in 1..=20u64 {
        let mut diff = CountsDiff::new();
        diff.node((tx % 3) as i32, 1)
            .relationship(0, 1, (tx % 2) as i32, 1);
        if tx % 5 == 0 {
            diff.add(CounterKey::index_sample(IndexId(1)), &[1, 5]);
        }
        store.update_all(tx, diff)?;
    }
    let snapshot = store.snapshot(20, Duration::from_secs(5))?;
    write_file(&path, &snapshot, FormatVersion::V2)?;
    assert!(!dir.path().join("counts.snap.tmp").exists());

    let (header, restored) = read_file(&path)?;
    assert_eq!(header.format, FormatVersion::V2);
    assert_eq!(restored, snapshot);

    let recovered = VersionedCountsStore::from_snapshot(restored, CountsOptions::default())?;
    assert_eq!(recovered.tx_id(), 20);
    assert_eq!(recovered.index_sample(IndexId(1)), Some((4, 20)));
    let mut diff = CountsDiff::new();
    diff.node(0, 10);
    recovered.update_all(21, diff)?;
    assert_eq!(recovered.node_count(0), snapshot.get(&CounterKey::node(0)).map_or(0, |v| v[0]) + 10);
    Ok(())
}

#[test]
fn rewrite_replaces_previous_file() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    write_file(&path, &CountsSnapshot::empty(1), FormatVersion::V2)?;

    let mut entries = BTreeMap::new();
    entries.insert(CounterKey::node(3), vec![9]);
    let newer = CountsSnapshot::new(7, entries);
    write_file(&path, &newer, FormatVersion::V2)?;
    assert_eq!(read_file(&path)?.1, newer);
    Ok(())
}

#[test]
fn header_describes_body() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let mut entries = BTreeMap::new();
    entries.insert(CounterKey::node(1), vec![1]);
    write_file(&path, &CountsSnapshot::new(2, entries), FormatVersion::V2)?;

    let bytes = fs::read(&path)?;
    let header = EnvelopeHeader::decode(&bytes)?;
    assert_eq!(header.body_len as usize, bytes.len() - ENVELOPE_HEADER_LEN);
    assert_eq!(header.body_len, 8 + 4 + 1 + 4 + 8);
    Ok(())
}

#[test]
fn corrupted_file_is_rejected() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let mut entries = BTreeMap::new();
    entries.insert(CounterKey::node(1), vec![1]);
    write_file(&path, &CountsSnapshot::new(2, entries), FormatVersion::V2)?;

    let mut bytes = fs::read(&path)?;
    let idx = ENVELOPE_HEADER_LEN + 2;
    bytes[idx] ^= 0x01;
    fs::write(&path, &bytes)?;
    let err = read_file(&path).unwrap_err();
    assert!(err.is_corruption(), "unexpected error {err:?}");

    let missing = read_file(dir.path().join("absent.snap")).unwrap_err();
    assert!(matches!(missing, sombra_counts::SombraError::Io(_)));
    Ok(())
}

/// Recomputes counts from a fixed "graph": 4 nodes with label 1, 2 KNOWS edges.
struct FixedGraph {
    last_committed: TxId,
    rebuilds: AtomicUsize,
}

impl FixedGraph {
    fn at(last_committed: TxId) -> Self {
        Self {
            last_committed,
            rebuilds: AtomicUsize::new(0),
        }
    }

    fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }
}

impl Rebuilder for FixedGraph {
    fn last_committed_tx_id(&self) -> TxId {
        self.last_committed
    }

    fn rebuild(&self, counts: &mut CountsDiff) -> sombra_counts::Result<()> {
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        counts
            .node(1, 4)
            .node(LabelId::ANY, 4)
            .relationship(LabelId::ANY, TypeId(0), LabelId::ANY, 2);
        Ok(())
    }
}

fn assert_rebuilt_counts(store: &VersionedCountsStore, tx: TxId) {
    assert_eq!(store.tx_id(), tx);
    assert_eq!(store.node_count(1), 4);
    assert_eq!(store.node_count(LabelId::ANY), 4);
    assert_eq!(store.relationship_count(LabelId::ANY, TypeId(0), LabelId::ANY), 2);
}

#[test]
fn missing_checkpoint_is_rebuilt_and_written() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let graph = FixedGraph::at(12);

    let (store, outcome) = open_or_rebuild(&path, &graph, CountsOptions::default())?;
    assert_eq!(outcome, OpenOutcome::Rebuilt(RebuildReason::Missing));
    assert_rebuilt_counts(&store, 12);
    assert_eq!(graph.rebuilds(), 1);
    assert_eq!(read_file(&path)?.1.tx_id(), 12);

    let (reopened, outcome) = open_or_rebuild(&path, &graph, CountsOptions::default())?;
    assert_eq!(outcome, OpenOutcome::Restored);
    assert_rebuilt_counts(&reopened, 12);
    assert_eq!(graph.rebuilds(), 1);
    Ok(())
}

#[test]
fn checkpoint_at_another_transaction_is_rebuilt() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let store = VersionedCountsStore::default();
    let mut diff = CountsDiff::new();
    diff.node(1, 100);
    store.update_all(1, diff)?;
    store.checkpoint(&path, 1)?;

    let graph = FixedGraph::at(30);
    let (store, outcome) = open_or_rebuild(&path, &graph, CountsOptions::default())?;
    assert_eq!(
        outcome,
        OpenOutcome::Rebuilt(RebuildReason::TxMismatch {
            persisted: 1,
            expected: 30,
        })
    );
    assert_rebuilt_counts(&store, 30);
    store.update_all(31, CountsDiff::new())?;
    assert_eq!(read_file(&path)?.1.tx_id(), 30);
    Ok(())
}

#[test]
fn corrupt_checkpoint_is_rebuilt() -> sombra_counts::Result<()> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let mut entries = BTreeMap::new();
    entries.insert(CounterKey::node(1), vec![9]);
    write_file(&path, &CountsSnapshot::new(8, entries), FormatVersion::V2)?;
    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0x40;
    fs::write(&path, &bytes)?;

    let graph = FixedGraph::at(8);
    let (store, outcome) = open_or_rebuild(&path, &graph, CountsOptions::default())?;
    assert!(
        matches!(outcome, OpenOutcome::Rebuilt(RebuildReason::Corrupt(_))),
        "unexpected outcome {outcome:?}"
    );
    assert_rebuilt_counts(&store, 8);
    assert_eq!(graph.rebuilds(), 1);
    assert!(read_file(&path).is_ok());
    Ok(())
}

#[test]
fn failing_rebuild_leaves_file_untouched() {
    struct Broken;
    impl Rebuilder for Broken {
        fn last_committed_tx_id(&self) -> TxId {
            3
        }
        fn rebuild(&self, _counts: &mut CountsDiff) -> sombra_counts::Result<()> {
            Err(sombra_counts::SombraError::Invalid("graph unavailable"))
        }
    }

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("counts.snap");
    let err = open_or_rebuild(&path, &Broken, CountsOptions::default()).unwrap_err();
    assert!(matches!(err, sombra_counts::SombraError::Invalid(_)));
    assert!(!path.exists());
}
