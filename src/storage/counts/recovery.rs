//! Opening a store from its checkpoint file, with a full rebuild as fallback.
//!
//! A checkpoint is trusted only when it decodes cleanly and sits exactly at the
//! last committed transaction. Otherwise the caller's [`Rebuilder`] recomputes
//! every counter and the result replaces the file.

use std::fmt;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use super::diff::CountsDiff;
use super::envelope::{read_file, write_file};
use super::options::CountsOptions;
use super::snapshot::CountsSnapshot;
use super::store::VersionedCountsStore;
use crate::types::{Result, SombraError, TxId};

/// Source of truth used when the checkpoint cannot be trusted.
pub trait Rebuilder {
    /// Transaction id the opened store must be consistent with.
    fn last_committed_tx_id(&self) -> TxId;

    /// Adds every counter as of [`last_committed_tx_id`](Self::last_committed_tx_id)
    /// into `counts`.
    fn rebuild(&self, counts: &mut CountsDiff) -> Result<()>;
}

/// Why a checkpoint was discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebuildReason {
    /// No checkpoint file exists yet.
    Missing,
    /// The file failed envelope or body validation.
    Corrupt(&'static str),
    /// The file is intact but belongs to a different transaction.
    TxMismatch {
        /// Transaction id stored in the file.
        persisted: TxId,
        /// Last committed transaction reported by the rebuilder.
        expected: TxId,
    },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Missing => f.write_str("checkpoint missing"),
            RebuildReason::Corrupt(what) => write!(f, "checkpoint corrupt: {what}"),
            RebuildReason::TxMismatch {
                persisted,
                expected,
            } => write!(f, "checkpoint at tx {persisted}, expected {expected}"),
        }
    }
}

/// How [`open_or_rebuild`] produced its store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Seeded from the checkpoint file.
    Restored,
    /// Recomputed by the rebuilder; the file now holds the rebuilt counts.
    Rebuilt(RebuildReason),
}

/// Opens the store persisted at `path`, rebuilding it when the file is missing,
/// corrupt, or not at `rebuilder.last_committed_tx_id()`.
///
/// After a rebuild the fresh counts are written back to `path` in the configured
/// format. I/O failures other than a missing file are returned unchanged.
pub fn open_or_rebuild(
    path: impl AsRef<Path>,
    rebuilder: &dyn Rebuilder,
    options: CountsOptions,
) -> Result<(VersionedCountsStore, OpenOutcome)> {
    let path = path.as_ref();
    let expected = rebuilder.last_committed_tx_id();
    let reason = match read_file(path) {
        Ok((_, snapshot)) if snapshot.tx_id() == expected => {
            info!(
                path = %path.display(),
                tx_id = expected,
                entries = snapshot.len(),
                "counts.store.opened"
            );
            let store = VersionedCountsStore::from_snapshot(snapshot, options)?;
            return Ok((store, OpenOutcome::Restored));
        }
        Ok((_, snapshot)) => RebuildReason::TxMismatch {
            persisted: snapshot.tx_id(),
            expected,
        },
        Err(SombraError::Io(err)) if err.kind() == io::ErrorKind::NotFound => RebuildReason::Missing,
        Err(SombraError::Corruption(what)) => RebuildReason::Corrupt(what),
        Err(err) => return Err(err),
    };
    warn!(path = %path.display(), reason = %reason, "counts.store.rebuilding");

    let mut counts = CountsDiff::new();
    rebuilder.rebuild(&mut counts)?;
    let entries = counts
        .iter()
        .map(|(key, values)| (*key, values.to_vec()))
        .collect();
    let snapshot = CountsSnapshot::new(expected, entries);
    write_file(path, &snapshot, options.format_version)?;
    let store = VersionedCountsStore::from_snapshot(snapshot, options)?;
    info!(
        path = %path.display(),
        tx_id = expected,
        entries = store.len(),
        "counts.store.rebuilt"
    );
    Ok((store, OpenOutcome::Rebuilt(reason)))
}
