#![forbid(unsafe_code)]
//! Versioned aggregate counters: per-label node counts, per-pattern relationship
//! counts and per-index statistics.
//!
//! Every committed transaction hands its [`CountsDiff`] to
//! [`VersionedCountsStore::update_all`]. Checkpoints take a
//! [`CountsSnapshot`] consistent with a gap-free transaction id and persist it
//! through [`SnapshotCodec`], optionally framed by the [`envelope`] helpers.
//! Recovery seeds the store from the decoded snapshot, or recomputes it through
//! a [`Rebuilder`] when the checkpoint cannot be trusted.

mod codec;
mod diff;
pub mod envelope;
mod key;
mod metrics;
mod options;
mod recovery;
mod snapshot;
mod store;
mod table;

pub use codec::{FormatVersion, SnapshotCodec, SNAPSHOT_HEADER_LEN};
pub use diff::CountsDiff;
pub use envelope::{
    decode_framed, encode_framed, read_file, write_file, EnvelopeHeader, ENVELOPE_HEADER_LEN,
    ENVELOPE_MAGIC,
};
pub use key::{CounterKey, CounterKind, IndexRef, MAX_ARITY};
pub use metrics::{default_metrics, CounterMetrics, CountsMetrics, NoopMetrics};
pub use options::CountsOptions;
pub use recovery::{open_or_rebuild, OpenOutcome, RebuildReason, Rebuilder};
pub use snapshot::CountsSnapshot;
pub use store::VersionedCountsStore;
pub use table::{AggregateTable, CounterValues};
