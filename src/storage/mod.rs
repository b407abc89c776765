//! Storage-side statistics kept alongside the graph.
//!
//! Hosts the versioned counts store that answers "how many nodes carry label X"
//! without scanning primary storage.

/// Versioned aggregate counts and their snapshot format.
pub mod counts;

pub use counts::{
    CounterKey, CountsDiff, CountsOptions, CountsSnapshot, FormatVersion, SnapshotCodec,
    VersionedCountsStore,
};
