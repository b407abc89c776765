//! Versioned aggregate counts for the Sombra graph database.
//!
//! The crate keeps node, relationship and index statistics that advance with
//! every committed transaction, can be copied as of any gap-free transaction id
//! and round-trip through a compact big-endian snapshot format.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use storage::counts::{
    CounterKey, CountsDiff, CountsOptions, CountsSnapshot, FormatVersion, SnapshotCodec,
    VersionedCountsStore,
};
pub use types::{IndexId, LabelId, PropId, Result, SombraError, TxId, TypeId, MAX_TX_ID};
