#![forbid(unsafe_code)]
//! Shared identifiers, error type and checksum helpers.

use std::fmt;
use std::time::Duration;

/// Checksum helpers used by the snapshot envelope.
pub mod checksum;

/// Identifier of a committed write transaction, as assigned by the commit pipeline.
pub type TxId = u64;

/// Largest transaction id a snapshot can carry; the wire format stores it as `i64`.
pub const MAX_TX_ID: TxId = i64::MAX as TxId;

/// Label token id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub i32);

/// Relationship type token id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TypeId(pub i32);

/// Property key token id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropId(pub i32);

/// Schema index id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct IndexId(pub i64);

impl LabelId {
    /// Wildcard label: "any label" on relationship endpoints, "all nodes" for node counts.
    pub const ANY: LabelId = LabelId(-1);

    /// Returns `true` for the wildcard label.
    pub const fn is_any(self) -> bool {
        self.0 == Self::ANY.0
    }
}

impl TypeId {
    /// Wildcard relationship type.
    pub const ANY: TypeId = TypeId(-1);

    /// Returns `true` for the wildcard type.
    pub const fn is_any(self) -> bool {
        self.0 == Self::ANY.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for LabelId {
    fn from(value: i32) -> Self {
        LabelId(value)
    }
}

impl From<i32> for TypeId {
    fn from(value: i32) -> Self {
        TypeId(value)
    }
}

impl From<i32> for PropId {
    fn from(value: i32) -> Self {
        PropId(value)
    }
}

impl From<i64> for IndexId {
    fn from(value: i64) -> Self {
        IndexId(value)
    }
}

/// Errors surfaced by the counts store, its codec and the snapshot envelope.
#[derive(thiserror::Error, Debug)]
pub enum SombraError {
    /// Failure of the byte stream handed to the codec.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// The byte stream does not describe a valid counts snapshot.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller contract violation.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Options that could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A value vector whose length disagrees with its key's fixed arity.
    #[error("arity mismatch for {key}: expected {expected} values, got {actual}")]
    ArityMismatch {
        /// Rendered key the vector belongs to.
        key: String,
        /// Arity fixed by the key variant.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },
    /// A snapshot wait exceeded its caller-supplied budget.
    #[error("timed out after {waited:?} waiting for tx {requested} (reached {reached})")]
    Timeout {
        /// Transaction id the caller asked for.
        requested: TxId,
        /// Highest gap-free transaction id observed when the budget ran out.
        reached: TxId,
        /// Time spent waiting.
        waited: Duration,
    },
}

impl SombraError {
    /// Returns `true` for wait-budget failures, which callers may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SombraError::Timeout { .. })
    }

    /// Returns `true` for errors caused by a damaged byte stream.
    pub fn is_corruption(&self) -> bool {
        matches!(self, SombraError::Corruption(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SombraError>;
