use std::convert::TryFrom;
use std::fmt;

use crate::types::{IndexId, LabelId, PropId, SombraError, TypeId};

/// Largest arity of any counter variant.
pub const MAX_ARITY: usize = 2;

/// Counter category, doubling as the wire tag of a [`CounterKey`].
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CounterKind {
    /// Nodes carrying a label.
    Node = 1,
    /// Relationships matching a (start label, type, end label) triple.
    Relationship = 2,
    /// Index updates since last sample and index size.
    IndexStatistics = 3,
    /// Unique values and sample size of the last index sample.
    IndexSample = 4,
}

impl CounterKind {
    /// Wire tag of the category.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Number of 64-bit counters a key of this category holds.
    pub const fn arity(self) -> usize {
        match self {
            CounterKind::Node | CounterKind::Relationship => 1,
            CounterKind::IndexStatistics | CounterKind::IndexSample => 2,
        }
    }

    /// Short lowercase name used in logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            CounterKind::Node => "node",
            CounterKind::Relationship => "relationship",
            CounterKind::IndexStatistics => "index_statistics",
            CounterKind::IndexSample => "index_sample",
        }
    }
}

impl TryFrom<u8> for CounterKind {
    type Error = SombraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CounterKind::Node),
            2 => Ok(CounterKind::Relationship),
            3 => Ok(CounterKind::IndexStatistics),
            4 => Ok(CounterKind::IndexSample),
            _ => Err(SombraError::Corruption("unknown counter key tag")),
        }
    }
}

/// How an index counter names its index.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum IndexRef {
    /// Schema index id (current scheme).
    Id(IndexId),
    /// Label and property key pair (legacy scheme).
    Legacy {
        /// Indexed label.
        label: LabelId,
        /// Indexed property key.
        property_key: PropId,
    },
}

impl From<IndexId> for IndexRef {
    fn from(id: IndexId) -> Self {
        IndexRef::Id(id)
    }
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRef::Id(id) => write!(f, "index={id}"),
            IndexRef::Legacy {
                label,
                property_key,
            } => write!(f, "label={label}, property_key={property_key}"),
        }
    }
}

/// Identifier of a single statistic slot.
///
/// The variant fixes the length of the slot's value vector, see [`CounterKey::arity`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CounterKey {
    /// Node count for a label (`LabelId::ANY` counts all nodes).
    Node {
        /// Label the count applies to.
        label: LabelId,
    },
    /// Relationship count for a (start, type, end) triple, any part may be a wildcard.
    Relationship {
        /// Label of the start node.
        start: LabelId,
        /// Relationship type.
        rel_type: TypeId,
        /// Label of the end node.
        end: LabelId,
    },
    /// `[updates since sample, index size]`.
    IndexStatistics {
        /// Index the statistics describe.
        index: IndexRef,
    },
    /// `[unique values, sample size]`.
    IndexSample {
        /// Index the sample describes.
        index: IndexRef,
    },
}

impl CounterKey {
    /// Node count key.
    pub fn node(label: impl Into<LabelId>) -> Self {
        CounterKey::Node {
            label: label.into(),
        }
    }

    /// Relationship count key.
    pub fn relationship(
        start: impl Into<LabelId>,
        rel_type: impl Into<TypeId>,
        end: impl Into<LabelId>,
    ) -> Self {
        CounterKey::Relationship {
            start: start.into(),
            rel_type: rel_type.into(),
            end: end.into(),
        }
    }

    /// Index statistics key.
    pub fn index_statistics(index: impl Into<IndexRef>) -> Self {
        CounterKey::IndexStatistics {
            index: index.into(),
        }
    }

    /// Index sample key.
    pub fn index_sample(index: impl Into<IndexRef>) -> Self {
        CounterKey::IndexSample {
            index: index.into(),
        }
    }

    /// Category of the key.
    pub const fn kind(&self) -> CounterKind {
        match self {
            CounterKey::Node { .. } => CounterKind::Node,
            CounterKey::Relationship { .. } => CounterKind::Relationship,
            CounterKey::IndexStatistics { .. } => CounterKind::IndexStatistics,
            CounterKey::IndexSample { .. } => CounterKind::IndexSample,
        }
    }

    /// Fixed number of counters held by this key.
    pub const fn arity(&self) -> usize {
        self.kind().arity()
    }

    /// Index reference for index keys, `None` otherwise.
    pub const fn index_ref(&self) -> Option<IndexRef> {
        match self {
            CounterKey::IndexStatistics { index } | CounterKey::IndexSample { index } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Fails with [`SombraError::ArityMismatch`] unless `values` fits this key.
    pub fn check_arity(&self, values: &[i64]) -> Result<(), SombraError> {
        if values.len() == self.arity() {
            return Ok(());
        }
        Err(SombraError::ArityMismatch {
            key: self.to_string(),
            expected: self.arity(),
            actual: values.len(),
        })
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKey::Node { label } => write!(f, "node(label={label})"),
            CounterKey::Relationship {
                start,
                rel_type,
                end,
            } => write!(f, "relationship(({start})-[{rel_type}]->({end}))"),
            CounterKey::IndexStatistics { index } => write!(f, "index_statistics({index})"),
            CounterKey::IndexSample { index } => write!(f, "index_sample({index})"),
        }
    }
}
