#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::key::{CounterKey, CounterKind, IndexRef};
use super::snapshot::CountsSnapshot;
use crate::primitives::bytes::{be, buf::Cursor};
use crate::types::{IndexId, LabelId, PropId, Result, SombraError, TypeId, MAX_TX_ID};

/// Length of the `tx_id | entry_count` prefix.
pub const SNAPSHOT_HEADER_LEN: usize = 8 + 4;

/// Key scheme used for index counters on the wire.
///
/// The body layout carries no version of its own; the version travels out of band
/// (see the snapshot envelope) and must be known before decoding.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// Index counters keyed by `label: i32, property_key: i32`.
    V1,
    /// Index counters keyed by `index_id: i64`.
    #[default]
    V2,
}

impl FormatVersion {
    /// Numeric version stored in the envelope header.
    pub const fn as_u16(self) -> u16 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    fn index_key_len(self) -> usize {
        match self {
            FormatVersion::V1 => 4 + 4,
            FormatVersion::V2 => 8,
        }
    }
}

impl TryFrom<u16> for FormatVersion {
    type Error = SombraError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            _ => Err(SombraError::Corruption("unknown counts format version")),
        }
    }
}

/// Binary codec for [`CountsSnapshot`].
///
/// Layout, big-endian:
///
/// ```text
/// tx_id       : i64
/// entry_count : i32
/// entry_count × { tag: u8, key fields, arity × i64 }
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotCodec {
    format: FormatVersion,
}

impl SnapshotCodec {
    /// Codec for the given key scheme.
    pub const fn new(format: FormatVersion) -> Self {
        Self { format }
    }

    /// Codec for the current (`index_id`) scheme.
    pub const fn current() -> Self {
        Self::new(FormatVersion::V2)
    }

    /// Codec for the legacy (`label, property_key`) scheme.
    pub const fn legacy() -> Self {
        Self::new(FormatVersion::V1)
    }

    /// Key scheme of this codec.
    pub const fn format(&self) -> FormatVersion {
        self.format
    }

    /// Exact number of bytes [`encode`](Self::encode) produces for `snapshot`.
    pub fn encoded_len(&self, snapshot: &CountsSnapshot) -> usize {
        SNAPSHOT_HEADER_LEN
            + snapshot
                .iter()
                .map(|(key, _)| 1 + self.key_len(key) + key.arity() * 8)
                .sum::<usize>()
    }

    /// Serializes `snapshot` into a fresh buffer.
    pub fn encode(&self, snapshot: &CountsSnapshot) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(snapshot, &mut out)?;
        Ok(out)
    }

    /// Appends the encoding of `snapshot` to `out`.
    ///
    /// The whole snapshot is validated first; on error `out` is left untouched.
    pub fn encode_into(&self, snapshot: &CountsSnapshot, out: &mut Vec<u8>) -> Result<()> {
        self.check_encodable(snapshot)?;
        out.reserve(self.encoded_len(snapshot));
        be::put_i64(out, snapshot.tx_id() as i64);
        be::put_i32(out, snapshot.len() as i32);
        for (key, values) in snapshot.iter() {
            be::put_u8(out, key.kind().tag());
            self.put_key_fields(out, key);
            for value in values {
                be::put_i64(out, *value);
            }
        }
        trace!(
            tx_id = snapshot.tx_id(),
            entries = snapshot.len(),
            format = ?self.format,
            "counts.codec.encoded"
        );
        Ok(())
    }

    /// Serializes `snapshot` to `writer`. Nothing is written if validation fails.
    pub fn write_to<W: Write>(&self, snapshot: &CountsSnapshot, mut writer: W) -> Result<()> {
        let bytes = self.encode(snapshot)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Decodes a snapshot that must span all of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> Result<CountsSnapshot> {
        let mut cursor = Cursor::new(bytes);
        let snapshot = self.decode_body(&mut cursor)?;
        if !cursor.is_exhausted() {
            return Err(SombraError::Corruption("trailing bytes after counts snapshot"));
        }
        Ok(snapshot)
    }

    /// Decodes one snapshot from `reader`, consuming exactly its bytes.
    pub fn read_from<R: Read>(&self, reader: R) -> Result<CountsSnapshot> {
        self.decode_body(&mut ReadSource(reader))
    }

    fn check_encodable(&self, snapshot: &CountsSnapshot) -> Result<()> {
        if snapshot.tx_id() > MAX_TX_ID {
            return Err(SombraError::Invalid("transaction id exceeds wire range"));
        }
        if snapshot.len() > i32::MAX as usize {
            return Err(SombraError::Invalid("too many counter entries for one snapshot"));
        }
        for (key, values) in snapshot.iter() {
            key.check_arity(values)?;
            match (self.format, key.index_ref()) {
                (FormatVersion::V2, Some(IndexRef::Legacy { .. })) => {
                    return Err(SombraError::Invalid(
                        "legacy index key in current-format snapshot",
                    ));
                }
                (FormatVersion::V1, Some(IndexRef::Id(_))) => {
                    return Err(SombraError::Invalid("index id key in legacy-format snapshot"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn key_len(&self, key: &CounterKey) -> usize {
        match key.kind() {
            CounterKind::Node => 4,
            CounterKind::Relationship => 4 * 3,
            CounterKind::IndexStatistics | CounterKind::IndexSample => self.format.index_key_len(),
        }
    }

    fn put_key_fields(&self, out: &mut Vec<u8>, key: &CounterKey) {
        match key {
            CounterKey::Node { label } => be::put_i32(out, label.0),
            CounterKey::Relationship {
                start,
                rel_type,
                end,
            } => {
                be::put_i32(out, start.0);
                be::put_i32(out, rel_type.0);
                be::put_i32(out, end.0);
            }
            CounterKey::IndexStatistics { index } | CounterKey::IndexSample { index } => {
                match index {
                    IndexRef::Id(id) => be::put_i64(out, id.0),
                    IndexRef::Legacy {
                        label,
                        property_key,
                    } => {
                        be::put_i32(out, label.0);
                        be::put_i32(out, property_key.0);
                    }
                }
            }
        }
    }

    fn decode_body<S: ByteSource>(&self, src: &mut S) -> Result<CountsSnapshot> {
        let tx_id = src.i64()?;
        if tx_id < 0 {
            return Err(SombraError::Corruption("negative transaction id in counts snapshot"));
        }
        let count = src.i32()?;
        if count < 0 {
            return Err(SombraError::Corruption("negative entry count in counts snapshot"));
        }
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let kind = CounterKind::try_from(src.u8()?)?;
            let key = self.read_key(kind, src)?;
            let mut values = Vec::with_capacity(kind.arity());
            for _ in 0..kind.arity() {
                values.push(src.i64()?);
            }
            if entries.insert(key, values).is_some() {
                return Err(SombraError::Corruption("duplicate counter key in counts snapshot"));
            }
        }
        Ok(CountsSnapshot::new(tx_id as u64, entries))
    }

    fn read_key<S: ByteSource>(&self, kind: CounterKind, src: &mut S) -> Result<CounterKey> {
        Ok(match kind {
            CounterKind::Node => CounterKey::Node {
                label: LabelId(src.i32()?),
            },
            CounterKind::Relationship => CounterKey::Relationship {
                start: LabelId(src.i32()?),
                rel_type: TypeId(src.i32()?),
                end: LabelId(src.i32()?),
            },
            CounterKind::IndexStatistics => CounterKey::IndexStatistics {
                index: self.read_index_ref(src)?,
            },
            CounterKind::IndexSample => CounterKey::IndexSample {
                index: self.read_index_ref(src)?,
            },
        })
    }

    fn read_index_ref<S: ByteSource>(&self, src: &mut S) -> Result<IndexRef> {
        Ok(match self.format {
            FormatVersion::V2 => IndexRef::Id(IndexId(src.i64()?)),
            FormatVersion::V1 => IndexRef::Legacy {
                label: LabelId(src.i32()?),
                property_key: PropId(src.i32()?),
            },
        })
    }
}

fn truncated() -> SombraError {
    SombraError::Corruption("counts snapshot truncated")
}

/// Fixed-width big-endian reads over either a slice or a stream.
trait ByteSource {
    fn fill(&mut self, dst: &mut [u8]) -> Result<()>;

    fn u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    fn i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }
}

impl ByteSource for Cursor<'_> {
    fn fill(&mut self, dst: &mut [u8]) -> Result<()> {
        let src = self.take(dst.len()).ok_or_else(truncated)?;
        dst.copy_from_slice(src);
        Ok(())
    }
}

struct ReadSource<R>(R);

impl<R: Read> ByteSource for ReadSource<R> {
    fn fill(&mut self, dst: &mut [u8]) -> Result<()> {
        self.0.read_exact(dst).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => truncated(),
            _ => SombraError::Io(err),
        })
    }
}
