#![forbid(unsafe_code)]
//! Versioned, checksummed frame around a counts snapshot body.
//!
//! ```text
//! magic "SOMC" (4) | format_version u16 | reserved u16 | body_len u32 | body_crc32 u32 | body
//! ```
//!
//! All integers are big-endian. The format version selects the key scheme the
//! body is decoded with.

use std::convert::TryFrom;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::codec::{FormatVersion, SnapshotCodec};
use super::snapshot::CountsSnapshot;
use crate::primitives::bytes::{be, buf::Cursor};
use crate::types::checksum::body_crc32;
use crate::types::{Result, SombraError};

/// Leading bytes of every framed snapshot.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"SOMC";
/// Size of the fixed header preceding the body.
pub const ENVELOPE_HEADER_LEN: usize = 16;

/// Decoded envelope header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Key scheme of the body.
    pub format: FormatVersion,
    /// Body length in bytes.
    pub body_len: u32,
    /// CRC32 of the format version followed by the body.
    pub body_crc32: u32,
}

impl EnvelopeHeader {
    /// Header describing `body` encoded with `format`.
    pub fn for_body(format: FormatVersion, body: &[u8]) -> Result<Self> {
        let body_len =
            u32::try_from(body.len()).map_err(|_| SombraError::Invalid("counts snapshot too large to frame"))?;
        Ok(Self {
            format,
            body_len,
            body_crc32: body_crc32(format.as_u16(), body),
        })
    }

    /// Appends the header bytes to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ENVELOPE_MAGIC);
        be::put_u16(out, self.format.as_u16());
        be::put_u16(out, 0);
        be::put_u32(out, self.body_len);
        be::put_u32(out, self.body_crc32);
    }

    /// Parses a header from the first [`ENVELOPE_HEADER_LEN`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let magic = cursor
            .take(ENVELOPE_MAGIC.len())
            .ok_or(SombraError::Corruption("counts envelope truncated"))?;
        if magic != &ENVELOPE_MAGIC[..] {
            return Err(SombraError::Corruption("counts envelope magic mismatch"));
        }
        let version = read(cursor.get_u16())?;
        let reserved = read(cursor.get_u16())?;
        let body_len = read(cursor.get_u32())?;
        let body_crc32 = read(cursor.get_u32())?;
        let format = FormatVersion::try_from(version)?;
        if reserved != 0 {
            return Err(SombraError::Corruption("counts envelope reserved bytes set"));
        }
        Ok(Self {
            format,
            body_len,
            body_crc32,
        })
    }
}

fn read<T>(value: Option<T>) -> Result<T> {
    value.ok_or(SombraError::Corruption("counts envelope truncated"))
}

/// Encodes `snapshot` with `format` and wraps it in an envelope.
pub fn encode_framed(snapshot: &CountsSnapshot, format: FormatVersion) -> Result<Vec<u8>> {
    let codec = SnapshotCodec::new(format);
    let mut body = Vec::with_capacity(codec.encoded_len(snapshot));
    codec.encode_into(snapshot, &mut body)?;
    let header = EnvelopeHeader::for_body(format, &body)?;
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + body.len());
    header.encode(&mut out);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Verifies the envelope around `bytes` and decodes its body.
pub fn decode_framed(bytes: &[u8]) -> Result<(EnvelopeHeader, CountsSnapshot)> {
    let header = EnvelopeHeader::decode(bytes)?;
    let body = &bytes[ENVELOPE_HEADER_LEN..];
    if body.len() != header.body_len as usize {
        return Err(SombraError::Corruption("counts envelope length mismatch"));
    }
    if body_crc32(header.format.as_u16(), body) != header.body_crc32 {
        return Err(SombraError::Corruption("counts envelope checksum mismatch"));
    }
    let snapshot = SnapshotCodec::new(header.format).decode(body)?;
    Ok((header, snapshot))
}

/// Writes a framed snapshot to `path`, replacing any previous file atomically.
pub fn write_file(path: impl AsRef<Path>, snapshot: &CountsSnapshot, format: FormatVersion) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_framed(snapshot, format)?;
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    debug!(
        path = %path.display(),
        tx_id = snapshot.tx_id(),
        entries = snapshot.len(),
        bytes = bytes.len(),
        "counts.envelope.written"
    );
    Ok(())
}

/// Reads and verifies a framed snapshot from `path`.
pub fn read_file(path: impl AsRef<Path>) -> Result<(EnvelopeHeader, CountsSnapshot)> {
    let bytes = fs::read(path.as_ref())?;
    decode_framed(&bytes)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("counts"));
    name.push(".tmp");
    path.with_file_name(name)
}
