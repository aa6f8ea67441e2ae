//! On-disk format of a day file set.
//!
//! Every calendar day owns three files named after the local date
//! (`YYMMDD.hst`, `YYMMDD.idx`, `YYMMDD.idf`). All integers are little-endian
//! `u32` values.
//!
//! ## Data file (`.hst`)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Record Header (20 bytes)                                     │
//! │  - Kind: "HSDF" (definition) or "HSDA" (data)                 │
//! │  - Event ID, Time, Definition Offset, Payload Size            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Definition payload                                           │
//! │  - Event name (32 bytes, NUL padded; not counted in size)     │
//! │  - Tags: name[32] + type + count (40 bytes each)              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Data payload                                                 │
//! │  - Packed sample bytes, laid out by the active definition     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Time index (`.idx`)
//!
//! One 12-byte [`TimeIndexEntry`] per data record, in write order.
//!
//! ## Definition index (`.idf`)
//!
//! One 40-byte [`DefIndexEntry`] per definition record.

mod index;
mod record;
mod types;

pub use index::{DefIndexEntry, TimeIndexEntry};
pub use record::{EventDefinition, FieldLayout, RecordHeader, RecordKind, Tag};
pub use types::TypeCode;

use crate::error::{HistoryError, Result};

/// Fixed width of event and tag names on disk, including the NUL terminator.
pub const NAME_LENGTH: usize = 32;

/// Encodes a name into its fixed-width, NUL padded field.
///
/// Names longer than `NAME_LENGTH - 1` bytes are truncated on a character
/// boundary so the field always ends with a NUL.
pub fn encode_name(name: &str) -> [u8; NAME_LENGTH] {
    let mut field = [0u8; NAME_LENGTH];
    let mut end = name.len().min(NAME_LENGTH - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&name.as_bytes()[..end]);
    field
}

/// Decodes a fixed-width name field up to its first NUL.
pub fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Compares two names the way tag and event lookups do: ASCII case-insensitive.
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Bounds-checked little-endian reader over a byte slice.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                HistoryError::Corrupt(format!(
                    "{} needs {} bytes at {}, only {} available",
                    what,
                    len,
                    self.pos,
                    self.buf.len().saturating_sub(self.pos)
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn name(&mut self, what: &str) -> Result<String> {
        self.take(NAME_LENGTH, what).map(decode_name)
    }
}
