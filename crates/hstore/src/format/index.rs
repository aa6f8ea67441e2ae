//! Time index and definition index entries.

use super::{encode_name, ByteReader, NAME_LENGTH};
use crate::error::Result;
use std::io::{Read, Write};

/// Entry of a time index file: where one data record lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeIndexEntry {
    /// Event of the data record.
    pub event_id: u32,
    /// Time of the data record.
    pub time: u32,
    /// Offset of the data record in the day's data file.
    pub offset: u32,
}

impl TimeIndexEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    /// Creates a new entry.
    pub fn new(event_id: u32, time: u32, offset: u32) -> Self {
        Self {
            event_id,
            time,
            offset,
        }
    }

    /// Encodes the entry.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.event_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.time.to_le_bytes());
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        buf
    }

    /// Decodes an entry from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        Ok(Self {
            event_id: reader.u32("index event id")?,
            time: reader.u32("index time")?,
            offset: reader.u32("index offset")?,
        })
    }

    /// Writes the entry using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads an entry using little-endian byte order.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// Entry of a definition index file: where one definition record lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefIndexEntry {
    /// Event id.
    pub event_id: u32,
    /// Event name as stored in the definition.
    pub name: String,
    /// Offset of the definition record in the day's data file.
    pub def_offset: u32,
}

impl DefIndexEntry {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8 + NAME_LENGTH;

    /// Creates a new entry.
    pub fn new(event_id: u32, name: impl Into<String>, def_offset: u32) -> Self {
        Self {
            event_id,
            name: name.into(),
            def_offset,
        }
    }

    /// Encodes the entry.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.event_id.to_le_bytes());
        buf[4..4 + NAME_LENGTH].copy_from_slice(&encode_name(&self.name));
        buf[4 + NAME_LENGTH..].copy_from_slice(&self.def_offset.to_le_bytes());
        buf
    }

    /// Decodes an entry from the start of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        Ok(Self {
            event_id: reader.u32("definition index event id")?,
            name: reader.name("definition index name")?,
            def_offset: reader.u32("definition index offset")?,
        })
    }

    /// Writes the entry using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads an entry using little-endian byte order.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}
