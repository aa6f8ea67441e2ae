//! Data file records: headers, tags and event definitions.

use super::{encode_name, names_match, ByteReader, TypeCode, NAME_LENGTH};
use crate::error::{HistoryError, Result};
use std::io::{Read, Write};

/// Kind of a data file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Event definition: event name plus packed tag array.
    Definition,
    /// One sample of a defined event.
    Data,
}

impl RecordKind {
    /// Magic value of a definition record ("HSDF").
    pub const DEFINITION_MAGIC: u32 = 0x4644_5348;

    /// Magic value of a data record ("HSDA").
    pub const DATA_MAGIC: u32 = 0x4144_5348;

    /// Creates a RecordKind from its magic value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            Self::DEFINITION_MAGIC => Some(Self::Definition),
            Self::DATA_MAGIC => Some(Self::Data),
            _ => None,
        }
    }

    /// Returns the magic value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Definition => Self::DEFINITION_MAGIC,
            Self::Data => Self::DATA_MAGIC,
        }
    }
}

/// Header preceding every record in a data file (20 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record kind.
    pub kind: RecordKind,
    /// Event the record belongs to.
    pub event_id: u32,
    /// Unix time in seconds.
    pub time: u32,
    /// Offset of the definition record that applies to this record.
    pub def_offset: u32,
    /// Payload size in bytes. For definitions this counts the tag array only.
    pub payload_size: u32,
}

impl RecordHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    /// Creates a definition header. `offset` is where the record itself starts.
    pub fn definition(event_id: u32, time: u32, offset: u32, tags_size: u32) -> Self {
        Self {
            kind: RecordKind::Definition,
            event_id,
            time,
            def_offset: offset,
            payload_size: tags_size,
        }
    }

    /// Creates a data header.
    pub fn data(event_id: u32, time: u32, def_offset: u32, payload_size: u32) -> Self {
        Self {
            kind: RecordKind::Data,
            event_id,
            time,
            def_offset,
            payload_size,
        }
    }

    /// Total length of the record on disk, header included.
    pub fn record_len(&self) -> u64 {
        let body = match self.kind {
            RecordKind::Definition => NAME_LENGTH as u64 + self.payload_size as u64,
            RecordKind::Data => self.payload_size as u64,
        };
        Self::SIZE as u64 + body
    }

    /// Encodes the header.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.kind.as_u32().to_le_bytes());
        buf[4..8].copy_from_slice(&self.event_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.time.to_le_bytes());
        buf[12..16].copy_from_slice(&self.def_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.payload_size.to_le_bytes());
        buf
    }

    /// Decodes a header from the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Corrupt` if `bytes` is shorter than a header or
    /// the kind is not a known magic value.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.u32("record kind")?;
        let kind = RecordKind::from_u32(magic)
            .ok_or_else(|| HistoryError::Corrupt(format!("unknown record kind {:#010x}", magic)))?;
        Ok(Self {
            kind,
            event_id: reader.u32("event id")?,
            time: reader.u32("record time")?,
            def_offset: reader.u32("definition offset")?,
            payload_size: reader.u32("payload size")?,
        })
    }

    /// Writes the header using little-endian byte order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads a header using little-endian byte order.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }
}

/// A named, typed field of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name, at most 31 bytes on disk.
    pub name: String,
    /// Element type.
    pub type_code: TypeCode,
    /// Number of elements; for strings the byte length.
    pub count: u32,
}

impl Tag {
    /// Encoded size in bytes.
    pub const SIZE: usize = NAME_LENGTH + 8;

    /// Creates a new tag.
    pub fn new(name: impl Into<String>, type_code: TypeCode, count: u32) -> Self {
        Self {
            name: name.into(),
            type_code,
            count,
        }
    }

    /// Width of one addressable element.
    pub fn element_width(&self) -> usize {
        match self.type_code {
            TypeCode::String => self.count as usize,
            code => code.element_size(),
        }
    }

    /// Bytes the tag occupies in a sample.
    pub fn byte_size(&self) -> usize {
        match self.type_code {
            TypeCode::String => self.count as usize,
            code => code.element_size() * self.count as usize,
        }
    }

    /// Encodes the tag as a packed 40-byte record.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..NAME_LENGTH].copy_from_slice(&encode_name(&self.name));
        buf[NAME_LENGTH..NAME_LENGTH + 4].copy_from_slice(&self.type_code.as_u32().to_le_bytes());
        buf[NAME_LENGTH + 4..].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decodes a packed tag record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let name = reader.name("tag name")?;
        let raw_type = reader.u32("tag type")?;
        let type_code = TypeCode::from_u32(raw_type).ok_or_else(|| {
            HistoryError::Corrupt(format!("tag {:?} has unknown type code {}", name, raw_type))
        })?;
        let count = reader.u32("tag count")?;
        Ok(Self {
            name,
            type_code,
            count,
        })
    }
}

/// Where one addressed element lives inside a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// Position of the tag in the definition.
    pub tag_index: usize,
    /// Element type.
    pub type_code: TypeCode,
    /// Byte offset of the element from the start of the payload.
    pub offset: usize,
    /// Element width in bytes.
    pub size: usize,
}

/// Schema of an event: its name and ordered tag list.
///
/// The sample layout is the concatenation of every tag's elements in order.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::format::{EventDefinition, Tag, TypeCode};
///
/// let def = EventDefinition::new(1, "Temp", vec![
///     Tag::new("T", TypeCode::Float, 1),
///     Tag::new("V", TypeCode::Double, 4),
/// ]);
/// assert_eq!(def.sample_size(), 36);
/// let field = def.locate("v", 2)?;
/// assert_eq!(field.offset, 4 + 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefinition {
    /// Event id.
    pub event_id: u32,
    /// Event name, at most 31 bytes on disk.
    pub name: String,
    /// Ordered tags.
    pub tags: Vec<Tag>,
}

impl EventDefinition {
    /// Creates a new definition.
    pub fn new(event_id: u32, name: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            event_id,
            name: name.into(),
            tags,
        }
    }

    /// Size of one sample in bytes.
    pub fn sample_size(&self) -> usize {
        self.tags.iter().map(Tag::byte_size).sum()
    }

    /// Encodes the packed tag array.
    pub fn tags_to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.tags.len() * Tag::SIZE);
        for tag in &self.tags {
            buf.extend_from_slice(&tag.to_bytes());
        }
        buf
    }

    /// Decodes a packed tag array.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Corrupt` if the length is not a whole number of
    /// tags or a tag carries an unknown type code.
    pub fn tags_from_bytes(bytes: &[u8]) -> Result<Vec<Tag>> {
        if bytes.len() % Tag::SIZE != 0 {
            return Err(HistoryError::Corrupt(format!(
                "tag array of {} bytes is not a multiple of {}",
                bytes.len(),
                Tag::SIZE
            )));
        }
        bytes.chunks_exact(Tag::SIZE).map(Tag::from_bytes).collect()
    }

    /// Encodes a complete definition record starting at `offset`.
    pub fn to_record(&self, time: u32, offset: u32) -> Vec<u8> {
        let tags = self.tags_to_bytes();
        let header = RecordHeader::definition(self.event_id, time, offset, tags.len() as u32);
        let mut buf = Vec::with_capacity(header.record_len() as usize);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&encode_name(&self.name));
        buf.extend_from_slice(&tags);
        buf
    }

    /// Reads a definition record, header included.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Corrupt` if the record is not a definition of a
    /// plausible size.
    pub fn read_from<R: Read>(reader: &mut R, max_size: u32) -> Result<(RecordHeader, Self)> {
        let header = RecordHeader::read_from(reader)?;
        if header.kind != RecordKind::Definition {
            return Err(HistoryError::Corrupt(format!(
                "expected definition record for event {}, found data record",
                header.event_id
            )));
        }
        if header.payload_size >= max_size {
            return Err(HistoryError::Corrupt(format!(
                "definition of event {} claims {} bytes",
                header.event_id, header.payload_size
            )));
        }
        let mut body = vec![0u8; NAME_LENGTH + header.payload_size as usize];
        reader.read_exact(&mut body)?;
        let mut bytes = ByteReader::new(&body);
        let name = bytes.name("event name")?;
        let tags = Self::tags_from_bytes(bytes.take(header.payload_size as usize, "tag array")?)?;
        Ok((header, Self::new(header.event_id, name, tags)))
    }

    /// Finds a tag by name, ignoring ASCII case.
    pub fn find_tag(&self, name: &str) -> Option<(usize, &Tag)> {
        self.tags
            .iter()
            .enumerate()
            .find(|(_, tag)| names_match(&tag.name, name))
    }

    /// Byte offset of every tag within a sample.
    pub fn tag_offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.tags
            .iter()
            .map(|tag| {
                let start = offset;
                offset += tag.byte_size();
                start
            })
            .collect()
    }

    /// Locates element `index` of tag `name` within a sample.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedVariable` if no tag has that name, and
    /// `HistoryError::WrongIndex` if `index` is not below the tag's count.
    pub fn locate(&self, name: &str, index: u32) -> Result<FieldLayout> {
        let (tag_index, tag) = self.find_tag(name).ok_or_else(|| HistoryError::UndefinedVariable {
            event_id: self.event_id,
            tag: name.to_string(),
        })?;
        if index >= tag.count {
            return Err(HistoryError::WrongIndex {
                tag: tag.name.clone(),
                index,
                count: tag.count,
            });
        }
        let preceding: usize = self.tags[..tag_index].iter().map(Tag::byte_size).sum();
        let size = tag.element_width();
        Ok(FieldLayout {
            tag_index,
            type_code: tag.type_code,
            offset: preceding + size * index as usize,
            size,
        })
    }
}
