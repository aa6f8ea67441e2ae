//! Index regeneration.
//!
//! A day's `.idx` and `.idf` are derived data: both can be rebuilt from the
//! `.hst` record log alone. [`RecordScanner`] walks the log record by record
//! and, when the bytes at the current position do not form a plausible
//! record, advances one byte at a time until they do.

use super::io::OpenMode;
use super::{day_of, FileKind, HistoryStore};
use crate::error::{FileOp, HistoryError, Result};
use crate::format::{
    decode_name, DefIndexEntry, RecordHeader, RecordKind, Tag, TimeIndexEntry, NAME_LENGTH,
};
use chrono::NaiveDate;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use tracing::{debug, error, info};

/// Progress of a [`RecordScanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Reading well-formed records.
    Scanning,
    /// Skipping bytes after an implausible record header.
    Resyncing,
    /// Reading well-formed records again after skipping corrupt bytes.
    Resynced,
    /// The log ended while skipping corrupt bytes.
    GaveUp,
}

/// A record located by a [`RecordScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedRecord {
    /// Definition record with its event name.
    Definition {
        /// Offset of the record.
        offset: u32,
        /// Record header.
        header: RecordHeader,
        /// Event name stored after the header.
        name: String,
    },
    /// Data record.
    Data {
        /// Offset of the record.
        offset: u32,
        /// Record header.
        header: RecordHeader,
    },
}

/// Sequential reader of a data file that survives corrupt byte ranges.
///
/// A header is plausible when its kind is known, it fits in the file, and
/// its payload size is below the bound: data payloads must be larger than
/// one byte and definition payloads a whole number of tags.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::store::{RecordScanner, ScannedRecord};
///
/// let mut scanner = RecordScanner::new(std::fs::File::open("240309.hst")?, 1 << 20)?;
/// while let Some(record) = scanner.next_record()? {
///     if let ScannedRecord::Data { offset, header } = record {
///         println!("{} @ {}: event {}", header.time, offset, header.event_id);
///     }
/// }
/// ```
pub struct RecordScanner<R> {
    reader: BufReader<R>,
    len: u64,
    pos: u64,
    max_record_size: u32,
    state: ScanState,
    skipped: u64,
    corruption_logged: bool,
}

impl<R: Read + Seek> RecordScanner<R> {
    /// Creates a scanner positioned at the start of `inner`.
    pub fn new(mut inner: R, max_record_size: u32) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader: BufReader::new(inner),
            len,
            pos: 0,
            max_record_size,
            state: ScanState::Scanning,
            skipped: 0,
            corruption_logged: false,
        })
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of bytes skipped as corrupt so far.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Returns the next plausible record, or None at the end of the log.
    pub fn next_record(&mut self) -> io::Result<Option<ScannedRecord>> {
        loop {
            if self.pos + RecordHeader::SIZE as u64 > self.len {
                if self.pos < self.len {
                    self.note_corruption();
                    self.skipped += self.len - self.pos;
                    self.state = ScanState::GaveUp;
                } else if self.state == ScanState::Resyncing {
                    self.state = ScanState::GaveUp;
                }
                self.pos = self.len;
                return Ok(None);
            }
            let Ok(offset) = u32::try_from(self.pos) else {
                debug!(pos = self.pos, "data file exceeds 32-bit offsets, stopping scan");
                return Ok(None);
            };

            let mut buf = [0u8; RecordHeader::SIZE];
            self.reader.read_exact(&mut buf)?;

            let Some(header) = self.plausible(&buf) else {
                self.note_corruption();
                self.state = ScanState::Resyncing;
                self.reader.seek_relative(1 - RecordHeader::SIZE as i64)?;
                self.pos += 1;
                self.skipped += 1;
                continue;
            };

            let record = match header.kind {
                RecordKind::Definition => {
                    let mut name = [0u8; NAME_LENGTH];
                    self.reader.read_exact(&mut name)?;
                    self.reader.seek_relative(i64::from(header.payload_size))?;
                    ScannedRecord::Definition {
                        offset,
                        header,
                        name: decode_name(&name),
                    }
                }
                RecordKind::Data => {
                    self.reader.seek_relative(i64::from(header.payload_size))?;
                    ScannedRecord::Data { offset, header }
                }
            };
            self.pos += header.record_len();
            if self.state == ScanState::Resyncing {
                debug!(offset, skipped = self.skipped, "resynchronized on record boundary");
                self.state = ScanState::Resynced;
            }
            return Ok(Some(record));
        }
    }

    fn plausible(&self, buf: &[u8]) -> Option<RecordHeader> {
        let header = RecordHeader::from_bytes(buf).ok()?;
        let size_ok = match header.kind {
            RecordKind::Definition => header.payload_size as usize % Tag::SIZE == 0,
            RecordKind::Data => header.payload_size > 1,
        };
        let fits = self.pos + header.record_len() <= self.len;
        (size_ok && fits && header.payload_size < self.max_record_size).then_some(header)
    }

    fn note_corruption(&mut self) {
        if self.state == ScanState::Resyncing {
            return;
        }
        if !self.corruption_logged {
            error!(offset = self.pos, "corrupted history data, skipping to next record");
            self.corruption_logged = true;
        }
    }
}

/// Outcome of an index regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Day whose indexes were rebuilt.
    pub day: NaiveDate,
    /// Definition index entries written.
    pub definitions: usize,
    /// Time index entries written.
    pub samples: usize,
    /// Bytes skipped as corrupt.
    pub skipped_bytes: u64,
    /// Final scanner state.
    pub state: ScanState,
}

impl HistoryStore {
    /// Rebuilds both index files of the day containing `time` from its data file.
    ///
    /// Running it twice on the same data file produces identical indexes.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::File` if the data file cannot be read or an
    /// index file cannot be rewritten.
    pub fn regenerate_index(&self, time: u32) -> Result<RecoveryReport> {
        self.regenerate_day(day_of(time))
    }

    pub(crate) fn regenerate_day(&self, day: NaiveDate) -> Result<RecoveryReport> {
        let data_path = self.layout.path(day, FileKind::Data);
        info!(path = %data_path.display(), "regenerating history index");

        let data = std::fs::File::open(&data_path)
            .map_err(|e| HistoryError::file(&data_path, FileOp::Open, e))?;
        let read_err = |e| HistoryError::file(&data_path, FileOp::Read, e);
        let mut scanner = RecordScanner::new(data, self.config.max_record_size).map_err(read_err)?;

        let mut time_index = Vec::new();
        let mut def_index = Vec::new();
        while let Some(record) = scanner.next_record().map_err(read_err)? {
            match record {
                ScannedRecord::Definition {
                    offset,
                    header,
                    name,
                } => def_index
                    .extend_from_slice(&DefIndexEntry::new(header.event_id, name, offset).to_bytes()),
                ScannedRecord::Data { offset, header } => time_index.extend_from_slice(
                    &TimeIndexEntry::new(header.event_id, header.time, offset).to_bytes(),
                ),
            }
        }

        let mut idx = self.layout.open(day, FileKind::TimeIndex, OpenMode::Truncate)?;
        idx.write_all(&time_index)?;
        let mut idf = self.layout.open(day, FileKind::DefIndex, OpenMode::Truncate)?;
        idf.write_all(&def_index)?;

        let report = RecoveryReport {
            day,
            definitions: def_index.len() / DefIndexEntry::SIZE,
            samples: time_index.len() / TimeIndexEntry::SIZE,
            skipped_bytes: scanner.skipped_bytes(),
            state: scanner.state(),
        };
        debug!(?report, "history index regenerated");
        Ok(report)
    }
}
