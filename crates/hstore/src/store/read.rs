//! Range reads.
//!
//! A read walks the time index of each day file set in order, starting at
//! the first entry at or after the requested start time:
//!
//! ```text
//!   YYMMDD.idx  ──lower_bound(start)──► entry ─► entry ─► ... ─► end of day
//!                                         │                        │
//!                     seek offset in .hst ▼                        ▼
//!                      header ─► active definition ─► field    next midnight
//! ```
//!
//! Entries of other events are skipped, entries closer than the requested
//! interval to the last accepted sample are dropped, and the definition is
//! reloaded whenever a record points at a different definition offset.
//!
//! Readers take no lock and may race a writer. A time that goes backwards
//! inside one index marks the day as corrupt: its indexes are rebuilt from
//! the data file and the samples gathered so far are returned as a
//! successful partial read.

use super::io::{HistoryFile, OpenMode};
use super::{FileKind, HistoryStore, SearchDirection, SECONDS_PER_DAY};
use crate::error::{FileOp, HistoryError, Result};
use crate::format::{EventDefinition, FieldLayout, RecordHeader, RecordKind, TimeIndexEntry, TypeCode};
use chrono::NaiveDate;
use tracing::{debug, error, warn};

/// Seconds covered by a read with no explicit start time.
pub const DEFAULT_READ_WINDOW: u32 = 3600;

const ENTRY_SIZE: u64 = TimeIndexEntry::SIZE as u64;

/// Parameters of a single-field read.
///
/// A zero `start_time` means one hour before now, a zero `end_time` means
/// now. Both bounds are inclusive.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::store::ReadRequest;
///
/// let request = ReadRequest::new(1, "T")
///     .with_range(1000, 1020)
///     .with_interval(15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Event to read.
    pub event_id: u32,
    /// First time to include, 0 for one hour ago.
    pub start_time: u32,
    /// Last time to include, 0 for now.
    pub end_time: u32,
    /// Minimum spacing in seconds between returned samples.
    pub interval: u32,
    /// Tag name, matched ignoring ASCII case.
    pub tag: String,
    /// Array element of the tag.
    pub index: u32,
}

impl ReadRequest {
    /// Creates a request for element 0 of `tag` over the last hour.
    pub fn new(event_id: u32, tag: impl Into<String>) -> Self {
        Self {
            event_id,
            start_time: 0,
            end_time: 0,
            interval: 0,
            tag: tag.into(),
            index: 0,
        }
    }

    /// Sets the inclusive time range.
    pub fn with_range(mut self, start_time: u32, end_time: u32) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Sets the minimum spacing between returned samples.
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Selects an array element.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }
}

/// One value of a field, widened to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Record time.
    pub time: u32,
    /// Field value.
    pub value: f64,
}

/// Receiver of widened samples in time order.
pub trait SampleSink {
    /// Called once per accepted sample.
    fn add(&mut self, time: u32, value: f64);
}

impl SampleSink for Vec<Sample> {
    fn add(&mut self, time: u32, value: f64) {
        self.push(Sample { time, value });
    }
}

/// Consecutive samples sharing one element type and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRun {
    /// Number of samples in the run.
    pub samples: usize,
    /// Element type of the field.
    pub type_code: TypeCode,
    /// Bytes per sample.
    pub size: usize,
}

/// Shape of a completed read.
///
/// A field can change type when its event is redefined, so the data buffer
/// of [`HistoryStore::read_into`] is described as a sequence of runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Number of samples.
    pub samples: usize,
    /// Bytes of field data.
    pub data_bytes: usize,
    /// Layout of the field data.
    pub runs: Vec<ValueRun>,
}

impl ReadSummary {
    /// Bytes of time data.
    pub fn time_bytes(&self) -> usize {
        self.samples * std::mem::size_of::<u32>()
    }

    /// Widens the field data produced by [`HistoryStore::read_into`].
    pub fn values(&self, data: &[u8]) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.samples);
        let mut pos = 0;
        for run in &self.runs {
            for _ in 0..run.samples {
                let bytes = data.get(pos..pos + run.size).unwrap_or(&[]);
                values.push(run.type_code.widen(bytes));
                pos += run.size;
            }
        }
        values
    }

    fn push(&mut self, field: &FieldLayout) {
        self.samples += 1;
        self.data_bytes += field.size;
        match self.runs.last_mut() {
            Some(run) if run.type_code == field.type_code && run.size == field.size => {
                run.samples += 1
            }
            _ => self.runs.push(ValueRun {
                samples: 1,
                type_code: field.type_code,
                size: field.size,
            }),
        }
    }
}

impl HistoryStore {
    /// Reads one field of an event over a time range.
    ///
    /// # Errors
    ///
    /// - `HistoryError::File` if no day file set exists at or after the start
    /// - `HistoryError::UndefinedVariable` if no schema seen defines the tag
    /// - `HistoryError::WrongIndex` if the element index is out of range
    pub fn read(&self, request: &ReadRequest) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        self.read_with_sink(request, &mut samples)?;
        Ok(samples)
    }

    /// Reads one field of an event, handing every sample to `sink`.
    pub fn read_with_sink(
        &self,
        request: &ReadRequest,
        sink: &mut dyn SampleSink,
    ) -> Result<ReadSummary> {
        let mut extractor = FieldExtractor::new(request, Output::Sink(sink));
        self.scan(&mut self.query(request), &mut extractor)?;
        extractor.finish()
    }

    /// Reads one field of an event into caller buffers.
    ///
    /// `times` receives one entry per sample and `data` the raw field bytes,
    /// laid out as described by the returned [`ReadSummary`].
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Truncated` with the sizes the complete result
    /// needs when either buffer is too small. The samples that fit are
    /// written; a sample is never split across the end of a buffer.
    pub fn read_into(
        &self,
        request: &ReadRequest,
        times: &mut [u32],
        data: &mut [u8],
    ) -> Result<ReadSummary> {
        let output = Output::Buffer {
            times,
            data,
            written: 0,
            used: 0,
            full: false,
        };
        let mut extractor = FieldExtractor::new(request, output);
        self.scan(&mut self.query(request), &mut extractor)?;
        extractor.finish()
    }

    pub(crate) fn query(&self, request: &ReadRequest) -> ScanQuery {
        self.scan_query(
            request.event_id,
            request.start_time,
            request.end_time,
            request.interval,
        )
    }

    pub(crate) fn scan_query(&self, event_id: u32, start: u32, end: u32, interval: u32) -> ScanQuery {
        let now = self.now();
        ScanQuery {
            event_id,
            start: if start == 0 {
                now.saturating_sub(DEFAULT_READ_WINDOW)
            } else {
                start
            },
            end: if end == 0 { now } else { end },
            interval,
            last_accepted: None,
        }
    }

    /// Visits every accepted record of the query, day by day.
    pub(crate) fn scan(&self, query: &mut ScanQuery, visitor: &mut dyn Visitor) -> Result<()> {
        let (mut day, _) = self.require_file(query.start, SearchDirection::Forward)?;
        let mut first = true;
        loop {
            let outcome = match self.scan_day(day, query, visitor) {
                Ok(outcome) => outcome,
                Err(err) if is_corruption(&err) => {
                    error!(%day, %err, "corrupted history data, returning partial result");
                    DayOutcome::Corrupted
                }
                Err(err @ HistoryError::File { op: FileOp::Open, .. }) if !first => {
                    error!(%day, %err, "cannot open history day, returning partial result");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            match outcome {
                DayOutcome::PastEnd => return Ok(()),
                DayOutcome::Corrupted => {
                    self.recover(day);
                    return Ok(());
                }
                DayOutcome::Resynced => self.recover(day),
                DayOutcome::Exhausted => {}
            }

            let next = day.succ_opt().map_or(u32::MAX, super::midnight);
            if next > query.end || next == u32::MAX {
                return Ok(());
            }
            match self.search_file(next, SearchDirection::Forward) {
                Ok(Some((found, _))) if found > day => day = found,
                Ok(_) => return Ok(()),
                Err(err) => {
                    error!(%err, "cannot locate next history day, returning partial result");
                    return Ok(());
                }
            }
            first = false;
        }
    }

    fn scan_day(
        &self,
        day: NaiveDate,
        query: &mut ScanQuery,
        visitor: &mut dyn Visitor,
    ) -> Result<DayOutcome> {
        let mut index = IndexView::load(self.layout.open(day, FileKind::TimeIndex, OpenMode::Read)?)?;
        let mut data = self.layout.open(day, FileKind::Data, OpenMode::Read)?;
        let max_size = self.config.max_record_size;

        let mut definition: Option<(u32, EventDefinition)> = None;
        let mut pos = index.lower_bound(query.start)?;
        let mut prev: Option<u32> = None;
        let mut resynced = false;

        while let Some(entry) = index.entry(pos)? {
            match step(prev, query.start, entry.time) {
                Step::Backwards => {
                    error!(%day, pos, time = entry.time, ?prev, "history index time runs backwards");
                    return Ok(DayOutcome::Corrupted);
                }
                Step::JumpAhead(prev_time) => {
                    warn!(%day, pos, time = entry.time, prev_time, "history index jumps ahead, resynchronizing");
                    resynced = true;
                    match index.resync(pos, query.event_id, prev_time)? {
                        Some(next) => {
                            pos = next;
                            continue;
                        }
                        None => break,
                    }
                }
                Step::InOrder => {}
            }
            prev = Some(entry.time);
            pos += ENTRY_SIZE;

            if entry.time > query.end {
                return Ok(DayOutcome::PastEnd);
            }
            if entry.event_id != query.event_id || entry.time < query.start {
                continue;
            }
            if let Some(last) = query.last_accepted {
                if u64::from(entry.time) < u64::from(last) + u64::from(query.interval) {
                    continue;
                }
            }

            let mut buf = [0u8; RecordHeader::SIZE];
            data.read_at(u64::from(entry.offset), &mut buf)?;
            let header = RecordHeader::from_bytes(&buf)?;
            if header.kind != RecordKind::Data || header.event_id != query.event_id {
                return Err(HistoryError::Corrupt(format!(
                    "index entry at {} points to {:?} record of event {}",
                    entry.offset, header.kind, header.event_id
                )));
            }

            let schema_changed = match &definition {
                Some((offset, _)) if *offset == header.def_offset => false,
                _ => {
                    let loaded = load_definition(&mut data, header.def_offset, max_size)?;
                    if loaded.event_id != query.event_id {
                        return Err(HistoryError::Corrupt(format!(
                            "record of event {} refers to definition of event {}",
                            query.event_id, loaded.event_id
                        )));
                    }
                    debug!(event_id = query.event_id, def_offset = header.def_offset, "loaded event definition");
                    definition = Some((header.def_offset, loaded));
                    true
                }
            };
            let Some((_, active)) = &definition else {
                continue;
            };
            let mut payload = Payload {
                file: &mut data,
                start: u64::from(entry.offset) + RecordHeader::SIZE as u64,
                size: header.payload_size,
            };
            visitor.visit(
                Visit {
                    time: entry.time,
                    definition: active,
                    schema_changed,
                },
                &mut payload,
            )?;
            query.last_accepted = Some(entry.time);
        }

        Ok(if resynced {
            DayOutcome::Resynced
        } else {
            DayOutcome::Exhausted
        })
    }

    fn recover(&self, day: NaiveDate) {
        if let Err(err) = self.regenerate_day(day) {
            error!(%day, %err, "cannot regenerate history index");
        }
    }
}

/// Reads the definition record at `offset`.
pub(crate) fn load_definition(
    data: &mut HistoryFile,
    offset: u32,
    max_size: u32,
) -> Result<EventDefinition> {
    let mut buf = [0u8; RecordHeader::SIZE];
    data.read_at(u64::from(offset), &mut buf)?;
    let header = RecordHeader::from_bytes(&buf)?;
    if header.kind != RecordKind::Definition || header.payload_size >= max_size {
        return Err(HistoryError::Corrupt(format!(
            "no plausible definition record at offset {}",
            offset
        )));
    }
    let mut record = vec![0u8; header.record_len() as usize];
    data.read_at(u64::from(offset), &mut record)?;
    match EventDefinition::read_from(&mut record.as_slice(), max_size) {
        Ok((_, definition)) => Ok(definition),
        Err(HistoryError::Io(err)) => Err(HistoryError::Corrupt(err.to_string())),
        Err(err) => Err(err),
    }
}

/// Time of an index entry relative to the entry scanned before it.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    InOrder,
    Backwards,
    /// More than a day after the previous entry, whose time is carried.
    JumpAhead(u32),
}

/// Classifies `time` against the previous entry of the day. The first entry
/// is compared with one day before the query start.
fn step(prev: Option<u32>, start: u32, time: u32) -> Step {
    match prev {
        Some(prev_time) if time < prev_time => Step::Backwards,
        Some(prev_time) if time - prev_time > SECONDS_PER_DAY => Step::JumpAhead(prev_time),
        Some(_) => Step::InOrder,
        None if time < start.saturating_sub(SECONDS_PER_DAY) => Step::Backwards,
        None => Step::InOrder,
    }
}

fn is_corruption(err: &HistoryError) -> bool {
    matches!(
        err,
        HistoryError::Corrupt(_)
            | HistoryError::File {
                op: FileOp::Read | FileOp::Seek,
                ..
            }
    )
}

/// Bounds and progress of a scan.
#[derive(Debug, Clone)]
pub(crate) struct ScanQuery {
    pub(crate) event_id: u32,
    pub(crate) start: u32,
    pub(crate) end: u32,
    pub(crate) interval: u32,
    last_accepted: Option<u32>,
}

enum DayOutcome {
    /// Every entry of the day was examined.
    Exhausted,
    /// An entry past the end time was reached.
    PastEnd,
    /// Entries were skipped to get back in step; the day needs new indexes.
    Resynced,
    /// The day cannot be read further.
    Corrupted,
}

/// One accepted record.
pub(crate) struct Visit<'a> {
    pub(crate) time: u32,
    pub(crate) definition: &'a EventDefinition,
    /// True when `definition` differs from the one of the previous visit.
    pub(crate) schema_changed: bool,
}

/// Payload bytes of the visited record.
pub(crate) struct Payload<'a> {
    file: &'a mut HistoryFile,
    start: u64,
    size: u32,
}

impl Payload<'_> {
    pub(crate) fn len(&self) -> usize {
        self.size as usize
    }

    pub(crate) fn contains(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .map_or(false, |end| end <= self.len())
    }

    /// Fills `buf` from `offset`, or returns false if the payload is shorter.
    pub(crate) fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<bool> {
        if !self.contains(offset, buf.len()) {
            return Ok(false);
        }
        self.file.read_at(self.start + offset as u64, buf)?;
        Ok(true)
    }
}

pub(crate) trait Visitor {
    fn visit(&mut self, visit: Visit<'_>, payload: &mut Payload<'_>) -> Result<()>;
}

/// Time index of one day, cached in memory when possible.
enum IndexView {
    Cached(Vec<u8>),
    Direct { file: HistoryFile, len: u64 },
}

impl IndexView {
    fn load(mut file: HistoryFile) -> Result<Self> {
        match file.read_all() {
            Ok(bytes) => Ok(Self::Cached(bytes)),
            Err(HistoryError::NoMemory(reason)) => {
                warn!(%reason, "searching time index on disk");
                let len = file.len()?;
                Ok(Self::Direct { file, len })
            }
            Err(err) => Err(err),
        }
    }

    fn len(&self) -> u64 {
        match self {
            Self::Cached(bytes) => bytes.len() as u64,
            Self::Direct { len, .. } => *len,
        }
    }

    /// Decodes the entry starting at byte `pos`, or None past the end.
    fn entry(&mut self, pos: u64) -> Result<Option<TimeIndexEntry>> {
        if pos + ENTRY_SIZE > self.len() {
            return Ok(None);
        }
        let entry = match self {
            Self::Cached(bytes) => TimeIndexEntry::from_bytes(&bytes[pos as usize..])?,
            Self::Direct { file, .. } => {
                let mut buf = [0u8; TimeIndexEntry::SIZE];
                file.read_at(pos, &mut buf)?;
                TimeIndexEntry::from_bytes(&buf)?
            }
        };
        Ok(Some(entry))
    }

    /// Byte position of the first entry whose time is not before `time`.
    fn lower_bound(&mut self, time: u32) -> Result<u64> {
        let (mut lo, mut hi) = (0, self.len() / ENTRY_SIZE);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.entry(mid * ENTRY_SIZE)? {
                Some(entry) if entry.time < time => lo = mid + 1,
                _ => hi = mid,
            }
        }
        Ok(lo * ENTRY_SIZE)
    }

    /// Scans byte by byte past `from` for an entry of `event_id` within a
    /// day after `prev_time`.
    fn resync(&mut self, from: u64, event_id: u32, prev_time: u32) -> Result<Option<u64>> {
        let mut pos = from + 1;
        while let Some(entry) = self.entry(pos)? {
            if entry.event_id == event_id
                && entry.time >= prev_time
                && entry.time - prev_time <= SECONDS_PER_DAY
            {
                debug!(from, pos, "time index resynchronized");
                return Ok(Some(pos));
            }
            pos += 1;
        }
        Ok(None)
    }
}

enum Output<'a> {
    Sink(&'a mut dyn SampleSink),
    Buffer {
        times: &'a mut [u32],
        data: &'a mut [u8],
        written: usize,
        used: usize,
        full: bool,
    },
}

/// Extracts one field of every visited sample.
struct FieldExtractor<'a> {
    event_id: u32,
    tag: &'a str,
    index: u32,
    field: Option<FieldLayout>,
    schema_seen: bool,
    tag_matched: bool,
    summary: ReadSummary,
    output: Output<'a>,
}

impl<'a> FieldExtractor<'a> {
    fn new(request: &'a ReadRequest, output: Output<'a>) -> Self {
        Self {
            event_id: request.event_id,
            tag: &request.tag,
            index: request.index,
            field: None,
            schema_seen: false,
            tag_matched: false,
            summary: ReadSummary::default(),
            output,
        }
    }

    fn finish(self) -> Result<ReadSummary> {
        if self.schema_seen && !self.tag_matched {
            return Err(HistoryError::UndefinedVariable {
                event_id: self.event_id,
                tag: self.tag.to_string(),
            });
        }
        if let Output::Buffer { written, .. } = self.output {
            if written < self.summary.samples {
                return Err(HistoryError::Truncated {
                    required_samples: self.summary.samples,
                    required_time_bytes: self.summary.time_bytes(),
                    required_data_bytes: self.summary.data_bytes,
                });
            }
        }
        Ok(self.summary)
    }
}

impl Visitor for FieldExtractor<'_> {
    fn visit(&mut self, visit: Visit<'_>, payload: &mut Payload<'_>) -> Result<()> {
        if visit.schema_changed {
            self.schema_seen = true;
            self.field = match visit.definition.locate(self.tag, self.index) {
                Ok(field) => {
                    self.tag_matched = true;
                    Some(field)
                }
                Err(HistoryError::UndefinedVariable { .. }) => None,
                Err(err) => return Err(err),
            };
        }
        let Some(field) = self.field else {
            return Ok(());
        };
        if !payload.contains(field.offset, field.size) {
            debug!(time = visit.time, size = payload.len(), "sample shorter than its definition, skipped");
            return Ok(());
        }

        match &mut self.output {
            Output::Sink(sink) => {
                let mut buf = [0u8; 8];
                let width = field.size.min(buf.len());
                payload.read(field.offset, &mut buf[..width])?;
                sink.add(visit.time, field.type_code.widen(&buf[..width]));
            }
            Output::Buffer {
                times,
                data,
                written,
                used,
                full,
            } => {
                *full = *full || *written >= times.len() || *used + field.size > data.len();
                if !*full {
                    payload.read(field.offset, &mut data[*used..*used + field.size])?;
                    times[*written] = visit.time;
                    *written += 1;
                    *used += field.size;
                }
            }
        }
        self.summary.push(&field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::format::Tag;
    use crate::store::ManualClock;
    use tempfile::TempDir;

    const BASE: u32 = 1_700_000_000;

    fn store(dir: &TempDir, clock: &ManualClock) -> HistoryStore {
        HistoryStore::open(HistoryConfig::new(dir.path()))
            .unwrap()
            .with_clock(clock.clone())
    }

    fn write_floats(store: &mut HistoryStore, clock: &ManualClock, samples: &[(u32, f32)]) {
        for &(time, value) in samples {
            clock.set(time);
            store.write_event(1, &value.to_le_bytes()).unwrap();
        }
    }

    fn temp_store(dir: &TempDir, clock: &ManualClock) -> HistoryStore {
        let mut store = store(dir, clock);
        store
            .define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])
            .unwrap();
        store
    }

    #[test]
    fn test_read_range_and_interval() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(BASE);
        let mut store = temp_store(&dir, &clock);
        write_floats(
            &mut store,
            &clock,
            &[(BASE, 1.0), (BASE + 10, 2.0), (BASE + 20, 3.0)],
        );

        let all = store
            .read(&ReadRequest::new(1, "T").with_range(BASE, BASE + 20))
            .unwrap();
        assert_eq!(
            all,
            vec![
                Sample { time: BASE, value: 1.0 },
                Sample { time: BASE + 10, value: 2.0 },
                Sample { time: BASE + 20, value: 3.0 },
            ]
        );

        let sparse = store
            .read(
                &ReadRequest::new(1, "t")
                    .with_range(BASE, BASE + 20)
                    .with_interval(15),
            )
            .unwrap();
        let times: Vec<u32> = sparse.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![BASE, BASE + 20]);
    }

    #[test]
    fn test_read_skips_other_events() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(BASE);
        let mut store = temp_store(&dir, &clock);
        store
            .define_event(2, "Pressure", &[Tag::new("P", TypeCode::Double, 1)])
            .unwrap();
        clock.set(BASE + 1);
        store.write_event(2, &9.0f64.to_le_bytes()).unwrap();
        write_floats(&mut store, &clock, &[(BASE + 2, 4.0)]);

        let samples = store
            .read(&ReadRequest::new(1, "T").with_range(BASE, BASE + 10))
            .unwrap();
        assert_eq!(samples, vec![Sample { time: BASE + 2, value: 4.0 }]);
        let pressure = store
            .read(&ReadRequest::new(2, "P").with_range(BASE, BASE + 10))
            .unwrap();
        assert_eq!(pressure, vec![Sample { time: BASE + 1, value: 9.0 }]);
    }

    #[test]
    fn test_read_unknown_tag_and_index() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(BASE);
        let mut store = temp_store(&dir, &clock);
        write_floats(&mut store, &clock, &[(BASE, 1.0)]);

        let request = ReadRequest::new(1, "missing").with_range(BASE, BASE + 1);
        assert!(matches!(
            store.read(&request),
            Err(HistoryError::UndefinedVariable { event_id: 1, .. })
        ));
        let request = ReadRequest::new(1, "T").with_range(BASE, BASE + 1).with_index(1);
        assert!(matches!(
            store.read(&request),
            Err(HistoryError::WrongIndex { index: 1, count: 1, .. })
        ));
    }

    #[test]
    fn test_read_without_files_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir, &ManualClock::new(BASE));
        assert!(matches!(
            store.read(&ReadRequest::new(1, "T").with_range(BASE, BASE + 10)),
            Err(HistoryError::File { .. })
        ));
    }

    #[test]
    fn test_default_range_is_last_hour() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(BASE);
        let mut store = temp_store(&dir, &clock);
        write_floats(
            &mut store,
            &clock,
            &[(BASE, 1.0), (BASE + 1800, 2.0), (BASE + 4000, 3.0)],
        );
        clock.set(BASE + 4000);

        let samples = store.read(&ReadRequest::new(1, "T")).unwrap();
        let times: Vec<u32> = samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![BASE + 1800, BASE + 4000]);
    }

    #[test]
    fn test_read_into_reports_required_sizes() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(BASE);
        let mut store = temp_store(&dir, &clock);
        write_floats(
            &mut store,
            &clock,
            &[(BASE, 1.0), (BASE + 1, 2.0), (BASE + 2, 3.0)],
        );
        let request = ReadRequest::new(1, "T").with_range(BASE, BASE + 2);

        let mut times = [0u32; 2];
        let mut data = [0xEEu8; 10];
        let err = store.read_into(&request, &mut times, &mut data).unwrap_err();
        match err {
            HistoryError::Truncated {
                required_samples,
                required_time_bytes,
                required_data_bytes,
            } => {
                assert_eq!(required_samples, 3);
                assert_eq!(required_time_bytes, 12);
                assert_eq!(required_data_bytes, 12);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(times, [BASE, BASE + 1]);
        assert_eq!(&data[8..], &[0xEE, 0xEE]);

        let mut times = [0u32; 3];
        let mut data = [0u8; 12];
        let summary = store.read_into(&request, &mut times, &mut data).unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.values(&data), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_step_checks_first_entry_against_start() {
        let day = SECONDS_PER_DAY;
        assert_eq!(step(None, BASE, BASE - day - 1), Step::Backwards);
        assert_eq!(step(None, BASE, BASE - day), Step::InOrder);
        assert_eq!(step(None, BASE, BASE + 5 * day), Step::InOrder);
        assert_eq!(step(None, 10, 0), Step::InOrder);
        assert_eq!(step(Some(BASE), BASE, BASE - 1), Step::Backwards);
        assert_eq!(step(Some(BASE), BASE, BASE + day), Step::InOrder);
        assert_eq!(step(Some(BASE), BASE, BASE + day + 1), Step::JumpAhead(BASE));
    }

    #[test]
    fn test_index_view_direct_matches_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("day.idx");
        let mut bytes = Vec::new();
        for (i, time) in [10u32, 20, 20, 30].iter().enumerate() {
            bytes.extend_from_slice(&TimeIndexEntry::new(1, *time, i as u32).to_bytes());
        }
        std::fs::write(&path, &bytes).unwrap();

        let file = HistoryFile::open(&path, OpenMode::Read).unwrap();
        let mut direct = IndexView::Direct {
            file,
            len: bytes.len() as u64,
        };
        let mut cached = IndexView::Cached(bytes);
        for time in [0, 10, 15, 20, 25, 30, 31] {
            assert_eq!(
                direct.lower_bound(time).unwrap(),
                cached.lower_bound(time).unwrap(),
                "lower bound of {time}"
            );
        }
        assert_eq!(cached.lower_bound(20).unwrap(), 12);
        assert_eq!(cached.lower_bound(31).unwrap(), 48);
        assert!(cached.entry(48).unwrap().is_none());
    }

    #[test]
    fn test_resync_finds_misaligned_entry() {
        let mut bytes = TimeIndexEntry::new(1, 100, 0).to_bytes().to_vec();
        bytes.extend_from_slice(&[0xFF; 5]);
        bytes.extend_from_slice(&TimeIndexEntry::new(1, 110, 28).to_bytes());
        let mut view = IndexView::Cached(bytes);

        assert_ne!(view.entry(12).unwrap().unwrap().event_id, 1);
        assert_eq!(view.resync(12, 1, 100).unwrap(), Some(17));
        assert_eq!(view.resync(17, 1, 100).unwrap(), None);
        assert_eq!(view.entry(17).unwrap().unwrap().time, 110);
    }
}
