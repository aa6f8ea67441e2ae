//! Event and tag enumeration, name lookup and text dumps.

use super::io::OpenMode;
use super::read::{load_definition, Payload, Visit, Visitor};
use super::{day_of, FileKind, HistoryStore, SearchDirection};
use crate::error::{HistoryError, Result};
use crate::format::{DefIndexEntry, EventDefinition, Tag, TypeCode};
use chrono::{Local, NaiveDate, TimeZone};
use std::io::Write;
use tracing::debug;

/// An event listed in a definition index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    /// Event id.
    pub event_id: u32,
    /// Most recent name of the event.
    pub name: String,
}

impl HistoryStore {
    /// Lists the events defined in the newest day file set at or before `time`.
    ///
    /// A zero `time` means now. Every event appears once, with the name of
    /// its most recent definition, in order of first definition.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::File` if no day file set is found.
    pub fn enumerate_events(&self, time: u32) -> Result<Vec<EventSummary>> {
        let (day, _) = self.require_file(self.or_now(time), SearchDirection::Backward)?;
        let mut events: Vec<EventSummary> = Vec::new();
        for entry in self.def_index(day)? {
            match events.iter_mut().find(|e| e.event_id == entry.event_id) {
                Some(event) => event.name = entry.name,
                None => events.push(EventSummary {
                    event_id: entry.event_id,
                    name: entry.name,
                }),
            }
        }
        Ok(events)
    }

    /// Number of distinct events in the newest day file set at or before `time`.
    pub fn count_events(&self, time: u32) -> Result<usize> {
        self.enumerate_events(time).map(|events| events.len())
    }

    /// Finds the id of the event named `name`, walking definition indexes
    /// backwards one day at a time from `time` (0 for now).
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedEvent` if no definition index within
    /// the configured lookback carries the name.
    pub fn event_id_by_name(&self, time: u32, name: &str) -> Result<u32> {
        let mut day = day_of(self.or_now(time));
        for _ in 0..=self.config.name_lookback_days {
            if self.layout.exists(day, FileKind::Data) {
                if !self.layout.exists(day, FileKind::DefIndex) {
                    self.regenerate_day(day)?;
                }
                if let Some(entry) = self.def_index(day)?.into_iter().find(|e| e.name == name) {
                    debug!(name, event_id = entry.event_id, %day, "event name resolved");
                    return Ok(entry.event_id);
                }
            }
            day = match day.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
        }
        Err(HistoryError::UndefinedEvent(name.to_string()))
    }

    /// Returns the most recent definition of an event in the newest day file
    /// set at or before `time` (0 for now).
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedEvent` if that day holds no
    /// definition of the event.
    pub fn enumerate_tags(&self, time: u32, event_id: u32) -> Result<EventDefinition> {
        let (day, _) = self.require_file(self.or_now(time), SearchDirection::Backward)?;
        let entry = self
            .def_index(day)?
            .into_iter()
            .rev()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| {
                HistoryError::UndefinedEvent(format!("event {} has no definition on {}", event_id, day))
            })?;
        let mut data = self.layout.open(day, FileKind::Data, OpenMode::Read)?;
        load_definition(&mut data, entry.def_offset, self.config.max_record_size)
    }

    /// Returns one tag of the most recent definition of an event.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedVariable` if the definition has no
    /// tag of that name.
    pub fn get_var(&self, time: u32, event_id: u32, tag: &str) -> Result<Tag> {
        let definition = self.enumerate_tags(time, event_id)?;
        definition
            .find_tag(tag)
            .map(|(_, found)| found.clone())
            .ok_or_else(|| HistoryError::UndefinedVariable {
                event_id,
                tag: tag.to_string(),
            })
    }

    /// Writes every accepted sample of an event as tab separated text.
    ///
    /// A header row naming the columns is written before the first row and
    /// again whenever the event's tags change. Array tags expand into one
    /// column per element. Times are unix seconds when `binary_time` is set,
    /// local `%b %d %H:%M:%S %Y` otherwise. Returns the number of rows.
    pub fn dump(
        &self,
        event_id: u32,
        start: u32,
        end: u32,
        interval: u32,
        binary_time: bool,
        out: &mut dyn Write,
    ) -> Result<usize> {
        let mut dumper = Dumper {
            out,
            binary_time,
            columns: None,
            rows: 0,
        };
        self.scan(&mut self.scan_query(event_id, start, end, interval), &mut dumper)?;
        dumper.out.flush()?;
        Ok(dumper.rows)
    }

    fn or_now(&self, time: u32) -> u32 {
        if time == 0 {
            self.now()
        } else {
            time
        }
    }

    fn def_index(&self, day: NaiveDate) -> Result<Vec<DefIndexEntry>> {
        let bytes = self
            .layout
            .open(day, FileKind::DefIndex, OpenMode::Read)?
            .read_all()?;
        bytes
            .chunks_exact(DefIndexEntry::SIZE)
            .map(DefIndexEntry::from_bytes)
            .collect()
    }
}

struct Dumper<'a> {
    out: &'a mut dyn Write,
    binary_time: bool,
    columns: Option<Vec<Tag>>,
    rows: usize,
}

impl Dumper<'_> {
    fn write_header(&mut self, tags: &[Tag]) -> Result<()> {
        let mut line = String::from("Date");
        for tag in tags {
            if tag.count > 1 && tag.type_code != TypeCode::String {
                for i in 0..tag.count {
                    line.push_str(&format!("\t{}{}", tag.name, i));
                }
            } else {
                line.push('\t');
                line.push_str(&tag.name);
            }
        }
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    fn format_time(&self, time: u32) -> String {
        if self.binary_time {
            return time.to_string();
        }
        Local
            .timestamp_opt(i64::from(time), 0)
            .earliest()
            .map_or_else(|| time.to_string(), |dt| dt.format("%b %d %H:%M:%S %Y").to_string())
    }
}

impl Visitor for Dumper<'_> {
    fn visit(&mut self, visit: Visit<'_>, payload: &mut Payload<'_>) -> Result<()> {
        let tags = &visit.definition.tags;
        if self.columns.as_deref() != Some(tags.as_slice()) {
            self.write_header(tags)?;
            self.columns = Some(tags.clone());
        }

        let size = visit.definition.sample_size();
        let mut bytes = vec![0u8; size];
        if !payload.read(0, &mut bytes)? {
            debug!(time = visit.time, size = payload.len(), "sample shorter than its definition, skipped");
            return Ok(());
        }

        let mut line = self.format_time(visit.time);
        let mut offset = 0;
        for tag in tags {
            let width = tag.element_width();
            let elements = if tag.type_code == TypeCode::String { 1 } else { tag.count };
            for _ in 0..elements {
                line.push('\t');
                line.push_str(&tag.type_code.format(&bytes[offset..offset + width]));
                offset += width;
            }
        }
        writeln!(self.out, "{}", line)?;
        self.rows += 1;
        Ok(())
    }
}
