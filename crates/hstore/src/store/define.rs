//! Event definitions.

use super::io::{HistoryFile, Storage};
use super::lock::LockGuard;
use super::{day_of, DayFiles, EventState, HistoryStore};
use crate::error::{HistoryError, Result};
use crate::format::{
    encode_name, DefIndexEntry, EventDefinition, RecordHeader, RecordKind, Tag, NAME_LENGTH,
};
use std::sync::Arc;
use tracing::{debug, warn};

impl HistoryStore {
    /// Registers or updates the schema of an event.
    ///
    /// A definition record is appended only when the schema differs from the
    /// one currently in effect for the event in today's data file; defining
    /// the same schema again reuses the existing record.
    ///
    /// If the writer lock cannot be acquired within the configured timeout
    /// the call returns `Ok(())` without doing anything.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::File` if the day files cannot be opened or
    /// appended to.
    pub fn define_event(&mut self, event_id: u32, name: &str, tags: &[Tag]) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let Some(_guard) = LockGuard::acquire(lock.as_ref(), self.config.lock_timeout) else {
            warn!(event_id, name, "history lock timeout, definition skipped");
            return Ok(());
        };

        let now = self.now();
        let day = day_of(now);
        let definition = EventDefinition::new(event_id, name, tags.to_vec());
        let max_size = self.config.max_record_size;

        if let Some(state) = self.events.get_mut(&event_id) {
            if state.day == day {
                if !stored_matches(&mut state.files.data, state.def_offset, &definition, max_size)? {
                    state.def_offset = append_definition(&mut state.files, &definition, now)?;
                    debug!(event_id, offset = state.def_offset, "event definition changed");
                }
                state.definition = definition;
                return Ok(());
            }
        }

        let mut files = self.open_day_for_write(day)?;
        let def_offset = match find_definition(&mut files, &definition, max_size)? {
            Some(offset) => {
                debug!(event_id, offset, "reusing stored event definition");
                offset
            }
            None => append_definition(&mut files, &definition, now)?,
        };
        self.events.insert(
            event_id,
            EventState {
                definition,
                day,
                files,
                def_offset,
            },
        );
        Ok(())
    }
}

/// Appends a definition record and its index entry, returning the record offset.
pub(crate) fn append_definition<F: Storage>(
    files: &mut DayFiles<F>,
    definition: &EventDefinition,
    time: u32,
) -> Result<u32> {
    files.data.seek_end()?;
    let offset = files.data.position()?;
    files.data.append(&definition.to_record(time, offset))?;

    let entry = DefIndexEntry::new(definition.event_id, definition.name.clone(), offset);
    if let Err(err) = files.def_index.append(&entry.to_bytes()) {
        files.data.rollback(u64::from(offset));
        return Err(err);
    }
    Ok(offset)
}

/// Looks for the newest definition index entry of the event and returns its
/// offset if the stored schema is identical to `definition`.
fn find_definition(
    files: &mut DayFiles,
    definition: &EventDefinition,
    max_size: u32,
) -> Result<Option<u32>> {
    let entries = files.def_index.read_all()?;
    let newest = entries
        .chunks_exact(DefIndexEntry::SIZE)
        .rev()
        .map(DefIndexEntry::from_bytes)
        .find(|entry| {
            entry
                .as_ref()
                .map_or(false, |e| e.event_id == definition.event_id)
        })
        .transpose()?;
    let Some(entry) = newest else {
        return Ok(None);
    };
    if stored_matches(&mut files.data, entry.def_offset, definition, max_size)? {
        Ok(Some(entry.def_offset))
    } else {
        Ok(None)
    }
}

/// Compares the definition record at `offset` byte for byte with `definition`.
fn stored_matches(
    data: &mut HistoryFile,
    offset: u32,
    definition: &EventDefinition,
    max_size: u32,
) -> Result<bool> {
    let mut buf = [0u8; RecordHeader::SIZE];
    data.seek_to(u64::from(offset))?;
    if !data.read_exact_or_eof(&mut buf)? {
        return Ok(false);
    }
    let header = match RecordHeader::from_bytes(&buf) {
        Ok(header) => header,
        Err(HistoryError::Corrupt(_)) => return Ok(false),
        Err(err) => return Err(err),
    };
    let tags = definition.tags_to_bytes();
    if header.kind != RecordKind::Definition
        || header.event_id != definition.event_id
        || header.payload_size as usize != tags.len()
        || header.payload_size >= max_size
    {
        return Ok(false);
    }
    let mut body = vec![0u8; NAME_LENGTH + tags.len()];
    if !data.read_exact_or_eof(&mut body)? {
        return Ok(false);
    }
    Ok(body[..NAME_LENGTH] == encode_name(&definition.name) && body[NAME_LENGTH..] == tags[..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::format::TypeCode;
    use crate::store::{FileKind, ManualClock, ProcessLock, WriterLock};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const NOW: u32 = 1_700_000_000;

    fn store(dir: &TempDir) -> HistoryStore {
        HistoryStore::open(HistoryConfig::new(dir.path()))
            .unwrap()
            .with_clock(ManualClock::new(NOW))
    }

    fn tags() -> Vec<Tag> {
        vec![Tag::new("T", TypeCode::Float, 1)]
    }

    fn file_len(store: &HistoryStore, kind: FileKind) -> u64 {
        fs::metadata(store.layout().path_for_time(NOW, kind))
            .unwrap()
            .len()
    }

    #[test]
    fn test_identical_definition_written_once() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.define_event(1, "Temp", &tags()).unwrap();
        store.define_event(1, "Temp", &tags()).unwrap();

        assert_eq!(file_len(&store, FileKind::Data), 20 + 32 + 40);
        assert_eq!(file_len(&store, FileKind::DefIndex), 40);
    }

    #[test]
    fn test_changed_definition_appends_record() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.define_event(1, "Temp", &tags()).unwrap();
        let mut changed = tags();
        changed.push(Tag::new("P", TypeCode::Double, 2));
        store.define_event(1, "Temp", &changed).unwrap();

        assert_eq!(file_len(&store, FileKind::Data), 92 + 20 + 32 + 80);
        assert_eq!(file_len(&store, FileKind::DefIndex), 80);
        assert_eq!(store.events[&1].def_offset, 92);
    }

    #[test]
    fn test_new_store_reuses_stored_definition() {
        let dir = TempDir::new().unwrap();
        store(&dir).define_event(1, "Temp", &tags()).unwrap();

        let mut reopened = store(&dir);
        reopened.define_event(1, "Temp", &tags()).unwrap();
        assert_eq!(file_len(&reopened, FileKind::DefIndex), 40);
        assert_eq!(reopened.events[&1].def_offset, 0);
    }

    #[test]
    fn test_missing_def_index_is_regenerated() {
        let dir = TempDir::new().unwrap();
        store(&dir).define_event(1, "Temp", &tags()).unwrap();
        let idf = store(&dir).layout().path_for_time(NOW, FileKind::DefIndex);
        fs::write(&idf, b"").unwrap();

        let mut reopened = store(&dir);
        reopened.define_event(1, "Temp", &tags()).unwrap();
        assert_eq!(file_len(&reopened, FileKind::DefIndex), 40);
        assert_eq!(file_len(&reopened, FileKind::Data), 92);
    }

    #[test]
    fn test_zero_width_tags_stored_as_given() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let mixed = vec![
            Tag::new("Header", TypeCode::Struct, 4),
            Tag::new("Spare", TypeCode::Float, 0),
            Tag::new("T", TypeCode::Float, 1),
        ];
        store.define_event(1, "Mixed", &mixed).unwrap();

        assert_eq!(file_len(&store, FileKind::Data), 20 + 32 + 3 * 40);
        let stored = store.enumerate_tags(NOW, 1).unwrap();
        assert_eq!(stored.tags, mixed);
        assert_eq!(stored.sample_size(), 4);
    }

    #[test]
    fn test_lock_timeout_is_silent_noop() {
        let dir = TempDir::new().unwrap();
        let lock = ProcessLock::new("history");
        let mut store = HistoryStore::open(
            HistoryConfig::new(dir.path()).with_lock_timeout(Duration::from_millis(5)),
        )
        .unwrap()
        .with_clock(ManualClock::new(NOW))
        .with_lock(lock.clone());

        assert!(lock.acquire(Duration::from_millis(5)));
        store.define_event(1, "Temp", &tags()).unwrap();
        assert!(!store.is_defined(1));
        lock.release();

        store.define_event(1, "Temp", &tags()).unwrap();
        assert!(store.is_defined(1));
    }
}
