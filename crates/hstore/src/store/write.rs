//! Sample writes.

use super::define::append_definition;
use super::io::Storage;
use super::lock::LockGuard;
use super::{day_of, DayFiles, HistoryStore};
use crate::error::{HistoryError, Result};
use crate::format::{RecordHeader, TimeIndexEntry};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

impl HistoryStore {
    /// Appends one sample of a defined event, timestamped with the store clock.
    ///
    /// When the local day has changed since the last write, the new day's
    /// files are opened and the event definition is written to them first,
    /// so every day file set describes its own records.
    ///
    /// A failed data append is rolled back; a failed index append rolls
    /// back both files. If the writer lock cannot be acquired within the
    /// configured timeout the call returns `Ok(())` without writing.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::UndefinedEvent` if the event was not defined on
    /// this store, and `HistoryError::File` on I/O failure.
    pub fn write_event(&mut self, event_id: u32, payload: &[u8]) -> Result<()> {
        let lock = Arc::clone(&self.lock);
        let Some(_guard) = LockGuard::acquire(lock.as_ref(), self.config.lock_timeout) else {
            warn!(event_id, "history lock timeout, sample dropped");
            return Ok(());
        };

        let now = self.now();
        let day = day_of(now);
        let rollover = match self.events.get(&event_id) {
            Some(state) => state.day != day,
            None => {
                return Err(HistoryError::UndefinedEvent(format!(
                    "event {} written before it was defined",
                    event_id
                )))
            }
        };
        if rollover {
            let mut files = self.open_day_for_write(day)?;
            if let Some(state) = self.events.get_mut(&event_id) {
                state.def_offset = append_definition(&mut files, &state.definition, now)?;
                state.files = files;
                state.day = day;
                debug!(event_id, %day, "history day rollover");
            }
        }
        let Some(state) = self.events.get_mut(&event_id) else {
            return Err(HistoryError::UndefinedEvent(event_id.to_string()));
        };

        append_sample(&mut state.files, event_id, now, state.def_offset, payload)
    }
}

/// Appends a data record and its time index entry.
///
/// When the index append fails the data file is truncated back to its
/// length before the call.
fn append_sample<F: Storage>(
    files: &mut DayFiles<F>,
    event_id: u32,
    time: u32,
    def_offset: u32,
    payload: &[u8],
) -> Result<()> {
    let payload_size = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a record", payload.len()),
        )
    })?;
    let header = RecordHeader::data(event_id, time, def_offset, payload_size);
    let mut record = Vec::with_capacity(RecordHeader::SIZE + payload.len());
    record.extend_from_slice(&header.to_bytes());
    record.extend_from_slice(payload);

    let offset = files.data.append(&record)?;
    let entry = TimeIndexEntry::new(event_id, time, offset);
    if let Err(err) = files.time_index.append(&entry.to_bytes()) {
        files.data.rollback(u64::from(offset));
        return Err(err);
    }
    Ok(())
}
