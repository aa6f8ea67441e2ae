//! History storage engine.
//!
//! [`HistoryStore`] owns everything the engine keeps between calls: the
//! configuration, the clock and writer lock collaborators, and the per-event
//! write state (open day files and the offset of the active definition).
//!
//! # Architecture
//!
//! ```text
//! define_event ─┐                       ┌─ read / read_into / read_binned
//! write_event  ─┼─ per-event state ─────┤
//!               │  (day files, def_offset) └─ enumerate_* / dump
//!               ▼
//!        YYMMDD.hst  YYMMDD.idx  YYMMDD.idf
//!               ▲
//!        regenerate_index (rescan .hst, rewrite .idx/.idf)
//! ```
//!
//! Writers are serialized by the [`WriterLock`], by default one shared by
//! every store of the process opened on the same base path. When it cannot be
//! acquired within the configured timeout a define or write returns `Ok(())`
//! without touching the files. Readers take no lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_hstore::format::{Tag, TypeCode};
//! use alopex_hstore::store::{HistoryStore, ReadRequest};
//! use alopex_hstore::HistoryConfig;
//!
//! let mut store = HistoryStore::open(HistoryConfig::new("/data/history"))?;
//! store.define_event(1, "Temp", &[Tag::new("T", TypeCode::Float, 1)])?;
//! store.write_event(1, &21.5f32.to_le_bytes())?;
//!
//! let samples = store.read(&ReadRequest::new(1, "T"))?;
//! ```

mod catalog;
mod clock;
mod define;
pub(crate) mod io;
mod layout;
mod lock;
mod read;
mod recovery;
mod write;

pub use catalog::EventSummary;
pub use clock::{Clock, ManualClock, SystemClock};
pub use layout::{
    day_of, midnight, next_midnight, DayLayout, FileKind, SearchDirection, SECONDS_PER_DAY,
};
pub use lock::{NoLock, ProcessLock, WriterLock};
pub use read::{ReadRequest, ReadSummary, Sample, SampleSink, ValueRun, DEFAULT_READ_WINDOW};
pub use recovery::{RecordScanner, RecoveryReport, ScanState, ScannedRecord};

use crate::config::HistoryConfig;
use crate::error::{FileOp, HistoryError, Result};
use crate::format::EventDefinition;
use chrono::NaiveDate;
use io::{HistoryFile, OpenMode};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the writer lock shared by default.
pub const DEFAULT_LOCK_NAME: &str = "HISTORY";

/// Open files of one day, held by a writer.
#[derive(Debug)]
pub(crate) struct DayFiles<F = File> {
    pub(crate) data: HistoryFile<F>,
    pub(crate) time_index: HistoryFile<F>,
    pub(crate) def_index: HistoryFile<F>,
}

/// Write state of one event.
#[derive(Debug)]
pub(crate) struct EventState {
    pub(crate) definition: EventDefinition,
    pub(crate) day: NaiveDate,
    pub(crate) files: DayFiles,
    pub(crate) def_offset: u32,
}

/// Embedded, append-only history store.
#[derive(Debug)]
pub struct HistoryStore {
    config: HistoryConfig,
    layout: DayLayout,
    clock: Arc<dyn Clock>,
    lock: Arc<dyn WriterLock>,
    /// True while `lock` is the per-path default rather than an injected one.
    path_lock: bool,
    events: HashMap<u32, EventState>,
}

impl HistoryStore {
    /// Opens a store, creating the base directory if it does not exist.
    ///
    /// The store uses the system clock and the [`ProcessLock`] shared by all
    /// stores of this process on the same base path.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::File` if the base directory cannot be created.
    pub fn open(config: HistoryConfig) -> Result<Self> {
        create_base(&config.base_path)?;
        info!(path = %config.base_path.display(), "opened history store");
        let lock = Arc::new(ProcessLock::for_path(&config.base_path));
        Ok(Self {
            layout: DayLayout::new(&config.base_path),
            config,
            clock: Arc::new(SystemClock),
            lock,
            path_lock: true,
            events: HashMap::new(),
        })
    }

    /// Replaces the clock used to timestamp records.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the writer lock.
    ///
    /// An injected lock is kept across [`set_base_path`](Self::set_base_path).
    pub fn with_lock(mut self, lock: impl WriterLock + 'static) -> Self {
        self.lock = Arc::new(lock);
        self.path_lock = false;
        self
    }

    /// Store configuration.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Day file layout.
    pub fn layout(&self) -> &DayLayout {
        &self.layout
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> u32 {
        self.clock.now()
    }

    /// Moves the store to another base directory.
    ///
    /// All open per-event state is dropped; events must be defined again
    /// before they can be written. A default lock follows the store to the
    /// new directory.
    pub fn set_base_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        create_base(path)?;
        self.events.clear();
        if self.path_lock {
            self.lock = Arc::new(ProcessLock::for_path(path));
        }
        self.config.base_path = path.to_path_buf();
        self.layout = DayLayout::new(path);
        debug!(path = %path.display(), "history base path changed");
        Ok(())
    }

    /// Returns true if `event_id` has been defined on this store.
    pub fn is_defined(&self, event_id: u32) -> bool {
        self.events.contains_key(&event_id)
    }

    /// Finds the nearest day with data starting at `time`.
    ///
    /// Regenerates the day's indexes when either index file is missing.
    pub(crate) fn search_file(
        &self,
        time: u32,
        direction: SearchDirection,
    ) -> Result<Option<(NaiveDate, u32)>> {
        let Some((day, at)) =
            self.layout
                .search(time, direction, self.config.search_days, self.now())
        else {
            debug!(time, ?direction, "no history file found");
            return Ok(None);
        };
        if !self.layout.exists(day, FileKind::TimeIndex) || !self.layout.exists(day, FileKind::DefIndex)
        {
            self.regenerate_day(day)?;
        }
        Ok(Some((day, at)))
    }

    /// Like [`search_file`](Self::search_file) but fails when nothing is found.
    pub(crate) fn require_file(
        &self,
        time: u32,
        direction: SearchDirection,
    ) -> Result<(NaiveDate, u32)> {
        self.search_file(time, direction)?.ok_or_else(|| {
            HistoryError::file(
                self.layout.path_for_time(time, FileKind::Data),
                FileOp::Open,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot find recent history file",
                ),
            )
        })
    }

    /// Opens a day for appending, regenerating indexes of a data file that
    /// has records but no definition index.
    pub(crate) fn open_day_for_write(&self, day: NaiveDate) -> Result<DayFiles> {
        let mut files = self.open_day_files(day)?;
        if files.data.len()? > 0 && files.def_index.len()? == 0 {
            drop(files);
            self.regenerate_day(day)?;
            files = self.open_day_files(day)?;
        }
        Ok(files)
    }

    fn open_day_files(&self, day: NaiveDate) -> Result<DayFiles> {
        Ok(DayFiles {
            data: self.layout.open(day, FileKind::Data, OpenMode::ReadWrite)?,
            time_index: self.layout.open(day, FileKind::TimeIndex, OpenMode::ReadWrite)?,
            def_index: self.layout.open(day, FileKind::DefIndex, OpenMode::ReadWrite)?,
        })
    }
}

fn create_base(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| HistoryError::file(path, FileOp::Open, e))
}
