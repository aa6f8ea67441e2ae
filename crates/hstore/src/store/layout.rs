//! Day file set naming and local calendar arithmetic.
//!
//! Each local calendar day maps to `YYMMDD.hst`, `YYMMDD.idx` and
//! `YYMMDD.idf` in the base directory.

use super::io::{HistoryFile, OpenMode};
use crate::error::Result;
use chrono::{Duration, Local, NaiveDate, TimeZone};
use std::path::{Path, PathBuf};

/// Seconds in a day.
pub const SECONDS_PER_DAY: u32 = 86_400;

/// The three files of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Record log (`.hst`).
    Data,
    /// Time index (`.idx`).
    TimeIndex,
    /// Definition index (`.idf`).
    DefIndex,
}

impl FileKind {
    /// File name suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Data => "hst",
            Self::TimeIndex => "idx",
            Self::DefIndex => "idf",
        }
    }
}

/// Direction of a day file set search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    /// Towards later days.
    Forward,
    /// Towards earlier days.
    Backward,
}

/// Maps days to paths inside a base directory.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::store::{DayLayout, FileKind};
///
/// let layout = DayLayout::new("/data/history");
/// let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// assert!(layout.path(day, FileKind::Data).ends_with("240309.hst"));
/// ```
#[derive(Debug, Clone)]
pub struct DayLayout {
    base: PathBuf,
}

impl DayLayout {
    /// Creates a layout rooted at `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// Base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Path of one file of a day.
    pub fn path(&self, day: NaiveDate, kind: FileKind) -> PathBuf {
        self.base
            .join(format!("{}.{}", day.format("%y%m%d"), kind.suffix()))
    }

    /// Path of one file of the day containing `time`.
    pub fn path_for_time(&self, time: u32, kind: FileKind) -> PathBuf {
        self.path(day_of(time), kind)
    }

    /// Returns true if the file exists.
    pub fn exists(&self, day: NaiveDate, kind: FileKind) -> bool {
        self.path(day, kind).is_file()
    }

    pub(crate) fn open(
        &self,
        day: NaiveDate,
        kind: FileKind,
        mode: OpenMode,
    ) -> Result<HistoryFile> {
        HistoryFile::open(&self.path(day, kind), mode)
    }

    /// Finds the nearest day with a data file, starting at the day of `time`.
    ///
    /// Probes at most `max_days` days. Forward searches stop a day past
    /// `now`. Returns the day and the time to continue from: `time` itself
    /// when its own day exists, otherwise local midnight of the day found.
    pub fn search(
        &self,
        time: u32,
        direction: SearchDirection,
        max_days: u32,
        now: u32,
    ) -> Option<(NaiveDate, u32)> {
        let start = day_of(time);
        let latest = day_of(now.saturating_add(SECONDS_PER_DAY));
        let mut day = start;
        for _ in 0..=max_days {
            if direction == SearchDirection::Forward && day > latest {
                return None;
            }
            if self.exists(day, FileKind::Data) {
                let at = if day == start { time } else { midnight(day) };
                return Some((day, at));
            }
            day = match direction {
                SearchDirection::Forward => day.succ_opt()?,
                SearchDirection::Backward => day.pred_opt()?,
            };
        }
        None
    }
}

/// Local calendar day of a unix time.
pub fn day_of(time: u32) -> NaiveDate {
    Local
        .timestamp_opt(i64::from(time), 0)
        .earliest()
        .map_or(NaiveDate::MIN, |dt| dt.date_naive())
}

/// Unix time of local midnight starting `day`.
///
/// In zones where midnight is skipped by a DST change the first valid
/// instant of the day is used.
pub fn midnight(day: NaiveDate) -> u32 {
    let Some(start) = day.and_hms_opt(0, 0, 0) else {
        return 0;
    };
    let local = start
        .and_local_timezone(Local)
        .earliest()
        .or_else(|| (start + Duration::hours(1)).and_local_timezone(Local).earliest());
    local.map_or(0, |dt| u32::try_from(dt.timestamp().max(0)).unwrap_or(u32::MAX))
}

/// Unix time of the local midnight following `time`.
pub fn next_midnight(time: u32) -> u32 {
    day_of(time)
        .succ_opt()
        .map_or(u32::MAX, midnight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn noon(day: NaiveDate) -> u32 {
        midnight(day) + 12 * 3600
    }

    #[test]
    fn test_file_names_use_local_date() {
        let layout = DayLayout::new("/data");
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(layout.path(day, FileKind::Data), PathBuf::from("/data/240309.hst"));
        assert_eq!(layout.path(day, FileKind::TimeIndex), PathBuf::from("/data/240309.idx"));
        assert_eq!(layout.path(day, FileKind::DefIndex), PathBuf::from("/data/240309.idf"));
        assert_eq!(layout.path_for_time(noon(day), FileKind::Data), layout.path(day, FileKind::Data));
    }

    #[test]
    fn test_midnight_and_day_of_agree() {
        let day = NaiveDate::from_ymd_opt(2023, 11, 5).unwrap();
        let start = midnight(day);
        assert_eq!(day_of(start), day);
        assert_eq!(day_of(start - 1), day.pred_opt().unwrap());
        assert_eq!(next_midnight(start + 10), midnight(day.succ_opt().unwrap()));
    }

    #[test]
    fn test_search_forward_moves_to_midnight() {
        let dir = TempDir::new().unwrap();
        let layout = DayLayout::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let later = day.succ_opt().unwrap().succ_opt().unwrap();
        std::fs::write(layout.path(later, FileKind::Data), b"").unwrap();

        let now = noon(later);
        let (found, at) = layout
            .search(noon(day), SearchDirection::Forward, 365, now)
            .unwrap();
        assert_eq!(found, later);
        assert_eq!(at, midnight(later));
    }

    #[test]
    fn test_search_keeps_time_on_own_day() {
        let dir = TempDir::new().unwrap();
        let layout = DayLayout::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        std::fs::write(layout.path(day, FileKind::Data), b"").unwrap();

        let at = noon(day) + 5;
        assert_eq!(
            layout.search(at, SearchDirection::Backward, 365, at),
            Some((day, at))
        );
    }

    #[test]
    fn test_search_respects_limits() {
        let dir = TempDir::new().unwrap();
        let layout = DayLayout::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let earlier = day - Duration::days(5);
        std::fs::write(layout.path(earlier, FileKind::Data), b"").unwrap();

        assert!(layout
            .search(noon(day), SearchDirection::Backward, 3, noon(day))
            .is_none());
        assert_eq!(
            layout
                .search(noon(day), SearchDirection::Backward, 5, noon(day))
                .map(|(d, _)| d),
            Some(earlier)
        );
        // Forward searches never look past tomorrow.
        assert!(layout
            .search(noon(earlier) - 3 * SECONDS_PER_DAY, SearchDirection::Forward, 365, noon(earlier) - 3 * SECONDS_PER_DAY)
            .is_none());
    }
}
