//! Store configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait for the writer lock before a define or write becomes a no-op.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of days probed when locating a day file set.
pub const DEFAULT_SEARCH_DAYS: u32 = 365;

/// Default number of days walked back when resolving an event name (ten years).
pub const DEFAULT_NAME_LOOKBACK_DAYS: u32 = 3650;

/// Default upper bound for a plausible record payload (1 MiB).
pub const DEFAULT_MAX_RECORD_SIZE: u32 = 1024 * 1024;

/// Configuration for a [`HistoryStore`](crate::store::HistoryStore).
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::HistoryConfig;
/// use std::time::Duration;
///
/// let config = HistoryConfig::new("/data/history")
///     .with_lock_timeout(Duration::from_millis(500))
///     .with_search_days(30);
/// ```
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Directory holding the day file sets.
    pub base_path: PathBuf,
    /// Maximum wait for the writer lock.
    pub lock_timeout: Duration,
    /// Maximum number of days probed when locating a day file set.
    pub search_days: u32,
    /// Maximum number of days walked back when resolving an event name.
    pub name_lookback_days: u32,
    /// Records with a payload at or above this size are treated as corrupt.
    pub max_record_size: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            search_days: DEFAULT_SEARCH_DAYS,
            name_lookback_days: DEFAULT_NAME_LOOKBACK_DAYS,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl HistoryConfig {
    /// Creates a configuration with default settings rooted at `base_path`.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Sets the directory holding the day file sets.
    pub fn with_base_path(mut self, base_path: impl AsRef<Path>) -> Self {
        self.base_path = base_path.as_ref().to_path_buf();
        self
    }

    /// Sets the writer lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the day probe limit.
    pub fn with_search_days(mut self, days: u32) -> Self {
        self.search_days = days;
        self
    }

    /// Sets how far back name lookups walk.
    pub fn with_name_lookback_days(mut self, days: u32) -> Self {
        self.name_lookback_days = days;
        self
    }

    /// Sets the plausibility bound for record payloads.
    pub fn with_max_record_size(mut self, size: u32) -> Self {
        self.max_record_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HistoryConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.search_days, 365);
        assert_eq!(config.name_lookback_days, 3650);
        assert_eq!(config.max_record_size, 1024 * 1024);
    }

    #[test]
    fn test_builders() {
        let config = HistoryConfig::new("/tmp/h")
            .with_lock_timeout(Duration::from_millis(10))
            .with_search_days(3)
            .with_base_path("/tmp/other");
        assert_eq!(config.base_path, PathBuf::from("/tmp/other"));
        assert_eq!(config.lock_timeout, Duration::from_millis(10));
        assert_eq!(config.search_days, 3);
    }
}
