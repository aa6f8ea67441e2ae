//! Wall clock used to timestamp written records.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current unix time in seconds.
    fn now(&self) -> u32;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

/// Settable clock shared between clones.
///
/// Used to replay recorded data with its original timestamps and to make
/// tests deterministic.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::store::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1000);
/// let handle = clock.clone();
/// handle.advance(10);
/// assert_eq!(clock.now(), 1010);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(now)),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: u32) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(1000);
        let handle = clock.clone();
        handle.advance(10);
        assert_eq!(clock.now(), 1010);
        clock.set(5);
        assert_eq!(handle.now(), 5);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
