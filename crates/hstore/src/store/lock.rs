//! Writer mutual exclusion.
//!
//! Defines and writes are serialized through a [`WriterLock`] acquired with a
//! bounded wait. Reads never take it.
//!
//! Stores opened on the same directory in one process share a lock through
//! [`ProcessLock::for_path`], so their appends to a day's files never
//! interleave.

use super::DEFAULT_LOCK_NAME;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Locks handed out by [`ProcessLock::for_path`], keyed by canonical base path.
static PATH_LOCKS: OnceLock<Mutex<HashMap<PathBuf, ProcessLock>>> = OnceLock::new();

/// Named mutual-exclusion primitive shared by writers.
pub trait WriterLock: Send + Sync + Debug {
    /// Waits up to `timeout` for the lock. Returns false on timeout.
    fn acquire(&self, timeout: Duration) -> bool;

    /// Releases a lock previously acquired.
    fn release(&self);
}

#[derive(Debug, Default)]
struct LockState {
    held: Mutex<bool>,
    released: Condvar,
}

/// In-process named semaphore.
///
/// Clones share the same lock, so several stores writing to one directory
/// can be serialized by handing them clones of one `ProcessLock`.
///
/// # Examples
///
/// ```rust,ignore
/// use alopex_hstore::store::{ProcessLock, WriterLock};
/// use std::time::Duration;
///
/// let lock = ProcessLock::new("history");
/// assert!(lock.acquire(Duration::from_secs(5)));
/// assert!(!lock.clone().acquire(Duration::from_millis(1)));
/// lock.release();
/// ```
#[derive(Debug, Clone)]
pub struct ProcessLock {
    name: String,
    state: Arc<LockState>,
}

impl ProcessLock {
    /// Creates a new, released lock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(LockState::default()),
        }
    }

    /// Returns the lock shared by every store of this process writing under `base`.
    ///
    /// The path is canonicalized first, so different spellings of one
    /// directory map to the same lock. A path that cannot be canonicalized
    /// is used as given.
    pub fn for_path(base: &Path) -> Self {
        let key = fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
        let mut locks = PATH_LOCKS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        locks
            .entry(key)
            .or_insert_with_key(|key| {
                ProcessLock::new(format!("{}:{}", DEFAULT_LOCK_NAME, key.display()))
            })
            .clone()
    }

    /// Name of the lock.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl WriterLock for ProcessLock {
    fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.state.held.lock().unwrap_or_else(|err| err.into_inner());
        while *held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .state
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(|err| err.into_inner());
            held = guard;
        }
        *held = true;
        true
    }

    fn release(&self) {
        let mut held = self.state.held.lock().unwrap_or_else(|err| err.into_inner());
        *held = false;
        self.state.released.notify_one();
    }
}

/// Lock that is always available. For single-writer deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl WriterLock for NoLock {
    fn acquire(&self, _timeout: Duration) -> bool {
        true
    }

    fn release(&self) {}
}

/// Releases the writer lock when dropped.
pub(crate) struct LockGuard<'a> {
    lock: &'a dyn WriterLock,
}

impl<'a> LockGuard<'a> {
    /// Acquires `lock`, or returns None on timeout.
    pub(crate) fn acquire(lock: &'a dyn WriterLock, timeout: Duration) -> Option<Self> {
        lock.acquire(timeout).then_some(Self { lock })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
