//! Error and Result types for HStore history operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for HStore operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// File operation that failed, reported with [`HistoryError::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Opening or creating a file.
    Open,
    /// Reading bytes.
    Read,
    /// Writing bytes.
    Write,
    /// Repositioning the file cursor.
    Seek,
    /// Shrinking a file during rollback.
    Truncate,
    /// Querying the current file position.
    Position,
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Truncate => "truncate",
            Self::Position => "position",
        };
        f.write_str(name)
    }
}

/// The error type for history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A day file set could not be opened, read, written or repositioned.
    #[error("File error: cannot {op} {}: {source}", .path.display())]
    File {
        /// Path of the offending file.
        path: PathBuf,
        /// Operation that failed.
        op: FileOp,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The in-memory index cache could not be allocated.
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// Write before define, or an event name that no strategy could resolve.
    #[error("Undefined event: {0}")]
    UndefinedEvent(String),

    /// The requested tag is not present in any schema seen for the event.
    #[error("Undefined variable {tag:?} in event {event_id}")]
    UndefinedVariable {
        /// Event that was searched.
        event_id: u32,
        /// Tag name that was not found.
        tag: String,
    },

    /// The array index is not smaller than the tag's element count.
    #[error("Index {index} out of range for tag {tag:?} with {count} elements")]
    WrongIndex {
        /// Tag name.
        tag: String,
        /// Requested array index.
        index: u32,
        /// Element count of the tag.
        count: u32,
    },

    /// The caller's buffers cannot hold the result; retry with the given sizes.
    #[error(
        "Buffer too small: {required_samples} samples need {required_time_bytes} time bytes and {required_data_bytes} data bytes"
    )]
    Truncated {
        /// Number of samples the full result contains.
        required_samples: usize,
        /// Time buffer size in bytes needed for the full result.
        required_time_bytes: usize,
        /// Data buffer size in bytes needed for the full result.
        required_data_bytes: usize,
    },

    /// On-disk bytes do not decode into a valid structure.
    #[error("Corrupted history data: {0}")]
    Corrupt(String),

    /// Underlying I/O error without file context.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HistoryError {
    /// Builds a [`HistoryError::File`] from a path, operation and I/O error.
    pub fn file(path: impl Into<PathBuf>, op: FileOp, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            op,
            source,
        }
    }

    /// Returns true for the recoverable buffer-too-small status.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
