//! Checked file primitives.
//!
//! Every failure is reported as [`HistoryError::File`] with the path and the
//! operation, and appends undo themselves when the write does not complete.

use crate::error::{FileOp, HistoryError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::error;

/// Seekable byte stream that can be shrunk.
pub(crate) trait Storage: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl Storage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// How a day file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    /// Existing file, read only.
    Read,
    /// Read-write, created when missing.
    ReadWrite,
    /// Read-write, created when missing and emptied when present.
    Truncate,
}

/// A day file together with its path.
#[derive(Debug)]
pub(crate) struct HistoryFile<F = File> {
    inner: F,
    path: PathBuf,
}

impl HistoryFile<File> {
    pub(crate) fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::ReadWrite => options.read(true).write(true).create(true),
            OpenMode::Truncate => options.read(true).write(true).create(true).truncate(true),
        };
        let inner = options
            .open(path)
            .map_err(|e| HistoryError::file(path, FileOp::Open, e))?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

impl<F: Storage> HistoryFile<F> {
    pub(crate) fn from_parts(inner: F, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &F {
        &self.inner
    }

    fn fail(&self, op: FileOp, source: io::Error) -> HistoryError {
        HistoryError::file(&self.path, op, source)
    }

    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|e| self.fail(FileOp::Seek, e))
    }

    /// Moves to the end and returns the file length.
    pub(crate) fn seek_end(&mut self) -> Result<u64> {
        self.inner
            .seek(SeekFrom::End(0))
            .map_err(|e| self.fail(FileOp::Seek, e))
    }

    pub(crate) fn len(&mut self) -> Result<u64> {
        self.seek_end()
    }

    /// Current position, which must be addressable by a 32-bit offset.
    pub(crate) fn position(&mut self) -> Result<u32> {
        let pos = self
            .inner
            .stream_position()
            .map_err(|e| self.fail(FileOp::Position, e))?;
        to_offset(pos).map_err(|e| self.fail(FileOp::Position, e))
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| self.fail(FileOp::Read, e))
    }

    pub(crate) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_to(offset)?;
        self.read_exact(buf)
    }

    /// Fills `buf`, or returns false if the file ends first.
    pub(crate) fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.fail(FileOp::Read, e)),
            }
        }
        Ok(true)
    }

    /// Reads the whole file from the start.
    pub(crate) fn read_all(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        let len = usize::try_from(len).map_err(|_| {
            HistoryError::NoMemory(format!("{} is too large to cache", self.path.display()))
        })?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| {
            HistoryError::NoMemory(format!("cannot cache {} bytes of {}", len, self.path.display()))
        })?;
        buf.resize(len, 0);
        self.read_at(0, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| self.fail(FileOp::Write, e))
    }

    pub(crate) fn truncate(&mut self, len: u64) -> Result<()> {
        self.inner
            .set_len(len)
            .map_err(|e| self.fail(FileOp::Truncate, e))?;
        self.seek_to(len)
    }

    /// Appends `bytes` at the end of the file and returns where they start.
    ///
    /// On a failed write the file is truncated back to its previous length.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> Result<u32> {
        let start = self.seek_end()?;
        let offset = to_offset(start + bytes.len() as u64)
            .and_then(|_| to_offset(start))
            .map_err(|e| self.fail(FileOp::Position, e))?;
        if let Err(err) = self.write_all(bytes) {
            self.rollback(start);
            return Err(err);
        }
        Ok(offset)
    }

    /// Truncates back to `len` after a failed append, logging if that fails too.
    pub(crate) fn rollback(&mut self, len: u64) {
        if let Err(err) = self.truncate(len) {
            error!(path = %self.path.display(), len, %err, "cannot roll back partial append");
        }
    }
}

fn to_offset(pos: u64) -> io::Result<u32> {
    u32::try_from(pos).map_err(|_| {
        io::Error::new(
            ErrorKind::InvalidData,
            format!("offset {} exceeds 32-bit file addressing", pos),
        )
    })
}
