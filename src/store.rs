//! Seekable byte stores that back an opened archive.
//!
//! [`Store`] is the whole random-access contract the reader relies on:
//! absolute seek, position and size queries, bounded read and write,
//! truncate and close.  Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps the bytes in a growable buffer.  Positions are
//!   limited to [`MEMORY_STORE_LIMIT`].
//! - [`FileStore`] wraps a `std::fs::File` and tracks its own cursor so that
//!   position queries never touch the OS.
//!
//! A store is owned by exactly one archive handle and is not reentrant.
//! Every operation on a closed store fails with [`StoreError::Closed`].

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

/// Highest addressable position of a [`MemoryStore`].
pub const MEMORY_STORE_LIMIT: u64 = i32::MAX as u64;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Position {position} is outside the addressable range 0..={max}")]
    PositionOutOfRange { position: i64, max: u64 },
    #[error("Store is closed")]
    Closed,
    #[error("Unexpected end of store: wanted {wanted} bytes at offset {offset}, {available} available")]
    UnexpectedEnd { offset: u64, wanted: u64, available: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Store trait ──────────────────────────────────────────────────────────────

pub trait Store {
    /// Move the cursor to an absolute position.  Positions past the current
    /// size are allowed; a later write fills the gap with zeros.
    fn seek(&mut self, position: i64) -> Result<(), StoreError>;

    fn tell(&self) -> Result<u64, StoreError>;

    fn size(&self) -> Result<u64, StoreError>;

    /// Read up to `buf.len()` bytes at the cursor.  Returns `None` once the
    /// cursor is at or past the end of the store.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, StoreError>;

    /// Write all of `buf` at the cursor, growing the store as needed.
    fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError>;

    /// Shrink the store to `new_size`.  A larger `new_size` is a no-op.
    /// A cursor left past the new end is clamped to it.
    fn truncate(&mut self, new_size: u64) -> Result<(), StoreError>;

    /// Release the store.  Closing twice is harmless.
    fn close(&mut self) -> Result<(), StoreError>;

    fn is_open(&self) -> bool;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        let position = i64::try_from(offset).map_err(|_| StoreError::PositionOutOfRange {
            position: i64::MAX,
            max:      i64::MAX as u64,
        })?;
        self.seek(position)?;
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                Some(0) | None => {
                    return Err(StoreError::UnexpectedEnd {
                        offset,
                        wanted:    buf.len() as u64,
                        available: filled as u64,
                    });
                }
                Some(n) => filled += n,
            }
        }
        Ok(())
    }
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

/// In-memory [`Store`].  The backing buffer may be larger than the logical
/// size; bytes past `size` are never observable through the trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data:     Vec<u8>,
    size:     usize,
    position: usize,
    closed:   bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let size = data.len();
        Self { data, size, position: 0, closed: false }
    }

    pub fn with_size(size: usize) -> Self {
        Self::from_vec(vec![0u8; size])
    }

    /// Logical contents of the store.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.data.truncate(self.size);
        self.data
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed { Err(StoreError::Closed) } else { Ok(()) }
    }

    fn reposition_if_necessary(&mut self) {
        if self.position > self.size {
            self.position = self.size;
        }
    }
}

impl Store for MemoryStore {
    fn seek(&mut self, position: i64) -> Result<(), StoreError> {
        self.ensure_open()?;
        if position < 0 || position as u64 > MEMORY_STORE_LIMIT {
            return Err(StoreError::PositionOutOfRange { position, max: MEMORY_STORE_LIMIT });
        }
        self.position = position as usize;
        Ok(())
    }

    fn tell(&self) -> Result<u64, StoreError> {
        self.ensure_open()?;
        Ok(self.position as u64)
    }

    fn size(&self) -> Result<u64, StoreError> {
        self.ensure_open()?;
        Ok(self.size as u64)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        self.ensure_open()?;
        if self.position >= self.size {
            return Ok(None);
        }
        let n = buf.len().min(self.size - self.position);
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(Some(n))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let end = self.position as u64 + buf.len() as u64;
        if end > MEMORY_STORE_LIMIT {
            return Err(StoreError::PositionOutOfRange {
                position: end.min(i64::MAX as u64) as i64,
                max:      MEMORY_STORE_LIMIT,
            });
        }
        let end = end as usize;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        if self.position > self.size {
            // Stale bytes beyond the logical end must not resurface.
            self.data[self.size..self.position].fill(0);
        }
        self.data[self.position..end].copy_from_slice(buf);
        self.position = end;
        self.size = self.size.max(end);
        Ok(buf.len())
    }

    fn truncate(&mut self, new_size: u64) -> Result<(), StoreError> {
        self.ensure_open()?;
        if (self.size as u64) > new_size {
            self.size = new_size as usize;
        }
        self.reposition_if_necessary();
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

// ── FileStore ────────────────────────────────────────────────────────────────

/// [`Store`] over a filesystem file.  The file handle is dropped on
/// [`Store::close`], so the descriptor is released even if the owning
/// archive handle lives on.
#[derive(Debug)]
pub struct FileStore {
    file:     Option<File>,
    position: u64,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::from_file(File::open(path)?))
    }

    /// Open (or create) a file for reading and writing.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: File) -> Self {
        Self { file: Some(file), position: 0 }
    }

    fn file(&self) -> Result<&File, StoreError> {
        self.file.as_ref().ok_or(StoreError::Closed)
    }

    fn file_mut(&mut self) -> Result<&mut File, StoreError> {
        self.file.as_mut().ok_or(StoreError::Closed)
    }
}

impl Store for FileStore {
    fn seek(&mut self, position: i64) -> Result<(), StoreError> {
        self.file()?;
        if position < 0 {
            return Err(StoreError::PositionOutOfRange { position, max: i64::MAX as u64 });
        }
        self.position = position as u64;
        Ok(())
    }

    fn tell(&self) -> Result<u64, StoreError> {
        self.file()?;
        Ok(self.position)
    }

    fn size(&self) -> Result<u64, StoreError> {
        Ok(self.file()?.metadata()?.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        let size = self.size()?;
        if self.position >= size {
            return Ok(None);
        }
        let position = self.position;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(position))?;
        let n = file.read(buf)?;
        self.position += n as u64;
        Ok(Some(n))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, StoreError> {
        let position = self.position;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn truncate(&mut self, new_size: u64) -> Result<(), StoreError> {
        if self.size()? > new_size {
            self.file_mut()?.set_len(new_size)?;
        }
        self.position = self.position.min(self.size()?);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
