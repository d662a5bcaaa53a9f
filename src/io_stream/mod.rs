//! Entry navigator over an opened solid archive.
//!
//! # Open
//! [`SolidReader::open`] reads the superblock, checks the header region and
//! its CRC, then builds the [`EntryTable`].  Any failure closes the store
//! before the error is returned.
//!
//! # Navigation
//! There is exactly one cursor.  [`SolidReader::next_entry`] moves it to the
//! following entry, [`SolidReader::jump_to`] to any entry by index.  Both
//! position the cursor at the start of the target entry's bytes.  A selection
//! that fails still counts as a position: the entry is not readable, but the
//! next [`SolidReader::next_entry`] moves on to the one after it.
//!
//! # Folder cache
//! At most one decoded folder is held at a time, keyed by [`FolderId`].
//! Selecting an entry in the cached folder costs nothing; selecting an entry
//! in another folder discards the cached buffer first and decodes the new
//! one.  Entries without a stream never touch the cache.
//!
//! # Faults
//! A folder that fails to decode for codec, size or CRC reasons is cached as
//! an empty buffer and every read from its entries reports end of entry.
//! Storage faults always propagate.  With [`ReaderOptions::strict`] set,
//! decode faults propagate as well.

use std::io::{self, Read};

use tracing::{debug, trace, warn};

use crate::config::ReaderOptions;
use crate::crypto::{derive_key, FolderKey};
use crate::error::{Error, Result};
use crate::folder::{decode_folder, DecodeContext, FolderError};
use crate::index::{Entry, EntryTable, FolderId};
use crate::store::Store;
use crate::superblock::{Superblock, SUPERBLOCK_SIZE};

/// Outcome of a successful [`SolidReader::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes were copied into the caller's buffer.
    Read(usize),
    /// The current entry has no more bytes.
    EndOfEntry,
}

/// Counters for observing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigatorStats {
    /// Number of times a folder was decoded, successfully or not.
    pub folder_decodes:   u64,
    /// Folders that were degraded to an empty buffer.
    pub degraded_folders: u64,
    pub bytes_served:     u64,
}

#[derive(Debug)]
struct CachedFolder {
    id:    FolderId,
    data:  Vec<u8>,
    /// Why the folder was degraded, if it was.
    fault: Option<String>,
}

pub struct SolidReader<S: Store> {
    store:      S,
    superblock: Superblock,
    table:      EntryTable,
    options:    ReaderOptions,
    key:        Option<FolderKey>,

    /// Readable entry, set only when its folder is available.
    current:    Option<usize>,
    /// Last entry selected, whether or not selection succeeded.
    position:   Option<usize>,
    cached:     Option<CachedFolder>,
    /// Absolute position within the cached folder's buffer.
    cursor:     u64,
    consumed:   Vec<bool>,
    stats:      NavigatorStats,
    closed:     bool,
}

impl<S: Store> SolidReader<S> {
    pub fn open(mut store: S, options: ReaderOptions) -> Result<Self> {
        match Self::load(&mut store, &options) {
            Ok((superblock, table, key)) => {
                debug!(
                    entries = table.len(),
                    folders = table.folders().len(),
                    uuid = %superblock.archive_uuid,
                    "opened archive"
                );
                let consumed = vec![false; table.len()];
                Ok(Self {
                    store,
                    superblock,
                    table,
                    options,
                    key,
                    current: None,
                    position: None,
                    cached: None,
                    cursor: 0,
                    consumed,
                    stats: NavigatorStats::default(),
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = store.close() {
                    warn!(error = %close_err, "failed to close store after open error");
                }
                Err(e)
            }
        }
    }

    fn load(
        store:   &mut S,
        options: &ReaderOptions,
    ) -> Result<(Superblock, EntryTable, Option<FolderKey>)> {
        let size = store.size()?;
        if size < SUPERBLOCK_SIZE as u64 {
            return Err(Error::MalformedHeader(format!(
                "store holds {size} bytes, superblock needs {SUPERBLOCK_SIZE}"
            )));
        }
        let mut raw = [0u8; SUPERBLOCK_SIZE];
        store.read_exact_at(0, &mut raw)?;
        let superblock = Superblock::read(&raw[..])?;

        let header_end = superblock.header_end().filter(|&end| end <= size);
        if superblock.header_offset < SUPERBLOCK_SIZE as u64 || header_end.is_none() {
            return Err(Error::MalformedHeader(format!(
                "header region {}+{} lies outside the store ({size} bytes)",
                superblock.header_offset, superblock.header_size
            )));
        }
        let mut header = vec![0u8; superblock.header_size as usize];
        store.read_exact_at(superblock.header_offset, &mut header)?;
        let actual = crc32fast::hash(&header);
        if actual != superblock.header_crc32 {
            return Err(Error::HeaderChecksum { expected: superblock.header_crc32, actual });
        }

        let table = EntryTable::parse(&header)?;

        let key = match &options.password {
            Some(pw) if superblock.is_encrypted() || table.has_encrypted_folders() => {
                Some(derive_key(pw, &superblock.archive_uuid)?)
            }
            _ => None,
        };
        Ok((superblock, table, key))
    }

    // ── Table access ─────────────────────────────────────────────────────────

    pub fn superblock(&self) -> &Superblock { &self.superblock }
    pub fn table(&self) -> &EntryTable { &self.table }
    pub fn entries(&self) -> &[Entry] { self.table.entries() }
    pub fn entry(&self, index: usize) -> Option<&Entry> { self.table.entry(index) }
    pub fn find(&self, name: &str) -> Option<&Entry> { self.table.find(name) }
    pub fn options(&self) -> &ReaderOptions { &self.options }
    pub fn stats(&self) -> NavigatorStats { self.stats }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.current.and_then(|i| self.table.entry(i))
    }

    /// Whether any bytes of the entry at `index` have been read.
    pub fn is_consumed(&self, index: usize) -> bool {
        self.consumed.get(index).copied().unwrap_or(false)
    }

    /// Why the current entry's folder was degraded, if it was.
    pub fn current_fault(&self) -> Option<&str> {
        let folder = self.current_entry()?.folder()?;
        self.cached
            .as_ref()
            .filter(|c| c.id == folder)
            .and_then(|c| c.fault.as_deref())
    }

    // ── Navigation ───────────────────────────────────────────────────────────

    /// Advance to the entry after the last one selected, or to the first
    /// entry if none was.  Returns `None` past the last entry and leaves the
    /// cursor where it was.
    pub fn next_entry(&mut self) -> Result<Option<&Entry>> {
        self.ensure_open()?;
        let next = self.position.map_or(0, |i| i + 1);
        if next >= self.table.len() {
            return Ok(None);
        }
        self.select(next)?;
        Ok(self.table.entry(next))
    }

    /// Make the entry at `index` current, positioned at its first byte.
    pub fn jump_to(&mut self, index: usize) -> Result<()> {
        self.ensure_open()?;
        let count = self.table.len();
        if index >= count {
            return Err(Error::EntryOutOfRange { index, count });
        }
        self.select(index)
    }

    fn select(&mut self, index: usize) -> Result<()> {
        let (folder, offset) = match self.table.entry(index) {
            Some(e) => (e.folder(), e.offset()),
            None => return Err(Error::EntryOutOfRange { index, count: self.table.len() }),
        };
        self.position = Some(index);

        if let Some(id) = folder {
            if self.cached.as_ref().map(|c| c.id) != Some(id) {
                if let Err(e) = self.load_folder(id) {
                    self.current = None;
                    return Err(e);
                }
            }
            let len = self.cached.as_ref().map_or(0, |c| c.data.len() as u64);
            self.cursor = offset.min(len);
        } else {
            self.cursor = 0;
        }

        self.current = Some(index);
        trace!(index, folder = ?folder, cursor = self.cursor, "selected entry");
        Ok(())
    }

    fn load_folder(&mut self, id: FolderId) -> Result<()> {
        self.cached = None;
        let folder = self
            .table
            .folder(id)
            .ok_or_else(|| Error::MalformedHeader(format!("folder {id} missing from table")))?;
        let ctx = DecodeContext {
            key:             self.key.as_ref(),
            verify_crc:      self.options.verify_crc,
            max_folder_size: self.options.max_folder_size,
        };

        self.stats.folder_decodes += 1;
        let (data, fault) = match decode_folder(&mut self.store, folder, &ctx) {
            Ok(data) => (data, None),
            Err(FolderError::Store(e)) => return Err(Error::Store(e)),
            Err(e) if self.options.strict => {
                return Err(Error::FolderDecode { folder: id.0, source: e });
            }
            Err(e) => {
                warn!(folder = %id, error = %e, "folder failed to decode, its entries read as empty");
                self.stats.degraded_folders += 1;
                (Vec::new(), Some(e.to_string()))
            }
        };
        self.cached = Some(CachedFolder { id, data, fault });
        Ok(())
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Copy bytes of the current entry into `buf`, never past its end.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        self.ensure_open()?;
        let index = self.current.ok_or(Error::NoCurrentEntry)?;
        let entry = self.table.entry(index).ok_or(Error::NoCurrentEntry)?;
        let Some(folder) = entry.folder() else {
            return Ok(ReadStatus::EndOfEntry);
        };
        let Some(cached) = self.cached.as_ref().filter(|c| c.id == folder) else {
            return Ok(ReadStatus::EndOfEntry);
        };

        let len = cached.data.len() as u64;
        let end = entry.offset().saturating_add(entry.size()).min(len);
        if self.cursor >= end {
            return Ok(ReadStatus::EndOfEntry);
        }
        let n = (end - self.cursor).min(buf.len() as u64) as usize;
        let start = self.cursor as usize;
        buf[..n].copy_from_slice(&cached.data[start..start + n]);

        self.cursor += n as u64;
        self.stats.bytes_served += n as u64;
        if n > 0 {
            self.consumed[index] = true;
        }
        Ok(ReadStatus::Read(n))
    }

    /// Bytes left in the current entry.
    pub fn remaining(&self) -> u64 {
        let Some(entry) = self.current_entry() else { return 0 };
        let Some(folder) = entry.folder() else { return 0 };
        match self.cached.as_ref().filter(|c| c.id == folder) {
            Some(c) => {
                let end = entry.offset().saturating_add(entry.size()).min(c.data.len() as u64);
                end.saturating_sub(self.cursor)
            }
            None => 0,
        }
    }

    /// [`Read`] adapter over the current entry.
    pub fn entry_reader(&mut self) -> EntryReader<'_, S> {
        EntryReader { inner: self }
    }

    /// Read whatever is left of the current entry.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.remaining() as usize);
        let mut buf = [0u8; 8192];
        loop {
            match self.read(&mut buf)? {
                ReadStatus::Read(n) => out.extend_from_slice(&buf[..n]),
                ReadStatus::EndOfEntry => return Ok(out),
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Release the cached folder and close the store.  Further operations
    /// fail with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cached = None;
        self.current = None;
        self.position = None;
        self.store.close()?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl<S: Store> Drop for SolidReader<S> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.store.close();
        }
    }
}

/// Borrowing [`Read`] view of the current entry.  End of entry reads as
/// `Ok(0)`.
pub struct EntryReader<'a, S: Store> {
    inner: &'a mut SolidReader<S>,
}

impl<S: Store> Read for EntryReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(ReadStatus::Read(n)) => Ok(n),
            Ok(ReadStatus::EndOfEntry) => Ok(0),
            Err(Error::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use byteorder::{LittleEndian, WriteBytesExt};

    /// One copy folder holding "hello" + "world", one empty file, one dir.
    fn tiny_archive() -> Vec<u8> {
        let payload = b"helloworld";
        let mut header = Vec::new();
        header.write_u32::<LittleEndian>(1).unwrap();
        header.write_u64::<LittleEndian>(SUPERBLOCK_SIZE as u64).unwrap();
        header.write_u64::<LittleEndian>(payload.len() as u64).unwrap();
        header.write_u64::<LittleEndian>(payload.len() as u64).unwrap();
        header.write_u8(0).unwrap();
        header.write_u32::<LittleEndian>(0).unwrap();
        header.write_u8(1).unwrap();
        header.write_u8(0x00).unwrap();
        header.write_u16::<LittleEndian>(0).unwrap();
        header.write_u32::<LittleEndian>(4).unwrap();
        for (name, attrs, size) in [("h", 2u8, 5u64), ("empty", 0, 0), ("d", 1, 0), ("w", 2, 5)] {
            header.write_u16::<LittleEndian>(name.len() as u16).unwrap();
            header.extend_from_slice(name.as_bytes());
            header.write_u8(attrs).unwrap();
            if attrs & 2 != 0 {
                header.write_u32::<LittleEndian>(0).unwrap();
                header.write_u64::<LittleEndian>(size).unwrap();
            }
        }

        let mut sb = Superblock::new();
        sb.header_offset = (SUPERBLOCK_SIZE + payload.len()) as u64;
        sb.header_size = header.len() as u64;
        sb.header_crc32 = crc32fast::hash(&header);
        let mut out = Vec::new();
        sb.write(&mut out).unwrap();
        out.extend_from_slice(payload);
        out.extend_from_slice(&header);
        out
    }

    fn open() -> SolidReader<MemoryStore> {
        SolidReader::open(MemoryStore::from_vec(tiny_archive()), ReaderOptions::default()).unwrap()
    }

    #[test]
    fn read_before_selection() {
        let mut r = open();
        assert!(matches!(r.read(&mut [0u8; 4]), Err(Error::NoCurrentEntry)));
    }

    #[test]
    fn partial_reads_stop_at_entry_end() {
        let mut r = open();
        r.jump_to(0).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(r.read(&mut buf).unwrap(), ReadStatus::Read(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.read(&mut buf).unwrap(), ReadStatus::Read(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(r.read(&mut buf).unwrap(), ReadStatus::EndOfEntry);
        assert!(r.is_consumed(0));
        assert!(!r.is_consumed(3));
    }

    #[test]
    fn streamless_entries_keep_the_cache() {
        let mut r = open();
        r.jump_to(0).unwrap();
        r.jump_to(1).unwrap();
        assert_eq!(r.read(&mut [0u8; 4]).unwrap(), ReadStatus::EndOfEntry);
        r.jump_to(2).unwrap();
        assert_eq!(r.read(&mut [0u8; 4]).unwrap(), ReadStatus::EndOfEntry);
        r.jump_to(3).unwrap();
        assert_eq!(r.read_to_end().unwrap(), b"world");
        assert_eq!(r.stats().folder_decodes, 1);
    }

    #[test]
    fn next_entry_walks_then_stops() {
        let mut r = open();
        let mut names = Vec::new();
        while let Some(e) = r.next_entry().unwrap() {
            names.push(e.name().to_string());
        }
        assert_eq!(names, ["h", "empty", "d", "w"]);
        assert!(r.next_entry().unwrap().is_none());
        assert_eq!(r.current_entry().unwrap().name(), "w");
    }

    #[test]
    fn jump_out_of_range() {
        let mut r = open();
        assert!(matches!(r.jump_to(4), Err(Error::EntryOutOfRange { index: 4, count: 4 })));
        assert_eq!(r.next_entry().unwrap().unwrap().name(), "h");
    }

    #[test]
    fn entry_reader_ends_with_zero() {
        let mut r = open();
        r.jump_to(3).unwrap();
        let mut s = String::new();
        r.entry_reader().read_to_string(&mut s).unwrap();
        assert_eq!(s, "world");
    }

    #[test]
    fn closed_reader_rejects_everything() {
        let mut r = open();
        r.jump_to(0).unwrap();
        r.close().unwrap();
        r.close().unwrap();
        assert!(matches!(r.jump_to(0), Err(Error::Closed)));
        assert!(matches!(r.next_entry(), Err(Error::Closed)));
        assert!(matches!(r.read(&mut [0u8; 1]), Err(Error::Closed)));
    }

    #[test]
    fn header_crc_mismatch_closes_store() {
        let mut bytes = tiny_archive();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = SolidReader::open(MemoryStore::from_vec(bytes), ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::HeaderChecksum { .. }));
        assert!(err.is_header_malformation());
    }

    #[test]
    fn short_store_is_malformed() {
        let err = SolidReader::open(MemoryStore::from_vec(vec![0u8; 10]), ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::MalformedHeader(_)));
    }

    #[test]
    fn header_past_store_end_is_malformed() {
        let mut bytes = tiny_archive();
        bytes.truncate(bytes.len() - 2);
        let err = SolidReader::open(MemoryStore::from_vec(bytes), ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::MalformedHeader(_)));
        assert!(!matches!(err, Error::Store(StoreError::UnexpectedEnd { .. })));
    }
}
