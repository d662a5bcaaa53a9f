//! Archive entry table: folders and entries decoded from the header region.
//!
//! The header is parsed once at open time.  Every structural problem found
//! here is fatal and reported as [`Error::MalformedHeader`]; problems inside
//! a folder's packed bytes are only discovered when the folder is decoded.
//!
//! ```text
//! header   := folder_count:u32 folder* entry_count:u32 entry*
//! folder   := pack_offset:u64 pack_size:u64 unpack_size:u64
//!             has_crc:u8 crc:u32 coder_count:u8 coder*
//! coder    := id:u8 props_len:u16 props
//! entry    := name_len:u16 name attributes:u8
//!             [has_stream] folder_index:u32 size:u64
//!             [has_mtime]  mtime:i64
//!             [has_crc]    crc:u32
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::byte_utils::{from_little_endian_at, ByteUtilsError};
use crate::codec::{id_name, CodecId};
use crate::error::{Error, Result};

// ── Entry attribute bits ─────────────────────────────────────────────────────

pub const ATTR_DIRECTORY:  u8 = 1 << 0;
pub const ATTR_HAS_STREAM: u8 = 1 << 1;
pub const ATTR_HAS_MTIME:  u8 = 1 << 2;
pub const ATTR_HAS_CRC:    u8 = 1 << 3;
const ATTR_KNOWN: u8 = ATTR_DIRECTORY | ATTR_HAS_STREAM | ATTR_HAS_MTIME | ATTR_HAS_CRC;

// ── Folders ──────────────────────────────────────────────────────────────────

/// Position of a folder in the table.  This is the folder's identity for
/// caching: two entries share decoded bytes iff their `FolderId`s are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FolderId(pub usize);

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coder {
    pub id:    u8,
    pub props: Vec<u8>,
}

impl Coder {
    pub fn new(id: CodecId, props: Vec<u8>) -> Self {
        Self { id: id.id(), props }
    }

    pub fn name(&self) -> String {
        id_name(self.id)
    }
}

/// A solid block: one packed region that decodes to the concatenated
/// contents of all entries assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id:          FolderId,
    /// Absolute store offset of the packed bytes.
    pub pack_offset: u64,
    pub pack_size:   u64,
    pub unpack_size: u64,
    pub crc:         Option<u32>,
    /// Applied in order, first coder consumes the packed bytes.
    pub coders:      Vec<Coder>,
}

impl Folder {
    pub fn is_encrypted(&self) -> bool {
        self.coders
            .iter()
            .any(|c| CodecId::from_id(c.id).map_or(false, CodecId::is_encryption))
    }

    pub fn coder_names(&self) -> Vec<String> {
        self.coders.iter().map(Coder::name).collect()
    }

    pub fn pack_end(&self) -> Option<u64> {
        self.pack_offset.checked_add(self.pack_size)
    }
}

// ── Entries ──────────────────────────────────────────────────────────────────

/// One archive member.  Immutable once the table is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    index:    usize,
    name:     String,
    dir:      bool,
    size:     u64,
    folder:   Option<FolderId>,
    offset:   u64,
    modified: Option<DateTime<Utc>>,
    crc:      Option<u32>,
}

impl Entry {
    /// Position in the archive's entry sequence.
    pub fn index(&self) -> usize { self.index }
    pub fn name(&self) -> &str { &self.name }
    pub fn is_directory(&self) -> bool { self.dir }
    pub fn size(&self) -> u64 { self.size }
    /// `None` for directories and empty files.
    pub fn folder(&self) -> Option<FolderId> { self.folder }
    pub fn has_stream(&self) -> bool { self.folder.is_some() }
    /// Start of this entry's bytes within its folder's decoded buffer.
    pub fn offset(&self) -> u64 { self.offset }
    pub fn modified(&self) -> Option<DateTime<Utc>> { self.modified }
    pub fn crc(&self) -> Option<u32> { self.crc }
}

// ── Table ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    folders: Vec<Folder>,
    entries: Vec<Entry>,
}

impl EntryTable {
    pub fn parse(header: &[u8]) -> Result<Self> {
        let mut r = HeaderReader { bytes: header, pos: 0 };

        let folder_count = r.u32("folder count")? as usize;
        // Each folder record is at least 30 bytes.
        if folder_count > header.len() / 30 {
            return Err(malformed(format!("folder count {folder_count} exceeds header size")));
        }
        let mut folders = Vec::with_capacity(folder_count);
        for i in 0..folder_count {
            folders.push(r.folder(FolderId(i))?);
        }

        let entry_count = r.u32("entry count")? as usize;
        if entry_count > header.len().saturating_sub(r.pos) / 3 {
            return Err(malformed(format!("entry count {entry_count} exceeds header size")));
        }
        let mut entries = Vec::with_capacity(entry_count);
        let mut filled = vec![0u64; folder_count];
        for index in 0..entry_count {
            entries.push(r.entry(index, &mut filled)?);
        }

        if r.pos != header.len() {
            return Err(malformed(format!(
                "{} trailing bytes after entry records",
                header.len() - r.pos
            )));
        }
        for (folder, used) in folders.iter().zip(&filled) {
            if folder.unpack_size != *used {
                return Err(malformed(format!(
                    "folder {} declares {} unpacked bytes but its entries total {}",
                    folder.id, folder.unpack_size, used
                )));
            }
        }

        Ok(Self { folders, entries })
    }

    pub fn entries(&self) -> &[Entry] { &self.entries }
    pub fn folders(&self) -> &[Folder] { &self.folders }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(id.0)
    }

    /// First entry with exactly this name.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries stored in `folder`, in folder order.
    pub fn entries_in(&self, folder: FolderId) -> impl Iterator<Item = &Entry> + '_ {
        self.entries.iter().filter(move |e| e.folder == Some(folder))
    }

    pub fn has_encrypted_folders(&self) -> bool {
        self.folders.iter().any(Folder::is_encrypted)
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedHeader(msg.into())
}

// ── Record reader ────────────────────────────────────────────────────────────

struct HeaderReader<'a> {
    bytes: &'a [u8],
    pos:   usize,
}

impl HeaderReader<'_> {
    fn uint(&mut self, length: usize, what: &str) -> Result<u64> {
        let v = from_little_endian_at(self.bytes, self.pos, length).map_err(|e| match e {
            ByteUtilsError::OutOfBounds { .. } => {
                malformed(format!("truncated header reading {what} at offset {}", self.pos))
            }
            other => malformed(format!("{what}: {other}")),
        })?;
        self.pos += length;
        Ok(v)
    }

    fn u8(&mut self, what: &str) -> Result<u8> { Ok(self.uint(1, what)? as u8) }
    fn u16(&mut self, what: &str) -> Result<u16> { Ok(self.uint(2, what)? as u16) }
    fn u32(&mut self, what: &str) -> Result<u32> { Ok(self.uint(4, what)? as u32) }
    fn u64(&mut self, what: &str) -> Result<u64> { self.uint(8, what) }

    fn bytes(&mut self, len: usize, what: &str) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| malformed(format!("truncated header reading {what} at offset {}", self.pos)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn folder(&mut self, id: FolderId) -> Result<Folder> {
        let pack_offset = self.u64("pack offset")?;
        let pack_size = self.u64("pack size")?;
        let unpack_size = self.u64("unpack size")?;
        let has_crc = self.u8("folder crc flag")?;
        let crc_value = self.u32("folder crc")?;
        let crc = match has_crc {
            0 => None,
            1 => Some(crc_value),
            n => return Err(malformed(format!("folder {id}: invalid crc flag {n}"))),
        };
        if pack_offset.checked_add(pack_size).is_none() {
            return Err(malformed(format!("folder {id}: pack region overflows")));
        }

        let coder_count = self.u8("coder count")?;
        let mut coders = Vec::with_capacity(coder_count as usize);
        for _ in 0..coder_count {
            let cid = self.u8("coder id")?;
            let props_len = self.u16("coder props length")? as usize;
            let props = self.bytes(props_len, "coder props")?.to_vec();
            coders.push(Coder { id: cid, props });
        }

        Ok(Folder { id, pack_offset, pack_size, unpack_size, crc, coders })
    }

    fn entry(&mut self, index: usize, filled: &mut [u64]) -> Result<Entry> {
        let name_len = self.u16("name length")? as usize;
        let raw = self.bytes(name_len, "entry name")?;
        let name = std::str::from_utf8(raw)
            .map_err(|e| malformed(format!("entry {index}: name is not UTF-8: {e}")))?
            .to_owned();

        let attrs = self.u8("entry attributes")?;
        if attrs & !ATTR_KNOWN != 0 {
            return Err(malformed(format!("entry {name}: unknown attribute bits {attrs:#04x}")));
        }
        let dir = attrs & ATTR_DIRECTORY != 0;

        let (folder, size, offset) = if attrs & ATTR_HAS_STREAM != 0 {
            if dir {
                return Err(malformed(format!("directory {name} has a data stream")));
            }
            let fi = self.u32("folder index")? as usize;
            let size = self.u64("entry size")?;
            let slot = filled
                .get_mut(fi)
                .ok_or_else(|| malformed(format!("entry {name}: folder index {fi} out of range")))?;
            let offset = *slot;
            *slot = offset
                .checked_add(size)
                .ok_or_else(|| malformed(format!("entry {name}: size overflows its folder")))?;
            (Some(FolderId(fi)), size, offset)
        } else {
            (None, 0, 0)
        };

        let modified = if attrs & ATTR_HAS_MTIME != 0 {
            let secs = self.u64("mtime")? as i64;
            Some(
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| malformed(format!("entry {name}: mtime {secs} out of range")))?,
            )
        } else {
            None
        };

        let crc = if attrs & ATTR_HAS_CRC != 0 { Some(self.u32("entry crc")?) } else { None };

        Ok(Entry { index, name, dir, size, folder, offset, modified, crc })
    }
}
