//! Hand-assembled archives for integration tests.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use solidarc::codec::{ID_AES_GCM, ID_COPY, ID_DELTA, ID_LZ4, ID_ZSTD};
use solidarc::crypto;
use solidarc::index::{ATTR_DIRECTORY, ATTR_HAS_CRC, ATTR_HAS_MTIME, ATTR_HAS_STREAM};
use solidarc::superblock::{Superblock, SB_FLAG_ENCRYPTED, SUPERBLOCK_SIZE};
use solidarc::{MemoryStore, ReaderOptions, SolidReader};
use uuid::Uuid;

struct FolderDef {
    pack:        Vec<u8>,
    unpack_size: u64,
    crc:         Option<u32>,
    coders:      Vec<(u8, Vec<u8>)>,
}

struct EntryDef {
    name:   String,
    dir:    bool,
    stream: Option<(u32, u64)>,
    mtime:  Option<i64>,
    crc:    Option<u32>,
}

pub struct ArchiveBuilder {
    uuid:    Uuid,
    folders: Vec<FolderDef>,
    entries: Vec<EntryDef>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self { uuid: Uuid::new_v4(), folders: Vec::new(), entries: Vec::new() }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Folder with arbitrary packed bytes and coder chain.
    pub fn raw_folder(&mut self, pack: Vec<u8>, unpack_size: u64, coders: Vec<(u8, Vec<u8>)>) -> u32 {
        self.folders.push(FolderDef { pack, unpack_size, crc: None, coders });
        (self.folders.len() - 1) as u32
    }

    pub fn copy_folder(&mut self, contents: &[u8]) -> u32 {
        self.checked(contents.to_vec(), contents, vec![(ID_COPY, vec![])])
    }

    pub fn lz4_folder(&mut self, contents: &[u8]) -> u32 {
        self.checked(lz4_flex::block::compress(contents), contents, vec![(ID_LZ4, vec![])])
    }

    pub fn zstd_folder(&mut self, contents: &[u8]) -> u32 {
        let packed = zstd::encode_all(contents, 3).expect("zstd");
        self.checked(packed, contents, vec![(ID_ZSTD, vec![])])
    }

    /// zstd stage followed by a delta(1) filter.
    pub fn zstd_delta_folder(&mut self, contents: &[u8]) -> u32 {
        let mut deltas = contents.to_vec();
        for i in (1..deltas.len()).rev() {
            deltas[i] = deltas[i].wrapping_sub(deltas[i - 1]);
        }
        let packed = zstd::encode_all(&deltas[..], 3).expect("zstd");
        self.checked(packed, contents, vec![(ID_ZSTD, vec![]), (ID_DELTA, vec![0])])
    }

    /// AES-GCM stage followed by zstd, keyed from `password` and this
    /// archive's UUID.
    pub fn encrypted_folder(&mut self, contents: &[u8], password: &str) -> u32 {
        let key = crypto::derive_key(password, &self.uuid).expect("derive");
        let packed = zstd::encode_all(contents, 3).expect("zstd");
        let sealed = crypto::seal(&key, &packed).expect("seal");
        self.checked(sealed, contents, vec![(ID_AES_GCM, vec![]), (ID_ZSTD, vec![])])
    }

    fn checked(&mut self, pack: Vec<u8>, contents: &[u8], coders: Vec<(u8, Vec<u8>)>) -> u32 {
        self.folders.push(FolderDef {
            pack,
            unpack_size: contents.len() as u64,
            crc: Some(crc32fast::hash(contents)),
            coders,
        });
        (self.folders.len() - 1) as u32
    }

    pub fn file(&mut self, name: &str, folder: u32, size: u64) -> &mut Self {
        self.entries.push(EntryDef {
            name:   name.to_string(),
            dir:    false,
            stream: Some((folder, size)),
            mtime:  None,
            crc:    None,
        });
        self
    }

    pub fn file_with_crc(&mut self, name: &str, folder: u32, contents: &[u8]) -> &mut Self {
        self.file(name, folder, contents.len() as u64);
        if let Some(last) = self.entries.last_mut() {
            last.crc = Some(crc32fast::hash(contents));
        }
        self
    }

    pub fn empty_file(&mut self, name: &str) -> &mut Self {
        self.entries.push(EntryDef { name: name.to_string(), dir: false, stream: None, mtime: None, crc: None });
        self
    }

    pub fn dir(&mut self, name: &str) -> &mut Self {
        self.entries.push(EntryDef { name: name.to_string(), dir: true, stream: None, mtime: None, crc: None });
        self
    }

    pub fn mtime(&mut self, secs: i64) -> &mut Self {
        if let Some(last) = self.entries.last_mut() {
            last.mtime = Some(secs);
        }
        self
    }

    /// Header bytes only.
    pub fn header(&self) -> Vec<u8> {
        let mut h = Vec::new();
        h.write_u32::<LittleEndian>(self.folders.len() as u32).unwrap();
        let mut offset = SUPERBLOCK_SIZE as u64;
        for f in &self.folders {
            h.write_u64::<LittleEndian>(offset).unwrap();
            h.write_u64::<LittleEndian>(f.pack.len() as u64).unwrap();
            h.write_u64::<LittleEndian>(f.unpack_size).unwrap();
            h.write_u8(f.crc.is_some() as u8).unwrap();
            h.write_u32::<LittleEndian>(f.crc.unwrap_or(0)).unwrap();
            h.write_u8(f.coders.len() as u8).unwrap();
            for (id, props) in &f.coders {
                h.write_u8(*id).unwrap();
                h.write_u16::<LittleEndian>(props.len() as u16).unwrap();
                h.extend_from_slice(props);
            }
            offset += f.pack.len() as u64;
        }

        h.write_u32::<LittleEndian>(self.entries.len() as u32).unwrap();
        for e in &self.entries {
            h.write_u16::<LittleEndian>(e.name.len() as u16).unwrap();
            h.extend_from_slice(e.name.as_bytes());
            let mut attrs = 0u8;
            if e.dir { attrs |= ATTR_DIRECTORY; }
            if e.stream.is_some() { attrs |= ATTR_HAS_STREAM; }
            if e.mtime.is_some() { attrs |= ATTR_HAS_MTIME; }
            if e.crc.is_some() { attrs |= ATTR_HAS_CRC; }
            h.write_u8(attrs).unwrap();
            if let Some((folder, size)) = e.stream {
                h.write_u32::<LittleEndian>(folder).unwrap();
                h.write_u64::<LittleEndian>(size).unwrap();
            }
            if let Some(t) = e.mtime {
                h.write_i64::<LittleEndian>(t).unwrap();
            }
            if let Some(c) = e.crc {
                h.write_u32::<LittleEndian>(c).unwrap();
            }
        }
        h
    }

    pub fn build(&self) -> Vec<u8> {
        let header = self.header();
        let packed: usize = self.folders.iter().map(|f| f.pack.len()).sum();

        let mut sb = Superblock::new();
        sb.archive_uuid = self.uuid;
        if self.folders.iter().any(|f| f.coders.iter().any(|(id, _)| *id == ID_AES_GCM)) {
            sb.flags |= SB_FLAG_ENCRYPTED;
        }
        sb.header_offset = (SUPERBLOCK_SIZE + packed) as u64;
        sb.header_size = header.len() as u64;
        sb.header_crc32 = crc32fast::hash(&header);

        let mut out = Vec::new();
        sb.write(&mut out).unwrap();
        for f in &self.folders {
            out.extend_from_slice(&f.pack);
        }
        out.extend_from_slice(&header);
        out
    }

    pub fn open(&self) -> SolidReader<MemoryStore> {
        self.open_with(ReaderOptions::default())
    }

    pub fn open_with(&self, options: ReaderOptions) -> SolidReader<MemoryStore> {
        SolidReader::open(MemoryStore::from_vec(self.build()), options).expect("open")
    }
}

/// Five entries over three folders:
///
/// | idx | name  | folder | contents |
/// |-----|-------|--------|----------|
/// | 0   | 1.txt | 0      | foo      |
/// | 1   | 3.txt | 0      | bar      |
/// | 2   | 4.txt | 1      | baz      |
/// | 3   | 2.txt | 2 (no packed bytes) | |
/// | 4   | 5.txt | 2 (no packed bytes) | |
pub fn set_entry_archive() -> ArchiveBuilder {
    let mut b = ArchiveBuilder::new();
    let f1 = b.lz4_folder(b"foobar");
    let f2 = b.copy_folder(b"baz");
    let f3 = b.raw_folder(Vec::new(), 7, vec![(ID_COPY, vec![])]);
    b.file("1.txt", f1, 3)
        .file("3.txt", f1, 3)
        .file("4.txt", f2, 3)
        .file("2.txt", f3, 3)
        .file("5.txt", f3, 4);
    b
}
