//! Fixed 48-byte signature header at offset 0.
//!
//! | Off | Size | Field |
//! |-----|------|-------|
//! | 0   | 4    | magic `SLDA` |
//! | 4   | 4    | format version |
//! | 8   | 4    | flags |
//! | 12  | 16   | archive UUID |
//! | 28  | 8    | header offset |
//! | 36  | 8    | header size |
//! | 44  | 4    | CRC-32 of the header bytes |

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;
use uuid::Uuid;

pub const MAGIC: &[u8; 4] = b"SLDA";
pub const VERSION: u32 = 1;
pub const SUPERBLOCK_SIZE: usize = 48;

/// Set when at least one folder carries an encryption stage.
pub const SB_FLAG_ENCRYPTED: u32 = 1 << 0;

#[derive(Error, Debug)]
pub enum SuperblockError {
    #[error("Invalid magic number {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub version:       u32,
    pub flags:         u32,
    pub archive_uuid:  Uuid,
    pub header_offset: u64,
    pub header_size:   u64,
    pub header_crc32:  u32,
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

impl Superblock {
    pub fn new() -> Self {
        Self {
            version:       VERSION,
            flags:         0,
            archive_uuid:  Uuid::new_v4(),
            header_offset: SUPERBLOCK_SIZE as u64,
            header_size:   0,
            header_crc32:  0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & SB_FLAG_ENCRYPTED != 0
    }

    /// Offset one past the last header byte.
    pub fn header_end(&self) -> Option<u64> {
        self.header_offset.checked_add(self.header_size)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_all(self.archive_uuid.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.header_offset)?;
        writer.write_u64::<LittleEndian>(self.header_size)?;
        writer.write_u32::<LittleEndian>(self.header_crc32)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, SuperblockError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(SuperblockError::InvalidMagic(magic));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(SuperblockError::UnsupportedVersion(version));
        }
        let flags = reader.read_u32::<LittleEndian>()?;
        let mut uuid_bytes = [0u8; 16];
        reader.read_exact(&mut uuid_bytes)?;
        Ok(Self {
            version,
            flags,
            archive_uuid:  Uuid::from_bytes(uuid_bytes),
            header_offset: reader.read_u64::<LittleEndian>()?,
            header_size:   reader.read_u64::<LittleEndian>()?,
            header_crc32:  reader.read_u32::<LittleEndian>()?,
        })
    }
}
