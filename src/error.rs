//! Crate-level error type.
//!
//! Subsystem errors convert into [`Error`] with `?`.  The reader treats two
//! groups differently:
//!
//! - storage faults ([`Error::is_storage_fault`]) are always returned to the
//!   caller of the operation that hit them;
//! - folder decode faults are captured by the navigator and degrade the
//!   folder to an empty buffer, unless strict mode is on.

use std::io;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::folder::FolderError;
use crate::store::StoreError;
use crate::superblock::SuperblockError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Superblock error: {0}")]
    Superblock(#[from] SuperblockError),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Header checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    HeaderChecksum { expected: u32, actual: u32 },

    #[error("Folder {folder} failed to decode: {source}")]
    FolderDecode {
        folder: usize,
        #[source]
        source: FolderError,
    },

    #[error("Key derivation failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Entry index {index} is out of range ({count} entries)")]
    EntryOutOfRange { index: usize, count: usize },

    #[error("No current entry, call next_entry or jump_to first")]
    NoCurrentEntry,

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry {name} is unreadable: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("CRC mismatch for {name}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { name: String, expected: u32, actual: u32 },

    #[error("Archive is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Faults of the underlying medium: never retried, never degraded.
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Io(_))
    }

    /// Errors that make an archive unusable at open time.
    pub fn is_header_malformation(&self) -> bool {
        matches!(
            self,
            Error::Superblock(_) | Error::MalformedHeader(_) | Error::HeaderChecksum { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
