pub mod store;
pub mod byte_utils;
pub mod block;
pub mod codec;
pub mod crypto;
pub mod superblock;
pub mod index;
pub mod folder;
pub mod io_stream;
pub mod config;
pub mod error;
pub mod archive;
pub mod archiver;

pub use store::{Store, MemoryStore, FileStore, StoreError};
pub use block::{decompress_block, BlockError};
pub use codec::{CodecId, get_codec, get_codec_by_id};
pub use superblock::Superblock;
pub use index::{Entry, EntryTable, Folder, FolderId};
pub use folder::decode_folder;
pub use io_stream::{SolidReader, ReadStatus, NavigatorStats};
pub use config::ReaderOptions;
pub use error::{Error, Result};
pub use archive::{Archive, EntryInfo};
