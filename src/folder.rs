//! Folder decode unit.
//!
//! Turns one folder's packed region into its full decoded buffer by running
//! the coder chain in order.  Decoding is all-or-nothing: the caller either
//! gets exactly `unpack_size` bytes or a [`FolderError`].

use thiserror::Error;
use tracing::debug;

use crate::codec::{get_codec_by_id, id_name, CodecError, StageContext};
use crate::crypto::FolderKey;
use crate::index::Folder;
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum FolderError {
    /// The packed bytes could not be fetched.  Always a storage fault.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Folder has no coders")]
    EmptyChain,
    #[error("Stage {stage} ({coder}) failed: {source}")]
    Stage {
        stage:  usize,
        coder:  String,
        #[source]
        source: CodecError,
    },
    #[error("Decoded {actual} bytes, folder declares {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("Folder CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("Folder declares {size} unpacked bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

impl FolderError {
    pub fn is_storage_fault(&self) -> bool {
        matches!(self, FolderError::Store(_))
    }
}

/// Decode parameters that come from the reader rather than the folder.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub key:             Option<&'a FolderKey>,
    pub verify_crc:      bool,
    pub max_folder_size: u64,
}

/// Read and decode `folder` from `store`.
pub fn decode_folder<S: Store + ?Sized>(
    store:  &mut S,
    folder: &Folder,
    ctx:    &DecodeContext<'_>,
) -> Result<Vec<u8>, FolderError> {
    if folder.unpack_size == 0 {
        return Ok(Vec::new());
    }
    if folder.unpack_size > ctx.max_folder_size {
        return Err(FolderError::TooLarge { size: folder.unpack_size, limit: ctx.max_folder_size });
    }
    if folder.coders.is_empty() {
        return Err(FolderError::EmptyChain);
    }
    let unpack_size = usize::try_from(folder.unpack_size)
        .map_err(|_| FolderError::TooLarge { size: folder.unpack_size, limit: usize::MAX as u64 })?;

    // Refuse to allocate for a region the store cannot hold.
    let available = store.size()?;
    let end = folder.pack_end().unwrap_or(u64::MAX);
    if end > available {
        return Err(StoreError::UnexpectedEnd {
            offset:    folder.pack_offset,
            wanted:    folder.pack_size,
            available: available.saturating_sub(folder.pack_offset),
        }
        .into());
    }
    let mut data = vec![0u8; folder.pack_size as usize];
    store.read_exact_at(folder.pack_offset, &mut data)?;

    debug!(
        folder = %folder.id,
        coders = ?folder.coder_names(),
        packed = folder.pack_size,
        unpacked = folder.unpack_size,
        "decoding folder"
    );

    let last = folder.coders.len() - 1;
    for (stage, coder) in folder.coders.iter().enumerate() {
        let stage_err = |source| FolderError::Stage { stage, coder: id_name(coder.id), source };
        let codec = get_codec_by_id(coder.id).map_err(stage_err)?;
        let size_limit = if stage == last {
            unpack_size
        } else {
            usize::try_from(ctx.max_folder_size).unwrap_or(usize::MAX)
        };
        let stage_ctx = StageContext { size_limit, key: ctx.key };
        data = codec.decompress(&data, &coder.props, &stage_ctx).map_err(stage_err)?;
    }

    if data.len() as u64 != folder.unpack_size {
        return Err(FolderError::SizeMismatch {
            expected: folder.unpack_size,
            actual:   data.len() as u64,
        });
    }
    if ctx.verify_crc {
        if let Some(expected) = folder.crc {
            let actual = crc32fast::hash(&data);
            if actual != expected {
                return Err(FolderError::CrcMismatch { expected, actual });
            }
        }
    }
    Ok(data)
}
