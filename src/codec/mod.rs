//! Coder registry for folder decode chains.
//!
//! Every coder stage in a folder is identified on disk by a single byte.
//! The byte is resolved here to a built-in [`Codec`]; an id this build does
//! not know is reported as [`CodecError::UnavailableCodec`] and the folder
//! cannot be decoded.  There is no fallback to another coder.
//!
//! Stages are pure functions from input bytes to output bytes.  Each one is
//! handed a [`StageContext`] carrying the largest output it may produce and
//! the archive key, if one was derived.

use std::io::{self, Read};
use thiserror::Error;

use crate::block::{decompress_block_with_limit, BlockError};
use crate::crypto::{self, CryptoError, FolderKey};

// ── Frozen coder ids ────────────────────────────────────────────────────────
//
// These values are permanent.  An id is never reused, even if a coder is
// retired.

pub const ID_COPY:     u8 = 0x00;
pub const ID_LZ4:      u8 = 0x01;
pub const ID_ZSTD:     u8 = 0x02;
pub const ID_BROTLI:   u8 = 0x03;
pub const ID_LZMA:     u8 = 0x04;
pub const ID_DELTA:    u8 = 0x10;
pub const ID_AES_GCM:  u8 = 0x20;

/// Largest delta distance the filter props can express.
pub const MAX_DELTA_DISTANCE: usize = 256;

// ── CodecId enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Copy,
    Lz4,
    Zstd,
    Brotli,
    Lzma,
    Delta,
    AesGcm,
}

impl CodecId {
    /// On-disk byte for this coder.
    #[inline]
    pub fn id(self) -> u8 {
        match self {
            CodecId::Copy   => ID_COPY,
            CodecId::Lz4    => ID_LZ4,
            CodecId::Zstd   => ID_ZSTD,
            CodecId::Brotli => ID_BROTLI,
            CodecId::Lzma   => ID_LZMA,
            CodecId::Delta  => ID_DELTA,
            CodecId::AesGcm => ID_AES_GCM,
        }
    }

    /// Returns `None` if the id is not recognised by this build.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            ID_COPY    => Some(CodecId::Copy),
            ID_LZ4     => Some(CodecId::Lz4),
            ID_ZSTD    => Some(CodecId::Zstd),
            ID_BROTLI  => Some(CodecId::Brotli),
            ID_LZMA    => Some(CodecId::Lzma),
            ID_DELTA   => Some(CodecId::Delta),
            ID_AES_GCM => Some(CodecId::AesGcm),
            _          => None,
        }
    }

    /// Human-readable name (for diagnostics only, never parsed from disk).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Copy   => "copy",
            CodecId::Lz4    => "lz4-block",
            CodecId::Zstd   => "zstd",
            CodecId::Brotli => "brotli",
            CodecId::Lzma   => "lzma",
            CodecId::Delta  => "delta",
            CodecId::AesGcm => "aes-256-gcm",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "copy"                => Some(CodecId::Copy),
            "lz4" | "lz4-block"   => Some(CodecId::Lz4),
            "zstd"                => Some(CodecId::Zstd),
            "brotli"              => Some(CodecId::Brotli),
            "lzma"                => Some(CodecId::Lzma),
            "delta"               => Some(CodecId::Delta),
            "aes" | "aes-256-gcm" => Some(CodecId::AesGcm),
            _                     => None,
        }
    }

    /// Whether this stage needs the archive key.
    pub fn is_encryption(self) -> bool {
        matches!(self, CodecId::AesGcm)
    }
}

/// Display name for a raw id, including ids this build does not know.
pub fn id_name(id: u8) -> String {
    match CodecId::from_id(id) {
        Some(c) => c.name().to_string(),
        None    => format!("unknown(0x{id:02x})"),
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Coder 0x{id:02x} is not available in this build")]
    UnavailableCodec { id: u8 },
    #[error("Invalid properties for {codec}: {reason}")]
    InvalidProps { codec: &'static str, reason: String },
    #[error("{codec} output exceeds {limit} bytes")]
    OutputLimit { codec: &'static str, limit: usize },
    #[error("LZ4 block error: {0}")]
    Block(#[from] BlockError),
    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

/// Per-stage inputs that are not part of the coder's own properties.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Largest output the stage may produce.
    pub size_limit: usize,
    pub key:        Option<&'a FolderKey>,
}

impl StageContext<'_> {
    pub fn unbounded() -> Self {
        StageContext { size_limit: usize::MAX, key: None }
    }
}

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError>;
}

/// Drain `reader` into a buffer, failing once more than `limit` bytes appear.
fn read_limited<R: Read>(reader: R, limit: usize, codec: &'static str) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let cap = (limit as u64).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Decompression(format!("{codec}: {e}")))?;
    if out.len() > limit {
        return Err(CodecError::OutputLimit { codec, limit });
    }
    Ok(out)
}

fn no_props(codec: &'static str, props: &[u8]) -> Result<(), CodecError> {
    if !props.is_empty() {
        return Err(CodecError::InvalidProps {
            codec,
            reason: format!("expected no properties, got {} bytes", props.len()),
        });
    }
    Ok(())
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct CopyCodec;
impl Codec for CopyCodec {
    fn codec_id(&self) -> CodecId { CodecId::Copy }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("copy", props)?;
        if data.len() > ctx.size_limit {
            return Err(CodecError::OutputLimit { codec: "copy", limit: ctx.size_limit });
        }
        Ok(data.to_vec())
    }
}

pub struct Lz4BlockCodec;
impl Codec for Lz4BlockCodec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("lz4-block", props)?;
        Ok(decompress_block_with_limit(data, ctx.size_limit)?)
    }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("zstd", props)?;
        let decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        read_limited(decoder, ctx.size_limit, "zstd")
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn codec_id(&self) -> CodecId { CodecId::Brotli }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("brotli", props)?;
        read_limited(brotli::Decompressor::new(data, 4096), ctx.size_limit, "brotli")
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn codec_id(&self) -> CodecId { CodecId::Lzma }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("lzma", props)?;
        // Dictionary and output are both capped at the stage limit.  The
        // dictionary never holds more bytes than have been decoded, so
        // hitting its cap means the output is over the limit too.
        let options = lzma_rs::decompress::Options {
            memlimit: Some(ctx.size_limit),
            ..Default::default()
        };
        let mut sink = LimitedSink::new(ctx.size_limit);
        match lzma_rs::lzma_decompress_with_options(&mut io::Cursor::new(data), &mut sink, &options) {
            Ok(()) => Ok(sink.out),
            Err(_) if sink.overflowed => {
                Err(CodecError::OutputLimit { codec: "lzma", limit: ctx.size_limit })
            }
            Err(lzma_rs::error::Error::LzmaError(msg)) if msg.starts_with("exceeded memory limit") => {
                Err(CodecError::OutputLimit { codec: "lzma", limit: ctx.size_limit })
            }
            Err(e) => Err(CodecError::Decompression(e.to_string())),
        }
    }
}

/// Writer that refuses to hold more than `limit` bytes.
struct LimitedSink {
    out:        Vec<u8>,
    limit:      usize,
    overflowed: bool,
}

impl LimitedSink {
    fn new(limit: usize) -> Self {
        Self { out: Vec::new(), limit, overflowed: false }
    }
}

impl io::Write for LimitedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.limit - self.out.len() {
            self.overflowed = true;
            return Err(io::Error::new(io::ErrorKind::WriteZero, "stage output limit reached"));
        }
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Byte-wise delta filter.  Props hold `distance - 1`.
pub struct DeltaCodec;
impl DeltaCodec {
    pub fn distance(props: &[u8]) -> Result<usize, CodecError> {
        match props {
            [d] => Ok(usize::from(*d) + 1),
            _   => Err(CodecError::InvalidProps {
                codec:  "delta",
                reason: format!("expected 1 byte, got {}", props.len()),
            }),
        }
    }
}
impl Codec for DeltaCodec {
    fn codec_id(&self) -> CodecId { CodecId::Delta }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        let distance = Self::distance(props)?;
        if data.len() > ctx.size_limit {
            return Err(CodecError::OutputLimit { codec: "delta", limit: ctx.size_limit });
        }
        let mut out = data.to_vec();
        for i in distance..out.len() {
            out[i] = out[i].wrapping_add(out[i - distance]);
        }
        Ok(out)
    }
}

/// AES-256-GCM stage.  Needs the key derived from the archive password.
pub struct AesGcmCodec;
impl Codec for AesGcmCodec {
    fn codec_id(&self) -> CodecId { CodecId::AesGcm }
    fn decompress(&self, data: &[u8], props: &[u8], ctx: &StageContext<'_>) -> Result<Vec<u8>, CodecError> {
        no_props("aes-256-gcm", props)?;
        let key = ctx.key.ok_or(CryptoError::MissingKey)?;
        if crypto::opened_len(data)? > ctx.size_limit {
            return Err(CodecError::OutputLimit { codec: "aes-256-gcm", limit: ctx.size_limit });
        }
        Ok(crypto::open(key, data)?)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve an on-disk coder id to a built-in codec.
///
/// Returns `Err(CodecError::UnavailableCodec)` if the id is not recognised.
pub fn get_codec_by_id(id: u8) -> Result<Box<dyn Codec>, CodecError> {
    match CodecId::from_id(id) {
        Some(c) => Ok(get_codec(c)),
        None    => Err(CodecError::UnavailableCodec { id }),
    }
}

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Copy   => Box::new(CopyCodec),
        CodecId::Lz4    => Box::new(Lz4BlockCodec),
        CodecId::Zstd   => Box::new(ZstdCodec),
        CodecId::Brotli => Box::new(BrotliCodec),
        CodecId::Lzma   => Box::new(LzmaCodec),
        CodecId::Delta  => Box::new(DeltaCodec),
        CodecId::AesGcm => Box::new(AesGcmCodec),
    }
}
