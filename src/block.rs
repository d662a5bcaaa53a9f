//! LZ4 block token-stream decoder.
//!
//! A block is a sequence of tokens.  Each token is one byte: the high nibble
//! is the literal length, the low nibble the match length minus
//! [`MIN_MATCH`].  A nibble of 15 is extended by the following bytes, each
//! added to the length, until a byte other than 255 is seen.
//!
//! ```text
//! token | [literal length ext…] | literals | distance (u16 LE) | [match length ext…]
//! ```
//!
//! The literal run is copied verbatim.  When the input ends right after the
//! literals the block is complete; otherwise a back-reference follows and
//! copies `match length` bytes starting `distance` bytes back in the output
//! produced so far.  A distance shorter than the match length overlaps the
//! bytes being written and repeats the pattern.
//!
//! Decoding is stateless between blocks.  The output buffer grows as needed;
//! callers that know the decoded size pass it as a limit.

use std::io;
use thiserror::Error;
use tracing::trace;

use crate::byte_utils::{from_little_endian_supplier, ByteSupplier};

/// Smallest match length a back-reference can encode.
pub const MIN_MATCH: usize = 4;
/// Width of the back-reference distance field.
pub const DISTANCE_BYTES: usize = 2;

const NIBBLE_MAX: usize = 0x0F;
const EXTENSION_CONTINUE: u8 = 0xFF;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Token stream truncated while reading {0}")]
    Truncated(&'static str),
    #[error("Back-reference distance of zero")]
    ZeroDistance,
    #[error("Back-reference distance {distance} reaches before the start of {available} decoded bytes")]
    DistanceOutOfRange { distance: usize, available: usize },
    #[error("Decoded output would exceed {limit} bytes")]
    OutputLimit { limit: usize },
}

// ── Input cursor ─────────────────────────────────────────────────────────────

struct TokenInput<'a> {
    data: &'a [u8],
    pos:  usize,
}

impl<'a> TokenInput<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], BlockError> {
        let end = self.pos.checked_add(len).filter(|&e| e <= self.data.len())
            .ok_or(BlockError::Truncated(what))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Nibble value plus any extension bytes.
    fn length(&mut self, nibble: usize, what: &'static str) -> Result<usize, BlockError> {
        let mut len = nibble;
        if nibble == NIBBLE_MAX {
            loop {
                let b = self.next_byte().ok().flatten().ok_or(BlockError::Truncated(what))?;
                len = len.checked_add(usize::from(b)).ok_or(BlockError::Truncated(what))?;
                if b != EXTENSION_CONTINUE {
                    break;
                }
            }
        }
        Ok(len)
    }
}

impl ByteSupplier for TokenInput<'_> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let b = self.data.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// Decode a complete block with no output limit.
pub fn decompress_block(input: &[u8]) -> Result<Vec<u8>, BlockError> {
    decompress_block_with_limit(input, usize::MAX)
}

/// Decode a complete block, failing if the output would exceed `limit`.
pub fn decompress_block_with_limit(input: &[u8], limit: usize) -> Result<Vec<u8>, BlockError> {
    let mut out = Vec::new();
    decompress_block_into(input, &mut out, limit)?;
    Ok(out)
}

/// Decode a block, appending to `out`.  Back-references may reach any byte
/// appended by this call but never bytes that were in `out` beforehand.
/// Returns the number of bytes appended.
pub fn decompress_block_into(input: &[u8], out: &mut Vec<u8>, limit: usize) -> Result<usize, BlockError> {
    let base = out.len();
    let mut src = TokenInput::new(input);
    let mut tokens = 0usize;

    while let Some(token) = src.next_byte().ok().flatten() {
        tokens += 1;

        let literal_len = src.length(usize::from(token >> 4), "literal length")?;
        let literals = src.take(literal_len, "literals")?;
        if out.len() - base + literal_len > limit {
            return Err(BlockError::OutputLimit { limit });
        }
        out.extend_from_slice(literals);

        // A block ends with a bare literal run.
        if src.is_exhausted() {
            break;
        }

        let distance = from_little_endian_supplier(&mut src, DISTANCE_BYTES)
            .map_err(|_| BlockError::Truncated("back-reference distance"))? as usize;
        let match_len = src.length(usize::from(token) & NIBBLE_MAX, "match length")? + MIN_MATCH;

        let produced = out.len() - base;
        if distance == 0 {
            return Err(BlockError::ZeroDistance);
        }
        if distance > produced {
            return Err(BlockError::DistanceOutOfRange { distance, available: produced });
        }
        if produced + match_len > limit {
            return Err(BlockError::OutputLimit { limit });
        }
        copy_back_reference(out, distance, match_len);
    }

    let written = out.len() - base;
    trace!(tokens, input = input.len(), output = written, "decoded LZ4 block");
    Ok(written)
}

/// Append `len` bytes copied from `distance` bytes back.  Overlapping ranges
/// are copied one byte at a time in forward order.
fn copy_back_reference(out: &mut Vec<u8>, distance: usize, len: usize) {
    let start = out.len() - distance;
    if distance >= len {
        out.extend_from_within(start..start + len);
    } else {
        out.reserve(len);
        for i in 0..len {
            let b = out[start + i];
            out.push(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_only_stream() {
        let out = decompress_block(&[0x30, b'a', b'b', b'c']).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn empty_input_decodes_to_nothing() {
        assert!(decompress_block(&[]).unwrap().is_empty());
    }

    #[test]
    fn distance_one_repeats_single_byte() {
        // 1 literal, match of 5 + MIN_MATCH at distance 1.
        let out = decompress_block(&[0x15, b'x', 0x01, 0x00]).unwrap();
        assert_eq!(out, vec![b'x'; 10]);
    }

    #[test]
    fn overlapping_pattern_expands() {
        let out = decompress_block(&[0x32, b'a', b'b', b'c', 0x03, 0x00]).unwrap();
        assert_eq!(out, b"abcabcabc");
    }

    #[test]
    fn literals_after_match() {
        let out = decompress_block(&[0x20, b'h', b'i', 0x02, 0x00, 0x10, b'!']).unwrap();
        assert_eq!(out, b"hihihi!");
    }

    #[test]
    fn extended_literal_length() {
        let mut input = vec![0xF0, 5];
        input.extend((0u8..20).collect::<Vec<_>>());
        let out = decompress_block(&input).unwrap();
        assert_eq!(out, (0u8..20).collect::<Vec<_>>());
    }

    #[test]
    fn extended_match_length_sums_continuation_bytes() {
        // 15 + 255 + 1 + MIN_MATCH = 275 copied bytes.
        let out = decompress_block(&[0x1F, b'a', 0x01, 0x00, 0xFF, 0x01]).unwrap();
        assert_eq!(out.len(), 276);
        assert!(out.iter().all(|&b| b == b'a'));
    }

    #[test]
    fn distance_before_output_start_is_rejected() {
        let err = decompress_block(&[0x10, b'a', 0x02, 0x00]).unwrap_err();
        assert_eq!(err, BlockError::DistanceOutOfRange { distance: 2, available: 1 });
    }

    #[test]
    fn zero_distance_is_rejected() {
        let err = decompress_block(&[0x10, b'a', 0x00, 0x00]).unwrap_err();
        assert_eq!(err, BlockError::ZeroDistance);
    }

    #[test]
    fn truncated_literals() {
        let err = decompress_block(&[0x40, b'a', b'b']).unwrap_err();
        assert_eq!(err, BlockError::Truncated("literals"));
    }

    #[test]
    fn truncated_distance() {
        let err = decompress_block(&[0x10, b'a', 0x01]).unwrap_err();
        assert_eq!(err, BlockError::Truncated("back-reference distance"));
    }

    #[test]
    fn truncated_length_extension() {
        let err = decompress_block(&[0xF0, 0xFF]).unwrap_err();
        assert_eq!(err, BlockError::Truncated("literal length"));
    }

    #[test]
    fn output_limit_is_enforced() {
        let err = decompress_block_with_limit(&[0x15, b'x', 0x01, 0x00], 4).unwrap_err();
        assert_eq!(err, BlockError::OutputLimit { limit: 4 });
    }

    #[test]
    fn back_references_do_not_reach_prior_output() {
        let mut out = b"prefix".to_vec();
        let err = decompress_block_into(&[0x10, b'a', 0x03, 0x00], &mut out, usize::MAX).unwrap_err();
        assert_eq!(err, BlockError::DistanceOutOfRange { distance: 3, available: 1 });
    }

    #[test]
    fn decodes_lz4_flex_output() {
        let data: Vec<u8> = b"solid blocks hold many entries; ".iter().cycle().take(4096).copied().collect();
        let packed = lz4_flex::block::compress(&data);
        assert!(packed.len() < data.len());
        assert_eq!(decompress_block(&packed).unwrap(), data);
    }
}
