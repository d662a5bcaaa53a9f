//! Little-endian unsigned integer helpers.
//!
//! Decoding works from a byte slice, from any `std::io::Read`, or from a
//! [`ByteSupplier`] that yields one byte at a time.  Encoding mirrors this
//! with `std::io::Write` and [`ByteConsumer`].  Widths are 0..=8 bytes; a
//! wider request fails with [`ByteUtilsError::LengthTooBig`] before any
//! input is consumed.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

/// Widest integer that fits in a `u64`.
pub const MAX_LENGTH: usize = 8;

#[derive(Error, Debug)]
pub enum ByteUtilsError {
    #[error("Can't read more than {MAX_LENGTH} bytes into a u64, requested {0}")]
    LengthTooBig(usize),
    #[error("Premature end of data: wanted {wanted} bytes, got {got}")]
    PrematureEnd { wanted: usize, got: usize },
    #[error("Range {offset}..{end} is outside a {len}-byte buffer")]
    OutOfBounds { offset: usize, end: usize, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Pull / push abstractions ─────────────────────────────────────────────────

/// Pull source yielding one byte per call, `None` once exhausted.
pub trait ByteSupplier {
    fn next_byte(&mut self) -> io::Result<Option<u8>>;
}

impl<F> ByteSupplier for F
where
    F: FnMut() -> io::Result<Option<u8>>,
{
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self()
    }
}

/// Adapts any reader into a [`ByteSupplier`].
pub struct ReaderByteSupplier<R: Read> {
    reader: R,
}

impl<R: Read> ReaderByteSupplier<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> ByteSupplier for ReaderByteSupplier<R> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        match self.reader.read_u8() {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Push sink accepting one byte per call.
pub trait ByteConsumer {
    fn accept(&mut self, byte: u8) -> io::Result<()>;
}

impl<F> ByteConsumer for F
where
    F: FnMut(u8) -> io::Result<()>,
{
    fn accept(&mut self, byte: u8) -> io::Result<()> {
        self(byte)
    }
}

/// Adapts any writer into a [`ByteConsumer`].
pub struct WriterByteConsumer<W: Write> {
    writer: W,
}

impl<W: Write> WriterByteConsumer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteConsumer for WriterByteConsumer<W> {
    fn accept(&mut self, byte: u8) -> io::Result<()> {
        self.writer.write_all(&[byte])
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

fn check_length(length: usize) -> Result<(), ByteUtilsError> {
    if length > MAX_LENGTH {
        return Err(ByteUtilsError::LengthTooBig(length));
    }
    Ok(())
}

/// Decode the whole slice as one little-endian integer.
pub fn from_little_endian(bytes: &[u8]) -> Result<u64, ByteUtilsError> {
    from_little_endian_at(bytes, 0, bytes.len())
}

/// Decode `length` bytes of `bytes` starting at `offset`.
pub fn from_little_endian_at(bytes: &[u8], offset: usize, length: usize) -> Result<u64, ByteUtilsError> {
    check_length(length)?;
    let end = offset.checked_add(length).filter(|&e| e <= bytes.len()).ok_or(
        ByteUtilsError::OutOfBounds { offset, end: offset.saturating_add(length), len: bytes.len() },
    )?;
    if length == 0 {
        return Ok(0);
    }
    Ok(LittleEndian::read_uint(&bytes[offset..end], length))
}

/// Decode `length` bytes pulled from a reader.
pub fn from_little_endian_reader<R: Read>(reader: &mut R, length: usize) -> Result<u64, ByteUtilsError> {
    check_length(length)?;
    if length == 0 {
        return Ok(0);
    }
    reader.read_uint::<LittleEndian>(length).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ByteUtilsError::PrematureEnd { wanted: length, got: 0 },
        _ => ByteUtilsError::Io(e),
    })
}

/// Decode `length` bytes pulled one at a time from a supplier.
pub fn from_little_endian_supplier<S: ByteSupplier + ?Sized>(
    supplier: &mut S,
    length:   usize,
) -> Result<u64, ByteUtilsError> {
    check_length(length)?;
    let mut value = 0u64;
    for i in 0..length {
        let b = supplier
            .next_byte()?
            .ok_or(ByteUtilsError::PrematureEnd { wanted: length, got: i })?;
        value |= u64::from(b) << (8 * i);
    }
    Ok(value)
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Write the low `length` bytes of `value` into `buf` at `offset`.
pub fn to_little_endian_slice(
    buf:    &mut [u8],
    value:  u64,
    offset: usize,
    length: usize,
) -> Result<(), ByteUtilsError> {
    check_length(length)?;
    let len = buf.len();
    let out = buf
        .get_mut(offset..offset.saturating_add(length))
        .ok_or(ByteUtilsError::OutOfBounds { offset, end: offset.saturating_add(length), len })?;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = (value >> (8 * i)) as u8;
    }
    Ok(())
}

/// Write the low `length` bytes of `value` to a writer.
pub fn to_little_endian<W: Write + ?Sized>(writer: &mut W, value: u64, length: usize) -> Result<(), ByteUtilsError> {
    let mut buf = [0u8; MAX_LENGTH];
    to_little_endian_slice(&mut buf, value, 0, length)?;
    writer.write_all(&buf[..length])?;
    Ok(())
}

/// Push the low `length` bytes of `value` to a consumer.
pub fn to_little_endian_consumer<C: ByteConsumer + ?Sized>(
    consumer: &mut C,
    value:    u64,
    length:   usize,
) -> Result<(), ByteUtilsError> {
    check_length(length)?;
    for i in 0..length {
        consumer.accept((value >> (8 * i)) as u8)?;
    }
    Ok(())
}
