//! PPMd (variant H) decoding.
//!
//! The properties are 5 bytes: 1 byte model order, 4 bytes memory size
//! (little endian). PPMd streams carry no end marker, so entry sizes must be
//! known to stop at the right place; the unsized decoder is only useful when
//! the caller bounds the read itself, as solid sequencing does.

use crate::{Error, Result};
use std::io::{self, Read};

use ppmd_rust::Ppmd7Decoder as RustPpmdDecoder;
use ppmd_rust::{PPMD7_MAX_MEM_SIZE, PPMD7_MAX_ORDER, PPMD7_MIN_MEM_SIZE, PPMD7_MIN_ORDER};

use super::{CompressionKind, Decoder};

/// Parses and validates the 5-byte property block.
fn parse_properties(properties: &[u8]) -> Result<(u32, u32)> {
    let [order, m0, m1, m2, m3, ..] = *properties else {
        return Err(Error::InvalidFormat(
            "PPMd properties too short (need 5 bytes)".into(),
        ));
    };
    let order = order as u32;
    let mem_size = u32::from_le_bytes([m0, m1, m2, m3]);

    if !(PPMD7_MIN_ORDER..=PPMD7_MAX_ORDER).contains(&order) {
        return Err(Error::InvalidFormat(format!(
            "PPMd order {} out of range [{}-{}]",
            order, PPMD7_MIN_ORDER, PPMD7_MAX_ORDER
        )));
    }

    if !(PPMD7_MIN_MEM_SIZE..=PPMD7_MAX_MEM_SIZE).contains(&mem_size) {
        return Err(Error::InvalidFormat(format!(
            "PPMd memory size {} out of range [{}-{}]",
            mem_size, PPMD7_MIN_MEM_SIZE, PPMD7_MAX_MEM_SIZE
        )));
    }

    Ok((order, mem_size))
}

fn open_model<R: Read>(input: R, properties: &[u8]) -> Result<RustPpmdDecoder<R>> {
    let (order, mem_size) = parse_properties(properties)?;
    RustPpmdDecoder::new(input, order, mem_size).map_err(|e| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{:?}", e),
        ))
    })
}

/// PPMd decoder.
pub struct PpmdDecoder<R: Read> {
    inner: RustPpmdDecoder<R>,
}

impl<R: Read> std::fmt::Debug for PpmdDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PpmdDecoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> PpmdDecoder<R> {
    /// Creates a new PPMd decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if properties are invalid or decoder initialization fails.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: open_model(input, properties)?,
        })
    }
}

impl<R: Read + Send> Read for PpmdDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for PpmdDecoder<R> {
    fn kind(&self) -> CompressionKind {
        CompressionKind::PPMd
    }
}

/// PPMd decoder that stops after the declared uncompressed size.
pub struct SizedPpmdDecoder<R: Read> {
    inner: RustPpmdDecoder<R>,
    remaining: u64,
}

impl<R: Read> std::fmt::Debug for SizedPpmdDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizedPpmdDecoder")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Send> SizedPpmdDecoder<R> {
    /// Creates a new size-limited PPMd decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if properties are invalid or decoder initialization fails.
    pub fn new(input: R, properties: &[u8], uncompressed_size: u64) -> Result<Self> {
        Ok(Self {
            inner: open_model(input, properties)?,
            remaining: uncompressed_size,
        })
    }
}

impl<R: Read + Send> Read for SizedPpmdDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }

        let max_read = usize::try_from(self.remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max_read])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

impl<R: Read + Send> Decoder for SizedPpmdDecoder<R> {
    fn kind(&self) -> CompressionKind {
        CompressionKind::PPMd
    }
}
