//! Stored entries: data passes through unchanged.

use std::io::{self, Read};

use super::{CompressionKind, Decoder};

/// A decoder that passes data through unchanged (no compression).
///
/// A bounded decoder stops after the declared size; an unbounded one runs
/// until its input is exhausted, which is how split and solid entries are fed.
pub struct CopyDecoder<R> {
    inner: R,
    remaining: Option<u64>,
}

impl<R: Read + Send> CopyDecoder<R> {
    /// Creates a copy decoder that yields at most `size` bytes.
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: Some(size),
        }
    }

    /// Creates a copy decoder that yields everything `inner` produces.
    pub fn unbounded(inner: R) -> Self {
        Self {
            inner,
            remaining: None,
        }
    }
}

impl<R: Read + Send> Read for CopyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(remaining) = self.remaining else {
            return self.inner.read(buf);
        };
        if remaining == 0 {
            return Ok(0);
        }

        let max_read = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max_read])?;
        self.remaining = Some(remaining.saturating_sub(n as u64));
        Ok(n)
    }
}

impl<R: Read + Send> Decoder for CopyDecoder<R> {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Stored
    }
}
