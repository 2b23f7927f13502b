//! The long-lived decoder of a solid stream.
//!
//! Solid archives compress consecutive entries as one continuous stream, so
//! entry N can only be decoded after entries 0..N have passed through the
//! same decoder. The engine keeps one [`SolidStream`] for as long as the
//! entries it meets share a compression kind, properties and encryption, and
//! builds a new one when they change.
//!
//! # Key Constraints
//!
//! 1. **Sequential Access Only**: entries are decoded in header order.
//! 2. **Exact Sizes**: each entry takes exactly its declared number of
//!    decoded bytes from the stream; the rest belongs to the next entry.
//! 3. **Skip Operations**: skipping an entry still decodes its data and
//!    discards it.
//! 4. **Encrypted Streams**: the stream is decrypted as a whole, so entry
//!    boundaries must fall on cipher block boundaries. A block is decrypted
//!    only once all of it has been fed.

use std::io::{self, Read};

use crate::codec::{CompressionKind, Decoder, build_decoder};
use crate::crypto::{Decryptor, Encryption};
use crate::read::Entry;
use crate::{Error, Result};

use super::feed::{PartFeed, SharedEngine};

/// Decoder shared by consecutive entries of a solid stream.
pub(crate) struct SolidStream {
    decoder: Box<dyn Decoder>,
    kind: CompressionKind,
    properties: Vec<u8>,
    encryption: Option<Encryption>,
    /// Decoded bytes still owed to the current entry.
    bytes_remaining_in_entry: u64,
    total_decompressed: u64,
}

impl SolidStream {
    /// Builds a decoder over the engine feed for the stream `entry` starts.
    pub(crate) fn new(engine: SharedEngine, entry: &Entry, decryptor: &Decryptor) -> Result<Self> {
        let feed = PartFeed::new(engine);
        let input: Box<dyn Read + Send> = match entry.encryption() {
            Some(encryption) => decryptor.wrap(feed, encryption)?,
            None => Box::new(feed),
        };
        let decoder = build_decoder(
            input,
            entry.compression(),
            entry.compression_properties(),
            None,
        )?;
        log::debug!(
            "starting {} solid stream at '{}'",
            entry.compression(),
            entry.key()
        );
        Ok(Self {
            decoder,
            kind: entry.compression(),
            properties: entry.compression_properties().to_vec(),
            encryption: entry.encryption().cloned(),
            bytes_remaining_in_entry: 0,
            total_decompressed: 0,
        })
    }

    /// Returns `true` if `entry` continues this stream.
    pub(crate) fn continues(&self, entry: &Entry) -> bool {
        self.kind == entry.compression()
            && self.properties == entry.compression_properties()
            && self.encryption.as_ref() == entry.encryption()
    }

    /// Starts the next entry of the stream.
    pub(crate) fn begin_entry(&mut self, size: u64) {
        self.bytes_remaining_in_entry = size;
    }

    /// Returns the total bytes decoded by this stream.
    pub(crate) fn total_decompressed(&self) -> u64 {
        self.total_decompressed
    }

    /// Reads data of the current entry. Returns 0 once the entry is complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the stream ends before the entry's
    /// declared size.
    pub(crate) fn read_entry_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.bytes_remaining_in_entry == 0 || buf.is_empty() {
            return Ok(0);
        }

        let to_read = (buf.len() as u64).min(self.bytes_remaining_in_entry) as usize;
        let n = self
            .decoder
            .read(&mut buf[..to_read])
            .map_err(Error::from_io)?;
        if n == 0 {
            return Err(Error::InvalidFormat(format!(
                "solid stream ended {} bytes before the end of the entry",
                self.bytes_remaining_in_entry
            )));
        }

        self.bytes_remaining_in_entry -= n as u64;
        self.total_decompressed += n as u64;
        Ok(n)
    }

    /// Decodes and discards the rest of the current entry.
    pub(crate) fn discard_entry(&mut self) -> Result<u64> {
        let remaining = self.bytes_remaining_in_entry;
        if remaining == 0 {
            return Ok(0);
        }
        let copied = io::copy(&mut (&mut self.decoder).take(remaining), &mut io::sink())
            .map_err(Error::from_io)?;
        self.total_decompressed += copied;
        self.bytes_remaining_in_entry -= copied;
        if copied < remaining {
            return Err(Error::InvalidFormat(format!(
                "solid stream ended {} bytes before the end of the entry",
                remaining - copied
            )));
        }
        Ok(copied)
    }
}

impl std::fmt::Debug for SolidStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolidStream")
            .field("kind", &self.kind)
            .field("bytes_remaining_in_entry", &self.bytes_remaining_in_entry)
            .field("total_decompressed", &self.total_decompressed)
            .finish_non_exhaustive()
    }
}
