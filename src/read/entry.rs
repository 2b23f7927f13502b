//! Entries and the file parts they are made of.
//!
//! A [`FilePart`] is one contiguous run of an entry's bytes inside one
//! volume. An [`Entry`] is the logical item: an ordered list of parts in
//! volume order, exactly one for entries that are not split.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, Weak};

use crate::codec::CompressionKind;
use crate::crypto::Encryption;
use crate::format::FileHeader;
use crate::timestamp::Timestamp;
use crate::volume::source::{SourceState, lock_or_recover};
use crate::{Error, Result, UsageError};

/// One contiguous byte run of an entry inside one volume.
///
/// A part never owns its volume's source. It keeps a weak reference, so
/// reading a part after its volume was released fails with
/// [`UsageError::VolumeReleased`].
#[derive(Clone)]
pub struct FilePart {
    header: Arc<FileHeader>,
    source: Weak<Mutex<SourceState>>,
    volume_index: u32,
    data_offset: u64,
    length: u64,
}

impl FilePart {
    pub(crate) fn new(
        header: FileHeader,
        source: Weak<Mutex<SourceState>>,
        volume_index: u32,
        data_offset: u64,
    ) -> Self {
        let length = header.compressed_size;
        Self {
            header: Arc::new(header),
            source,
            volume_index,
            data_offset,
            length,
        }
    }

    /// Returns the header record describing this part.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the index of the volume holding this part.
    pub fn volume_index(&self) -> u32 {
        self.volume_index
    }

    /// Returns the absolute offset of this part's data in its volume.
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    /// Returns the length of this part's data in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Returns `true` while the volume backing this part is still open.
    pub fn is_live(&self) -> bool {
        self.source
            .upgrade()
            .is_some_and(|source| !lock_or_recover(&source).is_released())
    }

    /// Returns a reader over the undecoded bytes of this part, or `None`
    /// when the format declared them not skippable as a raw range.
    pub fn raw_reader(&self) -> Option<PartReader> {
        self.header.raw_skip.then(|| self.data_reader())
    }

    /// Returns a reader over this part's bytes for decoding.
    pub(crate) fn data_reader(&self) -> PartReader {
        PartReader {
            source: self.source.clone(),
            start: self.data_offset,
            length: self.length,
            consumed: 0,
        }
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("key", &self.header.key)
            .field("volume_index", &self.volume_index)
            .field("data_offset", &self.data_offset)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Bounded reader over one part's bytes in its volume.
///
/// Every read first moves the volume to where this reader left off, so
/// several part readers over the same volume do not disturb each other
/// (on forward-only sources they must be used in offset order).
pub struct PartReader {
    source: Weak<Mutex<SourceState>>,
    start: u64,
    length: u64,
    consumed: u64,
}

impl PartReader {
    /// Returns the number of bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.length - self.consumed
    }

    /// Returns the number of bytes read so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Steps over the rest of the part without reading it into memory.
    ///
    /// Returns the number of bytes skipped.
    pub fn skip_remaining(&mut self) -> Result<u64> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }
        let source = self.upgrade()?;
        let mut state = lock_or_recover(&source);
        state.seek_to(self.start + self.consumed)?;
        state.skip(remaining)?;
        self.consumed = self.length;
        Ok(remaining)
    }

    fn upgrade(&self) -> Result<Arc<Mutex<SourceState>>> {
        self.source
            .upgrade()
            .ok_or(Error::Usage(UsageError::VolumeReleased))
    }
}

impl Read for PartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let source = self.upgrade()?;
        let mut state = lock_or_recover(&source);
        state.seek_to(self.start + self.consumed)?;

        let max = remaining.min(buf.len() as u64) as usize;
        let n = state.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "volume ended {} bytes before the end of entry data",
                    remaining
                ),
            ));
        }
        self.consumed += n as u64;
        Ok(n)
    }
}

impl fmt::Debug for PartReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartReader")
            .field("start", &self.start)
            .field("length", &self.length)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

/// A logical archive item.
///
/// Size, compressed size and CRC are only trustworthy once the terminal
/// part of a split entry has been seen; until then those accessors fail with
/// [`Error::IncompleteEntry`].
#[derive(Debug, Clone)]
pub struct Entry {
    parts: Vec<FilePart>,
    index: usize,
    is_solid: bool,
}

impl Entry {
    pub(crate) fn new(first: FilePart, index: usize, is_solid: bool) -> Self {
        Self {
            parts: vec![first],
            index,
            is_solid,
        }
    }

    pub(crate) fn push_part(&mut self, part: FilePart) {
        self.parts.push(part);
    }

    fn first_header(&self) -> &FileHeader {
        // An entry is always created from one part
        self.parts[0].header()
    }

    /// Returns the header of the first part without split-after.
    pub fn terminal_header(&self) -> Option<&FileHeader> {
        self.parts
            .iter()
            .map(FilePart::header)
            .find(|h| h.is_terminal())
    }

    fn require_terminal(&self) -> Result<&FileHeader> {
        self.terminal_header().ok_or_else(|| Error::IncompleteEntry {
            key: self.key().to_string(),
        })
    }

    /// Returns the entry's position in header order (0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the entry's path inside the archive.
    pub fn key(&self) -> &str {
        &self.first_header().key
    }

    /// Returns `true` if the entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.first_header().flags.is_directory
    }

    /// Returns `true` if the entry's data is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.first_header().flags.is_encrypted || self.first_header().encryption.is_some()
    }

    /// Returns `true` if the entry spans more than one volume.
    pub fn is_split(&self) -> bool {
        self.parts.len() > 1
            || self
                .parts
                .iter()
                .any(|p| p.header().flags.split_after || p.header().flags.split_before)
    }

    /// Returns `true` if the entry belongs to a solid stream.
    pub fn is_solid(&self) -> bool {
        self.is_solid
    }

    /// Returns `true` once the terminal part has been seen.
    pub fn is_complete(&self) -> bool {
        self.terminal_header().is_some()
    }

    /// Returns the uncompressed size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteEntry`] before the terminal part is seen.
    pub fn size(&self) -> Result<u64> {
        Ok(self.require_terminal()?.size)
    }

    /// Returns the compressed size recorded in the terminal header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteEntry`] before the terminal part is seen.
    pub fn compressed_size(&self) -> Result<u64> {
        Ok(self.require_terminal()?.compressed_size)
    }

    /// Returns the CRC-32 of the uncompressed data, if the format stores one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteEntry`] before the terminal part is seen.
    pub fn crc(&self) -> Result<Option<u32>> {
        Ok(self.require_terminal()?.crc)
    }

    /// Returns the sum of all known part lengths.
    pub fn packed_bytes(&self) -> u64 {
        self.parts.iter().map(FilePart::length).sum()
    }

    /// Returns the compression kind.
    pub fn compression(&self) -> CompressionKind {
        self.first_header().compression
    }

    /// Returns the codec properties.
    pub fn compression_properties(&self) -> &[u8] {
        &self.first_header().compression_properties
    }

    /// Returns the encryption, if any.
    pub fn encryption(&self) -> Option<&Encryption> {
        self.first_header().encryption.as_ref()
    }

    /// Returns the modification time.
    pub fn modified(&self) -> Option<Timestamp> {
        self.first_header().modified
    }

    /// Returns the creation time.
    pub fn created(&self) -> Option<Timestamp> {
        self.first_header().created
    }

    /// Returns the last access time.
    pub fn accessed(&self) -> Option<Timestamp> {
        self.first_header().accessed
    }

    /// Returns the raw platform attributes.
    pub fn attributes(&self) -> u32 {
        self.first_header().attributes
    }

    /// Returns the parts known so far, in volume order.
    pub fn parts(&self) -> &[FilePart] {
        &self.parts
    }

    /// Returns the index of the volume holding the first part.
    pub fn volume_index(&self) -> u32 {
        self.parts[0].volume_index()
    }

    /// Returns `true` if every part may be skipped as a raw byte range.
    pub(crate) fn raw_skippable(&self) -> bool {
        self.parts.iter().all(|p| p.header().raw_skip)
    }
}
