use std::io::{self, Read};

use super::reader::Reader;
use crate::read::Entry;

/// Decoded data of the reader's current entry.
///
/// Borrowing the reader keeps `advance` from being called while the stream
/// is alive. Dropping the stream early is allowed; the next `advance`
/// finishes the entry.
///
/// Errors surface as [`io::Error`]; [`crate::Error::from_io`] turns them back
/// into the crate's error type.
pub struct EntryStream<'a> {
    reader: &'a mut Reader,
}

impl<'a> EntryStream<'a> {
    pub(crate) fn new(reader: &'a mut Reader) -> Self {
        Self { reader }
    }

    /// Returns the entry being read.
    pub fn entry(&self) -> Option<&Entry> {
        self.reader.entry()
    }
}

impl Read for EntryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read_decoded(buf).map_err(io::Error::from)
    }
}

impl std::fmt::Debug for EntryStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStream")
            .field("entry", &self.entry().map(|e| e.key()))
            .finish_non_exhaustive()
    }
}
