//! CRC-32 verification of decoded entry data.
//!
//! Every supported container format stores the IEEE CRC-32 of an entry's
//! uncompressed bytes. [`EntryVerifier`] accumulates the checksum and byte
//! count while data is decoded and checks both once the stream ends.

use crate::{Error, Result};

/// Computes the CRC-32 of a single slice.
///
/// ```rust
/// assert_eq!(volread::checksum::crc32(b"123456789"), 0xCBF4_3926);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Tracks size and CRC-32 of one entry's decoded bytes.
#[derive(Debug, Clone)]
pub struct EntryVerifier {
    hasher: crc32fast::Hasher,
    entry_index: usize,
    entry_name: String,
    expected_crc: Option<u32>,
    expected_size: Option<u64>,
    produced: u64,
}

impl EntryVerifier {
    /// Creates a verifier for an entry.
    ///
    /// Pass `None` for `expected_crc` to skip the checksum comparison and
    /// `None` for `expected_size` when the size is not known up front.
    pub fn new(
        entry_index: usize,
        entry_name: impl Into<String>,
        expected_crc: Option<u32>,
        expected_size: Option<u64>,
    ) -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
            entry_index,
            entry_name: entry_name.into(),
            expected_crc,
            expected_size,
            produced: 0,
        }
    }

    /// Adds decoded bytes to the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.produced += data.len() as u64;
    }

    /// Counts bytes that were decoded and discarded without hashing.
    pub fn record_skipped(&mut self, bytes: u64) {
        self.produced += bytes;
    }

    /// Returns the number of decoded bytes seen so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Sets the expected values once they become known.
    ///
    /// Split entries learn their totals only when the terminal part arrives.
    pub fn set_expected(&mut self, crc: Option<u32>, size: Option<u64>) {
        if self.expected_crc.is_none() {
            self.expected_crc = crc;
        }
        if self.expected_size.is_none() {
            self.expected_size = size;
        }
    }

    /// Checks the accumulated data against the expected values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CrcMismatch`] if the checksum differs, or
    /// [`Error::InvalidFormat`] if fewer or more bytes were produced than
    /// the entry declares.
    pub fn finish(&self) -> Result<()> {
        if let Some(size) = self.expected_size {
            if size != self.produced {
                return Err(Error::InvalidFormat(format!(
                    "entry '{}' decoded to {} bytes, header declares {}",
                    self.entry_name, self.produced, size
                )));
            }
        }

        if let Some(expected) = self.expected_crc {
            let actual = self.hasher.clone().finalize();
            if actual != expected {
                log::warn!(
                    "CRC mismatch for '{}': expected {:#010x}, got {:#010x}",
                    self.entry_name,
                    expected,
                    actual
                );
                return Err(Error::CrcMismatch {
                    entry_index: self.entry_index,
                    entry_name: Some(self.entry_name.clone()),
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }
}
