//! Container format seam.
//!
//! The engine is format-agnostic. Each container format plugs in a
//! [`HeaderParser`] that turns the raw bytes of a volume into uniform
//! [`FileHeader`] records; a [`FormatRegistry`] maps leading signatures to
//! parser factories.
//!
//! # Parser contract
//!
//! * [`open_volume`](HeaderParser::open_volume) is called once per volume,
//!   with the cursor at the start of the volume, and returns the
//!   archive-wide [`VolumeInfo`].
//! * [`next_header`](HeaderParser::next_header) returns the next header
//!   record, or `None` at the end of the volume. When it returns a header,
//!   the cursor is positioned at the start of that part's data unless the
//!   header sets [`data_offset`](FileHeader::data_offset) explicitly.
//! * Before `next_header` is called again, the engine has consumed exactly
//!   [`compressed_size`](FileHeader::compressed_size) bytes of data. Any
//!   alignment padding after the data is the parser's to skip.

pub mod detect;
pub mod header;

use std::fmt;

pub use detect::{ArchiveFormat, SNIFF_LEN, sniff_signature};
pub use header::{FileHeader, HeaderFlags, VolumeInfo};

use crate::read::ReaderOptions;
use crate::volume::SourceCursor;
use crate::{Error, Result};

/// Parses the header records of one volume.
///
/// A fresh parser instance is created for every volume.
pub trait HeaderParser: Send {
    /// Reads the volume's leading archive header.
    fn open_volume(
        &mut self,
        cursor: &mut SourceCursor<'_>,
        options: &ReaderOptions,
    ) -> Result<VolumeInfo>;

    /// Reads the next file header, or returns `None` at the end of the volume.
    fn next_header(&mut self, cursor: &mut SourceCursor<'_>) -> Result<Option<FileHeader>>;
}

/// Registration record for one container format.
#[derive(Clone, Copy)]
pub struct FormatDescriptor {
    /// Format tag.
    pub format: ArchiveFormat,
    /// Returns `true` if the leading bytes belong to this format.
    pub matches: fn(&[u8]) -> bool,
    /// Number of leading bytes `matches` needs.
    pub sniff_len: usize,
    /// Creates a parser for one volume.
    pub factory: fn() -> Box<dyn HeaderParser>,
}

impl FormatDescriptor {
    /// Creates a parser for one volume.
    pub fn create_parser(&self) -> Box<dyn HeaderParser> {
        (self.factory)()
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("format", &self.format)
            .field("sniff_len", &self.sniff_len)
            .finish_non_exhaustive()
    }
}

/// Table of known formats, tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a format.
    pub fn register(mut self, descriptor: FormatDescriptor) -> Self {
        self.formats.push(descriptor);
        self
    }

    /// Adds a format in place.
    pub fn push(&mut self, descriptor: FormatDescriptor) {
        self.formats.push(descriptor);
    }

    /// Returns the registered formats.
    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    /// Number of leading bytes needed to run every signature check.
    pub fn sniff_len(&self) -> usize {
        self.formats
            .iter()
            .map(|d| d.sniff_len)
            .max()
            .unwrap_or(0)
            .max(SNIFF_LEN)
    }

    /// Finds the format whose signature check accepts `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if no registered signature matches. The
    /// message names the container family when the signature is recognized
    /// but no parser was registered for it.
    pub fn detect(&self, prefix: &[u8]) -> Result<&FormatDescriptor> {
        if let Some(descriptor) = self.formats.iter().find(|d| (d.matches)(prefix)) {
            log::debug!("detected {} volume", descriptor.format);
            return Ok(descriptor);
        }
        match sniff_signature(prefix) {
            Some(format) => Err(Error::InvalidFormat(format!(
                "{} archive recognized but no parser is registered for it",
                format
            ))),
            None => Err(Error::InvalidFormat(
                "unrecognized archive signature".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyParser;

    impl HeaderParser for EmptyParser {
        fn open_volume(
            &mut self,
            _cursor: &mut SourceCursor<'_>,
            _options: &ReaderOptions,
        ) -> Result<VolumeInfo> {
            Ok(VolumeInfo::single())
        }

        fn next_header(&mut self, _cursor: &mut SourceCursor<'_>) -> Result<Option<FileHeader>> {
            Ok(None)
        }
    }

    fn empty_descriptor() -> FormatDescriptor {
        FormatDescriptor {
            format: ArchiveFormat::Other("EMPTY"),
            matches: |prefix| prefix.starts_with(b"EMPTY"),
            sniff_len: 5,
            factory: || Box::new(EmptyParser),
        }
    }

    #[test]
    fn test_detect_registered_format() {
        let registry = FormatRegistry::new().register(empty_descriptor());
        let descriptor = registry.detect(b"EMPTY...").unwrap();
        assert_eq!(descriptor.format, ArchiveFormat::Other("EMPTY"));
    }

    #[test]
    fn test_detect_known_but_unregistered() {
        let registry = FormatRegistry::new().register(empty_descriptor());
        let err = registry.detect(b"PK\x03\x04").unwrap_err();
        assert!(err.to_string().contains("ZIP"));
    }

    #[test]
    fn test_detect_unknown() {
        let registry = FormatRegistry::new();
        assert!(matches!(
            registry.detect(b"nothing"),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_sniff_len_covers_sniffing() {
        let registry = FormatRegistry::new().register(empty_descriptor());
        assert_eq!(registry.sniff_len(), SNIFF_LEN);
    }
}
