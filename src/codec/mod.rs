//! Codec collaborators for entry data.
//!
//! The reader engine performs no decompression itself. Each entry carries a
//! [`CompressionKind`], a closed tag resolved here into a concrete decoder by
//! [`build_decoder`]. Codecs that this build cannot decode are reported as
//! [`Error::UnsupportedMethod`] rather than producing wrong bytes.

#[cfg(feature = "lzma")]
pub mod lzma;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "bzip2")]
pub mod bzip2;

#[cfg(feature = "ppmd")]
pub mod ppmd;

mod copy;

use std::io::Read;

use crate::{Error, Result};

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read + Send {
    /// Returns the compression kind this decoder handles.
    fn kind(&self) -> CompressionKind;
}

/// Copy decoder (no compression).
pub use copy::CopyDecoder;

#[cfg(feature = "lzma")]
pub use lzma::{Lzma2Decoder, LzmaDecoder};

#[cfg(feature = "deflate")]
pub use deflate::DeflateDecoder;

#[cfg(feature = "bzip2")]
pub use bzip2::Bzip2Decoder;

#[cfg(feature = "ppmd")]
pub use ppmd::{PpmdDecoder, SizedPpmdDecoder};

/// Compression kinds found across the supported container formats.
///
/// Header parsers map their format-specific method ids onto this tag; the
/// tag is the only thing the engine looks at when choosing a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CompressionKind {
    /// Data is stored without compression.
    Stored,
    /// Deflate (RFC 1951).
    Deflate,
    /// Deflate64 ("enhanced deflate").
    Deflate64,
    /// BZip2.
    BZip2,
    /// LZMA (properties: 1 byte lc/lp/pb + 4 byte dictionary size).
    Lzma,
    /// LZMA2 (properties: 1 byte dictionary size code).
    Lzma2,
    /// PPMd variant H (properties: 1 byte order + 4 byte memory size).
    PPMd,
    /// LZW family (ZIP shrink, ARC crunch).
    Lzw,
    /// Run-length encoding with the 0x90 escape byte (ARC "packed").
    Rle90,
    /// Huffman + RLE (ARC "squeezed").
    Squeeze,
    /// A format-specific method id with no known mapping.
    Unknown(u32),
}

impl CompressionKind {
    /// Returns whether this kind can be decoded by the current build.
    ///
    /// ```
    /// use volread::codec::CompressionKind;
    ///
    /// assert!(CompressionKind::Stored.is_available());
    /// assert!(!CompressionKind::Deflate64.is_available());
    /// ```
    pub fn is_available(&self) -> bool {
        match self {
            Self::Stored => true,
            Self::Lzma | Self::Lzma2 => cfg!(feature = "lzma"),
            Self::Deflate => cfg!(feature = "deflate"),
            Self::BZip2 => cfg!(feature = "bzip2"),
            Self::PPMd => cfg!(feature = "ppmd"),
            Self::Deflate64 | Self::Lzw | Self::Rle90 | Self::Squeeze | Self::Unknown(_) => false,
        }
    }

    /// Returns the feature flag name required for this kind, if any.
    ///
    /// Returns `None` for kinds that are always available and for kinds that
    /// no feature enables.
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            Self::Lzma | Self::Lzma2 => Some("lzma"),
            Self::Deflate => Some("deflate"),
            Self::BZip2 => Some("bzip2"),
            Self::PPMd => Some("ppmd"),
            _ => None,
        }
    }

    /// Returns `true` if a decoder of this kind can only stop at the declared
    /// uncompressed size, because the stream may carry no end marker.
    pub fn needs_declared_size(&self) -> bool {
        matches!(self, Self::Lzma | Self::PPMd)
    }
}

impl std::fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            Self::Deflate => write!(f, "Deflate"),
            Self::Deflate64 => write!(f, "Deflate64"),
            Self::BZip2 => write!(f, "BZip2"),
            Self::Lzma => write!(f, "LZMA"),
            Self::Lzma2 => write!(f, "LZMA2"),
            Self::PPMd => write!(f, "PPMd"),
            Self::Lzw => write!(f, "LZW"),
            Self::Rle90 => write!(f, "RLE90"),
            Self::Squeeze => write!(f, "Squeeze"),
            Self::Unknown(id) => write!(f, "unknown method {:#x}", id),
        }
    }
}

/// Builds a decoder for the given compression kind.
///
/// # Arguments
///
/// * `input` - The compressed (already decrypted) data source
/// * `kind` - The entry's compression kind
/// * `properties` - Codec properties from the entry header
/// * `uncompressed_size` - Expected output size, or `None` when the decoder
///   must run until its input or end marker is exhausted (split entries
///   whose total is not yet known, and shared solid streams)
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] if the kind cannot be decoded by this
/// build, or a format error if the properties are invalid.
pub fn build_decoder<R: Read + Send + 'static>(
    input: R,
    kind: CompressionKind,
    properties: &[u8],
    uncompressed_size: Option<u64>,
) -> Result<Box<dyn Decoder>> {
    #[allow(unused_variables)]
    let properties = properties;

    match kind {
        CompressionKind::Stored => Ok(Box::new(match uncompressed_size {
            Some(size) => CopyDecoder::new(input, size),
            None => CopyDecoder::unbounded(input),
        })),

        #[cfg(feature = "lzma")]
        CompressionKind::Lzma => {
            let size = uncompressed_size.unwrap_or(u64::MAX);
            let decoder = lzma::LzmaDecoder::new(input, properties, size)?;
            Ok(Box::new(decoder))
        }

        #[cfg(feature = "lzma")]
        CompressionKind::Lzma2 => {
            let decoder = lzma::Lzma2Decoder::new(input, properties)?;
            Ok(Box::new(decoder))
        }

        #[cfg(feature = "deflate")]
        CompressionKind::Deflate => {
            let buf_reader = std::io::BufReader::new(input);
            Ok(Box::new(deflate::DeflateDecoder::new(buf_reader)))
        }

        #[cfg(feature = "bzip2")]
        CompressionKind::BZip2 => Ok(Box::new(bzip2::Bzip2Decoder::new(input))),

        #[cfg(feature = "ppmd")]
        CompressionKind::PPMd => match uncompressed_size {
            // PPMd has no end-of-stream marker: stop after the declared size
            Some(size) => Ok(Box::new(ppmd::SizedPpmdDecoder::new(
                input, properties, size,
            )?)),
            None => Ok(Box::new(ppmd::PpmdDecoder::new(input, properties)?)),
        },

        other => {
            match other.required_feature() {
                Some(feature) => {
                    log::debug!("{} needs the '{}' feature of this crate", other, feature)
                }
                None => log::debug!("no decoder available for {}", other),
            }
            Err(Error::UnsupportedMethod { method: other })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stored_is_always_available() {
        assert!(CompressionKind::Stored.is_available());
        assert_eq!(CompressionKind::Stored.required_feature(), None);
    }

    #[test]
    fn test_unsupported_kinds_are_rejected() {
        for kind in [
            CompressionKind::Deflate64,
            CompressionKind::Lzw,
            CompressionKind::Rle90,
            CompressionKind::Squeeze,
            CompressionKind::Unknown(0x63),
        ] {
            let result = build_decoder(Cursor::new(vec![1u8, 2, 3]), kind, &[], Some(3));
            match result {
                Err(Error::UnsupportedMethod { method }) => assert_eq!(method, kind),
                Err(e) => panic!("unexpected error for {}: {}", kind, e),
                Ok(_) => panic!("{} should not be decodable", kind),
            }
        }
    }

    #[test]
    fn test_stored_bounded_and_unbounded() {
        let mut bounded =
            build_decoder(Cursor::new(b"abcdef".to_vec()), CompressionKind::Stored, &[], Some(3))
                .unwrap();
        let mut out = Vec::new();
        bounded.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(bounded.kind(), CompressionKind::Stored);

        let mut unbounded =
            build_decoder(Cursor::new(b"abcdef".to_vec()), CompressionKind::Stored, &[], None)
                .unwrap();
        let mut out = Vec::new();
        unbounded.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn test_sized_kinds() {
        assert!(CompressionKind::Lzma.needs_declared_size());
        assert!(CompressionKind::PPMd.needs_declared_size());
        assert!(!CompressionKind::Lzma2.needs_declared_size());
        assert!(!CompressionKind::Deflate.needs_declared_size());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(CompressionKind::Lzma2.to_string(), "LZMA2");
        assert_eq!(CompressionKind::Unknown(0x63).to_string(), "unknown method 0x63");
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_deflate_dispatch() {
        use std::io::Write;

        let data = b"dispatch through the codec table";
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder =
            build_decoder(Cursor::new(compressed), CompressionKind::Deflate, &[], None).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(decoder.kind(), CompressionKind::Deflate);
    }
}
