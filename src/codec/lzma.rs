//! LZMA and LZMA2 decoding.

use crate::{Error, Result};
use std::io::{self, Read};

use super::{CompressionKind, Decoder};

/// LZMA decoder.
pub struct LzmaDecoder<R> {
    inner: lzma_rust2::LzmaReader<R>,
}

impl<R> std::fmt::Debug for LzmaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> LzmaDecoder<R> {
    /// Creates a new LZMA decoder.
    ///
    /// # Arguments
    ///
    /// * `input` - The compressed data source
    /// * `properties` - LZMA properties (5 bytes: 1 byte props + 4 byte dict size)
    /// * `uncompressed_size` - Expected uncompressed size, or `u64::MAX` when
    ///   the stream is terminated by an end marker
    ///
    /// # Errors
    ///
    /// Returns an error if properties are invalid.
    pub fn new(input: R, properties: &[u8], uncompressed_size: u64) -> Result<Self> {
        let [props_byte, d0, d1, d2, d3, ..] = *properties else {
            return Err(Error::InvalidFormat(
                "LZMA properties too short (need 5 bytes)".into(),
            ));
        };
        let dict_size = u32::from_le_bytes([d0, d1, d2, d3]);

        let reader = lzma_rust2::LzmaReader::new_with_props(
            input,
            uncompressed_size,
            props_byte,
            dict_size,
            None,
        )
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;

        Ok(Self { inner: reader })
    }
}

impl<R: Read + Send> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for LzmaDecoder<R> {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Lzma
    }
}

/// LZMA2 decoder.
pub struct Lzma2Decoder<R> {
    inner: lzma_rust2::Lzma2Reader<R>,
}

impl<R> std::fmt::Debug for Lzma2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read + Send> Lzma2Decoder<R> {
    /// Creates a new LZMA2 decoder.
    ///
    /// # Arguments
    ///
    /// * `input` - The compressed data source
    /// * `properties` - LZMA2 properties (1 byte encoding dictionary size)
    ///
    /// # Errors
    ///
    /// Returns an error if properties are invalid.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        let Some(&prop) = properties.first() else {
            return Err(Error::InvalidFormat("LZMA2 properties missing".into()));
        };

        let dict_size = decode_lzma2_dict_size(prop)?;
        let reader = lzma_rust2::Lzma2Reader::new(input, dict_size, None);

        Ok(Self { inner: reader })
    }
}

impl<R: Read + Send> Read for Lzma2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> Decoder for Lzma2Decoder<R> {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Lzma2
    }
}

/// Decodes the LZMA2 dictionary size from the property byte.
///
/// Values 0-39 select sizes from 4KB upward, alternating between `2^n` and
/// `3 * 2^(n-1)`; 40 means 4GB - 1.
fn decode_lzma2_dict_size(prop: u8) -> Result<u32> {
    if prop > 40 {
        return Err(Error::InvalidFormat(format!(
            "invalid LZMA2 dictionary size property: {}",
            prop
        )));
    }

    if prop == 40 {
        return Ok(0xFFFF_FFFF);
    }

    let base_log = (prop as u32) / 2 + 12;
    let dict_size = if prop % 2 == 0 {
        1u32 << base_log
    } else {
        3u32 << (base_log - 1)
    };

    Ok(dict_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_decode_lzma2_dict_size() {
        // Prop 0: 2^12 = 4KB
        assert_eq!(decode_lzma2_dict_size(0).unwrap(), 4096);
        // Prop 1: 3 * 2^11 = 6KB
        assert_eq!(decode_lzma2_dict_size(1).unwrap(), 6144);
        // Prop 18: 2^21 = 2MB
        assert_eq!(decode_lzma2_dict_size(18).unwrap(), 2 * 1024 * 1024);
        // Prop 40: 4GB - 1
        assert_eq!(decode_lzma2_dict_size(40).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_decode_lzma2_dict_size_invalid() {
        assert!(decode_lzma2_dict_size(41).is_err());
        assert!(decode_lzma2_dict_size(255).is_err());
    }

    #[test]
    fn test_lzma_decoder_properties_too_short() {
        let err = LzmaDecoder::new(Cursor::new(vec![]), &[0x5D], 0).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_lzma2_decoder_properties_missing() {
        let err = Lzma2Decoder::new(Cursor::new(vec![]), &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_lzma_end_marker_stream_with_unknown_size() {
        let data = b"Hello, World! This is a test of LZMA compression.";
        let options = lzma_rust2::LzmaOptions::with_preset(0);

        let mut compressed = Vec::new();
        {
            let mut writer =
                lzma_rust2::LzmaWriter::new_no_header(Cursor::new(&mut compressed), &options, true)
                    .unwrap();
            writer.write_all(data).unwrap();
            writer.finish().unwrap();
        }

        let mut props = vec![options.get_props()];
        props.extend_from_slice(&options.dict_size.to_le_bytes());

        let mut decoder = LzmaDecoder::new(Cursor::new(&compressed), &props, u64::MAX).unwrap();
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();

        assert_eq!(decompressed, data);
        assert_eq!(decoder.kind(), CompressionKind::Lzma);
    }
}
