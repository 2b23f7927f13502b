//! Uniform header records produced by format parsers.

use crate::Timestamp;
use crate::codec::CompressionKind;
use crate::crypto::Encryption;

/// Archive-wide flags read when a volume is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Entries share one continuous compression stream.
    pub is_solid: bool,
    /// The archive is split across several volumes.
    pub is_multi_volume: bool,
    /// This is the first volume of the archive.
    pub is_first_volume: bool,
    /// Header records themselves are encrypted.
    pub headers_encrypted: bool,
}

impl VolumeInfo {
    /// Flags of a plain single-volume archive.
    pub fn single() -> Self {
        Self {
            is_first_volume: true,
            ..Self::default()
        }
    }
}

/// Uniform booleans computed by a parser from format-specific bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFlags {
    /// The entry is a directory.
    pub is_directory: bool,
    /// The entry's data is encrypted.
    pub is_encrypted: bool,
    /// This part continues an entry begun in the previous volume.
    pub split_before: bool,
    /// The entry continues in the next volume.
    pub split_after: bool,
}

/// One header record: the description of one physical part of an entry.
///
/// Non-split entries have exactly one header. A split entry has one header
/// per volume it touches; only the terminal one (without
/// [`split_after`](HeaderFlags::split_after)) is guaranteed to carry the
/// entry's real size and CRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Entry path inside the archive.
    pub key: String,
    /// Uncompressed size of the whole entry.
    pub size: u64,
    /// Length of this part's (compressed) data in the volume.
    pub compressed_size: u64,
    /// CRC-32 of the whole entry's uncompressed data.
    pub crc: Option<u32>,
    /// Compression kind of the entry.
    pub compression: CompressionKind,
    /// Codec properties.
    pub compression_properties: Vec<u8>,
    /// Encryption of the entry data.
    pub encryption: Option<Encryption>,
    /// Uniform flags.
    pub flags: HeaderFlags,
    /// Absolute offset of this part's data in the volume.
    ///
    /// `None` means the data starts where the parser left the cursor.
    pub data_offset: Option<u64>,
    /// Last modification time.
    pub modified: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
    /// Raw platform attributes.
    pub attributes: u32,
    /// Format-specific flag bits, kept for callers that need them.
    pub raw_flags: u32,
    /// Whether this part's bytes may be stepped over without decoding.
    ///
    /// Formats that cannot delimit the compressed data of an entry (for
    /// instance entries whose length is only known from the codec's end
    /// marker) clear this.
    pub raw_skip: bool,
}

impl FileHeader {
    /// Creates a header with the given key and compression kind.
    ///
    /// Sizes start at zero and every optional field at `None`.
    pub fn new(key: impl Into<String>, compression: CompressionKind) -> Self {
        Self {
            key: key.into(),
            size: 0,
            compressed_size: 0,
            crc: None,
            compression,
            compression_properties: Vec::new(),
            encryption: None,
            flags: HeaderFlags::default(),
            data_offset: None,
            modified: None,
            created: None,
            accessed: None,
            attributes: 0,
            raw_flags: 0,
            raw_skip: true,
        }
    }

    /// Creates a directory header.
    pub fn directory(key: impl Into<String>) -> Self {
        let mut header = Self::new(key, CompressionKind::Stored);
        header.flags.is_directory = true;
        header
    }

    /// Returns `true` if this is the terminal header of its entry.
    pub fn is_terminal(&self) -> bool {
        !self.flags.split_after
    }

    /// Returns `true` if this header continues a previous part with the
    /// given key.
    pub fn continues(&self, key: &str) -> bool {
        self.flags.split_before && self.key == key
    }
}
