//! Archive format tags and signature sniffing.
//!
//! The engine never parses container headers itself, but it does recognize
//! the magic bytes of the common container families. That lets it tell
//! "not an archive" apart from "an archive no registered parser handles".

/// Container format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ArchiveFormat {
    /// RAR (v1.5 through v5).
    Rar,
    /// ZIP.
    Zip,
    /// TAR.
    Tar,
    /// 7-Zip style containers.
    SevenZip,
    /// ARC / PAK.
    Arc,
    /// ACE.
    Ace,
    /// A format registered by the caller.
    Other(&'static str),
}

impl ArchiveFormat {
    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Rar => "RAR",
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::SevenZip => "7-Zip",
            ArchiveFormat::Arc => "ARC",
            ArchiveFormat::Ace => "ACE",
            ArchiveFormat::Other(name) => *name,
        }
    }

    /// Guesses the format from a volume file extension.
    ///
    /// ```rust
    /// use volread::format::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::from_extension("RAR"), Some(ArchiveFormat::Rar));
    /// assert_eq!(ArchiveFormat::from_extension("r01"), Some(ArchiveFormat::Rar));
    /// assert_eq!(ArchiveFormat::from_extension("txt"), None);
    /// ```
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        match extension.as_str() {
            "rar" => Some(ArchiveFormat::Rar),
            "zip" | "zipx" => Some(ArchiveFormat::Zip),
            "tar" => Some(ArchiveFormat::Tar),
            "7z" => Some(ArchiveFormat::SevenZip),
            "arc" | "pak" => Some(ArchiveFormat::Arc),
            "ace" => Some(ArchiveFormat::Ace),
            // Old-style RAR continuation volumes: .r00, .r01, ...
            ext if ext.len() == 3
                && ext.starts_with('r')
                && ext[1..].bytes().all(|b| b.is_ascii_digit()) =>
            {
                Some(ArchiveFormat::Rar)
            }
            // Split ZIP segments: .z01, .z02, ...
            ext if ext.len() == 3
                && ext.starts_with('z')
                && ext[1..].bytes().all(|b| b.is_ascii_digit()) =>
            {
                Some(ArchiveFormat::Zip)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Known leading signatures.
const SIGNATURES: &[(&[u8], ArchiveFormat)] = &[
    // RAR 1.5-4.x: 'R' 'a' 'r' '!' 0x1A 0x07 0x00
    (&[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00], ArchiveFormat::Rar),
    // RAR5: 'R' 'a' 'r' '!' 0x1A 0x07 0x01 0x00
    (
        &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00],
        ArchiveFormat::Rar,
    ),
    // ZIP local file header
    (&[0x50, 0x4B, 0x03, 0x04], ArchiveFormat::Zip),
    // ZIP split archive marker
    (&[0x50, 0x4B, 0x07, 0x08], ArchiveFormat::Zip),
    // ZIP empty archive
    (&[0x50, 0x4B, 0x05, 0x06], ArchiveFormat::Zip),
    // 7z: '7' 'z' 0xBC 0xAF 0x27 0x1C
    (
        &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C],
        ArchiveFormat::SevenZip,
    ),
];

/// ACE stores "**ACE**" at offset 7.
const ACE_SIGNATURE: &[u8] = b"**ACE**";
const ACE_SIGNATURE_OFFSET: usize = 7;

/// TAR USTAR signature at offset 257.
const TAR_USTAR_SIGNATURE: &[u8] = b"ustar";
const TAR_USTAR_OFFSET: usize = 257;

/// ARC headers start with 0x1A followed by a method byte in 1..=20.
const ARC_MARKER: u8 = 0x1A;

/// Number of leading bytes [`sniff_signature`] looks at.
pub const SNIFF_LEN: usize = TAR_USTAR_OFFSET + TAR_USTAR_SIGNATURE.len();

/// Identifies a container family from the first bytes of a volume.
///
/// `prefix` may be shorter than [`SNIFF_LEN`]; checks that need more bytes
/// than are available simply do not match.
///
/// ```rust
/// use volread::format::{sniff_signature, ArchiveFormat};
///
/// assert_eq!(sniff_signature(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
/// assert_eq!(sniff_signature(b"plain text"), None);
/// ```
pub fn sniff_signature(prefix: &[u8]) -> Option<ArchiveFormat> {
    for (signature, format) in SIGNATURES {
        if prefix.starts_with(signature) {
            return Some(*format);
        }
    }

    if prefix
        .get(ACE_SIGNATURE_OFFSET..ACE_SIGNATURE_OFFSET + ACE_SIGNATURE.len())
        .is_some_and(|s| s == ACE_SIGNATURE)
    {
        return Some(ArchiveFormat::Ace);
    }

    if prefix
        .get(TAR_USTAR_OFFSET..TAR_USTAR_OFFSET + TAR_USTAR_SIGNATURE.len())
        .is_some_and(|s| s == TAR_USTAR_SIGNATURE)
    {
        return Some(ArchiveFormat::Tar);
    }

    // ARC has no real magic; accept the marker plus a plausible method byte
    if let [ARC_MARKER, method, ..] = prefix {
        if (1..=20).contains(method) {
            return Some(ArchiveFormat::Arc);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_rar_both_generations() {
        let rar4 = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00, 0xCF];
        let rar5 = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];
        assert_eq!(sniff_signature(&rar4), Some(ArchiveFormat::Rar));
        assert_eq!(sniff_signature(&rar5), Some(ArchiveFormat::Rar));
    }

    #[test]
    fn test_sniff_7z() {
        let data = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
        assert_eq!(sniff_signature(&data), Some(ArchiveFormat::SevenZip));
    }

    #[test]
    fn test_sniff_tar() {
        let mut block = vec![0u8; 512];
        block[257..262].copy_from_slice(b"ustar");
        assert_eq!(sniff_signature(&block), Some(ArchiveFormat::Tar));
        // Too short to reach the USTAR magic
        assert_eq!(sniff_signature(&block[..100]), None);
    }

    #[test]
    fn test_sniff_ace() {
        let mut data = vec![0u8; 16];
        data[7..14].copy_from_slice(b"**ACE**");
        assert_eq!(sniff_signature(&data), Some(ArchiveFormat::Ace));
    }

    #[test]
    fn test_sniff_arc() {
        assert_eq!(sniff_signature(&[0x1A, 0x08, 0x41]), Some(ArchiveFormat::Arc));
        assert_eq!(sniff_signature(&[0x1A, 0x00]), None);
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(sniff_signature(&[]), None);
        assert_eq!(sniff_signature(b"hello world"), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(ArchiveFormat::from_extension("zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_extension("z01"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_extension("r00"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_extension("rxx"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ArchiveFormat::SevenZip.to_string(), "7-Zip");
        assert_eq!(ArchiveFormat::Other("FXAR").to_string(), "FXAR");
    }
}
