//! Error types for archive reading operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of the reader engine, along with a convenient [`Result<T>`]
//! type alias.
//!
//! # Error Categories
//!
//! | Category | Variants | Typical Cause |
//! |----------|----------|---------------|
//! | Usage | [`Usage`][Error::Usage] | Caller misuse of the forward-only protocol |
//! | Format | [`InvalidFormat`][Error::InvalidFormat], [`CorruptHeader`][Error::CorruptHeader], [`UnsupportedMethod`][Error::UnsupportedMethod] | Malformed or unsupported archive data |
//! | Multi-volume | [`MultiVolume`][Error::MultiVolume], [`VolumeMissing`][Error::VolumeMissing] | A continuation volume cannot be supplied |
//! | Incompleteness | [`IncompleteEntry`][Error::IncompleteEntry] | Totals queried before the terminal part was seen |
//! | Source | [`Io`][Error::Io], [`MultipartStreamRequired`][Error::MultipartStreamRequired] | The byte source cannot be read or positioned |
//!
//! # Example
//!
//! ```rust
//! use volread::{Error, UsageError};
//!
//! fn describe(error: &Error) -> &'static str {
//!     match error {
//!         Error::Usage(UsageError::StreamAlreadyOpened) => "entry was already read",
//!         e if e.is_multi_volume_error() => "a volume is missing",
//!         e if e.is_format_error() => "not a readable archive",
//!         _ => "other failure",
//!     }
//! }
//! ```

use std::io;

use crate::codec::CompressionKind;

/// Caller misuse of the reader protocol.
///
/// Usage errors are always raised immediately and synchronously, and never
/// change the reader's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UsageError {
    /// The current entry's stream was already opened, written out or skipped.
    StreamAlreadyOpened,
    /// There is no current entry (before the first `advance` or after completion).
    NoCurrentEntry,
    /// The reader was cancelled.
    Cancelled,
    /// A file part was used after the volume backing it was released.
    VolumeReleased,
    /// The reader is unavailable (a previous async operation did not return it).
    ReaderUnavailable,
    /// An entry index past the end of the archive's index.
    NoSuchEntry {
        /// The requested index.
        index: usize,
        /// The number of indexed entries.
        count: usize,
    },
}

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamAlreadyOpened => write!(f, "entry stream can only be opened once"),
            Self::NoCurrentEntry => write!(f, "no current entry; call advance() first"),
            Self::Cancelled => write!(f, "reader was cancelled"),
            Self::VolumeReleased => write!(f, "file part used after its volume was released"),
            Self::ReaderUnavailable => write!(f, "reader is unavailable after a failed task"),
            Self::NoSuchEntry { index, count } => {
                write!(f, "entry index {} out of range ({} entries)", index, count)
            }
        }
    }
}

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_index: usize,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch for entry {}", self.entry_index)?;
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        write!(f, ": expected {:#x}, got {:#x}", self.expected, self.actual)
    }
}

/// The main error type for archive reading operations.
///
/// Each variant includes the context needed to diagnose the failure. The
/// reader never recovers from format or multi-volume errors on its own: it
/// surfaces them and leaves the archive in the completed state.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading a byte source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller violated the reader protocol.
    ///
    /// ```rust
    /// use volread::{Error, UsageError};
    ///
    /// let err = Error::Usage(UsageError::StreamAlreadyOpened);
    /// assert!(err.is_usage_error());
    /// ```
    #[error("Invalid usage: {0}")]
    Usage(UsageError),

    /// The archive format is invalid or not recognized.
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// An archive header is corrupt or truncated.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The entry uses a compression method this build cannot decode.
    ///
    /// Some methods are never decoded by this crate (Deflate64, LZW, RLE);
    /// others depend on Cargo features (`lzma`, `deflate`, `bzip2`, `ppmd`).
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression kind that is not supported.
        method: CompressionKind,
    },

    /// A feature required by the operation is not supported.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// The entry uses an encryption scheme this build cannot decrypt.
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// A password is required but none was provided.
    #[error("password required for encrypted archive")]
    PasswordRequired,

    /// A cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// A multi-volume archive cannot be continued.
    ///
    /// Raised when the caller's volume sequence is exhausted while a split
    /// entry still needs continuation, or when a single-volume reader reaches
    /// an entry that continues into another volume. This is fatal for the
    /// current archive: recovering requires volume data only the caller has.
    #[error("Multi-volume extraction failed: {0}")]
    MultiVolume(String),

    /// A volume file listed by the caller could not be opened.
    #[error("Volume {volume} missing: expected at '{path}'")]
    VolumeMissing {
        /// The volume number (1-indexed) that is missing.
        volume: u32,
        /// The path of the missing volume.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Totals were queried on an entry whose terminal part has not been read.
    #[error("Incomplete entry '{key}': the terminal volume part has not been read yet")]
    IncompleteEntry {
        /// The key of the incomplete entry.
        key: String,
    },

    /// The byte source cannot be read or positioned the way the operation requires.
    ///
    /// The engine raises this instead of silently returning truncated data.
    #[error("Multipart stream required: {0}")]
    MultipartStreamRequired(String),

    /// The CRC checksum of decoded data does not match the header.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry index with the CRC mismatch.
        entry_index: usize,
        /// The entry key with the CRC mismatch (if known).
        entry_name: Option<String>,
        /// The expected CRC value from the archive.
        expected: u32,
        /// The actual CRC value of the decoded data.
        actual: u32,
    },

    /// A resource limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl Error {
    /// Returns `true` if this error reports caller misuse.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// Returns `true` if this error reports malformed or unsupported archive data.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::CorruptHeader { .. }
                | Error::UnsupportedMethod { .. }
                | Error::UnsupportedFeature { .. }
                | Error::UnsupportedEncryption(_)
        )
    }

    /// Returns `true` if this error means a continuation volume is unavailable.
    pub fn is_multi_volume_error(&self) -> bool {
        matches!(self, Error::MultiVolume(_) | Error::VolumeMissing { .. })
    }

    /// Returns `true` if this is a data corruption error.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CrcMismatch { .. } | Error::CorruptHeader { .. }
        )
    }

    /// Returns `true` if this is an encryption-related error.
    pub fn is_encryption_error(&self) -> bool {
        matches!(
            self,
            Error::PasswordRequired | Error::CryptoError(_) | Error::UnsupportedEncryption(_)
        )
    }

    /// Returns the entry key associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::CrcMismatch { entry_name, .. } => entry_name.as_deref(),
            Error::IncompleteEntry { key } => Some(key.as_str()),
            Error::VolumeMissing { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Recovers an engine error that travelled through `std::io::Read`.
    ///
    /// Decoders only speak `io::Error`, so engine failures raised below them
    /// are wrapped on the way down; this unwraps them on the way back up.
    pub fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(engine)) => *engine,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::Io(io::Error::other("empty error payload")),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// A specialized Result type for archive reading operations.
pub type Result<T> = std::result::Result<T, Error>;
