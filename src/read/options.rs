//! Options shared by the sequential reader and the archive facade.

use crate::Password;

/// How the engine moves over bytes it does not need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Seek over unneeded bytes whenever the source supports it.
    #[default]
    Seekable,
    /// Never seek; unneeded bytes are read and discarded, even on seekable
    /// sources.
    Streaming,
}

/// Immutable options for a reader or archive.
///
/// # Example
///
/// ```rust
/// use volread::read::{AccessMode, ReaderOptions};
///
/// let options = ReaderOptions::new()
///     .password("secret")
///     .mode(AccessMode::Streaming)
///     .keep_open(true)
///     .max_entries(10_000);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Password for encrypted entries (and encrypted headers).
    pub password: Option<Password>,

    /// Access mode.
    ///
    /// Default: [`AccessMode::Seekable`].
    pub mode: AccessMode,

    /// Hand released volume sources back to the caller instead of dropping
    /// them (see `Reader::take_retained_sources`).
    ///
    /// Default: false.
    pub keep_open: bool,

    /// Verify the CRC-32 of fully decoded entries.
    ///
    /// Default: true.
    pub verify_crc: bool,

    /// Maximum number of entries to yield.
    ///
    /// Default: 1,000,000.
    pub max_entries: usize,

    /// Buffer size used when copying entry data to a sink (bytes).
    ///
    /// Default: 64 KiB.
    pub read_buffer_size: usize,

    /// Maximum number of compressed bytes held in memory for a solid stream.
    ///
    /// Split entries of a solid archive are buffered until their terminal
    /// part is seen. Default: 64 MiB.
    pub max_memory_buffer: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            password: None,
            mode: AccessMode::Seekable,
            keep_open: false,
            verify_crc: true,
            max_entries: 1_000_000,
            read_buffer_size: 64 * 1024,         // 64 KiB
            max_memory_buffer: 64 * 1024 * 1024, // 64 MiB
        }
    }
}

impl ReaderOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the access mode.
    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether released sources are kept for the caller.
    pub fn keep_open(mut self, keep: bool) -> Self {
        self.keep_open = keep;
        self
    }

    /// Sets whether to verify CRC checksums.
    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, count: usize) -> Self {
        self.max_entries = count;
        self
    }

    /// Sets the read buffer size.
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    /// Sets the solid carry buffer limit.
    pub fn max_memory_buffer(mut self, bytes: usize) -> Self {
        self.max_memory_buffer = bytes;
        self
    }

    /// Returns `true` if seeks may be used on seekable sources.
    pub fn allows_seek(&self) -> bool {
        self.mode == AccessMode::Seekable
    }

    /// Validates the options.
    ///
    /// Returns an error if any values are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.read_buffer_size == 0 {
            return Err(crate::Error::InvalidFormat(
                "read_buffer_size must be greater than 0".into(),
            ));
        }
        if self.max_entries == 0 {
            return Err(crate::Error::InvalidFormat(
                "max_entries must be greater than 0".into(),
            ));
        }
        if self.max_memory_buffer == 0 {
            return Err(crate::Error::InvalidFormat(
                "max_memory_buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
