//! # volread
//!
//! A forward-only reader engine for archives split across volumes.
//!
//! Archive formats plug in as header parsers; the engine walks the volumes
//! in order, joins entries that are split across volume boundaries, decodes
//! solid streams entry by entry, and verifies sizes and CRC-32 checksums.
//! Each volume is opened only when needed and released as soon as the
//! reader moves past it.
//!
//! ## Quick Start
//!
//! ### Reading entries in order
//!
//! ```rust,ignore
//! use volread::{Reader, ReaderOptions, Result};
//! use volread::volume::MultiVolume;
//!
//! fn main() -> Result<()> {
//!     let volumes = MultiVolume::from_paths(["backup.part1.rar", "backup.part2.rar"]);
//!     let mut reader = Reader::with_strategy(volumes, formats(), ReaderOptions::default());
//!
//!     while reader.advance()? {
//!         let entry = reader.entry().unwrap();
//!         println!("{} ({} parts)", entry.key(), entry.parts().len());
//!         if !entry.is_directory() {
//!             reader.write_entry_to(&mut std::io::sink())?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Plugging in a format
//!
//! A format is a [`HeaderParser`](format::HeaderParser) plus a
//! [`FormatDescriptor`](format::FormatDescriptor) registered in a
//! [`FormatRegistry`](format::FormatRegistry). The registry picks the
//! parser by sniffing the first volume's leading bytes.
//!
//! ### Random access
//!
//! When every volume is seekable, [`Archive`] indexes all headers up front
//! and opens non-solid entries in any order.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA and LZMA2 decoding |
//! | `deflate` | Yes | Deflate decoding |
//! | `bzip2` | Yes | BZip2 decoding |
//! | `ppmd` | Yes | PPMd variant H decoding |
//! | `aes` | Yes | AES-256 decryption of entry data |
//! | `async` | No | Async/await API with Tokio integration |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. Errors are grouped by what the
//! caller can do about them:
//!
//! ```rust,ignore
//! use volread::{Error, UsageError};
//!
//! match reader.advance() {
//!     Ok(more) => { /* ... */ }
//!     Err(Error::Usage(UsageError::Cancelled)) => { /* stopped on request */ }
//!     Err(e) if e.is_multi_volume_error() => { /* a volume is missing or foreign */ }
//!     Err(e) if e.is_format_error() => { /* not a readable archive */ }
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! Format, multi-volume and I/O errors stop the reader; usage errors and
//! CRC mismatches do not.
//!
//! ## Logging
//!
//! The engine logs through the [`log`](https://docs.rs/log) facade: volume
//! transitions at `debug`, per-header and per-part events at `trace`, and
//! checksum mismatches at `warn`.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod progress;
pub mod read;
pub mod streaming;
pub mod timestamp;
pub mod volume;

// Async modules (requires "async" feature)
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub mod async_read;

pub use error::{Error, Result, UsageError};
pub use timestamp::Timestamp;

pub use crypto::{Encryption, Password};

// Re-export the format plug-in API
pub use format::{
    ArchiveFormat, FileHeader, FormatDescriptor, FormatRegistry, HeaderFlags, HeaderParser,
    VolumeInfo,
};

// Re-export reading API at crate root for convenience
pub use read::{AccessMode, Archive, Entry, EntryReader, FilePart, PartReader, ReaderOptions};
pub use streaming::{EntryStream, Reader, ReaderState};

// Re-export volume API
pub use volume::{MultiVolume, SingleVolume, Source, SourceCursor, VolumeStrategy};

// Re-export progress API
pub use progress::{
    AtomicProgress, CancelHandle, NoListener, ReadStatistics, ReaderListener, StatisticsListener,
};

#[cfg(feature = "async")]
pub use async_read::AsyncReader;

// Re-export CancellationToken for convenience
#[cfg(feature = "async")]
pub use tokio_util::sync::CancellationToken;
