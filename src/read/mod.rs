//! Entries, reader options and random access.
//!
//! This module provides the types shared by the sequential
//! [`Reader`](crate::Reader) and the random-access [`Archive`]:
//!
//! - [`Entry`] and [`FilePart`]: a logical entry and its per-volume pieces
//! - [`ReaderOptions`]: password, access mode and resource limits
//! - [`Archive`]: indexes seekable volumes and opens entries by index
//!
//! # Example
//!
//! ```rust,ignore
//! use volread::read::{Archive, ReaderOptions};
//!
//! let archive = Archive::open_paths(["backup.r00", "backup.r01"], formats, ReaderOptions::default())?;
//! for entry in archive.entries() {
//!     println!("{}: {} parts", entry.key(), entry.parts().len());
//! }
//! ```

mod archive;
mod entry;
mod options;

pub use archive::{Archive, EntryReader};
pub use entry::{Entry, FilePart, PartReader};
pub use options::{AccessMode, ReaderOptions};
