//! Forward-only reading of entries across volumes.
//!
//! This module holds the engine behind [`Reader`]: it walks the volumes a
//! [`VolumeStrategy`](crate::volume::VolumeStrategy) supplies, presents
//! entries split across volumes as one entry, and decodes solid streams
//! entry by entry.
//!
//! # Overview
//!
//! - **[`Reader`]**: the entry state machine (`advance`, open, skip)
//! - **[`EntryStream`]**: decoded data of the current entry
//! - **[`ReaderState`]**: where the reader stands
//!
//! # Solid Archives
//!
//! Entries of a solid archive share one compressed stream. For them:
//! - Entries must be processed in order
//! - Skipping an entry still decompresses it (but discards the data)
//! - A split solid entry is buffered until its last part, bounded by
//!   [`ReaderOptions::max_memory_buffer`](crate::ReaderOptions::max_memory_buffer)
//!
//! Non-solid entries are skipped by stepping over their raw bytes.
//!
//! # Memory
//!
//! The reader keeps at most one decoder and one volume source alive, plus
//! the solid carry buffer described above.
//!
//! ```rust,ignore
//! use volread::{Reader, ReaderOptions};
//!
//! let options = ReaderOptions::new()
//!     .max_memory_buffer(16 * 1024 * 1024)
//!     .read_buffer_size(32 * 1024);
//! let mut reader = Reader::multi(volumes, formats, options);
//! while reader.advance()? {
//!     let mut out = std::io::sink();
//!     reader.write_entry_to(&mut out)?;
//! }
//! ```

mod feed;
mod reader;
mod solid;
mod stream;

pub use reader::{Reader, ReaderState};
pub use stream::EntryStream;
