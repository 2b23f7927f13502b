//! Volumes: physical sources and the order they are read in.
//!
//! An archive is read from one or more physical volumes. Each volume owns
//! its [`Source`] and a fresh header parser. A [`VolumeStrategy`] decides
//! where the next volume comes from:
//!
//! - [`SingleVolume`] reads one source and never continues
//! - [`MultiVolume`] pulls sources lazily from a caller-supplied sequence
//!
//! # Reading split volumes from disk
//!
//! ```rust,ignore
//! use volread::volume::MultiVolume;
//! use volread::{Reader, ReaderOptions};
//!
//! let volumes = MultiVolume::from_paths(["backup.part1.rar", "backup.part2.rar"]);
//! let mut reader = Reader::with_strategy(volumes, formats, ReaderOptions::default());
//! while reader.advance()? {
//!     println!("{}", reader.entry().unwrap().key());
//! }
//! ```

pub(crate) mod chain;
pub mod source;
mod strategy;

use std::sync::Arc;

pub use source::{ReadSeek, Source, SourceCursor};
pub use strategy::{MultiVolume, SingleVolume, VolumePaths, VolumeStrategy};

use crate::format::{ArchiveFormat, FormatDescriptor, HeaderParser, VolumeInfo};
use crate::read::{FilePart, ReaderOptions};
use crate::{Error, Result};
use source::{SharedSource, SourceState, lock_or_recover};

/// One opened physical volume.
pub(crate) struct Volume {
    index: u32,
    info: VolumeInfo,
    format: ArchiveFormat,
    source: SharedSource,
    parser: Box<dyn HeaderParser>,
    /// Offset just past the data of the last yielded header.
    resume_at: Option<u64>,
}

impl Volume {
    /// Opens a volume and reads its archive header.
    pub(crate) fn open(
        index: u32,
        mut state: SourceState,
        descriptor: &FormatDescriptor,
        options: &ReaderOptions,
    ) -> Result<Self> {
        let mut parser = descriptor.create_parser();
        let info = parser.open_volume(&mut SourceCursor::new(&mut state), options)?;
        log::debug!(
            "opened {} volume {} (solid: {}, multi-volume: {}, first: {})",
            descriptor.format,
            index,
            info.is_solid,
            info.is_multi_volume,
            info.is_first_volume
        );
        Ok(Self {
            index,
            info,
            format: descriptor.format,
            source: state.into_shared(),
            parser,
            resume_at: None,
        })
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    pub(crate) fn info(&self) -> &VolumeInfo {
        &self.info
    }

    pub(crate) fn position(&self) -> u64 {
        lock_or_recover(&self.source).position()
    }

    /// Reads the next header and wraps it as a file part.
    ///
    /// The volume first moves past the data of the previous part, so callers
    /// that did not consume it still land on the next header.
    pub(crate) fn next_part(&mut self) -> Result<Option<FilePart>> {
        let mut state = lock_or_recover(&self.source);
        if let Some(offset) = self.resume_at.take() {
            state.seek_to(offset)?;
        }

        let mut cursor = SourceCursor::new(&mut state);
        let Some(header) = self.parser.next_header(&mut cursor)? else {
            return Ok(None);
        };
        let data_offset = header.data_offset.unwrap_or(cursor.position());
        let end = data_offset
            .checked_add(header.compressed_size)
            .ok_or_else(|| {
                Error::corrupt_header(data_offset, "entry data extends past u64 range")
            })?;
        self.resume_at = Some(end);

        log::trace!(
            "volume {}: header '{}' ({} bytes at {})",
            self.index,
            header.key,
            header.compressed_size,
            data_offset
        );
        Ok(Some(FilePart::new(
            header,
            Arc::downgrade(&self.source),
            self.index,
            data_offset,
        )))
    }

    /// Detaches the source; parts of this volume become unusable.
    pub(crate) fn release(&mut self) -> Option<Source> {
        log::debug!("releasing volume {}", self.index);
        lock_or_recover(&self.source).release()
    }
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("index", &self.index)
            .field("format", &self.format)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
