//! Pull-based feed of an entry's raw bytes.
//!
//! Decoders read the current entry's compressed bytes through a
//! [`PartFeed`]. The feed serves carried-over solid bytes first, then the
//! active file part. When a part marked split-after runs dry, the feed
//! opens the next volume, checks that its first header continues the same
//! entry, and keeps going. A decoder never sees a volume boundary.
//!
//! The engine state lives behind `Arc<Mutex<_>>` so the reader and the
//! decoder pipeline it builds can both reach it. The reader never holds the
//! lock while calling into a decoder; the lock order is engine, then source.

use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use crate::format::{FormatRegistry, VolumeInfo};
use crate::progress::ReaderListener;
use crate::read::{Entry, FilePart, PartReader, ReaderOptions};
use crate::volume::chain::VolumeChain;
use crate::volume::source::lock_or_recover;
use crate::volume::{Source, VolumeStrategy};
use crate::{Error, Result};

/// Shared handle to the engine.
pub(crate) type SharedEngine = Arc<Mutex<Engine>>;

/// The active part of the entry being fed.
struct ActivePart {
    reader: PartReader,
    index: usize,
    length: u64,
    split_after: bool,
    started: bool,
}

/// Volume chain, listener and feed state shared with decoders.
pub(crate) struct Engine {
    chain: VolumeChain,
    listener: Box<dyn ReaderListener>,
    key: String,
    active: Option<ActivePart>,
    /// Continuation parts found while feeding, not yet seen by the reader.
    discovered: Vec<FilePart>,
    /// Raw solid-stream bytes read past the end of a previous entry.
    carry: Vec<u8>,
    carry_pos: usize,
}

impl Engine {
    pub(crate) fn new(
        strategy: Box<dyn VolumeStrategy>,
        formats: FormatRegistry,
        options: ReaderOptions,
        listener: Box<dyn ReaderListener>,
    ) -> Self {
        Self {
            chain: VolumeChain::new(strategy, formats, options),
            listener,
            key: String::new(),
            active: None,
            discovered: Vec::new(),
            carry: Vec::new(),
            carry_pos: 0,
        }
    }

    pub(crate) fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn set_listener(&mut self, listener: Box<dyn ReaderListener>) {
        self.listener = listener;
    }

    pub(crate) fn listener(&mut self) -> &mut dyn ReaderListener {
        self.listener.as_mut()
    }

    pub(crate) fn options(&self) -> &ReaderOptions {
        self.chain.options()
    }

    pub(crate) fn stage(&mut self, source: Source) -> Option<Source> {
        self.chain.stage(source)
    }

    pub(crate) fn take_retained(&mut self) -> Vec<Source> {
        self.chain.take_retained()
    }

    pub(crate) fn release_all(&mut self) {
        self.active = None;
        self.clear_carry();
        self.chain.release_all();
    }

    /// Returns the current volume's index, flags and position.
    pub(crate) fn current_volume(&self) -> Option<(u32, VolumeInfo, u64)> {
        self.chain
            .current()
            .map(|v| (v.index(), *v.info(), v.position()))
    }

    fn volume_opened(&mut self, index: u32, info: &VolumeInfo) -> Result<()> {
        self.listener.on_volume_opened(index, info)
    }

    /// Opens the first volume. Returns `false` if the strategy supplied none.
    pub(crate) fn open_first(&mut self) -> Result<bool> {
        match self.chain.open_first()? {
            Some((index, info)) => {
                self.volume_opened(index, &info)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads the header that starts the next entry, moving to the next
    /// volume when the current one is exhausted.
    pub(crate) fn next_entry_part(&mut self) -> Result<Option<(FilePart, VolumeInfo)>> {
        loop {
            let Some(volume) = self.chain.current_mut() else {
                return Ok(None);
            };
            let index = volume.index();
            let info = *volume.info();
            if let Some(part) = volume.next_part()? {
                let header = part.header();
                if header.flags.split_before {
                    return Err(Error::MultiVolume(format!(
                        "entry '{}' continues a part from a volume that was not read",
                        header.key
                    )));
                }
                if header.flags.split_after && !self.chain.supports_continuation() {
                    return Err(Error::MultiVolume(format!(
                        "entry '{}' continues in the next volume; a multi-volume reader is required",
                        header.key
                    )));
                }
                return Ok(Some((part, info)));
            }

            log::debug!("volume {} has no more headers", index);
            match self.chain.open_next()? {
                Some((index, info)) => self.volume_opened(index, &info)?,
                None => return Ok(None),
            }
        }
    }

    /// Points the feed at the first part of `entry`.
    pub(crate) fn begin_entry(&mut self, entry: &Entry) {
        self.key = entry.key().to_string();
        self.discovered.clear();
        self.active = entry.parts().first().map(|part| ActivePart {
            reader: part.data_reader(),
            index: 0,
            length: part.length(),
            split_after: part.header().flags.split_after,
            started: false,
        });
    }

    /// Returns continuation parts found since the last call.
    pub(crate) fn take_discovered(&mut self) -> Vec<FilePart> {
        std::mem::take(&mut self.discovered)
    }

    fn start_part(&mut self) -> Result<()> {
        if let Some(active) = self.active.as_mut() {
            if !active.started {
                active.started = true;
                log::trace!("'{}': part {} start", self.key, active.index);
                self.listener
                    .on_part_start(&self.key, active.index, active.length)?;
            }
        }
        Ok(())
    }

    /// Finishes the exhausted active part and loads its continuation.
    ///
    /// Returns `false` when the entry has no more parts.
    fn finish_part(&mut self) -> Result<bool> {
        let Some(active) = self.active.take() else {
            return Ok(false);
        };
        log::trace!("'{}': part {} complete", self.key, active.index);
        self.listener
            .on_part_complete(&self.key, active.index, active.reader.consumed())?;
        if !active.split_after {
            return Ok(false);
        }

        let (part, index, info) = self.chain.open_continuation(&self.key)?;
        self.volume_opened(index, &info)?;
        self.active = Some(ActivePart {
            reader: part.data_reader(),
            index: active.index + 1,
            length: part.length(),
            split_after: part.header().flags.split_after,
            started: false,
        });
        self.discovered.push(part);
        Ok(true)
    }

    /// Reads raw entry bytes: carry first, then parts across volumes.
    pub(crate) fn read_feed(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.carry_pos < self.carry.len() {
            let n = (self.carry.len() - self.carry_pos).min(buf.len());
            buf[..n].copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + n]);
            self.carry_pos += n;
            if self.carry_pos == self.carry.len() {
                self.clear_carry();
            }
            return Ok(n);
        }

        loop {
            if self.active.is_none() {
                return Ok(0);
            }
            self.start_part()?;
            if let Some(active) = self.active.as_mut() {
                let n = active.reader.read(buf).map_err(Error::from_io)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            if !self.finish_part()? {
                return Ok(0);
            }
        }
    }

    /// Steps over every remaining raw byte of the entry, loading
    /// continuation volumes as needed. Returns the number of bytes skipped.
    pub(crate) fn drain(&mut self) -> Result<u64> {
        let mut skipped = 0;
        loop {
            if self.active.is_none() {
                return Ok(skipped);
            }
            self.start_part()?;
            if let Some(active) = self.active.as_mut() {
                skipped += active.reader.skip_remaining()?;
            }
            if !self.finish_part()? {
                return Ok(skipped);
            }
        }
    }

    /// Moves every remaining raw byte of the entry into the carry buffer.
    ///
    /// Used by solid streams, where bytes the shared decoder has not read yet
    /// belong to the stream, not to the entry.
    pub(crate) fn carry_remaining(&mut self) -> Result<u64> {
        self.carry_while(|_| true)
    }

    /// Moves the raw bytes of every part before the terminal one into the
    /// carry buffer, loading continuation volumes until the terminal header
    /// is known. The terminal part itself is left unread.
    pub(crate) fn carry_to_terminal(&mut self) -> Result<u64> {
        self.carry_while(|active| active.split_after)
    }

    fn carry_while(&mut self, keep_going: fn(&ActivePart) -> bool) -> Result<u64> {
        let limit = self.options().max_memory_buffer;
        let mut chunk = vec![0u8; 64 * 1024];
        let mut moved = 0u64;
        loop {
            match self.active.as_ref() {
                Some(active) if keep_going(active) => {}
                _ => return Ok(moved),
            }
            self.start_part()?;
            let n = match self.active.as_mut() {
                Some(active) => active.reader.read(&mut chunk).map_err(Error::from_io)?,
                None => 0,
            };
            if n > 0 {
                if self.carry.len() - self.carry_pos + n > limit {
                    return Err(Error::ResourceLimitExceeded(format!(
                        "raw buffer for '{}' exceeds {} bytes",
                        self.key, limit
                    )));
                }
                self.carry.extend_from_slice(&chunk[..n]);
                moved += n as u64;
                continue;
            }
            if !self.finish_part()? {
                return Ok(moved);
            }
        }
    }

    pub(crate) fn clear_carry(&mut self) {
        self.carry.clear();
        self.carry_pos = 0;
    }
}

/// `Read` adapter over the shared engine's feed.
pub(crate) struct PartFeed {
    engine: SharedEngine,
}

impl PartFeed {
    pub(crate) fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

impl Read for PartFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut engine = lock_or_recover(&self.engine);
        engine.read_feed(buf).map_err(io::Error::from)
    }
}
