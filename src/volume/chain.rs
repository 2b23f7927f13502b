//! The sequence of volumes during forward iteration.
//!
//! Exactly one volume is current. Moving to another volume releases the
//! previous one: its source is dropped, or kept for the caller when
//! `keep_open` is set. A single staged source, if present, is used before
//! the strategy is asked for the next one.

use super::source::{Source, SourceState};
use super::{Volume, VolumeStrategy};
use crate::format::{FormatDescriptor, FormatRegistry, VolumeInfo};
use crate::read::{FilePart, ReaderOptions};
use crate::{Error, Result};

pub(crate) struct VolumeChain {
    strategy: Box<dyn VolumeStrategy>,
    formats: FormatRegistry,
    options: ReaderOptions,
    descriptor: Option<FormatDescriptor>,
    current: Option<Volume>,
    staged: Option<Source>,
    retained: Vec<Source>,
    next_index: u32,
}

impl VolumeChain {
    pub(crate) fn new(
        strategy: Box<dyn VolumeStrategy>,
        formats: FormatRegistry,
        options: ReaderOptions,
    ) -> Self {
        Self {
            strategy,
            formats,
            options,
            descriptor: None,
            current: None,
            staged: None,
            retained: Vec::new(),
            next_index: 0,
        }
    }

    pub(crate) fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub(crate) fn current(&self) -> Option<&Volume> {
        self.current.as_ref()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Volume> {
        self.current.as_mut()
    }

    pub(crate) fn supports_continuation(&self) -> bool {
        self.strategy.supports_continuation()
    }

    /// Puts a source in the staged slot, replacing any previous one.
    pub(crate) fn stage(&mut self, source: Source) -> Option<Source> {
        self.staged.replace(source)
    }

    pub(crate) fn take_retained(&mut self) -> Vec<Source> {
        std::mem::take(&mut self.retained)
    }

    /// Opens the first volume. Returns its index and flags.
    pub(crate) fn open_first(&mut self) -> Result<Option<(u32, VolumeInfo)>> {
        let Some(source) = self.strategy.next_source()? else {
            return Ok(None);
        };
        let opened = self.open_volume(source)?;
        let (_, info) = opened;
        if info.is_multi_volume && !info.is_first_volume {
            return Err(Error::MultiVolume(
                "the first supplied volume is not the first volume of the archive".into(),
            ));
        }
        Ok(Some(opened))
    }

    /// Opens the next volume, staged slot first. Returns `None` when the
    /// strategy cannot continue or has no more sources.
    pub(crate) fn open_next(&mut self) -> Result<Option<(u32, VolumeInfo)>> {
        if !self.strategy.supports_continuation() {
            return Ok(None);
        }
        let source = match self.staged.take() {
            Some(source) => Some(source),
            None => self.strategy.next_source()?,
        };
        match source {
            Some(source) => self.open_volume(source).map(Some),
            None => Ok(None),
        }
    }

    /// Opens the volume that continues the entry `key` and returns the
    /// continuation part along with the new volume's index and flags.
    pub(crate) fn open_continuation(&mut self, key: &str) -> Result<(FilePart, u32, VolumeInfo)> {
        if !self.strategy.supports_continuation() {
            return Err(Error::MultiVolume(format!(
                "entry '{}' continues in another volume, but only one volume was supplied",
                key
            )));
        }
        let Some((index, info)) = self.open_next()? else {
            return Err(Error::MultiVolume(format!(
                "entry '{}' continues past the last supplied volume",
                key
            )));
        };

        let volume = self
            .current
            .as_mut()
            .ok_or_else(|| Error::MultiVolume("continuation volume was not opened".into()))?;
        match volume.next_part()? {
            Some(part) if part.header().continues(key) => {
                log::trace!("continuing '{}' in volume {}", key, index);
                Ok((part, index, info))
            }
            Some(part) => Err(Error::MultiVolume(format!(
                "volume {} should continue '{}' but starts with '{}'",
                index,
                key,
                part.header().key
            ))),
            None => Err(Error::MultiVolume(format!(
                "volume {} has no continuation of '{}'",
                index, key
            ))),
        }
    }

    fn open_volume(&mut self, source: Source) -> Result<(u32, VolumeInfo)> {
        self.release_current();

        let mut state = SourceState::new(source, self.options.allows_seek())?;
        let descriptor = match self.descriptor {
            Some(descriptor) => descriptor,
            None => {
                let prefix = state.peek(self.formats.sniff_len())?;
                let descriptor = *self.formats.detect(prefix)?;
                self.descriptor = Some(descriptor);
                descriptor
            }
        };

        let index = self.next_index;
        self.next_index += 1;
        let volume = Volume::open(index, state, &descriptor, &self.options)?;
        let info = *volume.info();
        self.current = Some(volume);
        Ok((index, info))
    }

    /// Releases the current volume, if any.
    pub(crate) fn release_current(&mut self) {
        if let Some(mut volume) = self.current.take() {
            if let Some(source) = volume.release() {
                if self.options.keep_open {
                    self.retained.push(source);
                }
            }
        }
    }

    /// Releases the current volume and any staged source.
    pub(crate) fn release_all(&mut self) {
        self.release_current();
        if let Some(source) = self.staged.take() {
            if self.options.keep_open {
                self.retained.push(source);
            }
        }
    }
}
