//! The forward-only entry reader.

use std::io::{self, Read, Write};
use std::sync::{Arc, MutexGuard};

use super::feed::{Engine, PartFeed, SharedEngine};
use super::solid::SolidStream;
use super::stream::EntryStream;
use crate::checksum::EntryVerifier;
use crate::codec::{CompressionKind, Decoder, build_decoder};
use crate::crypto::Decryptor;
use crate::format::FormatRegistry;
use crate::progress::{CancelHandle, NoListener, ReaderListener};
use crate::read::{Entry, ReaderOptions};
use crate::volume::source::lock_or_recover;
use crate::volume::{MultiVolume, SingleVolume, Source, VolumeStrategy};
use crate::{Error, Result, UsageError};

/// Where the reader stands in its entry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// `advance` has not been called yet.
    NotStarted,
    /// An entry is current and its data is untouched.
    HasCurrentEntry,
    /// The current entry's stream was opened.
    EntryStreamOpened,
    /// The current entry was explicitly skipped.
    EntrySkipped,
    /// All entries were read, or a fatal error stopped the reader.
    Completed,
    /// The reader was cancelled.
    Cancelled,
}

/// Decoded bytes of the open entry come from here.
enum DecodeSource {
    Plain(Box<dyn Decoder>),
    /// The reader's shared solid stream.
    Solid,
    /// Directories and drained entries.
    Empty,
}

struct ActiveDecode {
    source: DecodeSource,
    verifier: EntryVerifier,
    finished: bool,
}

/// Reads the entries of an archive in order, one volume at a time.
///
/// `Reader` is a state machine: [`advance`](Reader::advance) moves to the
/// next entry, [`open_entry_stream`](Reader::open_entry_stream) (or one of
/// its conveniences) reads the current entry's decoded data at most once,
/// and [`skip_entry`](Reader::skip_entry) steps over it. Calling `advance`
/// without reading the current entry skips it implicitly.
///
/// Entries split across volumes are presented as one entry; the next volume
/// is opened while the data is being read. In solid archives each entry is
/// decoded from one long-lived stream, so skipping an entry still decodes
/// its data.
///
/// # Example
///
/// ```rust,ignore
/// use volread::{Reader, ReaderOptions, Source};
///
/// let source = Source::open_path("archive.rar")?;
/// let mut reader = Reader::single(source, formats, ReaderOptions::default());
/// while reader.advance()? {
///     let entry = reader.entry().unwrap();
///     if entry.is_directory() {
///         continue;
///     }
///     let key = entry.key().to_string();
///     let data = reader.read_entry_to_vec()?;
///     println!("{}: {} bytes", key, data.len());
/// }
/// ```
pub struct Reader {
    engine: SharedEngine,
    options: ReaderOptions,
    decryptor: Decryptor,
    state: ReaderState,
    current: Option<Entry>,
    decode: Option<ActiveDecode>,
    solid: Option<SolidStream>,
    entries_yielded: usize,
    cancel: CancelHandle,
}

impl Reader {
    /// Creates a reader over one volume.
    ///
    /// Nothing is read until the first [`advance`](Reader::advance).
    pub fn single(source: Source, formats: FormatRegistry, options: ReaderOptions) -> Self {
        Self::with_strategy(SingleVolume::new(source), formats, options)
    }

    /// Creates a reader over an ordered sequence of volumes.
    ///
    /// The sequence is pulled lazily, one source per volume needed.
    pub fn multi<I>(sources: I, formats: FormatRegistry, options: ReaderOptions) -> Self
    where
        I: IntoIterator<Item = Source>,
        I::IntoIter: Send + 'static,
    {
        Self::with_strategy(MultiVolume::from_sources(sources), formats, options)
    }

    /// Creates a reader with a custom volume strategy.
    pub fn with_strategy<S>(strategy: S, formats: FormatRegistry, options: ReaderOptions) -> Self
    where
        S: VolumeStrategy + 'static,
    {
        let decryptor = Decryptor::new(options.password.clone());
        let engine = Engine::new(
            Box::new(strategy),
            formats,
            options.clone(),
            Box::new(NoListener),
        )
        .into_shared();
        Self {
            engine,
            options,
            decryptor,
            state: ReaderState::NotStarted,
            current: None,
            decode: None,
            solid: None,
            entries_yielded: 0,
            cancel: CancelHandle::new(),
        }
    }

    /// Installs a listener for volume, entry and part events.
    pub fn with_listener<L: ReaderListener + 'static>(self, listener: L) -> Self {
        self.lock_engine().set_listener(Box::new(listener));
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Returns the options the reader was created with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Returns the current entry.
    ///
    /// Valid from a successful [`advance`](Reader::advance) until the next
    /// one. Parts of a split entry are added while its data is read.
    pub fn entry(&self) -> Option<&Entry> {
        match self.state {
            ReaderState::HasCurrentEntry
            | ReaderState::EntryStreamOpened
            | ReaderState::EntrySkipped => self.current.as_ref(),
            _ => None,
        }
    }

    /// Returns the position within the current volume, if one is open.
    pub fn volume_position(&self) -> Option<u64> {
        self.lock_engine().current_volume().map(|(_, _, pos)| pos)
    }

    /// Returns the index of the current volume, if one is open.
    pub fn volume_index(&self) -> Option<u32> {
        self.lock_engine().current_volume().map(|(index, _, _)| index)
    }

    /// Moves to the next entry. Returns `false` when there are no more.
    ///
    /// An unread current entry is skipped first; a partially read one is
    /// finished.
    ///
    /// # Errors
    ///
    /// Format, multi-volume and I/O errors stop the reader: it moves to
    /// [`ReaderState::Completed`] and releases its volumes. Usage errors and
    /// [`Error::CrcMismatch`] leave the state unchanged.
    ///
    /// [`Error::PasswordRequired`] is returned when the current entry is
    /// encrypted, no password was given, and the format cannot step over it
    /// without decoding. The reader cannot continue past such an entry, so it
    /// also moves to [`ReaderState::Completed`].
    pub fn advance(&mut self) -> Result<bool> {
        match self.state {
            ReaderState::Completed => return Ok(false),
            ReaderState::Cancelled => return Err(Error::Usage(UsageError::Cancelled)),
            _ => {}
        }
        let result = self.advance_inner();
        self.settle(result)
    }

    fn advance_inner(&mut self) -> Result<bool> {
        self.check_cancelled()?;
        match self.state {
            ReaderState::NotStarted => {
                self.options.validate()?;
                if !self.lock_engine().open_first()? {
                    self.finish();
                    return Ok(false);
                }
            }
            ReaderState::HasCurrentEntry => self.skip_current()?,
            ReaderState::EntryStreamOpened => self.complete_opened()?,
            ReaderState::EntrySkipped | ReaderState::Completed | ReaderState::Cancelled => {}
        }
        self.check_cancelled()?;

        self.current = None;
        self.decode = None;
        let next = self.lock_engine().next_entry_part()?;
        let Some((part, info)) = next else {
            log::debug!("reader complete after {} entries", self.entries_yielded);
            self.finish();
            return Ok(false);
        };
        if self.entries_yielded >= self.options.max_entries {
            return Err(Error::ResourceLimitExceeded(format!(
                "archive has more than {} entries",
                self.options.max_entries
            )));
        }

        let entry = Entry::new(part, self.entries_yielded, info.is_solid);
        self.entries_yielded += 1;
        log::trace!("entry {}: '{}'", entry.index(), entry.key());
        self.lock_engine().begin_entry(&entry);
        self.current = Some(entry);
        self.state = ReaderState::HasCurrentEntry;
        Ok(true)
    }

    /// Opens the current entry's decoded data.
    ///
    /// # Errors
    ///
    /// [`UsageError::StreamAlreadyOpened`] if the entry was already opened or
    /// skipped, [`UsageError::NoCurrentEntry`] before the first or after the
    /// last entry.
    pub fn open_entry_stream(&mut self) -> Result<EntryStream<'_>> {
        self.open_for_read()?;
        Ok(EntryStream::new(self))
    }

    /// Copies the current entry's data into `writer`. Returns the bytes written.
    pub fn write_entry_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> Result<u64> {
        self.open_for_read()?;
        let mut buf = vec![0u8; self.options.read_buffer_size];
        let mut written = 0u64;
        loop {
            let n = self.read_decoded(&mut buf)?;
            if n == 0 {
                return Ok(written);
            }
            writer.write_all(&buf[..n])?;
            written += n as u64;
        }
    }

    /// Reads the current entry's data into memory.
    pub fn read_entry_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.write_entry_to(&mut data)?;
        Ok(data)
    }

    /// Steps over the current entry without returning its data.
    pub fn skip_entry(&mut self) -> Result<()> {
        self.require_unopened()?;
        let result = self.check_cancelled().and_then(|()| self.skip_current());
        self.settle(result)?;
        self.state = ReaderState::EntrySkipped;
        Ok(())
    }

    /// Cancels the reader.
    ///
    /// The next `advance`, skip or open fails with
    /// [`UsageError::Cancelled`] and releases the volumes. A stream that was
    /// already handed out keeps working.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns a handle that cancels this reader from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Puts a source in the slot used before the strategy is asked for the
    /// next volume. Returns the source it replaced.
    pub fn stage_next_volume(&mut self, source: Source) -> Option<Source> {
        self.lock_engine().stage(source)
    }

    /// Returns the sources of released volumes kept because of
    /// [`ReaderOptions::keep_open`].
    pub fn take_retained_sources(&mut self) -> Vec<Source> {
        self.lock_engine().take_retained()
    }

    fn lock_engine(&self) -> MutexGuard<'_, Engine> {
        lock_or_recover(&self.engine)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Usage(UsageError::Cancelled));
        }
        Ok(())
    }

    fn require_unopened(&self) -> Result<()> {
        match self.state {
            ReaderState::HasCurrentEntry => Ok(()),
            ReaderState::EntryStreamOpened | ReaderState::EntrySkipped => {
                Err(Error::Usage(UsageError::StreamAlreadyOpened))
            }
            ReaderState::Cancelled => Err(Error::Usage(UsageError::Cancelled)),
            ReaderState::NotStarted | ReaderState::Completed => {
                Err(Error::Usage(UsageError::NoCurrentEntry))
            }
        }
    }

    /// Applies the state change an error implies.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            match err {
                Error::Usage(UsageError::Cancelled) => {
                    log::debug!("reader cancelled");
                    self.release(ReaderState::Cancelled);
                }
                Error::Usage(_) | Error::CrcMismatch { .. } | Error::PasswordRequired => {}
                _ => {
                    log::debug!("reader stopped: {}", err);
                    self.release(ReaderState::Completed);
                }
            }
        }
        result
    }

    fn finish(&mut self) {
        self.release(ReaderState::Completed);
    }

    fn release(&mut self, state: ReaderState) {
        self.state = state;
        self.current = None;
        self.decode = None;
        self.solid = None;
        self.lock_engine().release_all();
    }

    pub(crate) fn open_for_read(&mut self) -> Result<()> {
        self.require_unopened()?;
        let result = self.check_cancelled().and_then(|()| self.start_decode());
        self.settle(result)?;
        self.state = ReaderState::EntryStreamOpened;
        Ok(())
    }

    fn current_entry(&self) -> Result<Entry> {
        self.current
            .clone()
            .ok_or(Error::Usage(UsageError::NoCurrentEntry))
    }

    fn verifier_for(&self, entry: &Entry) -> EntryVerifier {
        let crc = if self.options.verify_crc {
            entry.crc().ok().flatten()
        } else {
            None
        };
        EntryVerifier::new(entry.index(), entry.key(), crc, entry.size().ok())
    }

    /// Builds the decode pipeline for the current entry.
    fn start_decode(&mut self) -> Result<()> {
        let entry = self.current_entry()?;
        self.lock_engine()
            .listener()
            .on_entry_start(entry.key(), entry.size().ok())?;

        if entry.is_directory() {
            self.decode = Some(ActiveDecode {
                source: DecodeSource::Empty,
                verifier: EntryVerifier::new(entry.index(), entry.key(), None, None),
                finished: false,
            });
            return Ok(());
        }
        if entry.is_encrypted() && entry.encryption().is_none() {
            return Err(Error::UnsupportedEncryption(format!(
                "entry '{}' is encrypted with an unknown scheme",
                entry.key()
            )));
        }
        if entry.is_encrypted() && !self.decryptor.has_password() {
            return Err(Error::PasswordRequired);
        }

        if entry.is_solid() {
            self.start_solid(&entry)
        } else {
            self.start_plain(&entry)
        }
    }

    fn start_plain(&mut self, entry: &Entry) -> Result<()> {
        // These decoders must be told where the data ends before they start,
        // so a split entry is buffered up to its terminal part.
        let needs_size = entry.compression().needs_declared_size()
            || (entry.is_encrypted() && entry.compression() == CompressionKind::Stored);
        let entry = if needs_size && !entry.is_complete() {
            let buffered = self.lock_engine().carry_to_terminal()?;
            self.sync_parts();
            let entry = self.current_entry()?;
            log::trace!(
                "buffered {} of {} packed bytes of '{}' to learn its size",
                buffered,
                entry.packed_bytes(),
                entry.key()
            );
            entry
        } else {
            entry.clone()
        };

        let feed = PartFeed::new(Arc::clone(&self.engine));
        let input: Box<dyn Read + Send> = match entry.encryption() {
            Some(encryption) => self.decryptor.wrap(feed, encryption)?,
            None => Box::new(feed),
        };
        let decoder = build_decoder(
            input,
            entry.compression(),
            entry.compression_properties(),
            entry.size().ok(),
        )?;
        self.decode = Some(ActiveDecode {
            source: DecodeSource::Plain(decoder),
            verifier: self.verifier_for(&entry),
            finished: false,
        });
        Ok(())
    }

    fn start_solid(&mut self, entry: &Entry) -> Result<()> {
        let reuse = self.solid.as_ref().is_some_and(|s| s.continues(entry));
        if !reuse {
            if let Some(previous) = self.solid.take() {
                log::debug!(
                    "solid stream ended after {} decoded bytes",
                    previous.total_decompressed()
                );
            }
            self.lock_engine().clear_carry();
            self.solid = Some(SolidStream::new(
                Arc::clone(&self.engine),
                entry,
                &self.decryptor,
            )?);
        }

        // The shared decoder needs the entry's size before it can split the
        // stream, so a split entry is buffered until its terminal part.
        let entry = if entry.is_complete() {
            entry.clone()
        } else {
            self.lock_engine().carry_remaining()?;
            self.sync_parts();
            self.current_entry()?
        };
        let size = entry.size()?;

        let solid = self
            .solid
            .as_mut()
            .ok_or_else(|| Error::InvalidFormat("solid stream is missing".into()))?;
        solid.begin_entry(size);
        self.decode = Some(ActiveDecode {
            source: DecodeSource::Solid,
            verifier: self.verifier_for(&entry),
            finished: false,
        });
        Ok(())
    }

    /// Adds continuation parts found by the feed to the current entry.
    fn sync_parts(&mut self) {
        let discovered = self.lock_engine().take_discovered();
        if discovered.is_empty() {
            return;
        }
        let Some(entry) = self.current.as_mut() else {
            return;
        };
        for part in discovered {
            entry.push_part(part);
        }
        if let (Some(decode), Some(header)) = (self.decode.as_mut(), entry.terminal_header()) {
            let crc = if self.options.verify_crc {
                header.crc
            } else {
                None
            };
            decode.verifier.set_expected(crc, Some(header.size));
        }
    }

    /// Reads decoded data of the open entry; 0 once it is finished.
    pub(crate) fn read_decoded(&mut self, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_decoded_inner(buf);
        self.settle(result)
    }

    fn read_decoded_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(decode) = self.decode.as_mut() else {
            return Ok(0);
        };
        if decode.finished {
            return Ok(0);
        }

        let n = match &mut decode.source {
            DecodeSource::Plain(decoder) => decoder.read(buf).map_err(Error::from_io)?,
            DecodeSource::Solid => match self.solid.as_mut() {
                Some(solid) => solid.read_entry_data(buf)?,
                None => 0,
            },
            DecodeSource::Empty => 0,
        };
        if n > 0 {
            decode.verifier.update(&buf[..n]);
            self.sync_parts();
            return Ok(n);
        }

        self.finish_decode(true)?;
        Ok(0)
    }

    /// Steps past leftover raw bytes, reports completion and verifies.
    fn finish_decode(&mut self, verify: bool) -> Result<()> {
        let Some(decode) = self.decode.as_mut() else {
            return Ok(());
        };
        if decode.finished {
            return Ok(());
        }
        decode.finished = true;
        let solid = matches!(decode.source, DecodeSource::Solid);
        decode.source = DecodeSource::Empty;
        let produced = decode.verifier.produced();

        {
            let mut engine = self.lock_engine();
            if solid {
                engine.carry_remaining()?;
            } else {
                engine.drain()?;
            }
        }
        self.sync_parts();

        let key = self
            .current
            .as_ref()
            .map(|e| e.key().to_string())
            .unwrap_or_default();
        self.lock_engine()
            .listener()
            .on_entry_complete(&key, produced)?;

        match self.decode.as_ref() {
            Some(decode) if verify => decode.verifier.finish(),
            _ => Ok(()),
        }
    }

    /// Decodes and discards the rest of the open entry.
    fn discard_decode(&mut self) -> Result<()> {
        let Some(decode) = self.decode.as_mut() else {
            return Ok(());
        };
        if decode.finished {
            return Ok(());
        }
        match &mut decode.source {
            DecodeSource::Plain(decoder) => {
                let copied = io::copy(decoder, &mut io::sink()).map_err(Error::from_io)?;
                decode.verifier.record_skipped(copied);
            }
            DecodeSource::Solid => {
                if let Some(solid) = self.solid.as_mut() {
                    let copied = solid.discard_entry()?;
                    decode.verifier.record_skipped(copied);
                }
            }
            DecodeSource::Empty => {}
        }
        self.finish_decode(false)
    }

    /// Implicit or explicit skip of an unopened entry.
    fn skip_current(&mut self) -> Result<()> {
        let entry = self.current_entry()?;
        if entry.is_directory() || (!entry.is_solid() && entry.raw_skippable()) {
            log::trace!("skipping '{}' without decoding", entry.key());
            let mut engine = self.lock_engine();
            engine
                .listener()
                .on_entry_start(entry.key(), entry.size().ok())?;
            engine.drain()?;
            drop(engine);
            self.sync_parts();
            return self
                .lock_engine()
                .listener()
                .on_entry_complete(entry.key(), 0);
        }

        log::trace!("skipping '{}' by decoding", entry.key());
        if let Err(err) = self.start_decode() {
            if matches!(err, Error::PasswordRequired) {
                // Nothing can position the reader past this entry any more
                log::debug!("cannot step over encrypted '{}' without a password", entry.key());
                self.finish();
            }
            return Err(err);
        }
        self.discard_decode()
    }

    /// Finishes an entry whose stream was opened but not read to the end.
    fn complete_opened(&mut self) -> Result<()> {
        let raw = self
            .current
            .as_ref()
            .is_some_and(|e| !e.is_solid() && e.raw_skippable());
        if raw {
            return self.finish_decode(false);
        }
        self.discard_decode()
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("state", &self.state)
            .field("entry", &self.current.as_ref().map(|e| e.key()))
            .field("entries_yielded", &self.entries_yielded)
            .finish_non_exhaustive()
    }
}
