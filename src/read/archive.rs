//! Random access over seekable volumes.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::checksum::EntryVerifier;
use crate::codec::{CompressionKind, Decoder, build_decoder};
use crate::crypto::Decryptor;
use crate::format::{ArchiveFormat, FormatDescriptor, FormatRegistry};
use crate::volume::source::SourceState;
use crate::volume::{Source, Volume, VolumePaths};
use crate::{Error, Result, UsageError};

use super::{Entry, PartReader, ReaderOptions};

/// An indexed archive whose entries can be read in any order.
///
/// Opening an `Archive` reads every header of every volume up front, so all
/// volumes must be seekable and stay open for the archive's lifetime. Entries
/// split across volumes are merged into one [`Entry`] with several parts.
///
/// Solid entries cannot be read this way; use the sequential
/// [`Reader`](crate::Reader) for them.
///
/// # Example
///
/// ```rust,ignore
/// use volread::{Archive, ReaderOptions};
///
/// let archive = Archive::open_paths(["data.part1", "data.part2"], formats, ReaderOptions::default())?;
/// let data = archive.read_entry(archive.len() - 1)?;
/// ```
pub struct Archive {
    volumes: Vec<Volume>,
    entries: Vec<Entry>,
    format: ArchiveFormat,
    is_solid: bool,
    options: ReaderOptions,
    decryptor: Decryptor,
}

impl Archive {
    /// Opens and indexes an archive from its volumes, in order.
    ///
    /// # Errors
    ///
    /// * [`Error::MultipartStreamRequired`] if a source is not seekable or
    ///   the options select streaming mode
    /// * [`Error::MultiVolume`] if the volumes do not belong together
    /// * format errors from the header parser
    pub fn open<I>(sources: I, formats: FormatRegistry, options: ReaderOptions) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Source>>,
    {
        options.validate()?;
        if !options.allows_seek() {
            return Err(Error::MultipartStreamRequired(
                "random access needs seekable volumes; use the sequential Reader".into(),
            ));
        }

        let mut indexer = Indexer::new(formats, options.max_entries);
        for source in sources {
            indexer.add_volume(source?, &options)?;
        }
        let Indexer {
            volumes,
            entries,
            descriptor,
            is_solid,
            ..
        } = indexer;
        let format = descriptor
            .map(|d| d.format)
            .ok_or_else(|| Error::InvalidFormat("no volumes were supplied".into()))?;

        log::debug!(
            "indexed {} archive: {} volumes, {} entries",
            format,
            volumes.len(),
            entries.len()
        );
        let decryptor = Decryptor::new(options.password.clone());
        Ok(Self {
            volumes,
            entries,
            format,
            is_solid,
            options,
            decryptor,
        })
    }

    /// Opens the given volume files, in order.
    pub fn open_paths<I, P>(paths: I, formats: FormatRegistry, options: ReaderOptions) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::open(VolumePaths::new(paths), formats, options)
    }

    /// Returns all entries in header order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Finds an entry by key.
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the detected archive format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Returns true if any volume is solid.
    pub fn is_solid(&self) -> bool {
        self.is_solid
    }

    /// Returns the number of volumes.
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Opens the decoded data of the entry at `index`.
    ///
    /// # Errors
    ///
    /// * [`UsageError::NoSuchEntry`] if `index` is past the end of the index
    /// * [`Error::UnsupportedFeature`] for solid entries
    /// * [`Error::IncompleteEntry`] if the entry's last part is missing
    /// * [`Error::PasswordRequired`] for encrypted entries without a password
    pub fn open_entry(&self, index: usize) -> Result<EntryReader> {
        let entry = self.entries.get(index).ok_or(Error::Usage(UsageError::NoSuchEntry {
            index,
            count: self.entries.len(),
        }))?;
        if entry.is_solid() && !entry.is_directory() {
            return Err(Error::UnsupportedFeature {
                feature: "random access to solid entries; use the sequential Reader",
            });
        }
        let size = entry.size()?;
        let crc = if self.options.verify_crc {
            entry.crc()?
        } else {
            None
        };
        let verifier = EntryVerifier::new(entry.index(), entry.key(), crc, Some(size));

        if entry.is_directory() {
            let decoder = build_decoder(io::empty(), CompressionKind::Stored, &[], Some(0))?;
            return Ok(EntryReader::new(decoder, verifier));
        }

        let parts = PartChain {
            parts: entry.parts().iter().map(|p| p.data_reader()).collect(),
        };
        let input: Box<dyn Read + Send> = match entry.encryption() {
            Some(encryption) => self.decryptor.wrap(parts, encryption)?,
            None if entry.is_encrypted() => {
                return Err(Error::UnsupportedEncryption(format!(
                    "entry '{}' is encrypted with an unknown scheme",
                    entry.key()
                )));
            }
            None => Box::new(parts),
        };
        let decoder = build_decoder(
            input,
            entry.compression(),
            entry.compression_properties(),
            Some(size),
        )?;
        Ok(EntryReader::new(decoder, verifier))
    }

    /// Reads the entry at `index` into memory.
    pub fn read_entry(&self, index: usize) -> Result<Vec<u8>> {
        let mut reader = self.open_entry(index)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(Error::from_io)?;
        Ok(data)
    }

    /// Releases every volume and returns their sources.
    ///
    /// Readers opened from this archive fail once their volume is released.
    pub fn into_sources(mut self) -> Vec<Source> {
        self.volumes
            .iter_mut()
            .filter_map(|volume| volume.release())
            .collect()
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("format", &self.format)
            .field("volumes", &self.volumes.len())
            .field("entries", &self.entries.len())
            .field("is_solid", &self.is_solid)
            .finish_non_exhaustive()
    }
}

/// Builds the entry index one volume at a time.
struct Indexer {
    formats: FormatRegistry,
    descriptor: Option<FormatDescriptor>,
    volumes: Vec<Volume>,
    entries: Vec<Entry>,
    is_solid: bool,
    max_entries: usize,
}

impl Indexer {
    fn new(formats: FormatRegistry, max_entries: usize) -> Self {
        Self {
            formats,
            descriptor: None,
            volumes: Vec::new(),
            entries: Vec::new(),
            is_solid: false,
            max_entries,
        }
    }

    fn add_volume(&mut self, source: Source, options: &ReaderOptions) -> Result<()> {
        let index = self.volumes.len() as u32;
        if !source.is_seekable() {
            return Err(Error::MultipartStreamRequired(format!(
                "volume {} is not seekable",
                index
            )));
        }

        let mut state = SourceState::new(source, true)?;
        let descriptor = match self.descriptor {
            Some(descriptor) => descriptor,
            None => {
                let prefix = state.peek(self.formats.sniff_len())?;
                let descriptor = *self.formats.detect(prefix)?;
                self.descriptor = Some(descriptor);
                descriptor
            }
        };
        let mut volume = Volume::open(index, state, &descriptor, options)?;
        let info = *volume.info();
        if index == 0 && info.is_multi_volume && !info.is_first_volume {
            return Err(Error::MultiVolume(
                "the first supplied volume is not the first volume of the archive".into(),
            ));
        }
        self.is_solid |= info.is_solid;

        while let Some(part) = volume.next_part()? {
            let header = part.header();
            if header.flags.split_before {
                let Some(last) = self.entries.last_mut().filter(|e| !e.is_complete()) else {
                    return Err(Error::MultiVolume(format!(
                        "volume {} continues '{}', which no earlier volume started",
                        index, header.key
                    )));
                };
                if !header.continues(last.key()) {
                    return Err(Error::MultiVolume(format!(
                        "volume {} should continue '{}' but continues '{}'",
                        index,
                        last.key(),
                        header.key
                    )));
                }
                last.push_part(part);
                continue;
            }

            if let Some(last) = self.entries.last().filter(|e| !e.is_complete()) {
                return Err(Error::MultiVolume(format!(
                    "entry '{}' was not continued before '{}'",
                    last.key(),
                    header.key
                )));
            }
            if self.entries.len() >= self.max_entries {
                return Err(Error::ResourceLimitExceeded(format!(
                    "archive has more than {} entries",
                    self.max_entries
                )));
            }
            let entry = Entry::new(part, self.entries.len(), info.is_solid);
            self.entries.push(entry);
        }

        self.volumes.push(volume);
        Ok(())
    }
}

/// Reads the parts of one entry back to back.
struct PartChain {
    parts: VecDeque<PartReader>,
}

impl Read for PartChain {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(part) = self.parts.front_mut() {
            let n = part.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            self.parts.pop_front();
        }
        Ok(0)
    }
}

/// Decoded data of one entry opened from an [`Archive`].
///
/// The size and CRC-32 are checked when the data ends; a mismatch surfaces
/// as an I/O error wrapping [`Error::CrcMismatch`] or
/// [`Error::InvalidFormat`].
pub struct EntryReader {
    decoder: Box<dyn Decoder>,
    verifier: EntryVerifier,
    done: bool,
}

impl EntryReader {
    fn new(decoder: Box<dyn Decoder>, verifier: EntryVerifier) -> Self {
        Self {
            decoder,
            verifier,
            done: false,
        }
    }

    /// Returns the number of decoded bytes read so far.
    pub fn produced(&self) -> u64 {
        self.verifier.produced()
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let n = self.decoder.read(buf)?;
        if n > 0 {
            self.verifier.update(&buf[..n]);
            return Ok(n);
        }
        self.done = true;
        self.verifier.finish()?;
        Ok(0)
    }
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("kind", &self.decoder.kind())
            .field("produced", &self.verifier.produced())
            .finish_non_exhaustive()
    }
}
