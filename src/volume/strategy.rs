//! Where the next volume comes from.

use std::fmt;
use std::path::PathBuf;

use super::source::Source;
use crate::{Error, Result};

/// Supplies the physical volumes of an archive, in order.
pub trait VolumeStrategy: Send {
    /// Returns the next source, or `None` when the caller has no more.
    fn next_source(&mut self) -> Result<Option<Source>>;

    /// Returns `false` if entries may not continue into another volume.
    fn supports_continuation(&self) -> bool {
        true
    }
}

/// Reads exactly one volume.
///
/// Entries fully contained in the volume are yielded; an entry that needs a
/// second volume fails with [`Error::MultiVolume`] before it is yielded.
#[derive(Debug)]
pub struct SingleVolume {
    source: Option<Source>,
}

impl SingleVolume {
    /// Creates a strategy over one source.
    pub fn new(source: Source) -> Self {
        Self {
            source: Some(source),
        }
    }
}

impl VolumeStrategy for SingleVolume {
    fn next_source(&mut self) -> Result<Option<Source>> {
        Ok(self.source.take())
    }

    fn supports_continuation(&self) -> bool {
        false
    }
}

/// Pulls volumes lazily from a caller-supplied sequence.
///
/// The sequence is only advanced when the engine needs another volume, so
/// sources may be opened (or downloaded) on demand.
pub struct MultiVolume {
    sources: Box<dyn Iterator<Item = Result<Source>> + Send>,
    supplied: u32,
}

impl MultiVolume {
    /// Creates a strategy over a fallible sequence of sources.
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Result<Source>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            sources: Box::new(sources.into_iter()),
            supplied: 0,
        }
    }

    /// Creates a strategy over already opened sources.
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Source>,
        I::IntoIter: Send + 'static,
    {
        Self::new(sources.into_iter().map(Ok))
    }

    /// Creates a strategy that opens the given files lazily, in order.
    ///
    /// A file that cannot be opened is reported as
    /// [`Error::VolumeMissing`] when the engine asks for it.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::new(VolumePaths::new(paths))
    }

    /// Returns how many sources have been handed out so far.
    pub fn supplied(&self) -> u32 {
        self.supplied
    }
}

impl VolumeStrategy for MultiVolume {
    fn next_source(&mut self) -> Result<Option<Source>> {
        match self.sources.next() {
            Some(source) => {
                self.supplied += 1;
                source.map(Some)
            }
            None => Ok(None),
        }
    }
}

impl fmt::Debug for MultiVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiVolume")
            .field("supplied", &self.supplied)
            .finish_non_exhaustive()
    }
}

/// Iterator that opens volume files on demand.
#[derive(Debug)]
pub struct VolumePaths {
    paths: std::vec::IntoIter<PathBuf>,
    number: u32,
}

impl VolumePaths {
    /// Creates an iterator over the given paths.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        Self {
            paths: paths.into_iter(),
            number: 0,
        }
    }
}

impl Iterator for VolumePaths {
    type Item = Result<Source>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        self.number += 1;
        log::debug!("opening volume {} at {}", self.number, path.display());
        Some(
            Source::open_path(&path).map_err(|source| Error::VolumeMissing {
                volume: self.number,
                path: path.display().to_string(),
                source,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_single_volume_yields_once() {
        let mut strategy = SingleVolume::new(Source::stream(Cursor::new(vec![1u8])));
        assert!(!strategy.supports_continuation());
        assert!(strategy.next_source().unwrap().is_some());
        assert!(strategy.next_source().unwrap().is_none());
    }

    #[test]
    fn test_multi_volume_is_lazy() {
        let mut strategy = MultiVolume::from_sources(vec![
            Source::stream(Cursor::new(vec![1u8])),
            Source::stream(Cursor::new(vec![2u8])),
        ]);
        assert!(strategy.supports_continuation());
        assert_eq!(strategy.supplied(), 0);
        strategy.next_source().unwrap();
        assert_eq!(strategy.supplied(), 1);
        strategy.next_source().unwrap();
        assert!(strategy.next_source().unwrap().is_none());
        assert_eq!(strategy.supplied(), 2);
    }

    #[test]
    fn test_paths_report_missing_volume() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.part1");
        std::fs::write(&present, b"data").unwrap();
        let missing = dir.path().join("a.part2");

        let mut strategy = MultiVolume::from_paths([present, missing]);
        assert!(strategy.next_source().unwrap().unwrap().is_seekable());
        match strategy.next_source() {
            Err(Error::VolumeMissing { volume, path, .. }) => {
                assert_eq!(volume, 2);
                assert!(path.ends_with("a.part2"));
            }
            other => panic!("expected VolumeMissing, got {:?}", other),
        }
    }
}
