//! Physical byte sources.
//!
//! A [`Source`] is one physical volume: a file, a socket, an in-memory
//! buffer. Sources come in two capabilities. Seekable sources can be
//! repositioned, so skipping data is a seek. Stream sources only read
//! forward, so skipping data means reading and discarding it.
//!
//! The engine wraps the source of the current volume in a shared cell
//! ([`SourceState`]) that tracks the logical position. File parts hold a weak
//! reference to that cell and fail with a usage error once it is released.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result, UsageError};

/// Readers that can also seek.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// One physical byte source.
pub enum Source {
    /// A forward-only source.
    Stream(Box<dyn Read + Send>),
    /// A source that supports repositioning.
    Seekable(Box<dyn ReadSeek>),
}

impl Source {
    /// Wraps a forward-only reader.
    pub fn stream<R: Read + Send + 'static>(reader: R) -> Self {
        Source::Stream(Box::new(reader))
    }

    /// Wraps a seekable reader.
    pub fn seekable<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        Source::Seekable(Box::new(reader))
    }

    /// Opens a file as a buffered seekable source.
    pub fn open_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::seekable(BufReader::new(file)))
    }

    /// Returns `true` if the source supports repositioning.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Source::Seekable(_))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stream(_) => f.write_str("Source::Stream(..)"),
            Source::Seekable(_) => f.write_str("Source::Seekable(..)"),
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Stream(r) => r.read(buf),
            Source::Seekable(r) => r.read(buf),
        }
    }
}

/// Shared handle to the state of one volume's source.
pub(crate) type SharedSource = Arc<Mutex<SourceState>>;

/// Locks a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Position-tracking wrapper around a volume's source.
pub(crate) struct SourceState {
    source: Option<Source>,
    /// Logical offset of the next byte returned by `read`.
    position: u64,
    /// Bytes read ahead for format detection, served before the source.
    lookahead: Vec<u8>,
    lookahead_pos: usize,
    seek_enabled: bool,
}

impl SourceState {
    /// Wraps a source.
    ///
    /// `allow_seek` is ignored for stream sources. Seekable sources start at
    /// their current stream position so offsets stay absolute.
    pub(crate) fn new(mut source: Source, allow_seek: bool) -> Result<Self> {
        let seek_enabled = allow_seek && source.is_seekable();
        let position = match &mut source {
            Source::Seekable(r) if seek_enabled => r.stream_position()?,
            _ => 0,
        };
        Ok(Self {
            source: Some(source),
            position,
            lookahead: Vec::new(),
            lookahead_pos: 0,
            seek_enabled,
        })
    }

    pub(crate) fn into_shared(self) -> SharedSource {
        Arc::new(Mutex::new(self))
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn is_seekable(&self) -> bool {
        self.seek_enabled
    }

    fn source_mut(&mut self) -> Result<&mut Source> {
        self.source
            .as_mut()
            .ok_or(Error::Usage(UsageError::VolumeReleased))
    }

    fn buffered(&self) -> usize {
        self.lookahead.len() - self.lookahead_pos
    }

    /// Returns up to `len` bytes from the current position without consuming
    /// them. Fewer bytes are returned only at end of source.
    pub(crate) fn peek(&mut self, len: usize) -> Result<&[u8]> {
        if self.buffered() < len {
            if self.lookahead_pos > 0 {
                self.lookahead.drain(..self.lookahead_pos);
                self.lookahead_pos = 0;
            }
            let have = self.lookahead.len();
            let mut extra = Vec::with_capacity(len - have);
            self.source_mut()?
                .take((len - have) as u64)
                .read_to_end(&mut extra)?;
            self.lookahead.extend_from_slice(&extra);
        }
        let end = (self.lookahead_pos + len).min(self.lookahead.len());
        Ok(&self.lookahead[self.lookahead_pos..end])
    }

    /// Skips `count` bytes forward.
    ///
    /// Seeks when possible, otherwise reads and discards. Hitting the end of
    /// a stream source before `count` bytes is an error.
    pub(crate) fn skip(&mut self, count: u64) -> Result<()> {
        let from_lookahead = count.min(self.buffered() as u64);
        self.lookahead_pos += from_lookahead as usize;
        self.position += from_lookahead;
        let rest = count - from_lookahead;
        if rest == 0 {
            return Ok(());
        }

        let target = self.position + rest;
        if self.seek_enabled {
            self.reposition(target)?;
            return Ok(());
        }

        let source = self.source_mut()?;
        let discarded = io::copy(&mut source.take(rest), &mut io::sink())?;
        self.position += discarded;
        if discarded < rest {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended after {} of {} skipped bytes",
                    discarded, rest
                ),
            )));
        }
        Ok(())
    }

    /// Moves to the absolute offset `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultipartStreamRequired`] when `target` lies behind
    /// the current position of a forward-only source.
    pub(crate) fn seek_to(&mut self, target: u64) -> Result<()> {
        if target >= self.position {
            return self.skip(target - self.position);
        }
        if !self.seek_enabled {
            return Err(Error::MultipartStreamRequired(format!(
                "cannot move back from offset {} to {} on a forward-only source",
                self.position, target
            )));
        }
        self.reposition(target)
    }

    fn reposition(&mut self, target: u64) -> Result<()> {
        match self.source_mut()? {
            Source::Seekable(r) => {
                r.seek(SeekFrom::Start(target))?;
            }
            Source::Stream(_) => {
                return Err(Error::MultipartStreamRequired(
                    "source does not support seeking".into(),
                ));
            }
        }
        self.lookahead.clear();
        self.lookahead_pos = 0;
        self.position = target;
        Ok(())
    }

    /// Detaches the source. Later reads fail with [`UsageError::VolumeReleased`].
    pub(crate) fn release(&mut self) -> Option<Source> {
        self.lookahead.clear();
        self.lookahead_pos = 0;
        self.source.take()
    }

    pub(crate) fn is_released(&self) -> bool {
        self.source.is_none()
    }
}

impl Read for SourceState {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = if self.buffered() > 0 {
            let n = self.buffered().min(buf.len());
            buf[..n].copy_from_slice(&self.lookahead[self.lookahead_pos..self.lookahead_pos + n]);
            self.lookahead_pos += n;
            if self.lookahead_pos == self.lookahead.len() {
                self.lookahead.clear();
                self.lookahead_pos = 0;
            }
            n
        } else {
            self.source_mut().map_err(io::Error::from)?.read(buf)?
        };
        self.position += n as u64;
        Ok(n)
    }
}

/// A header parser's view of the current volume.
///
/// Reads advance the volume position; parsers use [`skip`](Self::skip) and
/// [`seek_to`](Self::seek_to) to step over bytes they do not need.
pub struct SourceCursor<'a> {
    state: &'a mut SourceState,
}

impl<'a> SourceCursor<'a> {
    pub(crate) fn new(state: &'a mut SourceState) -> Self {
        Self { state }
    }

    /// Returns the absolute offset of the next byte.
    pub fn position(&self) -> u64 {
        self.state.position()
    }

    /// Returns `true` if skips are performed by seeking.
    pub fn is_seekable(&self) -> bool {
        self.state.is_seekable()
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        self.state.skip(count)
    }

    /// Moves to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.state.seek_to(offset)
    }

    /// Reads exactly `buf.len()` bytes, or returns `Ok(false)` if the source
    /// is at its end before the first byte.
    ///
    /// A source that ends partway through `buf` is a corrupt header.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let start = self.position();
        let mut filled = 0;
        while filled < buf.len() {
            match self.state.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from_io(e)),
            }
        }
        match filled {
            0 if !buf.is_empty() => Ok(false),
            n if n == buf.len() => Ok(true),
            n => Err(Error::corrupt_header(
                start,
                format!("truncated header: {} of {} bytes", n, buf.len()),
            )),
        }
    }
}

impl Read for SourceCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.state.read(buf)
    }
}

impl fmt::Debug for SourceCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCursor")
            .field("position", &self.position())
            .field("seekable", &self.is_seekable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn data() -> Vec<u8> {
        (0u8..=99).collect()
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut state = SourceState::new(Source::stream(Cursor::new(data())), true).unwrap();
        assert_eq!(state.peek(4).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(state.position(), 0);

        let mut buf = [0u8; 6];
        state.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3, 4, 5]);
        assert_eq!(state.position(), 6);
    }

    #[test]
    fn test_peek_short_source() {
        let mut state = SourceState::new(Source::stream(Cursor::new(vec![1, 2])), true).unwrap();
        assert_eq!(state.peek(8).unwrap(), &[1, 2]);
    }

    #[test]
    fn test_stream_skip_discards() {
        let mut state = SourceState::new(Source::stream(Cursor::new(data())), true).unwrap();
        assert!(!state.is_seekable());
        state.peek(10).unwrap();
        state.skip(50).unwrap();
        assert_eq!(state.position(), 50);

        let mut buf = [0u8; 1];
        state.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 50);
    }

    #[test]
    fn test_stream_skip_past_end_fails() {
        let mut state = SourceState::new(Source::stream(Cursor::new(data())), true).unwrap();
        let err = state.skip(200).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_stream_cannot_move_backwards() {
        let mut state = SourceState::new(Source::stream(Cursor::new(data())), true).unwrap();
        state.skip(10).unwrap();
        let err = state.seek_to(5).unwrap_err();
        assert!(matches!(err, Error::MultipartStreamRequired(_)));
    }

    #[test]
    fn test_seekable_moves_both_ways() {
        let mut state = SourceState::new(Source::seekable(Cursor::new(data())), true).unwrap();
        assert!(state.is_seekable());
        state.seek_to(80).unwrap();
        state.seek_to(20).unwrap();

        let mut buf = [0u8; 2];
        state.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [20, 21]);
        assert_eq!(state.position(), 22);
    }

    #[test]
    fn test_seekable_starts_at_stream_position() {
        let mut cursor = Cursor::new(data());
        cursor.set_position(30);
        let state = SourceState::new(Source::seekable(cursor), true).unwrap();
        assert_eq!(state.position(), 30);
    }

    #[test]
    fn test_seeking_disabled_for_seekable_source() {
        let mut state = SourceState::new(Source::seekable(Cursor::new(data())), false).unwrap();
        assert!(!state.is_seekable());
        state.skip(10).unwrap();
        assert!(matches!(
            state.seek_to(0),
            Err(Error::MultipartStreamRequired(_))
        ));
    }

    #[test]
    fn test_released_source_fails_with_usage_error() {
        let mut state = SourceState::new(Source::stream(Cursor::new(data())), true).unwrap();
        assert!(state.release().is_some());
        assert!(state.is_released());

        let err = state.read(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(
            Error::from_io(err),
            Error::Usage(UsageError::VolumeReleased)
        ));
    }

    #[test]
    fn test_cursor_read_exact_or_eof() {
        let mut state = SourceState::new(Source::stream(Cursor::new(vec![1, 2, 3])), true).unwrap();
        let mut cursor = SourceCursor::new(&mut state);

        let mut buf = [0u8; 2];
        assert!(cursor.read_exact_or_eof(&mut buf).unwrap());
        assert!(matches!(
            cursor.read_exact_or_eof(&mut buf),
            Err(Error::CorruptHeader { offset: 2, .. })
        ));
        assert!(!cursor.read_exact_or_eof(&mut buf).unwrap());
    }
}
