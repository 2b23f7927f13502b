//! Async wrapper around the sequential reader.
//!
//! Volume sources are blocking `Read` implementations, so [`AsyncReader`]
//! runs every reader operation on Tokio's blocking pool and hands the
//! reader back when the task completes. Entry data is moved to async
//! writers in chunks.
//!
//! # Example
//!
//! ```rust,ignore
//! use volread::async_read::AsyncReader;
//! use volread::{Reader, ReaderOptions};
//!
//! #[tokio::main]
//! async fn main() -> volread::Result<()> {
//!     let reader = Reader::multi(volumes, formats, ReaderOptions::default());
//!     let mut reader = AsyncReader::new(reader);
//!     while reader.advance().await? {
//!         let mut out = tokio::io::sink();
//!         reader.write_entry_to(&mut out).await?;
//!     }
//!     Ok(())
//! }
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::progress::CancelHandle;
use crate::read::Entry;
use crate::streaming::{Reader, ReaderState};
use crate::{Error, Result, UsageError};

/// Runs a [`Reader`] on the blocking thread pool.
///
/// Cancelling the token stops the reader at its next entry boundary, the
/// same way [`Reader::cancel`] does.
pub struct AsyncReader {
    reader: Option<Reader>,
    token: CancellationToken,
    cancel: CancelHandle,
}

impl AsyncReader {
    /// Wraps a reader.
    pub fn new(reader: Reader) -> Self {
        Self::with_cancellation(reader, CancellationToken::new())
    }

    /// Wraps a reader that stops when `token` is cancelled.
    pub fn with_cancellation(reader: Reader, token: CancellationToken) -> Self {
        let cancel = reader.cancel_handle();
        Self {
            reader: Some(reader),
            token,
            cancel,
        }
    }

    /// Returns the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancels the reader.
    pub fn cancel(&self) {
        self.token.cancel();
        self.cancel.cancel();
    }

    /// Returns the current entry.
    pub fn entry(&self) -> Option<&Entry> {
        self.reader.as_ref().and_then(Reader::entry)
    }

    /// Returns the reader's state, or `None` if a task lost the reader.
    pub fn state(&self) -> Option<ReaderState> {
        self.reader.as_ref().map(Reader::state)
    }

    /// Moves to the next entry.
    pub async fn advance(&mut self) -> Result<bool> {
        self.run(Reader::advance).await
    }

    /// Skips the current entry.
    pub async fn skip_entry(&mut self) -> Result<()> {
        self.run(Reader::skip_entry).await
    }

    /// Reads the current entry into memory.
    pub async fn read_entry_to_vec(&mut self) -> Result<Vec<u8>> {
        self.run(Reader::read_entry_to_vec).await
    }

    /// Copies the current entry into an async writer. Returns the bytes
    /// written.
    pub async fn write_entry_to<W>(&mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.run(Reader::open_for_read).await?;
        let mut written = 0u64;
        loop {
            let chunk = self
                .run(|reader| {
                    let mut buf = vec![0u8; reader.options().read_buffer_size];
                    let n = reader.read_decoded(&mut buf)?;
                    buf.truncate(n);
                    Ok(buf)
                })
                .await?;
            if chunk.is_empty() {
                writer.flush().await?;
                return Ok(written);
            }
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> Result<Reader> {
        self.reader
            .ok_or(Error::Usage(UsageError::ReaderUnavailable))
    }

    async fn run<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Reader) -> Result<T> + Send + 'static,
    {
        let mut reader = self
            .reader
            .take()
            .ok_or(Error::Usage(UsageError::ReaderUnavailable))?;
        if self.token.is_cancelled() {
            reader.cancel();
        }

        let mut task = tokio::task::spawn_blocking(move || {
            let result = op(&mut reader);
            (reader, result)
        });
        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = self.token.cancelled() => {
                self.cancel.cancel();
                task.await
            }
        };

        let (reader, result) = joined.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        self.reader = Some(reader);
        result
    }
}

impl std::fmt::Debug for AsyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReader")
            .field("reader", &self.reader)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
