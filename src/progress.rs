//! Reader notifications and cancellation.
//!
//! A [`ReaderListener`] observes the reader engine: volumes as they are
//! opened, entries as their data is consumed, and each physical file part as
//! its bytes are read. Listeners are notifications only. They cannot change
//! what the engine does, but an error a listener returns is propagated
//! immediately from the call that triggered it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use volread::progress::AtomicProgress;
//!
//! let progress = AtomicProgress::shared();
//! // let reader = Reader::single(source, formats, options)
//! //     .with_listener(Arc::clone(&progress));
//! assert_eq!(progress.entries_completed(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::Result;
use crate::format::VolumeInfo;

/// Observer of reader engine progress.
///
/// Every method has a no-op default; implement the ones you need.
pub trait ReaderListener: Send {
    /// Called after a volume has been opened and its archive flags read.
    fn on_volume_opened(&mut self, index: u32, info: &VolumeInfo) -> Result<()> {
        let _ = (index, info);
        Ok(())
    }

    /// Called when the engine starts consuming an entry's data, whether the
    /// caller opened its stream or the engine is skipping it.
    ///
    /// `size` is `None` while the entry is still incomplete.
    fn on_entry_start(&mut self, key: &str, size: Option<u64>) -> Result<()> {
        let _ = (key, size);
        Ok(())
    }

    /// Called once an entry's data has been fully consumed.
    ///
    /// `decoded` counts the bytes produced by the codec (zero for raw skips).
    fn on_entry_complete(&mut self, key: &str, decoded: u64) -> Result<()> {
        let _ = (key, decoded);
        Ok(())
    }

    /// Called before the bytes of one physical file part are consumed.
    fn on_part_start(&mut self, key: &str, part: usize, length: u64) -> Result<()> {
        let _ = (key, part, length);
        Ok(())
    }

    /// Called when the bytes of one physical file part have all been consumed.
    fn on_part_complete(&mut self, key: &str, part: usize, consumed: u64) -> Result<()> {
        let _ = (key, part, consumed);
        Ok(())
    }
}

/// A listener that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoListener;

impl ReaderListener for NoListener {}

/// Counters collected by [`StatisticsListener`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStatistics {
    /// Volumes opened.
    pub volumes_opened: u32,
    /// Entries whose data consumption started.
    pub entries_started: u64,
    /// Entries whose data was fully consumed.
    pub entries_completed: u64,
    /// File parts fully consumed.
    pub parts_completed: u64,
    /// Raw (compressed) bytes consumed across all parts.
    pub packed_bytes: u64,
    /// Decoded bytes produced across all entries.
    pub decoded_bytes: u64,
    /// Key of the entry currently being consumed.
    pub current_entry: Option<String>,
}

/// A listener that records [`ReadStatistics`].
#[derive(Debug, Default, Clone)]
pub struct StatisticsListener {
    stats: ReadStatistics,
}

impl StatisticsListener {
    /// Creates a new statistics listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected statistics.
    pub fn stats(&self) -> &ReadStatistics {
        &self.stats
    }
}

impl ReaderListener for StatisticsListener {
    fn on_volume_opened(&mut self, _index: u32, _info: &VolumeInfo) -> Result<()> {
        self.stats.volumes_opened += 1;
        Ok(())
    }

    fn on_entry_start(&mut self, key: &str, _size: Option<u64>) -> Result<()> {
        self.stats.entries_started += 1;
        self.stats.current_entry = Some(key.to_string());
        Ok(())
    }

    fn on_entry_complete(&mut self, _key: &str, decoded: u64) -> Result<()> {
        self.stats.entries_completed += 1;
        self.stats.decoded_bytes += decoded;
        self.stats.current_entry = None;
        Ok(())
    }

    fn on_part_complete(&mut self, _key: &str, _part: usize, consumed: u64) -> Result<()> {
        self.stats.parts_completed += 1;
        self.stats.packed_bytes += consumed;
        Ok(())
    }
}

/// A thread-safe progress listener using atomics.
///
/// Share it with `Arc` to monitor a reader from another thread.
#[derive(Debug)]
pub struct AtomicProgress {
    volumes_opened: AtomicU64,
    entries_completed: AtomicU64,
    packed_bytes: AtomicU64,
    decoded_bytes: AtomicU64,
    start_time: Instant,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    /// Creates a new atomic progress listener.
    pub fn new() -> Self {
        Self {
            volumes_opened: AtomicU64::new(0),
            entries_completed: AtomicU64::new(0),
            packed_bytes: AtomicU64::new(0),
            decoded_bytes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Creates a shared atomic progress listener.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the number of volumes opened.
    pub fn volumes_opened(&self) -> u64 {
        self.volumes_opened.load(Ordering::Relaxed)
    }

    /// Returns the number of entries fully consumed.
    pub fn entries_completed(&self) -> u64 {
        self.entries_completed.load(Ordering::Relaxed)
    }

    /// Returns raw bytes consumed.
    pub fn packed_bytes(&self) -> u64 {
        self.packed_bytes.load(Ordering::Relaxed)
    }

    /// Returns decoded bytes produced.
    pub fn decoded_bytes(&self) -> u64 {
        self.decoded_bytes.load(Ordering::Relaxed)
    }

    /// Returns elapsed time since creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the raw read rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            0.0
        } else {
            self.packed_bytes() as f64 / elapsed
        }
    }
}

impl ReaderListener for Arc<AtomicProgress> {
    fn on_volume_opened(&mut self, _index: u32, _info: &VolumeInfo) -> Result<()> {
        self.volumes_opened.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_entry_complete(&mut self, _key: &str, decoded: u64) -> Result<()> {
        self.entries_completed.fetch_add(1, Ordering::Relaxed);
        self.decoded_bytes.fetch_add(decoded, Ordering::Relaxed);
        Ok(())
    }

    fn on_part_complete(&mut self, _key: &str, _part: usize, consumed: u64) -> Result<()> {
        self.packed_bytes.fetch_add(consumed, Ordering::Relaxed);
        Ok(())
    }
}

/// A cloneable handle that requests cancellation of a reader.
///
/// Cancellation is cooperative: the reader notices it at its next entry
/// boundary (`advance`, implicit skip, opening a stream) and becomes
/// terminal. Streams already handed out keep working.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Creates a handle that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_listener() {
        let mut listener = NoListener;
        assert!(listener.on_entry_start("a", Some(1)).is_ok());
        assert!(listener.on_part_complete("a", 0, 1).is_ok());
    }

    #[test]
    fn test_statistics_listener() {
        let mut listener = StatisticsListener::new();
        listener.on_volume_opened(0, &VolumeInfo::default()).unwrap();
        listener.on_entry_start("test.txt", Some(500)).unwrap();
        assert_eq!(listener.stats().current_entry.as_deref(), Some("test.txt"));
        listener.on_part_start("test.txt", 0, 120).unwrap();
        listener.on_part_complete("test.txt", 0, 120).unwrap();
        listener.on_entry_complete("test.txt", 500).unwrap();

        let stats = listener.stats();
        assert_eq!(stats.volumes_opened, 1);
        assert_eq!(stats.entries_started, 1);
        assert_eq!(stats.entries_completed, 1);
        assert_eq!(stats.packed_bytes, 120);
        assert_eq!(stats.decoded_bytes, 500);
        assert!(stats.current_entry.is_none());
    }

    #[test]
    fn test_atomic_progress() {
        let progress = AtomicProgress::shared();
        let mut listener: Arc<AtomicProgress> = Arc::clone(&progress);

        listener.on_part_complete("a", 0, 1000).unwrap();
        listener.on_entry_complete("a", 4000).unwrap();

        assert_eq!(progress.packed_bytes(), 1000);
        assert_eq!(progress.decoded_bytes(), 4000);
        assert_eq!(progress.entries_completed(), 1);
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());

        clone.cancel();
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
