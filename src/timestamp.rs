//! Entry timestamps.
//!
//! Container formats store times in different encodings: Windows FILETIME
//! (7-Zip style, RAR5), Unix seconds (TAR, RAR5 optional), and packed MS-DOS
//! date/time words (ZIP, RAR4, ARC). Header parsers convert whatever they
//! find into a single [`Timestamp`], which keeps the highest precision of
//! the three: 100-nanosecond intervals since January 1, 1601 (UTC).
//!
//! # Example
//!
//! ```rust
//! use volread::Timestamp;
//!
//! let ts = Timestamp::from_dos_datetime(0x0021, 0x0000).unwrap();
//! assert_eq!(ts.as_unix_secs(), 315_532_800); // 1980-01-01T00:00:00Z
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601) and the Unix epoch (1970)
/// in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// A point in time attached to an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Raw FILETIME value (100-nanosecond intervals since 1601-01-01)
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` if the value falls outside the FILETIME range.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Self::from_unix_secs_nanos(secs, 0)
    }

    /// Creates a timestamp from Unix seconds and a nanosecond fraction.
    ///
    /// Only 100-nanosecond precision is kept; `nanos` is truncated.
    pub fn from_unix_secs_nanos(secs: i64, nanos: u32) -> Option<Self> {
        let fraction = u64::from(nanos / 100);
        let base = if secs < 0 {
            let before = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF.checked_sub(before)?
        } else {
            let after = (secs as u64).checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF.checked_add(after)?
        };
        base.checked_add(fraction).map(Self::from_filetime)
    }

    /// Creates a timestamp from packed MS-DOS date and time words.
    ///
    /// The date word holds `year - 1980` (7 bits), month (4 bits) and day
    /// (5 bits); the time word holds hours (5 bits), minutes (6 bits) and
    /// seconds / 2 (5 bits). DOS times carry no zone; they are taken as UTC.
    ///
    /// Returns `None` for out-of-range fields.
    pub fn from_dos_datetime(date: u16, time: u16) -> Option<Self> {
        let year = 1980 + i64::from(date >> 9);
        let month = i64::from((date >> 5) & 0x0F);
        let day = i64::from(date & 0x1F);
        let hour = i64::from(time >> 11);
        let minute = i64::from((time >> 5) & 0x3F);
        let second = i64::from(time & 0x1F) * 2;

        if !(1..=12).contains(&month) || day == 0 || hour > 23 || minute > 59 || second > 59 {
            return None;
        }

        let days = days_from_civil(year, month, day);
        Self::from_unix_secs(days * SECONDS_PER_DAY + hour * 3600 + minute * 60 + second)
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => {
                Self::from_unix_secs_nanos(duration.as_secs() as i64, duration.subsec_nanos())
            }
            Err(e) => {
                let duration = e.duration();
                Self::from_unix_secs_nanos(-(duration.as_secs() as i64), duration.subsec_nanos())
            }
        }
    }

    /// Returns the raw Windows FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns the timestamp as Unix seconds, rounding towards negative
    /// infinity for pre-epoch values.
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            -(intervals.div_ceil(INTERVALS_PER_SECOND) as i64)
        }
    }

    /// Returns the sub-second portion as nanoseconds (always a multiple of 100).
    #[inline]
    pub fn sub_second_nanos(&self) -> u32 {
        ((self.filetime % INTERVALS_PER_SECOND) * 100) as u32
    }

    /// Converts to a `SystemTime` with full 100-nanosecond precision.
    pub fn as_system_time(&self) -> SystemTime {
        let (intervals, after_epoch) = if self.filetime >= FILETIME_UNIX_DIFF {
            (self.filetime - FILETIME_UNIX_DIFF, true)
        } else {
            (FILETIME_UNIX_DIFF - self.filetime, false)
        };
        let offset = Duration::new(
            intervals / INTERVALS_PER_SECOND,
            ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
        );
        if after_epoch {
            UNIX_EPOCH + offset
        } else {
            UNIX_EPOCH - offset
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month_index = (month + 9) % 12;
    let day_of_year = (153 * month_index + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF);
        assert_eq!(ts.as_unix_secs(), 0);
        assert_eq!(ts.as_system_time(), UNIX_EPOCH);
    }

    #[test]
    fn test_from_unix_secs() {
        let ts = Timestamp::from_unix_secs(1).unwrap();
        assert_eq!(ts.as_filetime(), FILETIME_UNIX_DIFF + INTERVALS_PER_SECOND);

        let ts = Timestamp::from_unix_secs(-86_400).unwrap();
        assert_eq!(ts.as_unix_secs(), -86_400);
    }

    #[test]
    fn test_pre_epoch_rounds_down() {
        let ts = Timestamp::from_filetime(FILETIME_UNIX_DIFF - 1);
        assert_eq!(ts.as_unix_secs(), -1);
    }

    #[test]
    fn test_system_time_keeps_100ns() {
        let original = UNIX_EPOCH + Duration::new(1234567890, 123_456_700);
        let ts = Timestamp::from_system_time(original).unwrap();
        assert_eq!(ts.sub_second_nanos(), 123_456_700);
        assert_eq!(SystemTime::from(ts), original);
    }

    #[test]
    fn test_dos_datetime() {
        // 2024-03-15 13:45:30
        let ts = Timestamp::from_dos_datetime(22639, 28079).unwrap();
        assert_eq!(ts.as_unix_secs(), 1_710_510_330);
    }

    #[test]
    fn test_dos_datetime_rejects_invalid_fields() {
        // Month 0
        assert!(Timestamp::from_dos_datetime(0x0001, 0).is_none());
        // Month 13
        assert!(Timestamp::from_dos_datetime((13 << 5) | 1, 0).is_none());
        // Hour 24
        assert!(Timestamp::from_dos_datetime(0x0021, 24 << 11).is_none());
    }

    #[test]
    fn test_days_from_civil() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(days_from_civil(1969, 12, 31), -1);
    }
}
