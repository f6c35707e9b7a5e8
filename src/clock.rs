//! Bucket arithmetic on the local calendar.
//!
//! Every bucket is anchored to local midnight rather than to the Unix epoch,
//! so a one-day bucket always opens at 00:00 in the configured offset and a
//! four-hour bucket at 00:00, 04:00, 08:00, ... local time. Periods shorter
//! than a day restart at each local midnight (a 7-minute grid ends the day
//! with a 5-minute bucket); periods of a day or longer are laid on a grid of
//! local days counted from the local epoch day.

use chrono::{FixedOffset, Local, Offset};

/// Milliseconds in one minute.
pub const MINUTE_MS: i64 = 60_000;

/// Minutes in one hour, the period of the hour series.
pub const HOUR_MINUTES: u32 = 60;

/// Minutes in one day.
pub const DAY_MINUTES: u32 = 1_440;

const DAY_MS: i64 = DAY_MINUTES as i64 * MINUTE_MS;

/// Returns the length of a `period`-minute bucket in milliseconds.
pub const fn period_ms(period: u32) -> i64 {
    period as i64 * MINUTE_MS
}

/// Maps instants to the start of their bucket for a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketClock {
    offset: FixedOffset,
}

impl BucketClock {
    /// Creates a clock for the given offset.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// A clock whose local calendar is UTC.
    pub fn utc() -> Self {
        Self::new(Offset::fix(&chrono::Utc))
    }

    /// A clock using the host's current local offset.
    pub fn local() -> Self {
        Self::new(Local::now().offset().fix())
    }

    /// Builds a clock from an offset east of UTC in minutes.
    ///
    /// Returns `None` when the offset is a day or more away from UTC.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn offset_ms(&self) -> i64 {
        i64::from(self.offset.local_minus_utc()) * 1_000
    }

    /// Floors `instant` to the start of the `period`-minute bucket holding it.
    ///
    /// A period of `0` is tick mode: every instant is its own bucket.
    pub fn bucket_start(&self, period: u32, instant: i64) -> i64 {
        if period == 0 {
            return instant;
        }
        let width = period_ms(period);
        let local = instant + self.offset_ms();
        let start = if period < DAY_MINUTES {
            let midnight = local.div_euclid(DAY_MS) * DAY_MS;
            midnight + (local - midnight) / width * width
        } else {
            local.div_euclid(width) * width
        };
        start - self.offset_ms()
    }

    /// Returns the start of the bucket following the one starting at `bucket`.
    pub fn next_bucket_start(&self, period: u32, bucket: i64) -> i64 {
        if period == 0 {
            return bucket + 1;
        }
        self.bucket_start(period, bucket + period_ms(period))
    }

    /// Returns the start of the bucket preceding the one starting at `bucket`.
    ///
    /// Unlike stepping back a whole period, this lands on the short last
    /// bucket of the previous day for periods that do not divide a day.
    pub fn prev_bucket_start(&self, period: u32, bucket: i64) -> i64 {
        if period == 0 {
            return bucket - 1;
        }
        self.bucket_start(period, bucket - 1)
    }
}

/// Estimates how many native buckets separate `head` from `instant`.
///
/// Assumes the series is uniformly spaced at `native_period`. Real series may
/// have gaps, which only ever make the true index smaller, so the estimate is
/// an upper bound for narrowing a search and never an index to trust blindly.
pub fn index_for_time(head: i64, native_period: u32, instant: i64) -> usize {
    if native_period == 0 || instant >= head {
        return 0;
    }
    usize::try_from((head - instant) / period_ms(native_period)).unwrap_or(usize::MAX)
}
