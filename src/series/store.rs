//! The per-slot store of tick, minute and hour series.
//!
//! Live ticks update the head minute bar in place; when the head minute
//! crosses into a new hour the completed hour is rolled up into the hour
//! series. The hour series therefore only ever serves completed hours, and
//! the running hour is always read from minute bars.

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::Series;
use crate::aggregate::aggregate;
use crate::clock::{BucketClock, HOUR_MINUTES, MINUTE_MS};
use crate::config::EngineConfig;
use crate::error::RequestError;
use crate::models::{Bar, Resolution, Tick};

/// Tick, minute and hour series owned by one chart slot.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    clock: BucketClock,
    ticks: Series<Tick>,
    minutes: Series<Bar>,
    hours: Series<Bar>,
    tick_interval_ms: i64,
    tick_storage: bool,
    tick_delta: Decimal,
}

impl SeriesStore {
    /// Creates an empty store sized from `config`.
    pub fn new(config: &EngineConfig, clock: BucketClock) -> Self {
        Self {
            clock,
            ticks: Series::new(config.max_ticks),
            minutes: Series::new(config.max_minute_bars),
            hours: Series::new(config.max_hour_bars),
            tick_interval_ms: config.tick_interval_ms,
            tick_storage: config.tick_storage,
            tick_delta: Decimal::ZERO,
        }
    }

    pub fn clock(&self) -> &BucketClock {
        &self.clock
    }

    pub fn ticks(&self) -> &Series<Tick> {
        &self.ticks
    }

    pub fn minutes(&self) -> &Series<Bar> {
        &self.minutes
    }

    pub fn hours(&self) -> &Series<Bar> {
        &self.hours
    }

    /// Returns the bar series stored at `resolution`, if it is a bar series.
    pub fn bars(&self, resolution: Resolution) -> Option<&Series<Bar>> {
        match resolution {
            Resolution::Tick => None,
            Resolution::Minute => Some(&self.minutes),
            Resolution::Hour => Some(&self.hours),
        }
    }

    /// The finest resolution this store can serve, in minutes.
    pub fn native_period(&self) -> u32 {
        if self.tick_storage {
            Resolution::Tick.minutes()
        } else {
            Resolution::Minute.minutes()
        }
    }

    /// Price change of the latest tick against the close it replaced.
    pub fn tick_delta(&self) -> Decimal {
        self.tick_delta
    }

    /// Time of the newest sample held at bar resolution.
    pub fn head_time(&self) -> Option<i64> {
        self.minutes
            .head()
            .or_else(|| self.hours.head())
            .map(|bar| bar.time)
    }

    /// Start of the hour still being filled by live minutes.
    ///
    /// Without minute bars no hour is running and every hour bar is complete,
    /// so the running hour is the one after the newest hour bar.
    pub fn running_hour(&self) -> Option<i64> {
        match (self.minutes.head(), self.hours.head()) {
            (Some(minute), _) => Some(self.clock.bucket_start(HOUR_MINUTES, minute.time)),
            (None, Some(hour)) => {
                Some(self.clock.next_bucket_start(HOUR_MINUTES, hour.time))
            }
            (None, None) => None,
        }
    }

    /// Applies one live sample.
    ///
    /// Samples older than the head minute are ignored. A sample in the head
    /// minute updates it; a sample in a later minute opens a new bar, first
    /// filling any skipped minutes with flat bars at the previous close.
    pub fn push_tick(&mut self, tick: Tick) {
        let minute = self.clock.bucket_start(1, tick.time);
        if let Some(head) = self.minutes.head() {
            if minute < head.time {
                debug!(
                    tick_time = tick.time,
                    head_time = head.time,
                    "Ignoring tick older than the head minute"
                );
                return;
            }
            self.tick_delta = tick.price - head.close;
        } else {
            self.tick_delta = Decimal::ZERO;
        }

        if self.tick_storage {
            let stored = self
                .ticks
                .head()
                .is_none_or(|last| tick.time - last.time > self.tick_interval_ms);
            if stored {
                self.ticks.push_head(tick);
            }
        }

        match self.minutes.head_mut() {
            Some(bar) if bar.time == minute => bar.apply_tick(&tick),
            _ => self.open_minute(minute, &tick),
        }
    }

    fn open_minute(&mut self, minute: i64, tick: &Tick) {
        let previous = self.minutes.head().copied();

        if let Some(prev) = previous {
            let capacity = i64::try_from(self.minutes.capacity()).unwrap_or(i64::MAX);
            let missing = ((minute - prev.time) / MINUTE_MS - 1).clamp(0, capacity);
            if missing > 0 {
                debug!(missing, "Filling skipped minutes");
            }
            for k in (1..=missing).rev() {
                let mut gap = Bar::flat(minute - k * MINUTE_MS, prev.close);
                gap.ask_depth = prev.ask_depth;
                gap.bid_depth = prev.bid_depth;
                self.minutes.push_head(gap);
            }
        }

        if let Some(evicted) = self.minutes.push_head(Bar::from_tick(minute, tick)) {
            debug!(evicted = evicted.time, "Evicted oldest minute bar");
        }

        if let Some(prev) = previous {
            let mut hour = self.clock.bucket_start(HOUR_MINUTES, prev.time);
            let running = self.clock.bucket_start(HOUR_MINUTES, minute);
            while hour < running {
                self.roll_up_hour(hour);
                hour = self.clock.next_bucket_start(HOUR_MINUTES, hour);
            }
        }
    }

    /// Aggregates the minutes of a completed hour into the hour series.
    ///
    /// Minute bars that cover the hour from its first minute replace any
    /// stored hour bar. A partial roll-up (the minute series starts mid-hour)
    /// only fills a hole and never overwrites a backfilled bar.
    fn roll_up_hour(&mut self, hour: i64) {
        let end = self.clock.next_bucket_start(HOUR_MINUTES, hour) - 1;
        let rolled = aggregate(&self.minutes, 1, HOUR_MINUTES, &self.clock, hour, end);
        let Some(bar) = rolled.newest().copied() else {
            return;
        };
        let complete = self.minutes.tail().is_some_and(|oldest| oldest.time <= hour);
        if complete || !self.hours.contains_time(hour) {
            debug!(hour, complete, "Rolled up hour bar");
            self.hours.upsert(bar);
        }
    }

    /// Rolls every completed hour held in minute bars into the hour series.
    fn sync_hours(&mut self) {
        let oldest = self.minutes.tail().map(|bar| bar.time);
        let (Some(oldest), Some(running)) = (oldest, self.running_hour()) else {
            return;
        };
        let mut hour = self.clock.bucket_start(HOUR_MINUTES, oldest);
        while hour < running {
            self.roll_up_hour(hour);
            hour = self.clock.next_bucket_start(HOUR_MINUTES, hour);
        }
    }

    /// Replaces a bar series wholesale.
    ///
    /// Either way, completed hours still covered by minute bars are re-derived
    /// afterwards, so the hour series has no holes over minutes in memory.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TickHistory`] for the tick series.
    pub fn replace_bars(
        &mut self,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<(), RequestError> {
        if resolution == Resolution::Tick {
            return Err(RequestError::TickHistory);
        }
        let bars = normalize(bars, resolution.minutes(), &self.clock);
        info!(
            resolution = resolution.as_str(),
            count = bars.len(),
            "Replacing series"
        );
        match resolution {
            Resolution::Tick => {}
            Resolution::Minute => {
                self.minutes.replace(bars);
                self.sync_hours();
            }
            Resolution::Hour => {
                self.hours.replace(bars);
                self.sync_hours();
            }
        }
        Ok(())
    }

    /// Appends history older than the current tail of a bar series.
    ///
    /// Bars at or after the current tail are ignored, as is anything beyond
    /// the series capacity. Returns how many bars were appended.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TickHistory`] for the tick series.
    pub fn extend_history(
        &mut self,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<usize, RequestError> {
        let bars = normalize(bars, resolution.minutes(), &self.clock);
        let series = match resolution {
            Resolution::Tick => return Err(RequestError::TickHistory),
            Resolution::Minute => &mut self.minutes,
            Resolution::Hour => &mut self.hours,
        };
        let mut appended = 0;
        for bar in bars {
            if series.is_full() {
                break;
            }
            if series.push_tail(bar) {
                appended += 1;
            }
        }
        if resolution == Resolution::Minute && appended > 0 {
            self.sync_hours();
        }
        Ok(appended)
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.minutes.clear();
        self.hours.clear();
        self.tick_delta = Decimal::ZERO;
    }
}

/// Aligns bars to their native buckets, folds duplicates and orders them
/// newest-first.
fn normalize(mut bars: Vec<Bar>, native_period: u32, clock: &BucketClock) -> Vec<Bar> {
    bars.sort_by_key(|bar| bar.time);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in &bars {
        let bucket = clock.bucket_start(native_period, bar.time);
        match out.last_mut() {
            Some(open) if open.time == bucket => open.fold(bar),
            _ => out.push(bar.rebased(bucket)),
        }
    }
    out.reverse();
    out
}
