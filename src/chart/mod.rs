//! One chart slot: its series, its resample cache and the window assembler
//! that answers bar requests from them.

pub mod backfill;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{aggregate, seam_merge};
use crate::cache::ResampleCache;
use crate::clock::{BucketClock, DAY_MINUTES, HOUR_MINUTES, period_ms};
use crate::config::EngineConfig;
use crate::error::RequestError;
use crate::models::{Bar, Bars, Resolution, Tick};
use crate::series::SeriesStore;

pub use backfill::{BackfillOutcome, BackfillRequest, BackfillResponse};

/// Earliest instant a window may reach back to.
const EARLIEST_MS: i64 = -8_640_000_000_000_000;

/// The answer to a bar request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Window {
    pub bars: Bars,
    /// Fewer bars than requested were available, the source series still has
    /// room and its history origin has not been reached: the caller should
    /// backfill and ask again.
    pub more_history_needed: bool,
}

/// A chart slot.
#[derive(Debug, Clone)]
pub struct Chart {
    slot: usize,
    title: String,
    store: SeriesStore,
    cache: ResampleCache,
    cache_source: Option<Resolution>,
    generation: u64,
    has_depleted: bool,
    minutes_exhausted: bool,
    hours_exhausted: bool,
}

impl Chart {
    pub fn new(slot: usize, config: &EngineConfig, clock: BucketClock) -> Self {
        Self {
            slot,
            title: config.title(slot).to_string(),
            store: SeriesStore::new(config, clock),
            cache: ResampleCache::new(),
            cache_source: None,
            generation: 0,
            has_depleted: false,
            minutes_exhausted: false,
            hours_exhausted: false,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn cache(&self) -> &ResampleCache {
        &self.cache
    }

    /// Bumped on every reset; backfill responses carry the generation they
    /// were requested under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the last bar request came back short and wants more history.
    pub fn has_depleted(&self) -> bool {
        self.has_depleted
    }

    pub fn tick_delta(&self) -> Decimal {
        self.store.tick_delta()
    }

    /// Whether the history origin of `resolution` has been reached.
    pub fn is_exhausted(&self, resolution: Resolution) -> bool {
        match resolution {
            Resolution::Tick => true,
            Resolution::Minute => self.minutes_exhausted,
            Resolution::Hour => self.hours_exhausted,
        }
    }

    fn mark_exhausted(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Tick => {}
            Resolution::Minute => self.minutes_exhausted = true,
            Resolution::Hour => self.hours_exhausted = true,
        }
    }

    /// The native series that `period` bars are aggregated from.
    ///
    /// Whole multiples of an hour come from hour bars, everything else from
    /// minute bars.
    pub fn source_for(period: u32) -> Resolution {
        if period == 0 {
            Resolution::Tick
        } else if period % HOUR_MINUTES == 0 {
            Resolution::Hour
        } else {
            Resolution::Minute
        }
    }

    /// Applies a live sample.
    pub fn push_tick(&mut self, tick: Tick) {
        self.store.push_tick(tick);
    }

    /// Replaces a native bar series wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TickHistory`] for the tick series.
    pub fn replace_bars(
        &mut self,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<(), RequestError> {
        self.store.replace_bars(resolution, bars)?;
        self.cache.clear();
        Ok(())
    }

    /// Drops every sample and starts a new generation, for example when the
    /// slot switches instrument.
    pub fn reset(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.store.clear();
        self.cache.clear();
        self.cache_source = None;
        self.generation = self.generation.wrapping_add(1);
        self.has_depleted = false;
        self.minutes_exhausted = false;
        self.hours_exhausted = false;
        info!(
            slot = self.slot,
            generation = self.generation,
            title = %self.title,
            "Chart reset"
        );
    }

    /// Returns up to `count` bars of `period` minutes, newest-first, ending
    /// `offset` buckets before the live bucket.
    ///
    /// A period of `0` returns stored ticks as flat bars, skipping the
    /// newest `offset` of them.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::ZeroCount`] for an empty request and
    /// [`RequestError::PeriodBelowResolution`] for tick mode on a slot
    /// without tick storage.
    pub fn bars(
        &mut self,
        period: u32,
        offset: usize,
        count: usize,
    ) -> Result<Window, RequestError> {
        if count == 0 {
            return Err(RequestError::ZeroCount);
        }
        let native = self.store.native_period();
        if period < native {
            return Err(RequestError::PeriodBelowResolution { period, native });
        }
        if period == 0 {
            self.has_depleted = false;
            return Ok(self.tick_window(offset, count));
        }

        let source = Self::source_for(period);
        let Some(head) = self.store.head_time() else {
            let more_history_needed = !self.is_exhausted(source);
            self.has_depleted = more_history_needed;
            return Ok(Window {
                bars: Bars::empty(period, i64::MAX),
                more_history_needed,
            });
        };

        let clock = *self.store.clock();
        let live = clock.bucket_start(period, head);
        let latest = step_back(&clock, period, live, offset);
        let oldest = step_back(&clock, period, latest, count - 1);
        let at_live_edge = latest >= live;

        if self.cache_source != Some(source) {
            self.cache.clear();
            self.cache_source = Some(source);
        }
        let series = match source {
            Resolution::Hour => self.store.hours(),
            _ => self.store.minutes(),
        };
        let stable = self.cache.resolve(
            series,
            source.minutes(),
            &clock,
            period,
            oldest,
            latest,
            at_live_edge,
        );
        let fresh = if at_live_edge {
            self.live_bucket(source, period, live, head)
        } else {
            Vec::new()
        };

        let mut bars = seam_merge(fresh, &stable);
        bars.truncate(count);
        let low_water_mark = bars.last().map_or(oldest, |bar| bar.time - 1);
        let more_history_needed =
            bars.len() < count && !series.is_full() && !self.is_exhausted(source);
        self.has_depleted = more_history_needed;
        debug!(
            slot = self.slot,
            period,
            offset,
            count,
            returned = bars.len(),
            more_history_needed,
            "Assembled bar window"
        );

        Ok(Window {
            bars: Bars {
                bars,
                period,
                low_water_mark,
            },
            more_history_needed,
        })
    }

    /// Aggregates the bucket still being filled.
    ///
    /// Hour-based periods take their completed hours from the hour series and
    /// the running hour from minute bars, so no minute is counted twice.
    fn live_bucket(&self, source: Resolution, period: u32, live: i64, head: i64) -> Vec<Bar> {
        let clock = self.store.clock();
        let minutes = self.store.minutes();
        if source != Resolution::Hour {
            return aggregate(minutes, 1, period, clock, live, head).bars;
        }
        let edge = self.store.running_hour().unwrap_or(live).max(live);
        let running = aggregate(minutes, 1, period, clock, edge, head);
        let completed = aggregate(
            self.store.hours(),
            HOUR_MINUTES,
            period,
            clock,
            live,
            edge - 1,
        );
        seam_merge(running.bars, &completed.bars)
    }

    fn tick_window(&self, offset: usize, count: usize) -> Window {
        let ticks = self.store.ticks();
        let bars: Vec<Bar> = ticks
            .iter()
            .skip(offset)
            .take(count)
            .map(|tick| Bar::from_tick(tick.time, tick))
            .collect();
        let low_water_mark = bars
            .last()
            .map(|bar| bar.time - 1)
            .or_else(|| ticks.tail().map(|tick| tick.time - 1))
            .unwrap_or(i64::MAX);
        Window {
            bars: Bars {
                bars,
                period: 0,
                low_water_mark,
            },
            more_history_needed: false,
        }
    }
}

/// Start of the bucket `buckets` buckets before the one starting at `from`.
///
/// Periods that divide a day have uniform buckets, so this is plain time
/// arithmetic. Other periods end each day with a short bucket: whole days are
/// skipped at once, then the rest is walked one bucket at a time.
fn step_back(clock: &BucketClock, period: u32, from: i64, buckets: usize) -> i64 {
    if period >= DAY_MINUTES || DAY_MINUTES % period == 0 {
        let span = i64::try_from(buckets)
            .unwrap_or(i64::MAX)
            .saturating_mul(period_ms(period));
        return clock.bucket_start(period, from.saturating_sub(span).max(EARLIEST_MS));
    }
    let per_day = DAY_MINUTES.div_ceil(period) as usize;
    let days = i64::try_from(buckets / per_day).unwrap_or(i64::MAX);
    let mut bucket = from.saturating_sub(days.saturating_mul(period_ms(DAY_MINUTES)));
    if bucket <= EARLIEST_MS {
        return clock.bucket_start(period, EARLIEST_MS);
    }
    for _ in 0..buckets % per_day {
        bucket = clock.prev_bucket_start(period, bucket);
        if bucket <= EARLIEST_MS {
            return clock.bucket_start(period, EARLIEST_MS);
        }
    }
    bucket
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MINUTE_MS;
    use rust_decimal_macros::dec;

    const T0: i64 = 1_705_312_800_000; // 2024-01-15 10:00 UTC

    fn chart() -> Chart {
        let config = EngineConfig {
            max_minute_bars: 1_000,
            ..EngineConfig::default()
        };
        Chart::new(0, &config, BucketClock::utc())
    }

    fn minute_bars(n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                volume: dec!(1),
                ..Bar::flat(T0 + i * MINUTE_MS, Decimal::from(100 + i))
            })
            .collect()
    }

    fn tick(time: i64, price: Decimal) -> Tick {
        Tick {
            time,
            price,
            volume: dec!(1),
            ask_depth: Decimal::ZERO,
            bid_depth: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            buy_volume: Decimal::ZERO,
        }
    }

    #[test]
    fn sources_follow_the_hour_grid() {
        assert_eq!(Chart::source_for(0), Resolution::Tick);
        assert_eq!(Chart::source_for(5), Resolution::Minute);
        assert_eq!(Chart::source_for(90), Resolution::Minute);
        assert_eq!(Chart::source_for(120), Resolution::Hour);
        assert_eq!(Chart::source_for(1_440), Resolution::Hour);
    }

    #[test]
    fn rejects_empty_and_too_fine_requests() {
        let mut chart = chart();
        assert_eq!(chart.bars(5, 0, 0), Err(RequestError::ZeroCount));

        let config = EngineConfig {
            tick_storage: false,
            ..EngineConfig::default()
        };
        let mut no_ticks = Chart::new(1, &config, BucketClock::utc());
        assert_eq!(
            no_ticks.bars(0, 0, 10),
            Err(RequestError::PeriodBelowResolution {
                period: 0,
                native: 1
            })
        );
    }

    #[test]
    fn empty_chart_wants_history_until_exhausted() {
        let mut chart = chart();
        let window = chart.bars(5, 0, 10).unwrap();
        assert!(window.bars.is_empty());
        assert!(window.more_history_needed);
        assert!(chart.has_depleted());

        chart.mark_exhausted(Resolution::Minute);
        assert!(!chart.bars(5, 0, 10).unwrap().more_history_needed);
    }

    #[test]
    fn offset_scrolls_back_whole_buckets() {
        let mut chart = chart();
        chart.replace_bars(Resolution::Minute, minute_bars(60)).unwrap();
        let window = chart.bars(5, 2, 3).unwrap();
        let times: Vec<i64> = window.bars.bars.iter().map(|b| b.time).collect();
        assert_eq!(
            times,
            vec![T0 + 45 * MINUTE_MS, T0 + 40 * MINUTE_MS, T0 + 35 * MINUTE_MS]
        );
        assert_eq!(window.bars.low_water_mark, T0 + 35 * MINUTE_MS - 1);
        assert!(!window.more_history_needed);
    }

    #[test]
    fn step_back_counts_the_short_bucket_before_midnight() {
        let clock = BucketClock::utc();
        let from = T0 + 847 * MINUTE_MS; // 00:07 on the next day
        let day = 1_440 * MINUTE_MS;
        assert_eq!(step_back(&clock, 7, from, 1), T0 + 840 * MINUTE_MS);
        assert_eq!(step_back(&clock, 7, from, 2), T0 + 835 * MINUTE_MS);
        assert_eq!(step_back(&clock, 7, from, 3), T0 + 828 * MINUTE_MS);
        assert_eq!(step_back(&clock, 7, from, 206), from - day);
        assert_eq!(step_back(&clock, 7, from, 207), T0 + 840 * MINUTE_MS - day);
        assert_eq!(step_back(&clock, 5, from - 2 * MINUTE_MS, 3), T0 + 830 * MINUTE_MS);
    }

    #[test]
    fn tick_mode_maps_ticks_to_flat_bars() {
        let mut chart = chart();
        for i in 0..5 {
            chart.push_tick(tick(T0 + i * 2_000, Decimal::from(100 + i)));
        }
        let window = chart.bars(0, 1, 3).unwrap();
        let closes: Vec<Decimal> = window.bars.bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![dec!(103), dec!(102), dec!(101)]);
        assert!(window.bars.bars.iter().all(|b| b.open == b.close && b.high == b.low));
        assert!(!window.more_history_needed);
    }

    #[test]
    fn reset_bumps_generation_and_clears_state() {
        let mut chart = chart();
        chart.replace_bars(Resolution::Minute, minute_bars(10)).unwrap();
        chart.bars(5, 0, 2).unwrap();
        chart.reset("ETH_JPY");
        assert_eq!(chart.generation(), 1);
        assert_eq!(chart.title(), "ETH_JPY");
        assert!(chart.store().minutes().is_empty());
        assert!(chart.cache().period().is_none());
    }

    #[test]
    fn switching_source_resets_the_cache() {
        let mut chart = chart();
        chart.replace_bars(Resolution::Minute, minute_bars(300)).unwrap();
        chart.bars(30, 0, 5).unwrap();
        assert_eq!(chart.cache().period(), Some(30));
        chart.bars(60, 0, 3).unwrap();
        assert_eq!(chart.cache().period(), Some(60));
        assert_eq!(chart.cache_source, Some(Resolution::Hour));
    }
}
