//! Per-slot cache of aggregated bars at the last requested period.
//!
//! The cache only ever holds complete buckets: everything it stores lies
//! strictly before the live bucket at the time it was computed, and the
//! sources of such buckets no longer change (bulk history operations clear
//! the cache). It grows at both ends as the viewport scrolls or the live edge
//! advances, and is re-bucketed or rebuilt when the period changes.

use tracing::{debug, info};

use crate::aggregate::{BarSource, aggregate, seam_merge};
use crate::clock::{BucketClock, DAY_MINUTES};
use crate::models::{Bar, Bars};

/// Previously aggregated stable bars for one chart slot.
#[derive(Debug, Clone, Default)]
pub struct ResampleCache {
    entry: Option<Bars>,
}

impl ResampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Period of the cached bars, if anything is cached.
    pub fn period(&self) -> Option<u32> {
        self.entry.as_ref().map(|entry| entry.period)
    }

    /// The cached bars, newest-first.
    pub fn bars(&self) -> &[Bar] {
        self.entry.as_ref().map_or(&[], |entry| entry.bars.as_slice())
    }

    pub fn low_water_mark(&self) -> Option<i64> {
        self.entry.as_ref().map(|entry| entry.low_water_mark)
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Returns the stable `period` bars whose buckets lie in
    /// `[oldest, latest]`, newest-first, reusing and extending the cache.
    ///
    /// `oldest` and `latest` are bucket starts. With `at_live_edge` the
    /// bucket at `latest` is still being filled and is left out; callers
    /// aggregate it fresh.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve<S: BarSource + ?Sized>(
        &mut self,
        source: &S,
        source_period: u32,
        clock: &BucketClock,
        period: u32,
        oldest: i64,
        latest: i64,
        at_live_edge: bool,
    ) -> Vec<Bar> {
        let until = if at_live_edge {
            latest - 1
        } else {
            clock.next_bucket_start(period, latest) - 1
        };
        if oldest > until {
            return Vec::new();
        }

        let mut entry = match self.entry.take() {
            Some(entry) if entry.period == period => Some(entry),
            Some(entry) => rebucket(entry, period, clock),
            None => None,
        };

        if let Some(cached) = entry.as_mut() {
            trim_to_source(cached, source);
        }
        if entry
            .as_ref()
            .is_some_and(|cached| !oldest_bucket_complete(cached, source))
        {
            info!(period, oldest, "Resample cache cannot reach back; rebuilding");
            entry = None;
        }

        let mut entry = match entry {
            Some(cached) if !cached.is_empty() => cached,
            _ => {
                debug!(period, oldest, until, "Building resample cache");
                aggregate(source, source_period, period, clock, oldest, until)
            }
        };

        extend_newer(&mut entry, source, source_period, clock, until);
        extend_older(&mut entry, source, source_period, clock, oldest);

        let bars = &entry.bars;
        let start = bars.partition_point(|bar| bar.time > until);
        let end = bars.partition_point(|bar| bar.time >= oldest);
        let window = bars[start..end.max(start)].to_vec();

        self.entry = Some(entry);
        window
    }
}

/// Drops cached buckets that reach below the source's oldest record.
///
/// Once the source evicts records the cache consumed, the oldest cached
/// buckets hold more than the source can reproduce. Keeping only buckets
/// that start at or after the source tail lets the next older extension
/// recompute the straddling bucket from what the source still has.
fn trim_to_source<S: BarSource + ?Sized>(entry: &mut Bars, source: &S) {
    let Some(tail) = source.len().checked_sub(1).map(|i| source.bar(i).time) else {
        entry.bars.clear();
        return;
    };
    if tail <= entry.low_water_mark.saturating_add(1) {
        return;
    }
    let keep = entry.bars.partition_point(|bar| bar.time >= tail);
    if keep < entry.bars.len() {
        debug!(
            period = entry.period,
            dropped = entry.bars.len() - keep,
            "Trimming resample cache to the source tail"
        );
        entry.bars.truncate(keep);
    }
    entry.low_water_mark = tail - 1;
}

/// False when the oldest cached bucket was aggregated from a source that
/// started partway through it and the source has since grown older records:
/// that bucket is incomplete and extending below it would be wrong.
fn oldest_bucket_complete<S: BarSource + ?Sized>(cached: &Bars, source: &S) -> bool {
    let Some(oldest_bar) = cached.oldest() else {
        return true;
    };
    if cached.low_water_mark < oldest_bar.time {
        return true;
    }
    let tail = source.len().checked_sub(1).map(|i| source.bar(i).time);
    tail.is_none_or(|tail| tail > cached.low_water_mark)
}

/// Prepends stable buckets that became available since the cache was filled.
fn extend_newer<S: BarSource + ?Sized>(
    entry: &mut Bars,
    source: &S,
    source_period: u32,
    clock: &BucketClock,
    until: i64,
) {
    let Some(newest) = entry.newest() else {
        return;
    };
    let from = clock.next_bucket_start(entry.period, newest.time);
    if from > until {
        return;
    }
    let fresh = aggregate(source, source_period, entry.period, clock, from, until);
    if fresh.is_empty() {
        return;
    }
    debug!(
        period = entry.period,
        added = fresh.len(),
        "Extending resample cache at the newer end"
    );
    entry.bars = seam_merge(fresh.bars, &entry.bars);
}

/// Appends older buckets below the cache's low-water mark.
fn extend_older<S: BarSource + ?Sized>(
    entry: &mut Bars,
    source: &S,
    source_period: u32,
    clock: &BucketClock,
    oldest: i64,
) {
    let Some(oldest_cached) = entry.oldest() else {
        return;
    };
    if oldest_cached.time <= oldest {
        return;
    }
    let older = aggregate(
        source,
        source_period,
        entry.period,
        clock,
        oldest,
        oldest_cached.time - 1,
    );
    if older.is_empty() {
        return;
    }
    debug!(
        period = entry.period,
        added = older.len(),
        "Extending resample cache at the older end"
    );
    let mut bars = std::mem::take(&mut entry.bars);
    bars = seam_merge(bars, &older.bars);
    entry.bars = bars;
    entry.low_water_mark = older.low_water_mark;
}

/// Whether `to`-minute buckets are exact unions of `from`-minute buckets on
/// the local calendar.
pub fn rebucketable(from: u32, to: u32) -> bool {
    from > 0 && to > from && to % from == 0 && (to < DAY_MINUTES || DAY_MINUTES % from == 0)
}

/// Re-derives a cache entry at a coarser period from its own bars.
///
/// Only buckets fully covered by the cached bars survive: the oldest and
/// newest coarse buckets are dropped when they extend past the cached range.
fn rebucket(entry: Bars, period: u32, clock: &BucketClock) -> Option<Bars> {
    if !rebucketable(entry.period, period) {
        info!(
            from = entry.period,
            to = period,
            "Period change cannot reuse cached bars; rebuilding"
        );
        return None;
    }
    let (newest, oldest) = (*entry.newest()?, *entry.oldest()?);
    let mut coarse = aggregate(
        &entry.bars,
        entry.period,
        period,
        clock,
        oldest.time,
        newest.time,
    );
    let cached_end = clock.next_bucket_start(entry.period, newest.time);
    if coarse
        .newest()
        .is_some_and(|bar| clock.next_bucket_start(period, bar.time) > cached_end)
    {
        coarse.bars.remove(0);
    }
    if coarse.oldest().is_some_and(|bar| bar.time < oldest.time) {
        coarse.bars.pop();
    }
    coarse.low_water_mark = coarse
        .oldest()
        .map_or(entry.low_water_mark, |bar| bar.time - 1)
        .max(entry.low_water_mark);
    info!(
        from = entry.period,
        to = period,
        bars = coarse.len(),
        "Re-bucketed resample cache"
    );
    Some(coarse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MINUTE_MS;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const T0: i64 = 1_705_312_800_000; // 2024-01-15 10:00 UTC

    /// Newest-first minute bars covering `n` minutes from T0.
    fn minutes(n: i64) -> Vec<Bar> {
        (0..n)
            .rev()
            .map(|i| Bar {
                high: Decimal::from(101 + i % 7),
                low: Decimal::from(99 - i % 5),
                volume: dec!(1),
                ..Bar::flat(T0 + i * MINUTE_MS, dec!(100))
            })
            .collect()
    }

    fn at(minute: i64) -> i64 {
        T0 + minute * MINUTE_MS
    }

    #[test]
    fn cold_resolve_matches_direct_aggregation() {
        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();

        let bars = cache.resolve(&source, 1, &clock, 5, at(20), at(100), false);
        let direct = aggregate(&source, 1, 5, &clock, at(20), at(105) - 1);
        assert_eq!(bars, direct.bars);
        assert_eq!(bars.len(), 17);
        assert_eq!(cache.period(), Some(5));
    }

    #[test]
    fn live_edge_bucket_is_left_out() {
        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();

        let bars = cache.resolve(&source, 1, &clock, 5, at(60), at(115), true);
        assert_eq!(bars.first().map(|b| b.time), Some(at(110)));
        assert!(cache.bars().iter().all(|b| b.time < at(115)));
    }

    #[test]
    fn scrolling_back_extends_the_older_end() {
        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();

        cache.resolve(&source, 1, &clock, 5, at(60), at(110), false);
        let before = cache.bars().len();
        let bars = cache.resolve(&source, 1, &clock, 5, at(55), at(105), false);

        assert_eq!(cache.bars().len(), before + 1);
        assert_eq!(bars.last().map(|b| b.time), Some(at(55)));
        assert_eq!(cache.low_water_mark(), Some(at(55) - 1));
        let direct = aggregate(&source, 1, 5, &clock, at(55), at(110) - 1);
        assert_eq!(bars, direct.bars);
    }

    #[test]
    fn advancing_edge_extends_the_newer_end() {
        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();

        cache.resolve(&source, 1, &clock, 5, at(50), at(100), true);
        assert_eq!(cache.bars().first().map(|b| b.time), Some(at(95)));
        let bars = cache.resolve(&source, 1, &clock, 5, at(55), at(105), true);

        assert_eq!(bars.first().map(|b| b.time), Some(at(100)));
        assert_eq!(cache.bars().first().map(|b| b.time), Some(at(100)));
        let direct = aggregate(&source, 1, 5, &clock, at(55), at(105) - 1);
        assert_eq!(bars, direct.bars);
    }

    #[test]
    fn period_change_rebuckets_from_cached_bars() {
        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();

        cache.resolve(&source, 1, &clock, 5, at(0), at(115), true);
        let bars = cache.resolve(&source, 1, &clock, 15, at(0), at(105), true);

        let direct = aggregate(&source, 1, 15, &clock, at(0), at(105) - 1);
        assert_eq!(bars, direct.bars);
        assert_eq!(cache.period(), Some(15));
    }

    #[test]
    fn rebucket_drops_partial_edges() {
        let clock = BucketClock::utc();
        let five = aggregate(&minutes(120), 1, 5, &clock, at(5), at(100) - 1);
        let coarse = rebucket(five, 15, &clock).unwrap();
        let times: Vec<i64> = coarse.bars.iter().map(|b| b.time).collect();
        // 5..=95 in 5-minute bars: 00:00 lacks its first third, 90:00 its last.
        assert_eq!(times, vec![at(75), at(60), at(45), at(30), at(15)]);
    }

    #[test]
    fn incompatible_period_change_rebuilds() {
        assert!(rebucketable(5, 15));
        assert!(!rebucketable(15, 5));
        assert!(!rebucketable(7, 20));
        assert!(!rebucketable(7, 2_800));
        assert!(rebucketable(60, 2_880));

        let source = minutes(120);
        let clock = BucketClock::utc();
        let mut cache = ResampleCache::new();
        cache.resolve(&source, 1, &clock, 7, at(0), at(112), false);
        let bars = cache.resolve(&source, 1, &clock, 20, at(0), at(100), false);
        assert_eq!(bars, aggregate(&source, 1, 20, &clock, at(0), at(120) - 1).bars);
    }

    #[test]
    fn evicted_source_records_trim_the_cache() {
        let clock = BucketClock::utc();
        let full = minutes(120);
        let mut cache = ResampleCache::new();
        cache.resolve(&full, 1, &clock, 5, at(0), at(50), false);

        let mut evicted = full.clone();
        evicted.truncate(117); // oldest record is now 00:03
        let bars = cache.resolve(&evicted, 1, &clock, 5, at(0), at(50), false);
        assert_eq!(bars, aggregate(&evicted, 1, 5, &clock, at(0), at(55) - 1).bars);
        assert_eq!(bars.last().map(|b| b.volume), Some(dec!(2)));
    }

    #[test]
    fn partial_oldest_bucket_rebuilds_once_source_grows() {
        let clock = BucketClock::utc();
        let mut short = minutes(120);
        short.truncate(118); // source starts at 00:02, mid-bucket
        let mut cache = ResampleCache::new();
        cache.resolve(&short, 1, &clock, 5, at(0), at(50), false);
        assert_eq!(cache.bars().last().map(|b| b.time), Some(at(0)));

        let full = minutes(120);
        let bars = cache.resolve(&full, 1, &clock, 5, at(0), at(50), false);
        assert_eq!(bars, aggregate(&full, 1, 5, &clock, at(0), at(55) - 1).bars);
    }
}
