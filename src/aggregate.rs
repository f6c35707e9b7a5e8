//! Folding native series into coarser bars.
//!
//! Everything here is a pure function of its arguments: the source series,
//! its native period, the target period, the clock and the time window.

use std::collections::VecDeque;

use crate::clock::{BucketClock, DAY_MINUTES, index_for_time};
use crate::models::{Bar, Bars};

/// Random access to a newest-first run of bars.
pub trait BarSource {
    fn len(&self) -> usize;

    /// Returns the bar at `index`, where `0` is the newest.
    fn bar(&self, index: usize) -> &Bar;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BarSource for [Bar] {
    fn len(&self) -> usize {
        <[Bar]>::len(self)
    }

    fn bar(&self, index: usize) -> &Bar {
        &self[index]
    }
}

impl BarSource for Vec<Bar> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn bar(&self, index: usize) -> &Bar {
        &self[index]
    }
}

impl BarSource for VecDeque<Bar> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn bar(&self, index: usize) -> &Bar {
        &self[index]
    }
}

/// Counts the records strictly newer than `instant`.
///
/// Uniform spacing bounds the binary search to the first
/// [`index_for_time`] + 1 records; a source whose spacing is irregular
/// (periods that do not divide a day) is searched in full.
pub fn newer_than<S: BarSource + ?Sized>(source: &S, source_period: u32, instant: i64) -> usize {
    let len = source.len();
    if len == 0 {
        return 0;
    }
    let uniform = source_period > 0 && DAY_MINUTES % source_period == 0;
    let bound = if uniform {
        index_for_time(source.bar(0).time, source_period, instant)
            .saturating_add(1)
            .min(len)
    } else {
        len
    };
    let found = search(source, 0, bound, instant);
    if found == bound && bound < len {
        search(source, bound, len, instant)
    } else {
        found
    }
}

fn search<S: BarSource + ?Sized>(source: &S, mut lo: usize, mut hi: usize, instant: i64) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if source.bar(mid).time > instant {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Aggregates `source` into `target_period` bars over `[oldest, latest]`.
///
/// Records are walked oldest to newest; a bucket change opens a bar seeded
/// from the record, anything else folds into the open bar. The result is
/// newest-first. An impossible request (target finer than the source, or an
/// inverted window) and a window with no records both yield an empty result
/// whose low-water mark is `oldest`.
pub fn aggregate<S: BarSource + ?Sized>(
    source: &S,
    source_period: u32,
    target_period: u32,
    clock: &BucketClock,
    oldest: i64,
    latest: i64,
) -> Bars {
    if source_period > target_period || oldest > latest {
        return Bars::empty(target_period, oldest);
    }

    let newest_index = newer_than(source, source_period, latest);
    let end = newer_than(source, source_period, oldest.saturating_sub(1));
    if newest_index >= end {
        return Bars::empty(target_period, oldest);
    }
    let low_water_mark = source.bar(end - 1).time - 1;

    if source_period == target_period {
        let bars = (newest_index..end).map(|i| *source.bar(i)).collect();
        return Bars {
            bars,
            period: target_period,
            low_water_mark,
        };
    }

    let mut bars: Vec<Bar> = Vec::new();
    for index in (newest_index..end).rev() {
        let record = source.bar(index);
        let bucket = clock.bucket_start(target_period, record.time);
        match bars.last_mut() {
            Some(open) if open.time == bucket => open.fold(record),
            _ => bars.push(record.rebased(bucket)),
        }
    }
    bars.reverse();

    Bars {
        bars,
        period: target_period,
        low_water_mark,
    }
}

/// Joins a newer run of bars onto an older one, both newest-first.
///
/// When the oldest bar of `newer` and the newest bar of `older` share a
/// bucket, the newer bar is folded into the older one and the duplicate is
/// dropped.
pub fn seam_merge(mut newer: Vec<Bar>, older: &[Bar]) -> Vec<Bar> {
    let shared = match (newer.last(), older.first()) {
        (Some(n), Some(o)) if n.time == o.time => {
            let mut joined = *o;
            joined.fold(n);
            Some(joined)
        }
        _ => None,
    };
    match shared {
        Some(joined) => {
            newer.pop();
            newer.reserve(older.len());
            newer.push(joined);
            newer.extend_from_slice(&older[1..]);
        }
        None => newer.extend_from_slice(older),
    }
    newer
}
