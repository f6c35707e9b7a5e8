//! OHLCV bars and the fold rule that merges them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::tick::Tick;

/// A single OHLCV aggregate covering one bucket.
///
/// `ask_depth` and `bid_depth` are the last observed book depths, while
/// `sell_volume` and `buy_volume` accumulate across the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start in epoch milliseconds.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub ask_depth: Decimal,
    #[serde(default)]
    pub bid_depth: Decimal,
    #[serde(default)]
    pub sell_volume: Decimal,
    #[serde(default)]
    pub buy_volume: Decimal,
}

impl Bar {
    /// A zero-volume bar with every price at `price`.
    pub fn flat(time: i64, price: Decimal) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            ask_depth: Decimal::ZERO,
            bid_depth: Decimal::ZERO,
            sell_volume: Decimal::ZERO,
            buy_volume: Decimal::ZERO,
        }
    }

    /// A zero-range bar carrying the tick's running totals, stamped at `time`.
    pub fn from_tick(time: i64, tick: &Tick) -> Self {
        Self {
            time,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            volume: tick.volume,
            ask_depth: tick.ask_depth,
            bid_depth: tick.bid_depth,
            sell_volume: tick.sell_volume,
            buy_volume: tick.buy_volume,
        }
    }

    /// Returns a copy of this bar moved to another bucket start.
    #[must_use]
    pub fn rebased(&self, time: i64) -> Self {
        Self { time, ..*self }
    }

    /// Folds a chronologically later bar of the same bucket into this one.
    pub fn fold(&mut self, later: &Bar) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume += later.volume;
        self.ask_depth = later.ask_depth;
        self.bid_depth = later.bid_depth;
        self.sell_volume += later.sell_volume;
        self.buy_volume += later.buy_volume;
    }

    /// Applies a live tick that falls in this bar's bucket.
    ///
    /// Tick volumes are running totals within the bucket, so they replace
    /// rather than add.
    pub fn apply_tick(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.volume = tick.volume;
        self.ask_depth = tick.ask_depth;
        self.bid_depth = tick.bid_depth;
        self.sell_volume = tick.sell_volume;
        self.buy_volume = tick.buy_volume;
    }

    /// Checks `low <= open, close <= high` and a non-negative volume.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// A newest-first run of bars at one period, with chaining metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bars {
    pub bars: Vec<Bar>,
    /// Bucket width in minutes; `0` for tick bars.
    pub period: u32,
    /// The instant just before the oldest source record that was consumed.
    /// A follow-up request for anything at or before it never overlaps.
    pub low_water_mark: i64,
}

impl Bars {
    /// An empty result whose low-water mark is the requested oldest bound.
    pub fn empty(period: u32, oldest: i64) -> Self {
        Self {
            bars: Vec::new(),
            period,
            low_water_mark: oldest,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn newest(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn oldest(&self) -> Option<&Bar> {
        self.bars.last()
    }
}
