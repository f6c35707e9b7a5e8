//! Live trade samples.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One sample from the live feed.
///
/// `volume`, `sell_volume` and `buy_volume` are running totals within the
/// current minute, as published by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Trade time in epoch milliseconds.
    pub time: i64,
    pub price: Decimal,
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
