//! Shared test utilities and constants.
#![allow(dead_code)]

use ohlcache::Engine;
use ohlcache::clock::MINUTE_MS;
use ohlcache::config::EngineConfig;
use ohlcache::models::{Bar, Tick};
use rust_decimal::Decimal;

/// 2024-01-15 10:00 UTC.
pub const T0: i64 = 1_705_312_800_000;

/// Minute bars 10:00..10:04 of the five-minute scenario, oldest first.
pub const MINUTE_BARS_JSON: &str = include_str!("../fixtures/minute_bars.json");

/// Returns `T0` shifted by `minutes`.
pub fn at(minutes: i64) -> i64 {
    T0 + minutes * MINUTE_MS
}

/// A one-slot engine on the UTC calendar.
pub fn utc_engine() -> Engine {
    engine_with(EngineConfig::default())
}

/// An engine on the UTC calendar with otherwise custom settings.
pub fn engine_with(config: EngineConfig) -> Engine {
    let config = EngineConfig {
        utc_offset_minutes: Some(config.utc_offset_minutes.unwrap_or(0)),
        ..config
    };
    Engine::new(&config).expect("Failed to build engine")
}

pub fn scenario_minutes() -> Vec<Bar> {
    serde_json::from_str(MINUTE_BARS_JSON).expect("Failed to deserialize minute bars")
}

/// `n` contiguous minute bars from `T0`, oldest first, with uneven prices
/// and volumes.
pub fn wavy_minutes(n: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let open = Decimal::from(1_000 + (i * 37) % 23);
            let close = Decimal::from(1_000 + (i * 53) % 29);
            Bar {
                time: at(i),
                open,
                high: open.max(close) + Decimal::from(i % 3),
                low: open.min(close) - Decimal::from(i % 4),
                close,
                volume: Decimal::from(i % 5 + 1),
                ask_depth: Decimal::from(i % 7),
                bid_depth: Decimal::from(i % 11),
                sell_volume: Decimal::from(i % 2),
                buy_volume: Decimal::from(i % 5 + 1 - i % 2),
            }
        })
        .collect()
}

/// A tick whose running minute volume is `volume`.
pub fn tick(time: i64, price: Decimal, volume: Decimal) -> Tick {
    Tick {
        time,
        price,
        volume,
        ask_depth: Decimal::ONE,
        bid_depth: Decimal::ONE,
        sell_volume: Decimal::ZERO,
        buy_volume: volume,
    }
}
