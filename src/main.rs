use std::time::Duration;

use chrono::Utc;
use ohlcache::OhlcError;
use ohlcache::chart::{BackfillRequest, BackfillResponse, Chart};
use ohlcache::clock::MINUTE_MS;
use ohlcache::config::fetch_config;
use ohlcache::engine::Engine;
use ohlcache::models::{Bar, Tick};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

const FEED_INTERVAL_MS: u64 = 250;
const REDRAW_INTERVAL_MS: u64 = 1_000;
const REDRAWS: usize = 30;
const PERIOD: u32 = 5;
const BAR_COUNT: usize = 120;
/// Pages of history the synthetic source serves before reporting the origin.
const HISTORY_PAGES: usize = 3;
const PAGE_SIZE: usize = 240;

enum Message {
    Feed,
    Redraw,
    History(BackfillResponse),
}

#[tokio::main]
async fn main() -> Result<(), OhlcError> {
    tracing_subscriber::fmt::init();

    let config = fetch_config()?;
    let mut engine = Engine::new(&config)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let history = spawn_history_source(tx.clone());
    spawn_timer(tx.clone(), FEED_INTERVAL_MS, || Message::Feed);
    spawn_timer(tx, REDRAW_INTERVAL_MS, || Message::Redraw);

    let mut step: i64 = 0;
    let mut redraws = 0;
    let mut in_flight = false;

    loop {
        let message = tokio::select! {
            message = rx.recv() => message,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(message) = message else { break };

        match message {
            Message::Feed => {
                step += 1;
                for slot in 0..engine.charts().len() {
                    engine.push_tick(slot, synthetic_tick(step, slot))?;
                }
            }
            Message::Redraw => {
                redraws += 1;
                for slot in 0..engine.charts().len() {
                    let window = engine.get_bars(slot, PERIOD, 0, BAR_COUNT)?;
                    if let Some(bar) = window.bars.newest() {
                        info!(
                            slot,
                            bars = window.bars.len(),
                            open = %bar.open,
                            high = %bar.high,
                            low = %bar.low,
                            close = %bar.close,
                            delta = %engine.chart(slot)?.tick_delta(),
                            "Redraw"
                        );
                    }
                    if window.more_history_needed && !in_flight {
                        let request =
                            engine.backfill_request(slot, Chart::source_for(PERIOD))?;
                        in_flight = history.send(request).is_ok();
                    }
                }
                if redraws >= REDRAWS {
                    break;
                }
            }
            Message::History(response) => {
                in_flight = false;
                let outcome = engine.apply_backfill(response)?;
                info!(?outcome, "Backfill applied");
            }
        }
    }

    info!(redraws, "Shutting down");
    Ok(())
}

/// Spawns a task that sends `make()` every `interval_ms`.
fn spawn_timer(
    tx: mpsc::UnboundedSender<Message>,
    interval_ms: u64,
    make: fn() -> Message,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            if tx.send(make()).is_err() {
                break;
            }
        }
    });
}

/// Spawns an in-process history source answering backfill requests with
/// synthetic minute or hour bars.
fn spawn_history_source(
    tx: mpsc::UnboundedSender<Message>,
) -> mpsc::UnboundedSender<BackfillRequest> {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<BackfillRequest>();
    tokio::spawn(async move {
        let mut served = 0;
        while let Some(request) = request_rx.recv().await {
            let bars = if served < HISTORY_PAGES {
                served += 1;
                synthetic_history(&request)
            } else {
                Vec::new()
            };
            tokio::time::sleep(Duration::from_millis(50)).await;
            if tx
                .send(Message::History(BackfillResponse::answer(&request, bars)))
                .is_err()
            {
                break;
            }
        }
        warn!("History source stopped");
    });
    request_tx
}

fn synthetic_history(request: &BackfillRequest) -> Vec<Bar> {
    let step = i64::from(request.resolution.minutes()) * MINUTE_MS;
    let before = request
        .before
        .unwrap_or_else(|| Utc::now().timestamp_millis() / step * step);
    let count = request.limit.min(PAGE_SIZE);
    (1..=count)
        .map(|i| {
            let i = i64::try_from(i).unwrap_or(i64::MAX);
            let price = wave(i);
            Bar {
                high: price + Decimal::ONE,
                low: price - Decimal::ONE,
                volume: Decimal::new(15, 1),
                ..Bar::flat(before - i * step, price)
            }
        })
        .collect()
}

fn synthetic_tick(step: i64, slot: usize) -> Tick {
    let slot = i64::try_from(slot).unwrap_or(0);
    let volume = Decimal::new(step % 240 + 1, 2);
    Tick {
        time: Utc::now().timestamp_millis(),
        price: wave(step) + Decimal::from(slot * 100),
        volume,
        ask_depth: Decimal::new(42, 0),
        bid_depth: Decimal::new(37, 0),
        sell_volume: volume / Decimal::TWO,
        buy_volume: volume / Decimal::TWO,
    }
}

/// A bounded saw-tooth around 10 000.
fn wave(step: i64) -> Decimal {
    Decimal::new(1_000_000 + (step % 40 - 20) * 25, 2)
}
