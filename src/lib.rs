//! OHLCV resampling and caching for interactive charts.
//!
//! Each chart slot stores live ticks plus minute and hour bars, and answers
//! requests for bars of any period by aggregating those series on the local
//! calendar. Stable buckets are cached per slot so panning and period changes
//! stay cheap; the bucket still being filled is recomputed on every request.

pub mod aggregate;
pub mod cache;
pub mod chart;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod series;

pub use chart::{Chart, Window};
pub use engine::Engine;
pub use error::{OhlcError, Result};
