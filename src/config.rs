//! Engine configuration loaded from a JSON file and environment variables.
//!
//! Every field has a default, so the engine runs without any configuration:
//! - `OHLCACHE_CONFIG`: optional path to a JSON configuration file
//! - `OHLCACHE_UTC_OFFSET_MINUTES`: overrides the calendar offset used for
//!   bucket boundaries (defaults to the host's local offset)

use std::path::Path;

use serde::Deserialize;

use crate::clock::{BucketClock, DAY_MINUTES};

const DEFAULT_CHART_COUNT: usize = 1;
const DEFAULT_MAX_TICKS: usize = 250;
const DEFAULT_MAX_MINUTE_BARS: usize = 10_000;
const DEFAULT_MAX_HOUR_BARS: usize = 10_000;
const DEFAULT_TICK_INTERVAL_MS: i64 = 1_000;

/// Sizing and calendar settings shared by every chart slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of independent chart slots.
    pub chart_count: usize,
    /// Titles for the slots, by index. Missing titles become "Untitled".
    pub chart_titles: Vec<String>,
    /// Maximum retained ticks per slot.
    pub max_ticks: usize,
    /// Maximum retained minute bars per slot.
    pub max_minute_bars: usize,
    /// Maximum retained hour bars per slot.
    pub max_hour_bars: usize,
    /// Ticks closer than this to the previous stored tick update the bars
    /// but are not stored themselves.
    pub tick_interval_ms: i64,
    /// Calendar offset east of UTC; the host's local offset when unset.
    pub utc_offset_minutes: Option<i32>,
    /// Whether slots keep a tick series (required for tick mode).
    pub tick_storage: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chart_count: DEFAULT_CHART_COUNT,
            chart_titles: Vec::new(),
            max_ticks: DEFAULT_MAX_TICKS,
            max_minute_bars: DEFAULT_MAX_MINUTE_BARS,
            max_hour_bars: DEFAULT_MAX_HOUR_BARS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            utc_offset_minutes: None,
            tick_storage: true,
        }
    }
}

impl EngineConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::OhlcError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects capacities of zero and offsets a day or more from UTC.
    ///
    /// # Errors
    ///
    /// Returns [`OhlcError::Config`](crate::OhlcError::Config) naming the
    /// offending field.
    pub fn validate(&self) -> crate::Result<()> {
        let capacities = [
            ("chart_count", self.chart_count),
            ("max_ticks", self.max_ticks),
            ("max_minute_bars", self.max_minute_bars),
            ("max_hour_bars", self.max_hour_bars),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(crate::OhlcError::Config(format!("{name} must be positive")));
            }
        }
        if self.tick_interval_ms < 0 {
            return Err(crate::OhlcError::Config(
                "tick_interval_ms must not be negative".to_string(),
            ));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.unsigned_abs() >= DAY_MINUTES {
                return Err(crate::OhlcError::Config(format!(
                    "utc_offset_minutes {minutes} is not within a day of UTC"
                )));
            }
        }
        Ok(())
    }

    /// Returns the bucket clock for the configured offset.
    pub fn clock(&self) -> BucketClock {
        self.utc_offset_minutes
            .and_then(BucketClock::from_offset_minutes)
            .unwrap_or_else(BucketClock::local)
    }

    /// Returns the title of slot `index`.
    pub fn title(&self, index: usize) -> &str {
        self.chart_titles
            .get(index)
            .map(String::as_str)
            .unwrap_or("Untitled")
    }
}

/// Loads the engine configuration from the environment.
///
/// Reads the file named by `OHLCACHE_CONFIG` if set, otherwise starts from
/// defaults, then applies `OHLCACHE_UTC_OFFSET_MINUTES`.
///
/// # Errors
///
/// Returns [`OhlcError::Config`](crate::OhlcError::Config) if the file cannot
/// be loaded or the offset is not an integer within a day of UTC.
pub fn fetch_config() -> crate::Result<EngineConfig> {
    let mut config = match non_empty_var("OHLCACHE_CONFIG") {
        Some(path) => EngineConfig::load(Path::new(&path))?,
        None => EngineConfig::default(),
    };

    if let Some(raw) = non_empty_var("OHLCACHE_UTC_OFFSET_MINUTES") {
        let minutes = raw.trim().parse::<i32>().map_err(|e| {
            crate::OhlcError::Config(format!("OHLCACHE_UTC_OFFSET_MINUTES={raw}: {e}"))
        })?;
        config.utc_offset_minutes = Some(minutes);
    }

    config.validate()?;
    Ok(config)
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}
