//! Shared models for samples, bars and the native resolutions they are
//! stored at.

pub mod bar;
pub mod tick;

use serde::{Deserialize, Serialize};

pub use bar::{Bar, Bars};
pub use tick::Tick;

/// A granularity at which samples are actually stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Tick,
    Minute,
    Hour,
}

impl Resolution {
    /// Bucket width in minutes (`0` for ticks).
    pub const fn minutes(self) -> u32 {
        match self {
            Resolution::Tick => 0,
            Resolution::Minute => 1,
            Resolution::Hour => 60,
        }
    }

    /// Returns the wire name used in backfill messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Tick => "tick",
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
        }
    }
}
