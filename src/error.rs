//! Crate-level error types.
//!
//! [`OhlcError`] unifies every error source (configuration, rejected
//! requests, JSON) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation. Short or stale bar windows are never errors; they surface as
//! data (see [`Window`](crate::chart::Window)).

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OhlcError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum OhlcError {
    /// A configuration file could not be read, parsed, or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// A bar request violated a precondition. No partial result is produced.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The requested chart slot does not exist.
    #[error("unknown chart slot {0}")]
    UnknownSlot(usize),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reason a request was rejected before any work was done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A window of zero bars was requested.
    ZeroCount,
    /// The requested period is finer than the finest stored resolution.
    PeriodBelowResolution { period: u32, native: u32 },
    /// Ticks cannot be backfilled or bulk-replaced; only bars can.
    TickHistory,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCount => write!(f, "bar count must be positive"),
            Self::PeriodBelowResolution { period, native } => {
                write!(
                    f,
                    "period {period}m is finer than the native resolution of {native}m"
                )
            }
            Self::TickHistory => write!(f, "tick series only accepts live samples"),
        }
    }
}

impl std::error::Error for RequestError {}
