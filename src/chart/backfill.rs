//! Historical backfill messages exchanged with an external history source.
//!
//! A chart hands out a [`BackfillRequest`] for one native bar series; the
//! answer comes back as a [`BackfillResponse`] carrying the generation it was
//! requested under. Answers for an older generation belong to a previous
//! instrument and are dropped.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Chart;
use crate::error::RequestError;
use crate::models::{Bar, Resolution};

/// Asks for bars of one native resolution older than `before`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillRequest {
    pub slot: usize,
    pub generation: u64,
    pub resolution: Resolution,
    /// Oldest bar time currently held; `None` when the series is empty and
    /// the newest history is wanted.
    pub before: Option<i64>,
    /// Room left in the series.
    pub limit: usize,
}

/// Bars returned by a history source. An empty `bars` marks the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillResponse {
    pub slot: usize,
    pub generation: u64,
    pub resolution: Resolution,
    pub bars: Vec<Bar>,
}

impl BackfillResponse {
    /// Answers `request` with `bars`.
    pub fn answer(request: &BackfillRequest, bars: Vec<Bar>) -> Self {
        Self {
            slot: request.slot,
            generation: request.generation,
            resolution: request.resolution,
            bars,
        }
    }
}

/// What applying a [`BackfillResponse`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Older bars were appended to the series.
    Merged { appended: usize },
    /// Nothing older exists; the series will not ask again.
    Exhausted,
    /// The series had no room left, so nothing was merged. The origin may
    /// still lie further back.
    Full,
    /// The response was for an earlier generation and was ignored.
    Stale { expected: u64, received: u64 },
}

impl Chart {
    /// Builds the request that extends `resolution` further into the past.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TickHistory`] for the tick series.
    pub fn backfill_request(
        &self,
        resolution: Resolution,
    ) -> Result<BackfillRequest, RequestError> {
        let series = self
            .store
            .bars(resolution)
            .ok_or(RequestError::TickHistory)?;
        Ok(BackfillRequest {
            slot: self.slot,
            generation: self.generation,
            resolution,
            before: series.tail().map(|bar| bar.time),
            limit: series.capacity().saturating_sub(series.len()),
        })
    }

    /// Merges a history response below the current tail of its series.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::TickHistory`] for a current-generation
    /// response addressed to the tick series.
    pub fn apply_backfill(
        &mut self,
        response: BackfillResponse,
    ) -> Result<BackfillOutcome, RequestError> {
        if response.generation != self.generation {
            warn!(
                slot = self.slot,
                expected = self.generation,
                received = response.generation,
                "Dropping stale backfill response"
            );
            return Ok(BackfillOutcome::Stale {
                expected: self.generation,
                received: response.generation,
            });
        }

        let resolution = response.resolution;
        let appended = self.store.extend_history(resolution, response.bars)?;
        let full = self
            .store
            .bars(resolution)
            .is_some_and(|series| series.is_full());
        if appended == 0 && full {
            info!(
                slot = self.slot,
                resolution = resolution.as_str(),
                "Series full; backfill not merged"
            );
            return Ok(BackfillOutcome::Full);
        }
        if appended == 0 {
            info!(
                slot = self.slot,
                resolution = resolution.as_str(),
                "History origin reached"
            );
            self.mark_exhausted(resolution);
            return Ok(BackfillOutcome::Exhausted);
        }

        self.cache.clear();
        info!(
            slot = self.slot,
            resolution = resolution.as_str(),
            appended,
            "Merged backfill"
        );
        Ok(BackfillOutcome::Merged { appended })
    }
}
