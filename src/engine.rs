//! The engine owns every chart slot and routes requests to them by index.

use tracing::info;

use crate::chart::{BackfillOutcome, BackfillRequest, BackfillResponse, Chart, Window};
use crate::clock::BucketClock;
use crate::config::EngineConfig;
use crate::models::{Bar, Resolution, Tick};
use crate::{OhlcError, Result};

#[derive(Debug, Clone)]
pub struct Engine {
    clock: BucketClock,
    charts: Vec<Chart>,
}

impl Engine {
    /// Builds `config.chart_count` empty slots sharing one clock.
    ///
    /// # Errors
    ///
    /// Returns [`OhlcError::Config`] if `config` fails validation.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let clock = config.clock();
        let charts = (0..config.chart_count)
            .map(|slot| Chart::new(slot, config, clock))
            .collect();
        info!(
            charts = config.chart_count,
            utc_offset_seconds = clock.offset().local_minus_utc(),
            "Engine ready"
        );
        Ok(Self { clock, charts })
    }

    pub fn clock(&self) -> &BucketClock {
        &self.clock
    }

    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] if `slot` is out of range.
    pub fn chart(&self, slot: usize) -> Result<&Chart> {
        self.charts.get(slot).ok_or(OhlcError::UnknownSlot(slot))
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] if `slot` is out of range.
    pub fn chart_mut(&mut self, slot: usize) -> Result<&mut Chart> {
        self.charts.get_mut(slot).ok_or(OhlcError::UnknownSlot(slot))
    }

    /// Returns up to `count` bars of `period` minutes for `slot`, ending
    /// `offset` buckets before the live one.
    ///
    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] or [`OhlcError::InvalidRequest`].
    pub fn get_bars(
        &mut self,
        slot: usize,
        period: u32,
        offset: usize,
        count: usize,
    ) -> Result<Window> {
        Ok(self.chart_mut(slot)?.bars(period, offset, count)?)
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] if `slot` is out of range.
    pub fn push_tick(&mut self, slot: usize, tick: Tick) -> Result<()> {
        self.chart_mut(slot)?.push_tick(tick);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] or, for the tick series,
    /// [`OhlcError::InvalidRequest`].
    pub fn replace_bars(
        &mut self,
        slot: usize,
        resolution: Resolution,
        bars: Vec<Bar>,
    ) -> Result<()> {
        Ok(self.chart_mut(slot)?.replace_bars(resolution, bars)?)
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] if `slot` is out of range.
    pub fn reset(&mut self, slot: usize, title: impl Into<String>) -> Result<()> {
        self.chart_mut(slot)?.reset(title);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] or, for the tick series,
    /// [`OhlcError::InvalidRequest`].
    pub fn backfill_request(&self, slot: usize, resolution: Resolution) -> Result<BackfillRequest> {
        Ok(self.chart(slot)?.backfill_request(resolution)?)
    }

    /// Routes a history response to the slot it was requested for.
    ///
    /// # Errors
    ///
    /// Returns [`OhlcError::UnknownSlot`] or, for the tick series,
    /// [`OhlcError::InvalidRequest`].
    pub fn apply_backfill(&mut self, response: BackfillResponse) -> Result<BackfillOutcome> {
        Ok(self.chart_mut(response.slot)?.apply_backfill(response)?)
    }

    /// Whether any slot's last bar request came back short.
    pub fn has_depleted(&self) -> bool {
        self.charts.iter().any(Chart::has_depleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;

    fn engine(charts: usize) -> Engine {
        let config = EngineConfig {
            chart_count: charts,
            chart_titles: vec!["BTC_JPY".to_string()],
            utc_offset_minutes: Some(0),
            ..EngineConfig::default()
        };
        Engine::new(&config).unwrap()
    }

    #[test]
    fn builds_titled_slots() {
        let engine = engine(2);
        assert_eq!(engine.charts().len(), 2);
        assert_eq!(engine.chart(0).unwrap().title(), "BTC_JPY");
        assert_eq!(engine.chart(1).unwrap().title(), "Untitled");
        assert_eq!(engine.clock(), &BucketClock::utc());
    }

    #[test]
    fn unknown_slot_is_an_error() {
        let mut engine = engine(1);
        let err = engine.get_bars(3, 5, 0, 10).unwrap_err();
        assert!(matches!(err, OhlcError::UnknownSlot(3)));
    }

    #[test]
    fn invalid_request_is_wrapped() {
        let mut engine = engine(1);
        let err = engine.get_bars(0, 5, 0, 0).unwrap_err();
        assert!(matches!(
            err,
            OhlcError::InvalidRequest(RequestError::ZeroCount)
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            chart_count: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(Engine::new(&config), Err(OhlcError::Config(_))));
    }
}
