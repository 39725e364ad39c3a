// Per-step market snapshot consumed by the fusion engine.

use serde::{Deserialize, Serialize};

use crate::error::FusionError;

/// One time step of market data. Indicator values are opaque to the core;
/// only their count must stay constant across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub ts: u64,
    pub price: f64,
    pub period_return: f64,
    #[serde(default)]
    pub indicators: Vec<f64>,
}

impl MarketState {
    pub fn new(ts: u64, price: f64, period_return: f64) -> Self {
        Self { ts, price, period_return, indicators: Vec::new() }
    }

    pub fn with_indicators(mut self, indicators: Vec<f64>) -> Self {
        self.indicators = indicators;
        self
    }

    /// Width of `as_vector()`.
    pub fn width(&self) -> usize {
        2 + self.indicators.len()
    }

    /// `[price, period_return, indicators...]`
    pub fn as_vector(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(self.width());
        v.push(self.price);
        v.push(self.period_return);
        v.extend_from_slice(&self.indicators);
        v
    }
}

/// Check the market data contract: strictly increasing timestamps, a
/// uniform vector width and finite values throughout.
pub fn validate_sequence(states: &[MarketState]) -> Result<(), FusionError> {
    let Some(first) = states.first() else {
        return Ok(());
    };
    let width = first.width();
    for (idx, pair) in states.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.ts <= prev.ts {
            return Err(FusionError::InvalidInput(format!(
                "non_monotonic_ts at index {}: prev={} current={}",
                idx + 1,
                prev.ts,
                next.ts
            )));
        }
        if next.width() != width {
            return Err(FusionError::InvalidInput(format!(
                "width mismatch at index {}: expected {} got {}",
                idx + 1,
                width,
                next.width()
            )));
        }
    }
    for (idx, s) in states.iter().enumerate() {
        if !s.price.is_finite() || !s.period_return.is_finite() || s.indicators.iter().any(|x| !x.is_finite()) {
            return Err(FusionError::InvalidInput(format!("non-finite value at index {}", idx)));
        }
    }
    Ok(())
}
