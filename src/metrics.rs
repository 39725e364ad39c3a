use serde::Serialize;

use crate::decision::Decision;
use crate::engine::SimulationResult;

const STD_EPSILON: f64 = 1e-9;

/// Step returns of a balance series. A step starting from a zero balance
/// contributes a zero return.
pub fn step_returns(history: &[f64]) -> Vec<f64> {
    history
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
        .collect()
}

/// Mean excess step return over its (population) standard deviation.
pub fn sharpe_ratio(history: &[f64], risk_free_rate: f64) -> f64 {
    let returns = step_returns(history);
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean - risk_free_rate) / (var.sqrt() + STD_EPSILON)
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(history: &[f64]) -> f64 {
    let Some(&first) = history.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd: f64 = 0.0;
    for &x in history {
        if x > peak {
            peak = x;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - x) / peak);
        }
    }
    max_dd
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub profile: String,
    pub steps: usize,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub profit: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub buys: usize,
    pub sells: usize,
    pub holds: usize,
    pub clipped_steps: usize,
    pub throttle_events: u32,
    pub final_position_size_pct: f64,
}

impl RunSummary {
    pub fn from_result(profile: &str, result: &SimulationResult) -> Self {
        let history = result.history.as_slice();
        let initial_balance = history.first().copied().unwrap_or(result.final_balance);
        let count = |d: Decision| {
            result.steps.iter().filter(|s| s.fused.decision == d).count()
        };
        Self {
            profile: profile.to_string(),
            steps: result.steps.len(),
            initial_balance,
            final_balance: result.final_balance,
            profit: result.final_balance - initial_balance,
            sharpe: sharpe_ratio(history, 0.0),
            max_drawdown: max_drawdown(history),
            buys: count(Decision::Buy),
            sells: count(Decision::Sell),
            holds: count(Decision::Hold),
            clipped_steps: result.steps.iter().filter(|s| s.risk.clipped).count(),
            throttle_events: result.state.throttle_events,
            final_position_size_pct: result.state.position_size_pct,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
