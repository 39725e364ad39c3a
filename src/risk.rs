use serde::Serialize;

use crate::decision::Decision;
use crate::error::{FusionError, FusionResult};

/// Sizing decrement applied on each drawdown breach.
pub const THROTTLE_STEP: f64 = 0.005;
/// Sizing never drops below this.
pub const POSITION_SIZE_FLOOR: f64 = 0.01;
/// Guard for the drawdown denominator.
pub const DRAWDOWN_EPSILON: f64 = 1e-9;

/// Immutable risk preset selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskProfile {
    pub name: &'static str,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_drawdown_pct: f64,
    pub trailing_stop_pct: f64,
}

impl RiskProfile {
    pub const HIGH: RiskProfile = RiskProfile {
        name: "high",
        position_size_pct: 0.15,
        stop_loss_pct: 0.15,
        take_profit_pct: 0.30,
        max_drawdown_pct: 0.40,
        trailing_stop_pct: 0.02,
    };

    pub const MEDIUM: RiskProfile = RiskProfile {
        name: "medium",
        position_size_pct: 0.07,
        stop_loss_pct: 0.07,
        take_profit_pct: 0.15,
        max_drawdown_pct: 0.20,
        trailing_stop_pct: 0.03,
    };

    pub const LOW: RiskProfile = RiskProfile {
        name: "low",
        position_size_pct: 0.02,
        stop_loss_pct: 0.02,
        take_profit_pct: 0.05,
        max_drawdown_pct: 0.10,
        trailing_stop_pct: 0.02,
    };

    pub const ALL: [RiskProfile; 3] = [Self::HIGH, Self::MEDIUM, Self::LOW];

    /// Case-insensitive lookup of "high" | "medium" | "low".
    pub fn from_name(name: &str) -> FusionResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "high" => Ok(Self::HIGH),
            "medium" => Ok(Self::MEDIUM),
            "low" => Ok(Self::LOW),
            other => Err(FusionError::Configuration(format!(
                "unknown risk profile '{}': expected high, medium or low",
                other
            ))),
        }
    }
}

/// Ledger threaded through a run. Only the risk controller mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationState {
    /// Never floored. A step loses at most a fraction of it, so a positive
    /// start stays positive.
    pub balance: f64,
    pub peak_balance: f64,
    /// Effective sizing; starts at the preset and only moves down.
    pub position_size_pct: f64,
    pub throttle_events: u32,
}

impl SimulationState {
    pub fn new(initial_balance: f64, profile: &RiskProfile) -> Self {
        Self {
            balance: initial_balance,
            peak_balance: initial_balance,
            position_size_pct: profile.position_size_pct,
            throttle_events: 0,
        }
    }

    pub fn drawdown(&self) -> f64 {
        1.0 - self.balance / self.peak_balance.max(DRAWDOWN_EPSILON)
    }
}

/// What one risk step did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskOutcome {
    pub raw_pnl: f64,
    pub pnl: f64,
    pub trade_size: f64,
    /// Sizing in effect when `trade_size` was computed.
    pub position_size_pct: f64,
    pub max_loss: f64,
    pub max_gain: f64,
    pub drawdown: f64,
    pub clipped: bool,
    pub throttled: bool,
}

pub struct RiskController {
    profile: RiskProfile,
    scaling: f64,
}

impl RiskController {
    pub fn new(profile: RiskProfile, scaling: f64) -> Self {
        Self { profile, scaling }
    }

    /// Turn a decision into a bounded P&L and update the ledger in place.
    pub fn apply(&self, decision: Decision, period_return: f64, state: &mut SimulationState) -> RiskOutcome {
        let raw_pnl = decision.as_f64() * period_return * self.scaling;
        let sizing = state.position_size_pct;
        let trade_size = state.balance * sizing;
        let max_loss = -trade_size * self.profile.stop_loss_pct;
        let max_gain = trade_size * self.profile.take_profit_pct;
        // Floor then cap: an inverted range (negative balance) yields max_gain.
        let pnl = raw_pnl.max(max_loss).min(max_gain);

        state.balance += pnl;
        if state.balance > state.peak_balance {
            state.peak_balance = state.balance;
        }
        let drawdown = state.drawdown();
        let throttled = drawdown > self.profile.max_drawdown_pct;
        if throttled {
            state.position_size_pct = (state.position_size_pct - THROTTLE_STEP).max(POSITION_SIZE_FLOOR);
            state.throttle_events += 1;
        }

        RiskOutcome {
            raw_pnl,
            pnl,
            trade_size,
            position_size_pct: sizing,
            max_loss,
            max_gain,
            drawdown,
            clipped: pnl != raw_pnl,
            throttled,
        }
    }
}

/// Free-function form of a single step for callers that do not hold a
/// controller. Rejects a ledger or input that is not finite.
pub fn apply(
    decision: Decision,
    period_return: f64,
    state: &SimulationState,
    profile: &RiskProfile,
    scaling: f64,
) -> FusionResult<(f64, SimulationState)> {
    let fields = [
        ("balance", state.balance),
        ("peak_balance", state.peak_balance),
        ("position_size_pct", state.position_size_pct),
        ("period_return", period_return),
        ("scaling", scaling),
    ];
    if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(FusionError::InvalidInput(format!("{} is not finite: {}", name, value)));
    }
    let mut next = *state;
    let outcome = RiskController::new(*profile, scaling).apply(decision, period_return, &mut next);
    Ok((outcome.pnl, next))
}
