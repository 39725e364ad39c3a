//! Simulation engine: one forward pass over the market sequence.
//!
//! Per step the rule ensemble and RL adapter see the current state, the
//! sequence adapter sees the window ending at it; the three decisions are
//! fused and the risk controller updates the ledger. Order matters: peak,
//! drawdown and throttle all depend on every prior step, so steps are never
//! reordered or skipped. Any error ends the run without a partial result.

use serde::Serialize;

use crate::ensemble::{aggregate, RuleEnsemble};
use crate::error::{FusionError, FusionResult};
use crate::fusion::{fuse_detailed, FusionBreakdown, FusionWeights};
use crate::logging::{self, Domain};
use crate::market::{validate_sequence, MarketState};
use crate::predictor::{
    PolicyModel, Predictor, RlAdapter, SequenceAdapter, SequenceModel, StepContext,
    DEFAULT_LOOKBACK, DEFAULT_SENTIMENT,
};
use crate::risk::{RiskController, RiskOutcome, RiskProfile, SimulationState};

/// Append-only balance series, seeded with the initial balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceHistory(Vec<f64>);

impl BalanceHistory {
    fn seeded(initial_balance: f64, steps: usize) -> Self {
        let mut v = Vec::with_capacity(steps + 1);
        v.push(initial_balance);
        Self(v)
    }

    fn push(&mut self, balance: f64) {
        self.0.push(balance);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> f64 {
        self.0.last().copied().unwrap_or(0.0)
    }

}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub weights: FusionWeights,
    pub initial_balance: f64,
    /// Converts a period return into currency.
    pub scaling: f64,
    pub profile: RiskProfile,
    pub lookback: usize,
    /// Broadcast to every sequence-model window.
    pub sentiment: f64,
    /// Seed for the placeholder rules.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            initial_balance: 10_000.0,
            scaling: 1_000.0,
            profile: RiskProfile::MEDIUM,
            lookback: DEFAULT_LOOKBACK,
            sentiment: DEFAULT_SENTIMENT,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> FusionResult<()> {
        self.weights.validate()?;
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err(FusionError::Configuration(format!(
                "initial balance {} must be positive and finite",
                self.initial_balance
            )));
        }
        if !self.scaling.is_finite() {
            return Err(FusionError::Configuration(format!("scaling {} is not finite", self.scaling)));
        }
        if self.lookback == 0 {
            return Err(FusionError::Configuration("lookback must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Everything that happened on one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub ts: u64,
    pub fused: FusionBreakdown,
    pub risk: RiskOutcome,
    pub balance: f64,
    pub peak_balance: f64,
    /// Effective sizing after this step's throttle check.
    pub position_size_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub final_balance: f64,
    pub history: BalanceHistory,
    pub state: SimulationState,
    pub steps: Vec<StepRecord>,
}

pub struct Simulation {
    ensemble: RuleEnsemble,
    rl: Box<dyn Predictor>,
    seq: Box<dyn Predictor>,
    risk: RiskController,
    cfg: SimulationConfig,
}

impl Simulation {
    /// Wrap raw models in the standard adapters.
    pub fn new(
        cfg: SimulationConfig,
        policy: Box<dyn PolicyModel>,
        seq_model: Box<dyn SequenceModel>,
    ) -> FusionResult<Self> {
        let rl = RlAdapter::new(policy);
        let seq = SequenceAdapter::new(seq_model, cfg.lookback, cfg.sentiment)?;
        Self::with_predictors(cfg, Box::new(rl), Box::new(seq))
    }

    pub fn with_predictors(
        cfg: SimulationConfig,
        rl: Box<dyn Predictor>,
        seq: Box<dyn Predictor>,
    ) -> FusionResult<Self> {
        cfg.validate()?;
        Ok(Self {
            ensemble: RuleEnsemble::new(cfg.seed),
            rl,
            seq,
            risk: RiskController::new(cfg.profile, cfg.scaling),
            cfg,
        })
    }

    /// Every call replays from the configured seed, so repeated runs over
    /// the same states are bit-identical.
    pub fn run(&mut self, states: &[MarketState]) -> FusionResult<SimulationResult> {
        self.ensemble = RuleEnsemble::new(self.cfg.seed);
        if let Err(err) = validate_sequence(states) {
            logging::log_error(Domain::Market, "input_rejected", None, &err.to_string());
            return Err(err);
        }
        let input_hash = logging::values_hash(
            states.iter().flat_map(|s| std::iter::once(s.ts as f64).chain(s.as_vector())),
        );
        logging::log_run_start(
            &self.cfg.profile,
            states.len(),
            self.cfg.initial_balance,
            self.cfg.seed,
            &input_hash,
        );

        let mut state = SimulationState::new(self.cfg.initial_balance, &self.cfg.profile);
        let mut history = BalanceHistory::seeded(self.cfg.initial_balance, states.len());
        let mut steps = Vec::with_capacity(states.len());

        for index in 0..states.len() {
            let record = match self.step(states, index, &mut state) {
                Ok(r) => r,
                Err(err) => {
                    logging::log_error(Domain::Sim, "run_aborted", Some(index), &err.to_string());
                    return Err(err);
                }
            };
            history.push(state.balance);
            steps.push(record);
        }

        logging::log_audit("run_complete", &input_hash, &logging::history_hash(history.as_slice()));
        Ok(SimulationResult { final_balance: state.balance, history, state, steps })
    }

    fn step(&mut self, states: &[MarketState], index: usize, state: &mut SimulationState) -> FusionResult<StepRecord> {
        let ctx = StepContext::new(states, index);
        let current = ctx.current();

        let signals = self.ensemble.signals(current);
        logging::log_signals(index, &signals);
        let rule = aggregate(&signals);
        let rl = self.rl.predict(&ctx)?;
        let seq = self.seq.predict(&ctx)?;
        let fused = fuse_detailed(rl, rule, seq, &self.cfg.weights)?;
        logging::log_fusion(index, &fused);

        let sizing_before = state.position_size_pct;
        let outcome = self.risk.apply(fused.decision, current.period_return, state);

        logging::log_step(index, current.ts, &fused, &outcome, state);
        if outcome.clipped {
            logging::log_risk_check("pnl_clip", "clipped", outcome.raw_pnl, outcome.pnl);
        }
        if outcome.throttled {
            logging::log_throttle(index, outcome.drawdown, sizing_before, state.position_size_pct);
        }

        Ok(StepRecord {
            index,
            ts: current.ts,
            fused,
            risk: outcome,
            balance: state.balance,
            peak_balance: state.peak_balance,
            position_size_pct: state.position_size_pct,
        })
    }
}

/// Run a full simulation and return the final balance and its history.
pub fn run(
    states: &[MarketState],
    policy: Box<dyn PolicyModel>,
    seq_model: Box<dyn SequenceModel>,
    cfg: SimulationConfig,
) -> FusionResult<(f64, BalanceHistory)> {
    let result = Simulation::new(cfg, policy, seq_model)?.run(states)?;
    Ok((result.final_balance, result.history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use crate::predictor::{AuxFeatures, LinearPolicy, PooledLinearModel};

    struct FixedPolicy(usize);

    impl PolicyModel for FixedPolicy {
        fn predict(&self, _state: &[f64]) -> usize {
            self.0
        }
    }

    struct FixedSeq(usize);

    impl SequenceModel for FixedSeq {
        fn infer(&self, _window: &[AuxFeatures]) -> usize {
            self.0
        }
    }

    /// Breaks its contract on the n-th call.
    struct FailsAt {
        at: usize,
        calls: std::cell::Cell<usize>,
    }

    impl PolicyModel for FailsAt {
        fn predict(&self, _state: &[f64]) -> usize {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == self.at {
                9
            } else {
                2
            }
        }
    }

    fn quiet_states(n: usize, ret: f64) -> Vec<MarketState> {
        (0..n).map(|i| MarketState::new(1_000 + i as u64 * 60, 135.0, ret)).collect()
    }

    /// Rule weight zero: the placeholders vote at random.
    fn cfg() -> SimulationConfig {
        SimulationConfig {
            weights: FusionWeights::new(0.33, 0.0, 0.34),
            lookback: 3,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_history_seeded_with_initial_balance() {
        let states = quiet_states(10, 0.001);
        let mut sim = Simulation::new(cfg(), Box::new(FixedPolicy(1)), Box::new(FixedSeq(1))).unwrap();
        let result = sim.run(&states).unwrap();
        assert_eq!(result.history.len(), 11);
        assert_eq!(result.history.as_slice()[0], 10_000.0);
        assert_eq!(result.steps.len(), 10);
        assert_eq!(result.final_balance, result.history.last());
    }

    #[test]
    fn test_empty_input_returns_initial_balance() {
        let mut sim = Simulation::new(cfg(), Box::new(FixedPolicy(2)), Box::new(FixedSeq(2))).unwrap();
        let result = sim.run(&[]).unwrap();
        assert_eq!(result.final_balance, 10_000.0);
        assert_eq!(result.history.as_slice(), &[10_000.0]);
    }

    #[test]
    fn test_sequence_vote_waits_for_lookback() {
        // RL buys, sequence sells. Until the window fills only RL counts.
        let states = quiet_states(5, 0.0);
        let mut sim = Simulation::new(cfg(), Box::new(FixedPolicy(2)), Box::new(FixedSeq(0))).unwrap();
        let result = sim.run(&states).unwrap();
        let seq: Vec<_> = result.steps.iter().map(|s| s.fused.seq).collect();
        assert_eq!(seq, vec![Decision::Hold, Decision::Hold, Decision::Sell, Decision::Sell, Decision::Sell]);
        assert_eq!(result.steps[0].fused.decision, Decision::Buy);
        assert_eq!(result.steps[1].fused.decision, Decision::Buy);
        assert_eq!(result.steps[2].fused.decision, Decision::Hold);
    }

    #[test]
    fn test_contract_violation_aborts_run() {
        let states = quiet_states(6, 0.001);
        let policy = FailsAt { at: 3, calls: std::cell::Cell::new(0) };
        let mut sim = Simulation::new(cfg(), Box::new(policy), Box::new(FixedSeq(1))).unwrap();
        let err = sim.run(&states).unwrap_err();
        assert_eq!(err, FusionError::PredictorContractViolation { predictor: "rl", class: 9 });
    }

    #[test]
    fn test_rerun_replays_placeholder_votes() {
        // Only the rule component counts and only the placeholders vote.
        let c = SimulationConfig { weights: FusionWeights::new(0.0, 1.0, 0.0), ..cfg() };
        let states: Vec<_> =
            (0..50).map(|i| MarketState::new(1 + i as u64, 130.0, 0.01)).collect();
        let mut sim = Simulation::new(c, Box::new(FixedPolicy(1)), Box::new(FixedSeq(1))).unwrap();
        let a = sim.run(&states).unwrap();
        let b = sim.run(&states).unwrap();
        let bits = |h: &BalanceHistory| h.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.history), bits(&b.history));
        let rules = |r: &SimulationResult| r.steps.iter().map(|s| s.fused.rule).collect::<Vec<_>>();
        assert_eq!(rules(&a), rules(&b));
    }

    #[test]
    fn test_non_positive_initial_balance_rejected() {
        for initial_balance in [0.0, -500.0, f64::NAN] {
            let c = SimulationConfig { initial_balance, ..cfg() };
            let res = Simulation::new(c, Box::new(FixedPolicy(1)), Box::new(FixedSeq(1)));
            assert!(matches!(res, Err(FusionError::Configuration(_))));
        }
    }

    #[test]
    fn test_zero_lookback_rejected_at_setup() {
        let c = SimulationConfig { lookback: 0, ..SimulationConfig::default() };
        let res = Simulation::new(c, Box::new(FixedPolicy(1)), Box::new(FixedSeq(1)));
        assert!(matches!(res, Err(FusionError::Configuration(_))));
    }

    #[test]
    fn test_unordered_input_rejected_before_steps() {
        let mut states = quiet_states(3, 0.0);
        states[2].ts = states[0].ts;
        let mut sim = Simulation::new(cfg(), Box::new(FixedPolicy(1)), Box::new(FixedSeq(1))).unwrap();
        assert!(matches!(sim.run(&states), Err(FusionError::InvalidInput(_))));
    }

    #[test]
    fn test_steady_buy_compounds() {
        // All three vote Buy on a +1% step: raw = 10, well under take-profit.
        let states = quiet_states(4, 0.01);
        let c = SimulationConfig { lookback: 1, ..cfg() };
        let (final_balance, history) =
            run(&states, Box::new(FixedPolicy(2)), Box::new(FixedSeq(2)), c).unwrap();
        assert!((final_balance - 10_040.0).abs() < 1e-6);
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn test_builtin_models_run() {
        let states: Vec<_> = (0..40)
            .map(|i| {
                let ret = if i % 3 == 0 { -0.012 } else { 0.008 };
                MarketState::new(i as u64 + 1, 115.0 + i as f64, ret)
            })
            .collect();
        let mut sim = Simulation::new(
            SimulationConfig::default(),
            Box::new(LinearPolicy::momentum()),
            Box::new(PooledLinearModel::agreement()),
        )
        .unwrap();
        let result = sim.run(&states).unwrap();
        assert_eq!(result.history.len(), 41);
        assert!(result.final_balance.is_finite());
    }
}
