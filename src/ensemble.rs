//! Rule ensemble: a fixed registry of heuristic strategies, one vote each.
//!
//! Rules are pure functions of a `MarketState` except for the two pattern
//! placeholders, which draw a uniform vote from the ensemble's seeded
//! generator. The registry is iterated in declaration order so a run is
//! reproducible for a fixed seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decision::Decision;
use crate::market::MarketState;

/// Centre of the price bands used by the level-based rules.
const PRICE_PIVOT: f64 = 130.0;
const PRICE_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    MomentumCrossover,
    MovingAverageCrossover,
    BollingerBreakout,
    MeanReversion,
    Vwap,
    AdxTrendConfirmation,
    IchimokuCloud,
    StochasticOscillator,
    CandlestickPattern,
    EnsembleMl,
    PivotPoints,
    VolumeSpikeDivergence,
    MultiTimeframeConfirmation,
    MomentumVolatility,
}

impl Rule {
    pub const REGISTRY: [Rule; 14] = [
        Rule::MomentumCrossover,
        Rule::MovingAverageCrossover,
        Rule::BollingerBreakout,
        Rule::MeanReversion,
        Rule::Vwap,
        Rule::AdxTrendConfirmation,
        Rule::IchimokuCloud,
        Rule::StochasticOscillator,
        Rule::CandlestickPattern,
        Rule::EnsembleMl,
        Rule::PivotPoints,
        Rule::VolumeSpikeDivergence,
        Rule::MultiTimeframeConfirmation,
        Rule::MomentumVolatility,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Rule::MomentumCrossover => "momentum_crossover",
            Rule::MovingAverageCrossover => "moving_average_crossover",
            Rule::BollingerBreakout => "bollinger_breakout",
            Rule::MeanReversion => "mean_reversion",
            Rule::Vwap => "vwap",
            Rule::AdxTrendConfirmation => "adx_trend_confirmation",
            Rule::IchimokuCloud => "ichimoku_cloud",
            Rule::StochasticOscillator => "stochastic_oscillator",
            Rule::CandlestickPattern => "candlestick_pattern",
            Rule::EnsembleMl => "ensemble_ml",
            Rule::PivotPoints => "pivot_points",
            Rule::VolumeSpikeDivergence => "volume_spike_divergence",
            Rule::MultiTimeframeConfirmation => "multi_timeframe_confirmation",
            Rule::MomentumVolatility => "momentum_volatility",
        }
    }

    /// Pattern detectors with no signal logic yet; they vote at random.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Rule::IchimokuCloud | Rule::CandlestickPattern)
    }

    /// Deterministic vote. `None` for placeholders.
    pub fn signal(&self, state: &MarketState) -> Option<Decision> {
        let p = state.price;
        let r = state.period_return;
        let vote = match self {
            Rule::MomentumCrossover | Rule::EnsembleMl => return_band(r, 0.01),
            Rule::MovingAverageCrossover => price_band(p, 120.0, 150.0),
            Rule::BollingerBreakout => price_band(p, 110.0, 160.0),
            Rule::MeanReversion => {
                let z = (p - PRICE_PIVOT) / PRICE_SCALE;
                if z > 1.0 {
                    Decision::Sell
                } else if z < -1.0 {
                    Decision::Buy
                } else {
                    Decision::Hold
                }
            }
            Rule::Vwap => price_band(p, 120.0, 140.0),
            Rule::AdxTrendConfirmation
            | Rule::VolumeSpikeDivergence
            | Rule::MomentumVolatility => return_band(r, 0.02),
            Rule::StochasticOscillator => return_band(r, 0.015),
            Rule::PivotPoints => {
                price_band(p, PRICE_PIVOT - PRICE_SCALE, PRICE_PIVOT + PRICE_SCALE)
            }
            Rule::MultiTimeframeConfirmation => {
                let level = if p > PRICE_PIVOT { Decision::Buy } else { Decision::Sell };
                let trend = if r > 0.005 { Decision::Buy } else { Decision::Sell };
                if level == trend {
                    level
                } else {
                    Decision::Hold
                }
            }
            Rule::IchimokuCloud | Rule::CandlestickPattern => return None,
        };
        Some(vote)
    }

    pub fn vote<R: Rng>(&self, state: &MarketState, rng: &mut R) -> Decision {
        match self.signal(state) {
            Some(d) => d,
            None => random_vote(rng),
        }
    }
}

/// Sell above `upper`, Buy below `lower`.
fn price_band(price: f64, lower: f64, upper: f64) -> Decision {
    if price > upper {
        Decision::Sell
    } else if price < lower {
        Decision::Buy
    } else {
        Decision::Hold
    }
}

/// Follow the return once it clears `threshold` in either direction.
fn return_band(ret: f64, threshold: f64) -> Decision {
    if ret > threshold {
        Decision::Buy
    } else if ret < -threshold {
        Decision::Sell
    } else {
        Decision::Hold
    }
}

fn random_vote<R: Rng>(rng: &mut R) -> Decision {
    match rng.gen_range(-1i64..=1) {
        -1 => Decision::Sell,
        1 => Decision::Buy,
        _ => Decision::Hold,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RuleSignal {
    pub rule: Rule,
    pub vote: Decision,
}

pub struct RuleEnsemble {
    rng: StdRng,
}

impl RuleEnsemble {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Every rule's vote, in registry order.
    pub fn signals(&mut self, state: &MarketState) -> Vec<RuleSignal> {
        Rule::REGISTRY
            .iter()
            .map(|rule| RuleSignal { rule: *rule, vote: rule.vote(state, &mut self.rng) })
            .collect()
    }

    /// Sign of the vote total.
    pub fn evaluate(&mut self, state: &MarketState) -> Decision {
        aggregate(&self.signals(state))
    }
}

/// Sign of the vote total of an already collected breakdown.
pub fn aggregate(signals: &[RuleSignal]) -> Decision {
    let total: i64 = signals.iter().map(|s| s.vote.value() as i64).sum();
    Decision::from_sign(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(price: f64, ret: f64) -> MarketState {
        MarketState::new(1, price, ret)
    }

    #[test]
    fn test_registry_order_and_placeholders() {
        assert_eq!(Rule::REGISTRY.len(), 14);
        assert_eq!(Rule::REGISTRY[0], Rule::MomentumCrossover);
        assert_eq!(Rule::REGISTRY[13], Rule::MomentumVolatility);
        let placeholders: Vec<_> = Rule::REGISTRY.iter().filter(|r| r.is_placeholder()).collect();
        assert_eq!(placeholders, vec![&Rule::IchimokuCloud, &Rule::CandlestickPattern]);
    }

    #[test]
    fn test_rule_thresholds() {
        assert_eq!(Rule::MomentumCrossover.signal(&state(130.0, 0.011)), Some(Decision::Buy));
        assert_eq!(Rule::MomentumCrossover.signal(&state(130.0, 0.01)), Some(Decision::Hold));
        assert_eq!(Rule::MovingAverageCrossover.signal(&state(151.0, 0.0)), Some(Decision::Sell));
        assert_eq!(Rule::BollingerBreakout.signal(&state(109.0, 0.0)), Some(Decision::Buy));
        assert_eq!(Rule::MeanReversion.signal(&state(141.0, 0.0)), Some(Decision::Sell));
        assert_eq!(Rule::MeanReversion.signal(&state(140.0, 0.0)), Some(Decision::Hold));
        assert_eq!(Rule::PivotPoints.signal(&state(119.0, 0.0)), Some(Decision::Buy));
        assert_eq!(Rule::StochasticOscillator.signal(&state(130.0, -0.016)), Some(Decision::Sell));
        assert_eq!(Rule::IchimokuCloud.signal(&state(130.0, 0.0)), None);
    }

    #[test]
    fn test_multi_timeframe_needs_agreement() {
        let rule = Rule::MultiTimeframeConfirmation;
        assert_eq!(rule.signal(&state(135.0, 0.01)), Some(Decision::Buy));
        assert_eq!(rule.signal(&state(125.0, -0.01)), Some(Decision::Sell));
        assert_eq!(rule.signal(&state(135.0, -0.01)), Some(Decision::Hold));
    }

    #[test]
    fn test_strong_uptrend_outvotes_placeholders() {
        // Cheap price plus strong positive return: 11 deterministic Buy votes.
        let mut ens = RuleEnsemble::new(7);
        for _ in 0..50 {
            assert_eq!(ens.evaluate(&state(100.0, 0.05)), Decision::Buy);
        }
    }

    #[test]
    fn test_same_seed_same_votes() {
        let s = state(130.0, 0.0);
        let mut a = RuleEnsemble::new(11);
        let mut b = RuleEnsemble::new(11);
        for _ in 0..100 {
            let va: Vec<_> = a.signals(&s).iter().map(|x| x.vote).collect();
            let vb: Vec<_> = b.signals(&s).iter().map(|x| x.vote).collect();
            assert_eq!(va, vb);
        }
    }

    #[test]
    fn test_aggregate_matches_evaluate() {
        let s = state(130.0, 0.0);
        let mut a = RuleEnsemble::new(5);
        let mut b = RuleEnsemble::new(5);
        for _ in 0..50 {
            assert_eq!(aggregate(&a.signals(&s)), b.evaluate(&s));
        }
        let ids: Vec<_> = a.signals(&s).iter().map(|x| x.rule.id()).collect();
        assert_eq!(ids.len(), 14);
        assert_eq!(ids[6], "ichimoku_cloud");
    }

    #[test]
    fn test_placeholders_cover_all_votes() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = state(130.0, 0.0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(Rule::CandlestickPattern.vote(&s, &mut rng));
        }
        assert_eq!(seen.len(), 3);
    }
}
