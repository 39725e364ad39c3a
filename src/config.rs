//! Run configuration read from the environment.

use std::path::Path;

use serde::Serialize;

use crate::engine::SimulationConfig;
use crate::error::{FusionError, FusionResult};
use crate::fusion::FusionWeights;
use crate::predictor::{
    LinearPolicy, PolicyModel, PooledLinearModel, SequenceModel, DEFAULT_LOOKBACK, DEFAULT_SENTIMENT,
};
use crate::risk::RiskProfile;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub data_path: String,
    pub risk_profile: String,
    pub initial_balance: f64,
    pub scaling: f64,
    pub lookback: usize,
    pub w_rl: f64,
    pub w_rule: f64,
    pub w_seq: f64,
    pub sentiment: f64,
    pub seed: u64,
    /// JSON `LinearPolicy`; the built-in momentum policy when unset.
    pub policy_path: Option<String>,
    /// JSON `PooledLinearModel`; the built-in agreement model when unset.
    pub seq_model_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let weights = FusionWeights::default();
        Self {
            data_path: "data/market.csv".to_string(),
            risk_profile: "medium".to_string(),
            initial_balance: 10_000.0,
            scaling: 1_000.0,
            lookback: DEFAULT_LOOKBACK,
            w_rl: weights.rl,
            w_rule: weights.rule,
            w_seq: weights.seq,
            sentiment: DEFAULT_SENTIMENT,
            seed: 42,
            policy_path: None,
            seq_model_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            data_path: std::env::var("DATA_PATH").unwrap_or(d.data_path),
            risk_profile: std::env::var("RISK_PROFILE").unwrap_or(d.risk_profile),
            initial_balance: std::env::var("INITIAL_BALANCE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.initial_balance),
            scaling: std::env::var("SCALING").ok().and_then(|v| v.parse().ok()).unwrap_or(d.scaling),
            lookback: std::env::var("LOOKBACK").ok().and_then(|v| v.parse().ok()).unwrap_or(d.lookback),
            w_rl: std::env::var("W_RL").ok().and_then(|v| v.parse().ok()).unwrap_or(d.w_rl),
            w_rule: std::env::var("W_RULE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.w_rule),
            w_seq: std::env::var("W_SEQ").ok().and_then(|v| v.parse().ok()).unwrap_or(d.w_seq),
            sentiment: std::env::var("SENTIMENT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.sentiment),
            seed: std::env::var("SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(d.seed),
            policy_path: std::env::var("POLICY_PATH").ok().filter(|v| !v.is_empty()),
            seq_model_path: std::env::var("SEQ_MODEL_PATH").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn weights(&self) -> FusionWeights {
        FusionWeights::new(self.w_rl, self.w_rule, self.w_seq)
    }

    pub fn risk_profile(&self) -> FusionResult<RiskProfile> {
        RiskProfile::from_name(&self.risk_profile)
    }

    pub fn validate(&self) -> FusionResult<()> {
        self.simulation_config()?.validate()?;
        if !self.sentiment.is_finite() {
            return Err(FusionError::Configuration(format!("sentiment {} is not finite", self.sentiment)));
        }
        Ok(())
    }

    pub fn simulation_config(&self) -> FusionResult<SimulationConfig> {
        Ok(SimulationConfig {
            weights: self.weights(),
            initial_balance: self.initial_balance,
            scaling: self.scaling,
            profile: self.risk_profile()?,
            lookback: self.lookback,
            sentiment: self.sentiment,
            seed: self.seed,
        })
    }

    pub fn policy(&self) -> anyhow::Result<Box<dyn PolicyModel>> {
        Ok(match &self.policy_path {
            Some(path) => Box::new(LinearPolicy::load(Path::new(path))?),
            None => Box::new(LinearPolicy::momentum()),
        })
    }

    pub fn sequence_model(&self) -> anyhow::Result<Box<dyn SequenceModel>> {
        Ok(match &self.seq_model_path {
            Some(path) => Box::new(PooledLinearModel::load(Path::new(path))?),
            None => Box::new(PooledLinearModel::agreement()),
        })
    }

    /// Same settings under another preset.
    pub fn with_profile(&self, name: &str) -> Self {
        Self { risk_profile: name.to_string(), ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.risk_profile().unwrap(), RiskProfile::MEDIUM);
        assert_eq!(cfg.weights(), FusionWeights::default());
        assert_eq!(cfg.lookback, 20);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_unknown_profile_fails_validation() {
        let cfg = Config::default().with_profile("extreme");
        assert!(matches!(cfg.validate(), Err(FusionError::Configuration(_))));
    }

    #[test]
    fn test_zero_lookback_fails_validation() {
        let cfg = Config { lookback: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(FusionError::Configuration(_))));
    }

    #[test]
    fn test_nan_weight_fails_validation() {
        let cfg = Config { w_seq: f64::NAN, ..Config::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_simulation_config_carries_settings() {
        let cfg = Config { seed: 7, scaling: 500.0, ..Config::default() }.with_profile("LOW");
        let sim = cfg.simulation_config().unwrap();
        assert_eq!(sim.profile, RiskProfile::LOW);
        assert_eq!(sim.seed, 7);
        assert_eq!(sim.scaling, 500.0);
    }

    #[test]
    fn test_missing_model_file_is_error() {
        let cfg = Config { policy_path: Some("/nonexistent/policy.json".to_string()), ..Config::default() };
        assert!(cfg.policy().is_err());
        assert!(Config::default().sequence_model().is_ok());
    }
}
