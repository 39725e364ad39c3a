//! Adapters around the two learned predictors.
//!
//! Both adapters expose the same capability: given the history and the
//! current step, return a `Decision`. The wrapped models speak in classes
//! {0, 1, 2}; anything else is a contract violation and aborts the run.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::ensemble::Rule;
use crate::error::{FusionError, FusionResult};
use crate::market::MarketState;

pub const DEFAULT_LOOKBACK: usize = 20;
pub const DEFAULT_SENTIMENT: f64 = 0.5;

const RULE_COUNT: usize = Rule::REGISTRY.len();
/// Columns per auxiliary row: rule votes, profitability proxies, sentiment.
pub const AUX_WIDTH: usize = RULE_COUNT * 2 + 1;

/// Read-only view handed to every predictor at a step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub history: &'a [MarketState],
    pub index: usize,
}

impl<'a> StepContext<'a> {
    pub fn new(history: &'a [MarketState], index: usize) -> Self {
        Self { history, index }
    }

    pub fn current(&self) -> &'a MarketState {
        &self.history[self.index]
    }

    /// The `len` states ending at the current index, or `None` when the
    /// history is too short.
    pub fn window(&self, len: usize) -> Option<&'a [MarketState]> {
        if len == 0 || self.index + 1 < len {
            return None;
        }
        Some(&self.history[self.index + 1 - len..=self.index])
    }
}

pub trait Predictor {
    fn id(&self) -> &'static str;
    fn predict(&self, ctx: &StepContext<'_>) -> FusionResult<Decision>;
}

/// Trained RL policy: state vector in, action class out.
pub trait PolicyModel {
    fn predict(&self, state: &[f64]) -> usize;
}

/// Trained sequence model: window of auxiliary rows in, class out.
pub trait SequenceModel {
    fn infer(&self, window: &[AuxFeatures]) -> usize;
}

// =============================================================================
// Auxiliary features
// =============================================================================

/// Per-step input row of the sequence model.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxFeatures {
    /// Deterministic rule votes; placeholders contribute 0.
    pub agreement: [f64; RULE_COUNT],
    /// Return each rule would have captured on this step.
    pub profitability: [f64; RULE_COUNT],
    pub sentiment: f64,
}

impl AuxFeatures {
    pub fn from_state(state: &MarketState, sentiment: f64) -> Self {
        let mut agreement = [0.0; RULE_COUNT];
        let mut profitability = [0.0; RULE_COUNT];
        for (i, rule) in Rule::REGISTRY.iter().enumerate() {
            let vote = rule.signal(state).map(|d| d.as_f64()).unwrap_or(0.0);
            agreement[i] = vote;
            profitability[i] = vote * state.period_return;
        }
        Self { agreement, profitability, sentiment }
    }

    pub fn row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(AUX_WIDTH);
        row.extend_from_slice(&self.agreement);
        row.extend_from_slice(&self.profitability);
        row.push(self.sentiment);
        row
    }
}

// =============================================================================
// Adapters
// =============================================================================

pub struct RlAdapter {
    policy: Box<dyn PolicyModel>,
}

impl RlAdapter {
    pub fn new(policy: Box<dyn PolicyModel>) -> Self {
        Self { policy }
    }
}

impl Predictor for RlAdapter {
    fn id(&self) -> &'static str {
        "rl"
    }

    fn predict(&self, ctx: &StepContext<'_>) -> FusionResult<Decision> {
        let class = self.policy.predict(&ctx.current().as_vector());
        Decision::from_class(self.id(), class)
    }
}

pub struct SequenceAdapter {
    model: Box<dyn SequenceModel>,
    lookback: usize,
    sentiment: f64,
}

impl SequenceAdapter {
    pub fn new(model: Box<dyn SequenceModel>, lookback: usize, sentiment: f64) -> FusionResult<Self> {
        if lookback == 0 {
            return Err(FusionError::Configuration("lookback must be at least 1".to_string()));
        }
        if !sentiment.is_finite() {
            return Err(FusionError::Configuration(format!("sentiment {} is not finite", sentiment)));
        }
        Ok(Self { model, lookback, sentiment })
    }

    pub fn features(&self, window: &[MarketState]) -> Vec<AuxFeatures> {
        window.iter().map(|s| AuxFeatures::from_state(s, self.sentiment)).collect()
    }
}

impl Predictor for SequenceAdapter {
    fn id(&self) -> &'static str {
        "sequence"
    }

    /// Holds until `lookback` states exist; the model is not consulted on a
    /// short window.
    fn predict(&self, ctx: &StepContext<'_>) -> FusionResult<Decision> {
        let Some(window) = ctx.window(self.lookback) else {
            return Ok(Decision::Hold);
        };
        let class = self.model.infer(&self.features(window));
        Decision::from_class(self.id(), class)
    }
}

// =============================================================================
// Built-in models
// =============================================================================

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, s) in scores.iter().enumerate() {
        if *s > scores[best] {
            best = i;
        }
    }
    best
}

fn linear_scores(weights: &[Vec<f64>], bias: &[f64], input: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .enumerate()
        .map(|(class, row)| {
            let dot: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum();
            dot + bias.get(class).copied().unwrap_or(0.0)
        })
        .collect()
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read model file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse model file {}", path.display()))
}

/// One linear score per class over the state vector; highest score wins.
/// Missing trailing weights count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicy {
    pub weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub bias: Vec<f64>,
}

impl LinearPolicy {
    pub fn load(path: &Path) -> Result<Self> {
        let policy: Self = load_json(path)?;
        if policy.weights.is_empty() {
            return Err(anyhow!("policy {} has no class weights", path.display()));
        }
        Ok(policy)
    }

    /// Follows the period return once it clears 0.5%.
    pub fn momentum() -> Self {
        Self {
            weights: vec![vec![0.0, -100.0], vec![0.0, 0.0], vec![0.0, 100.0]],
            bias: vec![0.0, 0.5, 0.0],
        }
    }
}

impl PolicyModel for LinearPolicy {
    fn predict(&self, state: &[f64]) -> usize {
        argmax(&linear_scores(&self.weights, &self.bias, state))
    }
}

/// Mean-pools the window then applies a per-class linear head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledLinearModel {
    pub weights: Vec<Vec<f64>>,
    #[serde(default)]
    pub bias: Vec<f64>,
}

impl PooledLinearModel {
    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = load_json(path)?;
        if model.weights.is_empty() {
            return Err(anyhow!("sequence model {} has no class weights", path.display()));
        }
        Ok(model)
    }

    /// Votes with the average rule agreement over the window.
    pub fn agreement() -> Self {
        let mut sell = vec![0.0; AUX_WIDTH];
        let mut buy = vec![0.0; AUX_WIDTH];
        for i in 0..RULE_COUNT {
            sell[i] = -1.0;
            buy[i] = 1.0;
        }
        Self { weights: vec![sell, vec![0.0; AUX_WIDTH], buy], bias: vec![0.0, 2.0, 0.0] }
    }
}

impl SequenceModel for PooledLinearModel {
    fn infer(&self, window: &[AuxFeatures]) -> usize {
        if window.is_empty() {
            return 1;
        }
        let mut pooled = vec![0.0; AUX_WIDTH];
        for row in window {
            for (acc, x) in pooled.iter_mut().zip(row.row()) {
                *acc += x;
            }
        }
        let n = window.len() as f64;
        pooled.iter_mut().for_each(|x| *x /= n);
        argmax(&linear_scores(&self.weights, &self.bias, &pooled))
    }
}
