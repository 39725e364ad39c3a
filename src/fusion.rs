//! Weighted vote of the three component decisions.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::{FusionError, FusionResult};

/// `combined` must clear this magnitude to leave Hold.
pub const FUSION_THRESHOLD: f64 = 0.2;

/// Component weights. They are not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub rl: f64,
    pub rule: f64,
    pub seq: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { rl: 0.33, rule: 0.33, seq: 0.34 }
    }
}

impl FusionWeights {
    pub fn new(rl: f64, rule: f64, seq: f64) -> Self {
        Self { rl, rule, seq }
    }

    pub fn validate(&self) -> FusionResult<()> {
        if [self.rl, self.rule, self.seq].iter().all(|w| w.is_finite()) {
            Ok(())
        } else {
            Err(FusionError::Configuration(format!("non-finite fusion weights {:?}", self)))
        }
    }

    pub fn combine(&self, rl: Decision, rule: Decision, seq: Decision) -> f64 {
        self.rl * rl.as_f64() + self.rule * rule.as_f64() + self.seq * seq.as_f64()
    }
}

/// Inputs and score behind one fused decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionBreakdown {
    pub rl: Decision,
    pub rule: Decision,
    pub seq: Decision,
    pub combined: f64,
    pub decision: Decision,
}

fn threshold(combined: f64) -> i64 {
    if combined > FUSION_THRESHOLD {
        1
    } else if combined < -FUSION_THRESHOLD {
        -1
    } else {
        0
    }
}

pub fn fuse_detailed(
    rl: Decision,
    rule: Decision,
    seq: Decision,
    weights: &FusionWeights,
) -> FusionResult<FusionBreakdown> {
    let combined = weights.combine(rl, rule, seq);
    let decision = Decision::try_from(threshold(combined))?;
    Ok(FusionBreakdown { rl, rule, seq, combined, decision })
}

pub fn fuse(rl: Decision, rule: Decision, seq: Decision, weights: &FusionWeights) -> FusionResult<Decision> {
    fuse_detailed(rl, rule, seq, weights).map(|b| b.decision)
}
