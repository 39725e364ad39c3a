// Normalised trading action shared by every signal source.

use serde::{Deserialize, Serialize};

use crate::error::FusionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Sell = -1,
    Hold = 0,
    Buy = 1,
}

impl Decision {
    pub fn value(self) -> i8 {
        self as i8
    }

    pub fn as_f64(self) -> f64 {
        self.value() as f64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Sell => "sell",
            Decision::Hold => "hold",
            Decision::Buy => "buy",
        }
    }

    /// Sign of a vote total. Zero is a Hold.
    pub fn from_sign(total: i64) -> Self {
        match total.signum() {
            1 => Decision::Buy,
            -1 => Decision::Sell,
            _ => Decision::Hold,
        }
    }

    /// Map a model class {0, 1, 2} to {Sell, Hold, Buy}.
    pub fn from_class(predictor: &'static str, class: usize) -> Result<Self, FusionError> {
        match class {
            0 => Ok(Decision::Sell),
            1 => Ok(Decision::Hold),
            2 => Ok(Decision::Buy),
            _ => Err(FusionError::PredictorContractViolation { predictor, class }),
        }
    }
}

impl TryFrom<i64> for Decision {
    type Error = FusionError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Decision::Sell),
            0 => Ok(Decision::Hold),
            1 => Ok(Decision::Buy),
            other => Err(FusionError::DecisionRange(other)),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
