//! Error taxonomy for a fusion run.
//!
//! Every variant is fatal for the run that raised it: the engine never
//! retries a step or substitutes a default decision.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    /// A wrapped model produced a class outside {0, 1, 2}.
    #[error("predictor contract violation: {predictor} returned class {class}")]
    PredictorContractViolation { predictor: &'static str, class: usize },

    /// Setup rejected before any simulation step ran.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A decision value outside {-1, 0, 1} reached the engine.
    #[error("decision out of range: {0}")]
    DecisionRange(i64),

    /// The market sequence violates the data contract (ordering, width).
    #[error("invalid market input: {0}")]
    InvalidInput(String),
}

pub type FusionResult<T> = Result<T, FusionError>;
