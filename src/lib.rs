pub mod config;
pub mod data;
pub mod decision;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod fusion;
pub mod logging;
pub mod market;
pub mod metrics;
pub mod predictor;
pub mod risk;
