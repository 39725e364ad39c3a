use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use fusionrisk::config::Config;
use fusionrisk::data::{file_sha256, load_csv};
use fusionrisk::engine::Simulation;
use fusionrisk::logging::{self, log, log_error, log_run_summary, obj, v_num, v_str, Domain, Level};
use fusionrisk::metrics::RunSummary;

fn main() -> Result<()> {
    let mut cfg = Config::from_env();
    if let Some(path) = std::env::args().nth(1) {
        cfg.data_path = path;
    }
    if let Err(err) = cfg.validate() {
        log_error(Domain::System, "config_rejected", None, &err.to_string());
        return Err(err.into());
    }

    let path = Path::new(&cfg.data_path);
    let states = load_csv(path)?;
    let dataset_hash = file_sha256(path)?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("run_id", v_str(&logging::run_id())),
            ("data_path", v_str(&cfg.data_path)),
            ("dataset_sha256", v_str(&dataset_hash)),
            ("profile", v_str(&cfg.risk_profile)),
            ("lookback", json!(cfg.lookback)),
            ("sentiment", v_num(cfg.sentiment)),
            ("policy", v_str(cfg.policy_path.as_deref().unwrap_or("builtin:momentum"))),
            ("seq_model", v_str(cfg.seq_model_path.as_deref().unwrap_or("builtin:agreement"))),
        ]),
    );

    let mut sim = Simulation::new(cfg.simulation_config()?, cfg.policy()?, cfg.sequence_model()?)?;
    let result = sim.run(&states).context("simulation aborted")?;

    let summary = RunSummary::from_result(&cfg.risk_profile, &result);
    log_run_summary(&summary);
    println!("{}", summary.to_json());
    Ok(())
}
