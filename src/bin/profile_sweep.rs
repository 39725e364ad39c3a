//! Run one dataset under every risk preset.
//!
//! Usage: cargo run --release --bin profile_sweep -- [data.csv]

use std::path::Path;

use anyhow::Result;

use fusionrisk::config::Config;
use fusionrisk::data::load_csv;
use fusionrisk::engine::Simulation;
use fusionrisk::logging::log_run_summary;
use fusionrisk::metrics::RunSummary;
use fusionrisk::risk::RiskProfile;

fn main() -> Result<()> {
    let base = Config::from_env();
    let path = std::env::args().nth(1).unwrap_or_else(|| base.data_path.clone());
    let states = load_csv(Path::new(&path))?;

    println!(
        "{:<8} {:>12} {:>10} {:>8} {:>8} {:>6} {:>6} {:>6} {:>8} {:>9}",
        "profile", "final", "profit", "sharpe", "max_dd", "buys", "sells", "holds", "clipped", "throttle"
    );
    for profile in RiskProfile::ALL {
        let cfg = base.with_profile(profile.name);
        cfg.validate()?;
        let mut sim = Simulation::new(cfg.simulation_config()?, cfg.policy()?, cfg.sequence_model()?)?;
        let result = sim.run(&states)?;
        let s = RunSummary::from_result(profile.name, &result);
        log_run_summary(&s);
        println!(
            "{:<8} {:>12.2} {:>10.2} {:>8.3} {:>8.4} {:>6} {:>6} {:>6} {:>8} {:>9}",
            s.profile,
            s.final_balance,
            s.profit,
            s.sharpe,
            s.max_drawdown,
            s.buys,
            s.sells,
            s.holds,
            s.clipped_steps,
            s.throttle_events
        );
    }
    Ok(())
}
