//! Structured logging for fusion runs.
//!
//! Every record is one JSON line with a run id, a sequence number, level,
//! component and event. Records go to `events.jsonl` (info and above) or
//! `trace.jsonl` (trace/debug) under `$LOG_DIR/<run_id>/`, and are echoed to
//! stdout unless `LOG_STDOUT=0`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::ensemble::RuleSignal;
use crate::fusion::FusionBreakdown;
use crate::metrics::RunSummary;
use crate::risk::{RiskOutcome, RiskProfile, SimulationState};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market,   // Input loading and validation
    Strategy, // Rule ensemble and predictor votes
    Fusion,   // Weighted combination
    Risk,     // Clipping, drawdown, throttle
    Sim,      // Per-step ledger
    System,   // Startup, config, shutdown
    Audit,    // Replay hashes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Market => "market",
            Domain::Strategy => "strategy",
            Domain::Fusion => "fusion",
            Domain::Risk => "risk",
            Domain::Sim => "sim",
            Domain::System => "system",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
    stdout: bool,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let stdout = std::env::var("LOG_STDOUT").map(|v| v != "0").unwrap_or(true);
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
            return RunContext { run_id, events: None, trace: None, stdout };
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
            stdout,
        }
    })
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = writer.as_ref().map(|m| m.lock()) {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

pub fn run_id() -> String {
    ensure_run_context().run_id.clone()
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let ctx = ensure_run_context();

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if ctx.stdout {
        println!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_run_start(profile: &RiskProfile, steps: usize, initial_balance: f64, seed: u64, input_hash: &str) {
    log(
        Level::Info,
        Domain::System,
        "run_start",
        obj(&[
            ("profile", v_str(profile.name)),
            ("position_size_pct", v_num(profile.position_size_pct)),
            ("stop_loss_pct", v_num(profile.stop_loss_pct)),
            ("take_profit_pct", v_num(profile.take_profit_pct)),
            ("max_drawdown_pct", v_num(profile.max_drawdown_pct)),
            ("trailing_stop_pct", v_num(profile.trailing_stop_pct)),
            ("steps", json!(steps)),
            ("initial_balance", v_num(initial_balance)),
            ("seed", json!(seed)),
            ("input_hash", v_str(input_hash)),
        ]),
    );
}

/// One record per rule vote.
pub fn log_signals(index: usize, signals: &[RuleSignal]) {
    for s in signals {
        log(
            Level::Debug,
            Domain::Strategy,
            "signal",
            obj(&[
                ("step", json!(index)),
                ("strategy_id", v_str(s.rule.id())),
                ("action", v_str(s.vote.as_str())),
                ("placeholder", json!(s.rule.is_placeholder())),
            ]),
        );
    }
}

pub fn log_fusion(index: usize, fused: &FusionBreakdown) {
    log(
        Level::Debug,
        Domain::Fusion,
        "fused",
        obj(&[
            ("step", json!(index)),
            ("rl", v_str(fused.rl.as_str())),
            ("rule", v_str(fused.rule.as_str())),
            ("seq", v_str(fused.seq.as_str())),
            ("combined", v_num(fused.combined)),
            ("action", v_str(fused.decision.as_str())),
        ]),
    );
}

pub fn log_step(index: usize, ts: u64, fused: &FusionBreakdown, outcome: &RiskOutcome, state: &SimulationState) {
    log(
        Level::Debug,
        Domain::Sim,
        "step",
        obj(&[
            ("step", json!(index)),
            ("candle_ts", json!(ts)),
            ("action", v_str(fused.decision.as_str())),
            ("raw_pnl", v_num(outcome.raw_pnl)),
            ("pnl", v_num(outcome.pnl)),
            ("balance", v_num(state.balance)),
        ]),
    );
}

pub fn log_run_summary(summary: &RunSummary) {
    let data = match serde_json::to_value(summary) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    log(Level::Info, Domain::System, "run_summary", data);
}

pub fn log_risk_check(check: &str, result: &str, value: f64, threshold: f64) {
    log(
        Level::Debug,
        Domain::Risk,
        "guard",
        obj(&[
            ("check", v_str(check)),
            ("result", v_str(result)),
            ("value", v_num(value)),
            ("threshold", v_num(threshold)),
        ]),
    );
}

pub fn log_throttle(index: usize, drawdown: f64, previous: f64, current: f64) {
    log(
        Level::Info,
        Domain::Risk,
        "throttle",
        obj(&[
            ("step", json!(index)),
            ("drawdown", v_num(drawdown)),
            ("position_size_prev", v_num(previous)),
            ("position_size_pct", v_num(current)),
        ]),
    );
}

pub fn log_error(domain: Domain, event: &str, step: Option<usize>, err: &str) {
    log(
        Level::Error,
        domain,
        event,
        obj(&[
            ("step", step.map(|s| json!(s)).unwrap_or(Value::Null)),
            ("error", v_str(err)),
        ]),
    );
}

/// Log an audit entry for replay verification
pub fn log_audit(event_type: &str, input_hash: &str, output_hash: &str) {
    log(
        Level::Info,
        Domain::Audit,
        event_type,
        obj(&[
            ("input_hash", v_str(input_hash)),
            ("output_hash", v_str(output_hash)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// sha256 over the little-endian bit patterns of the values, so identical
/// runs hash identically and any bit difference shows.
pub fn values_hash<I: IntoIterator<Item = f64>>(values: I) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        hasher.update(v.to_bits().to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn history_hash(history: &[f64]) -> String {
    values_hash(history.iter().copied())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_history_hash_deterministic() {
        let h1 = history_hash(&[10_000.0, 10_100.0]);
        let h2 = history_hash(&[10_000.0, 10_100.0]);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_history_hash_sees_single_bit() {
        let a = 10_100.0_f64;
        let b = f64::from_bits(a.to_bits() + 1);
        assert_ne!(history_hash(&[a]), history_hash(&[b]));
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
