//! CSV market data loading.
//!
//! Format: `ts,close,return[,indicator...]`. Blank lines, `#` comments and a
//! header row (first field not numeric) are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::logging::{self, Domain, Level};
use crate::market::{validate_sequence, MarketState};

pub fn parse_csv_line(line: &str) -> Result<MarketState> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return Err(anyhow!("expected 3+ columns, got {}", parts.len()));
    }
    let indicators = parts[3..]
        .iter()
        .map(|p| p.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(MarketState::new(parts[0].parse()?, parts[1].parse()?, parts[2].parse()?).with_indicators(indicators))
}

fn is_header(line: &str) -> bool {
    line.split(',').next().map(|f| f.trim().parse::<u64>().is_err()).unwrap_or(false)
}

/// Load and validate a market sequence.
pub fn load_csv(path: &Path) -> Result<Vec<MarketState>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut states = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if states.is_empty() && is_header(trimmed) {
            continue;
        }
        let state = parse_csv_line(trimmed)
            .with_context(|| format!("{}:{}: bad row", path.display(), idx + 1))?;
        states.push(state);
    }
    validate_sequence(&states).with_context(|| format!("invalid market data in {}", path.display()))?;

    logging::log(
        Level::Info,
        Domain::Market,
        "dataset_loaded",
        logging::obj(&[
            ("path", logging::v_str(&path.to_string_lossy())),
            ("rows", serde_json::json!(states.len())),
            ("width", serde_json::json!(states.first().map(|s| s.width()).unwrap_or(0))),
        ]),
    );
    Ok(states)
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
