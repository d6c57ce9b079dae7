// =============================================================================
// Configuration — JSON file with per-exchange, logger, API and storage blocks
// =============================================================================
//
// The config file path comes from the first CLI argument, falling back to
// `config.json` in the working directory. Durations are written in the
// `250ms` / `12h` vocabulary and validated when the workers are built, so a
// bad duration fails startup instead of a poll loop.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "config.json";

// =============================================================================
// Blocks
// =============================================================================

/// Binance worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// Maximum lifetime of a single WebSocket session before it is cycled.
    pub ws_timeout: String,
    /// Delay between REST polls and stream reconnect attempts.
    pub request_interval: String,
}

/// Settings for the poll-only workers (Bittrex, Poloniex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub request_interval: String,
}

/// Logger output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub to_stdout: bool,
    #[serde(default)]
    pub to_file: bool,
    #[serde(default)]
    pub file_path: String,
}

/// Read-API settings. `token` is the shared secret gating `/reload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    #[serde(default)]
    pub token: String,
}

/// Sorted-store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: i64,
    /// Accepted for compatibility; the multiplexed connection manager
    /// replaces an explicit pool.
    #[serde(rename = "poolSize", default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

// =============================================================================
// Top-level config
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub binance: BinanceConfig,
    pub bittrex: PollerConfig,
    pub poloniex: PollerConfig,
    pub logger: LoggerConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load the config from the file named by the first CLI argument, or
    /// `config.json` when none is given.
    pub fn from_args() -> Result<Self> {
        let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("could not parse config from {}", path.display()))?;

        info!(path = %path.display(), port = config.api.port, "config loaded");
        Ok(config)
    }
}

// =============================================================================
// Duration vocabulary
// =============================================================================

/// Parse a duration written as a decimal number with a unit suffix, with
/// compound forms allowed: `250ms`, `12h`, `1.5s`, `1h30m`.
///
/// Accepted units: `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`.
pub fn parse_go_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    let mut total_secs = 0.0_f64;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(digits_end);
        let value: f64 = number
            .parse()
            .with_context(|| format!("invalid duration {input:?}"))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, remainder) = tail.split_at(unit_end);

        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => bail!("invalid duration unit {unit:?} in {input:?}"),
        };

        total_secs += value * scale;
        rest = remainder;
    }

    if !total_secs.is_finite() || total_secs < 0.0 {
        bail!("invalid duration {input:?}");
    }

    Ok(Duration::from_secs_f64(total_secs))
}

// =============================================================================
// Tests
// =============================================================================
