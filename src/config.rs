use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const SCREENER_URL: &str = "https://chartink.com/screener/process";

/// Exchange site serving the market indices feed.
pub const INDICES_BASE_URL: &str = "https://www.nseindia.com";

/// Rows kept per scan when a definition does not set its own cap.
pub const DEFAULT_RESULT_CAP: usize = 10;

/// Refresh interval after a cycle that reached the screener (seconds).
pub const REFRESH_INTERVAL_SECS: u64 = 120;

/// Retry interval after a cycle that could not obtain a token (seconds).
pub const ERROR_RETRY_SECS: u64 = 30;

/// Minimum gap between two alert signals (seconds).
pub const ALERT_MIN_INTERVAL_SECS: u64 = 60;

/// A stock whose score grows by more than this factor between cycles raises an alert.
pub const SCORE_JUMP_RATIO: f64 = 1.2;

/// Upper bound on the per-stock previous-score map.
pub const SCORE_TRACKER_CAPACITY: usize = 4096;

/// Buy and sell suggestion lists are each truncated to this many rows.
pub const SUGGESTION_LIMIT: usize = 20;

/// Suggestions skip stocks priced above this.
pub const SUGGESTION_PRICE_CEILING: f64 = 2250.0;

/// HTTP request timeout for the screener session (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    pub screener_url: String,
    /// Exchange site serving the market indices feed (INDICES_BASE_URL)
    pub indices_base_url: String,
    /// Persisted settings file (SETTINGS_PATH)
    pub settings_path: PathBuf,
    /// Optional JSON scan catalog overriding the built-in one (SCAN_CATALOG_PATH)
    pub scan_catalog_path: Option<PathBuf>,
    pub scheduler: SchedulerConfig,
    pub alert: AlertConfig,
    pub request_timeout: Duration,
    /// Suggestions skip stocks priced above this (SUGGESTION_PRICE_CEILING)
    pub suggestion_price_ceiling: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Sleep after a cycle that reached the screener (REFRESH_INTERVAL_SECS)
    pub interval_ok: Duration,
    /// Sleep after a cycle aborted by token failure (ERROR_RETRY_SECS)
    pub interval_err: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ok: Duration::from_secs(REFRESH_INTERVAL_SECS),
            interval_err: Duration::from_secs(ERROR_RETRY_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlertConfig {
    /// ALERT_MIN_INTERVAL_SECS
    pub min_interval: Duration,
    /// ALERT_SCORE_JUMP_RATIO
    pub score_jump_ratio: f64,
    pub tracker_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(ALERT_MIN_INTERVAL_SECS),
            score_jump_ratio: SCORE_JUMP_RATIO,
            tracker_capacity: SCORE_TRACKER_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            screener_url: std::env::var("SCREENER_URL")
                .unwrap_or_else(|_| SCREENER_URL.to_string()),
            indices_base_url: std::env::var("INDICES_BASE_URL")
                .unwrap_or_else(|_| INDICES_BASE_URL.to_string()),
            settings_path: std::env::var("SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("db.json")),
            scan_catalog_path: std::env::var("SCAN_CATALOG_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            scheduler: SchedulerConfig {
                interval_ok: Duration::from_secs(env_or("REFRESH_INTERVAL_SECS", REFRESH_INTERVAL_SECS)),
                interval_err: Duration::from_secs(env_or("ERROR_RETRY_SECS", ERROR_RETRY_SECS)),
            },
            alert: AlertConfig {
                min_interval: Duration::from_secs(env_or(
                    "ALERT_MIN_INTERVAL_SECS",
                    ALERT_MIN_INTERVAL_SECS,
                )),
                score_jump_ratio: env_or("ALERT_SCORE_JUMP_RATIO", SCORE_JUMP_RATIO),
                tracker_capacity: SCORE_TRACKER_CAPACITY,
            },
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", REQUEST_TIMEOUT_SECS)),
            suggestion_price_ceiling: env_or("SUGGESTION_PRICE_CEILING", SUGGESTION_PRICE_CEILING),
        })
    }
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
