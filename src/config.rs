//! Environment-based configuration

use std::env;
use std::time::Duration;

/// Deployment environment, used to pick log formatting
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

/// Base URL of the terminal bridge that serves market data
pub fn get_bridge_url() -> String {
    env::var("BRIDGE_URL").unwrap_or_else(|_| "http://127.0.0.1:8787".to_string())
}

/// Optional webhook endpoint for signal notifications
pub fn get_webhook_url() -> Option<String> {
    env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Tunables for the monitoring pipeline.
///
/// Backoff and detection thresholds are first-class parameters here rather
/// than constants buried in the loops, so they can be shrunk under test.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between polls of the working timeframe
    pub poll_interval: Duration,
    /// Longer sleep after a transient fetch error inside a worker loop
    pub error_backoff: Duration,
    /// Delay between retries of the initial series fetch
    pub init_retry_delay: Duration,
    /// Working timeframe bar length in minutes
    pub bar_minutes: u32,
    /// Number of working-timeframe bars fetched per poll
    pub series_depth: usize,
    /// Per-symbol signal history capacity (oldest evicted first)
    pub history_capacity: usize,
    /// How many candles before the closed one are scanned for level touches
    pub touch_lookback: usize,
    /// Near-touch tolerance as a fraction of the candle range
    pub touch_threshold: f64,
    /// Proximity threshold (fraction of price) for the summary table
    pub proximity_threshold: f64,
    /// Wait after a bar-close boundary before sweeping the store
    pub batch_grace: Duration,
    /// How long shutdown waits for workers before abandoning them
    pub shutdown_grace: Duration,
    /// Account currency used for pip-value conversion
    pub account_currency: String,
    /// Symbols priced with the fixed commodity pip-value override
    pub commodity_symbols: Vec<String>,
    /// Asian session start hour (previous calendar day, terminal clock)
    pub asian_start_hour: u32,
    /// Asian session end hour (terminal clock)
    pub asian_end_hour: u32,
    /// Hour after which the session is considered complete for the day
    pub asian_ready_hour: u32,
    /// Idle time after which the shared terminal connection is torn down
    pub idle_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(30),
            init_retry_delay: Duration::from_secs(5),
            bar_minutes: 10,
            series_depth: 100,
            history_capacity: 50,
            touch_lookback: 2,
            touch_threshold: 0.1,
            proximity_threshold: 0.0015,
            batch_grace: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(5),
            account_currency: "USD".to_string(),
            commodity_symbols: vec!["XAUUSD".to_string(), "XAGUSD".to_string()],
            asian_start_hour: 20,
            asian_end_hour: 2,
            asian_ready_hour: 3,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl MonitorConfig {
    /// Build a config from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_secs(env_u64(
                "POLL_INTERVAL_SECONDS",
                defaults.poll_interval.as_secs(),
            )),
            error_backoff: Duration::from_secs(env_u64(
                "ERROR_BACKOFF_SECONDS",
                defaults.error_backoff.as_secs(),
            )),
            init_retry_delay: Duration::from_secs(env_u64(
                "INIT_RETRY_SECONDS",
                defaults.init_retry_delay.as_secs(),
            )),
            bar_minutes: env_u64("BAR_MINUTES", defaults.bar_minutes as u64) as u32,
            series_depth: env_u64("SERIES_DEPTH", defaults.series_depth as u64) as usize,
            history_capacity: env_u64("HISTORY_CAPACITY", defaults.history_capacity as u64)
                as usize,
            touch_lookback: env_u64("TOUCH_LOOKBACK", defaults.touch_lookback as u64) as usize,
            touch_threshold: env_f64("TOUCH_THRESHOLD", defaults.touch_threshold),
            proximity_threshold: env_f64("PROXIMITY_THRESHOLD", defaults.proximity_threshold),
            batch_grace: Duration::from_secs(env_u64(
                "BATCH_GRACE_SECONDS",
                defaults.batch_grace.as_secs(),
            )),
            shutdown_grace: Duration::from_secs(env_u64(
                "SHUTDOWN_GRACE_SECONDS",
                defaults.shutdown_grace.as_secs(),
            )),
            account_currency: env::var("ACCOUNT_CURRENCY").unwrap_or(defaults.account_currency),
            commodity_symbols: env::var("COMMODITY_SYMBOLS")
                .map(|v| v.split(',').map(|s| s.trim().to_uppercase()).collect())
                .unwrap_or(defaults.commodity_symbols),
            asian_start_hour: env_u64("ASIAN_START_HOUR", defaults.asian_start_hour as u64)
                as u32,
            asian_end_hour: env_u64("ASIAN_END_HOUR", defaults.asian_end_hour as u64) as u32,
            asian_ready_hour: env_u64("ASIAN_READY_HOUR", defaults.asian_ready_hour as u64)
                as u32,
            idle_timeout: Duration::from_secs(env_u64(
                "CONNECTION_IDLE_SECONDS",
                defaults.idle_timeout.as_secs(),
            )),
        }
    }
}
