use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{CurrencyPair, Error, PeriodUnit, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (live mode only)
    pub api_key: String,
    pub api_secret: String,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_principal_balance: f64,
    pub paper_slippage_bps: f64,

    // Bot config file path
    pub bot_config_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).unwrap_or_else(|| {
                panic!("Required environment variable '{key}' is not set. Check your .env file.")
            })
        };

        let trading_mode = match required("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        // Credentials are only needed when orders reach the real exchange.
        let (api_key, api_secret) = match trading_mode {
            TradingMode::Live => (required("POLONIEX_API_KEY"), required("POLONIEX_SECRET")),
            TradingMode::Paper => (
                lookup("POLONIEX_API_KEY").unwrap_or_default(),
                lookup("POLONIEX_SECRET").unwrap_or_default(),
            ),
        };

        Config {
            api_key,
            api_secret,
            trading_mode,
            paper_principal_balance: lookup("PAPER_PRINCIPAL_BALANCE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            paper_slippage_bps: lookup("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            bot_config_path: lookup("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bandbot.toml".to_string()),
        }
    }
}

/// Top-level bot config file (TOML).
///
/// Example `config/bandbot.toml`:
/// ```toml
/// [trader]
/// principal_currency = "BTC"
/// subject_currency = "ETH"
/// poll_interval_secs = 5
/// measurement_period = 20
/// candlestick_period_secs = 300
/// period_unit = "MINUTES"
/// immediate_or_cancel = false
///
/// [policy]
/// type = "bollinger"
///
/// [policy.params]
/// min_gradient = 1.0
/// sell_safety_threshold = 10.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotFileConfig {
    pub trader: TraderConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraderConfig {
    /// Fixed reference asset every balance is measured against.
    #[serde(default = "default_principal")]
    pub principal_currency: String,
    /// Coin being traded.
    pub subject_currency: String,
    /// Seconds between ticker/balance polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Rolling window size, in candles.
    pub measurement_period: usize,
    /// Candle bucket length in seconds. Also the candle refresh cadence.
    pub candlestick_period_secs: u64,
    pub period_unit: PeriodUnit,
    /// Submit orders as immediate-or-cancel.
    #[serde(default)]
    pub immediate_or_cancel: bool,
    /// Capacity of each status queue.
    #[serde(default = "default_status_capacity")]
    pub status_queue_capacity: usize,
    /// Display redraw interval in milliseconds.
    #[serde(default = "default_display_refresh")]
    pub display_refresh_ms: u64,
}

fn default_principal() -> String {
    "BTC".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_status_capacity() -> usize {
    10
}

fn default_display_refresh() -> u64 {
    500
}

impl TraderConfig {
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(&self.principal_currency, &self.subject_currency)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn display_refresh(&self) -> Duration {
        Duration::from_millis(self.display_refresh_ms)
    }

    /// Length of history requested on each candle refresh:
    /// twice the measurement window, in candle buckets.
    /// `None` when the period unit is not supported.
    pub fn candle_window(&self) -> Option<Duration> {
        match self.period_unit {
            PeriodUnit::Days | PeriodUnit::Hours | PeriodUnit::Minutes => Some(Duration::from_secs(
                self.measurement_period as u64 * 2 * self.candlestick_period_secs,
            )),
            PeriodUnit::Unsupported(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Policy identifier: "bollinger" or "zone".
    #[serde(rename = "type")]
    pub policy_type: String,
    /// Policy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl PolicyConfig {
    /// Numeric parameter, accepting either TOML floats or integers.
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params
            .get(key)
            .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
            .unwrap_or(default)
    }
}

impl BotFileConfig {
    /// Load and validate from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read '{path}': {e}")))?;
        let cfg = Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{path}: {msg}")),
            other => other,
        })?;
        info!(
            path,
            pair = %cfg.trader.pair(),
            policy = %cfg.policy.policy_type,
            "Loaded bot config"
        );
        Ok(cfg)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: BotFileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.trader;
        if t.principal_currency.trim().is_empty() || t.subject_currency.trim().is_empty() {
            return Err(Error::Config("currency codes must not be empty".into()));
        }
        if t.principal_currency == t.subject_currency {
            return Err(Error::Config(
                "principal and subject currency must differ".into(),
            ));
        }
        if t.measurement_period < 2 {
            return Err(Error::Config(format!(
                "measurement_period must be >= 2, got {}",
                t.measurement_period
            )));
        }
        if t.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be > 0".into()));
        }
        if t.candlestick_period_secs == 0 {
            return Err(Error::Config("candlestick_period_secs must be > 0".into()));
        }
        if t.status_queue_capacity == 0 {
            return Err(Error::Config("status_queue_capacity must be > 0".into()));
        }
        Ok(())
    }
}
