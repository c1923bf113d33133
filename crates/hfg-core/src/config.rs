//! Environment-driven configuration.
//!
//! All settings are read from environment variables once at startup; the
//! resulting [`AppConfig`] is immutable and shared by `Arc` with every
//! component. Credentials are validated for presence only — market-data
//! sessions never sign requests.
//!
//! # Required variables
//!
//! `OKX_API_KEY`, `OKX_API_SECRET`, `OKX_PASSPHRASE`, `BYBIT_API_KEY`,
//! `BYBIT_API_SECRET`.
//!
//! # Optional variables (with defaults)
//!
//! - `TRADING_SYMBOLS_OKX` / `TRADING_SYMBOLS_BYBIT` — comma-separated
//!   instrument lists.
//! - `WS_RETRY_ENABLED` (true), `WS_RETRY_MAX_ATTEMPTS` (10),
//!   `WS_RETRY_INITIAL_DELAY_MS` (1000), `WS_RETRY_MAX_DELAY_MS` (30000),
//!   `WS_RETRY_BACKOFF_MULTIPLIER` (2.0).
//! - `UDP_FEED_ENABLED` (true), `UDP_FEED_ADDRESS` (127.0.0.1),
//!   `UDP_FEED_PORT` (13988).
//! - `LOG_{PRICE,SYSTEM,TRADE}_ENABLED` (true),
//!   `LOG_{PRICE,SYSTEM,TRADE}_FILE` (`logs/{name}.log`).
//! - `DEBUG_LOG_ENABLED` (false).

use std::time::Duration;

use crate::error::GatewayError;

const DEFAULT_OKX_SYMBOLS: [&str; 5] = [
    "ETH-USDT-SWAP",
    "XRP-USDT-SWAP",
    "SOL-USDT-SWAP",
    "TRX-USDT-SWAP",
    "DOGE-USDT-SWAP",
];

const DEFAULT_BYBIT_SYMBOLS: [&str; 5] =
    ["ETHUSDT", "XRPUSDT", "SOLUSDT", "TRXUSDT", "DOGEUSDT"];

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// WebSocket reconnection parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff delay for the given 1-based attempt number:
    /// `min(initial * multiplier^(attempt-1), max_delay_ms)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp as i32);
        Duration::from_millis(raw.min(self.max_delay_ms as f64) as u64)
    }
}

/// UDP market-data feed destination.
#[derive(Debug, Clone)]
pub struct UdpFeedConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for UdpFeedConfig {
    fn default() -> Self {
        Self { enabled: true, address: "127.0.0.1".into(), port: 13988 }
    }
}

/// One log stream (price, system, or trade).
#[derive(Debug, Clone)]
pub struct LogStreamConfig {
    pub enabled: bool,
    /// Target file. The parent directory is created lazily; open failure
    /// falls back to stdout.
    pub file: String,
}

/// Per-stream logging toggles and file paths.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub price: LogStreamConfig,
    pub system: LogStreamConfig,
    pub trade: LogStreamConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            price: LogStreamConfig { enabled: true, file: "logs/price.log".into() },
            system: LogStreamConfig { enabled: true, file: "logs/system.log".into() },
            trade: LogStreamConfig { enabled: true, file: "logs/trade.log".into() },
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Top-level application configuration, populated from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub okx_api_key: String,
    pub okx_api_secret: String,
    pub okx_passphrase: String,
    pub bybit_api_key: String,
    pub bybit_api_secret: String,

    pub okx_symbols: Vec<String>,
    pub bybit_symbols: Vec<String>,

    pub retry: RetryConfig,
    pub udp_feed: UdpFeedConfig,
    pub log: LogConfig,

    pub debug_log_enabled: bool,
}

impl AppConfig {
    /// Load the configuration from the process environment.
    ///
    /// Fails with [`GatewayError::Config`] listing every missing required
    /// variable, so the operator can fix them all in one pass.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary lookup function. Test seam for `from_env`.
    pub fn from_lookup<F>(get: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |name: &str| -> String {
            match get(name) {
                Some(v) if !v.is_empty() => v,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let okx_api_key = required("OKX_API_KEY");
        let okx_api_secret = required("OKX_API_SECRET");
        let okx_passphrase = required("OKX_PASSPHRASE");
        let bybit_api_key = required("BYBIT_API_KEY");
        let bybit_api_secret = required("BYBIT_API_SECRET");

        if !missing.is_empty() {
            return Err(GatewayError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let okx_symbols = parse_csv(get("TRADING_SYMBOLS_OKX"), &DEFAULT_OKX_SYMBOLS);
        let bybit_symbols = parse_csv(get("TRADING_SYMBOLS_BYBIT"), &DEFAULT_BYBIT_SYMBOLS);

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            enabled: parse_bool(get("WS_RETRY_ENABLED"), retry_defaults.enabled),
            max_attempts: parse_num(get("WS_RETRY_MAX_ATTEMPTS"), retry_defaults.max_attempts),
            initial_delay_ms: parse_num(
                get("WS_RETRY_INITIAL_DELAY_MS"),
                retry_defaults.initial_delay_ms,
            ),
            max_delay_ms: parse_num(get("WS_RETRY_MAX_DELAY_MS"), retry_defaults.max_delay_ms),
            backoff_multiplier: parse_num(
                get("WS_RETRY_BACKOFF_MULTIPLIER"),
                retry_defaults.backoff_multiplier,
            ),
        };

        let feed_defaults = UdpFeedConfig::default();
        let udp_feed = UdpFeedConfig {
            enabled: parse_bool(get("UDP_FEED_ENABLED"), feed_defaults.enabled),
            address: get("UDP_FEED_ADDRESS").unwrap_or(feed_defaults.address),
            port: parse_num(get("UDP_FEED_PORT"), feed_defaults.port),
        };

        let log_defaults = LogConfig::default();
        let log = LogConfig {
            price: LogStreamConfig {
                enabled: parse_bool(get("LOG_PRICE_ENABLED"), true),
                file: get("LOG_PRICE_FILE").unwrap_or(log_defaults.price.file),
            },
            system: LogStreamConfig {
                enabled: parse_bool(get("LOG_SYSTEM_ENABLED"), true),
                file: get("LOG_SYSTEM_FILE").unwrap_or(log_defaults.system.file),
            },
            trade: LogStreamConfig {
                enabled: parse_bool(get("LOG_TRADE_ENABLED"), true),
                file: get("LOG_TRADE_FILE").unwrap_or(log_defaults.trade.file),
            },
        };

        Ok(Self {
            okx_api_key,
            okx_api_secret,
            okx_passphrase,
            bybit_api_key,
            bybit_api_secret,
            okx_symbols,
            bybit_symbols,
            retry,
            udp_feed,
            log,
            debug_log_enabled: parse_bool(get("DEBUG_LOG_ENABLED"), false),
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_bool(val: Option<String>, default: bool) -> bool {
    match val {
        Some(v) => v.eq_ignore_ascii_case("true") || v == "1",
        None => default,
    }
}

fn parse_num<T: std::str::FromStr>(val: Option<String>, default: T) -> T {
    val.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_csv(val: Option<String>, defaults: &[&str]) -> Vec<String> {
    match val {
        Some(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => defaults.iter().map(|s| s.to_string()).collect(),
    }
}
