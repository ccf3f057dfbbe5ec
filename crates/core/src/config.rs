//! Layered configuration for the Coral connectivity layer.
//!
//! Sources, in increasing priority:
//! 1. Compiled-in defaults (production Bitfinex endpoints, factor 100)
//! 2. TOML configuration file (if provided)
//! 3. Environment overrides (prefix `CORAL_`, nested with `__`)
//! 4. Dedicated env vars for API secrets (`BITFINEX_API_KEY`,
//!    `BITFINEX_API_SECRET`)
//!
//! Credentials **must** come from environment variables, never from config
//! files, so they cannot be checked in by accident.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_scale_factor() -> u32 {
    100
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    10
}

fn default_base_currency() -> String {
    "USD".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bitfinex connection settings.
    pub bitfinex: VenueConfig,
    /// Streaming subscriptions and liveness.
    pub stream: StreamConfig,
    /// Account-level settings.
    pub account: AccountConfig,
}

/// Venue connection configuration.
///
/// `api_key`/`api_secret` carry `#[serde(default)]` so a TOML source never
/// needs (and never should) contain them.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// API key — from `BITFINEX_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// API secret — from `BITFINEX_API_SECRET`.
    #[serde(default)]
    pub api_secret: String,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// REST endpoint.
    pub rest_url: String,
    /// Integer scale factor between wire units and internal units.
    /// Fixed for the life of a connection.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u32,
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Streaming configuration: which symbols to follow and how to keep the
/// connection alive.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Symbols to subscribe to (e.g., `["BTCUSD"]`).
    pub symbols: Vec<String>,
    /// Force a reconnect when no frame (heartbeat included) arrives for
    /// this long.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Reconnect backoff parameters.
    pub reconnect: ReconnectSettings,
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    /// Initial backoff delay in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Consecutive attempts before giving up (0 = unlimited).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Account-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Currency balances are normalized into.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
}

impl AppConfig {
    /// Load configuration from layered sources; see the module docs.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("bitfinex.api_key", "")?
            .set_default("bitfinex.api_secret", "")?
            .set_default("bitfinex.ws_url", "wss://api.bitfinex.com/ws")?
            .set_default("bitfinex.rest_url", "https://api.bitfinex.com")?
            .set_default("bitfinex.scale_factor", 100i64)?
            .set_default("bitfinex.timeout_ms", 5_000i64)?
            .set_default("stream.symbols", vec!["BTCUSD"])?
            .set_default("stream.heartbeat_timeout_ms", 30_000i64)?
            .set_default("stream.reconnect.initial_backoff_ms", 1_000i64)?
            .set_default("stream.reconnect.max_backoff_ms", 30_000i64)?
            .set_default("stream.reconnect.max_retries", 10i64)?
            .set_default("account.base_currency", "USD")?;

        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // The prefix separator must be pinned to `_` explicitly; with a
        // nesting separator configured, the `config` crate would otherwise
        // match env vars against `CORAL__` instead of `CORAL_`.
        builder = builder.add_source(
            Environment::with_prefix("CORAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        if let Ok(v) = std::env::var("BITFINEX_API_KEY") {
            cfg.bitfinex.api_key = v;
        }
        if let Ok(v) = std::env::var("BITFINEX_API_SECRET") {
            cfg.bitfinex.api_secret = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check configuration invariants.
    fn validate(&self) -> Result<()> {
        if self.bitfinex.scale_factor == 0 {
            bail!("bitfinex.scale_factor must be at least 1");
        }
        if self.stream.symbols.is_empty() {
            bail!("stream.symbols must list at least one symbol");
        }
        if self.stream.heartbeat_timeout_ms == 0 {
            bail!("stream.heartbeat_timeout_ms must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        std::env::remove_var("CORAL_BITFINEX__SCALE_FACTOR");
        std::env::remove_var("CORAL_STREAM__HEARTBEAT_TIMEOUT_MS");
        std::env::remove_var("BITFINEX_API_KEY");
        std::env::remove_var("BITFINEX_API_SECRET");
    }

    fn write_temp_toml(content: &str) -> (tempfile::NamedTempFile, PathBuf) {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        write!(f, "{}", content).expect("write temp file");
        let path = f.path().to_path_buf();
        (f, path)
    }

    #[test]
    fn test_defaults() {
        let _lock = lock_env();
        clear_env();

        let cfg = AppConfig::load(None).expect("load defaults");
        assert_eq!(cfg.bitfinex.ws_url, "wss://api.bitfinex.com/ws");
        assert_eq!(cfg.bitfinex.rest_url, "https://api.bitfinex.com");
        assert_eq!(cfg.bitfinex.scale_factor, 100);
        assert_eq!(cfg.stream.symbols, vec!["BTCUSD"]);
        assert_eq!(cfg.stream.heartbeat_timeout_ms, 30_000);
        assert_eq!(cfg.stream.reconnect.max_retries, 10);
        assert_eq!(cfg.account.base_currency, "USD");
        assert!(cfg.bitfinex.api_key.is_empty());
    }

    #[test]
    fn test_toml_layer() {
        let _lock = lock_env();
        clear_env();

        let toml = r#"
[bitfinex]
ws_url = "wss://sandbox.example.com/ws"
rest_url = "https://sandbox.example.com"
scale_factor = 1000

[stream]
symbols = ["BTCUSD", "ETHUSD"]
heartbeat_timeout_ms = 15000

[stream.reconnect]
initial_backoff_ms = 250
max_retries = 3

[account]
base_currency = "EUR"
"#;
        let (_f, path) = write_temp_toml(toml);
        let cfg = AppConfig::load(Some(path)).expect("load toml");

        assert_eq!(cfg.bitfinex.ws_url, "wss://sandbox.example.com/ws");
        assert_eq!(cfg.bitfinex.scale_factor, 1000);
        assert_eq!(cfg.stream.symbols, vec!["BTCUSD", "ETHUSD"]);
        assert_eq!(cfg.stream.heartbeat_timeout_ms, 15_000);
        assert_eq!(cfg.stream.reconnect.initial_backoff_ms, 250);
        assert_eq!(cfg.account.base_currency, "EUR");
    }

    #[test]
    fn test_env_override() {
        let _lock = lock_env();
        clear_env();
        std::env::set_var("CORAL_BITFINEX__SCALE_FACTOR", "10000");

        let cfg = AppConfig::load(None).expect("load with env override");
        assert_eq!(cfg.bitfinex.scale_factor, 10_000);

        clear_env();
    }

    #[test]
    fn test_secrets_from_dedicated_env_vars() {
        let _lock = lock_env();
        clear_env();
        std::env::set_var("BITFINEX_API_KEY", "key_123");
        std::env::set_var("BITFINEX_API_SECRET", "sec_456");

        let cfg = AppConfig::load(None).expect("load with secrets");
        assert_eq!(cfg.bitfinex.api_key, "key_123");
        assert_eq!(cfg.bitfinex.api_secret, "sec_456");

        clear_env();
    }

    #[test]
    fn test_empty_symbols_rejected() {
        let _lock = lock_env();
        clear_env();

        let (_f, path) = write_temp_toml("[stream]\nsymbols = []\n");
        let err = AppConfig::load(Some(path)).unwrap_err();
        assert!(err.to_string().contains("symbols"));
    }

    #[test]
    fn test_zero_scale_factor_rejected() {
        let _lock = lock_env();
        clear_env();

        let (_f, path) = write_temp_toml("[bitfinex]\nscale_factor = 0\n");
        let err = AppConfig::load(Some(path)).unwrap_err();
        assert!(err.to_string().contains("scale_factor"));
    }
}
