//! Application configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: hardcoded in the struct `Default` impls.
//! 2. **Config file**: TOML file named by the `PALISADE_CONFIG` env var.
//! 3. **Environment variables**: `PALISADE_*` vars override single fields,
//!    e.g. `PALISADE_GATE__REQUESTS_PER_MINUTE=500`.
//!
//! Invalid configurations (unparseable upstream URL, allow patterns that do
//! not compile) are rejected at load time rather than failing later.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 8545
//!
//! [upstream]
//! http_url = "http://127.0.0.1:8040"
//!
//! [gate]
//! allow = ["eth_get.*", "net_.*", "eth_blockNumber"]
//! requests_per_minute = 1000
//! exempt_ips = ["10.0.0.5"]
//! block_range_limit = 10000
//! ```

use crate::middleware::MethodMatcher;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Env var naming the optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "PALISADE_CONFIG";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on. Defaults to `8545`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

/// The single upstream node requests are forwarded to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Target URL. Defaults to `http://127.0.0.1:8040`.
    #[serde(default = "default_http_url")]
    pub http_url: String,

    /// Request timeout in seconds. Defaults to `30`.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Gatekeeping policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Allow-list patterns (regular expressions, matched unanchored). An
    /// empty list permits nothing.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Sustained per-IP request rate. Defaults to `1000`.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// IPs exempt from rate limiting.
    #[serde(default)]
    pub exempt_ips: Vec<String>,

    /// Maximum block span for log queries; `0` disables the guard.
    #[serde(default)]
    pub block_range_limit: u64,

    /// Whether to drop idle rate-limit buckets in the background.
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub prune_idle_buckets: bool,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level when `RUST_LOG` is not set. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`. Defaults to `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8545
}

fn default_http_url() -> String {
    "http://127.0.0.1:8040".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: default_bind_port() }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { http_url: default_http_url(), timeout_seconds: default_timeout_seconds() }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            requests_per_minute: default_requests_per_minute(),
            exempt_ips: Vec::new(),
            block_range_limit: 0,
            prune_idle_buckets: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl AppConfig {
    /// Loads configuration from defaults, the optional `PALISADE_CONFIG`
    /// file, and `PALISADE_*` environment overrides, then validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source cannot be read or validation
    /// fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }
        let config: Self = builder
            .add_source(Environment::with_prefix("PALISADE").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string, applying the same
    /// validation as [`AppConfig::load`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable TOML or invalid settings.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url: Url = self
            .upstream
            .http_url
            .parse()
            .map_err(|e| ConfigError::Message(format!("invalid upstream url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Message(format!(
                "unsupported upstream url scheme: {}",
                url.scheme()
            )));
        }
        if self.gate.requests_per_minute == 0 {
            return Err(ConfigError::Message(
                "requests_per_minute must be greater than zero".to_string(),
            ));
        }
        MethodMatcher::new(&self.gate.allow)
            .map_err(|e| ConfigError::Message(format!("invalid allow pattern: {e}")))?;
        Ok(())
    }

    /// The socket address string the server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
    }

    /// Upstream request timeout as a [`Duration`].
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_seconds)
    }
}
