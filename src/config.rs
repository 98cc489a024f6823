// src/config.rs
//! Effective service configuration.
//!
//! Resolution order:
//! 1) $PULSE_CONFIG_PATH
//! 2) config/pulse.toml
//! 3) built-in defaults
//!
//! `PULSE_API_KEY` and `PULSE_HISTORY_PATH` override the file afterwards.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::observation::Source;

/// Upstream retries beyond the first attempt; transient failures only.
pub const MAX_UPSTREAM_RETRIES: u8 = 1;
pub const MAX_RETRY_BACKOFF_MS: u64 = 5_000;
pub const MAX_UPSTREAM_TIMEOUT_SECS: u64 = 60;

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const ENV_API_KEY: &str = "PULSE_API_KEY";
pub const ENV_HISTORY_PATH: &str = "PULSE_HISTORY_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: String,
    pub cache: CacheConfig,
    pub crypto: CryptoConfig,
    pub news: NewsConfig,
    pub weather: WeatherConfig,
    pub upstream: UpstreamConfig,
    pub history: HistoryConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub crypto_ttl_secs: u64,
    pub news_ttl_secs: u64,
    pub weather_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Empty means "top `limit` coins by market cap".
    pub default_symbols: Vec<String>,
    pub limit: u32,
    pub vs_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub default_city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
    pub coingecko_url: String,
    pub coindesk_rss_url: String,
    pub wttr_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSONL file; `None` keeps history in memory only.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: "kingvon".to_string(),
            cache: CacheConfig::default(),
            crypto: CryptoConfig::default(),
            news: NewsConfig::default(),
            weather: WeatherConfig::default(),
            upstream: UpstreamConfig::default(),
            history: HistoryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            crypto_ttl_secs: 30,
            news_ttl_secs: 300,
            weather_ttl_secs: 600,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            default_symbols: Vec::new(),
            limit: 10,
            vs_currency: "usd".to_string(),
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self { limit: 5 }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            default_city: "Bangalore".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 1,
            retry_backoff_ms: 250,
            coingecko_url: "https://api.coingecko.com/api/v3".to_string(),
            coindesk_rss_url: "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
            wttr_url: "https://wttr.in".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, source: Source) -> Duration {
        let secs = match source {
            Source::Crypto => self.crypto_ttl_secs,
            Source::News => self.news_ttl_secs,
            Source::Weather => self.weather_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing pulse config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// File (env path or default path) + env overrides.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
        if let Ok(p) = std::env::var(ENV_HISTORY_PATH) {
            if !p.trim().is_empty() {
                self.history.path = Some(PathBuf::from(p.trim()));
            }
        }
    }

    fn sanitized(mut self) -> Self {
        self.crypto.default_symbols = self
            .crypto
            .default_symbols
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.crypto.limit = self.crypto.limit.clamp(1, 250);
        self.news.limit = self.news.limit.clamp(1, 50);
        self.upstream.max_retries = self.upstream.max_retries.min(MAX_UPSTREAM_RETRIES);
        self.upstream.retry_backoff_ms = self.upstream.retry_backoff_ms.min(MAX_RETRY_BACKOFF_MS);
        self.upstream.timeout_secs = self.upstream.timeout_secs.clamp(1, MAX_UPSTREAM_TIMEOUT_SECS);
        if self.weather.default_city.trim().is_empty() {
            self.weather.default_city = WeatherConfig::default().default_city;
        }
        if self.rate_limit.max_requests_per_minute == 0 {
            self.rate_limit.max_requests_per_minute = RateLimitConfig::default().max_requests_per_minute;
        }
        self
    }

    /// Read-only projection served by `GET /config`. Never includes the key.
    pub fn public_view(&self, current_records: usize) -> serde_json::Value {
        serde_json::json!({
            "cache_ttl_secs": {
                "crypto": self.cache.crypto_ttl_secs,
                "news": self.cache.news_ttl_secs,
                "weather": self.cache.weather_ttl_secs,
            },
            "default_symbols": self.crypto.default_symbols,
            "crypto_limit": self.crypto.limit,
            "vs_currency": self.crypto.vs_currency,
            "news_limit": self.news.limit,
            "default_city": self.weather.default_city,
            "upstream_timeout_secs": self.upstream.timeout_secs,
            "upstream_max_retries": self.upstream.max_retries,
            "max_requests_per_minute": self.rate_limit.max_requests_per_minute,
            "storage": if self.history.path.is_some() { "jsonl" } else { "in-memory" },
            "current_records": current_records,
        })
    }
}
