// src/pipeline.rs
//! Per-request orchestration:
//! CHECK_CACHE → HIT: return | MISS: fetch → normalize → persist → cache → return.
//!
//! A failed fetch stores nothing and its error kind reaches the caller
//! unchanged. The per-key lock makes check-then-set atomic, so concurrent
//! misses on one key fetch (and append) once.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::cache::{CacheKey, ObservationCache};
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::history::HistoryStore;
use crate::ingest::http::UpstreamClient;
use crate::ingest::providers::{CoinDeskRssAdapter, CoinGeckoAdapter, WttrAdapter};
use crate::ingest::{
    CryptoQuery, DynCryptoAdapter, DynNewsAdapter, DynWeatherAdapter, NewsQuery, RawResult,
    WeatherQuery,
};
use crate::normalize::normalize;
use crate::observation::{Observation, Source};

const MAX_SYMBOLS: usize = 50;
const MAX_NEWS_LIMIT: usize = 50;
const MAX_CITY_CHARS: usize = 85;

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub observations: Arc<Vec<Observation>>,
    pub cache_hit: bool,
}

#[derive(Debug, Clone)]
pub struct Defaults {
    pub symbols: Vec<String>,
    pub city: String,
    pub news_limit: usize,
}

impl From<&AppConfig> for Defaults {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            symbols: cfg.crypto.default_symbols.clone(),
            city: cfg.weather.default_city.clone(),
            news_limit: cfg.news.limit,
        }
    }
}

pub struct Adapters {
    pub crypto: DynCryptoAdapter,
    pub news: DynNewsAdapter,
    pub weather: DynWeatherAdapter,
}

impl Adapters {
    /// Live adapters against the configured upstreams, sharing one client.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let http = UpstreamClient::from_config(&cfg.upstream);
        Self {
            crypto: Arc::new(CoinGeckoAdapter::new(
                cfg.upstream.coingecko_url.clone(),
                cfg.crypto.vs_currency.clone(),
                cfg.crypto.limit,
                http.clone(),
            )),
            news: Arc::new(CoinDeskRssAdapter::from_url(
                cfg.upstream.coindesk_rss_url.clone(),
                http.clone(),
            )),
            weather: Arc::new(WttrAdapter::new(cfg.upstream.wttr_url.clone(), http)),
        }
    }
}

pub struct Orchestrator {
    adapters: Adapters,
    cache: ObservationCache,
    history: Arc<HistoryStore>,
    defaults: Defaults,
}

impl Orchestrator {
    pub fn new(
        adapters: Adapters,
        cache: ObservationCache,
        history: Arc<HistoryStore>,
        defaults: Defaults,
    ) -> Self {
        Self {
            adapters,
            cache,
            history,
            defaults,
        }
    }

    pub fn from_config(cfg: &AppConfig, history: Arc<HistoryStore>) -> Self {
        Self::new(
            Adapters::from_config(cfg),
            ObservationCache::new(cfg.cache.clone()),
            history,
            Defaults::from(cfg),
        )
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn cache(&self) -> &ObservationCache {
        &self.cache
    }

    // ---- query building (validation happens before cache/adapters) ----

    /// Trim, lowercase, dedupe and sort, so `btc,eth` and `eth,btc` are the
    /// same request.
    pub fn crypto_query(&self, symbols: Option<&str>) -> PipelineResult<CryptoQuery> {
        let mut out: Vec<String> = match symbols {
            Some(raw) => {
                let mut v = Vec::new();
                for part in raw.split(',') {
                    let s = part.trim().to_ascii_lowercase();
                    if s.is_empty() {
                        continue;
                    }
                    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
                        return Err(PipelineError::ValidationError(format!(
                            "invalid symbol '{}'",
                            part.trim()
                        )));
                    }
                    v.push(s);
                }
                v
            }
            None => self.defaults.symbols.clone(),
        };
        out.sort();
        out.dedup();
        if out.len() > MAX_SYMBOLS {
            return Err(PipelineError::ValidationError(format!(
                "at most {MAX_SYMBOLS} symbols per request"
            )));
        }
        Ok(CryptoQuery { symbols: out })
    }

    pub fn news_query(&self, category: Option<&str>, limit: Option<usize>) -> PipelineResult<NewsQuery> {
        let limit = limit.unwrap_or(self.defaults.news_limit);
        if limit == 0 || limit > MAX_NEWS_LIMIT {
            return Err(PipelineError::ValidationError(format!(
                "limit must be within 1..={MAX_NEWS_LIMIT}"
            )));
        }
        let category = category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        Ok(NewsQuery { category, limit })
    }

    pub fn weather_query(&self, city: Option<&str>) -> PipelineResult<WeatherQuery> {
        let city = match city.map(str::trim) {
            None | Some("") => self.defaults.city.clone(),
            Some(c) => c.to_string(),
        };
        if city.chars().count() > MAX_CITY_CHARS
            || city.chars().any(|c| c.is_control() || matches!(c, '/' | '?' | '#' | '&' | '%'))
            // `.` and `..` are path segments, not places
            || city.chars().all(|c| c == '.')
        {
            return Err(PipelineError::ValidationError(format!("invalid city '{city}'")));
        }
        Ok(WeatherQuery { city })
    }

    // ---- entry points ----

    pub async fn crypto_prices(&self, query: CryptoQuery) -> PipelineResult<PipelineOutcome> {
        let adapter = self.adapters.crypto.clone();
        self.run(CacheKey::crypto(&query), adapter.name(), async move {
            adapter.fetch(&query).await.map(RawResult::Crypto)
        })
        .await
    }

    pub async fn news(&self, query: NewsQuery) -> PipelineResult<PipelineOutcome> {
        let adapter = self.adapters.news.clone();
        self.run(CacheKey::news(&query), adapter.name(), async move {
            adapter.fetch(&query).await.map(RawResult::News)
        })
        .await
    }

    pub async fn weather(&self, query: WeatherQuery) -> PipelineResult<PipelineOutcome> {
        let adapter = self.adapters.weather.clone();
        self.run(CacheKey::weather(&query), adapter.name(), async move {
            adapter.fetch(&query).await.map(RawResult::Weather)
        })
        .await
    }

    async fn run<Fut>(&self, key: CacheKey, provider: &'static str, fetch: Fut) -> PipelineResult<PipelineOutcome>
    where
        Fut: Future<Output = PipelineResult<RawResult>>,
    {
        let source = key.source();
        let _guard = self.cache.lock_key(&key).await;

        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(target: "pipeline", %source, "cache hit");
            return Ok(PipelineOutcome {
                observations: hit,
                cache_hit: true,
            });
        }

        let t0 = Instant::now();
        let fetched = fetch.await;
        histogram!("pulse_fetch_ms", "source" => source.as_str())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => {
                log_upstream_error(source, provider, &e);
                counter!("pulse_upstream_errors_total", "source" => source.as_str(), "kind" => e.kind())
                    .increment(1);
                return Err(e);
            }
        };
        debug_assert_eq!(raw.source(), source, "adapter returned another source's shape");

        let observations = normalize(raw, Utc::now());
        if source == Source::News && observations.is_empty() {
            tracing::warn!(target: "pipeline", provider, "news feed yielded no headlines");
        }

        self.append_history(&observations)?;
        let ttl = self.cache.ttl_for(source);
        let stored = self.cache.put(key, observations, ttl);

        tracing::info!(target: "pipeline", %source, provider, count = stored.len(), "fetched fresh observations");
        Ok(PipelineOutcome {
            observations: stored,
            cache_hit: false,
        })
    }

    /// A file-backed append flushes and syncs to disk; on a multi-threaded
    /// runtime that runs via `block_in_place` so the worker's other tasks
    /// move elsewhere meanwhile.
    fn append_history(&self, observations: &[Observation]) -> PipelineResult<()> {
        let multi_thread = Handle::try_current()
            .is_ok_and(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread);
        if multi_thread && self.history.is_persistent() {
            tokio::task::block_in_place(|| self.history.append(observations))
        } else {
            self.history.append(observations)
        }
    }
}

fn log_upstream_error(source: Source, provider: &str, e: &PipelineError) {
    if e.is_source_rot() {
        tracing::error!(target: "pipeline", %source, provider, kind = e.kind(), error = %e, "upstream contract drifted");
    } else {
        tracing::warn!(target: "pipeline", %source, provider, kind = e.kind(), error = %e, "upstream fetch failed");
    }
}
