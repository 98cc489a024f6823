// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::PipelineResult;
use crate::observation::Source;

/// One external source. Implementations return the source's native shape or
/// one of the pipeline error kinds; they never panic on bad upstream data.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    type Query: Send + Sync;
    type Raw: Send;

    async fn fetch(&self, query: &Self::Query) -> PipelineResult<Self::Raw>;
    fn name(&self) -> &'static str;
}

pub type DynCryptoAdapter = Arc<dyn SourceAdapter<Query = CryptoQuery, Raw = Vec<CryptoQuote>>>;
pub type DynNewsAdapter = Arc<dyn SourceAdapter<Query = NewsQuery, Raw = Vec<Headline>>>;
pub type DynWeatherAdapter = Arc<dyn SourceAdapter<Query = WeatherQuery, Raw = WeatherReport>>;

/// Lowercased, deduplicated, sorted. Empty = "top coins by market cap".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CryptoQuery {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewsQuery {
    /// Lowercased keyword matched against title and summary.
    pub category: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeatherQuery {
    pub city: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CryptoQuote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change_24h_pct: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: String,
    pub outlet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub city: String,
    pub temperature_c: f64,
    pub condition: String,
    pub humidity_pct: Option<f64>,
    pub wind_speed_kmph: Option<f64>,
}

/// Adapter output tagged by source, the input of the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Crypto(Vec<CryptoQuote>),
    News(Vec<Headline>),
    Weather(WeatherReport),
}

impl RawResult {
    pub fn source(&self) -> Source {
        match self {
            RawResult::Crypto(_) => Source::Crypto,
            RawResult::News(_) => Source::News,
            RawResult::Weather(_) => Source::Weather,
        }
    }
}
