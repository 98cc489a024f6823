// src/ingest/providers/coingecko.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::http::{UpstreamClient, BROWSER_UA};
use crate::ingest::types::{CryptoQuery, CryptoQuote, SourceAdapter};

#[derive(Debug, Deserialize)]
struct MarketRow {
    symbol: String,
    name: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

/// `GET {base}/coins/markets`, ordered by market cap.
pub struct CoinGeckoAdapter {
    base_url: String,
    vs_currency: String,
    limit: u32,
    http: UpstreamClient,
}

impl CoinGeckoAdapter {
    pub fn new(base_url: impl Into<String>, vs_currency: impl Into<String>, limit: u32, http: UpstreamClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vs_currency: vs_currency.into(),
            limit: limit.max(1),
            http,
        }
    }

    fn parse_markets(body: &str, query: &CryptoQuery) -> PipelineResult<Vec<CryptoQuote>> {
        let rows: Vec<MarketRow> = serde_json::from_str(body)
            .map_err(|e| PipelineError::UpstreamFormatError(format!("coingecko markets: {e}")))?;

        let wanted: HashSet<&str> = query.symbols.iter().map(String::as_str).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(rows.len());

        for row in rows {
            let sym = row.symbol.trim().to_ascii_lowercase();
            if !wanted.is_empty() && !wanted.contains(sym.as_str()) {
                continue;
            }
            // Several coins share tickers; keep the one with the largest cap.
            if !seen.insert(sym.clone()) {
                continue;
            }
            let price = row.current_price.ok_or_else(|| {
                PipelineError::UpstreamFormatError(format!("coingecko: no price for '{sym}'"))
            })?;
            out.push(CryptoQuote {
                symbol: sym.to_ascii_uppercase(),
                name: row.name,
                price,
                change_24h_pct: row.price_change_percentage_24h,
                volume_24h: row.total_volume,
                market_cap: row.market_cap,
            });
        }

        if let Some(missing) = query.symbols.iter().find(|s| !seen.contains(s.as_str())) {
            return Err(PipelineError::NotFound(format!(
                "symbol '{missing}' not listed upstream"
            )));
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for CoinGeckoAdapter {
    type Query = CryptoQuery;
    type Raw = Vec<CryptoQuote>;

    async fn fetch(&self, query: &CryptoQuery) -> PipelineResult<Vec<CryptoQuote>> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = if query.symbols.is_empty() { self.limit } else { 250 };
        let mut params = vec![
            ("vs_currency", self.vs_currency.clone()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", "1".to_string()),
        ];
        if !query.symbols.is_empty() {
            params.push(("symbols", query.symbols.join(",")));
        }

        let rsp = self.http.get(&url, &params, BROWSER_UA).await?;
        if rsp.status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound("coingecko markets endpoint".into()));
        }
        if !rsp.status.is_success() {
            return Err(PipelineError::UpstreamFormatError(format!(
                "coingecko answered {}",
                rsp.status
            )));
        }
        Self::parse_markets(&rsp.body, query)
    }

    fn name(&self) -> &'static str {
        "coingecko"
    }
}
