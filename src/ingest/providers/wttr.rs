// src/ingest/providers/wttr.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::http::{UpstreamClient, CURL_UA};
use crate::ingest::types::{SourceAdapter, WeatherQuery, WeatherReport};

#[derive(Debug, Deserialize)]
struct J1 {
    current_condition: Vec<Current>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Current {
    #[serde(rename = "temp_C")]
    temp_c: String,
    weather_desc: Vec<Desc>,
    humidity: Option<String>,
    windspeed_kmph: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Desc {
    value: String,
}

/// `GET {base}/{city}?format=j1`
pub struct WttrAdapter {
    base_url: String,
    http: UpstreamClient,
}

impl WttrAdapter {
    pub fn new(base_url: impl Into<String>, http: UpstreamClient) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn parse_j1(city: &str, body: &str) -> PipelineResult<WeatherReport> {
        if body.trim_start().to_ascii_lowercase().starts_with("unknown location") {
            return Err(PipelineError::NotFound(format!("city '{city}'")));
        }
        let j1: J1 = serde_json::from_str(body)
            .map_err(|e| PipelineError::UpstreamFormatError(format!("wttr j1: {e}")))?;
        let cur = j1
            .current_condition
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::UpstreamFormatError("wttr: empty current_condition".into()))?;

        let temperature_c = cur.temp_c.trim().parse::<f64>().map_err(|_| {
            PipelineError::UpstreamFormatError(format!("wttr: temp_C '{}' is not numeric", cur.temp_c))
        })?;
        let condition = cur
            .weather_desc
            .first()
            .map(|d| d.value.trim().to_string())
            .unwrap_or_default();

        Ok(WeatherReport {
            city: city.to_string(),
            temperature_c,
            condition,
            humidity_pct: cur.humidity.as_deref().and_then(|h| h.trim().parse().ok()),
            wind_speed_kmph: cur.windspeed_kmph.as_deref().and_then(|w| w.trim().parse().ok()),
        })
    }
}

#[async_trait]
impl SourceAdapter for WttrAdapter {
    type Query = WeatherQuery;
    type Raw = WeatherReport;

    async fn fetch(&self, query: &WeatherQuery) -> PipelineResult<WeatherReport> {
        let url = format!("{}/{}", self.base_url, query.city.replace(' ', "+"));
        let rsp = self
            .http
            .get(&url, &[("format", "j1".to_string())], CURL_UA)
            .await?;
        if rsp.status == StatusCode::NOT_FOUND {
            return Err(PipelineError::NotFound(format!("city '{}'", query.city)));
        }
        if !rsp.status.is_success() {
            return Err(PipelineError::UpstreamFormatError(format!(
                "wttr answered {}",
                rsp.status
            )));
        }
        Self::parse_j1(&query.city, &rsp.body)
    }

    fn name(&self) -> &'static str {
        "wttr"
    }
}
